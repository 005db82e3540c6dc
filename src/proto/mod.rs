//! Wire types for the gRPC surface. Money travels as decimal strings so that
//! no precision is lost; times are protobuf `Timestamp`s.
//!
//! Service stubs are generated by `build.rs` and included next to the
//! messages they use.

pub mod appointment {
    use prost_types::Timestamp;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum AppointmentStatus {
        Unspecified = 0,
        Pending = 1,
        InProgress = 2,
        Completed = 3,
        Cancelled = 4,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Appointment {
        #[prost(int32, tag = "1")]
        pub id: i32,
        #[prost(int32, tag = "2")]
        pub customer_id: i32,
        #[prost(int32, tag = "3")]
        pub branch_id: i32,
        #[prost(int32, optional, tag = "4")]
        pub employee_id: Option<i32>,
        #[prost(string, tag = "5")]
        pub customer_address: String,
        #[prost(message, optional, tag = "6")]
        pub scheduled_time: Option<Timestamp>,
        #[prost(enumeration = "AppointmentStatus", tag = "7")]
        pub status: i32,
        #[prost(string, tag = "8")]
        pub note: String,
        #[prost(string, tag = "9")]
        pub total: String,
        #[prost(message, optional, tag = "10")]
        pub created_at: Option<Timestamp>,
        #[prost(message, optional, tag = "11")]
        pub updated_at: Option<Timestamp>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct AppointmentItem {
        #[prost(int32, tag = "1")]
        pub service_id: i32,
        #[prost(int32, tag = "2")]
        pub quantity: i32,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct CreateAppointmentRequest {
        #[prost(int32, tag = "1")]
        pub customer_id: i32,
        #[prost(int32, tag = "2")]
        pub branch_id: i32,
        #[prost(string, tag = "3")]
        pub customer_address: String,
        #[prost(message, optional, tag = "4")]
        pub scheduled_time: Option<Timestamp>,
        #[prost(message, repeated, tag = "5")]
        pub detail: Vec<AppointmentItem>,
        #[prost(string, tag = "6")]
        pub note: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct CreateAppointmentResponse {
        #[prost(int32, tag = "1")]
        pub appointment_id: i32,
        #[prost(string, tag = "2")]
        pub status: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct GetAppointmentRequest {
        #[prost(int32, tag = "1")]
        pub appointment_id: i32,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct GetAppointmentResponse {
        #[prost(message, optional, tag = "1")]
        pub appointment: Option<Appointment>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct GetAppointmentsByCustomerRequest {
        #[prost(int32, tag = "1")]
        pub customer_id: i32,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct GetAppointmentsByEmployeeRequest {
        #[prost(int32, tag = "1")]
        pub employee_id: i32,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct AppointmentList {
        #[prost(message, repeated, tag = "1")]
        pub appointments: Vec<Appointment>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct UpdateAppointmentStatusRequest {
        #[prost(int32, tag = "1")]
        pub appointment_id: i32,
        #[prost(enumeration = "AppointmentStatus", tag = "2")]
        pub status: i32,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct AssignEmployeeRequest {
        #[prost(int32, tag = "1")]
        pub appointment_id: i32,
        #[prost(int32, tag = "2")]
        pub employee_id: i32,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct GetAppointmentDetailsRequest {
        #[prost(int32, tag = "1")]
        pub appointment_id: i32,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct AppointmentDetail {
        #[prost(int32, tag = "1")]
        pub service_id: i32,
        #[prost(string, tag = "2")]
        pub service_name: String,
        #[prost(string, tag = "3")]
        pub service_description: String,
        #[prost(string, tag = "4")]
        pub unit_price: String,
        #[prost(int32, tag = "5")]
        pub quantity: i32,
        #[prost(string, tag = "6")]
        pub subtotal: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct GetAppointmentDetailsResponse {
        #[prost(message, optional, tag = "1")]
        pub appointment: Option<Appointment>,
        #[prost(message, repeated, tag = "2")]
        pub details: Vec<AppointmentDetail>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct DeleteAppointmentRequest {
        #[prost(int32, tag = "1")]
        pub appointment_id: i32,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct StatusReply {
        #[prost(string, tag = "1")]
        pub status: String,
    }

    include!(concat!(env!("OUT_DIR"), "/petcare.appointment.AppointmentService.rs"));
}

pub mod payment {
    use prost_types::Timestamp;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum PaymentStatus {
        Unspecified = 0,
        Pending = 1,
        Completed = 2,
        Failed = 3,
        Cancelled = 4,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum PaymentMethod {
        Unspecified = 0,
        Cash = 1,
        Bank = 2,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Payment {
        #[prost(int32, tag = "1")]
        pub id: i32,
        #[prost(int32, optional, tag = "2")]
        pub order_id: Option<i32>,
        #[prost(int32, optional, tag = "3")]
        pub appointment_id: Option<i32>,
        #[prost(string, tag = "4")]
        pub amount: String,
        #[prost(string, tag = "5")]
        pub description: String,
        #[prost(enumeration = "PaymentStatus", tag = "6")]
        pub status: i32,
        #[prost(enumeration = "PaymentMethod", tag = "7")]
        pub method: i32,
        #[prost(int64, optional, tag = "8")]
        pub external_order_code: Option<i64>,
        #[prost(string, optional, tag = "9")]
        pub external_link_id: Option<String>,
        #[prost(string, optional, tag = "10")]
        pub checkout_url: Option<String>,
        #[prost(message, optional, tag = "11")]
        pub created_at: Option<Timestamp>,
        #[prost(message, optional, tag = "12")]
        pub updated_at: Option<Timestamp>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct CreatePaymentRequest {
        #[prost(int32, optional, tag = "1")]
        pub order_id: Option<i32>,
        #[prost(int32, optional, tag = "2")]
        pub appointment_id: Option<i32>,
        #[prost(string, tag = "3")]
        pub amount: String,
        #[prost(string, tag = "4")]
        pub description: String,
        #[prost(enumeration = "PaymentMethod", tag = "5")]
        pub method: i32,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct CreatePaymentResponse {
        #[prost(int32, tag = "1")]
        pub payment_id: i32,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct GetPaymentInfoRequest {
        #[prost(int32, tag = "1")]
        pub payment_id: i32,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct CreatePaymentUrlRequest {
        #[prost(int32, tag = "1")]
        pub payment_id: i32,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct CreatePaymentUrlResponse {
        #[prost(string, tag = "1")]
        pub link_id: String,
        #[prost(string, tag = "2")]
        pub checkout_url: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct CancelPaymentLinkRequest {
        #[prost(int32, tag = "1")]
        pub payment_id: i32,
        #[prost(string, tag = "2")]
        pub reason: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct UpdatePaymentStatusRequest {
        #[prost(int32, tag = "1")]
        pub payment_id: i32,
        #[prost(enumeration = "PaymentStatus", tag = "2")]
        pub status: i32,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct UpdateBankPaymentStatusRequest {
        #[prost(int64, tag = "1")]
        pub order_code: i64,
        #[prost(enumeration = "PaymentStatus", tag = "2")]
        pub status: i32,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct UpdatePaymentMethodRequest {
        #[prost(int32, tag = "1")]
        pub payment_id: i32,
        #[prost(enumeration = "PaymentMethod", tag = "2")]
        pub method: i32,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct UpdatePaymentAmountRequest {
        #[prost(int32, tag = "1")]
        pub payment_id: i32,
        #[prost(string, tag = "2")]
        pub amount: String,
    }

    /// `status` is "Success", except for CancelPaymentLink which reports the
    /// payment's resulting status.
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct StatusReply {
        #[prost(string, tag = "1")]
        pub status: String,
    }

    include!(concat!(env!("OUT_DIR"), "/petcare.payment.PaymentService.rs"));
}

pub mod catalog {
    use prost_types::Timestamp;

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ServiceEntry {
        #[prost(int32, tag = "1")]
        pub id: i32,
        #[prost(string, tag = "2")]
        pub name: String,
        #[prost(string, tag = "3")]
        pub description: String,
        #[prost(string, tag = "4")]
        pub price: String,
        #[prost(message, optional, tag = "5")]
        pub created_at: Option<Timestamp>,
        #[prost(message, optional, tag = "6")]
        pub updated_at: Option<Timestamp>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct CreateServiceRequest {
        #[prost(string, tag = "1")]
        pub name: String,
        #[prost(string, tag = "2")]
        pub description: String,
        #[prost(string, tag = "3")]
        pub price: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct GetServiceRequest {
        #[prost(int32, tag = "1")]
        pub service_id: i32,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ListServicesRequest {}

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ServiceList {
        #[prost(message, repeated, tag = "1")]
        pub services: Vec<ServiceEntry>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct UpdateServiceRequest {
        #[prost(int32, tag = "1")]
        pub service_id: i32,
        #[prost(string, optional, tag = "2")]
        pub name: Option<String>,
        #[prost(string, optional, tag = "3")]
        pub description: Option<String>,
        #[prost(string, optional, tag = "4")]
        pub price: Option<String>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct DeleteServiceRequest {
        #[prost(int32, tag = "1")]
        pub service_id: i32,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct DeleteServiceResponse {
        #[prost(bool, tag = "1")]
        pub deleted: bool,
    }

    include!(concat!(env!("OUT_DIR"), "/petcare.catalog.CatalogService.rs"));
}

pub use appointment::appointment_service_server;
pub use catalog::catalog_service_server;
pub use payment::payment_service_server;
