use std::process::Command;

// We'll use chrono to embed the build timestamp
use chrono::Utc;

/// Declares one unary RPC whose request/response types live in `crate::proto::<module>`.
fn method(module: &str, name: &str, route: &str, input: &str, output: &str) -> tonic_build::manual::Method {
    tonic_build::manual::Method::builder()
        .name(name)
        .route_name(route)
        .input_type(format!("crate::proto::{}::{}", module, input))
        .output_type(format!("crate::proto::{}::{}", module, output))
        .codec_path("tonic::codec::ProstCodec")
        .build()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Services are described in Rust rather than .proto files so the build
    // does not depend on a protoc installation.
    let appointment = tonic_build::manual::Service::builder()
        .name("AppointmentService")
        .package("petcare.appointment")
        .method(method("appointment", "create_appointment", "CreateAppointment", "CreateAppointmentRequest", "CreateAppointmentResponse"))
        .method(method("appointment", "get_appointment", "GetAppointment", "GetAppointmentRequest", "GetAppointmentResponse"))
        .method(method("appointment", "get_appointments_by_customer", "GetAppointmentsByCustomer", "GetAppointmentsByCustomerRequest", "AppointmentList"))
        .method(method("appointment", "get_appointments_by_employee", "GetAppointmentsByEmployee", "GetAppointmentsByEmployeeRequest", "AppointmentList"))
        .method(method("appointment", "update_appointment_status", "UpdateAppointmentStatus", "UpdateAppointmentStatusRequest", "StatusReply"))
        .method(method("appointment", "assign_employee", "AssignEmployee", "AssignEmployeeRequest", "StatusReply"))
        .method(method("appointment", "get_appointment_details", "GetAppointmentDetails", "GetAppointmentDetailsRequest", "GetAppointmentDetailsResponse"))
        .method(method("appointment", "delete_appointment", "DeleteAppointment", "DeleteAppointmentRequest", "StatusReply"))
        .build();

    let payment = tonic_build::manual::Service::builder()
        .name("PaymentService")
        .package("petcare.payment")
        .method(method("payment", "create_payment", "CreatePayment", "CreatePaymentRequest", "CreatePaymentResponse"))
        .method(method("payment", "get_payment_info", "GetPaymentInfo", "GetPaymentInfoRequest", "Payment"))
        .method(method("payment", "create_payment_url", "CreatePaymentURL", "CreatePaymentUrlRequest", "CreatePaymentUrlResponse"))
        .method(method("payment", "cancel_payment_link", "CancelPaymentLink", "CancelPaymentLinkRequest", "StatusReply"))
        .method(method("payment", "update_payment_status", "UpdatePaymentStatus", "UpdatePaymentStatusRequest", "StatusReply"))
        .method(method("payment", "update_bank_payment_status", "UpdateBankPaymentStatus", "UpdateBankPaymentStatusRequest", "StatusReply"))
        .method(method("payment", "update_payment_method", "UpdatePaymentMethod", "UpdatePaymentMethodRequest", "StatusReply"))
        .method(method("payment", "update_payment_amount", "UpdatePaymentAmount", "UpdatePaymentAmountRequest", "StatusReply"))
        .build();

    let catalog = tonic_build::manual::Service::builder()
        .name("CatalogService")
        .package("petcare.catalog")
        .method(method("catalog", "create_service", "CreateService", "CreateServiceRequest", "ServiceEntry"))
        .method(method("catalog", "get_service", "GetService", "GetServiceRequest", "ServiceEntry"))
        .method(method("catalog", "list_services", "ListServices", "ListServicesRequest", "ServiceList"))
        .method(method("catalog", "update_service", "UpdateService", "UpdateServiceRequest", "ServiceEntry"))
        .method(method("catalog", "delete_service", "DeleteService", "DeleteServiceRequest", "DeleteServiceResponse"))
        .build();

    tonic_build::manual::Builder::new().compile(&[appointment, payment, catalog]);

    // Generate build-time metadata
    let git_hash = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=GIT_HASH={}", git_hash.trim());
    println!("cargo:rustc-env=BUILD_TIME={}", Utc::now().to_rfc3339());

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=.git/HEAD");

    Ok(())
}
