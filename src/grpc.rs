use std::future::Future;
use std::net::SocketAddr;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use tonic::{codec::CompressionEncoding, transport::Server, Request, Response, Status};
use tracing::info;

use crate::{
    deadline::Deadline,
    entities::{
        appointment::{self, AppointmentStatus},
        catalog_service,
        payment::{self, PaymentMethod, PaymentStatus, SettlementTarget},
    },
    errors::{grpc::map_service_error, ServiceError},
    proto::{
        appointment as appointment_pb,
        appointment_service_server::{
            AppointmentService as AppointmentRpc, AppointmentServiceServer,
        },
        catalog as catalog_pb,
        catalog_service_server::{CatalogService as CatalogRpc, CatalogServiceServer},
        payment as payment_pb,
        payment_service_server::{PaymentService as PaymentRpc, PaymentServiceServer},
    },
    services::{
        appointments::{AppointmentDetails, CreateAppointmentInput},
        catalog::{CreateServiceInput, UpdateServiceInput},
        payments::CreatePaymentInput,
        pricing::RequestedItem,
        AppointmentService, CatalogService, PaymentService,
    },
};

fn to_timestamp(at: DateTime<Utc>) -> prost_types::Timestamp {
    prost_types::Timestamp {
        seconds: at.timestamp(),
        nanos: at.timestamp_subsec_nanos() as i32,
    }
}

fn from_timestamp(ts: Option<prost_types::Timestamp>, field: &str) -> Result<DateTime<Utc>, Status> {
    let ts = ts.ok_or_else(|| Status::invalid_argument(format!("{} is required", field)))?;
    u32::try_from(ts.nanos)
        .ok()
        .and_then(|nanos| Utc.timestamp_opt(ts.seconds, nanos).single())
        .ok_or_else(|| Status::invalid_argument(format!("{} is not a valid point in time", field)))
}

fn parse_decimal(raw: &str, field: &str) -> Result<Decimal, Status> {
    Decimal::from_str(raw.trim())
        .map_err(|_| Status::invalid_argument(format!("{} '{}' is not a decimal", field, raw)))
}

fn appointment_status_from_wire(raw: i32) -> Result<AppointmentStatus, Status> {
    use appointment_pb::AppointmentStatus as Wire;

    match Wire::try_from(raw) {
        Ok(Wire::Pending) => Ok(AppointmentStatus::Pending),
        Ok(Wire::InProgress) => Ok(AppointmentStatus::InProgress),
        Ok(Wire::Completed) => Ok(AppointmentStatus::Completed),
        Ok(Wire::Cancelled) => Ok(AppointmentStatus::Cancelled),
        Ok(Wire::Unspecified) | Err(_) => Err(Status::invalid_argument(format!(
            "unknown appointment status {}",
            raw
        ))),
    }
}

fn appointment_status_to_wire(status: AppointmentStatus) -> appointment_pb::AppointmentStatus {
    use appointment_pb::AppointmentStatus as Wire;

    match status {
        AppointmentStatus::Pending => Wire::Pending,
        AppointmentStatus::InProgress => Wire::InProgress,
        AppointmentStatus::Completed => Wire::Completed,
        AppointmentStatus::Cancelled => Wire::Cancelled,
    }
}

fn payment_status_from_wire(raw: i32) -> Result<PaymentStatus, Status> {
    use payment_pb::PaymentStatus as Wire;

    match Wire::try_from(raw) {
        Ok(Wire::Pending) => Ok(PaymentStatus::Pending),
        Ok(Wire::Completed) => Ok(PaymentStatus::Completed),
        Ok(Wire::Failed) => Ok(PaymentStatus::Failed),
        Ok(Wire::Cancelled) => Ok(PaymentStatus::Cancelled),
        Ok(Wire::Unspecified) | Err(_) => Err(Status::invalid_argument(format!(
            "unknown payment status {}",
            raw
        ))),
    }
}

fn payment_status_to_wire(status: PaymentStatus) -> payment_pb::PaymentStatus {
    use payment_pb::PaymentStatus as Wire;

    match status {
        PaymentStatus::Pending => Wire::Pending,
        PaymentStatus::Completed => Wire::Completed,
        PaymentStatus::Failed => Wire::Failed,
        PaymentStatus::Cancelled => Wire::Cancelled,
    }
}

fn payment_method_from_wire(raw: i32) -> Result<PaymentMethod, Status> {
    use payment_pb::PaymentMethod as Wire;

    match Wire::try_from(raw) {
        Ok(Wire::Cash) => Ok(PaymentMethod::Cash),
        Ok(Wire::Bank) => Ok(PaymentMethod::Bank),
        Ok(Wire::Unspecified) | Err(_) => Err(Status::invalid_argument(format!(
            "unknown payment method {}",
            raw
        ))),
    }
}

fn payment_method_to_wire(method: PaymentMethod) -> payment_pb::PaymentMethod {
    match method {
        PaymentMethod::Cash => payment_pb::PaymentMethod::Cash,
        PaymentMethod::Bank => payment_pb::PaymentMethod::Bank,
    }
}

fn appointment_to_wire(model: appointment::Model) -> appointment_pb::Appointment {
    appointment_pb::Appointment {
        id: model.id,
        customer_id: model.customer_id,
        branch_id: model.branch_id,
        employee_id: model.employee_id,
        customer_address: model.customer_address,
        scheduled_time: Some(to_timestamp(model.scheduled_time)),
        status: appointment_status_to_wire(model.status) as i32,
        note: model.note,
        total: model.total.to_string(),
        created_at: Some(to_timestamp(model.created_at)),
        updated_at: Some(to_timestamp(model.updated_at)),
    }
}

fn details_to_wire(
    details: AppointmentDetails,
) -> Result<appointment_pb::GetAppointmentDetailsResponse, ServiceError> {
    let lines = details
        .lines
        .into_iter()
        .map(|line| {
            Ok(appointment_pb::AppointmentDetail {
                service_id: line.service_id,
                subtotal: line.subtotal()?.to_string(),
                unit_price: line.unit_price.to_string(),
                quantity: line.quantity,
                service_name: line.service_name,
                service_description: line.service_description,
            })
        })
        .collect::<Result<Vec<_>, ServiceError>>()?;

    Ok(appointment_pb::GetAppointmentDetailsResponse {
        appointment: Some(appointment_to_wire(details.appointment)),
        details: lines,
    })
}

fn payment_to_wire(model: payment::Model) -> payment_pb::Payment {
    payment_pb::Payment {
        id: model.id,
        order_id: model.order_id,
        appointment_id: model.appointment_id,
        amount: model.amount.to_string(),
        description: model.description,
        status: payment_status_to_wire(model.status) as i32,
        method: payment_method_to_wire(model.method) as i32,
        external_order_code: model.external_order_code,
        external_link_id: model.external_link_id,
        checkout_url: model.checkout_url,
        created_at: Some(to_timestamp(model.created_at)),
        updated_at: Some(to_timestamp(model.updated_at)),
    }
}

fn service_to_wire(model: catalog_service::Model) -> catalog_pb::ServiceEntry {
    catalog_pb::ServiceEntry {
        id: model.id,
        name: model.name,
        description: model.description,
        price: model.price.to_string(),
        created_at: Some(to_timestamp(model.created_at)),
        updated_at: Some(to_timestamp(model.updated_at)),
    }
}

fn appointment_reply(status: String) -> Response<appointment_pb::StatusReply> {
    Response::new(appointment_pb::StatusReply { status })
}

fn payment_reply(status: String) -> Response<payment_pb::StatusReply> {
    Response::new(payment_pb::StatusReply { status })
}

pub struct AppointmentGrpcService {
    svc: AppointmentService,
}

impl AppointmentGrpcService {
    pub fn new(svc: AppointmentService) -> Self {
        Self { svc }
    }
}

#[tonic::async_trait]
impl AppointmentRpc for AppointmentGrpcService {
    async fn create_appointment(
        &self,
        request: Request<appointment_pb::CreateAppointmentRequest>,
    ) -> Result<Response<appointment_pb::CreateAppointmentResponse>, Status> {
        let deadline = Deadline::from_metadata(request.metadata());
        let req = request.into_inner();

        let input = CreateAppointmentInput {
            customer_id: req.customer_id,
            branch_id: req.branch_id,
            customer_address: req.customer_address,
            scheduled_time: from_timestamp(req.scheduled_time, "scheduled_time")?,
            items: req
                .detail
                .into_iter()
                .map(|item| RequestedItem {
                    service_id: item.service_id,
                    quantity: item.quantity,
                })
                .collect(),
            note: req.note,
        };

        let (appointment_id, status) =
            map_service_error(deadline.run(self.svc.create_appointment(input)).await)?;
        Ok(Response::new(appointment_pb::CreateAppointmentResponse {
            appointment_id,
            status,
        }))
    }

    async fn get_appointment(
        &self,
        request: Request<appointment_pb::GetAppointmentRequest>,
    ) -> Result<Response<appointment_pb::GetAppointmentResponse>, Status> {
        let deadline = Deadline::from_metadata(request.metadata());
        let id = request.into_inner().appointment_id;

        let model = map_service_error(deadline.run(self.svc.get_appointment(id)).await)?;
        Ok(Response::new(appointment_pb::GetAppointmentResponse {
            appointment: Some(appointment_to_wire(model)),
        }))
    }

    async fn get_appointments_by_customer(
        &self,
        request: Request<appointment_pb::GetAppointmentsByCustomerRequest>,
    ) -> Result<Response<appointment_pb::AppointmentList>, Status> {
        let deadline = Deadline::from_metadata(request.metadata());
        let customer_id = request.into_inner().customer_id;

        let models = map_service_error(
            deadline
                .run(self.svc.get_appointments_by_customer(customer_id))
                .await,
        )?;
        Ok(Response::new(appointment_pb::AppointmentList {
            appointments: models.into_iter().map(appointment_to_wire).collect(),
        }))
    }

    async fn get_appointments_by_employee(
        &self,
        request: Request<appointment_pb::GetAppointmentsByEmployeeRequest>,
    ) -> Result<Response<appointment_pb::AppointmentList>, Status> {
        let deadline = Deadline::from_metadata(request.metadata());
        let employee_id = request.into_inner().employee_id;

        let models = map_service_error(
            deadline
                .run(self.svc.get_appointments_by_employee(employee_id))
                .await,
        )?;
        Ok(Response::new(appointment_pb::AppointmentList {
            appointments: models.into_iter().map(appointment_to_wire).collect(),
        }))
    }

    async fn update_appointment_status(
        &self,
        request: Request<appointment_pb::UpdateAppointmentStatusRequest>,
    ) -> Result<Response<appointment_pb::StatusReply>, Status> {
        let deadline = Deadline::from_metadata(request.metadata());
        let req = request.into_inner();
        let status = appointment_status_from_wire(req.status)?;

        let reply = map_service_error(
            deadline
                .run(self.svc.update_appointment_status(req.appointment_id, status))
                .await,
        )?;
        Ok(appointment_reply(reply))
    }

    async fn assign_employee(
        &self,
        request: Request<appointment_pb::AssignEmployeeRequest>,
    ) -> Result<Response<appointment_pb::StatusReply>, Status> {
        let deadline = Deadline::from_metadata(request.metadata());
        let req = request.into_inner();

        let reply = map_service_error(
            deadline
                .run(self.svc.assign_employee(req.appointment_id, req.employee_id))
                .await,
        )?;
        Ok(appointment_reply(reply))
    }

    async fn get_appointment_details(
        &self,
        request: Request<appointment_pb::GetAppointmentDetailsRequest>,
    ) -> Result<Response<appointment_pb::GetAppointmentDetailsResponse>, Status> {
        let deadline = Deadline::from_metadata(request.metadata());
        let id = request.into_inner().appointment_id;

        let details = map_service_error(deadline.run(self.svc.get_appointment_details(id)).await)?;
        Ok(Response::new(map_service_error(details_to_wire(details))?))
    }

    async fn delete_appointment(
        &self,
        request: Request<appointment_pb::DeleteAppointmentRequest>,
    ) -> Result<Response<appointment_pb::StatusReply>, Status> {
        let deadline = Deadline::from_metadata(request.metadata());
        let id = request.into_inner().appointment_id;

        let reply = map_service_error(deadline.run(self.svc.delete_appointment(id)).await)?;
        Ok(appointment_reply(reply))
    }
}

pub struct PaymentGrpcService {
    svc: PaymentService,
}

impl PaymentGrpcService {
    pub fn new(svc: PaymentService) -> Self {
        Self { svc }
    }
}

#[tonic::async_trait]
impl PaymentRpc for PaymentGrpcService {
    async fn create_payment(
        &self,
        request: Request<payment_pb::CreatePaymentRequest>,
    ) -> Result<Response<payment_pb::CreatePaymentResponse>, Status> {
        let deadline = Deadline::from_metadata(request.metadata());
        let req = request.into_inner();

        let target = SettlementTarget::from_columns(req.order_id, req.appointment_id)
            .ok_or_else(|| {
                Status::invalid_argument("exactly one of order_id and appointment_id is required")
            })?;
        let input = CreatePaymentInput {
            target,
            amount: parse_decimal(&req.amount, "amount")?,
            description: req.description,
            method: payment_method_from_wire(req.method)?,
        };

        let payment_id = map_service_error(deadline.run(self.svc.create_payment(input)).await)?;
        Ok(Response::new(payment_pb::CreatePaymentResponse { payment_id }))
    }

    async fn get_payment_info(
        &self,
        request: Request<payment_pb::GetPaymentInfoRequest>,
    ) -> Result<Response<payment_pb::Payment>, Status> {
        let deadline = Deadline::from_metadata(request.metadata());
        let id = request.into_inner().payment_id;

        let model = map_service_error(deadline.run(self.svc.get_payment_info(id)).await)?;
        Ok(Response::new(payment_to_wire(model)))
    }

    async fn create_payment_url(
        &self,
        request: Request<payment_pb::CreatePaymentUrlRequest>,
    ) -> Result<Response<payment_pb::CreatePaymentUrlResponse>, Status> {
        let deadline = Deadline::from_metadata(request.metadata());
        let id = request.into_inner().payment_id;

        let link = map_service_error(deadline.run(self.svc.create_payment_url(id)).await)?;
        Ok(Response::new(payment_pb::CreatePaymentUrlResponse {
            link_id: link.link_id,
            checkout_url: link.checkout_url,
        }))
    }

    async fn cancel_payment_link(
        &self,
        request: Request<payment_pb::CancelPaymentLinkRequest>,
    ) -> Result<Response<payment_pb::StatusReply>, Status> {
        let deadline = Deadline::from_metadata(request.metadata());
        let req = request.into_inner();

        let status = map_service_error(
            deadline
                .run(self.svc.cancel_payment_link(req.payment_id, &req.reason))
                .await,
        )?;
        Ok(payment_reply(status.to_string()))
    }

    async fn update_payment_status(
        &self,
        request: Request<payment_pb::UpdatePaymentStatusRequest>,
    ) -> Result<Response<payment_pb::StatusReply>, Status> {
        let deadline = Deadline::from_metadata(request.metadata());
        let req = request.into_inner();
        let status = payment_status_from_wire(req.status)?;

        let reply = map_service_error(
            deadline
                .run(self.svc.update_payment_status(req.payment_id, status))
                .await,
        )?;
        Ok(payment_reply(reply))
    }

    async fn update_bank_payment_status(
        &self,
        request: Request<payment_pb::UpdateBankPaymentStatusRequest>,
    ) -> Result<Response<payment_pb::StatusReply>, Status> {
        let deadline = Deadline::from_metadata(request.metadata());
        let req = request.into_inner();
        let status = payment_status_from_wire(req.status)?;

        let reply = map_service_error(
            deadline
                .run(self.svc.update_bank_payment_status(req.order_code, status))
                .await,
        )?;
        Ok(payment_reply(reply))
    }

    async fn update_payment_method(
        &self,
        request: Request<payment_pb::UpdatePaymentMethodRequest>,
    ) -> Result<Response<payment_pb::StatusReply>, Status> {
        let deadline = Deadline::from_metadata(request.metadata());
        let req = request.into_inner();
        let method = payment_method_from_wire(req.method)?;

        let reply = map_service_error(
            deadline
                .run(self.svc.update_payment_method(req.payment_id, method))
                .await,
        )?;
        Ok(payment_reply(reply))
    }

    async fn update_payment_amount(
        &self,
        request: Request<payment_pb::UpdatePaymentAmountRequest>,
    ) -> Result<Response<payment_pb::StatusReply>, Status> {
        let deadline = Deadline::from_metadata(request.metadata());
        let req = request.into_inner();
        let amount = parse_decimal(&req.amount, "amount")?;

        let reply = map_service_error(
            deadline
                .run(self.svc.update_payment_amount(req.payment_id, amount))
                .await,
        )?;
        Ok(payment_reply(reply))
    }
}

pub struct CatalogGrpcService {
    svc: CatalogService,
}

impl CatalogGrpcService {
    pub fn new(svc: CatalogService) -> Self {
        Self { svc }
    }
}

#[tonic::async_trait]
impl CatalogRpc for CatalogGrpcService {
    async fn create_service(
        &self,
        request: Request<catalog_pb::CreateServiceRequest>,
    ) -> Result<Response<catalog_pb::ServiceEntry>, Status> {
        let deadline = Deadline::from_metadata(request.metadata());
        let req = request.into_inner();
        let input = CreateServiceInput {
            name: req.name,
            description: req.description,
            price: parse_decimal(&req.price, "price")?,
        };

        let model = map_service_error(deadline.run(self.svc.create_service(input)).await)?;
        Ok(Response::new(service_to_wire(model)))
    }

    async fn get_service(
        &self,
        request: Request<catalog_pb::GetServiceRequest>,
    ) -> Result<Response<catalog_pb::ServiceEntry>, Status> {
        let deadline = Deadline::from_metadata(request.metadata());
        let id = request.into_inner().service_id;

        let model = map_service_error(deadline.run(self.svc.get_service(id)).await)?;
        Ok(Response::new(service_to_wire(model)))
    }

    async fn list_services(
        &self,
        request: Request<catalog_pb::ListServicesRequest>,
    ) -> Result<Response<catalog_pb::ServiceList>, Status> {
        let deadline = Deadline::from_metadata(request.metadata());

        let models = map_service_error(deadline.run(self.svc.list_services()).await)?;
        Ok(Response::new(catalog_pb::ServiceList {
            services: models.into_iter().map(service_to_wire).collect(),
        }))
    }

    async fn update_service(
        &self,
        request: Request<catalog_pb::UpdateServiceRequest>,
    ) -> Result<Response<catalog_pb::ServiceEntry>, Status> {
        let deadline = Deadline::from_metadata(request.metadata());
        let req = request.into_inner();
        let input = UpdateServiceInput {
            name: req.name,
            description: req.description,
            price: req
                .price
                .as_deref()
                .map(|raw| parse_decimal(raw, "price"))
                .transpose()?,
        };

        let model = map_service_error(
            deadline
                .run(self.svc.update_service(req.service_id, input))
                .await,
        )?;
        Ok(Response::new(service_to_wire(model)))
    }

    async fn delete_service(
        &self,
        request: Request<catalog_pb::DeleteServiceRequest>,
    ) -> Result<Response<catalog_pb::DeleteServiceResponse>, Status> {
        let deadline = Deadline::from_metadata(request.metadata());
        let id = request.into_inner().service_id;

        map_service_error(deadline.run(self.svc.delete_service(id)).await)?;
        Ok(Response::new(catalog_pb::DeleteServiceResponse { deleted: true }))
    }
}

/// Serves the three gRPC services until `shutdown` resolves.
pub async fn serve<F>(
    addr: SocketAddr,
    appointments: AppointmentService,
    payments: PaymentService,
    catalog: CatalogService,
    shutdown: F,
) -> Result<(), tonic::transport::Error>
where
    F: Future<Output = ()>,
{
    info!("gRPC server listening on {}", addr);

    Server::builder()
        .add_service(
            AppointmentServiceServer::new(AppointmentGrpcService::new(appointments))
                .accept_compressed(CompressionEncoding::Gzip)
                .send_compressed(CompressionEncoding::Gzip),
        )
        .add_service(
            PaymentServiceServer::new(PaymentGrpcService::new(payments))
                .accept_compressed(CompressionEncoding::Gzip)
                .send_compressed(CompressionEncoding::Gzip),
        )
        .add_service(
            CatalogServiceServer::new(CatalogGrpcService::new(catalog))
                .accept_compressed(CompressionEncoding::Gzip)
                .send_compressed(CompressionEncoding::Gzip),
        )
        .serve_with_shutdown(addr, shutdown)
        .await
}
