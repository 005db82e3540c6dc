use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use validator::{Validate, ValidationError};

use crate::{
    db::{begin_serializable, commit, retry_on_conflict, ConflictRetry, DbPool},
    entities::{
        appointment::{self, AppointmentStatus},
        appointment_detail, catalog_service,
        payment::{self, PaymentStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        appointment_status::check_transition,
        pricing::{checked_subtotal, PricingStrategy, RequestedItem},
    },
};

/// Status tag returned by successful mutations.
pub const SUCCESS: &str = "Success";

fn validate_items(items: &[RequestedItem]) -> Result<(), ValidationError> {
    if items.iter().any(|item| item.quantity < 1) {
        return Err(ValidationError::new("quantity_must_be_positive"));
    }
    let mut seen = HashSet::with_capacity(items.len());
    if !items.iter().all(|item| seen.insert(item.service_id)) {
        return Err(ValidationError::new("duplicate_service_id"));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateAppointmentInput {
    #[validate(range(min = 1))]
    pub customer_id: i32,
    #[validate(range(min = 1))]
    pub branch_id: i32,
    #[validate(length(max = 500))]
    pub customer_address: String,
    pub scheduled_time: DateTime<Utc>,
    #[validate(length(min = 1), custom = "validate_items")]
    pub items: Vec<RequestedItem>,
    #[validate(length(max = 2000))]
    pub note: String,
}

/// A booked line with the service's current name next to the price that was
/// snapshotted at booking time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentLine {
    pub service_id: i32,
    pub service_name: String,
    pub service_description: String,
    pub unit_price: Decimal,
    pub quantity: i32,
}

impl AppointmentLine {
    pub fn subtotal(&self) -> Result<Decimal, ServiceError> {
        checked_subtotal(self.service_id, self.unit_price, self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentDetails {
    pub appointment: appointment::Model,
    pub lines: Vec<AppointmentLine>,
}

/// Books appointments and moves them through their lifecycle.
#[derive(Clone)]
pub struct AppointmentService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    pricing: Arc<dyn PricingStrategy>,
}

impl AppointmentService {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        pricing: Arc<dyn PricingStrategy>,
    ) -> Self {
        Self {
            db,
            event_sender,
            pricing,
        }
    }

    /// Creates the appointment header and its lines in one transaction.
    ///
    /// Catalog rows are read under a shared lock on PostgreSQL, and after the
    /// database write lock is taken on SQLite, so a concurrent price change
    /// either waits for this booking to commit or aborts; the snapshotted
    /// prices are the ones that were current at commit.
    #[instrument(skip(self, input), fields(customer_id = input.customer_id, items = input.items.len()))]
    pub async fn create_appointment(
        &self,
        input: CreateAppointmentInput,
    ) -> Result<(i32, String), ServiceError> {
        input.validate().map_err(|e| {
            warn!(error = %e, "Rejected appointment request");
            ServiceError::from(e)
        })?;

        let start = Instant::now();
        let header = retry_on_conflict("create_appointment", &ConflictRetry::default(), || {
            self.insert_booking(&input)
        })
        .await?;

        histogram!("petcare_appointments.create.duration", start.elapsed());
        counter!("petcare_appointments.created", 1);
        info!(
            appointment_id = header.id,
            total = %header.total,
            strategy = self.pricing.name(),
            "Appointment booked"
        );

        self.event_sender
            .publish(Event::AppointmentCreated {
                appointment_id: header.id,
                customer_id: header.customer_id,
                total: header.total,
            })
            .await;

        Ok((header.id, SUCCESS.to_string()))
    }

    async fn insert_booking(
        &self,
        input: &CreateAppointmentInput,
    ) -> Result<appointment::Model, ServiceError> {
        let service_ids: Vec<i32> = input.items.iter().map(|item| item.service_id).collect();

        let txn = begin_serializable(&*self.db).await?;

        let catalog = catalog_service::Entity::find()
            .filter(catalog_service::Column::Id.is_in(service_ids.clone()))
            .lock_shared()
            .all(&txn)
            .await?;

        if catalog.len() != service_ids.len() {
            let found: HashSet<i32> = catalog.iter().map(|row| row.id).collect();
            let missing: Vec<String> = service_ids
                .iter()
                .filter(|id| !found.contains(id))
                .map(ToString::to_string)
                .collect();
            warn!(missing = %missing.join(","), "Booking references unknown services");
            return Err(ServiceError::NotFound(format!(
                "Service(s) not found: {}",
                missing.join(", ")
            )));
        }

        let quote = self.pricing.price_items(&catalog, &input.items)?;
        quote.verify(&input.items).map_err(|e| {
            error!(strategy = self.pricing.name(), error = %e, "Pricing strategy broke its contract");
            e
        })?;

        let now = Utc::now();
        let header = appointment::ActiveModel {
            customer_id: Set(input.customer_id),
            branch_id: Set(input.branch_id),
            employee_id: Set(None),
            customer_address: Set(input.customer_address.clone()),
            scheduled_time: Set(input.scheduled_time),
            status: Set(AppointmentStatus::Pending),
            note: Set(input.note.clone()),
            total: Set(quote.total),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let lines = quote
            .lines
            .iter()
            .map(|line| appointment_detail::ActiveModel {
                appointment_id: Set(header.id),
                service_id: Set(line.service_id),
                unit_price_snapshot: Set(line.unit_price),
                quantity: Set(line.quantity),
            });
        appointment_detail::Entity::insert_many(lines)
            .exec_without_returning(&txn)
            .await?;

        commit(txn).await?;
        Ok(header)
    }

    #[instrument(skip(self))]
    pub async fn get_appointment(&self, id: i32) -> Result<appointment::Model, ServiceError> {
        appointment::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| not_found(id))
    }

    #[instrument(skip(self))]
    pub async fn get_appointments_by_customer(
        &self,
        customer_id: i32,
    ) -> Result<Vec<appointment::Model>, ServiceError> {
        Ok(appointment::Entity::find()
            .filter(appointment::Column::CustomerId.eq(customer_id))
            .order_by_asc(appointment::Column::ScheduledTime)
            .order_by_asc(appointment::Column::Id)
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn get_appointments_by_employee(
        &self,
        employee_id: i32,
    ) -> Result<Vec<appointment::Model>, ServiceError> {
        Ok(appointment::Entity::find()
            .filter(appointment::Column::EmployeeId.eq(employee_id))
            .order_by_asc(appointment::Column::ScheduledTime)
            .order_by_asc(appointment::Column::Id)
            .all(&*self.db)
            .await?)
    }

    /// Moves an appointment along one edge of the status graph. The write is
    /// conditional on the status read at the start, so of two racing callers
    /// exactly one wins. A caller that lost a lock race re-reads and sees the
    /// winner's status.
    #[instrument(skip(self))]
    pub async fn update_appointment_status(
        &self,
        id: i32,
        new_status: AppointmentStatus,
    ) -> Result<String, ServiceError> {
        let old_status =
            retry_on_conflict("update_appointment_status", &ConflictRetry::default(), || {
                self.write_status(id, new_status)
            })
            .await?;

        info!(from = %old_status, to = %new_status, "Appointment status updated");
        self.event_sender
            .publish(Event::AppointmentStatusChanged {
                appointment_id: id,
                old_status,
                new_status,
            })
            .await;

        Ok(SUCCESS.to_string())
    }

    async fn write_status(
        &self,
        id: i32,
        new_status: AppointmentStatus,
    ) -> Result<AppointmentStatus, ServiceError> {
        let txn = begin_serializable(&*self.db).await?;

        let current = appointment::Entity::find_by_id(id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| not_found(id))?;

        check_transition(current.status, new_status).map_err(|e| {
            warn!(from = %current.status, to = %new_status, "Illegal appointment transition");
            e
        })?;

        let result = appointment::Entity::update_many()
            .col_expr(appointment::Column::Status, Expr::value(new_status))
            .col_expr(appointment::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(appointment::Column::Id.eq(id))
            .filter(appointment::Column::Status.eq(current.status))
            .exec(&txn)
            .await?;

        if result.rows_affected == 0 {
            counter!("petcare_appointments.status.conflict", 1);
            warn!(expected = %current.status, "Appointment changed concurrently");
            return Err(ServiceError::FailedPrecondition(format!(
                "Appointment {} is no longer {}",
                id, current.status
            )));
        }

        commit(txn).await?;
        Ok(current.status)
    }

    /// Records which employee handles a live appointment.
    #[instrument(skip(self))]
    pub async fn assign_employee(&self, id: i32, employee_id: i32) -> Result<String, ServiceError> {
        if employee_id < 1 {
            return Err(ServiceError::InvalidInput(format!(
                "employee_id must be positive, got {}",
                employee_id
            )));
        }

        retry_on_conflict("assign_employee", &ConflictRetry::default(), || {
            self.write_employee(id, employee_id)
        })
        .await?;

        info!(employee_id, "Employee assigned");
        self.event_sender
            .publish(Event::AppointmentEmployeeAssigned {
                appointment_id: id,
                employee_id,
            })
            .await;

        Ok(SUCCESS.to_string())
    }

    async fn write_employee(&self, id: i32, employee_id: i32) -> Result<(), ServiceError> {
        let txn = begin_serializable(&*self.db).await?;

        let current = appointment::Entity::find_by_id(id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| not_found(id))?;

        if current.status.is_terminal() {
            warn!(status = %current.status, "Cannot assign employee to a closed appointment");
            return Err(ServiceError::FailedPrecondition(format!(
                "Appointment {} is {}",
                id, current.status
            )));
        }

        let result = appointment::Entity::update_many()
            .col_expr(appointment::Column::EmployeeId, Expr::value(employee_id))
            .col_expr(appointment::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(appointment::Column::Id.eq(id))
            .filter(appointment::Column::Status.eq(current.status))
            .exec(&txn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::FailedPrecondition(format!(
                "Appointment {} is no longer {}",
                id, current.status
            )));
        }

        commit(txn).await
    }

    /// Header plus lines. Lines carry their snapshotted prices and the
    /// service's current name and description.
    #[instrument(skip(self))]
    pub async fn get_appointment_details(&self, id: i32) -> Result<AppointmentDetails, ServiceError> {
        let appointment = self.get_appointment(id).await?;

        let rows = appointment_detail::Entity::find()
            .filter(appointment_detail::Column::AppointmentId.eq(id))
            .order_by_asc(appointment_detail::Column::ServiceId)
            .find_also_related(catalog_service::Entity)
            .all(&*self.db)
            .await?;

        let lines = rows
            .into_iter()
            .map(|(line, service)| {
                let (service_name, service_description) = service
                    .map(|s| (s.name, s.description))
                    .unwrap_or_default();
                AppointmentLine {
                    service_id: line.service_id,
                    service_name,
                    service_description,
                    unit_price: line.unit_price_snapshot,
                    quantity: line.quantity,
                }
            })
            .collect();

        Ok(AppointmentDetails { appointment, lines })
    }

    /// Administrative removal. Lines go with the header; appointments with
    /// an open payment stay.
    #[instrument(skip(self))]
    pub async fn delete_appointment(&self, id: i32) -> Result<String, ServiceError> {
        retry_on_conflict("delete_appointment", &ConflictRetry::default(), || {
            self.remove_appointment(id)
        })
        .await?;

        info!("Appointment deleted");
        self.event_sender.publish(Event::AppointmentDeleted(id)).await;
        Ok(SUCCESS.to_string())
    }

    async fn remove_appointment(&self, id: i32) -> Result<(), ServiceError> {
        let txn = begin_serializable(&*self.db).await?;

        appointment::Entity::find_by_id(id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| not_found(id))?;

        let open_payments = payment::Entity::find()
            .filter(payment::Column::AppointmentId.eq(id))
            .filter(payment::Column::Status.is_in([PaymentStatus::Pending, PaymentStatus::Failed]))
            .count(&txn)
            .await?;
        if open_payments > 0 {
            warn!(open_payments, "Refusing to delete appointment with open payments");
            return Err(ServiceError::FailedPrecondition(format!(
                "Appointment {} has {} open payment(s)",
                id, open_payments
            )));
        }

        appointment::Entity::delete_by_id(id).exec(&txn).await?;
        commit(txn).await
    }
}

fn not_found(id: i32) -> ServiceError {
    ServiceError::NotFound(format!("Appointment {} not found", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn input(items: Vec<RequestedItem>) -> CreateAppointmentInput {
        CreateAppointmentInput {
            customer_id: 1,
            branch_id: 2,
            customer_address: "x".into(),
            scheduled_time: Utc.with_ymd_and_hms(2025, 3, 7, 10, 0, 0).unwrap(),
            items,
            note: String::new(),
        }
    }

    fn item(service_id: i32, quantity: i32) -> RequestedItem {
        RequestedItem {
            service_id,
            quantity,
        }
    }

    #[test]
    fn accepts_well_formed_request() {
        assert!(input(vec![item(7, 2), item(9, 1)]).validate().is_ok());
    }

    #[test]
    fn rejects_empty_items() {
        assert!(input(vec![]).validate().is_err());
    }

    #[test]
    fn rejects_non_positive_quantity() {
        assert!(input(vec![item(7, 0)]).validate().is_err());
        assert!(input(vec![item(7, -3)]).validate().is_err());
    }

    #[test]
    fn rejects_repeated_service() {
        assert!(input(vec![item(7, 1), item(7, 2)]).validate().is_err());
    }

    #[test]
    fn line_subtotal() {
        let line = AppointmentLine {
            service_id: 7,
            service_name: "Bath".into(),
            service_description: String::new(),
            unit_price: Decimal::new(10050, 2),
            quantity: 2,
        };
        assert_eq!(line.subtotal().unwrap(), Decimal::new(20100, 2));
    }
}
