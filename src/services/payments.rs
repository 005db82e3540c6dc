use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use validator::{Validate, ValidationError};

use crate::{
    checkout::{
        CancelOutcome, CheckoutLink, CheckoutLinkRequest, CheckoutProvider, OrderCodeGenerator,
    },
    db::{begin_serializable, commit, retry_on_conflict, ConflictRetry, DbPool},
    entities::{
        appointment,
        payment::{self, PaymentMethod, PaymentStatus, SettlementTarget},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        appointments::SUCCESS,
        payment_status::{evaluate, PaymentTrigger, Verdict},
        pricing::MAX_TOTAL,
    },
};

fn validate_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if *amount <= Decimal::ZERO {
        return Err(ValidationError::new("amount_must_be_positive"));
    }
    if *amount > MAX_TOTAL {
        return Err(ValidationError::new("amount_too_large"));
    }
    Ok(())
}

fn validate_target(target: &SettlementTarget) -> Result<(), ValidationError> {
    let id = match target {
        SettlementTarget::Order(id) | SettlementTarget::Appointment(id) => *id,
    };
    if id < 1 {
        return Err(ValidationError::new("target_id_must_be_positive"));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreatePaymentInput {
    #[validate(custom = "validate_target")]
    pub target: SettlementTarget,
    #[validate(custom = "validate_amount")]
    pub amount: Decimal,
    #[validate(length(max = 255))]
    pub description: String,
    pub method: PaymentMethod,
}

/// Where the hosted checkout page sends the customer afterwards.
#[derive(Debug, Clone, Default)]
pub struct CheckoutUrls {
    pub return_url: String,
    pub cancel_url: String,
}

/// Owns the payment state machine and the checkout links attached to it.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    provider: Arc<dyn CheckoutProvider>,
    order_codes: Arc<OrderCodeGenerator>,
    urls: CheckoutUrls,
}

impl PaymentService {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        provider: Arc<dyn CheckoutProvider>,
        urls: CheckoutUrls,
    ) -> Self {
        Self {
            db,
            event_sender,
            provider,
            order_codes: Arc::new(OrderCodeGenerator::new()),
            urls,
        }
    }

    #[instrument(skip(self, input), fields(target = ?input.target, amount = %input.amount))]
    pub async fn create_payment(&self, input: CreatePaymentInput) -> Result<i32, ServiceError> {
        input.validate().map_err(|e| {
            warn!(error = %e, "Rejected payment request");
            ServiceError::from(e)
        })?;

        let model = retry_on_conflict("create_payment", &ConflictRetry::default(), || {
            self.insert_payment(&input)
        })
        .await?;

        counter!("petcare_payments.created", 1);
        info!(payment_id = model.id, method = %model.method, "Payment created");
        self.event_sender
            .publish(Event::PaymentCreated {
                payment_id: model.id,
                amount: model.amount,
            })
            .await;

        Ok(model.id)
    }

    async fn insert_payment(
        &self,
        input: &CreatePaymentInput,
    ) -> Result<payment::Model, ServiceError> {
        let txn = begin_serializable(&*self.db).await?;

        if let SettlementTarget::Appointment(appointment_id) = input.target {
            appointment::Entity::find_by_id(appointment_id)
                .lock_shared()
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Appointment {} not found", appointment_id))
                })?;
        }

        let (order_id, appointment_id) = input.target.into_columns();
        let now = Utc::now();
        let model = payment::ActiveModel {
            order_id: Set(order_id),
            appointment_id: Set(appointment_id),
            amount: Set(input.amount),
            description: Set(input.description.clone()),
            status: Set(PaymentStatus::Pending),
            method: Set(input.method),
            external_order_code: Set(None),
            external_link_id: Set(None),
            checkout_url: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        commit(txn).await?;
        Ok(model)
    }

    #[instrument(skip(self))]
    pub async fn get_payment_info(&self, id: i32) -> Result<payment::Model, ServiceError> {
        payment::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| not_found(id))
    }

    /// Opens a hosted checkout link for a bank payment.
    ///
    /// A pending payment that already has a link gets that link back. A
    /// failed payment gets a fresh order code and link and returns to
    /// pending. The provider is called while the row is locked; if it fails
    /// nothing is written.
    #[instrument(skip(self))]
    pub async fn create_payment_url(&self, id: i32) -> Result<CheckoutLink, ServiceError> {
        let txn = begin_serializable(&*self.db).await?;
        let current = lock_payment(&txn, id).await?;

        if current.status == PaymentStatus::Pending {
            if let Some((link_id, checkout_url)) = current.link() {
                info!(%link_id, "Returning existing checkout link");
                return Ok(CheckoutLink {
                    link_id,
                    checkout_url,
                });
            }
        }

        let next_status = match evaluate(current.status, PaymentTrigger::CreateLink) {
            Verdict::Apply(status) => status,
            Verdict::AlreadyApplied | Verdict::Reject => {
                warn!(status = %current.status, "Cannot open a checkout link");
                return Err(ServiceError::FailedPrecondition(format!(
                    "Payment {} is {}",
                    id, current.status
                )));
            }
        };
        if current.method != PaymentMethod::Bank {
            return Err(ServiceError::FailedPrecondition(format!(
                "Payment {} is paid by {}, checkout links are for {}",
                id,
                current.method,
                PaymentMethod::Bank
            )));
        }

        let order_code = self.order_codes.next_code();
        let description = if current.description.is_empty() {
            format!("Payment {}", id)
        } else {
            current.description.clone()
        };
        let request = CheckoutLinkRequest {
            order_code,
            amount: current.amount,
            description,
            cancel_url: self.urls.cancel_url.clone(),
            return_url: self.urls.return_url.clone(),
        };

        let link = self.provider.create_link(&request).await.map_err(|e| {
            error!(order_code, error = %e, "Checkout link creation failed");
            counter!("petcare_payments.link.create_failed", 1);
            ServiceError::from(e)
        })?;

        let result = payment::Entity::update_many()
            .col_expr(payment::Column::Status, Expr::value(next_status))
            .col_expr(payment::Column::ExternalOrderCode, Expr::value(order_code))
            .col_expr(payment::Column::ExternalLinkId, Expr::value(link.link_id.clone()))
            .col_expr(payment::Column::CheckoutUrl, Expr::value(link.checkout_url.clone()))
            .col_expr(payment::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(payment::Column::Id.eq(id))
            .filter(payment::Column::Status.eq(current.status))
            .filter(match current.external_order_code {
                Some(code) => payment::Column::ExternalOrderCode.eq(code),
                None => payment::Column::ExternalOrderCode.is_null(),
            })
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::FailedPrecondition(format!(
                "Payment {} changed while its link was being created",
                id
            )));
        }

        commit(txn).await?;

        counter!("petcare_payments.link.created", 1);
        info!(order_code, link_id = %link.link_id, "Checkout link attached");
        self.event_sender
            .publish(Event::PaymentLinkCreated {
                payment_id: id,
                order_code,
            })
            .await;
        if next_status != current.status {
            self.event_sender
                .publish(Event::PaymentStatusChanged {
                    payment_id: id,
                    old_status: current.status,
                    new_status: next_status,
                })
                .await;
        }

        Ok(link)
    }

    /// Cancels the open checkout link and settles the payment on whatever the
    /// provider reports: cancelled, or completed if the customer got there
    /// first. Returns the payment's resulting status.
    #[instrument(skip(self, reason))]
    pub async fn cancel_payment_link(
        &self,
        id: i32,
        reason: &str,
    ) -> Result<PaymentStatus, ServiceError> {
        if reason.chars().count() > 255 {
            return Err(ServiceError::InvalidInput(
                "cancellation reason is limited to 255 characters".into(),
            ));
        }

        let current = self.get_payment_info(id).await?;
        let order_code = match (current.status, current.external_order_code) {
            (PaymentStatus::Pending, Some(code)) => code,
            _ => {
                warn!(status = %current.status, "No active checkout link to cancel");
                return Err(ServiceError::FailedPrecondition(format!(
                    "Payment {} has no active checkout link",
                    id
                )));
            }
        };

        // The provider decides how this ends, so ask it before touching the row.
        let outcome = self
            .provider
            .cancel_link(order_code, reason)
            .await
            .map_err(|e| {
                error!(order_code, error = %e, "Checkout link cancellation failed");
                counter!("petcare_payments.link.cancel_failed", 1);
                ServiceError::from(e)
            })?;

        let target = match outcome {
            CancelOutcome::Cancelled | CancelOutcome::AlreadyCancelled => PaymentStatus::Cancelled,
            CancelOutcome::AlreadyPaid => PaymentStatus::Completed,
        };

        let (previous, changed) =
            retry_on_conflict("cancel_payment_link", &ConflictRetry::default(), || {
                self.settle_cancelled_link(id, order_code, target)
            })
            .await?;

        info!(order_code, ?outcome, status = %target, "Checkout link closed");
        self.event_sender
            .publish(Event::PaymentLinkCancelled {
                payment_id: id,
                order_code,
            })
            .await;
        if changed {
            self.publish_status_change(id, previous, target).await;
        }

        Ok(target)
    }

    async fn settle_cancelled_link(
        &self,
        id: i32,
        order_code: i64,
        target: PaymentStatus,
    ) -> Result<(PaymentStatus, bool), ServiceError> {
        let txn = begin_serializable(&*self.db).await?;
        let locked = lock_payment(&txn, id).await?;
        if locked.external_order_code != Some(order_code) {
            return Err(ServiceError::FailedPrecondition(format!(
                "Payment {} was relinked during cancellation",
                id
            )));
        }
        let changed = self.apply_status(&txn, &locked, target).await?;
        commit(txn).await?;
        Ok((locked.status, changed))
    }

    /// Administrative status change. Bank payments can only be completed by
    /// the provider's confirmation.
    #[instrument(skip(self))]
    pub async fn update_payment_status(
        &self,
        id: i32,
        new_status: PaymentStatus,
    ) -> Result<String, ServiceError> {
        reject_pending_target(new_status)?;

        let (previous, changed) =
            retry_on_conflict("update_payment_status", &ConflictRetry::default(), || {
                self.write_admin_status(id, new_status)
            })
            .await?;

        if changed {
            info!(from = %previous, to = %new_status, "Payment status updated");
            self.publish_status_change(id, previous, new_status).await;
        }
        Ok(SUCCESS.to_string())
    }

    async fn write_admin_status(
        &self,
        id: i32,
        new_status: PaymentStatus,
    ) -> Result<(PaymentStatus, bool), ServiceError> {
        let txn = begin_serializable(&*self.db).await?;
        let current = lock_payment(&txn, id).await?;

        if new_status == PaymentStatus::Completed
            && current.method == PaymentMethod::Bank
            && current.status != PaymentStatus::Completed
        {
            warn!("Bank payment completion must come from the checkout provider");
            return Err(ServiceError::FailedPrecondition(format!(
                "Payment {} is a bank payment and completes through checkout confirmation",
                id
            )));
        }

        let changed = self.apply_status(&txn, &current, new_status).await?;
        commit(txn).await?;
        Ok((current.status, changed))
    }

    /// Webhook reconciliation keyed by the order code the provider echoes.
    /// Redelivering a status the payment already has is a no-op.
    #[instrument(skip(self))]
    pub async fn update_bank_payment_status(
        &self,
        order_code: i64,
        new_status: PaymentStatus,
    ) -> Result<String, ServiceError> {
        reject_pending_target(new_status)?;

        let (current, changed) =
            retry_on_conflict("update_bank_payment_status", &ConflictRetry::default(), || {
                self.write_bank_status(order_code, new_status)
            })
            .await?;

        if changed {
            counter!("petcare_payments.webhook.applied", 1);
            info!(payment_id = current.id, from = %current.status, to = %new_status, "Bank payment reconciled");
            self.publish_status_change(current.id, current.status, new_status)
                .await;
        } else {
            counter!("petcare_payments.webhook.duplicate", 1);
            info!(payment_id = current.id, status = %new_status, "Duplicate bank payment notification");
        }
        Ok(SUCCESS.to_string())
    }

    async fn write_bank_status(
        &self,
        order_code: i64,
        new_status: PaymentStatus,
    ) -> Result<(payment::Model, bool), ServiceError> {
        let txn = begin_serializable(&*self.db).await?;
        let current = payment::Entity::find()
            .filter(payment::Column::ExternalOrderCode.eq(order_code))
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("No payment for order code {}", order_code))
            })?;

        let changed = self.apply_status(&txn, &current, new_status).await?;
        commit(txn).await?;
        Ok((current, changed))
    }

    /// Switching to cash is refused once a checkout link exists, since the
    /// link can only be paid by bank.
    #[instrument(skip(self))]
    pub async fn update_payment_method(
        &self,
        id: i32,
        new_method: PaymentMethod,
    ) -> Result<String, ServiceError> {
        let previous = retry_on_conflict("update_payment_method", &ConflictRetry::default(), || {
            self.write_method(id, new_method)
        })
        .await?;

        if previous != new_method {
            info!(from = %previous, to = %new_method, "Payment method updated");
        }
        Ok(SUCCESS.to_string())
    }

    async fn write_method(
        &self,
        id: i32,
        new_method: PaymentMethod,
    ) -> Result<PaymentMethod, ServiceError> {
        let txn = begin_serializable(&*self.db).await?;
        let current = lock_payment(&txn, id).await?;

        require_pending(&current, PaymentTrigger::UpdateMethod)?;
        if new_method == current.method {
            return Ok(current.method);
        }
        if new_method == PaymentMethod::Cash && current.external_order_code.is_some() {
            return Err(ServiceError::FailedPrecondition(format!(
                "Payment {} has a checkout link; cancel it before switching to {}",
                id, new_method
            )));
        }

        let result = payment::Entity::update_many()
            .col_expr(payment::Column::Method, Expr::value(new_method))
            .col_expr(payment::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(payment::Column::Id.eq(id))
            .filter(payment::Column::Status.eq(current.status))
            .exec(&txn)
            .await?;
        ensure_applied(result.rows_affected, id)?;
        commit(txn).await?;
        Ok(current.method)
    }

    /// Amounts are fixed once a checkout link has been issued for them.
    #[instrument(skip(self))]
    pub async fn update_payment_amount(
        &self,
        id: i32,
        new_amount: Decimal,
    ) -> Result<String, ServiceError> {
        if new_amount <= Decimal::ZERO {
            return Err(ServiceError::InvalidInput(format!(
                "amount must be positive, got {}",
                new_amount
            )));
        }
        if new_amount > MAX_TOTAL {
            return Err(ServiceError::InvalidInput(format!(
                "amount {} exceeds the maximum of {}",
                new_amount, MAX_TOTAL
            )));
        }

        let previous = retry_on_conflict("update_payment_amount", &ConflictRetry::default(), || {
            self.write_amount(id, new_amount)
        })
        .await?;

        info!(from = %previous, to = %new_amount, "Payment amount updated");
        Ok(SUCCESS.to_string())
    }

    async fn write_amount(&self, id: i32, new_amount: Decimal) -> Result<Decimal, ServiceError> {
        let txn = begin_serializable(&*self.db).await?;
        let current = lock_payment(&txn, id).await?;

        require_pending(&current, PaymentTrigger::UpdateAmount)?;
        if current.external_order_code.is_some() && new_amount != current.amount {
            return Err(ServiceError::FailedPrecondition(format!(
                "Payment {} has a checkout link for {}",
                id, current.amount
            )));
        }

        let result = payment::Entity::update_many()
            .col_expr(payment::Column::Amount, Expr::value(new_amount))
            .col_expr(payment::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(payment::Column::Id.eq(id))
            .filter(payment::Column::Status.eq(current.status))
            .exec(&txn)
            .await?;
        ensure_applied(result.rows_affected, id)?;
        commit(txn).await?;
        Ok(current.amount)
    }

    /// Applies a status trigger to a locked row. Returns whether a row was
    /// written; `false` means the payment already had that status.
    async fn apply_status<C: ConnectionTrait>(
        &self,
        conn: &C,
        current: &payment::Model,
        to: PaymentStatus,
    ) -> Result<bool, ServiceError> {
        match evaluate(current.status, PaymentTrigger::SetStatus(to)) {
            Verdict::AlreadyApplied => Ok(false),
            Verdict::Reject => {
                warn!(payment_id = current.id, from = %current.status, %to, "Illegal payment transition");
                Err(ServiceError::invalid_transition(current.status, to))
            }
            Verdict::Apply(next) => {
                let result = payment::Entity::update_many()
                    .col_expr(payment::Column::Status, Expr::value(next))
                    .col_expr(payment::Column::UpdatedAt, Expr::value(Utc::now()))
                    .filter(payment::Column::Id.eq(current.id))
                    .filter(payment::Column::Status.eq(current.status))
                    .exec(conn)
                    .await?;
                if result.rows_affected > 0 {
                    return Ok(true);
                }

                // Lost a race; fine if the winner wrote the same status.
                let now = payment::Entity::find_by_id(current.id)
                    .one(conn)
                    .await?
                    .ok_or_else(|| not_found(current.id))?;
                if now.status == next {
                    Ok(false)
                } else {
                    Err(ServiceError::invalid_transition(now.status, next))
                }
            }
        }
    }

    async fn publish_status_change(&self, id: i32, old: PaymentStatus, new: PaymentStatus) {
        self.event_sender
            .publish(Event::PaymentStatusChanged {
                payment_id: id,
                old_status: old,
                new_status: new,
            })
            .await;
    }
}

async fn lock_payment<C: ConnectionTrait>(conn: &C, id: i32) -> Result<payment::Model, ServiceError> {
    payment::Entity::find_by_id(id)
        .lock_exclusive()
        .one(conn)
        .await?
        .ok_or_else(|| not_found(id))
}

fn require_pending(current: &payment::Model, trigger: PaymentTrigger) -> Result<(), ServiceError> {
    match evaluate(current.status, trigger) {
        Verdict::Apply(_) => Ok(()),
        _ => {
            warn!(payment_id = current.id, status = %current.status, ?trigger, "Payment is closed for edits");
            Err(ServiceError::FailedPrecondition(format!(
                "Payment {} is {}",
                current.id, current.status
            )))
        }
    }
}

fn reject_pending_target(status: PaymentStatus) -> Result<(), ServiceError> {
    if status == PaymentStatus::Pending {
        return Err(ServiceError::InvalidStatus(
            "a payment cannot be set back to PENDING".into(),
        ));
    }
    Ok(())
}

fn ensure_applied(rows_affected: u64, id: i32) -> Result<(), ServiceError> {
    if rows_affected == 0 {
        return Err(ServiceError::FailedPrecondition(format!(
            "Payment {} changed concurrently",
            id
        )));
    }
    Ok(())
}

fn not_found(id: i32) -> ServiceError {
    ServiceError::NotFound(format!("Payment {} not found", id))
}
