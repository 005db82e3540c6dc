mod common;

use assert_matches::assert_matches;
use common::{FakeFailure, TestApp};
use petcare_api::{
    checkout::CancelOutcome,
    entities::payment::{PaymentMethod, PaymentStatus, SettlementTarget},
    errors::ServiceError,
    services::{appointments::SUCCESS, payments::CreatePaymentInput},
};
use rust_decimal_macros::dec;
use sea_orm::{ConnectionTrait, Statement};

#[tokio::test]
async fn bank_payment_completes_through_webhook() {
    let app = TestApp::new().await;
    let payments = &app.services.payments;
    let id = app
        .create_payment(SettlementTarget::Order(42), dec!(250), PaymentMethod::Bank)
        .await;

    let created = payments.get_payment_info(id).await.unwrap();
    assert_eq!(created.status, PaymentStatus::Pending);
    assert_eq!(created.order_id, Some(42));
    assert_eq!(created.appointment_id, None);
    assert_eq!(created.external_order_code, None);

    let link = payments.create_payment_url(id).await.unwrap();
    let stored = payments.get_payment_info(id).await.unwrap();
    let order_code = stored.external_order_code.expect("order code stored");
    assert_eq!(stored.status, PaymentStatus::Pending);
    assert_eq!(stored.external_link_id.as_deref(), Some(link.link_id.as_str()));
    assert_eq!(stored.checkout_url.as_deref(), Some(link.checkout_url.as_str()));

    let sent = app.provider.created();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].order_code, order_code);
    assert_eq!(sent[0].amount, dec!(250));
    assert_eq!(sent[0].return_url, "https://petcare.test/return");

    assert_eq!(
        payments
            .update_bank_payment_status(order_code, PaymentStatus::Completed)
            .await
            .unwrap(),
        SUCCESS
    );
    assert_eq!(
        payments.get_payment_info(id).await.unwrap().status,
        PaymentStatus::Completed
    );

    // Redelivery of the same confirmation changes nothing.
    payments
        .update_bank_payment_status(order_code, PaymentStatus::Completed)
        .await
        .unwrap();
    assert_eq!(
        payments.get_payment_info(id).await.unwrap().status,
        PaymentStatus::Completed
    );
}

#[tokio::test]
async fn completed_payment_rejects_every_mutation() {
    let app = TestApp::new().await;
    let payments = &app.services.payments;
    let id = app
        .create_payment(SettlementTarget::Order(42), dec!(250), PaymentMethod::Cash)
        .await;
    payments
        .update_payment_status(id, PaymentStatus::Completed)
        .await
        .unwrap();

    assert_matches!(
        payments.update_payment_status(id, PaymentStatus::Failed).await,
        Err(ServiceError::InvalidTransition { .. })
    );
    assert_matches!(
        payments.update_payment_amount(id, dec!(300)).await,
        Err(ServiceError::FailedPrecondition(_))
    );
    assert_matches!(
        payments.update_payment_method(id, PaymentMethod::Bank).await,
        Err(ServiceError::FailedPrecondition(_))
    );
    assert_matches!(
        payments.create_payment_url(id).await,
        Err(ServiceError::FailedPrecondition(_))
    );

    let unchanged = payments.get_payment_info(id).await.unwrap();
    assert_eq!(unchanged.status, PaymentStatus::Completed);
    assert_eq!(unchanged.amount, dec!(250));
    assert_eq!(unchanged.method, PaymentMethod::Cash);
}

#[tokio::test]
async fn pending_is_never_a_target_status() {
    let app = TestApp::new().await;
    let id = app
        .create_payment(SettlementTarget::Order(42), dec!(250), PaymentMethod::Cash)
        .await;

    assert_matches!(
        app.services
            .payments
            .update_payment_status(id, PaymentStatus::Pending)
            .await,
        Err(ServiceError::InvalidStatus(_))
    );
}

#[tokio::test]
async fn cancelling_link_cancels_payment() {
    let app = TestApp::new().await;
    let payments = &app.services.payments;
    let id = app
        .create_payment(SettlementTarget::Order(42), dec!(250), PaymentMethod::Bank)
        .await;
    payments.create_payment_url(id).await.unwrap();
    let order_code = payments
        .get_payment_info(id)
        .await
        .unwrap()
        .external_order_code
        .unwrap();

    let status = payments
        .cancel_payment_link(id, "customer changed mind")
        .await
        .unwrap();
    assert_eq!(status, PaymentStatus::Cancelled);
    assert_eq!(
        app.provider.cancelled(),
        vec![(order_code, "customer changed mind".to_string())]
    );
    assert_eq!(
        payments.get_payment_info(id).await.unwrap().status,
        PaymentStatus::Cancelled
    );

    assert_matches!(
        payments.create_payment_url(id).await,
        Err(ServiceError::FailedPrecondition(_))
    );

    // A late success notification cannot resurrect it.
    assert_matches!(
        payments
            .update_bank_payment_status(order_code, PaymentStatus::Completed)
            .await,
        Err(ServiceError::InvalidTransition { .. })
    );
    assert_eq!(
        payments.get_payment_info(id).await.unwrap().status,
        PaymentStatus::Cancelled
    );
}

#[tokio::test]
async fn cancel_after_customer_paid_completes_payment() {
    let app = TestApp::new().await;
    let payments = &app.services.payments;
    let id = app
        .create_payment(SettlementTarget::Order(42), dec!(250), PaymentMethod::Bank)
        .await;
    payments.create_payment_url(id).await.unwrap();
    app.provider.cancel_with(CancelOutcome::AlreadyPaid);

    let status = payments.cancel_payment_link(id, "too slow").await.unwrap();
    assert_eq!(status, PaymentStatus::Completed);
    assert_eq!(
        payments.get_payment_info(id).await.unwrap().status,
        PaymentStatus::Completed
    );
}

#[tokio::test]
async fn cancel_requires_an_active_link() {
    let app = TestApp::new().await;
    let payments = &app.services.payments;
    let id = app
        .create_payment(SettlementTarget::Order(42), dec!(250), PaymentMethod::Bank)
        .await;

    assert_matches!(
        payments.cancel_payment_link(id, "nothing to cancel").await,
        Err(ServiceError::FailedPrecondition(_))
    );
    assert_matches!(
        payments.cancel_payment_link(id, &"x".repeat(256)).await,
        Err(ServiceError::InvalidInput(_))
    );
    assert!(app.provider.cancelled().is_empty());
}

#[tokio::test]
async fn provider_cancel_failure_leaves_payment_pending() {
    let app = TestApp::new().await;
    let payments = &app.services.payments;
    let id = app
        .create_payment(SettlementTarget::Order(42), dec!(250), PaymentMethod::Bank)
        .await;
    payments.create_payment_url(id).await.unwrap();
    app.provider.fail_cancel(Some(FakeFailure::Timeout));

    assert_matches!(
        payments.cancel_payment_link(id, "retry later").await,
        Err(ServiceError::ServiceUnavailable(_))
    );
    assert_eq!(
        payments.get_payment_info(id).await.unwrap().status,
        PaymentStatus::Pending
    );
}

#[tokio::test]
async fn payment_url_is_idempotent_while_pending() {
    let app = TestApp::new().await;
    let payments = &app.services.payments;
    let id = app
        .create_payment(SettlementTarget::Order(42), dec!(250), PaymentMethod::Bank)
        .await;

    let first = payments.create_payment_url(id).await.unwrap();
    let second = payments.create_payment_url(id).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(app.provider.created().len(), 1);
}

#[tokio::test]
async fn failed_payment_retries_with_fresh_order_code() {
    let app = TestApp::new().await;
    let payments = &app.services.payments;
    let id = app
        .create_payment(SettlementTarget::Order(42), dec!(250), PaymentMethod::Bank)
        .await;
    payments.create_payment_url(id).await.unwrap();
    let first_code = payments
        .get_payment_info(id)
        .await
        .unwrap()
        .external_order_code
        .unwrap();

    payments
        .update_bank_payment_status(first_code, PaymentStatus::Failed)
        .await
        .unwrap();
    assert_eq!(
        payments.get_payment_info(id).await.unwrap().status,
        PaymentStatus::Failed
    );

    let retry = payments.create_payment_url(id).await.unwrap();
    let retried = payments.get_payment_info(id).await.unwrap();
    let second_code = retried.external_order_code.unwrap();
    assert_ne!(first_code, second_code);
    assert_eq!(retried.status, PaymentStatus::Pending);
    assert_eq!(retried.external_link_id, Some(retry.link_id));

    // The first link's code no longer points at anything.
    assert_matches!(
        payments
            .update_bank_payment_status(first_code, PaymentStatus::Completed)
            .await,
        Err(ServiceError::NotFound(_))
    );
    payments
        .update_bank_payment_status(second_code, PaymentStatus::Completed)
        .await
        .unwrap();
}

#[tokio::test]
async fn provider_failure_leaves_payment_untouched() {
    let app = TestApp::new().await;
    let payments = &app.services.payments;
    let id = app
        .create_payment(SettlementTarget::Order(42), dec!(250), PaymentMethod::Bank)
        .await;

    app.provider.fail_create(Some(FakeFailure::Rejected));
    assert_matches!(
        payments.create_payment_url(id).await,
        Err(ServiceError::ExternalServiceError(_))
    );
    app.provider.fail_create(Some(FakeFailure::Timeout));
    assert_matches!(
        payments.create_payment_url(id).await,
        Err(ServiceError::ServiceUnavailable(_))
    );

    let unchanged = payments.get_payment_info(id).await.unwrap();
    assert_eq!(unchanged.status, PaymentStatus::Pending);
    assert_eq!(unchanged.external_order_code, None);
    assert_eq!(unchanged.checkout_url, None);

    app.provider.fail_create(None);
    payments.create_payment_url(id).await.unwrap();
}

#[tokio::test]
async fn cash_payments_have_no_checkout_link() {
    let app = TestApp::new().await;
    let id = app
        .create_payment(SettlementTarget::Order(42), dec!(250), PaymentMethod::Cash)
        .await;

    assert_matches!(
        app.services.payments.create_payment_url(id).await,
        Err(ServiceError::FailedPrecondition(_))
    );
    assert!(app.provider.created().is_empty());
}

#[tokio::test]
async fn bank_completion_must_come_from_provider() {
    let app = TestApp::new().await;
    let payments = &app.services.payments;
    let bank = app
        .create_payment(SettlementTarget::Order(42), dec!(250), PaymentMethod::Bank)
        .await;
    let cash = app
        .create_payment(SettlementTarget::Order(43), dec!(80), PaymentMethod::Cash)
        .await;

    assert_matches!(
        payments
            .update_payment_status(bank, PaymentStatus::Completed)
            .await,
        Err(ServiceError::FailedPrecondition(_))
    );
    payments
        .update_payment_status(cash, PaymentStatus::Completed)
        .await
        .unwrap();

    // Administrative cancel of a bank payment is still allowed.
    payments
        .update_payment_status(bank, PaymentStatus::Cancelled)
        .await
        .unwrap();
    assert_eq!(
        payments.get_payment_info(bank).await.unwrap().status,
        PaymentStatus::Cancelled
    );
}

#[tokio::test]
async fn method_and_amount_edits_while_pending() {
    let app = TestApp::new().await;
    let payments = &app.services.payments;
    let id = app
        .create_payment(SettlementTarget::Order(42), dec!(250), PaymentMethod::Cash)
        .await;

    payments.update_payment_amount(id, dec!(300)).await.unwrap();
    payments
        .update_payment_method(id, PaymentMethod::Bank)
        .await
        .unwrap();
    assert_matches!(
        payments.update_payment_amount(id, dec!(0)).await,
        Err(ServiceError::InvalidInput(_))
    );

    payments.create_payment_url(id).await.unwrap();
    assert_eq!(app.provider.created()[0].amount, dec!(300));

    // Once a link exists the amount is frozen and cash is out.
    assert_matches!(
        payments.update_payment_amount(id, dec!(320)).await,
        Err(ServiceError::FailedPrecondition(_))
    );
    assert_matches!(
        payments.update_payment_method(id, PaymentMethod::Cash).await,
        Err(ServiceError::FailedPrecondition(_))
    );

    let stored = payments.get_payment_info(id).await.unwrap();
    assert_eq!(stored.amount, dec!(300));
    assert_eq!(stored.method, PaymentMethod::Bank);
}

#[tokio::test]
async fn payment_for_missing_appointment_is_rejected() {
    let app = TestApp::new().await;

    let result = app
        .services
        .payments
        .create_payment(CreatePaymentInput {
            target: SettlementTarget::Appointment(777),
            amount: dec!(100),
            description: String::new(),
            method: PaymentMethod::Cash,
        })
        .await;
    assert_matches!(result, Err(ServiceError::NotFound(_)));

    let result = app
        .services
        .payments
        .create_payment(CreatePaymentInput {
            target: SettlementTarget::Order(42),
            amount: dec!(-5),
            description: String::new(),
            method: PaymentMethod::Cash,
        })
        .await;
    assert_matches!(result, Err(ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn storage_enforces_exactly_one_target() {
    let app = TestApp::new().await;
    let backend = app.db.get_database_backend();

    for (order_id, appointment_id) in [("1", "1"), ("NULL", "NULL")] {
        let sql = format!(
            "INSERT INTO payments (order_id, appointment_id, amount, description, status, method, created_at, updated_at) \
             VALUES ({}, {}, 10, '', 'PENDING', 'CASH', '2025-03-07 10:00:00', '2025-03-07 10:00:00')",
            order_id, appointment_id
        );
        let result = app
            .db
            .execute(Statement::from_string(backend, sql))
            .await;
        assert!(result.is_err(), "({}, {}) must be rejected", order_id, appointment_id);
    }
}

#[tokio::test]
async fn missing_payment_is_not_found() {
    let app = TestApp::new().await;
    let payments = &app.services.payments;

    assert_matches!(payments.get_payment_info(9).await, Err(ServiceError::NotFound(_)));
    assert_matches!(payments.create_payment_url(9).await, Err(ServiceError::NotFound(_)));
    assert_matches!(
        payments.update_payment_status(9, PaymentStatus::Failed).await,
        Err(ServiceError::NotFound(_))
    );
    assert_matches!(
        payments
            .update_bank_payment_status(123_456, PaymentStatus::Completed)
            .await,
        Err(ServiceError::NotFound(_))
    );
}
