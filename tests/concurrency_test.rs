mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use common::{booking, TestApp};
use futures::future::join_all;
use petcare_api::{
    entities::{
        appointment::{self, AppointmentStatus},
        appointment_detail, catalog_service,
        payment::{PaymentMethod, PaymentStatus, SettlementTarget},
    },
    errors::{grpc::IntoGrpcStatus, ServiceError},
    services::{
        catalog::UpdateServiceInput,
        pricing::{PricingStrategy, Quote, RequestedItem, Standard},
    },
};
use rust_decimal_macros::dec;
use sea_orm::{EntityTrait, PaginatorTrait};
use tokio::sync::Notify;
use tonic::Code;

/// Standard pricing that signals once the catalog rows are loaded and then
/// holds the booking open for a while.
#[derive(Debug)]
struct SlowPricing {
    reached: Arc<Notify>,
    hold: Duration,
}

impl PricingStrategy for SlowPricing {
    fn name(&self) -> &'static str {
        "slow"
    }

    fn price_items(
        &self,
        catalog: &[catalog_service::Model],
        items: &[RequestedItem],
    ) -> Result<Quote, ServiceError> {
        self.reached.notify_one();
        std::thread::sleep(self.hold);
        Standard.price_items(catalog, items)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn price_change_during_booking_does_not_leak_into_snapshot() {
    let reached = Arc::new(Notify::new());
    let app = TestApp::on_disk_with_pricing(Arc::new(SlowPricing {
        reached: reached.clone(),
        hold: Duration::from_millis(200),
    }))
    .await;
    let bath = app.seed_service("Bath", dec!(100)).await;
    let trim = app.seed_service("Nail trim", dec!(50)).await;

    let appointments = app.services.appointments.clone();
    let booking_task = tokio::spawn(async move {
        appointments
            .create_appointment(booking(1, &[(bath, 2), (trim, 1)]))
            .await
    });

    reached.notified().await;
    let catalog = app.services.catalog.clone();
    let update_task = tokio::spawn(async move {
        catalog
            .update_service(
                bath,
                UpdateServiceInput {
                    price: Some(dec!(999)),
                    ..Default::default()
                },
            )
            .await
    });

    let (id, _) = booking_task.await.unwrap().expect("booking commits");
    update_task.await.unwrap().expect("price update commits");

    let details = app
        .services
        .appointments
        .get_appointment_details(id)
        .await
        .unwrap();
    assert_eq!(details.appointment.total, dec!(250));
    assert_eq!(details.lines[0].unit_price, dec!(100));
    assert_eq!(details.lines[1].unit_price, dec!(50));
    assert_eq!(
        app.services.catalog.get_service(bath).await.unwrap().price,
        dec!(999)
    );

    let later = app.book(2, &[(bath, 1)]).await;
    assert_eq!(
        app.services.appointments.get_appointment(later).await.unwrap().total,
        dec!(999)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_bookings_all_commit() {
    let app = TestApp::on_disk().await;
    let bath = app.seed_service("Bath", dec!(100)).await;
    let trim = app.seed_service("Nail trim", dec!(50)).await;

    let handles: Vec<_> = (1..=8)
        .map(|customer| {
            let appointments = app.services.appointments.clone();
            tokio::spawn(async move {
                appointments
                    .create_appointment(booking(customer, &[(bath, 2), (trim, 1)]))
                    .await
            })
        })
        .collect();

    for result in join_all(handles).await {
        result.unwrap().expect("every booking commits");
    }

    let headers = appointment::Entity::find()
        .count(app.db.as_ref())
        .await
        .unwrap();
    let lines = appointment_detail::Entity::find()
        .count(app.db.as_ref())
        .await
        .unwrap();
    assert_eq!(headers, 8);
    assert_eq!(lines, 16);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_status_updates_have_one_winner() {
    let app = TestApp::on_disk().await;
    let bath = app.seed_service("Bath", dec!(100)).await;
    let id = app.book(1, &[(bath, 1)]).await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let appointments = app.services.appointments.clone();
            tokio::spawn(async move {
                appointments
                    .update_appointment_status(id, AppointmentStatus::InProgress)
                    .await
            })
        })
        .collect();

    let mut winners = 0;
    for result in join_all(handles).await {
        match result.unwrap() {
            Ok(_) => winners += 1,
            Err(e) => {
                assert_matches!(
                    e,
                    ServiceError::InvalidTransition { .. } | ServiceError::FailedPrecondition(_)
                );
                assert_eq!(e.into_grpc_status().code(), Code::FailedPrecondition);
            }
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(
        app.services.appointments.get_appointment(id).await.unwrap().status,
        AppointmentStatus::InProgress
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn duplicate_webhooks_all_succeed() {
    let app = TestApp::on_disk().await;
    let id = app
        .create_payment(SettlementTarget::Order(42), dec!(250), PaymentMethod::Bank)
        .await;
    app.services.payments.create_payment_url(id).await.unwrap();
    let order_code = app
        .services
        .payments
        .get_payment_info(id)
        .await
        .unwrap()
        .external_order_code
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let payments = app.services.payments.clone();
            tokio::spawn(async move {
                payments
                    .update_bank_payment_status(order_code, PaymentStatus::Completed)
                    .await
            })
        })
        .collect();

    for result in join_all(handles).await {
        result.unwrap().expect("redelivery is acknowledged");
    }
    assert_eq!(
        app.services.payments.get_payment_info(id).await.unwrap().status,
        PaymentStatus::Completed
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn completion_and_cancellation_race_to_one_outcome() {
    let app = TestApp::on_disk().await;
    let id = app
        .create_payment(SettlementTarget::Order(42), dec!(250), PaymentMethod::Bank)
        .await;
    app.services.payments.create_payment_url(id).await.unwrap();
    let order_code = app
        .services
        .payments
        .get_payment_info(id)
        .await
        .unwrap()
        .external_order_code
        .unwrap();

    let webhook = {
        let payments = app.services.payments.clone();
        tokio::spawn(async move {
            payments
                .update_bank_payment_status(order_code, PaymentStatus::Completed)
                .await
        })
    };
    let admin = {
        let payments = app.services.payments.clone();
        tokio::spawn(async move {
            payments
                .update_payment_status(id, PaymentStatus::Cancelled)
                .await
        })
    };

    let webhook = webhook.await.unwrap();
    let admin = admin.await.unwrap();
    assert!(
        webhook.is_ok() != admin.is_ok(),
        "exactly one side wins: webhook={:?} admin={:?}",
        webhook,
        admin
    );

    let loser = webhook.as_ref().err().or(admin.as_ref().err()).unwrap();
    assert_matches!(loser, ServiceError::InvalidTransition { .. });

    let expected = if webhook.is_ok() {
        PaymentStatus::Completed
    } else {
        PaymentStatus::Cancelled
    };
    assert_eq!(
        app.services.payments.get_payment_info(id).await.unwrap().status,
        expected
    );
}
