use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::entities::{appointment::AppointmentStatus, payment::PaymentStatus};

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event after a commit. Delivery problems are logged, never returned.
    pub async fn publish(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "Dropping domain event");
        }
    }
}

// Domain events published after a successful commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // Catalog events
    ServiceCreated(i32),
    ServicePriceChanged {
        service_id: i32,
        old_price: Decimal,
        new_price: Decimal,
    },
    ServiceDeleted(i32),

    // Appointment events
    AppointmentCreated {
        appointment_id: i32,
        customer_id: i32,
        total: Decimal,
    },
    AppointmentStatusChanged {
        appointment_id: i32,
        old_status: AppointmentStatus,
        new_status: AppointmentStatus,
    },
    AppointmentEmployeeAssigned {
        appointment_id: i32,
        employee_id: i32,
    },
    AppointmentDeleted(i32),

    // Payment events
    PaymentCreated {
        payment_id: i32,
        amount: Decimal,
    },
    PaymentStatusChanged {
        payment_id: i32,
        old_status: PaymentStatus,
        new_status: PaymentStatus,
    },
    PaymentLinkCreated {
        payment_id: i32,
        order_code: i64,
    },
    PaymentLinkCancelled {
        payment_id: i32,
        order_code: i64,
    },
}

// Drains the event channel. There are no subscribers beyond the log yet.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::PaymentStatusChanged {
                payment_id,
                new_status: PaymentStatus::Failed,
                ..
            } => {
                warn!(payment_id, "Payment failed");
            }
            Event::ServicePriceChanged {
                service_id,
                old_price,
                new_price,
            } => {
                info!(service_id, %old_price, %new_price, "Catalog price changed");
            }
            _ => {
                info!("Received event: {:?}", event);
            }
        }
    }

    warn!("Event processing loop has ended");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sender_delivers_to_receiver() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);

        sender.send(Event::AppointmentDeleted(3)).await.unwrap();
        assert_eq!(rx.recv().await, Some(Event::AppointmentDeleted(3)));
    }

    #[tokio::test]
    async fn send_fails_once_receiver_is_gone() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);

        assert!(sender.send(Event::ServiceDeleted(1)).await.is_err());
        // publish swallows the same failure
        sender.publish(Event::ServiceDeleted(1)).await;
    }
}
