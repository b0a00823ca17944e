use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

pub mod outbox;

/// Domain events emitted by the order/payment lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        tracking_number: String,
    },
    PaymentVerified {
        order_id: Uuid,
        gateway_payment_id: String,
    },
    PaymentVerificationFailed {
        gateway_order_id: String,
    },
    ConfirmationEmailQueued {
        order_id: Uuid,
    },
    VipSignup {
        email: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is down.
    /// Event emission is observability, not control flow.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event.clone()).await {
            warn!("dropping event {:?}: {}", event, e);
        }
    }
}

/// Background task draining the event channel. Today events only feed the
/// log stream; the channel is the seam where webhooks or analytics would
/// attach.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderCreated {
                order_id,
                tracking_number,
            } => info!(%order_id, tracking_number, "order created"),
            Event::PaymentVerified {
                order_id,
                gateway_payment_id,
            } => info!(%order_id, gateway_payment_id, "payment verified"),
            Event::PaymentVerificationFailed { gateway_order_id } => {
                warn!(gateway_order_id, "payment verification failed")
            }
            Event::ConfirmationEmailQueued { order_id } => {
                info!(%order_id, "confirmation email queued")
            }
            Event::VipSignup { email } => info!(email, "vip signup"),
        }
    }
    info!("event channel closed; processor exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_or_log_does_not_error_on_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        // must not panic or return an error path
        sender
            .send_or_log(Event::VipSignup {
                email: "vip@example.com".into(),
            })
            .await;
    }
}
