//! Transactional email outbox.
//!
//! Confirmation and welcome mails are enqueued as rows inside the same
//! transaction as the state change that warrants them, then delivered by a
//! polling worker. Delivery failure backs off and retries; it never
//! propagates to the request that enqueued the row. "Payment verified" and
//! "email delivered" are independent contracts.

use crate::entities::{outbox_email, OutboxEmail, OutboxStatus};
use crate::errors::ServiceError;
use crate::notifications::{EmailMessage, EmailSender};
use chrono::{Duration as ChronoDuration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};
use uuid::Uuid;

const MAX_ATTEMPTS: i32 = 8;
const BASE_BACKOFF_SECS: i64 = 2;

/// Enqueues an email into the outbox. Call inside the same transaction as
/// the write that justifies the mail.
pub async fn enqueue(
    db: &impl ConnectionTrait,
    recipient: &str,
    subject: &str,
    html: &str,
) -> Result<Uuid, ServiceError> {
    let id = Uuid::new_v4();
    let row = outbox_email::ActiveModel {
        id: Set(id),
        recipient: Set(recipient.to_string()),
        subject: Set(subject.to_string()),
        html: Set(html.to_string()),
        status: Set(OutboxStatus::Pending),
        attempts: Set(0),
        available_at: Set(Utc::now()),
        last_error: Set(None),
        created_at: Set(Utc::now()),
        processed_at: Set(None),
    };
    row.insert(db).await?;
    info!(outbox_id = %id, recipient, subject, "enqueued outbox email");
    Ok(id)
}

/// Spawns the background worker that polls and delivers pending rows.
pub fn start_worker(
    db: Arc<DatabaseConnection>,
    sender: Arc<dyn EmailSender>,
    poll_interval: Duration,
    batch_size: u64,
) {
    tokio::spawn(async move {
        loop {
            if let Err(e) = drain_once(&db, sender.as_ref(), batch_size).await {
                error!("outbox worker error: {}", e);
            }
            sleep(poll_interval).await;
        }
    });
}

/// Delivers one batch of due rows. Public so tests can drive the worker
/// deterministically.
pub async fn drain_once(
    db: &DatabaseConnection,
    sender: &dyn EmailSender,
    batch_size: u64,
) -> Result<usize, ServiceError> {
    let due = OutboxEmail::find()
        .filter(outbox_email::Column::Status.eq(OutboxStatus::Pending))
        .filter(outbox_email::Column::AvailableAt.lte(Utc::now()))
        .order_by_asc(outbox_email::Column::CreatedAt)
        .limit(batch_size)
        .all(db)
        .await?;

    let mut delivered = 0usize;
    for row in due {
        let message = EmailMessage {
            to: row.recipient.clone(),
            subject: row.subject.clone(),
            html: row.html.clone(),
        };
        let attempts = row.attempts + 1;
        let id = row.id;
        let mut update: outbox_email::ActiveModel = row.into();
        update.attempts = Set(attempts);

        match sender.send(&message).await {
            Ok(()) => {
                update.status = Set(OutboxStatus::Delivered);
                update.processed_at = Set(Some(Utc::now()));
                update.last_error = Set(None);
                delivered += 1;
            }
            Err(e) if attempts < MAX_ATTEMPTS => {
                let backoff = BASE_BACKOFF_SECS.saturating_pow(attempts as u32);
                warn!(outbox_id = %id, attempts, backoff_secs = backoff, "email delivery failed, will retry: {}", e);
                update.available_at = Set(Utc::now() + ChronoDuration::seconds(backoff));
                update.last_error = Set(Some(e.to_string()));
            }
            Err(e) => {
                error!(outbox_id = %id, attempts, "email delivery failed permanently: {}", e);
                update.status = Set(OutboxStatus::Failed);
                update.last_error = Set(Some(e.to_string()));
            }
        }
        update.update(db).await?;
    }
    Ok(delivered)
}
