//! Engine-side notifications: append-only store rows plus optional email.

pub mod email;

pub use email::Mailer;

use chrono::Utc;
use std::sync::Arc;

use crate::data::store::{NotificationRecord, Store};
use crate::error::EngineError;

pub const KIND_TRADE_EXECUTED: &str = "bot_trade_executed";
pub const KIND_TRADE_ERROR: &str = "bot_trade_error";
pub const KIND_BOT_ERROR: &str = "bot_error";

#[derive(Clone)]
pub struct Notifier {
    store: Arc<Store>,
}

impl Notifier {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub async fn record(
        &self,
        user_id: &str,
        kind: &str,
        title: &str,
        body: &str,
    ) -> Result<(), EngineError> {
        self.store
            .insert_notification(&NotificationRecord {
                id: uuid::Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                kind: kind.to_string(),
                title: title.to_string(),
                body: body.to_string(),
                created_at: Utc::now(),
                read: false,
            })
            .await
    }

    /// A notification that fails to write must not take the engine down.
    pub async fn record_best_effort(&self, user_id: &str, kind: &str, title: &str, body: &str) {
        if let Err(e) = self.record(user_id, kind, title, body).await {
            tracing::warn!(user_id, kind, error = %e, "failed to record notification");
        }
    }
}
