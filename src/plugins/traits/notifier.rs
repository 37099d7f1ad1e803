use async_trait::async_trait;

use crate::subscribers::SubscriberId;
use crate::utils::error::Result;

/// Outbound channel addressed by subscriber id (Telegram, logs, ...).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_text(&self, recipient: &SubscriberId, text: &str) -> Result<()>;
}
