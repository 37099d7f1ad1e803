use async_trait::async_trait;
use tracing::info;

use crate::plugins::traits::Notifier;
use crate::subscribers::SubscriberId;
use crate::utils::error::Result;

/// Writes would-be messages to the log instead of delivering them.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_text(&self, recipient: &SubscriberId, text: &str) -> Result<()> {
        info!(recipient = %recipient, "Dry run notification:\n{}", text);
        Ok(())
    }
}
