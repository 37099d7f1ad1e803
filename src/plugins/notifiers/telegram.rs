use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::Recipient;

use crate::plugins::traits::Notifier;
use crate::subscribers::SubscriberId;
use crate::utils::error::{AppError, Result};

/// Sends plain-text messages through the Telegram Bot API.
#[derive(Clone)]
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

pub fn recipient_for(id: &SubscriberId) -> Recipient {
    match id {
        SubscriberId::Chat(chat_id) => Recipient::Id(ChatId(*chat_id)),
        SubscriberId::Channel(username) => Recipient::ChannelUsername(username.clone()),
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_text(&self, recipient: &SubscriberId, text: &str) -> Result<()> {
        self.bot
            .send_message(recipient_for(recipient), text)
            .await
            .map(|_| ())
            .map_err(|e| AppError::Notification {
                recipient: recipient.to_string(),
                message: e.to_string(),
            })
    }
}
