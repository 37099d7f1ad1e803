use std::sync::Arc;
use teloxide::dispatching::{DefaultKey, UpdateHandler};
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{error, info};

use crate::subscribers::{SubscribeOutcome, SubscriberId, SubscriberStore};
use crate::utils::error::Result;

pub const GREETING: &str = "Привет! Я буду уведомлять вас о наличии встреч на сайте ICP.";
pub const ALREADY_SUBSCRIBED: &str = "Вы уже подписаны на уведомления.";
pub const UNSUBSCRIBED: &str = "Вы отписались от уведомлений.";
pub const STATUS_SUBSCRIBED: &str = "Вы подписаны на уведомления.";
pub const STATUS_NOT_SUBSCRIBED: &str = "Вы не подписаны. Отправьте /start, чтобы подписаться.";

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Доступные команды:")]
pub enum Command {
    #[command(description = "подписаться на уведомления")]
    Start,
    #[command(description = "отписаться от уведомлений")]
    Stop,
    #[command(description = "проверить подписку")]
    Status,
    #[command(description = "показать это сообщение")]
    Help,
}

/// Applies `command` for `chat` and returns the reply text.
pub async fn handle_command(
    store: &SubscriberStore,
    chat: SubscriberId,
    command: Command,
) -> Result<String> {
    let reply = match command {
        Command::Start => match store.subscribe(chat).await? {
            SubscribeOutcome::Added => GREETING,
            SubscribeOutcome::AlreadySubscribed => ALREADY_SUBSCRIBED,
        },
        Command::Stop => {
            store.unsubscribe(&chat).await?;
            UNSUBSCRIBED
        }
        Command::Status => {
            if store.contains(&chat).await {
                STATUS_SUBSCRIBED
            } else {
                STATUS_NOT_SUBSCRIBED
            }
        }
        Command::Help => return Ok(Command::descriptions().to_string()),
    };

    Ok(reply.to_string())
}

async fn answer(
    bot: Bot,
    msg: Message,
    command: Command,
    store: Arc<SubscriberStore>,
) -> ResponseResult<()> {
    let chat = SubscriberId::Chat(msg.chat.id.0);
    info!("Command {:?} from chat {}", command, chat);

    match handle_command(&store, chat.clone(), command).await {
        Ok(reply) => {
            bot.send_message(msg.chat.id, reply).await?;
        }
        Err(e) => error!("Failed to handle command for chat {}: {}", chat, e),
    }

    Ok(())
}

pub fn schema() -> UpdateHandler<teloxide::RequestError> {
    Update::filter_message()
        .filter_command::<Command>()
        .endpoint(answer)
}

/// Builds the long-polling dispatcher. The caller owns shutdown through
/// `Dispatcher::shutdown_token`.
pub fn dispatcher(
    bot: Bot,
    store: Arc<SubscriberStore>,
) -> Dispatcher<Bot, teloxide::RequestError, DefaultKey> {
    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![store])
        .default_handler(|_| async {})
        .error_handler(LoggingErrorHandler::with_custom_text("Error in bot update handler"))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn temp_store(dir: &TempDir) -> SubscriberStore {
        SubscriberStore::load(dir.path().join("users.json")).await.unwrap()
    }

    #[tokio::test]
    async fn test_start_then_start_again() {
        let dir = TempDir::new().unwrap();
        let store = temp_store(&dir).await;

        let first = handle_command(&store, 42.into(), Command::Start).await.unwrap();
        let second = handle_command(&store, 42.into(), Command::Start).await.unwrap();

        assert_eq!(first, GREETING);
        assert_eq!(second, ALREADY_SUBSCRIBED);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_stop_always_confirms() {
        let dir = TempDir::new().unwrap();
        let store = temp_store(&dir).await;

        assert_eq!(handle_command(&store, 42.into(), Command::Stop).await.unwrap(), UNSUBSCRIBED);

        handle_command(&store, 42.into(), Command::Start).await.unwrap();
        assert_eq!(handle_command(&store, 42.into(), Command::Stop).await.unwrap(), UNSUBSCRIBED);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_status_reflects_membership() {
        let dir = TempDir::new().unwrap();
        let store = temp_store(&dir).await;

        assert_eq!(
            handle_command(&store, 7.into(), Command::Status).await.unwrap(),
            STATUS_NOT_SUBSCRIBED
        );
        handle_command(&store, 7.into(), Command::Start).await.unwrap();
        assert_eq!(
            handle_command(&store, 7.into(), Command::Status).await.unwrap(),
            STATUS_SUBSCRIBED
        );
    }

    #[tokio::test]
    async fn test_help_lists_commands() {
        let dir = TempDir::new().unwrap();
        let store = temp_store(&dir).await;

        let help = handle_command(&store, 7.into(), Command::Help).await.unwrap();
        assert!(help.contains("/start"));
        assert!(help.contains("/stop"));
    }

    #[test]
    fn test_command_parsing() {
        assert_eq!(Command::parse("/start", "cita_bot").unwrap(), Command::Start);
        assert_eq!(Command::parse("/stop", "cita_bot").unwrap(), Command::Stop);
        assert!(Command::parse("/unknown", "cita_bot").is_err());
    }
}
