pub mod booking;
pub mod bot;
pub mod browser;
pub mod config;
pub mod extractor;
pub mod logging;
pub mod plugins;
pub mod scheduler;
pub mod subscribers;
pub mod utils;
pub mod watcher;

// Re-export commonly used types
pub use config::AppConfig;
pub use subscribers::{SubscriberId, SubscriberStore};
pub use utils::error::AppError;
pub use watcher::{AvailabilityWatcher, CycleOutcome, CycleReport};

pub type Result<T> = std::result::Result<T, AppError>;
