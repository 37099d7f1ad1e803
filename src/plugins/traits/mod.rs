pub mod fetcher;
pub mod notifier;

pub use fetcher::{FetchRequest, FetchedPage, PageFetcher};
pub use notifier::Notifier;
