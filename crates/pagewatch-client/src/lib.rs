pub mod browser;
pub mod extract;
pub mod fetcher;
pub mod json_path;
pub mod notify;
pub mod user_agent;

pub use browser::BrowserRenderer;
pub use extract::{ExtractedPage, extract_page};
pub use fetcher::{FetcherConfig, WatchFetcher};
pub use notify::{HttpChannelSender, NotifierConfig, build_dispatcher};
