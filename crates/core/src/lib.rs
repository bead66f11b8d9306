pub mod config;
pub mod error;
pub mod types;
pub mod urls;

pub use config::Config;
pub use error::CrawlError;
pub use types::*;
pub use urls::normalize_url;
