pub mod state;
pub mod config;
pub mod fetch;
pub mod runner;


pub use state::{CrawlerState, CrawlerStateRef, build_graph_from_state};
pub use config::{CrawlerConfig, CrawlerConfigRef, DEFAULT_MAX_RETRIES};
pub use fetch::{FetchedPage, ServerRef, fetch_page};
pub use runner::{CrawlReport, crawl};
