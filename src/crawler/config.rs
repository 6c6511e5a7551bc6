use std::sync::Arc;

use crate::graph::PageId;

/// Default number of retries of a page answering with a simulated failure
pub const DEFAULT_MAX_RETRIES: usize = 50;

/// Configuration for the crawler
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    pub max_pages: usize,
    pub thread_count: usize,
    pub max_retries: usize,
    /// Multiplier applied to the delay each page asks for, 0 skips waiting
    pub delay_scale: f64,
    pub target_page: Option<PageId>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl CrawlerConfig {
    pub fn new() -> Self {
        Self {
            max_pages: 100_000,
            thread_count: 2,
            max_retries: DEFAULT_MAX_RETRIES,
            delay_scale: 1.0,
            target_page: None,
        }
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_thread_count(mut self, thread_count: usize) -> Self {
        self.thread_count = thread_count;
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_delay_scale(mut self, delay_scale: f64) -> Self {
        self.delay_scale = delay_scale;
        self
    }

    pub fn with_target_page(mut self, page_id: impl Into<PageId>) -> Self {
        self.target_page = Some(page_id.into());
        self
    }
}

pub type CrawlerConfigRef = Arc<CrawlerConfig>;
