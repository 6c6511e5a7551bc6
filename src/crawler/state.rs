use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize};

use tokio::sync::RwLock;

use crate::graph::PageId;
use crate::pathfinder::LinkMap;

/// Current state of the crawler
pub struct CrawlerState {
    /// Number of pages requested, failed ones included
    pub pages_crawled_count: AtomicUsize,
    /// Pages to crawl in queue
    pub page_queue: RwLock<VecDeque<PageId>>,
    /// Set of visited pages to prevent cycles
    pub visited_pages: RwLock<HashSet<PageId>>,
    /// Links discovered on each crawled page
    pub page_relationships: RwLock<LinkMap>,
    pub puzzles_solved: AtomicUsize,
    pub failures_retried: AtomicUsize,
    /// Pages given up on after exhausting retries
    pub failed_pages: AtomicUsize,
    /// Indicator that target page has been found
    pub target_found: AtomicBool,
}

impl CrawlerState {
    pub fn new(starting_page: impl Into<PageId>) -> Self {
        let mut queue = VecDeque::new();
        queue.push_back(starting_page.into());

        Self {
            pages_crawled_count: AtomicUsize::new(0),
            page_queue: RwLock::new(queue),
            visited_pages: RwLock::new(HashSet::new()),
            page_relationships: RwLock::new(LinkMap::new()),
            puzzles_solved: AtomicUsize::new(0),
            failures_retried: AtomicUsize::new(0),
            failed_pages: AtomicUsize::new(0),
            target_found: AtomicBool::new(false),
        }
    }
}

pub type CrawlerStateRef = Arc<CrawlerState>;

/// Build a graph from the crawled state for pathfinding
pub async fn build_graph_from_state(state: &CrawlerStateRef) -> LinkMap {
    state.page_relationships.read().await.clone()
}
