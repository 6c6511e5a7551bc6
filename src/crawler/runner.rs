use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use anyhow::Result;
use log2::*;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Duration, sleep};

use super::config::CrawlerConfigRef;
use super::fetch::{ServerRef, fetch_page};
use super::state::CrawlerStateRef;
use crate::server::ServerError;

/// Summary of a finished crawl
#[derive(Debug, Clone, Serialize)]
pub struct CrawlReport {
    pub pages_crawled: usize,
    pub pages_discovered: usize,
    pub failed_pages: usize,
    pub puzzles_solved: usize,
    pub failures_retried: usize,
    pub thread_count: usize,
    pub target_found: bool,
    pub elapsed_ms: u128,
}

pub async fn crawl(
    server: ServerRef,
    crawler_state_ref: CrawlerStateRef,
    crawler_cfg_ref: CrawlerConfigRef,
) -> Result<CrawlReport> {
    let started = Instant::now();
    let active_workers = Arc::new(AtomicUsize::new(0));
    let mut handles: Vec<JoinHandle<()>> = Vec::new();

    for worker_id in 0..crawler_cfg_ref.thread_count {
        let server = Arc::clone(&server);
        let state = Arc::clone(&crawler_state_ref);
        let config = Arc::clone(&crawler_cfg_ref);
        let active_workers = Arc::clone(&active_workers);

        let handle = tokio::spawn(async move {
            info!("Worker {} started", worker_id);

            loop {
                if state.target_found.load(Ordering::SeqCst) {
                    info!("Worker {}: Target has been found. Exiting...", worker_id);
                    break;
                }
                // Counted as active before the queue lock is released, so an empty
                // queue with no active workers really means no more work
                let next_page = {
                    let mut queue = state.page_queue.write().await;
                    let next = queue.pop_front();
                    if next.is_some() {
                        active_workers.fetch_add(1, Ordering::SeqCst);
                    }
                    next
                };

                let Some(page_id) = next_page else {
                    sleep(Duration::from_millis(20)).await;

                    let queue_empty = {
                        let queue = state.page_queue.read().await;
                        queue.is_empty()
                    };
                    let idle = active_workers.load(Ordering::SeqCst) == 0;

                    if queue_empty && idle {
                        info!("Worker {}: Queue empty and all workers idle. Shutting down.", worker_id);
                        break;
                    }
                    continue;
                };

                {
                    let mut visited = state.visited_pages.write().await;
                    if !visited.insert(page_id.clone()) {
                        active_workers.fetch_sub(1, Ordering::SeqCst);
                        continue;
                    }
                }

                let claimed = state
                    .pages_crawled_count
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < config.max_pages).then_some(n + 1))
                    .is_ok();
                if !claimed {
                    info!("Worker {}: Max pages reached", worker_id);
                    active_workers.fetch_sub(1, Ordering::SeqCst);
                    break;
                }

                debug!("Worker {}: Crawling {}", worker_id, page_id);

                match fetch_page(&server, &page_id, &config).await {
                    Ok(fetched) => {
                        state.puzzles_solved.fetch_add(fetched.puzzles_solved, Ordering::Relaxed);
                        state.failures_retried.fetch_add(fetched.retries, Ordering::Relaxed);

                        if let Some(target) = &config.target_page {
                            if fetched.links.contains(target) {
                                info!("Worker {}: Target {} linked from {}", worker_id, target, page_id);
                                state.target_found.store(true, Ordering::SeqCst);
                            }
                        }

                        {
                            let visited = state.visited_pages.read().await;
                            let mut queue = state.page_queue.write().await;
                            for link in fetched.links.iter().filter(|l| !visited.contains(*l)) {
                                queue.push_back(link.clone());
                            }
                        }

                        let mut relationships = state.page_relationships.write().await;
                        relationships.insert(page_id, fetched.links);
                    }
                    Err(e) => {
                        state.failed_pages.fetch_add(1, Ordering::Relaxed);
                        if let Some(ServerError::SimulatedFailure(_)) = e.downcast_ref::<ServerError>() {
                            state.failures_retried.fetch_add(config.max_retries, Ordering::Relaxed);
                        }
                        warn!("Worker {}: Giving up on {}: {}", worker_id, page_id, e);
                    }
                }

                active_workers.fetch_sub(1, Ordering::SeqCst);
            }

            info!("Worker {} finished", worker_id);
        });

        handles.push(handle);
    }

    for handle in handles {
        handle.await?;
    }

    let pages_discovered = {
        let relationships = crawler_state_ref.page_relationships.read().await;
        let mut pages: std::collections::HashSet<&String> = relationships.keys().collect();
        pages.extend(relationships.values().flatten());
        pages.len()
    };

    let report = CrawlReport {
        pages_crawled: crawler_state_ref.pages_crawled_count.load(Ordering::SeqCst),
        pages_discovered,
        failed_pages: crawler_state_ref.failed_pages.load(Ordering::SeqCst),
        puzzles_solved: crawler_state_ref.puzzles_solved.load(Ordering::SeqCst),
        failures_retried: crawler_state_ref.failures_retried.load(Ordering::SeqCst),
        thread_count: crawler_cfg_ref.thread_count,
        target_found: crawler_state_ref.target_found.load(Ordering::SeqCst),
        elapsed_ms: started.elapsed().as_millis(),
    };
    info!(
        "Crawl finished: {} pages in {} ms with {} workers",
        report.pages_crawled, report.elapsed_ms, report.thread_count
    );

    Ok(report)
}
