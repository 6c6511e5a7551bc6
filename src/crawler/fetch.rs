use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use log2::{debug, info};
use rayon::prelude::*;
use tokio::time::sleep;

use super::config::CrawlerConfig;
use crate::graph::{PageId, PageType};
use crate::puzzle::Seed;
use crate::puzzle::hash::{core_target, cpu_target};
use crate::server::{PageBody, ROOT_PAGE_ID, Server, ServerError};

pub type ServerRef = Arc<Server>;

/// A page after its delay was waited out and its puzzles solved
#[derive(Debug)]
pub struct FetchedPage {
    pub page_type: PageType,
    pub links: HashSet<PageId>,
    pub puzzles_solved: usize,
    pub retries: usize,
}

/// Requests `page_id`, retrying simulated failures up to `max_retries` times.
pub async fn fetch_page(server: &ServerRef, page_id: &str, config: &CrawlerConfig) -> Result<FetchedPage> {
    if page_id == ROOT_PAGE_ID {
        let root = server.root_page();
        return Ok(FetchedPage {
            page_type: root.page_type,
            links: root.links.into_iter().collect(),
            puzzles_solved: 0,
            retries: 0,
        });
    }

    let mut retries = 0;
    let view = loop {
        match server.page(page_id) {
            Ok(view) => break view,
            Err(ServerError::SimulatedFailure(_)) if retries < config.max_retries => {
                retries += 1;
                debug!("Page {} failed, retry {}/{}", page_id, retries, config.max_retries);
            }
            Err(e) => return Err(e.into()),
        }
    };

    let delay = std::time::Duration::from_millis(view.delay_ms).mul_f64(config.delay_scale);
    if !delay.is_zero() {
        sleep(delay).await;
    }

    let (links, puzzles_solved) = match view.body {
        PageBody::Links(links) => (links.into_iter().collect(), 0),
        PageBody::HashSeeds(seeds) => {
            let solved = seeds.len();
            (solve_hash_seeds(server, seeds).await?, solved)
        }
        PageBody::SeedGroups(groups) => {
            let solved = groups.len();
            (solve_seed_groups(server, groups).await?, solved)
        }
    };

    info!("Found {} links on {} page {}", links.len(), view.page_type, page_id);

    Ok(FetchedPage {
        page_type: view.page_type,
        links,
        puzzles_solved,
        retries,
    })
}

/// Each seed is one long sequential hash chain, run off the async workers
async fn solve_hash_seeds(server: &ServerRef, seeds: Vec<Seed>) -> Result<HashSet<PageId>> {
    let iterations = server.cache().cpu_iterations();
    let id_length = server.cache().settings().id_length;
    let links = tokio::task::spawn_blocking(move || {
        seeds
            .iter()
            .map(|seed| cpu_target(seed, iterations, id_length))
            .collect()
    })
    .await?;
    Ok(links)
}

/// Characters of one link are independent chains and get solved in parallel
async fn solve_seed_groups(server: &ServerRef, groups: Vec<Vec<Seed>>) -> Result<HashSet<PageId>> {
    let iterations = server.cache().core_iterations();
    let links = tokio::task::spawn_blocking(move || {
        groups
            .iter()
            .filter_map(|group| {
                group
                    .par_iter()
                    .map(|seed| core_target(seed, iterations))
                    .collect::<Option<String>>()
            })
            .collect()
    })
    .await?;
    Ok(links)
}
