use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use log2::*;
use rand::SeedableRng;
use rand::rngs::StdRng;

use webgraph::config::{Config, Mode};
use webgraph::crawler;
use webgraph::pathfinder;
use webgraph::puzzle::PuzzleCache;
use webgraph::server::{ROOT_PAGE_ID, Server};

/// Indicates start time of a project, lazily initialized
pub static START_TIME: once_cell::sync::Lazy<Instant> = once_cell::sync::Lazy::new(Instant::now);

#[tokio::main]
async fn main() -> Result<()> {
    let _ = *START_TIME;
    let cfg = Config::new();
    cfg.validate()?;
    let _log2 = stdout()
        .module(true) // include module name
        .module_with_line(true) // include line number from module
        .module_filter(|module| module.starts_with("webgraph")) // include only modules having this pattern
        .compress(false)
        .level(cfg.log_level.to_string())
        .start();

    let graph_config = cfg.graph_config();
    let cache = PuzzleCache::load(&cfg.cache_file, graph_config.puzzle_settings(cfg.issue_policy()));

    if cfg.mode == Mode::Cache {
        cache.ensure_cpu_coverage(graph_config.total_pages, graph_config.cpu_iterations)?;
        cache.ensure_core_coverage(graph_config.core_seeds_per_char)?;
        cache.persist()?;
        println!("{}", serde_json::to_string_pretty(&cache.info())?);
        info!("Puzzle cache ready after {:?}", START_TIME.elapsed());
        return Ok(());
    }

    // Puzzle generation is CPU bound and may take minutes on a cold cache
    let server = tokio::task::spawn_blocking(move || {
        let server = match cfg.graph_seed {
            Some(seed) => Server::build(graph_config, cache, &mut StdRng::seed_from_u64(seed)),
            None => Server::build(graph_config, cache, &mut rand::rng()),
        };
        server.map(|s| (s, cfg))
    })
    .await?;
    let (server, cfg) = server?;
    info!("Graph ready after {:?}", START_TIME.elapsed());

    if cfg.mode == Mode::Stats {
        println!("{}", serde_json::to_string_pretty(&server.stats())?);
        return Ok(());
    }

    let server = Arc::new(server);
    let mut crawler_config = crawler::CrawlerConfig::new()
        .with_max_pages(cfg.max_pages)
        .with_thread_count(cfg.thread_count)
        .with_max_retries(cfg.max_retries)
        .with_delay_scale(cfg.delay_scale);
    if let Some(target) = &cfg.target_page {
        crawler_config = crawler_config.with_target_page(target.clone());
    }
    let state = Arc::new(crawler::CrawlerState::new(ROOT_PAGE_ID));

    // state is cloned because it's accessed after and config is not
    match crawler::crawl(server, state.clone(), Arc::new(crawler_config)).await {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            let graph = crawler::build_graph_from_state(&state).await;

            if let Some(target) = &cfg.target_page {
                match pathfinder::find_shortest_path_bfs(ROOT_PAGE_ID, target, &graph) {
                    Some(path) => {
                        info!("Path found!");
                        pathfinder::print_path(&path);
                        info!("Number of links between pages: {}", path.len() - 1);
                    }
                    None => {
                        info!("No path found between {} and {}", ROOT_PAGE_ID, target);
                    }
                }
            }

            if let Some(path) = &cfg.output_file {
                std::fs::write(path, serde_json::to_string_pretty(&graph)?)?;
                info!("Discovered graph written to {:?}", path);
            }
        }
        Err(e) => {
            error!("Crawling failed: {}", e);
        }
    }

    Ok(())
}
