use std::collections::{HashMap, HashSet};

use anyhow::Result;
use log2::{debug, info, warn};
use rand::Rng;
use rand::seq::{IndexedRandom, SliceRandom};
use serde::Serialize;
use thiserror::Error;

use crate::config::GraphConfig;
use crate::graph::{
    BiasRule, Graph, GraphBuilder, GraphError, GraphStats, LinkLimit, Page, PageId, PageType, Vertex,
};
use crate::id_space::{self, HEX_ALPHABET};
use crate::puzzle::{CacheError, IssuePolicy, PuzzleCache, Seed};

/// Page id reported by the synthetic root page
pub const ROOT_PAGE_ID: &str = "root";

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Page {0} not found")]
    NotFound(PageId),
    #[error("Page {page_id} is a {actual} page, not a {expected} page")]
    WrongType {
        page_id: PageId,
        expected: PageType,
        actual: PageType,
    },
    #[error("Failure page {0} failed (simulated error)")]
    SimulatedFailure(PageId),
    #[error("No {0} pages found")]
    NoPagesOfType(PageType),
}

/// What a page hands out instead of plain links, depending on its type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PageBody {
    #[serde(rename = "links")]
    Links(Vec<PageId>),
    /// One seed per link; hashing it reveals the linked page id
    #[serde(rename = "hashseeds")]
    HashSeeds(Vec<Seed>),
    /// One group per link; seed `i` reveals character `i` of the linked page id
    #[serde(rename = "quadseeds")]
    SeedGroups(Vec<Vec<Seed>>),
}

#[derive(Debug, Clone, Serialize)]
pub struct PageView {
    pub page_id: PageId,
    pub page_type: PageType,
    pub link_count: usize,
    pub delay_ms: u64,
    #[serde(flatten)]
    pub body: PageBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct RootPage {
    pub page_id: &'static str,
    pub page_type: PageType,
    pub links: Vec<PageId>,
    pub link_count: usize,
    pub message: &'static str,
    pub total_pages_in_graph: usize,
    pub page_type_distribution: std::collections::BTreeMap<PageType, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexInfo {
    pub name: &'static str,
    pub description: String,
    pub total_pages: usize,
    pub links: Vec<PageId>,
}

/// Owns the page graph and the puzzle cache and answers page requests
pub struct Server {
    config: GraphConfig,
    graph: Graph,
    cache: PuzzleCache,
}

impl Server {
    /// Grows the puzzle cache as far as `config` needs, then builds the graph
    pub fn build<R: Rng>(config: GraphConfig, cache: PuzzleCache, rng: &mut R) -> Result<Self> {
        config.validate()?;
        if cache.settings().id_length != config.id_length {
            anyhow::bail!(
                "puzzle cache uses ids of length {}, graph wants {}",
                cache.settings().id_length,
                config.id_length
            );
        }

        let cpu_needed = config.cpu_coverage.unwrap_or(config.total_pages);
        tolerate_coverage_gap(cache.ensure_cpu_coverage(cpu_needed, config.cpu_iterations))?;
        tolerate_coverage_gap(cache.ensure_core_coverage(config.core_seeds_per_char))?;

        let pages = Self::pick_pages(&config, &cache, rng)?;
        let strict = cache.settings().policy == IssuePolicy::Strict;
        // Edges out of CPU pages a page can take without running out of seeds
        let cpu_capacity: Vec<usize> = pages
            .iter()
            .map(|p| match cache.cpu_seed_count(&p.id) {
                0 => 0,
                seeds if strict => seeds,
                _ => usize::MAX,
            })
            .collect();
        let issuable: Vec<Vertex> = (0..pages.len()).filter(|&v| cpu_capacity[v] > 0).collect();
        let vertices_of = |t: PageType| -> Vec<Vertex> {
            pages
                .iter()
                .enumerate()
                .filter(|(_, p)| p.page_type == t)
                .map(|(v, _)| v)
                .collect()
        };

        let target_edges = config.target_edges();
        let cpu_pages = vertices_of(PageType::Cpu);
        let mut builder = GraphBuilder::new()
            .with_target_edges(target_edges)
            .with_max_attempts(config.max_edge_attempts.unwrap_or(target_edges * 10))
            .with_link_limit(LinkLimit::new(cpu_pages.iter().copied(), cpu_capacity));
        if issuable.len() < pages.len() {
            builder = builder.with_bias_rule(BiasRule::new(issuable.clone(), 1.0).from_sources(cpu_pages));
        }
        builder = builder.with_bias_rule(BiasRule::new(vertices_of(PageType::Regular), config.regular_page_bias));

        let links = builder.build(pages.len(), rng);
        let graph = Graph::from_parts(pages, links)?;

        if strict {
            let demand = core_demand(&graph, &cache);
            if demand > config.core_seeds_per_char {
                info!("Strict issuance needs {} core seeds per character", demand);
                tolerate_coverage_gap(cache.ensure_core_coverage(demand))?;
            }
        }

        info!(
            "Generated graph with {} pages, {} links, {} pages with CPU seeds",
            graph.len(),
            graph.edge_count(),
            issuable.len()
        );
        for (page_type, count) in graph.type_distribution() {
            info!("  - {} {} pages ({}ms delay)", count, page_type, config.delays.for_type(page_type).as_millis());
        }

        Ok(Self { config, graph, cache })
    }

    /// Vertex set: ids the CPU pool can issue first, random ids for the rest.
    /// Sorted, with a regular entry page at index 0.
    fn pick_pages<R: Rng>(config: &GraphConfig, cache: &PuzzleCache, rng: &mut R) -> Result<Vec<Page>, GraphError> {
        let total = config.total_pages;
        let issuable = cache.cpu_targets();
        let mut ids: Vec<PageId> = issuable.choose_multiple(rng, total.min(issuable.len())).cloned().collect();

        let taken: HashSet<PageId> = ids.iter().cloned().collect();
        let fresh = id_space::generate(total - ids.len(), config.id_length, HEX_ALPHABET, &taken, rng)?;
        ids.extend(fresh);
        ids.sort();

        let mut types = vec![PageType::Regular; total];
        let mut others: Vec<Vertex> = (1..total).collect();
        others.shuffle(rng);
        let mut slots = others.into_iter();
        for (page_type, count) in config.type_counts() {
            for vertex in slots.by_ref().take(count) {
                types[vertex] = page_type;
            }
        }

        Ok(ids.into_iter().zip(types).map(|(id, t)| Page::new(id, t)).collect())
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn cache(&self) -> &PuzzleCache {
        &self.cache
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn index(&self) -> IndexInfo {
        IndexInfo {
            name: "Web Graph Server",
            description: format!(
                "A graph of {} interconnected web pages for concurrency testing",
                self.graph.len()
            ),
            total_pages: self.graph.len(),
            links: self.graph.root_outgoing().cloned().into_iter().collect(),
        }
    }

    /// Entry point of every crawl
    pub fn root_page(&self) -> RootPage {
        let links: Vec<PageId> = self.graph.root_outgoing().cloned().into_iter().collect();
        RootPage {
            page_id: ROOT_PAGE_ID,
            page_type: PageType::Root,
            link_count: links.len(),
            links,
            message: "This is the root page. Start crawling from here.",
            total_pages_in_graph: self.graph.len(),
            page_type_distribution: self.graph.type_distribution(),
        }
    }

    pub fn page(&self, page_id: &str) -> Result<PageView, ServerError> {
        self.page_with_rng(page_id, &mut rand::rng())
    }

    /// Like [`Server::page`] but refuses pages of any other type than `expected`
    pub fn typed_page(&self, page_id: &str, expected: PageType) -> Result<PageView, ServerError> {
        let actual = self
            .graph
            .page_type(page_id)
            .ok_or_else(|| ServerError::NotFound(page_id.to_string()))?;
        if actual != expected {
            return Err(ServerError::WrongType {
                page_id: page_id.to_string(),
                expected,
                actual,
            });
        }
        self.page(page_id)
    }

    pub fn page_with_rng<R: Rng>(&self, page_id: &str, rng: &mut R) -> Result<PageView, ServerError> {
        let page = self
            .graph
            .page(page_id)
            .ok_or_else(|| ServerError::NotFound(page_id.to_string()))?;
        let page_type = page.page_type;

        if page_type == PageType::Failure && rng.random::<f64>() < self.config.failure_error_rate {
            return Err(ServerError::SimulatedFailure(page_id.to_string()));
        }

        let links = self.graph.edges_of(page_id).unwrap_or_default();
        let link_count = links.len();
        let body = match page_type {
            PageType::Cpu => {
                let seeds: Vec<Seed> = self.cache.issue_cpu_seeds(&links).into_iter().flatten().collect();
                log_dead_ends(page_id, link_count, seeds.len());
                PageBody::HashSeeds(seeds)
            }
            PageType::Core => {
                let groups: Vec<Vec<Seed>> = self.cache.issue_core_seeds(&links).into_iter().flatten().collect();
                log_dead_ends(page_id, link_count, groups.len());
                PageBody::SeedGroups(groups)
            }
            _ => PageBody::Links(links),
        };

        Ok(PageView {
            page_id: page_id.to_string(),
            page_type,
            link_count,
            delay_ms: self.config.delays.for_type(page_type).as_millis() as u64,
            body,
        })
    }

    /// Any page, possibly one the root cannot reach first
    pub fn random_page(&self) -> Option<PageId> {
        self.graph.pages().choose(&mut rand::rng()).map(|p| p.id.clone())
    }

    pub fn random_page_of_type(&self, page_type: PageType) -> Result<PageId, ServerError> {
        self.graph
            .pages_of_type(page_type)
            .choose(&mut rand::rng())
            .map(|p| p.id.clone())
            .ok_or(ServerError::NoPagesOfType(page_type))
    }

    pub fn sample(&self, size: usize) -> Vec<Page> {
        self.graph
            .pages()
            .choose_multiple(&mut rand::rng(), size)
            .cloned()
            .collect()
    }

    pub fn search_from(&self, page_id: &str, limit: usize) -> Result<Vec<PageId>, ServerError> {
        self.graph
            .reachable_from(page_id, limit)
            .ok_or_else(|| ServerError::NotFound(page_id.to_string()))
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats::compute(&self.graph)
    }
}

/// Largest number of core seeds one character needs so that every link out of a
/// core page can get its own group
fn core_demand(graph: &Graph, cache: &PuzzleCache) -> usize {
    let mut per_char: HashMap<char, usize> = HashMap::new();
    for page in graph.pages_of_type(PageType::Core) {
        for link in graph.edges_of(&page.id).unwrap_or_default() {
            for symbol in cache.padded_core_target(&link).unwrap_or_default().chars() {
                *per_char.entry(symbol).or_default() += 1;
            }
        }
    }
    per_char.into_values().max().unwrap_or(0)
}

/// A coverage pass that ran out of attempts leaves dead ends behind, nothing worse
fn tolerate_coverage_gap(result: Result<usize, CacheError>) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(e @ CacheError::CoverageUnavailable { .. }) => {
            warn!("Continuing with partial puzzle coverage: {}", e);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn log_dead_ends(page_id: &str, links: usize, issued: usize) {
    if issued < links {
        debug!("Page {}: {} of {} links have no puzzle seed left", page_id, links - issued, links);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PageDelays;
    use crate::puzzle::hash::{core_target, cpu_target};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn small_config() -> GraphConfig {
        GraphConfig {
            total_pages: 40,
            id_length: 4,
            cpu_iterations: 3,
            core_iterations: 2,
            core_seeds_per_char: 2,
            failure_error_rate: 1.0,
            delays: PageDelays::none(),
            ..GraphConfig::default()
        }
    }

    fn build(dir: &tempfile::TempDir, config: GraphConfig, policy: IssuePolicy) -> Server {
        let cache = PuzzleCache::load(dir.path().join("hashcache.json"), config.puzzle_settings(policy));
        Server::build(config, cache, &mut StdRng::seed_from_u64(9)).unwrap()
    }

    #[test]
    fn test_graph_is_connected_with_exact_type_counts() {
        let dir = tempfile::tempdir().unwrap();
        let server = build(&dir, small_config(), IssuePolicy::Relaxed);

        let stats = server.stats();
        assert_eq!(stats.total_pages, 40);
        assert!(stats.is_connected);
        assert_eq!(stats.page_types[&PageType::Cpu].count, 4);
        assert_eq!(stats.page_types[&PageType::Core].count, 4);
        assert_eq!(stats.page_types[&PageType::Regular].count, 24);

        let entry = server.root_page().links[0].clone();
        assert_eq!(server.graph().page_type(&entry), Some(PageType::Regular));
        assert!(entry.len() == 4);
    }

    #[test]
    fn test_cpu_page_seeds_resolve_to_links() {
        let dir = tempfile::tempdir().unwrap();
        let server = build(&dir, small_config(), IssuePolicy::Relaxed);
        let cpu_page = server.random_page_of_type(PageType::Cpu).unwrap();

        let view = server.page(&cpu_page).unwrap();
        let expected = server.graph().edges_of(&cpu_page).unwrap();
        let PageBody::HashSeeds(seeds) = view.body else {
            panic!("CPU page did not hand out hash seeds");
        };
        let solved: Vec<PageId> = seeds.iter().map(|s| cpu_target(s, 3, 4)).collect();
        assert_eq!(solved, expected);
    }

    #[test]
    fn test_core_page_groups_resolve_to_links() {
        let dir = tempfile::tempdir().unwrap();
        let server = build(&dir, small_config(), IssuePolicy::Relaxed);
        let core_page = server.random_page_of_type(PageType::Core).unwrap();

        let view = server.page(&core_page).unwrap();
        let PageBody::SeedGroups(groups) = view.body else {
            panic!("core page did not hand out seed groups");
        };
        let solved: Vec<PageId> = groups
            .iter()
            .map(|g| g.iter().map(|s| core_target(s, 2).unwrap()).collect())
            .collect();
        assert_eq!(solved, server.graph().edges_of(&core_page).unwrap());
    }

    #[test]
    fn test_request_errors() {
        let dir = tempfile::tempdir().unwrap();
        let server = build(&dir, small_config(), IssuePolicy::Relaxed);

        assert!(matches!(server.page("zzzz"), Err(ServerError::NotFound(_))));
        let failure = server.random_page_of_type(PageType::Failure).unwrap();
        assert!(matches!(server.page(&failure), Err(ServerError::SimulatedFailure(_))));
        let delay = server.random_page_of_type(PageType::Delay).unwrap();
        assert!(matches!(
            server.typed_page(&delay, PageType::Regular),
            Err(ServerError::WrongType { actual: PageType::Delay, .. })
        ));
        assert!(matches!(
            server.random_page_of_type(PageType::Root),
            Err(ServerError::NoPagesOfType(PageType::Root))
        ));
    }

    #[test]
    fn test_regular_page_lists_links() {
        let dir = tempfile::tempdir().unwrap();
        let server = build(&dir, small_config(), IssuePolicy::Relaxed);
        let entry = server.root_page().links[0].clone();
        let view = server.typed_page(&entry, PageType::Regular).unwrap();
        assert_eq!(view.body, PageBody::Links(server.graph().edges_of(&entry).unwrap()));
        assert_eq!(view.link_count, server.graph().link_count(&entry).unwrap());

        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("links").is_some());
        assert!(json.get("hashseeds").is_none());
    }

    /// Serves every puzzle page once and checks no link was left without a seed
    fn assert_every_link_issued(server: &Server) {
        for page in server.graph().pages().iter().filter(|p| p.page_type.is_puzzle()) {
            let view = server.page(&page.id).unwrap();
            let issued = match view.body {
                PageBody::HashSeeds(seeds) => seeds.len(),
                PageBody::SeedGroups(groups) => groups.len(),
                PageBody::Links(_) => unreachable!("puzzle page served plain links"),
            };
            assert_eq!(issued, view.link_count, "{} page {} has dead ends", page.page_type, page.id);
        }
    }

    #[test]
    fn test_partial_cpu_coverage_uses_random_ids() {
        for seed in 0..6 {
            let dir = tempfile::tempdir().unwrap();
            let config = GraphConfig {
                cpu_coverage: Some(10),
                ..small_config()
            };
            let cache = PuzzleCache::load(
                dir.path().join("hashcache.json"),
                config.puzzle_settings(IssuePolicy::Relaxed),
            );
            let server = Server::build(config, cache, &mut StdRng::seed_from_u64(seed)).unwrap();
            assert_eq!(server.graph().len(), 40);
            assert!(server.stats().is_connected);
            let covered = server
                .graph()
                .pages()
                .iter()
                .filter(|p| server.cache().covers_cpu_target(&p.id))
                .count();
            assert!(covered >= 10);

            // CPU pages only link to pages they can hand out a seed for
            for page in server.graph().pages_of_type(PageType::Cpu) {
                for link in server.graph().edges_of(&page.id).unwrap() {
                    assert!(server.cache().covers_cpu_target(&link), "{} links to unseeded {}", page.id, link);
                }
            }
            assert_every_link_issued(&server);
        }
    }

    #[test]
    fn test_strict_policy_has_a_seed_for_every_link() {
        for seed in 0..6 {
            let dir = tempfile::tempdir().unwrap();
            let config = small_config();
            let cache = PuzzleCache::load(
                dir.path().join("hashcache.json"),
                config.puzzle_settings(IssuePolicy::Strict),
            );
            let server = Server::build(config, cache, &mut StdRng::seed_from_u64(seed)).unwrap();
            assert!(server.stats().is_connected);
            assert_every_link_issued(&server);
        }
    }

    #[test]
    fn test_search_and_sample() {
        let dir = tempfile::tempdir().unwrap();
        let server = build(&dir, small_config(), IssuePolicy::Relaxed);
        let entry = server.root_page().links[0].clone();
        assert_eq!(server.search_from(&entry, 1000).unwrap().len(), 40);
        assert_eq!(server.sample(5).len(), 5);
        assert!(server.search_from("nope", 10).is_err());
    }

    #[test]
    fn test_mismatched_id_length_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = small_config();
        let mut settings = config.puzzle_settings(IssuePolicy::Strict);
        settings.id_length = 5;
        let cache = PuzzleCache::load(dir.path().join("hashcache.json"), settings);
        assert!(Server::build(config, cache, &mut StdRng::seed_from_u64(1)).is_err());
    }
}
