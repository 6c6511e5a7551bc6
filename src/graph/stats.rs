use std::collections::BTreeMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use serde::Serialize;

use super::{Graph, PageId, PageType};

pub const MAX_DEAD_ENDS_SHOWN: usize = 10;
pub const MAX_TOP_PAGES_SHOWN: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct TypeShare {
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopPage {
    pub page_id: PageId,
    pub page_type: PageType,
    pub link_count: usize,
}

/// Summary of a built graph, derived from the link lists on every call
#[derive(Debug, Clone, Serialize)]
pub struct GraphStats {
    pub total_pages: usize,
    pub page_types: BTreeMap<PageType, TypeShare>,
    pub total_edges: usize,
    pub avg_links_per_page: f64,
    pub min_links: usize,
    pub max_links: usize,
    pub dead_ends_count: usize,
    pub dead_ends: Vec<PageId>,
    pub is_connected: bool,
    pub reachable_from_root: usize,
    pub link_distribution: BTreeMap<usize, usize>,
    pub pages_with_most_links: Vec<TopPage>,
}

impl GraphStats {
    pub fn compute(graph: &Graph) -> Self {
        let total_pages = graph.len();
        let links = graph.adjacency();
        let counts: Vec<usize> = links.iter().map(Vec::len).collect();
        let total_edges: usize = counts.iter().sum();

        let page_types = graph
            .type_distribution()
            .into_iter()
            .map(|(t, count)| {
                let percentage = if total_pages == 0 {
                    0.0
                } else {
                    round1(count as f64 / total_pages as f64 * 100.0)
                };
                (t, TypeShare { count, percentage })
            })
            .collect();

        let dead_ends: Vec<PageId> = graph
            .pages()
            .iter()
            .zip(&counts)
            .filter(|(_, c)| **c == 0)
            .map(|(p, _)| p.id.clone())
            .collect();

        let mut link_distribution = BTreeMap::new();
        for &count in &counts {
            *link_distribution.entry(count).or_insert(0) += 1;
        }

        let mut ranked: Vec<usize> = (0..total_pages).collect();
        ranked.sort_by(|&a, &b| counts[b].cmp(&counts[a]).then(a.cmp(&b)));
        let pages_with_most_links = ranked
            .into_iter()
            .take(MAX_TOP_PAGES_SHOWN)
            .map(|v| {
                let page = &graph.pages()[v];
                TopPage {
                    page_id: page.id.clone(),
                    page_type: page.page_type,
                    link_count: counts[v],
                }
            })
            .collect();

        let reachable_from_root = reachable_from_root(graph);

        Self {
            total_pages,
            page_types,
            total_edges,
            avg_links_per_page: if total_pages == 0 {
                0.0
            } else {
                round2(total_edges as f64 / total_pages as f64)
            },
            min_links: counts.iter().copied().min().unwrap_or(0),
            max_links: counts.iter().copied().max().unwrap_or(0),
            dead_ends_count: dead_ends.len(),
            dead_ends: dead_ends.into_iter().take(MAX_DEAD_ENDS_SHOWN).collect(),
            is_connected: reachable_from_root == total_pages,
            reachable_from_root,
            link_distribution,
            pages_with_most_links,
        }
    }
}

fn reachable_from_root(graph: &Graph) -> usize {
    if graph.is_empty() {
        return 0;
    }
    let mut g: DiGraph<(), ()> = DiGraph::with_capacity(graph.len(), graph.edge_count());
    for _ in 0..graph.len() {
        g.add_node(());
    }
    for (source, targets) in graph.adjacency().iter().enumerate() {
        for &target in targets {
            g.add_edge(NodeIndex::new(source), NodeIndex::new(target), ());
        }
    }

    let mut bfs = Bfs::new(&g, NodeIndex::new(0));
    let mut reached = 0;
    while bfs.next(&g).is_some() {
        reached += 1;
    }
    reached
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Page;

    #[test]
    fn test_stats_of_small_graph() {
        let pages = vec![
            Page::new("00", PageType::Regular),
            Page::new("01", PageType::Regular),
            Page::new("02", PageType::Delay),
            Page::new("03", PageType::Failure),
        ];
        let graph = Graph::from_parts(pages, vec![vec![1, 2], vec![2], vec![], vec![0]]).unwrap();
        let stats = GraphStats::compute(&graph);

        assert_eq!(stats.total_edges, 4);
        assert_eq!(stats.avg_links_per_page, 1.0);
        assert_eq!(stats.min_links, 0);
        assert_eq!(stats.max_links, 2);
        assert_eq!(stats.dead_ends, vec!["02"]);
        // "03" links into the graph but nothing links to it
        assert_eq!(stats.reachable_from_root, 3);
        assert!(!stats.is_connected);
        assert_eq!(stats.page_types[&PageType::Regular].percentage, 50.0);
        assert_eq!(stats.link_distribution[&1], 2);
        assert_eq!(stats.pages_with_most_links[0].page_id, "00");
    }

    #[test]
    fn test_stats_of_empty_graph() {
        let graph = Graph::from_parts(vec![], vec![]).unwrap();
        let stats = GraphStats::compute(&graph);
        assert_eq!(stats.total_pages, 0);
        assert!(stats.is_connected);
        assert_eq!(stats.avg_links_per_page, 0.0);
    }
}
