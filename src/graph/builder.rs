use std::collections::HashSet;

use log2::debug;
use rand::Rng;
use rand::seq::IndexedRandom;

/// Vertex index into the page list. Vertex 0 is the root of the tree phase
pub type Vertex = usize;

/// Outgoing links per vertex, in insertion order
pub type Adjacency = Vec<Vec<Vertex>>;

/// With `probability`, a densification edge from a matching source picks its
/// target uniformly from `targets` instead of from all vertices.
#[derive(Debug, Clone)]
pub struct BiasRule {
    sources: Option<HashSet<Vertex>>,
    targets: Vec<Vertex>,
    probability: f64,
}

impl BiasRule {
    pub fn new(targets: Vec<Vertex>, probability: f64) -> Self {
        Self {
            sources: None,
            targets,
            probability: probability.clamp(0.0, 1.0),
        }
    }

    /// Restricts the rule to edges leaving one of `sources`
    pub fn from_sources(mut self, sources: impl IntoIterator<Item = Vertex>) -> Self {
        self.sources = Some(sources.into_iter().collect());
        self
    }

    fn applies_to(&self, source: Vertex) -> bool {
        self.sources.as_ref().is_none_or(|s| s.contains(&source))
    }
}

/// Caps the number of edges a vertex may receive from `sources`.
/// Vertices past the end of `capacity` accept none.
#[derive(Debug, Clone)]
pub struct LinkLimit {
    sources: HashSet<Vertex>,
    capacity: Vec<usize>,
}

impl LinkLimit {
    pub fn new(sources: impl IntoIterator<Item = Vertex>, capacity: Vec<usize>) -> Self {
        Self {
            sources: sources.into_iter().collect(),
            capacity,
        }
    }

    fn limits(&self, source: Vertex) -> bool {
        self.sources.contains(&source)
    }

    fn capacity_of(&self, target: Vertex) -> usize {
        self.capacity.get(target).copied().unwrap_or(0)
    }
}

/// Builds a link topology that is connected from vertex 0:
/// a random spanning tree first, then random extra edges.
#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    target_edges: usize,
    max_attempts: usize,
    rules: Vec<BiasRule>,
    limit: Option<LinkLimit>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of edges to aim for, tree edges included
    pub fn with_target_edges(mut self, target_edges: usize) -> Self {
        self.target_edges = target_edges;
        self
    }

    /// Densification attempts before giving up on `target_edges`
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Rules are tried in order; the first one that applies and wins its coin flip picks the target
    pub fn with_bias_rule(mut self, rule: BiasRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Limited sources never link to a vertex beyond its capacity, tree edges included
    pub fn with_link_limit(mut self, limit: LinkLimit) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn build<R: Rng + ?Sized>(&self, vertex_count: usize, rng: &mut R) -> Adjacency {
        let mut links: Adjacency = vec![Vec::new(); vertex_count];
        if vertex_count <= 1 {
            return links;
        }

        // In-edges each vertex got from limited sources
        let mut limited_in = vec![0usize; vertex_count];
        // Tree vertices a blocked vertex can still hang off
        let mut open_parents: Vec<Vertex> = Vec::new();

        // Tree phase: every vertex hangs off one already in the tree
        for new_vertex in 1..vertex_count {
            let previous = new_vertex - 1;
            if self.limit.as_ref().is_none_or(|l| !l.limits(previous)) {
                open_parents.push(previous);
            }

            let mut source = rng.random_range(0..new_vertex);
            if let Some(limit) = &self.limit {
                if limit.limits(source) && limit.capacity_of(new_vertex) == 0 {
                    match open_parents.choose(rng) {
                        Some(&open) => source = open,
                        None => debug!("Vertex {} has no parent outside the limited sources", new_vertex),
                    }
                }
                if limit.limits(source) {
                    limited_in[new_vertex] += 1;
                }
            }
            links[source].push(new_vertex);
        }
        let tree_edges = vertex_count - 1;

        let mut existing: Vec<HashSet<Vertex>> = links
            .iter()
            .map(|targets| targets.iter().copied().collect())
            .collect();

        let wanted = self.target_edges.saturating_sub(tree_edges);
        let mut added = 0;
        let mut attempts = 0;
        while added < wanted && attempts < self.max_attempts {
            attempts += 1;
            let source = rng.random_range(0..vertex_count);
            let target = self.pick_target(source, vertex_count, rng);

            if source == target || existing[source].contains(&target) {
                continue;
            }
            if let Some(limit) = self.limit.as_ref().filter(|l| l.limits(source)) {
                if limited_in[target] >= limit.capacity_of(target) {
                    continue;
                }
                limited_in[target] += 1;
            }
            existing[source].insert(target);
            links[source].push(target);
            added += 1;
        }

        debug!(
            "Built graph over {} vertices: {} tree edges, {}/{} extra edges in {} attempts",
            vertex_count, tree_edges, added, wanted, attempts
        );
        links
    }

    fn pick_target<R: Rng + ?Sized>(&self, source: Vertex, vertex_count: usize, rng: &mut R) -> Vertex {
        for rule in self.rules.iter().filter(|r| r.applies_to(source)) {
            if rng.random::<f64>() < rule.probability {
                if let Some(&target) = rule.targets.choose(rng) {
                    return target;
                }
            }
        }
        rng.random_range(0..vertex_count)
    }
}

/// Number of vertices reachable from vertex 0
pub fn reachable_count(links: &Adjacency) -> usize {
    if links.is_empty() {
        return 0;
    }
    let mut visited = vec![false; links.len()];
    let mut stack = vec![0];
    visited[0] = true;
    let mut count = 1;
    while let Some(vertex) = stack.pop() {
        for &next in &links[vertex] {
            if !visited[next] {
                visited[next] = true;
                count += 1;
                stack.push(next);
            }
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn edge_count(links: &Adjacency) -> usize {
        links.iter().map(Vec::len).sum()
    }

    #[test]
    fn test_tree_phase_connects_everything() {
        let mut rng = StdRng::seed_from_u64(42);
        for n in [2, 3, 10, 100, 1_000, 10_000] {
            let links = GraphBuilder::new().build(n, &mut rng);
            assert_eq!(edge_count(&links), n - 1);
            assert_eq!(reachable_count(&links), n, "graph of {} vertices is not connected", n);
        }
    }

    #[test]
    fn test_densified_graph_stays_connected() {
        let mut rng = StdRng::seed_from_u64(3);
        for n in [2, 50, 10_000] {
            let links = GraphBuilder::new()
                .with_target_edges(n * 3)
                .with_max_attempts(n * 30)
                .build(n, &mut rng);
            assert_eq!(reachable_count(&links), n);
            assert!(edge_count(&links) <= n * 3);
        }
    }

    #[test]
    fn test_small_attempt_budget() {
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let links = GraphBuilder::new()
                .with_target_edges(9 + 5)
                .with_max_attempts(5)
                .build(10, &mut rng);
            let edges = edge_count(&links);
            assert!((9..=14).contains(&edges), "unexpected edge count {}", edges);
            assert_eq!(reachable_count(&links), 10);
        }
    }

    #[test]
    fn test_no_self_loops_or_duplicates() {
        let mut rng = StdRng::seed_from_u64(11);
        // Two vertices can hold at most two edges, the budget runs out silently
        let links = GraphBuilder::new()
            .with_target_edges(50)
            .with_max_attempts(1_000)
            .build(2, &mut rng);
        assert_eq!(links[0], vec![1]);
        assert_eq!(links[1], vec![0]);

        let links = GraphBuilder::new()
            .with_target_edges(400)
            .with_max_attempts(10_000)
            .build(20, &mut rng);
        for (source, targets) in links.iter().enumerate() {
            assert!(!targets.contains(&source));
            let unique: HashSet<_> = targets.iter().collect();
            assert_eq!(unique.len(), targets.len());
        }
    }

    #[test]
    fn test_degenerate_sizes() {
        let mut rng = StdRng::seed_from_u64(0);
        let builder = GraphBuilder::new().with_target_edges(10).with_max_attempts(10);
        assert!(builder.build(0, &mut rng).is_empty());
        assert_eq!(builder.build(1, &mut rng), vec![Vec::<Vertex>::new()]);
        assert_eq!(reachable_count(&builder.build(1, &mut rng)), 1);
    }

    #[test]
    fn test_bias_rule_steers_targets() {
        let mut rng = StdRng::seed_from_u64(5);
        let n = 200;
        let links = GraphBuilder::new()
            .with_target_edges(n - 1 + 300)
            .with_max_attempts(10_000)
            .with_bias_rule(BiasRule::new(vec![7, 8], 1.0).from_sources(0..10))
            .build(n, &mut rng);

        // Tree edges always point to a higher index, so any lower target must come
        // from the rule
        for source in 0..10 {
            let outside: Vec<_> = links[source]
                .iter()
                .filter(|&&t| t != 7 && t != 8 && t <= source)
                .collect();
            assert!(outside.is_empty(), "vertex {} linked backwards to {:?}", source, outside);
        }
    }

    #[test]
    fn test_link_limit_caps_in_edges() {
        let n = 100;
        // Every fifth vertex is limited, odd vertices accept one limited edge, even ones none
        let limited: Vec<Vertex> = (1..n).step_by(5).collect();
        let capacity: Vec<usize> = (0..n).map(|v| v % 2).collect();
        for seed in 0..10 {
            let mut rng = StdRng::seed_from_u64(seed);
            let links = GraphBuilder::new()
                .with_target_edges(n * 4)
                .with_max_attempts(n * 40)
                .with_link_limit(LinkLimit::new(limited.clone(), capacity.clone()))
                .build(n, &mut rng);

            assert_eq!(reachable_count(&links), n);
            let mut limited_in = vec![0; n];
            for &source in &limited {
                for &target in &links[source] {
                    limited_in[target] += 1;
                }
            }
            for target in 0..n {
                assert!(
                    limited_in[target] <= capacity[target],
                    "vertex {} got {} edges from limited sources",
                    target,
                    limited_in[target]
                );
            }
        }
    }
}
