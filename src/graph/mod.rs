pub mod builder;
pub mod page;
pub mod stats;

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use thiserror::Error;

use crate::id_space::IdSpaceError;

pub use builder::{Adjacency, BiasRule, GraphBuilder, LinkLimit, Vertex};
pub use page::{Page, PageId, PageType};
pub use stats::GraphStats;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("page id {0} appears more than once")]
    DuplicateId(PageId),
    #[error("{pages} pages but {links} link lists")]
    ShapeMismatch { pages: usize, links: usize },
    #[error("link {from} -> {to} points outside the page list")]
    LinkOutOfRange { from: Vertex, to: Vertex },
    #[error(transparent)]
    IdSpace(#[from] IdSpaceError),
}

/// Immutable page graph. The first page is the entry vertex the synthetic root links to
#[derive(Debug, Clone)]
pub struct Graph {
    pages: Vec<Page>,
    index: HashMap<PageId, Vertex>,
    links: Adjacency,
}

impl Graph {
    pub fn from_parts(pages: Vec<Page>, links: Adjacency) -> Result<Self, GraphError> {
        if pages.len() != links.len() {
            return Err(GraphError::ShapeMismatch {
                pages: pages.len(),
                links: links.len(),
            });
        }

        let mut index = HashMap::with_capacity(pages.len());
        for (vertex, page) in pages.iter().enumerate() {
            if index.insert(page.id.clone(), vertex).is_some() {
                return Err(GraphError::DuplicateId(page.id.clone()));
            }
        }

        for (source, targets) in links.iter().enumerate() {
            if let Some(&target) = targets.iter().find(|&&t| t >= pages.len()) {
                return Err(GraphError::LinkOutOfRange {
                    from: source,
                    to: target,
                });
            }
        }

        Ok(Self { pages, index, links })
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page(&self, id: &str) -> Option<&Page> {
        self.index.get(id).map(|&v| &self.pages[v])
    }

    pub fn page_type(&self, id: &str) -> Option<PageType> {
        self.page(id).map(|p| p.page_type)
    }

    /// Outgoing links of `id` in insertion order
    pub fn edges_of(&self, id: &str) -> Option<Vec<PageId>> {
        let vertex = *self.index.get(id)?;
        Some(
            self.links[vertex]
                .iter()
                .map(|&t| self.pages[t].id.clone())
                .collect(),
        )
    }

    /// The single page the synthetic root links to
    pub fn root_outgoing(&self) -> Option<&PageId> {
        self.pages.first().map(|p| &p.id)
    }

    pub fn link_count(&self, id: &str) -> Option<usize> {
        self.index.get(id).map(|&v| self.links[v].len())
    }

    pub fn edge_count(&self) -> usize {
        self.links.iter().map(Vec::len).sum()
    }

    pub fn pages_of_type(&self, page_type: PageType) -> Vec<&Page> {
        self.pages
            .iter()
            .filter(|p| p.page_type == page_type)
            .collect()
    }

    pub fn type_distribution(&self) -> BTreeMap<PageType, usize> {
        let mut distribution: BTreeMap<PageType, usize> =
            PageType::VERTEX_TYPES.iter().map(|&t| (t, 0)).collect();
        for page in &self.pages {
            *distribution.entry(page.page_type).or_default() += 1;
        }
        distribution
    }

    /// Breadth-first list of pages reachable from `start`, `start` included, at most `limit` long
    pub fn reachable_from(&self, start: &str, limit: usize) -> Option<Vec<PageId>> {
        let start = *self.index.get(start)?;
        let mut visited = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        let mut reachable = Vec::new();

        while let Some(current) = queue.pop_front() {
            if reachable.len() >= limit {
                break;
            }
            reachable.push(self.pages[current].id.clone());
            for &next in &self.links[current] {
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        Some(reachable)
    }

    pub(crate) fn adjacency(&self) -> &Adjacency {
        &self.links
    }
}
