use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed-length identifier of a page
pub type PageId = String;

/// Kinds of pages in the graph. `Root` is synthetic and never a graph vertex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageType {
    Regular,
    Delay,
    Failure,
    Cpu,
    Core,
    Root,
}

impl PageType {
    /// Types a graph vertex can have
    pub const VERTEX_TYPES: [PageType; 5] = [
        PageType::Regular,
        PageType::Delay,
        PageType::Failure,
        PageType::Cpu,
        PageType::Core,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PageType::Regular => "regular",
            PageType::Delay => "delay",
            PageType::Failure => "failure",
            PageType::Cpu => "cpu",
            PageType::Core => "core",
            PageType::Root => "root",
        }
    }

    /// Pages whose outgoing links are hidden behind hash puzzles
    pub fn is_puzzle(&self) -> bool {
        matches!(self, PageType::Cpu | PageType::Core)
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A vertex of the graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,
    pub page_type: PageType,
}

impl Page {
    pub fn new(id: impl Into<PageId>, page_type: PageType) -> Self {
        Self {
            id: id.into(),
            page_type,
        }
    }
}
