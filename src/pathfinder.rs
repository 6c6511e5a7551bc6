use std::collections::{HashMap, HashSet, VecDeque};

use log2::{debug, info};

use crate::graph::PageId;

/// Discovered links, as collected by the crawler
pub type LinkMap = HashMap<PageId, HashSet<PageId>>;

/// Find shortest path between two pages using BFS
pub fn find_shortest_path_bfs(start: &str, target: &str, graph: &LinkMap) -> Option<Vec<PageId>> {
    debug!("Searching for path from {} to {}", start, target);
    debug!("Graph contains {} nodes", graph.len());

    if start == target {
        return Some(vec![start.to_string()]);
    }

    if !graph.contains_key(start) {
        debug!("Start page not found in graph");
        return None;
    }

    let mut queue = VecDeque::new();
    let mut parent: HashMap<&str, &str> = HashMap::new();
    let mut visited: HashSet<&str> = HashSet::new();

    queue.push_back(start);
    visited.insert(start);

    while let Some(current) = queue.pop_front() {
        let Some(neighbors) = graph.get(current) else {
            continue;
        };
        for neighbor in neighbors {
            if !visited.insert(neighbor.as_str()) {
                continue;
            }
            parent.insert(neighbor.as_str(), current);

            if neighbor == target {
                let mut path = vec![target.to_string()];
                let mut node = target;
                while let Some(&prev) = parent.get(node) {
                    path.push(prev.to_string());
                    node = prev;
                }
                path.reverse();
                debug!("Found target at depth {}", path.len() - 1);
                return Some(path);
            }
            queue.push_back(neighbor.as_str());
        }
    }

    debug!("No path found after searching {} nodes", visited.len());
    None
}

/// Log the path in a readable format
pub fn print_path(path: &[PageId]) {
    info!("Shortest path ({} steps):", path.len().saturating_sub(1));
    for (i, page) in path.iter().enumerate() {
        if i == 0 {
            info!("  START: {}", page);
        } else if i == path.len() - 1 {
            info!("  END:   {}", page);
        } else {
            info!("  {}:     {}", i, page);
        }
    }
}
