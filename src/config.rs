use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::graph::PageType;
use crate::puzzle::{IssuePolicy, PuzzleSettings, SEED_LENGTH};

/// Log levels as defined in log2 crate
#[derive(Debug, Serialize, Deserialize, Clone, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// What the binary does after parsing its arguments
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Pre-generate the puzzle cache and exit
    Cache,
    /// Build the graph and print its statistics
    Stats,
    /// Build the graph and crawl it
    Crawl,
}

/// This struct is supposed to receive all program arguments while GraphConfig
/// describes only the graph and its puzzles
#[derive(Parser, Debug, Serialize, Deserialize)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    #[arg(long, default_value = "crawl", value_enum)]
    pub mode: Mode,
    /// Puzzle cache file
    #[arg(long, default_value = "hashcache.json")]
    pub cache_file: PathBuf,
    /// Total number of pages in the graph
    #[arg(long, default_value = "100")]
    pub total_pages: usize,
    /// Length of each page id
    #[arg(long, default_value = "6")]
    pub id_length: usize,
    /// Average number of outbound links per page
    #[arg(long, default_value = "3")]
    pub avg_links: usize,
    /// Share of delay pages
    #[arg(long, default_value = "0.1")]
    pub delay_probability: f64,
    /// Share of failure pages
    #[arg(long, default_value = "0.1")]
    pub failure_probability: f64,
    /// Share of CPU puzzle pages
    #[arg(long, default_value = "0.1")]
    pub cpu_probability: f64,
    /// Share of core puzzle pages
    #[arg(long, default_value = "0.1")]
    pub core_probability: f64,
    /// Hash iterations behind a CPU page link
    #[arg(long, default_value = "5000000")]
    pub cpu_iterations: u64,
    /// Hash iterations per character behind a core page link
    #[arg(long, default_value = "1250000")]
    pub core_iterations: u64,
    /// Minimum core seeds per hex character
    #[arg(long, default_value = "2")]
    pub core_seeds_per_char: usize,
    /// Seed for the graph generator, random if omitted
    #[arg(long)]
    pub graph_seed: Option<u64>,
    /// Never hand the same puzzle seed out twice
    #[arg(long)]
    pub strict_seeds: bool,
    /// Number of crawler workers, 1 crawls sequentially
    #[arg(long, default_value = "8")]
    pub thread_count: usize,
    /// Maximum number of pages to crawl
    #[arg(long, default_value = "100000")]
    pub max_pages: usize,
    /// Retries of a failing page
    #[arg(long, default_value = "50")]
    pub max_retries: usize,
    /// Multiplier applied to simulated page delays
    #[arg(long, default_value = "1.0")]
    pub delay_scale: f64,
    /// Page to report the shortest discovered path to
    #[arg(short, long)]
    pub target_page: Option<String>,
    /// Output file for the discovered graph
    #[arg(short, long)]
    pub output_file: Option<PathBuf>,
    /// Logging level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", value_enum)]
    pub log_level: LogLevel,
}

impl Config {
    pub fn new() -> Self {
        Self::parse()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.thread_count == 0 {
            anyhow::bail!("thread_count must be greater than 0");
        }
        if self.max_pages == 0 {
            anyhow::bail!("max_pages must be greater than 0");
        }
        if self.delay_scale.is_nan() || self.delay_scale < 0.0 {
            anyhow::bail!("delay_scale must not be negative");
        }
        self.graph_config().validate()
    }

    pub fn graph_config(&self) -> GraphConfig {
        GraphConfig {
            total_pages: self.total_pages,
            id_length: self.id_length,
            avg_links_per_page: self.avg_links,
            delay_page_probability: self.delay_probability,
            failure_page_probability: self.failure_probability,
            cpu_page_probability: self.cpu_probability,
            core_page_probability: self.core_probability,
            cpu_iterations: self.cpu_iterations,
            core_iterations: self.core_iterations,
            core_seeds_per_char: self.core_seeds_per_char,
            ..GraphConfig::default()
        }
    }

    pub fn issue_policy(&self) -> IssuePolicy {
        if self.strict_seeds {
            IssuePolicy::Strict
        } else {
            IssuePolicy::Relaxed
        }
    }
}

/// Simulated latency of each page type, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageDelays {
    pub regular_ms: u64,
    pub delay_ms: u64,
    pub failure_ms: u64,
    pub cpu_ms: u64,
    pub core_ms: u64,
    pub root_ms: u64,
}

impl Default for PageDelays {
    fn default() -> Self {
        Self {
            regular_ms: 500,
            delay_ms: 5000,
            failure_ms: 500,
            cpu_ms: 100,
            core_ms: 100,
            root_ms: 0,
        }
    }
}

impl PageDelays {
    /// No latency at all, for tests and benchmarks of the puzzles alone
    pub fn none() -> Self {
        Self {
            regular_ms: 0,
            delay_ms: 0,
            failure_ms: 0,
            cpu_ms: 0,
            core_ms: 0,
            root_ms: 0,
        }
    }

    pub fn for_type(&self, page_type: PageType) -> Duration {
        let ms = match page_type {
            PageType::Regular => self.regular_ms,
            PageType::Delay => self.delay_ms,
            PageType::Failure => self.failure_ms,
            PageType::Cpu => self.cpu_ms,
            PageType::Core => self.core_ms,
            PageType::Root => self.root_ms,
        };
        Duration::from_millis(ms)
    }
}

/// Shape of the generated graph and cost of its puzzles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    pub total_pages: usize,
    pub id_length: usize,
    pub avg_links_per_page: usize,
    pub delay_page_probability: f64,
    pub failure_page_probability: f64,
    pub cpu_page_probability: f64,
    pub core_page_probability: f64,
    /// Probability that a failure page answers with an error
    pub failure_error_rate: f64,
    /// Probability that an extra edge is drawn among regular pages only
    pub regular_page_bias: f64,
    /// Densification attempts, ten per wanted edge if unset
    pub max_edge_attempts: Option<usize>,
    /// Page ids that must have a CPU seed, all pages if unset
    pub cpu_coverage: Option<usize>,
    pub cpu_iterations: u64,
    pub core_iterations: u64,
    pub core_seeds_per_char: usize,
    pub delays: PageDelays,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            total_pages: 100,
            id_length: 6,
            avg_links_per_page: 3,
            delay_page_probability: 0.1,
            failure_page_probability: 0.1,
            cpu_page_probability: 0.1,
            core_page_probability: 0.1,
            failure_error_rate: 0.9,
            regular_page_bias: 0.0,
            max_edge_attempts: None,
            cpu_coverage: None,
            cpu_iterations: 5_000_000,
            core_iterations: 1_250_000,
            core_seeds_per_char: 2,
            delays: PageDelays::default(),
        }
    }
}

impl GraphConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.total_pages == 0 {
            anyhow::bail!("total_pages must be greater than 0");
        }
        if self.id_length == 0 {
            anyhow::bail!("id_length must be greater than 0");
        }
        let probabilities = [
            ("delay_page_probability", self.delay_page_probability),
            ("failure_page_probability", self.failure_page_probability),
            ("cpu_page_probability", self.cpu_page_probability),
            ("core_page_probability", self.core_page_probability),
            ("failure_error_rate", self.failure_error_rate),
            ("regular_page_bias", self.regular_page_bias),
        ];
        for (name, p) in probabilities {
            if !(0.0..=1.0).contains(&p) {
                anyhow::bail!("{} must be within [0, 1], got {}", name, p);
            }
        }
        let total = self.delay_page_probability
            + self.failure_page_probability
            + self.cpu_page_probability
            + self.core_page_probability;
        if total > 1.0 {
            anyhow::bail!("Page type probabilities sum to {:.2}, must be <= 1.0", total);
        }
        Ok(())
    }

    pub fn puzzle_settings(&self, policy: IssuePolicy) -> PuzzleSettings {
        PuzzleSettings {
            id_length: self.id_length,
            cpu_iterations: self.cpu_iterations,
            core_iterations: self.core_iterations,
            seed_length: SEED_LENGTH,
            policy,
        }
    }

    pub fn target_edges(&self) -> usize {
        self.total_pages * self.avg_links_per_page
    }

    /// Exact number of pages of each non-regular type
    pub fn type_counts(&self) -> [(PageType, usize); 4] {
        let count = |p: f64| (self.total_pages as f64 * p) as usize;
        [
            (PageType::Core, count(self.core_page_probability)),
            (PageType::Cpu, count(self.cpu_page_probability)),
            (PageType::Failure, count(self.failure_page_probability)),
            (PageType::Delay, count(self.delay_page_probability)),
        ]
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = GraphConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.target_edges(), 300);
        assert_eq!(config.type_counts().iter().map(|(_, c)| c).sum::<usize>(), 40);
    }

    #[test]
    fn test_probabilities_over_one() {
        let config = GraphConfig {
            cpu_page_probability: 0.5,
            core_page_probability: 0.5,
            ..GraphConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_probability_out_of_range() {
        let config = GraphConfig {
            failure_error_rate: 1.5,
            ..GraphConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let config = Config::parse_from(["webgraph", "--total-pages", "20", "--id-length", "4", "--strict-seeds"]);
        let graph = config.graph_config();
        assert_eq!(graph.total_pages, 20);
        assert_eq!(graph.id_length, 4);
        assert_eq!(config.issue_policy(), IssuePolicy::Strict);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cli_page_type_probabilities() {
        let config = Config::parse_from([
            "webgraph",
            "--delay-probability",
            "0.2",
            "--failure-probability",
            "0.05",
            "--cpu-probability",
            "0.3",
            "--core-probability",
            "0.25",
        ]);
        let graph = config.graph_config();
        assert_eq!(graph.delay_page_probability, 0.2);
        assert_eq!(graph.failure_page_probability, 0.05);
        assert_eq!(graph.cpu_page_probability, 0.3);
        assert_eq!(graph.core_page_probability, 0.25);
        assert!(config.validate().is_ok());
        assert_eq!(
            graph.type_counts(),
            [
                (PageType::Core, 25),
                (PageType::Cpu, 30),
                (PageType::Failure, 5),
                (PageType::Delay, 20)
            ]
        );

        let defaults = Config::parse_from(["webgraph"]).graph_config();
        assert_eq!(defaults.cpu_page_probability, GraphConfig::default().cpu_page_probability);

        let too_many = Config::parse_from(["webgraph", "--cpu-probability", "0.9", "--core-probability", "0.9"]);
        assert!(too_many.validate().is_err());
    }
}
