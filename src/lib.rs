//! Synthetic web graph with proof-of-work pages, and a crawler to race through it.

pub mod config;
pub mod crawler;
pub mod graph;
pub mod id_space;
pub mod pathfinder;
pub mod puzzle;
pub mod server;
