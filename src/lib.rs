pub mod cache;
pub mod cli;
pub mod config;
pub mod flock;
pub mod latest;
pub mod model;
pub mod repository;
pub mod resolve;
pub mod resolver;
pub mod retrieve;
pub mod settings;
pub mod version;

mod api;

pub use api::{Depchain, DepchainBuilder, PublishOptions};
