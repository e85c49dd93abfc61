pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod messaging;
pub mod metrics;
pub mod query;
pub mod storage;
pub mod utils;

#[cfg(test)]
mod testing;
