pub mod config;
pub mod models;
pub mod routes;
pub mod services;

#[cfg(test)]
mod testing;

use std::time::Instant;

use crate::config::Config;
use crate::services::resolver::Resolver;

/// Application state shared across handlers
pub struct AppState {
    pub config: Config,
    pub resolver: Resolver,
    pub start_time: Instant,
}
