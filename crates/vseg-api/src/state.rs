//! Application state.

use vseg_worker::Pipeline;

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub pipeline: Pipeline,
}

impl AppState {
    pub fn new(config: ApiConfig, pipeline: Pipeline) -> Self {
        Self { config, pipeline }
    }
}
