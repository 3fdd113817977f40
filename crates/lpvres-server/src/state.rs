use lpvres_informer::ClusterCache;
use lpvres_predicate::PredicateEngine;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Predicate engine, immutable after startup
    pub engine: Arc<PredicateEngine>,

    /// Latest cluster snapshot
    pub cache: Arc<ClusterCache>,
}

impl AppState {
    pub fn new(engine: Arc<PredicateEngine>, cache: Arc<ClusterCache>) -> Self {
        Self { engine, cache }
    }
}
