//! Shared application state for all routes.

use crate::service::EntityRepository;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    /// Entity store; the only shared resource, its pool is safe for concurrent use.
    pub entities: Arc<dyn EntityRepository>,
}

impl AppState {
    pub fn new<R: EntityRepository + 'static>(entities: R) -> Self {
        AppState {
            entities: Arc::new(entities),
        }
    }
}
