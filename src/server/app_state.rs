use std::sync::Arc;

use crate::{catalog::Catalog, configs::Config, player::RoomRegistry};

/// Top-level application state shared by every request handler.
pub struct AppState {
    pub registry: RoomRegistry,
    pub catalog: Arc<dyn Catalog>,
    pub config: Config,
}
