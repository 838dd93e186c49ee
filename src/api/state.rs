use std::sync::Arc;

use crate::services::StylistService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub stylist: Arc<StylistService>,
}

impl AppState {
    pub fn new(stylist: Arc<StylistService>) -> Self {
        Self { stylist }
    }
}
