// Catalog query engine for a vehicle dealership listing: URL filter codec,
// backend page normalization, "load more" accumulation, client-side sorting
// and the controller tying them together, plus the axum routes on top.

use std::sync::Arc;

pub mod config;
pub mod controller;
pub mod error;
pub mod filter_codec;
pub mod models;
pub mod page_mapper;
pub mod routes;
pub mod search_api;
pub mod sort;
pub mod store;

use crate::config::Settings;
use crate::filter_codec::FilterCodec;
use crate::search_api::SearchBackend;

// Shared application state for the HTTP surface
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub codec: Arc<FilterCodec>,
    pub backend: Arc<dyn SearchBackend>,
}
