// Adapters layer: concrete implementations for external systems.

pub mod graph_api;

pub use graph_api::{ApiSettings, GraphApiClient};
