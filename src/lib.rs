pub mod api;
pub mod blockchain;
pub mod cache;
pub mod config;
pub mod models;
pub mod service;
pub mod state;
pub mod sync;
pub mod tracking;
pub mod validation;

#[cfg(test)]
pub mod tests;

// Re-export specific items for convenience
pub use api::error::ApiError;
pub use api::response::ApiResponse;
pub use api::route::create_router;
pub use models::{ActionRecord, Asset, TrackedUser};
pub use service::NodeService;
pub use validation::validate_account_name;
