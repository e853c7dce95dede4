pub mod client;
pub mod config;
pub mod dal;
pub mod error;
pub mod models;
pub mod openapi;
pub mod rate_limit; // in-memory submission limiting
pub mod routes;
pub mod storage;
pub mod store;

// Re-export commonly used items for tests / external users
pub use client::HandleCache;
pub use dal::{Dal, DalError};
pub use routes::{config, AppState};
