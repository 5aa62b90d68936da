//! Shared model, storage and configuration for the tiles dashboard.

pub mod config;
pub mod platform;
pub mod protocol;
pub mod store;
