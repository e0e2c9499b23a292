// src/lib.rs

pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod state;
pub mod utils;

#[cfg(test)]
mod test_support;

// Re-exported for the integration tests.
pub use routes::create_router;
