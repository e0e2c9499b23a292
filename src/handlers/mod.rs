// src/handlers/mod.rs

pub mod auth;
pub mod health;
pub mod notifications;
pub mod posts;
pub mod users;
