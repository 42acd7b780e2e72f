//! Command handlers.

pub mod caption;
pub mod config;
pub mod models;
pub mod serve;
