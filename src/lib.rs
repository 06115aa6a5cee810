//! Channel subscriptions with rate-limited polling and a local thumbnail cache.

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod models;
pub mod queue;
pub mod services;
