// src/lib.rs
pub mod config;
pub mod feed;
pub mod metrics;
pub mod probe;
pub mod revalidation;
pub mod server;
pub mod service;
pub mod store;
