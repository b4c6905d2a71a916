// src/feed/mod.rs
mod fetcher;

pub use fetcher::{parse_candidates, CandidateFetcher, FeedError};
