//! News 4U - an RSS news aggregation backend.
//!
//! Polls configured RSS feeds on a schedule, stores articles in SQLite,
//! extracts full article text from source pages, and serves the
//! collection over a JSON API under `/api/news`.

pub mod config;
pub mod db;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod routes;
pub mod scheduler;
pub mod slug;
