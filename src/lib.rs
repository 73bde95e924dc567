// Library interface for catalogue_scraper
// The binary and the integration tests drive the pipeline through these modules

pub mod chapters;
pub mod config;
pub mod db;
pub mod error;
pub mod helpers;
pub mod http_client;
pub mod listing;
pub mod models;
pub mod pipeline;
pub mod reconcile;
pub mod scan_types;
pub mod scheduler;
pub mod snapshot;
