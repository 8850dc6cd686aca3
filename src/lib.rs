pub mod coerce;
pub mod config;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod metrics;
pub mod pages;
pub mod persist;
pub mod render;
pub mod resolver;
pub mod retry;
pub mod session;
pub mod source;
pub mod state;
pub mod storage;
pub mod store;
