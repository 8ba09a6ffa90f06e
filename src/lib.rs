pub mod config;
pub mod dataset;
pub mod error;
pub mod loader;
pub mod logging;
pub mod metrics;
pub mod reconcile;
pub mod server;
pub mod storage;
pub mod table;
