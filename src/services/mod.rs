//! Service layer for payment-recon.

pub mod database;
pub mod ingest;
pub mod matching;
pub mod metrics;
pub mod notify;
pub mod providers;

pub use database::Database;
pub use metrics::{get_metrics, init_metrics};
