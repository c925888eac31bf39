//! Services module for billing-service.

pub mod audit;
pub mod database;
pub mod invoicing;
pub mod metrics;
pub mod notification;
pub mod payments;
pub mod quotes;
pub mod reconciliation;
pub mod storage;

pub use database::Database;
pub use metrics::{get_metrics, init_metrics};
