//! `officio-import` — bulk reconciliation import engine.
//!
//! Ingests heterogeneous spreadsheet exports (a company-master export and
//! two variants of a department-responsibility matrix) and reconciles them
//! against a live entity graph: companies keyed by business code,
//! departments known by name, responsible persons provisioned on demand.
//!
//! Pure engine crate: receives decoded text plus collaborator handles,
//! returns an [`ImportReport`]. No CLI or network endpoint of its own.
//! Each row is reconciled independently — the default completion mode is
//! partial success, never all-or-nothing.

pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod provision;
pub mod report;
pub mod resolve;
pub mod retry;
pub mod schema;
pub mod store;
pub mod verify;
pub mod writer;

pub use config::ImportConfig;
pub use engine::{assign_department_bulk, run_master_import, run_matrix_import};
pub use error::{ImportError, StoreError, StoreErrorKind};
pub use model::{Phase, Progress};
pub use report::ImportReport;
pub use store::Stores;
