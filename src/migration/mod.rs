//! Transactional schema migrations

mod engine;
mod errors;
mod types;

pub use engine::MigrationEngine;
pub use errors::{MigrationError, MigrationResult};
pub use types::{MigrationOp, MigrationPlan};
