//! Document storage: CRUD, queries, and change notification

mod document;
mod errors;
pub mod query;
#[allow(clippy::module_inception)]
mod store;

pub use document::{generate_id, Document};
pub use errors::{StoreError, StoreResult};
pub use query::{Filter, FilterOp, Order, QueryOptions};
pub use store::{ChangeListener, DocumentStore};
