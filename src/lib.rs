//! docbase - an embeddable document database
//!
//! Documents live in tables, carry engine-generated ids and creation
//! timestamps, and are queried with flat AND filters over decoded values.
//! Tables are created lazily on first write, or declared up front through a
//! schema and migrated transactionally.

pub mod catalog;
pub mod db;
pub mod migration;
pub mod observability;
pub mod schema;
pub mod storage;
pub mod store;
pub mod value;

pub use db::Database;
