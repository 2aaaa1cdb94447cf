//! Collaborators that work items delegate to: a JSON-over-HTTP fetch and a
//! SQLite insert. Both convert `BridgeError` so they compose with
//! [`BridgePoolInner::try_run`](crate::pool::BridgePoolInner::try_run).

pub mod db;
pub mod http;

pub use db::{Database, DbError};
pub use http::{fetch_json, fetch_todo, FetchError, Todo};
