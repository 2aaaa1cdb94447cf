//! Run async work on an isolated event loop inside a worker thread and await
//! its outcome from another event loop.
//!
//! # Features
//! - One fresh current-thread runtime per delegation, closed on every exit path
//! - Work items may be `!Send` and get an explicit `IsolatedContext`
//! - The outer loop only awaits a oneshot, so it is never blocked
//! - Bounded admission with `ResourceUnavailable` on exhaustion or shutdown
//! - Panic capture, graceful shutdown and pool metrics

pub mod collab;
pub mod config;
pub mod errors;
pub mod handle;
pub mod isolated;
pub mod model;
pub mod pool;
pub mod result;

pub use config::Config;
pub use errors::BridgeError;
pub use handle::JoinHandle;
pub use isolated::IsolatedContext;
pub use pool::{BridgePool, BridgePoolInner};
pub use result::BridgeResult;
