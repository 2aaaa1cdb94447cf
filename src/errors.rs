use thiserror::Error;

/// Failures of the bridge itself. Errors produced by a work item are not
/// wrapped here: they travel inside the work item's own output.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum BridgeError {
    #[error("thread pool unavailable: {0}")]
    ResourceUnavailable(String),
    #[error("isolated scheduler failed: {0}")]
    Scheduler(String),
    #[error("work item panicked: {0}")]
    Panic(String),
    #[error("outcome channel closed before the work item settled")]
    ChannelClosed,
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),
}
