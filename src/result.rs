use super::errors::BridgeError;

pub type BridgeResult<T> = Result<T, BridgeError>;
