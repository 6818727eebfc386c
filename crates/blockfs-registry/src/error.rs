use thiserror::Error;

pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("coordination store error: {0}")]
    Store(#[from] etcd_client::Error),

    #[error("serialization error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("non-utf8 registry key: {0}")]
    InvalidKey(#[from] std::string::FromUtf8Error),

    #[error("watch closed unexpectedly")]
    WatchClosed,

    #[error("registry client is closed")]
    Closed,
}
