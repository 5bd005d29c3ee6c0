use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("malformed stored value: {0}")]
    Json(#[from] serde_json::Error),
}
