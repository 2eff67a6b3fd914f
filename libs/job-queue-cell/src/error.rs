use thiserror::Error;

use shared_models::AppError;

#[derive(Error, Debug)]
pub enum JobQueueError {
    #[error("Redis connection error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Redis pool error: {0}")]
    PoolError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Job not found: {0}")]
    JobNotFound(String),
}

impl From<JobQueueError> for AppError {
    fn from(err: JobQueueError) -> Self {
        AppError::Transient(err.to_string())
    }
}
