use crate::types::JobId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: JobId },

    /// Invalid configuration or input.
    #[error("Validation failed: {0}")]
    Validation(String),
}
