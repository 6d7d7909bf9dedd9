use moments::MomentError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlantError {
    #[error("state diverged at step {step}")]
    Diverged { step: usize },
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),
    #[error("controller failed: {0}")]
    Controller(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error(transparent)]
    Moment(#[from] MomentError),
}
