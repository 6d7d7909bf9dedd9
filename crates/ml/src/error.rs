use moments::MomentError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MlError {
    #[error("training failed for output {output}: {reason}")]
    TrainingFailure { output: usize, reason: String },
    #[error("kernel matrix is not positive definite: {0}")]
    SingularKernel(String),
    #[error("optimizer start point has a non-finite value or gradient")]
    InvalidStart,
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),
    #[error(transparent)]
    Moment(#[from] MomentError),
}

impl MlError {
    /// Whether the error stems from an unusable belief or degenerate kernel
    /// rather than from a programming or configuration mistake.
    pub fn is_numerical(&self) -> bool {
        matches!(self, MlError::SingularKernel(_) | MlError::Moment(MomentError::InvalidDistribution(_)))
    }
}
