use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MomentError {
    /// Covariance is non-finite, asymmetric or fails the positive semi-definite check.
    #[error("invalid distribution: {0}")]
    InvalidDistribution(String),
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),
}

pub type Result<T> = std::result::Result<T, MomentError>;
