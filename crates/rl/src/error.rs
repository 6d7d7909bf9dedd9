use ml::MlError;
use moments::MomentError;
use physics::PlantError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PilcoError {
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("propagation failed at step {step}: {source}")]
    Propagation {
        step: usize,
        #[source]
        source: Box<PilcoError>,
    },
    #[error(transparent)]
    Moment(#[from] MomentError),
    #[error(transparent)]
    Ml(#[from] MlError),
    #[error(transparent)]
    Plant(#[from] PlantError),
    #[error("malformed scenario: {0}")]
    Json(#[from] serde_json::Error),
}

impl PilcoError {
    /// Whether the error marks a parameter point the optimiser should treat as
    /// infeasible (an unusable belief or a degenerate kernel) rather than a
    /// failure of the run itself.
    pub fn is_invalid_point(&self) -> bool {
        match self {
            PilcoError::Propagation { source, .. } => source.is_invalid_point(),
            PilcoError::Moment(e) => matches!(e, MomentError::InvalidDistribution(_)),
            PilcoError::Ml(e) => e.is_numerical(),
            PilcoError::Configuration(_) | PilcoError::Plant(_) | PilcoError::Json(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_invalid_distribution_is_an_invalid_point() {
        let inner = PilcoError::Moment(MomentError::InvalidDistribution("negative variance".into()));
        let err = PilcoError::Propagation { step: 3, source: Box::new(inner) };
        assert!(err.is_invalid_point());
        assert!(err.to_string().contains("step 3"));
        assert!(!PilcoError::Configuration("horizon".into()).is_invalid_point());
    }
}
