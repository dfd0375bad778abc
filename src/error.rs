use std::os::raw::c_int;

use crate::resample::ResampleError;

/// Status returned across the C boundary on success, including empty output.
pub const STATUS_OK: c_int = 0;

/// Errors surfaced by the bridge.
///
/// Every variant maps onto a negative status code through [`BridgeError::status`].
#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    #[error("Failed to initialize voice: {0}")]
    Initialization(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Session not initialized. Call initialize() first.")]
    NotInitialized,
    #[error("Synthesis failed: {0}")]
    Synthesis(String),
    #[error(transparent)]
    Resample(#[from] ResampleError),
    #[error("Failed to allocate output buffer: {0}")]
    Allocation(String),
}

impl BridgeError {
    /// Negative status code reported to C callers.
    pub fn status(&self) -> c_int {
        match self {
            BridgeError::Initialization(_)
            | BridgeError::InvalidArgument(_)
            | BridgeError::NotInitialized => -1,
            BridgeError::Synthesis(_) => -2,
            BridgeError::Resample(ResampleError::Execution(_)) => -4,
            BridgeError::Resample(_) => -3,
            BridgeError::Allocation(_) => -5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resample::best_quality;
    use rubato::{Resampler, SincFixedIn};

    #[test]
    fn every_error_is_negative() {
        let errors = [
            BridgeError::Initialization("x".into()),
            BridgeError::InvalidArgument("x".into()),
            BridgeError::NotInitialized,
            BridgeError::Synthesis("x".into()),
            BridgeError::Resample(ResampleError::Configuration("x".into())),
            BridgeError::Allocation("x".into()),
        ];
        for err in errors {
            assert!(err.status() < STATUS_OK, "{err} must map to a failure status");
        }
    }

    #[test]
    fn resample_configuration_and_execution_are_distinct() {
        let config = BridgeError::Resample(ResampleError::Configuration("bad".into()));
        assert_eq!(config.status(), -3);
        assert_eq!(BridgeError::NotInitialized.status(), -1);
    }

    #[test]
    fn resampler_construction_failure_is_configuration() {
        let err = SincFixedIn::<f32>::new(0.0, 1.0, best_quality(), 1024, 1)
            .err()
            .expect("zero ratio must be rejected");
        let err = BridgeError::from(ResampleError::from(err));
        assert_eq!(err.status(), -3);
    }

    #[test]
    fn resampler_processing_failure_is_execution() {
        let mut resampler =
            SincFixedIn::<f32>::new(0.5, 1.0, best_quality(), 1024, 1).expect("resampler");
        let too_short = vec![0.0f32; 8];
        let err = resampler
            .process(&[too_short.as_slice()], None)
            .expect_err("short input must be rejected");
        let err = BridgeError::from(ResampleError::from(err));
        assert!(matches!(err, BridgeError::Resample(ResampleError::Execution(_))));
        assert_eq!(err.status(), -4);
    }
}
