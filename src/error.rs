use thiserror::Error;

/// Failures that callers need to tell apart from a valid (if poor) result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("integration produced non-finite values at generation {generation}")]
    NonFinite { generation: f64 },

    #[error("step size became too small at generation {generation}")]
    StepSizeUnderflow { generation: f64 },

    #[error("dynamics became stiff at generation {generation}")]
    StiffnessDetected { generation: f64 },

    #[error("exceeded {max_steps} integration steps at generation {generation}")]
    MaxStepsExceeded { generation: f64, max_steps: u32 },

    #[error("invalid time grid: {0}")]
    InvalidTimes(String),

    #[error("invalid solver options: {0}")]
    InvalidOptions(String),

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),
}

impl SimError {
    /// Whether the integrator failed to follow the dynamics.
    pub fn is_divergence(&self) -> bool {
        matches!(
            self,
            Self::NonFinite { .. }
                | Self::StepSizeUnderflow { .. }
                | Self::StiffnessDetected { .. }
                | Self::MaxStepsExceeded { .. }
        )
    }
}
