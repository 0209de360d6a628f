//! Segment integration with `ode_solvers`' Dormand–Prince 5(4) stepper, sampled at the
//! requested output times.

use crate::error::SimError;
use ode_solvers::Vector4;
use ode_solvers::dop_shared::{IntegrationError, OutputType, System};
use ode_solvers::dopri5::Dopri5;
use serde::{Deserialize, Serialize};

/// State vector of the four cell populations.
pub type State = Vector4<f64>;

/// Integrator tolerances and limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OdeOptions {
    /// Relative tolerance.
    pub rtol: f64,
    /// Absolute tolerance.
    pub atol: f64,
    /// Largest step size.
    pub h_max: f64,
    /// Maximum number of attempted steps per call.
    pub max_steps: u32,
}

impl Default for OdeOptions {
    fn default() -> Self {
        Self {
            rtol: 1e-8,
            atol: 1e-10,
            h_max: f64::INFINITY,
            max_steps: 1_000_000,
        }
    }
}

impl OdeOptions {
    /// Check the options can drive the stepper.
    ///
    /// # Errors
    /// Returns [`SimError::InvalidOptions`] for non-positive or NaN tolerances and step
    /// sizes, or a zero step budget.
    pub fn validate(&self) -> Result<(), SimError> {
        let positive = |val: f64| val > 0.0;
        if !(positive(self.rtol) && self.rtol.is_finite()) {
            return Err(SimError::InvalidOptions(format!(
                "relative tolerance must be positive and finite, but is {}",
                self.rtol
            )));
        }
        if !(positive(self.atol) && self.atol.is_finite()) {
            return Err(SimError::InvalidOptions(format!(
                "absolute tolerance must be positive and finite, but is {}",
                self.atol
            )));
        }
        if !positive(self.h_max) {
            return Err(SimError::InvalidOptions(format!(
                "maximum step size must be positive, but is {}",
                self.h_max
            )));
        }
        if self.max_steps == 0 {
            return Err(SimError::InvalidOptions("step budget must be positive".into()));
        }
        Ok(())
    }
}

/// Integrate `sys` from `y0` at `times[0]` and return the state at every entry of `times`.
///
/// Each output interval is handed to a fresh stepper that ends exactly on the output time.
/// The first returned state is `y0` itself. `max_steps` bounds the steps of the whole call.
///
/// # Errors
/// Returns an error if the options or time grid are invalid, or if the integration fails
/// to follow the dynamics (non-finite values, step-size underflow, stiffness or too many
/// steps).
pub fn solve<S>(
    sys: &S,
    y0: State,
    times: &[f64],
    opts: &OdeOptions,
) -> Result<Vec<State>, SimError>
where
    S: System<f64, State> + Clone,
{
    opts.validate()?;
    let Some(&t0) = times.first() else {
        return Err(SimError::InvalidTimes("no time points".into()));
    };
    if times.iter().any(|t| !t.is_finite()) {
        return Err(SimError::InvalidTimes("time points must be finite".into()));
    }
    if times.windows(2).any(|pair| pair[1] < pair[0]) {
        return Err(SimError::InvalidTimes("time points must be non-decreasing".into()));
    }
    if y0.iter().any(|y| !y.is_finite()) {
        return Err(SimError::NonFinite { generation: t0 });
    }

    let mut states = Vec::with_capacity(times.len());
    states.push(y0);

    let mut y = y0;
    let mut n_steps = 0;
    for pair in times.windows(2) {
        let (start, stop) = (pair[0], pair[1]);
        if stop > start {
            if n_steps >= opts.max_steps {
                return Err(SimError::MaxStepsExceeded {
                    generation: start,
                    max_steps: opts.max_steps,
                });
            }
            let budget = opts.max_steps - n_steps;
            let span = stop - start;
            let mut stepper = Dopri5::from_param(
                sys.clone(),
                start,
                stop,
                span,
                y,
                opts.rtol,
                opts.atol,
                0.9,
                0.04,
                0.2,
                10.0,
                opts.h_max.min(span),
                0.0,
                budget,
                1000,
                OutputType::Sparse,
            );
            let stats = stepper.integrate().map_err(|err| match err {
                IntegrationError::MaxNumStepReached { x, .. } => SimError::MaxStepsExceeded {
                    generation: x,
                    max_steps: opts.max_steps,
                },
                IntegrationError::StepSizeUnderflow { x } => {
                    SimError::StepSizeUnderflow { generation: x }
                }
                IntegrationError::StiffnessDetected { x } => {
                    SimError::StiffnessDetected { generation: x }
                }
            })?;
            n_steps = n_steps.saturating_add(stats.accepted_steps + stats.rejected_steps);

            y = *stepper
                .y_out()
                .last()
                .ok_or(SimError::NonFinite { generation: stop })?;
            if y.iter().any(|val| !val.is_finite()) {
                return Err(SimError::NonFinite { generation: stop });
            }
        }
        states.push(y);
    }

    Ok(states)
}

/// Evenly spaced time points from `start` to `stop`, both included.
pub fn linspace(start: f64, stop: f64, n_points: usize) -> Vec<f64> {
    match n_points {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n_points - 1) as f64;
            (0..n_points)
                .map(|i| if i + 1 == n_points { stop } else { start + step * i as f64 })
                .collect()
        }
    }
}
