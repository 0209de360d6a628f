//! Schedule parameter searches: Nelder–Mead optimization and brute-force grids.

use crate::error::SimError;
use crate::objective::Objective;
use crate::schedule::{Schedule, Target};
use anyhow::{Context, Result, bail};
use argmin::{
    core::{CostFunction, Error, Executor, State, TerminationReason, TerminationStatus},
    solver::neldermead::NelderMead,
};
use serde::{Deserialize, Serialize};

/// Free schedule parameter with its starting value and box bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub target: Target,
    pub initial: f64,
    pub lower: f64,
    pub upper: f64,
}

impl Variable {
    fn clamp(&self, val: f64) -> f64 {
        val.clamp(self.lower, self.upper)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizeSettings {
    pub variables: Vec<Variable>,
    #[serde(default = "default_max_iters")]
    pub max_iters: u64,
    #[serde(default = "default_sd_tolerance")]
    pub sd_tolerance: f64,
}

fn default_max_iters() -> u64 {
    200
}

fn default_sd_tolerance() -> f64 {
    1e-6
}

/// Outcome of an optimization, reported as the solver left it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizeReport {
    pub targets: Vec<Target>,
    pub params: Vec<f64>,
    pub value: f64,
    pub iterations: u64,
    pub evaluations: u64,
    pub converged: bool,
    pub status: String,
}

/// Adapter between the optimizer's parameter vectors and schedules.
struct ScheduleProblem<'a> {
    objective: &'a Objective<'a>,
    base: &'a Schedule,
    variables: &'a [Variable],
}

impl ScheduleProblem<'_> {
    fn clamped(&self, param: &[f64]) -> Vec<f64> {
        self.variables
            .iter()
            .zip(param)
            .map(|(var, &val)| var.clamp(val))
            .collect()
    }

    fn schedule_at(&self, param: &[f64]) -> Result<Schedule> {
        let mut schedule = self.base.clone();
        for (var, val) in self.variables.iter().zip(self.clamped(param)) {
            schedule = schedule
                .with_override(&var.target, val)
                .with_context(|| format!("failed to apply {:?} = {val}", var.target))?;
        }
        Ok(schedule)
    }
}

impl CostFunction for ScheduleProblem<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> Result<Self::Output, Error> {
        let schedule = self.schedule_at(param)?;
        let summary = self.objective.evaluate(&schedule).inspect_err(|err| {
            if err
                .downcast_ref::<SimError>()
                .is_some_and(SimError::is_divergence)
            {
                log::warn!("dynamics diverged at {:?}", self.clamped(param));
            }
        })?;
        let value = summary.mean;
        log::debug!("objective at {:?} is {value}", self.clamped(param));
        Ok(value)
    }
}

/// Minimize the objective over the settings' variables with Nelder–Mead.
///
/// Candidate points are clamped into their bounds before being applied, so the objective
/// only ever sees in-bounds schedules.
///
/// # Errors
/// Returns an error if the settings are inconsistent or any evaluation fails.
pub fn optimize(
    objective: &Objective,
    base: &Schedule,
    settings: &OptimizeSettings,
) -> Result<OptimizeReport> {
    if settings.variables.is_empty() {
        bail!("no variables to optimize");
    }

    let problem = ScheduleProblem {
        objective,
        base,
        variables: &settings.variables,
    };

    let initial: Vec<_> = settings.variables.iter().map(|var| var.initial).collect();
    let simplex = create_initial_simplex(&initial);

    let solver: NelderMead<Vec<f64>, f64> = NelderMead::new(simplex)
        .with_sd_tolerance(settings.sd_tolerance)
        .context("failed to construct solver")?;

    let max_iters = settings.max_iters;
    let res = Executor::new(problem, solver)
        .configure(|state| state.max_iters(max_iters))
        .run()
        .context("failed to run optimizer")?;

    let state = res.state();
    let best_param = state.best_param.clone().context("optimizer found no point")?;
    let params = settings
        .variables
        .iter()
        .zip(&best_param)
        .map(|(var, &val)| var.clamp(val))
        .collect();

    let report = OptimizeReport {
        targets: settings.variables.iter().map(|var| var.target).collect(),
        params,
        value: state.best_cost,
        iterations: state.iter,
        evaluations: state
            .get_func_counts()
            .get("cost_count")
            .copied()
            .unwrap_or(0),
        converged: matches!(
            state.termination_status,
            TerminationStatus::Terminated(TerminationReason::SolverConverged)
        ),
        status: state.termination_status.to_string(),
    };
    if !report.converged {
        log::warn!("optimizer did not converge: {}", report.status);
    }

    Ok(report)
}

/// Initial simplex: the starting point plus one vertex per coordinate perturbed by 5%.
fn create_initial_simplex(initial_point: &[f64]) -> Vec<Vec<f64>> {
    let mut vertices = vec![initial_point.to_vec()];
    for i in 0..initial_point.len() {
        let mut vertex = initial_point.to_vec();
        vertex[i] = if vertex[i] == 0.0 {
            0.00025
        } else {
            vertex[i] * 1.05
        };
        vertices.push(vertex);
    }
    vertices
}

/// Evenly stepped values of one schedule parameter, `stop` included when reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub target: Target,
    pub start: f64,
    pub stop: f64,
    pub step: f64,
}

impl Axis {
    pub fn values(&self) -> Vec<f64> {
        let n_steps = ((self.stop - self.start) / self.step + 1e-9).floor() as usize;
        (0..=n_steps)
            .map(|i| self.start + self.step * i as f64)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepSettings {
    pub axes: Vec<Axis>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridPoint {
    pub values: Vec<f64>,
    pub objective: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub targets: Vec<Target>,
    pub points: Vec<GridPoint>,
    pub best: GridPoint,
}

/// Evaluate the objective on every point of the grid spanned by the settings' axes.
///
/// The last axis varies fastest.
///
/// # Errors
/// Returns an error if an axis is empty or any evaluation fails.
pub fn sweep(
    objective: &Objective,
    base: &Schedule,
    settings: &SweepSettings,
) -> Result<SweepReport> {
    for axis in &settings.axes {
        if !(axis.step > 0.0 && axis.stop >= axis.start) {
            bail!("axis {:?} must step forward from start to stop", axis.target);
        }
    }
    let axis_vals: Vec<_> = settings.axes.iter().map(Axis::values).collect();
    if axis_vals.is_empty() || axis_vals.iter().any(Vec::is_empty) {
        bail!("sweep grid is empty");
    }
    let n_points: usize = axis_vals.iter().map(Vec::len).product();

    let mut points = Vec::with_capacity(n_points);
    let mut idxs = vec![0; axis_vals.len()];
    for i_point in 0..n_points {
        let values: Vec<_> = idxs.iter().zip(&axis_vals).map(|(&i, vals)| vals[i]).collect();

        let mut schedule = base.clone();
        for (axis, &val) in settings.axes.iter().zip(&values) {
            schedule = schedule
                .with_override(&axis.target, val)
                .with_context(|| format!("failed to apply {:?} = {val}", axis.target))?;
        }
        let value = objective
            .evaluate(&schedule)
            .with_context(|| format!("failed to evaluate grid point {values:?}"))?
            .mean;
        points.push(GridPoint {
            values,
            objective: value,
        });

        let progress = 100.0 * (i_point + 1) as f64 / n_points as f64;
        log::info!("completed {progress:06.2}%");

        // Advance the odometer.
        for (i, vals) in idxs.iter_mut().zip(&axis_vals).rev() {
            *i += 1;
            if *i < vals.len() {
                break;
            }
            *i = 0;
        }
    }

    let best = points
        .iter()
        .min_by(|a, b| a.objective.total_cmp(&b.objective))
        .cloned()
        .context("sweep produced no points")?;

    Ok(SweepReport {
        targets: settings.axes.iter().map(|axis| axis.target).collect(),
        points,
        best,
    })
}
