use crate::model::{Model, Population, Regime};
use crate::ode::OdeOptions;
use crate::schedule::{Phase, Schedule, Target};
use crate::search::{OptimizeSettings, SweepSettings};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt::Debug, fs, ops::RangeBounds, path::Path};

/// Scenario configuration.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Dynamical law shared by every phase.
    pub model: Model,

    /// Initial population.
    pub init: InitConfig,

    /// Drug regimens by name.
    pub regimes: BTreeMap<String, Regime>,

    /// Phase layout referencing `regimes` by name.
    pub schedule: ScheduleConfig,

    /// Integrator tolerances.
    #[serde(default)]
    pub solver: OdeOptions,

    /// Nelder–Mead search over schedule parameters.
    pub optimize: Option<OptimizeSettings>,

    /// Brute-force grid over schedule parameters.
    pub sweep: Option<SweepSettings>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct InitConfig {
    /// Fractions (fraction model) or numbers (number model) of OC, OB, MMd and MMr.
    pub state: Population,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct PhaseConfig {
    pub regime: String,
    pub duration: f64,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Phase run once before the cycles start.
    pub settle: Option<PhaseConfig>,

    /// Phases of one cycle, in order.
    pub phases: Vec<PhaseConfig>,

    /// Number of cycles.
    pub n_cycles: usize,

    /// Output time points per generation.
    #[serde(default = "default_resolution")]
    pub resolution: f64,
}

fn default_resolution() -> f64 {
    1.0
}

impl Config {
    /// Load a [`Config`] from a TOML file.
    ///
    /// Performs validation on all parameters before returning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;
        Self::parse(&contents)
    }

    /// Deserialize and validate a [`Config`] from a TOML string.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    /// Resolve the configured phases into a [`Schedule`].
    pub fn schedule(&self) -> Result<Schedule> {
        let settle = self
            .schedule
            .settle
            .as_ref()
            .map(|phase| self.phase(phase))
            .transpose()
            .context("invalid settling phase")?;
        let cycle = self
            .schedule
            .phases
            .iter()
            .map(|phase| self.phase(phase))
            .collect::<Result<Vec<_>>>()?;
        let schedule = Schedule::new(settle, cycle, self.schedule.n_cycles, self.schedule.resolution)?;
        Ok(schedule)
    }

    fn phase(&self, phase: &PhaseConfig) -> Result<Phase> {
        let regime = self
            .regimes
            .get(&phase.regime)
            .with_context(|| format!("unknown regime {:?}", phase.regime))?;
        Ok(Phase {
            label: phase.regime.clone(),
            duration: phase.duration,
            regime: regime.clone(),
        })
    }

    fn validate(&self) -> Result<()> {
        let is_number = self.model.is_number();
        if let Model::Fraction { n_interact, .. } = self.model {
            check_num(n_interact, 1.0..1e12).context("invalid interaction range size")?;
        }

        check_vec(&self.init.state.0, true).context("invalid initial state")?;
        if !is_number {
            let sum = self.init.state.total();
            let tol = 1e-8;
            if (sum - 1.0).abs() > tol {
                bail!("initial fractions must sum to 1.0 (tolerance: {tol}), but sum to {sum}");
            }
        } else if self.init.state.total() <= 0.0 {
            bail!("initial population must not be empty");
        }

        for (name, regime) in &self.regimes {
            check_regime(regime, is_number).with_context(|| format!("invalid regime {name:?}"))?;
        }

        self.schedule().context("invalid schedule")?;

        check_num(self.solver.rtol, 1e-14..1.0).context("invalid relative tolerance")?;
        check_num(self.solver.atol, 1e-300..1.0).context("invalid absolute tolerance")?;
        check_num(self.solver.h_max, 1e-9..).context("invalid maximum step size")?;
        check_num(self.solver.max_steps, 1..).context("invalid maximum number of steps")?;

        if let Some(optimize) = &self.optimize {
            self.check_optimize(optimize)
                .context("invalid optimization settings")?;
        }
        if let Some(sweep) = &self.sweep {
            self.check_sweep(sweep).context("invalid sweep settings")?;
        }

        Ok(())
    }

    fn check_optimize(&self, optimize: &OptimizeSettings) -> Result<()> {
        if optimize.variables.is_empty() {
            bail!("at least one variable is required");
        }
        for (i_var, var) in optimize.variables.iter().enumerate() {
            let check = || -> Result<()> {
                self.check_target(&var.target, var.lower)?;
                if !(var.lower <= var.initial && var.initial <= var.upper) {
                    bail!(
                        "initial value {} must lie within [{}, {}]",
                        var.initial,
                        var.lower,
                        var.upper
                    );
                }
                Ok(())
            };
            check().with_context(|| format!("invalid variable {i_var}"))?;
        }
        check_num(optimize.max_iters, 1..).context("invalid maximum number of iterations")?;
        check_num(optimize.sd_tolerance, 0.0..1.0).context("invalid tolerance")?;
        Ok(())
    }

    fn check_sweep(&self, sweep: &SweepSettings) -> Result<()> {
        if sweep.axes.is_empty() {
            bail!("at least one axis is required");
        }
        for (i_axis, axis) in sweep.axes.iter().enumerate() {
            let check = || -> Result<()> {
                self.check_target(&axis.target, axis.start)?;
                check_num(axis.step, f64::MIN_POSITIVE..).context("invalid step")?;
                if axis.stop < axis.start {
                    bail!("stop {} must not be below start {}", axis.stop, axis.start);
                }
                Ok(())
            };
            check().with_context(|| format!("invalid axis {i_axis}"))?;
        }
        Ok(())
    }

    /// Check that `target` exists and that `lowest` is a usable value for it.
    fn check_target(&self, target: &Target, lowest: f64) -> Result<()> {
        let n_phases = self.schedule.phases.len();
        check_num(target.phase(), 0..n_phases).context("invalid phase index")?;
        match *target {
            Target::Duration { .. } => {
                let min_duration = 0.5 / self.schedule.resolution;
                check_num(lowest, min_duration..).context("duration too short")?;
            }
            Target::WmmdIh { .. } => {}
            Target::MatrixEntry { row, col, .. } => {
                check_num(row, 0..4).context("invalid matrix row")?;
                check_num(col, 0..4).context("invalid matrix column")?;
            }
        }
        Ok(())
    }
}

fn check_regime(regime: &Regime, is_number: bool) -> Result<()> {
    check_mat(regime.matrix.rows()).context("invalid interaction matrix")?;
    if is_number {
        let growth = regime.growth.context("number model requires growth rates")?;
        let decay = regime.decay.context("number model requires decay rates")?;
        check_vec(&growth, false).context("invalid growth rates")?;
        check_vec(&decay, false).context("invalid decay rates")?;
    } else {
        let cost = regime.cost.context("fraction model requires costs")?;
        check_vec(&cost, false).context("invalid costs")?;
    }
    if !regime.wmmd_ih.is_finite() {
        bail!("WMMd inhibitor strength must be finite");
    }
    Ok(())
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}

fn check_vec(vec: &[f64], non_neg: bool) -> Result<()> {
    if vec.iter().any(|ele| !ele.is_finite()) {
        bail!("vector must have only finite elements");
    }
    if non_neg && vec.iter().any(|&ele| ele < 0.0) {
        bail!("vector must have only non-negative elements");
    }
    Ok(())
}

fn check_mat(mat: &[[f64; 4]; 4]) -> Result<()> {
    for (i_row, row) in mat.iter().enumerate() {
        check_vec(row, false).with_context(|| format!("invalid row {i_row}"))?;
    }
    Ok(())
}
