use crate::dynamics::build_system;
use crate::model::{Model, Population};
use crate::ode::{self, OdeOptions, State, linspace};
use crate::schedule::{Phase, Schedule};
use crate::trajectory::{Record, Trajectory};
use anyhow::{Context, Result};

/// Schedule engine.
///
/// Runs the optional settling phase and then steps through the phase cycle, advancing
/// the phase index modulo the cycle length. The final state and generation of each
/// phase seed the next one.
#[derive(Debug, Clone)]
pub struct Engine {
    model: Model,
    solver: OdeOptions,
}

impl Engine {
    pub fn new(model: Model, solver: OdeOptions) -> Self {
        Self { model, solver }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Run a whole schedule starting from `init` at generation zero.
    ///
    /// Each phase contributes its own records, so phase boundaries appear twice with the
    /// same generation and state.
    pub fn run(&self, init: Population, schedule: &Schedule) -> Result<Trajectory> {
        let mut traj = Trajectory::with_capacity(schedule.n_records());
        let mut generation = 0.0;
        let mut pop = init;

        if let Some(settle) = schedule.settle() {
            pop = self
                .run_phase(settle, schedule, generation, pop, &mut traj)
                .context("failed to run settling phase")?;
            generation += settle.duration;
        }

        let cycle = schedule.cycle();
        let n_segments = schedule.n_cycles() * cycle.len();
        let mut i_phase = 0;
        for i_segment in 0..n_segments {
            let phase = &cycle[i_phase];
            pop = self
                .run_phase(phase, schedule, generation, pop, &mut traj)
                .with_context(|| {
                    format!(
                        "failed to run phase {:?} of cycle {}",
                        phase.label,
                        i_segment / cycle.len()
                    )
                })?;
            generation += phase.duration;
            i_phase = (i_phase + 1) % cycle.len();
        }

        Ok(traj)
    }

    fn run_phase(
        &self,
        phase: &Phase,
        schedule: &Schedule,
        start: f64,
        pop: Population,
        traj: &mut Trajectory,
    ) -> Result<Population> {
        let system = build_system(&self.model, &phase.regime)
            .with_context(|| format!("failed to build dynamics of phase {:?}", phase.label))?;

        let times = linspace(start, start + phase.duration, schedule.n_points(phase));
        let states = ode::solve(&system, State::from(pop.0), &times, &self.solver)?;

        let mut last = pop;
        for (&generation, state) in times.iter().zip(&states) {
            last = Population([state[0], state[1], state[2], state[3]]);
            traj.push(Record::new(generation, &last));
        }

        log::debug!(
            "phase {:?} ended at generation {:.3} with {:?}",
            phase.label,
            start + phase.duration,
            last.0
        );

        Ok(last)
    }
}
