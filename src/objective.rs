use crate::engine::Engine;
use crate::model::Population;
use crate::schedule::Schedule;
use crate::stats::{Accumulator, Summary};
use crate::trajectory::Trajectory;
use anyhow::{Context, Result, bail};

/// Average myeloma fraction over the last cycle of a schedule.
///
/// Has no state besides its inputs, so repeated evaluations are independent.
pub struct Objective<'a> {
    engine: &'a Engine,
    init: Population,
}

impl<'a> Objective<'a> {
    pub fn new(engine: &'a Engine, init: Population) -> Self {
        Self { engine, init }
    }

    /// Run `schedule` and summarise the total MM fraction over its final cycle.
    ///
    /// The objective value is [`Summary::mean`].
    ///
    /// # Errors
    /// Returns an error if the run fails, including numerical divergence.
    pub fn evaluate(&self, schedule: &Schedule) -> Result<Summary> {
        let traj = self
            .engine
            .run(self.init, schedule)
            .context("failed to run schedule")?;
        self.summarize(&traj, schedule)
    }

    /// Summarise the total MM fraction of an existing run of `schedule` over its final cycle.
    ///
    /// # Errors
    /// Returns an error if the run is empty or a number-model total is not positive.
    pub fn summarize(&self, traj: &Trajectory, schedule: &Schedule) -> Result<Summary> {
        let fractions;
        let traj = if self.engine.model().is_number() {
            fractions = traj
                .to_fractions()
                .context("failed to convert numbers to fractions")?;
            &fractions
        } else {
            traj
        };

        let tail = traj.tail(schedule.cycle_duration());
        if tail.is_empty() {
            bail!("schedule produced no records");
        }

        let mut acc = Accumulator::new();
        acc.extend(tail.iter().map(|record| record.total_mm));
        Ok(acc.report())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DrugEffect, InteractionMatrix, Model, Regime};
    use crate::ode::OdeOptions;
    use crate::schedule::{Phase, tests::phase};

    #[test]
    fn drug_never_beats_no_drug() {
        for drug_effect in [DrugEffect::Raw, DrugEffect::CostScaled] {
            let model = Model::Fraction {
                n_interact: 50.0,
                drug_effect,
            };
            let engine = Engine::new(model, OdeOptions::default());
            let objective = Objective::new(&engine, Population::new(0.6, 0.3, 0.08, 0.02));

            let evaluate = |wmmd_ih: f64| {
                let schedule =
                    Schedule::new(None, vec![phase("continuous", 50.0, wmmd_ih)], 8, 1.0).unwrap();
                objective.evaluate(&schedule).unwrap().mean
            };

            let untreated = evaluate(0.0);
            assert!(untreated > 0.3 && untreated < 0.4, "{untreated}");
            for wmmd_ih in [0.1, 0.2, 0.3, 0.4] {
                let treated = evaluate(wmmd_ih);
                assert!(treated < untreated, "{drug_effect:?} {wmmd_ih}: {treated}");
            }
        }
    }

    #[test]
    fn settling_phase_is_outside_window() {
        let model = Model::Fraction {
            n_interact: 50.0,
            drug_effect: DrugEffect::Raw,
        };
        let engine = Engine::new(model, OdeOptions::default());
        let objective = Objective::new(&engine, Population::new(0.6, 0.3, 0.08, 0.02));

        let cycle = vec![phase("drug", 10.0, 0.3), phase("holiday", 5.0, 0.0)];
        let schedule = Schedule::new(Some(phase("settle", 40.0, 0.0)), cycle, 2, 1.0).unwrap();
        let traj = engine.run(Population::new(0.6, 0.3, 0.08, 0.02), &schedule).unwrap();

        let tail = traj.tail(schedule.cycle_duration());
        let window_start = schedule.total_duration() - schedule.cycle_duration();
        assert_eq!(window_start, 55.0);
        assert_eq!(tail[0].generation, window_start);
        assert!(tail.iter().all(|record| record.generation >= window_start));

        // Last cycle (11 + 6 records) plus the duplicated boundary record at its start.
        let summary = objective.summarize(&traj, &schedule).unwrap();
        assert_eq!(summary.n_vals, 18);
        assert_eq!(summary, objective.evaluate(&schedule).unwrap());
    }

    #[test]
    fn number_model_objective_is_a_fraction() {
        let regime = Regime {
            matrix: InteractionMatrix::new([[0.0; 4]; 4]),
            cost: None,
            growth: Some([2.0, 3.0, 4.0, 1.0]),
            decay: Some([0.5, 0.5, 0.5, 0.25]),
            wmmd_ih: 0.0,
        };
        let cycle = vec![Phase {
            label: "untreated".into(),
            duration: 20.0,
            regime,
        }];
        let schedule = Schedule::new(None, cycle, 5, 1.0).unwrap();
        let engine = Engine::new(Model::Number, OdeOptions::default());
        let objective = Objective::new(&engine, Population::new(1.0, 1.0, 1.0, 1.0));

        // Equilibrium numbers 4, 6, 8 and 4; the tail holds the last cycle plus the
        // duplicated boundary record.
        let summary = objective.evaluate(&schedule).unwrap();
        assert_eq!(summary.n_vals, 22);
        assert!((summary.mean - 12.0 / 22.0).abs() < 1e-6);
    }
}
