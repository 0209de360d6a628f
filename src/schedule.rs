//! Drug schedules as ordered lists of phase descriptors.

use crate::error::SimError;
use crate::model::Regime;
use serde::{Deserialize, Serialize};

/// One phase of a schedule: a regime applied for a number of generations.
#[derive(Debug, Clone, PartialEq)]
pub struct Phase {
    pub label: String,
    pub duration: f64,
    pub regime: Regime,
}

/// Schedule parameter that a search may vary.
///
/// `phase` indexes the repeating cycle, not the settling phase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Target {
    Duration { phase: usize },
    WmmdIh { phase: usize },
    MatrixEntry { phase: usize, row: usize, col: usize },
}

impl Target {
    pub fn phase(&self) -> usize {
        match *self {
            Target::Duration { phase }
            | Target::WmmdIh { phase }
            | Target::MatrixEntry { phase, .. } => phase,
        }
    }
}

/// Optional settling phase followed by a number of repetitions of a phase cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    settle: Option<Phase>,
    cycle: Vec<Phase>,
    n_cycles: usize,
    resolution: f64,
}

impl Schedule {
    /// Create a validated schedule.
    ///
    /// `resolution` is the number of output time points per generation.
    ///
    /// # Errors
    /// Returns [`SimError::InvalidSchedule`] for an empty cycle, zero cycles, a non-positive
    /// resolution or a phase too short to span two time points.
    pub fn new(
        settle: Option<Phase>,
        cycle: Vec<Phase>,
        n_cycles: usize,
        resolution: f64,
    ) -> Result<Self, SimError> {
        if cycle.is_empty() {
            return Err(SimError::InvalidSchedule("cycle has no phases".into()));
        }
        if n_cycles == 0 {
            return Err(SimError::InvalidSchedule("number of cycles must be positive".into()));
        }
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(SimError::InvalidSchedule(format!(
                "resolution must be positive and finite, but is {resolution}"
            )));
        }
        for phase in settle.iter().chain(&cycle) {
            if !(phase.duration.is_finite() && phase.duration > 0.0) {
                return Err(SimError::InvalidSchedule(format!(
                    "phase {:?} must have a positive finite duration, but has {}",
                    phase.label, phase.duration
                )));
            }
            if n_points(phase.duration, resolution) < 2 {
                return Err(SimError::InvalidSchedule(format!(
                    "phase {:?} of duration {} spans fewer than 2 time points",
                    phase.label, phase.duration
                )));
            }
        }
        Ok(Self {
            settle,
            cycle,
            n_cycles,
            resolution,
        })
    }

    pub fn settle(&self) -> Option<&Phase> {
        self.settle.as_ref()
    }

    pub fn cycle(&self) -> &[Phase] {
        &self.cycle
    }

    pub fn n_cycles(&self) -> usize {
        self.n_cycles
    }

    pub fn cycle_duration(&self) -> f64 {
        self.cycle.iter().map(|phase| phase.duration).sum()
    }

    pub fn total_duration(&self) -> f64 {
        let settle = self.settle.as_ref().map_or(0.0, |phase| phase.duration);
        settle + self.n_cycles as f64 * self.cycle_duration()
    }

    /// Number of output time points of a phase.
    pub fn n_points(&self, phase: &Phase) -> usize {
        n_points(phase.duration, self.resolution)
    }

    /// Number of records a full run produces.
    pub fn n_records(&self) -> usize {
        let settle = self.settle.as_ref().map_or(0, |phase| self.n_points(phase));
        let cycle: usize = self.cycle.iter().map(|phase| self.n_points(phase)).sum();
        settle + self.n_cycles * cycle
    }

    /// Copy of the schedule with one parameter replaced.
    ///
    /// # Errors
    /// Returns an error if the target does not exist or the result is not a valid schedule.
    pub fn with_override(&self, target: &Target, val: f64) -> Result<Self, SimError> {
        let mut cycle = self.cycle.clone();
        let n_phases = cycle.len();
        let phase = cycle.get_mut(target.phase()).ok_or_else(|| {
            SimError::InvalidSchedule(format!(
                "target {target:?} refers to a missing phase (cycle has {n_phases})"
            ))
        })?;
        match *target {
            Target::Duration { .. } => phase.duration = val,
            Target::WmmdIh { .. } => phase.regime.wmmd_ih = val,
            Target::MatrixEntry { row, col, .. } => {
                if row >= 4 || col >= 4 {
                    return Err(SimError::InvalidSchedule(format!(
                        "matrix entry ({row}, {col}) is out of range"
                    )));
                }
                phase.regime.matrix = phase.regime.matrix.with_entry(row, col, val);
            }
        }
        Self::new(self.settle.clone(), cycle, self.n_cycles, self.resolution)
    }
}

fn n_points(duration: f64, resolution: f64) -> usize {
    (duration * resolution).round() as usize + 1
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::InteractionMatrix;

    pub(crate) fn regime(wmmd_ih: f64) -> Regime {
        Regime {
            matrix: InteractionMatrix::new([
                [0.0, 0.4, 0.65, 0.55],
                [0.3, 0.0, -0.3, -0.3],
                [0.6, 0.0, 0.2, 0.0],
                [0.55, 0.0, -0.6, 0.4],
            ]),
            cost: Some([1.0, 1.3, 1.2, 1.4]),
            growth: None,
            decay: None,
            wmmd_ih,
        }
    }

    pub(crate) fn phase(label: &str, duration: f64, wmmd_ih: f64) -> Phase {
        Phase {
            label: label.into(),
            duration,
            regime: regime(wmmd_ih),
        }
    }

    #[test]
    fn rejects_empty_cycle() {
        let err = Schedule::new(None, Vec::new(), 3, 1.0).unwrap_err();
        assert!(matches!(err, SimError::InvalidSchedule(_)));
    }

    #[test]
    fn rejects_zero_cycles() {
        let err = Schedule::new(None, vec![phase("drug", 5.0, 0.3)], 0, 1.0).unwrap_err();
        assert!(matches!(err, SimError::InvalidSchedule(_)));
    }

    #[test]
    fn rejects_non_positive_duration() {
        let cycle = vec![phase("drug", 5.0, 0.3), phase("holiday", 0.0, 0.0)];
        let err = Schedule::new(None, cycle, 3, 1.0).unwrap_err();
        assert!(matches!(err, SimError::InvalidSchedule(_)));
    }

    #[test]
    fn rejects_phase_shorter_than_two_points() {
        let err = Schedule::new(None, vec![phase("drug", 0.4, 0.3)], 3, 1.0).unwrap_err();
        assert!(matches!(err, SimError::InvalidSchedule(_)));
        assert!(Schedule::new(None, vec![phase("drug", 0.4, 0.3)], 3, 10.0).is_ok());
    }

    #[test]
    fn durations_and_record_counts() {
        let cycle = vec![phase("drug", 10.0, 0.3), phase("holiday", 5.0, 0.0)];
        let schedule = Schedule::new(Some(phase("settle", 20.0, 0.0)), cycle, 4, 2.0).unwrap();
        assert_eq!(schedule.cycle_duration(), 15.0);
        assert_eq!(schedule.total_duration(), 80.0);
        assert_eq!(schedule.n_records(), 41 + 4 * (21 + 11));
    }

    #[test]
    fn override_builds_a_fresh_schedule() {
        let cycle = vec![phase("drug", 10.0, 0.3), phase("holiday", 5.0, 0.0)];
        let schedule = Schedule::new(None, cycle, 2, 1.0).unwrap();

        let longer = schedule
            .with_override(&Target::Duration { phase: 1 }, 8.0)
            .unwrap();
        assert_eq!(longer.cycle()[1].duration, 8.0);
        assert_eq!(schedule.cycle()[1].duration, 5.0);

        let weaker = schedule
            .with_override(&Target::MatrixEntry { phase: 0, row: 2, col: 0 }, 0.1)
            .unwrap();
        assert_eq!(weaker.cycle()[0].regime.matrix.get(2, 0), 0.1);
        assert_eq!(weaker.cycle()[1].regime.matrix.get(2, 0), 0.6);
        assert_eq!(schedule.cycle()[0].regime.matrix.get(2, 0), 0.6);

        let stronger = schedule
            .with_override(&Target::WmmdIh { phase: 0 }, 0.7)
            .unwrap();
        assert_eq!(stronger.cycle()[0].regime.wmmd_ih, 0.7);

        assert!(schedule.with_override(&Target::Duration { phase: 2 }, 1.0).is_err());
        assert!(schedule.with_override(&Target::Duration { phase: 0 }, -1.0).is_err());
    }
}
