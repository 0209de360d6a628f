//! Fitness functions and the right-hand sides of both model variants.

use crate::model::{CellType, DrugEffect, InteractionMatrix, Model, Regime};
use crate::ode::State;
use anyhow::{Context, Result};
use ode_solvers::dop_shared::System;

/// Interaction payoff of `cell` before the `(N-1)/N` factor.
fn payoff(cell: CellType, x: &[f64; 4], cost: &[f64; 4], matrix: &InteractionMatrix) -> f64 {
    let [a, b, c, d] = *matrix.row(cell);
    a * x[0] * cost[0] + b * x[1] * cost[1] + c * x[2] * cost[2] + d * x[3] * cost[3]
}

fn scaled(raw: f64, cell: CellType, n_interact: f64, cost: &[f64; 4]) -> f64 {
    raw * (n_interact - 1.0) / n_interact - cost[cell.idx()]
}

/// Fitness of the osteoclasts.
pub fn fitness_oc(x: &[f64; 4], n_interact: f64, cost: &[f64; 4], matrix: &InteractionMatrix) -> f64 {
    let cell = CellType::OC;
    scaled(payoff(cell, x, cost, matrix), cell, n_interact, cost)
}

/// Fitness of the osteoblasts.
pub fn fitness_ob(x: &[f64; 4], n_interact: f64, cost: &[f64; 4], matrix: &InteractionMatrix) -> f64 {
    let cell = CellType::OB;
    scaled(payoff(cell, x, cost, matrix), cell, n_interact, cost)
}

/// Fitness of the drug-sensitive myeloma cells, lowered by the WMMd inhibitor.
pub fn fitness_mmd(
    x: &[f64; 4],
    n_interact: f64,
    cost: &[f64; 4],
    matrix: &InteractionMatrix,
    wmmd_ih: f64,
    drug_effect: DrugEffect,
) -> f64 {
    let cell = CellType::MMd;
    let penalty = match drug_effect {
        DrugEffect::Raw => wmmd_ih,
        DrugEffect::CostScaled => wmmd_ih * cost[cell.idx()],
    };
    scaled(payoff(cell, x, cost, matrix) - penalty, cell, n_interact, cost)
}

/// Fitness of the drug-resistant myeloma cells.
pub fn fitness_mmr(x: &[f64; 4], n_interact: f64, cost: &[f64; 4], matrix: &InteractionMatrix) -> f64 {
    let cell = CellType::MMr;
    scaled(payoff(cell, x, cost, matrix), cell, n_interact, cost)
}

/// Replicator rates `x_i (W_i - W_avg)`.
///
/// The average fitness is normalised by the total so the sum of the fractions is conserved.
pub fn replicator_rates(
    x: &[f64; 4],
    n_interact: f64,
    cost: &[f64; 4],
    matrix: &InteractionMatrix,
    wmmd_ih: f64,
    drug_effect: DrugEffect,
) -> [f64; 4] {
    let fitness = [
        fitness_oc(x, n_interact, cost, matrix),
        fitness_ob(x, n_interact, cost, matrix),
        fitness_mmd(x, n_interact, cost, matrix, wmmd_ih, drug_effect),
        fitness_mmr(x, n_interact, cost, matrix),
    ];
    let total: f64 = x.iter().sum();
    let avg_fitness = x.iter().zip(&fitness).map(|(xi, wi)| xi * wi).sum::<f64>() / total;
    std::array::from_fn(|i| x[i] * (fitness[i] - avg_fitness))
}

/// Growth/decay rates on absolute numbers.
///
/// Growth of each type is its rate times the product of all populations raised to the
/// matrix row entries. The WMMd inhibitor removes MMd cells in proportion to their number.
pub fn growth_rates(
    n: &[f64; 4],
    growth: &[f64; 4],
    decay: &[f64; 4],
    matrix: &InteractionMatrix,
    wmmd_ih: f64,
) -> [f64; 4] {
    std::array::from_fn(|i| {
        let gain = (0..4).fold(growth[i], |acc, j| acc * n[j].powf(matrix.get(i, j)));
        let mut rate = gain - decay[i] * n[i];
        if i == CellType::MMd.idx() {
            rate -= wmmd_ih * n[i];
        }
        rate
    })
}

/// Replicator dynamics of one regime.
#[derive(Debug, Clone, Copy)]
pub struct Replicator {
    pub n_interact: f64,
    pub cost: [f64; 4],
    pub matrix: InteractionMatrix,
    pub wmmd_ih: f64,
    pub drug_effect: DrugEffect,
}

impl System<f64, State> for Replicator {
    fn system(&self, _t: f64, y: &State, dy: &mut State) {
        let x = [y[0], y[1], y[2], y[3]];
        let rates = replicator_rates(
            &x,
            self.n_interact,
            &self.cost,
            &self.matrix,
            self.wmmd_ih,
            self.drug_effect,
        );
        *dy = State::from(rates);
    }
}

/// Growth/decay dynamics of one regime.
#[derive(Debug, Clone, Copy)]
pub struct GrowthDecay {
    pub growth: [f64; 4],
    pub decay: [f64; 4],
    pub matrix: InteractionMatrix,
    pub wmmd_ih: f64,
}

impl System<f64, State> for GrowthDecay {
    fn system(&self, _t: f64, y: &State, dy: &mut State) {
        let n = [y[0], y[1], y[2], y[3]];
        let rates = growth_rates(&n, &self.growth, &self.decay, &self.matrix, self.wmmd_ih);
        *dy = State::from(rates);
    }
}

/// Right-hand side selected for one phase.
#[derive(Debug, Clone, Copy)]
pub enum Dynamics {
    Replicator(Replicator),
    GrowthDecay(GrowthDecay),
}

impl System<f64, State> for Dynamics {
    fn system(&self, t: f64, y: &State, dy: &mut State) {
        match self {
            Dynamics::Replicator(sys) => sys.system(t, y, dy),
            Dynamics::GrowthDecay(sys) => sys.system(t, y, dy),
        }
    }
}

/// Build the right-hand side of `model` under `regime`.
pub fn build_system(model: &Model, regime: &Regime) -> Result<Dynamics> {
    let system = match *model {
        Model::Fraction {
            n_interact,
            drug_effect,
        } => Dynamics::Replicator(Replicator {
            n_interact,
            cost: regime.cost.context("fraction model requires costs")?,
            matrix: regime.matrix,
            wmmd_ih: regime.wmmd_ih,
            drug_effect,
        }),
        Model::Number => Dynamics::GrowthDecay(GrowthDecay {
            growth: regime.growth.context("number model requires growth rates")?,
            decay: regime.decay.context("number model requires decay rates")?,
            matrix: regime.matrix,
            wmmd_ih: regime.wmmd_ih,
        }),
    };
    Ok(system)
}

#[cfg(test)]
mod tests {
    use super::*;

    const X: [f64; 4] = [0.4, 0.2, 0.3, 0.1];
    const COST: [f64; 4] = [0.3, 0.2, 0.3, 0.5];
    const N: f64 = 10.0;

    fn matrix() -> InteractionMatrix {
        InteractionMatrix::new([
            [0.7, 1.0, 2.5, 2.1],
            [1.0, 1.4, -0.3, 1.0],
            [2.5, 0.2, 1.1, -0.2],
            [2.1, 0.0, -0.2, 1.2],
        ])
    }

    fn assert_close(val: f64, exp: f64) {
        assert!((val - exp).abs() < 1e-12, "{val} != {exp}");
    }

    #[test]
    fn fitness_reference_values() {
        let mat = matrix();
        assert_close(fitness_oc(&X, N, &COST, &mat), 0.10859999999999997);
        assert_close(fitness_ob(&X, N, &COST, &mat), -0.020900000000000002);
        assert_close(
            fitness_mmd(&X, N, &COST, &mat, 0.0, DrugEffect::Raw),
            0.05730000000000007,
        );
        assert_close(fitness_mmr(&X, N, &COST, &mat), -0.23539999999999994);
    }

    #[test]
    fn drug_effect_conventions() {
        let mat = matrix();
        let base = fitness_mmd(&X, N, &COST, &mat, 0.0, DrugEffect::Raw);
        let raw = fitness_mmd(&X, N, &COST, &mat, 0.2, DrugEffect::Raw);
        let scaled = fitness_mmd(&X, N, &COST, &mat, 0.2, DrugEffect::CostScaled);
        assert_close(base - raw, 0.2 * 0.9);
        assert_close(base - scaled, 0.2 * 0.3 * 0.9);
    }

    #[test]
    fn replicator_reference_values() {
        let rates = replicator_rates(&X, N, &COST, &matrix(), 0.0, DrugEffect::Raw);
        let exp = [
            0.030275999999999983,
            -0.010762000000000006,
            0.0073170000000000145,
            -0.026830999999999994,
        ];
        for (val, exp) in rates.iter().zip(exp) {
            assert_close(*val, exp);
        }
        assert!(rates.iter().sum::<f64>().abs() < 1e-12);
    }

    #[test]
    fn growth_rates_without_interactions() {
        let zero = InteractionMatrix::new([[0.0; 4]; 4]);
        let n = [10.0, 20.0, 30.0, 40.0];
        let rates = growth_rates(&n, &[1.0, 2.0, 3.0, 4.0], &[0.1, 0.1, 0.1, 0.1], &zero, 0.05);
        assert_close(rates[0], 0.0);
        assert_close(rates[1], 0.0);
        assert_close(rates[2], 3.0 - 3.0 - 1.5);
        assert_close(rates[3], 0.0);
    }

    #[test]
    fn growth_rates_use_matrix_as_exponents() {
        let mat = InteractionMatrix::new([[0.0; 4]; 4]).with_entry(0, 1, 2.0);
        let n = [1.0, 3.0, 1.0, 1.0];
        let rates = growth_rates(&n, &[0.5, 0.0, 0.0, 0.0], &[0.0; 4], &mat, 0.0);
        assert_close(rates[0], 4.5);
    }

    #[test]
    fn system_evaluates_replicator_rates() {
        let model = Model::Fraction {
            n_interact: N,
            drug_effect: DrugEffect::Raw,
        };
        let regime = Regime {
            matrix: matrix(),
            cost: Some(COST),
            growth: None,
            decay: None,
            wmmd_ih: 0.1,
        };
        let system = build_system(&model, &regime).unwrap();
        let mut dy = State::zeros();
        system.system(0.0, &State::from(X), &mut dy);
        let rates = replicator_rates(&X, N, &COST, &matrix(), 0.1, DrugEffect::Raw);
        for i in 0..4 {
            assert_close(dy[i], rates[i]);
        }
    }

    #[test]
    fn build_system_requires_model_rates() {
        let regime = Regime {
            matrix: matrix(),
            cost: Some(COST),
            growth: None,
            decay: None,
            wmmd_ih: 0.0,
        };
        assert!(build_system(&Model::Number, &regime).is_err());
        let model = Model::Fraction {
            n_interact: N,
            drug_effect: DrugEffect::Raw,
        };
        assert!(build_system(&model, &regime).is_ok());
    }
}
