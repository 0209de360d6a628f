//! Model value types.

use serde::{Deserialize, Serialize};

/// Cell subpopulations, in matrix row/column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellType {
    /// Osteoclasts.
    OC,
    /// Osteoblasts.
    OB,
    /// Drug-sensitive myeloma cells.
    MMd,
    /// Drug-resistant myeloma cells.
    MMr,
}

impl CellType {
    pub fn idx(self) -> usize {
        match self {
            CellType::OC => 0,
            CellType::OB => 1,
            CellType::MMd => 2,
            CellType::MMr => 3,
        }
    }
}

/// Population state: fractions (summing to 1) or absolute numbers of each cell type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Population(pub [f64; 4]);

impl Population {
    pub fn new(oc: f64, ob: f64, mmd: f64, mmr: f64) -> Self {
        Self([oc, ob, mmd, mmr])
    }

    pub fn get(&self, cell: CellType) -> f64 {
        self.0[cell.idx()]
    }

    pub fn total(&self) -> f64 {
        self.0.iter().sum()
    }

    /// Combined myeloma population (MMd + MMr).
    pub fn total_mm(&self) -> f64 {
        self.get(CellType::MMd) + self.get(CellType::MMr)
    }

    /// Rescale to fractions of the total.
    pub fn fractions(&self) -> Self {
        let total = self.total();
        Self(self.0.map(|val| val / total))
    }
}

/// Interaction (payoff) matrix indexed `[recipient, influencer]`.
///
/// Immutable: overrides produce a new matrix through [`InteractionMatrix::with_entry`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InteractionMatrix([[f64; 4]; 4]);

impl InteractionMatrix {
    pub fn new(rows: [[f64; 4]; 4]) -> Self {
        Self(rows)
    }

    pub fn row(&self, cell: CellType) -> &[f64; 4] {
        &self.0[cell.idx()]
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.0[row][col]
    }

    pub fn rows(&self) -> &[[f64; 4]; 4] {
        &self.0
    }

    /// Copy of the matrix with a single entry replaced.
    pub fn with_entry(&self, row: usize, col: usize, val: f64) -> Self {
        let mut rows = self.0;
        rows[row][col] = val;
        Self(rows)
    }
}

/// How the WMMd inhibitor enters the MMd fitness in the fraction model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrugEffect {
    /// Subtract the inhibitor strength itself.
    #[default]
    Raw,
    /// Subtract the inhibitor strength scaled by the MMd cost.
    CostScaled,
}

/// Dynamical law used for every phase of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Model {
    /// Replicator dynamics on cell fractions.
    Fraction {
        /// Interaction range size `N`.
        n_interact: f64,
        #[serde(default)]
        drug_effect: DrugEffect,
    },
    /// Growth/decay dynamics on absolute cell numbers.
    Number,
}

impl Model {
    pub fn is_number(&self) -> bool {
        matches!(self, Model::Number)
    }
}

/// Parameter set of one drug regimen.
///
/// The fraction model reads `cost`, the number model reads `growth` and `decay`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Regime {
    pub matrix: InteractionMatrix,

    pub cost: Option<[f64; 4]>,

    pub growth: Option<[f64; 4]>,
    pub decay: Option<[f64; 4]>,

    /// WMMd inhibitor strength.
    #[serde(default)]
    pub wmmd_ih: f64,
}
