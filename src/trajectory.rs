//! Time series produced by a schedule run.

use crate::model::Population;
use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// Population state at one generation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub generation: f64,
    pub oc: f64,
    pub ob: f64,
    pub mmd: f64,
    pub mmr: f64,
    pub total_mm: f64,
}

impl Record {
    pub fn new(generation: f64, pop: &Population) -> Self {
        let [oc, ob, mmd, mmr] = pop.0;
        Self {
            generation,
            oc,
            ob,
            mmd,
            mmr,
            total_mm: pop.total_mm(),
        }
    }

    pub fn population(&self) -> Population {
        Population::new(self.oc, self.ob, self.mmd, self.mmr)
    }
}

/// Ordered sequence of records with non-decreasing generations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    records: Vec<Record>,
}

impl Trajectory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn push(&mut self, record: Record) {
        debug_assert!(
            self.records
                .last()
                .is_none_or(|last| last.generation <= record.generation)
        );
        self.records.push(record);
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records within `window` generations of the last one.
    pub fn tail(&self, window: f64) -> &[Record] {
        let Some(last) = self.records.last() else {
            return &[];
        };
        let start = last.generation - window;
        let tol = 1e-9 * window.abs().max(1.0);
        let i_start = self
            .records
            .partition_point(|record| record.generation < start - tol);
        &self.records[i_start..]
    }

    /// Convert absolute numbers to fractions of each record's total.
    ///
    /// # Errors
    /// Returns an error if any record has a non-positive or non-finite total.
    pub fn to_fractions(&self) -> Result<Self> {
        let mut records = Vec::with_capacity(self.records.len());
        for record in &self.records {
            let pop = record.population();
            let total = pop.total();
            if !(total.is_finite() && total > 0.0) {
                bail!(
                    "population total must be positive at generation {}, but is {total}",
                    record.generation
                );
            }
            records.push(Record::new(record.generation, &pop.fractions()));
        }
        Ok(Self { records })
    }
}
