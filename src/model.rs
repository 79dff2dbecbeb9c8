//! Linear regression model used to predict a key's position within a
//! leaf's slot array.
//!
//! `position ≈ slope * key + intercept`, fit by ordinary least squares
//! over the leaf's current `(key, slot_index)` pairs. Cheap to train (one
//! pass) and cheap to evaluate (one multiply-add), which is the whole
//! point: the model only has to narrow an exponential search, not be
//! exact.

use crate::Key;
use std::fmt;

#[derive(Debug, Clone, Copy)]
pub struct LinearModel {
    slope: f64,
    intercept: f64,
}

impl LinearModel {
    /// An untrained model. Never consulted directly — callers check
    /// `AdaptiveGappedLeaf::model_trained` before calling `predict`.
    pub fn untrained() -> Self {
        Self {
            slope: 0.0,
            intercept: 0.0,
        }
    }

    /// Fit `position = slope * key + intercept` by least squares over
    /// `data`. Returns `None` if `data` has fewer than two points or all
    /// keys are identical (a zero OLS denominator) — both leave the
    /// caller's model untrained rather than degenerate.
    pub fn train(data: &[(Key, usize)]) -> Option<Self> {
        if data.len() < 2 {
            return None;
        }

        let n = data.len() as f64;
        let sum_x: f64 = data.iter().map(|(k, _)| *k as f64).sum();
        let sum_y: f64 = data.iter().map(|(_, p)| *p as f64).sum();
        let sum_xy: f64 = data.iter().map(|(k, p)| *k as f64 * *p as f64).sum();
        let sum_xx: f64 = data.iter().map(|(k, _)| (*k as f64).powi(2)).sum();

        let denominator = n * sum_xx - sum_x * sum_x;
        if denominator.abs() < 1e-10 {
            return None;
        }

        let slope = (n * sum_xy - sum_x * sum_y) / denominator;
        let intercept = (sum_y - slope * sum_x) / n;
        Some(Self { slope, intercept })
    }

    /// Predict a slot index for `key`, clamped to `[0, max_index]`.
    pub fn predict(&self, key: Key, max_index: usize) -> usize {
        let raw = self.slope * key as f64 + self.intercept;
        let rounded = raw.round();
        if rounded <= 0.0 {
            0
        } else if rounded >= max_index as f64 {
            max_index
        } else {
            rounded as usize
        }
    }

    /// Mean absolute error of `predict` over `data`, used to size the
    /// leaf's model-accuracy bookkeeping.
    pub fn avg_error(&self, data: &[(Key, usize)], max_index: usize) -> f64 {
        if data.is_empty() {
            return 0.0;
        }
        let total: usize = data
            .iter()
            .map(|(k, p)| {
                let predicted = self.predict(*k, max_index);
                (predicted as i64 - *p as i64).unsigned_abs() as usize
            })
            .sum();
        total as f64 / data.len() as f64
    }

    pub fn slope(&self) -> f64 {
        self.slope
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }
}

impl fmt::Display for LinearModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "y = {:.6}x + {:.6}", self.slope, self.intercept)
    }
}
