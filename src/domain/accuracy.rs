// ============================================================
// Layer 3 — Accuracy Accumulator
// ============================================================
// Collects one test accuracy per seed and summarises them as
// mean ± population standard deviation, printed as percentages:
//
//   [0.70, 0.72, 0.75, 0.71, 0.73]  →  "72.20±1.72"

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccuracyAccumulator {
    values: Vec<f64>,
}

impl AccuracyAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, accuracy: f64) {
        self.values.push(accuracy);
    }

    /// Arithmetic mean, NaN when nothing was recorded.
    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return f64::NAN;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    /// Population standard deviation (divides by n, not n - 1).
    pub fn std(&self) -> f64 {
        if self.values.is_empty() {
            return f64::NAN;
        }
        let mean = self.mean();
        let var = self.values
            .iter()
            .map(|v| (v - mean).powi(2))
            .sum::<f64>() / self.values.len() as f64;
        var.sqrt()
    }

    /// `"{mean%}±{std%}"` with two decimals.
    pub fn summary(&self) -> String {
        format!("{:.2}±{:.2}", self.mean() * 100.0, self.std() * 100.0)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn filled(values: &[f64]) -> AccuracyAccumulator {
        let mut acc = AccuracyAccumulator::new();
        for &v in values {
            acc.push(v);
        }
        acc
    }

    #[test]
    fn test_mean_and_population_std() {
        let acc = filled(&[0.70, 0.72, 0.75, 0.71, 0.73]);
        assert!((acc.mean() - 0.722).abs() < 1e-12);
        // sqrt(0.000296)
        assert!((acc.std() - 0.017204650534085).abs() < 1e-9);
        assert_eq!(acc.summary(), "72.20±1.72");
    }

    #[test]
    fn test_single_value_has_zero_std() {
        let acc = filled(&[0.5]);
        assert_eq!(acc.mean(), 0.5);
        assert_eq!(acc.std(), 0.0);
        assert_eq!(acc.summary(), "50.00±0.00");
    }

    #[test]
    fn test_empty_is_nan() {
        let acc = AccuracyAccumulator::new();
        assert!(acc.mean().is_nan());
        assert!(acc.std().is_nan());
    }
}
