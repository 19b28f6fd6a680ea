use crate::error::AppError;
use serde::{Deserialize, Serialize};

pub fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Linear score in log-odds space. Callers must have verified lengths.
pub fn logit(coef: &[f64], intercept: f64, x: &[f64]) -> f64 {
    dot(coef, x) + intercept
}

/// Logistic-regression probability of the positive class (graduation).
///
/// The length check guards against a model file whose coefficient count
/// drifted from its declared feature order.
pub fn predict_probability(
    model: &str,
    coef: &[f64],
    intercept: f64,
    x: &[f64],
) -> Result<f64, AppError> {
    if coef.len() != x.len() {
        return Err(AppError::SchemaMismatch {
            model: model.to_string(),
            coef: coef.len(),
            features: x.len(),
        });
    }
    Ok(sigmoid(logit(coef, intercept, x)))
}

/// Piecewise-linear monotonic remapping of raw probabilities, fit offline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsotonicCurve {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl IsotonicCurve {
    /// Load-time validation; the mapping itself assumes a well-formed curve.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.x.is_empty() || self.x.len() != self.y.len() {
            return Err(AppError::InvalidModel(format!(
                "isotonic curve length mismatch (x={}, y={})",
                self.x.len(),
                self.y.len()
            )));
        }
        for points in [&self.x, &self.y] {
            if points.windows(2).any(|w| w[0] > w[1]) {
                return Err(AppError::InvalidModel(
                    "isotonic curve breakpoints must be ascending".to_string(),
                ));
            }
            if points.iter().any(|p| !(0.0..=1.0).contains(p)) {
                return Err(AppError::InvalidModel(
                    "isotonic curve values must lie in [0, 1]".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Map a raw probability through the curve.
    ///
    /// Flat extrapolation outside the fitted range is the intended boundary
    /// policy. An exact breakpoint hit returns its y directly, which also
    /// avoids dividing by zero when adjacent x values coincide.
    pub fn map(&self, p_raw: f64) -> f64 {
        let last = self.x.len() - 1;
        if p_raw <= self.x[0] {
            return self.y[0];
        }
        if p_raw >= self.x[last] {
            return self.y[last];
        }

        // Binary search for the bracketing segment.
        let mut lo = 0;
        let mut hi = last;
        while lo + 1 < hi {
            let mid = (lo + hi) / 2;
            if self.x[mid] == p_raw {
                return self.y[mid];
            }
            if self.x[mid] < p_raw {
                lo = mid;
            } else {
                hi = mid;
            }
        }

        let t = (p_raw - self.x[lo]) / (self.x[hi] - self.x[lo]);
        self.y[lo] + t * (self.y[hi] - self.y[lo])
    }
}
