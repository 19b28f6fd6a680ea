use crate::error::AppError;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Fully populated map from canonical feature name to numeric value.
pub type CanonicalFeatures = HashMap<String, f64>;

/// Training-set medians/modes, keyed by canonical feature name.
pub type DefaultsTable = HashMap<String, f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeatureKind {
    Numeric,
    Binary,
}

/// Canonical name, underscore alias accepted from clients, coercion kind.
static CANONICAL_FEATURES: [(&str, &str, FeatureKind); 12] = [
    ("Admission grade", "Admission_grade", FeatureKind::Numeric),
    ("Age at enrollment", "Age_at_enrollment", FeatureKind::Numeric),
    ("Scholarship holder", "Scholarship_holder", FeatureKind::Binary),
    ("Tuition fees up to date", "Tuition_up_to_date", FeatureKind::Binary),
    ("Displaced", "Displaced", FeatureKind::Binary),
    (
        "Educational special needs",
        "Educational_special_needs",
        FeatureKind::Binary,
    ),
    ("Debtor", "Debtor", FeatureKind::Binary),
    ("International", "International", FeatureKind::Binary),
    ("Unemployment rate", "Unemployment_rate", FeatureKind::Numeric),
    ("Inflation rate", "Inflation_rate", FeatureKind::Numeric),
    ("GDP", "GDP", FeatureKind::Numeric),
    ("Gender", "Gender", FeatureKind::Binary),
];

pub fn canonical_feature_names() -> impl Iterator<Item = &'static str> {
    CANONICAL_FEATURES.iter().map(|(name, _, _)| *name)
}

/// Coerce raw client input into a fully populated canonical feature map.
///
/// Total by construction: anything missing or unparseable falls back to the
/// training default for that feature, so raw input alone can never fail a
/// prediction. Validation of value ranges belongs to the request boundary.
pub fn normalize(raw: &Map<String, Value>, defaults: &DefaultsTable) -> CanonicalFeatures {
    let mut features = CanonicalFeatures::with_capacity(CANONICAL_FEATURES.len());

    for (name, alias, kind) in CANONICAL_FEATURES {
        let supplied = raw.get(alias).or_else(|| raw.get(name));
        let coerced = supplied.and_then(|value| match kind {
            FeatureKind::Numeric => coerce_numeric(value),
            FeatureKind::Binary => coerce_binary(value),
        });
        let value = coerced.unwrap_or_else(|| defaults.get(name).copied().unwrap_or(0.0));
        features.insert(name.to_string(), value);
    }

    features
}

/// Project the canonical map onto one model's declared feature order.
///
/// A name the normalizer does not produce indicates a model file out of sync
/// with this binary, which must surface rather than be silently defaulted.
pub fn build_vector(
    feature_order: &[String],
    features: &CanonicalFeatures,
) -> Result<Vec<f64>, AppError> {
    feature_order
        .iter()
        .map(|name| {
            features
                .get(name)
                .copied()
                .ok_or_else(|| AppError::MissingFeature(name.clone()))
        })
        .collect()
}

fn coerce_numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
        }
        _ => None,
    }
}

fn coerce_binary(value: &Value) -> Option<f64> {
    match value {
        Value::Bool(true) => Some(1.0),
        Value::Bool(false) => Some(0.0),
        Value::Number(n) => match n.as_f64() {
            Some(v) if v == 1.0 => Some(1.0),
            Some(v) if v == 0.0 => Some(0.0),
            _ => None,
        },
        Value::String(s) => match s.as_str() {
            "Yes" | "1" => Some(1.0),
            "No" | "0" => Some(0.0),
            _ => None,
        },
        _ => None,
    }
}
