use crate::error::AppError;
use crate::features::{canonical_feature_names, DefaultsTable};
use crate::scoring::IsotonicCurve;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::info;

/// The four trained model variants, closed so dispatch is exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    Baseline,
    DropGender,
    Reweighted,
    Calibrated,
}

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [
        ModelKind::Baseline,
        ModelKind::DropGender,
        ModelKind::Reweighted,
        ModelKind::Calibrated,
    ];

    /// Resolve a user-facing alias to a canonical model kind.
    pub fn resolve(alias: &str) -> Option<ModelKind> {
        let key = alias
            .trim()
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("_");
        match key.as_str() {
            "baseline" | "baseline_model" => Some(ModelKind::Baseline),
            "drop_gender" | "drop-gender" | "gender_blind" | "gender-blind" => {
                Some(ModelKind::DropGender)
            }
            "reweighted" => Some(ModelKind::Reweighted),
            "calibrated" => Some(ModelKind::Calibrated),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Baseline => "baseline",
            ModelKind::DropGender => "drop_gender",
            ModelKind::Reweighted => "reweighted",
            ModelKind::Calibrated => "calibrated",
        }
    }

    fn file_name(&self) -> &'static str {
        match self {
            ModelKind::Baseline => "model_baseline.json",
            ModelKind::DropGender => "model_drop_gender.json",
            ModelKind::Reweighted => "model_reweighted.json",
            ModelKind::Calibrated => "model_calibrated.json",
        }
    }

    /// Which training-mean bucket grounds this model's local explanations.
    fn reference_bucket(&self) -> &'static str {
        match self {
            ModelKind::Baseline | ModelKind::Reweighted => "with_gender",
            ModelKind::DropGender | ModelKind::Calibrated => "no_gender",
        }
    }
}

/// One trained logistic-regression classifier, immutable after load.
#[derive(Debug, Clone)]
pub struct ModelDescriptor {
    pub feature_order: Vec<String>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    pub calibration: Option<IsotonicCurve>,
    pub reference_bucket: &'static str,
}

// On-disk shapes, as exported by the training pipeline.

#[derive(Debug, Deserialize)]
struct PlainModelFile {
    schema: SchemaSection,
    logreg: LogRegSection,
}

#[derive(Debug, Deserialize)]
struct SchemaSection {
    features: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct LogRegSection {
    coef: Vec<f64>,
    intercept: f64,
}

#[derive(Debug, Deserialize)]
struct CalibratedModelFile {
    base: BaseSection,
    isotonic: IsotonicCurve,
}

#[derive(Debug, Deserialize)]
struct BaseSection {
    features: Vec<String>,
    coef: Vec<f64>,
    intercept: f64,
}

/// Read-only holder of the four model descriptors and their shared tables.
pub struct ModelStore {
    baseline: ModelDescriptor,
    drop_gender: ModelDescriptor,
    reweighted: ModelDescriptor,
    calibrated: ModelDescriptor,
    defaults: DefaultsTable,
    reference_means: HashMap<String, HashMap<String, f64>>,
}

impl ModelStore {
    /// Load and validate everything once at startup.
    pub fn load(dir: &Path) -> Result<Self, AppError> {
        let baseline = load_plain(dir, ModelKind::Baseline)?;
        let drop_gender = load_plain(dir, ModelKind::DropGender)?;
        let reweighted = load_plain(dir, ModelKind::Reweighted)?;
        let calibrated = load_calibrated(dir)?;

        let defaults = load_defaults(dir)?;
        let reference_means = load_reference_means(dir)?;

        info!(
            "Loaded {} models from {}",
            ModelKind::ALL.len(),
            dir.display()
        );

        Ok(Self {
            baseline,
            drop_gender,
            reweighted,
            calibrated,
            defaults,
            reference_means,
        })
    }

    pub fn descriptor(&self, kind: ModelKind) -> &ModelDescriptor {
        match kind {
            ModelKind::Baseline => &self.baseline,
            ModelKind::DropGender => &self.drop_gender,
            ModelKind::Reweighted => &self.reweighted,
            ModelKind::Calibrated => &self.calibrated,
        }
    }

    pub fn defaults(&self) -> &DefaultsTable {
        &self.defaults
    }

    pub fn reference_means(&self, bucket: &str) -> Option<&HashMap<String, f64>> {
        self.reference_means.get(bucket)
    }
}

fn load_plain(dir: &Path, kind: ModelKind) -> Result<ModelDescriptor, AppError> {
    let content = std::fs::read_to_string(dir.join(kind.file_name()))?;
    let file: PlainModelFile = serde_json::from_str(&content)?;
    let descriptor = ModelDescriptor {
        feature_order: file.schema.features,
        coefficients: file.logreg.coef,
        intercept: file.logreg.intercept,
        calibration: None,
        reference_bucket: kind.reference_bucket(),
    };
    validate_descriptor(kind, &descriptor)?;
    Ok(descriptor)
}

fn load_calibrated(dir: &Path) -> Result<ModelDescriptor, AppError> {
    let kind = ModelKind::Calibrated;
    let content = std::fs::read_to_string(dir.join(kind.file_name()))?;
    let file: CalibratedModelFile = serde_json::from_str(&content)?;
    let descriptor = ModelDescriptor {
        feature_order: file.base.features,
        coefficients: file.base.coef,
        intercept: file.base.intercept,
        calibration: Some(file.isotonic),
        reference_bucket: kind.reference_bucket(),
    };
    validate_descriptor(kind, &descriptor)?;
    Ok(descriptor)
}

fn validate_descriptor(kind: ModelKind, descriptor: &ModelDescriptor) -> Result<(), AppError> {
    if descriptor.coefficients.len() != descriptor.feature_order.len() {
        return Err(AppError::SchemaMismatch {
            model: kind.as_str().to_string(),
            coef: descriptor.coefficients.len(),
            features: descriptor.feature_order.len(),
        });
    }

    let unique: HashSet<&str> = descriptor
        .feature_order
        .iter()
        .map(String::as_str)
        .collect();
    if unique.len() != descriptor.feature_order.len() {
        return Err(AppError::InvalidModel(format!(
            "duplicate feature name in {} schema",
            kind.as_str()
        )));
    }

    if let Some(curve) = &descriptor.calibration {
        curve.validate()?;
    }

    Ok(())
}

fn load_defaults(dir: &Path) -> Result<DefaultsTable, AppError> {
    let content = std::fs::read_to_string(dir.join("defaults.json"))?;
    let raw: serde_json::Value = serde_json::from_str(&content)?;
    // The exporter sometimes wraps the table as { "defaults": {...} }.
    let table = raw.get("defaults").cloned().unwrap_or(raw);
    let defaults: DefaultsTable = serde_json::from_value(table)?;

    for name in canonical_feature_names() {
        if !defaults.contains_key(name) {
            return Err(AppError::InvalidModel(format!(
                "defaults table missing entry for \"{name}\""
            )));
        }
    }
    Ok(defaults)
}

fn load_reference_means(dir: &Path) -> Result<HashMap<String, HashMap<String, f64>>, AppError> {
    let content = std::fs::read_to_string(dir.join("shap_feature_means.json"))?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn model_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("models")
    }

    #[test]
    fn alias_table_covers_every_documented_spelling() {
        for (alias, expected) in [
            ("baseline", ModelKind::Baseline),
            ("baseline_model", ModelKind::Baseline),
            ("Baseline Model", ModelKind::Baseline),
            ("drop_gender", ModelKind::DropGender),
            ("drop-gender", ModelKind::DropGender),
            ("gender_blind", ModelKind::DropGender),
            ("gender-blind", ModelKind::DropGender),
            ("reweighted", ModelKind::Reweighted),
            ("REWEIGHTED", ModelKind::Reweighted),
            ("calibrated", ModelKind::Calibrated),
        ] {
            assert_eq!(ModelKind::resolve(alias), Some(expected), "alias {alias}");
        }
    }

    #[test]
    fn unknown_alias_does_not_resolve() {
        assert_eq!(ModelKind::resolve("nonexistent"), None);
        assert_eq!(ModelKind::resolve(""), None);
    }

    #[test]
    fn store_loads_and_every_schema_is_self_consistent() {
        let store = ModelStore::load(&model_dir()).unwrap();
        for kind in ModelKind::ALL {
            let d = store.descriptor(kind);
            assert_eq!(
                d.coefficients.len(),
                d.feature_order.len(),
                "schema drift in {}",
                kind.as_str()
            );
        }
    }

    #[test]
    fn drop_gender_schema_excludes_gender() {
        let store = ModelStore::load(&model_dir()).unwrap();
        for kind in [ModelKind::DropGender, ModelKind::Calibrated] {
            let d = store.descriptor(kind);
            assert!(!d.feature_order.iter().any(|f| f == "Gender"));
        }
        assert!(store
            .descriptor(ModelKind::Baseline)
            .feature_order
            .iter()
            .any(|f| f == "Gender"));
    }

    #[test]
    fn only_calibrated_carries_a_curve() {
        let store = ModelStore::load(&model_dir()).unwrap();
        assert!(store.descriptor(ModelKind::Calibrated).calibration.is_some());
        for kind in [ModelKind::Baseline, ModelKind::DropGender, ModelKind::Reweighted] {
            assert!(store.descriptor(kind).calibration.is_none());
        }
    }

    #[test]
    fn defaults_cover_every_canonical_feature() {
        let store = ModelStore::load(&model_dir()).unwrap();
        for name in canonical_feature_names() {
            assert!(store.defaults().contains_key(name), "missing {name}");
        }
    }

    #[test]
    fn reference_buckets_cover_every_model_schema() {
        let store = ModelStore::load(&model_dir()).unwrap();
        for kind in ModelKind::ALL {
            let d = store.descriptor(kind);
            let bucket = store.reference_means(d.reference_bucket).unwrap();
            for name in &d.feature_order {
                assert!(bucket.contains_key(name), "{} missing in bucket", name);
            }
        }
    }

    #[test]
    fn validation_rejects_coefficient_drift() {
        let descriptor = ModelDescriptor {
            feature_order: vec!["Debtor".to_string(), "Gender".to_string()],
            coefficients: vec![0.1],
            intercept: 0.0,
            calibration: None,
            reference_bucket: "with_gender",
        };
        let err = validate_descriptor(ModelKind::Baseline, &descriptor).unwrap_err();
        assert!(matches!(err, AppError::SchemaMismatch { .. }));
    }

    #[test]
    fn validation_rejects_duplicate_feature_names() {
        let descriptor = ModelDescriptor {
            feature_order: vec!["Debtor".to_string(), "Debtor".to_string()],
            coefficients: vec![0.1, 0.2],
            intercept: 0.0,
            calibration: None,
            reference_bucket: "with_gender",
        };
        let err = validate_descriptor(ModelKind::Baseline, &descriptor).unwrap_err();
        assert!(matches!(err, AppError::InvalidModel(_)));
    }
}
