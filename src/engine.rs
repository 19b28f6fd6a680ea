use crate::error::AppError;
use crate::explain::{explain_global, explain_local};
use crate::features::{build_vector, normalize, DefaultsTable};
use crate::models::{ModelDescriptor, ModelKind, ModelStore};
use crate::scoring::predict_probability;
use crate::types::{GlobalExplanation, Prediction, PredictionResult};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Synchronous inference-and-explanation engine over the loaded model store.
///
/// Everything here is a pure function of immutable state, so any number of
/// requests may call into it concurrently. The only mutable state is the
/// memoized global-explanation cache, which holds pure functions of model id.
pub struct PredictionEngine {
    store: ModelStore,
    global_cache: RwLock<HashMap<ModelKind, Arc<GlobalExplanation>>>,
}

impl PredictionEngine {
    pub fn new(store: ModelStore) -> Self {
        Self {
            store,
            global_cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_dir(dir: &Path) -> Result<Self, AppError> {
        Ok(Self::new(ModelStore::load(dir)?))
    }

    /// End-to-end prediction with local explanation.
    pub fn predict(
        &self,
        model_alias: &str,
        raw_student: &Map<String, Value>,
    ) -> Result<PredictionResult, AppError> {
        let kind = self.resolve(model_alias)?;
        let descriptor = self.store.descriptor(kind);

        let features = normalize(raw_student, self.store.defaults());
        let x = build_vector(&descriptor.feature_order, &features)?;
        let p_raw = predict_probability(
            kind.as_str(),
            &descriptor.coefficients,
            descriptor.intercept,
            &x,
        )?;

        let prob_graduate = match &descriptor.calibration {
            Some(curve) => curve.map(p_raw),
            None => p_raw,
        };

        let prediction = if prob_graduate >= 0.5 {
            Prediction::Graduate
        } else {
            Prediction::Dropout
        };
        let confidence = match prediction {
            Prediction::Graduate => prob_graduate,
            Prediction::Dropout => 1.0 - prob_graduate,
        }
        .clamp(0.0, 1.0);

        // The explanation always decomposes the underlying linear score;
        // isotonic remapping has no per-feature decomposition.
        let reference = self.reference_for(descriptor)?;
        let explanation = explain_local(descriptor, reference, &features)?;

        debug!(
            "Predicted {:?} with model {} (probGraduate {:.4})",
            prediction,
            kind.as_str(),
            prob_graduate
        );

        Ok(PredictionResult {
            prediction,
            confidence,
            prob_graduate,
            model_type: kind.as_str().to_string(),
            explanation,
        })
    }

    /// Global feature importance for one model, memoized per model kind.
    pub fn global_explanation(
        &self,
        model_alias: &str,
    ) -> Result<Arc<GlobalExplanation>, AppError> {
        let kind = self.resolve(model_alias)?;

        if let Some(hit) = self.global_cache.read().unwrap().get(&kind) {
            return Ok(Arc::clone(hit));
        }

        let explanation = Arc::new(explain_global(kind, self.store.descriptor(kind)));
        self.global_cache
            .write()
            .unwrap()
            .insert(kind, Arc::clone(&explanation));
        Ok(explanation)
    }

    /// Pass-through of the training defaults, so clients can prefill forms.
    pub fn defaults(&self) -> &DefaultsTable {
        self.store.defaults()
    }

    fn resolve(&self, model_alias: &str) -> Result<ModelKind, AppError> {
        ModelKind::resolve(model_alias)
            .ok_or_else(|| AppError::UnknownModel(model_alias.to_string()))
    }

    fn reference_for(
        &self,
        descriptor: &ModelDescriptor,
    ) -> Result<&HashMap<String, f64>, AppError> {
        self.store
            .reference_means(descriptor.reference_bucket)
            .ok_or_else(|| {
                AppError::MissingReference(format!(
                    "bucket \"{}\"",
                    descriptor.reference_bucket
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::{dot, sigmoid};
    use serde_json::json;
    use std::path::PathBuf;

    fn engine() -> PredictionEngine {
        let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("models");
        PredictionEngine::from_dir(&dir).unwrap()
    }

    fn student(value: serde_json::Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn baseline_prediction_matches_hand_computed_probability() {
        let engine = engine();
        let raw = student(json!({
            "Admission_grade": 120,
            "Age_at_enrollment": 19,
            "Scholarship_holder": "Yes",
            "Tuition_up_to_date": "Yes",
            "Debtor": "No",
            "Gender": 0
        }));

        let result = engine.predict("baseline", &raw).unwrap();

        // Remaining features fall back to training defaults:
        // Displaced 1, Special needs 0, International 0,
        // Unemployment 11.1, Inflation 1.4, GDP 0.32.
        let d = engine.store.descriptor(ModelKind::Baseline);
        let x = vec![120.0, 19.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 11.1, 1.4, 0.32, 0.0];
        let expected = sigmoid(dot(&d.coefficients, &x) + d.intercept);

        assert!((result.prob_graduate - expected).abs() < 1e-12);
        assert_eq!(result.prediction, Prediction::Graduate);
        assert!((result.confidence - expected).abs() < 1e-12);
        assert_eq!(result.model_type, "baseline");
    }

    #[test]
    fn dropout_confidence_is_mass_of_predicted_class() {
        let engine = engine();
        let raw = student(json!({
            "Admission_grade": 95,
            "Age_at_enrollment": 45,
            "Scholarship_holder": "No",
            "Tuition_up_to_date": "No",
            "Displaced": "No",
            "Debtor": "Yes",
            "Gender": 1
        }));

        let result = engine.predict("baseline", &raw).unwrap();
        assert_eq!(result.prediction, Prediction::Dropout);
        assert!((result.confidence - (1.0 - result.prob_graduate)).abs() < 1e-12);
        assert!((0.0..=1.0).contains(&result.confidence));
    }

    #[test]
    fn gender_blind_alias_resolves_and_drops_gender() {
        let engine = engine();
        let raw = student(json!({ "Gender": 1, "Admission_grade": 140 }));

        let result = engine.predict("gender-blind", &raw).unwrap();
        assert_eq!(result.model_type, "drop_gender");
        assert!(!result
            .explanation
            .features
            .iter()
            .any(|record| record.name == "Gender"));
    }

    #[test]
    fn gender_blind_prediction_ignores_supplied_gender() {
        let engine = engine();
        let male = engine
            .predict("gender-blind", &student(json!({ "Gender": 1 })))
            .unwrap();
        let female = engine
            .predict("gender-blind", &student(json!({ "Gender": 0 })))
            .unwrap();
        assert_eq!(male.prob_graduate, female.prob_graduate);
    }

    #[test]
    fn calibrated_model_maps_raw_probability_through_the_curve() {
        let engine = engine();
        let raw = student(json!({ "Admission_grade": 130, "Age_at_enrollment": 21 }));

        let result = engine.predict("calibrated", &raw).unwrap();

        let d = engine.store.descriptor(ModelKind::Calibrated);
        let features = normalize(&raw, engine.store.defaults());
        let x = build_vector(&d.feature_order, &features).unwrap();
        let p_raw = sigmoid(dot(&d.coefficients, &x) + d.intercept);
        let curve = d.calibration.as_ref().unwrap();

        assert_eq!(result.prob_graduate, curve.map(p_raw));
        // The explanation decomposes the linear score, not the calibrated
        // probability.
        assert!((result.explanation.output_value - (dot(&d.coefficients, &x) + d.intercept)).abs() < 1e-12);
    }

    #[test]
    fn unknown_alias_fails_with_unknown_model() {
        let engine = engine();
        let err = engine.predict("nonexistent", &Map::new()).unwrap_err();
        match err {
            AppError::UnknownModel(alias) => assert_eq!(alias, "nonexistent"),
            other => panic!("expected UnknownModel, got {other:?}"),
        }

        let err = engine.global_explanation("nonexistent").unwrap_err();
        assert!(matches!(err, AppError::UnknownModel(_)));
    }

    #[test]
    fn local_explanation_is_additive_for_every_model() {
        let engine = engine();
        let raw = student(json!({
            "Admission_grade": 133.4,
            "Debtor": "Yes",
            "Gender": 1
        }));

        for alias in ["baseline", "drop_gender", "reweighted", "calibrated"] {
            let result = engine.predict(alias, &raw).unwrap();
            let total: f64 = result
                .explanation
                .features
                .iter()
                .map(|r| r.contribution)
                .sum();
            assert!(
                (result.explanation.base_value + total - result.explanation.output_value).abs()
                    < 1e-9,
                "additivity violated for {alias}"
            );
        }
    }

    #[test]
    fn global_explanation_cache_hit_is_observably_identical() {
        let engine = engine();
        let first = engine.global_explanation("reweighted").unwrap();
        let second = engine.global_explanation("reweighted").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.features.len(), second.features.len());
        for w in first.features.windows(2) {
            assert!(w[0].importance >= w[1].importance);
        }
    }

    #[test]
    fn defaults_are_passed_through_unchanged() {
        let engine = engine();
        let defaults = engine.defaults();
        assert_eq!(defaults["Unemployment rate"], 11.1);
        assert_eq!(defaults["Tuition fees up to date"], 1.0);
    }
}
