use crate::error::AppError;
use crate::features::{build_vector, CanonicalFeatures};
use crate::models::{ModelDescriptor, ModelKind};
use crate::scoring::logit;
use crate::types::{AttributionRecord, GlobalExplanation, GlobalFeature, LocalExplanation};
use std::collections::HashMap;

/// Per-prediction attribution in log-odds space, relative to the training
/// means of the model's reference bucket. Contributions are additive in the
/// logit domain, not in probability, so base/output values stay pre-sigmoid.
pub fn explain_local(
    descriptor: &ModelDescriptor,
    reference: &HashMap<String, f64>,
    features: &CanonicalFeatures,
) -> Result<LocalExplanation, AppError> {
    let x = build_vector(&descriptor.feature_order, features)?;
    let x_ref: Vec<f64> = descriptor
        .feature_order
        .iter()
        .map(|name| {
            reference.get(name).copied().ok_or_else(|| {
                AppError::MissingReference(format!(
                    "mean value for feature \"{name}\" in bucket \"{}\"",
                    descriptor.reference_bucket
                ))
            })
        })
        .collect::<Result<_, _>>()?;

    let output_value = logit(&descriptor.coefficients, descriptor.intercept, &x);
    let base_value = logit(&descriptor.coefficients, descriptor.intercept, &x_ref);

    let mut records: Vec<AttributionRecord> = descriptor
        .feature_order
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let contribution = descriptor.coefficients[i] * (x[i] - x_ref[i]);
            AttributionRecord {
                name: name.clone(),
                value: x[i],
                weight: descriptor.coefficients[i],
                contribution,
                impact: if contribution > 0.0 {
                    "increases".to_string()
                } else {
                    "decreases".to_string()
                },
            }
        })
        .collect();

    records.sort_by(|a, b| b.contribution.abs().total_cmp(&a.contribution.abs()));

    let summary = summarize(&records);

    Ok(LocalExplanation {
        explanation_type: "shap_linear".to_string(),
        domain: "logit".to_string(),
        base_value,
        output_value,
        features: records,
        summary,
    })
}

/// Per-model importance ranking from raw coefficient magnitudes. Depends on
/// nothing but the trained weights.
pub fn explain_global(kind: ModelKind, descriptor: &ModelDescriptor) -> GlobalExplanation {
    let mut features: Vec<GlobalFeature> = descriptor
        .feature_order
        .iter()
        .zip(descriptor.coefficients.iter())
        .map(|(name, &weight)| GlobalFeature {
            feature: name.clone(),
            weight,
            importance: weight.abs(),
        })
        .collect();

    features.sort_by(|a, b| b.importance.total_cmp(&a.importance));

    GlobalExplanation {
        model_type: kind.as_str().to_string(),
        explanation_type: "global_feature_importance".to_string(),
        description: "Feature coefficients from logistic regression. Larger absolute values \
                      indicate stronger influence."
            .to_string(),
        features,
    }
}

fn summarize(records: &[AttributionRecord]) -> String {
    let top_positive = records.iter().find(|r| r.contribution > 0.0);
    let top_negative = records.iter().find(|r| r.contribution < 0.0);

    let mut pieces = Vec::new();
    if let Some(r) = top_positive {
        pieces.push(format!(
            "{} supports graduation (+{:.2} log-odds).",
            title_case(&r.name),
            r.contribution
        ));
    }
    if let Some(r) = top_negative {
        pieces.push(format!(
            "{} raises dropout risk ({:.2} log-odds).",
            title_case(&r.name),
            r.contribution
        ));
    }

    if pieces.is_empty() {
        "SHAP explanation derived from logistic regression coefficients.".to_string()
    } else {
        pieces.join(" ")
    }
}

fn title_case(name: &str) -> String {
    name.replace('_', " ")
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
