use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Prediction {
    Graduate,
    Dropout,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PredictRequest {
    #[serde(default = "default_model_type")]
    pub model_type: String,
    #[serde(default)]
    pub student_data: Map<String, Value>,
}

fn default_model_type() -> String {
    "reweighted".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    pub prediction: Prediction,
    pub confidence: f64,
    #[serde(rename = "probGraduate")]
    pub prob_graduate: f64,
    pub model_type: String,
    pub explanation: LocalExplanation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalExplanation {
    #[serde(rename = "type")]
    pub explanation_type: String,
    pub domain: String,
    pub base_value: f64,
    pub output_value: f64,
    pub features: Vec<AttributionRecord>,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributionRecord {
    pub name: String,
    pub value: f64,
    pub weight: f64,
    pub contribution: f64,
    pub impact: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalExplanation {
    pub model_type: String,
    pub explanation_type: String,
    pub description: String,
    pub features: Vec<GlobalFeature>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalFeature {
    pub feature: String,
    pub weight: f64,
    pub importance: f64,
}
