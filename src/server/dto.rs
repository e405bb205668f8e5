use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTableRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub ph: Option<f64>,
    #[serde(default)]
    pub ppm: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MeasurementRequest {
    #[serde(default)]
    pub ph: Option<f64>,
    #[serde(default)]
    pub ppm: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct NutrientRequest {
    pub amount: f64,
}
