use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};

use crate::auth::RequireSession;
use crate::server::AppState;
use crate::server::dto::{CreateTableRequest, MeasurementRequest, NutrientRequest};
use crate::server::response::{ApiError, ApiResponse};
use crate::tracker::NewTable;

pub fn tables_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tables", get(list_tables).post(create_table))
        .route("/tables/{id}", get(get_table).delete(delete_table))
        .route("/tables/{id}/harvest", post(record_harvest))
        .route("/tables/{id}/water-change", post(record_water_change))
        .route("/tables/{id}/measurement", put(update_measurement))
        .route("/tables/{id}/nutrient", post(add_nutrient))
        .route("/tables/{id}/nutrient/reset", post(reset_nutrient))
}

pub async fn list_tables(
    RequireSession(session): RequireSession,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let tables = state.tables.list_tables(&session).await?;
    Ok::<_, ApiError>(Json(ApiResponse::success(tables)))
}

pub async fn create_table(
    RequireSession(session): RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTableRequest>,
) -> impl IntoResponse {
    let new = NewTable {
        name: req.name,
        description: req.description,
        ph: req.ph,
        ppm: req.ppm,
    };
    let table = state.tables.create_table(&session, new).await?;
    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(table))))
}

pub async fn get_table(
    RequireSession(session): RequireSession,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let table = state.tables.get_table(&session, &id).await?;
    Ok::<_, ApiError>(Json(ApiResponse::success(table)))
}

pub async fn delete_table(
    RequireSession(session): RequireSession,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    state.tables.delete_table(&session, &id).await?;
    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn record_harvest(
    RequireSession(session): RequireSession,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let table = state.tables.record_harvest(&session, &id).await?;
    Ok::<_, ApiError>(Json(ApiResponse::success(table)))
}

pub async fn record_water_change(
    RequireSession(session): RequireSession,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let table = state.tables.record_water_change(&session, &id).await?;
    Ok::<_, ApiError>(Json(ApiResponse::success(table)))
}

pub async fn update_measurement(
    RequireSession(session): RequireSession,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<MeasurementRequest>,
) -> impl IntoResponse {
    let table = state
        .tables
        .update_measurement(&session, &id, req.ph, req.ppm)
        .await?;
    Ok::<_, ApiError>(Json(ApiResponse::success(table)))
}

pub async fn add_nutrient(
    RequireSession(session): RequireSession,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<NutrientRequest>,
) -> impl IntoResponse {
    let table = state.tables.add_nutrient(&session, &id, req.amount).await?;
    Ok::<_, ApiError>(Json(ApiResponse::success(table)))
}

pub async fn reset_nutrient(
    RequireSession(session): RequireSession,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let table = state.tables.reset_nutrient(&session, &id).await?;
    Ok::<_, ApiError>(Json(ApiResponse::success(table)))
}
