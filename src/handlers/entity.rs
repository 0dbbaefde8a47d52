//! Entity handlers: list, create, read, update, delete for any table named in the path.

use crate::error::AppError;
use crate::response::{created_response, list_response};
use crate::service::ListParams;
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Unparseable JSON and non-object bodies are both `BadRequest`.
fn body_to_map(body: Result<Json<Value>, JsonRejection>) -> Result<Map<String, Value>, AppError> {
    let Json(value) = body?;
    match value {
        Value::Object(m) => Ok(m),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

pub async fn list(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    let params = ListParams::from_query(params);
    let (rows, total) = state.entities.list(&entity, &params).await?;
    Ok(list_response(rows, total))
}

pub async fn create(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, AppError> {
    let body = body_to_map(body)?;
    let id = state.entities.create(&entity, &body).await?;
    let row = state.entities.get(&entity, &id.to_string()).await?;
    Ok(created_response(&entity, id, row))
}

pub async fn read(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let row = state.entities.get(&entity, &id).await?;
    Ok((StatusCode::OK, Json(row)).into_response())
}

pub async fn update(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, AppError> {
    let body = body_to_map(body)?;
    let (affected, row) = state.entities.update(&entity, &id, &body).await?;
    let status = if affected == 0 {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::OK
    };
    Ok((status, Json(row)).into_response())
}

pub async fn delete(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    match state.entities.delete(&entity, &id).await? {
        0 => Err(AppError::NotFound(format!("{} {}", entity, id))),
        _ => Ok(StatusCode::OK),
    }
}
