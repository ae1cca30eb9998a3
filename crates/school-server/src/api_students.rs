//! Student controller.

use crate::{api::ApiError, AppState};
use axum::{
    extract::{Extension, Json, Path},
    http::{header, StatusCode},
    response::IntoResponse,
};
use school_types::{NewStudent, Student};
use std::sync::Arc;

/// Handler for `GET /api/students`.
pub async fn list_students_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Vec<Student>>, ApiError> {
    let db = state.db.clone();
    let students = tokio::task::spawn_blocking(move || db.list_students()).await??;
    Ok(Json(students))
}

/// Handler for `GET /api/students/{id}`.
pub async fn get_student_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Student>, ApiError> {
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || db.find_student(id))
        .await??
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("student {} not found", id)))
}

/// Handler for `POST /api/students`.
///
/// Responds `201 Created` with a `Location` header pointing at the new
/// student.
pub async fn create_student_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<NewStudent>,
) -> Result<impl IntoResponse, ApiError> {
    payload.validate()?;

    let db = state.db.clone();
    let student = tokio::task::spawn_blocking(move || db.add_student(&payload)).await??;

    tracing::info!(student_id = student.id, "student created");

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, format!("/api/students/{}", student.id))],
        Json(student),
    ))
}

/// Handler for `DELETE /api/students/{id}`.
pub async fn delete_student_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let db = state.db.clone();
    let removed = tokio::task::spawn_blocking(move || db.remove_student(id)).await??;

    if removed {
        tracing::info!(student_id = id, "student deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("student {} not found", id)))
    }
}
