//! Course controller.

use crate::{api::ApiError, AppState};
use axum::{
    extract::{Extension, Json, Path},
    http::{header, StatusCode},
    response::IntoResponse,
};
use school_types::{Course, NewCourse};
use std::sync::Arc;

/// Handler for `GET /api/courses`.
pub async fn list_courses_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Vec<Course>>, ApiError> {
    let db = state.db.clone();
    let courses = tokio::task::spawn_blocking(move || db.list_courses()).await??;
    Ok(Json(courses))
}

/// Handler for `GET /api/courses/{id}`.
pub async fn get_course_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Course>, ApiError> {
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || db.find_course(id))
        .await??
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("course {} not found", id)))
}

/// Handler for `POST /api/courses`.
pub async fn create_course_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<NewCourse>,
) -> Result<impl IntoResponse, ApiError> {
    payload.validate()?;

    let db = state.db.clone();
    let course = tokio::task::spawn_blocking(move || db.add_course(&payload)).await??;

    tracing::info!(course_id = course.id, title = %course.title, "course created");

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, format!("/api/courses/{}", course.id))],
        Json(course),
    ))
}
