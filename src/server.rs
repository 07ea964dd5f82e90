//! HTTP API over the [`Workbench`].
//!
//! **Health:**
//! - `GET  /health`: status, version, record counts
//!
//! **Books:**
//! - `GET  /books`, `POST /books`
//! - `GET  /books/{id}`, `PUT /books/{id}`, `DELETE /books/{id}`
//!
//! **Research projects:**
//! - `GET  /projects`, `POST /projects`
//! - `GET  /projects/{id}` (overview), `PUT /projects/{id}`, `DELETE /projects/{id}`
//! - `POST /projects/{id}/search`: scholarly search, results appended
//! - `POST /projects/{id}/remove_finding_aid`
//! - `POST /projects/{id}/analyze`: analyze selected text
//!
//! **Finding aids:**
//! - `POST /finding-aids`: multipart upload (`file`, `education_level`, `project`)
//! - `POST /finding-aids/analyze`: analyze selected text
//! - `GET  /analyses/{id}`, `DELETE /analyses/{id}`
//! - `POST /analyses/{id}/analyze-full`
//!
//! **Images:**
//! - `POST /images`: multipart (`title`, `image`, `sizes`)
//!
//! Workbench calls block on the store and on outbound HTTP, so every handler
//! hops onto the blocking pool.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::analysis::Analysis;
use crate::books::BookRecord;
use crate::error::{ErrorKind, LibrisError, LibrisResult};
use crate::finding_aid::AnalysisRecord;
use crate::model::{AnalysisState, Book, EducationLevel, Publication};
use crate::project::{ProjectDeletion, ProjectOverview, ProjectRecord, ProjectUpdate};
use crate::workbench::{Upload, UploadReceipt, Workbench};

type AppState = Arc<Workbench>;

/// Slack on top of the upload limit for multipart framing and form fields.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

const ANALYSIS_FAILED: &str = "An error occurred while analyzing the text";

// ── Errors ────────────────────────────────────────────────────────────────

/// Body shape of an error response.
#[derive(Debug, Clone, Copy)]
enum Shape {
    /// `{ "success": false, "message": ... }`
    Status,
    /// `{ "error": ... }`
    Analyze,
}

#[derive(Debug)]
enum ApiFailure {
    Libris(LibrisError),
    BadRequest(String),
    /// Rejected by an extractor with its own status.
    Rejected(StatusCode, String),
    Internal(String),
}

#[derive(Debug)]
struct ApiError {
    failure: ApiFailure,
    shape: Shape,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            failure: ApiFailure::BadRequest(message.into()),
            shape: Shape::Status,
        }
    }

    fn analyze(self) -> Self {
        Self {
            shape: Shape::Analyze,
            ..self
        }
    }
}

impl From<LibrisError> for ApiError {
    fn from(e: LibrisError) -> Self {
        Self {
            failure: ApiFailure::Libris(e),
            shape: Shape::Status,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<axum::extract::multipart::MultipartError> for ApiError {
    fn from(e: axum::extract::multipart::MultipartError) -> Self {
        Self {
            failure: ApiFailure::Rejected(e.status(), e.body_text()),
            shape: Shape::Status,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self.failure {
            ApiFailure::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiFailure::Rejected(status, message) => (status, message),
            ApiFailure::Internal(message) => {
                tracing::error!(%message, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_string())
            }
            ApiFailure::Libris(e) => match e.kind() {
                ErrorKind::Validation => (StatusCode::BAD_REQUEST, e.to_string()),
                ErrorKind::NotFound => (StatusCode::NOT_FOUND, e.to_string()),
                ErrorKind::ExternalService => {
                    tracing::error!(error = %e, "external service failed");
                    (StatusCode::INTERNAL_SERVER_ERROR, ANALYSIS_FAILED.to_string())
                }
                ErrorKind::Storage => {
                    tracing::error!(error = %e, "storage failure");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "a storage error occurred".to_string(),
                    )
                }
            },
        };

        let body = match self.shape {
            Shape::Status => serde_json::json!({ "success": false, "message": message }),
            Shape::Analyze => serde_json::json!({ "error": message }),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Run a workbench call on the blocking pool.
async fn blocking<T, F>(workbench: &AppState, f: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&Workbench) -> LibrisResult<T> + Send + 'static,
{
    let workbench = Arc::clone(workbench);
    tokio::task::spawn_blocking(move || f(workbench.as_ref()))
        .await
        .map_err(|e| ApiError {
            failure: ApiFailure::Internal(format!("worker task failed: {e}")),
            shape: Shape::Status,
        })?
        .map_err(ApiError::from)
}

// ── Request / response types ──────────────────────────────────────────────

#[derive(Serialize)]
struct StatusResponse {
    success: bool,
    message: String,
}

impl StatusResponse {
    fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
        })
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    books: usize,
    projects: usize,
    finding_aids: usize,
    analyses: usize,
}

#[derive(Deserialize)]
struct NewProject {
    title: String,
    description: String,
    education_level: EducationLevel,
}

#[derive(Deserialize)]
struct SearchRequest {
    #[serde(default)]
    query: String,
}

#[derive(Serialize)]
struct SearchResponse {
    success: bool,
    message: String,
    results: Vec<Publication>,
}

#[derive(Deserialize)]
struct RemoveFindingAidRequest {
    finding_aid_id: Option<String>,
}

#[derive(Deserialize)]
struct AnalyzeRequest {
    analysis_id: Option<String>,
    selected_text: Option<String>,
    education_level: Option<String>,
}

#[derive(Serialize)]
struct DeleteProjectResponse {
    success: bool,
    message: String,
    #[serde(flatten)]
    report: ProjectDeletion,
}

#[derive(Serialize)]
struct UploadResponse {
    success: bool,
    message: String,
    #[serde(flatten)]
    receipt: UploadReceipt,
}

#[derive(Serialize)]
struct AnalysisView {
    #[serde(flatten)]
    record: AnalysisRecord,
    state: AnalysisState,
}

#[derive(Serialize)]
struct ImageResponse {
    success: bool,
    message: String,
    results: Vec<String>,
}

// ── Health ────────────────────────────────────────────────────────────────

async fn health(State(wb): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let status = blocking(&wb, |wb| wb.status()).await?;
    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        books: status.books,
        projects: status.projects,
        finding_aids: status.finding_aids,
        analyses: status.analyses,
    }))
}

// ── Books ─────────────────────────────────────────────────────────────────

async fn list_books(State(wb): State<AppState>) -> ApiResult<Json<Vec<BookRecord>>> {
    Ok(Json(blocking(&wb, |wb| wb.list_books()).await?))
}

async fn create_book(
    State(wb): State<AppState>,
    body: Result<Json<Book>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<BookRecord>)> {
    let Json(book) = body?;
    let record = blocking(&wb, move |wb| {
        let id = wb.create_book(&book)?;
        wb.book(id.as_str())
    })
    .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn get_book(
    State(wb): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<BookRecord>> {
    Ok(Json(blocking(&wb, move |wb| wb.book(&id)).await?))
}

async fn update_book(
    State(wb): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<Book>, JsonRejection>,
) -> ApiResult<Json<BookRecord>> {
    let Json(book) = body?;
    Ok(Json(blocking(&wb, move |wb| wb.update_book(&id, &book)).await?))
}

async fn delete_book(
    State(wb): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<StatusResponse>> {
    blocking(&wb, move |wb| wb.delete_book(&id)).await?;
    Ok(StatusResponse::ok("Book deleted successfully!"))
}

// ── Projects ──────────────────────────────────────────────────────────────

async fn list_projects(State(wb): State<AppState>) -> ApiResult<Json<Vec<ProjectRecord>>> {
    Ok(Json(blocking(&wb, |wb| wb.list_projects()).await?))
}

async fn create_project(
    State(wb): State<AppState>,
    body: Result<Json<NewProject>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ProjectRecord>)> {
    let Json(new) = body?;
    let record = blocking(&wb, move |wb| {
        let id = wb.create_project(&new.title, &new.description, new.education_level)?;
        wb.project(id.as_str())
    })
    .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn get_project(
    State(wb): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ProjectOverview>> {
    Ok(Json(blocking(&wb, move |wb| wb.project_overview(&id)).await?))
}

async fn update_project(
    State(wb): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<ProjectUpdate>, JsonRejection>,
) -> ApiResult<Json<ProjectRecord>> {
    let Json(changes) = body?;
    Ok(Json(
        blocking(&wb, move |wb| wb.update_project(&id, &changes)).await?,
    ))
}

async fn delete_project(
    State(wb): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteProjectResponse>> {
    let report = blocking(&wb, move |wb| wb.delete_project(&id)).await?;
    Ok(Json(DeleteProjectResponse {
        success: true,
        message: "Research project deleted successfully!".into(),
        report,
    }))
}

async fn project_search(
    State(wb): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<SearchRequest>, JsonRejection>,
) -> ApiResult<Json<SearchResponse>> {
    let Json(request) = body?;
    let results = blocking(&wb, move |wb| wb.search_for_project(&id, &request.query)).await?;
    Ok(Json(SearchResponse {
        success: true,
        message: format!("Added {} search results to the project", results.len()),
        results,
    }))
}

async fn remove_finding_aid(
    State(wb): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<RemoveFindingAidRequest>, JsonRejection>,
) -> ApiResult<Json<StatusResponse>> {
    let Json(request) = body?;
    let finding_aid_id = request
        .finding_aid_id
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Finding aid ID is required"))?;
    blocking(&wb, move |wb| wb.remove_finding_aid(&id, &finding_aid_id)).await?;
    Ok(StatusResponse::ok("Finding aid removed from the project"))
}

async fn project_analyze(
    State(wb): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> ApiResult<Json<Analysis>> {
    let Json(request) = body.map_err(|e| ApiError::from(e).analyze())?;
    let (analysis_id, text, level) = analyze_fields(request)?;
    let analysis = blocking(&wb, move |wb| {
        wb.project(&id)?;
        wb.analyze_selection(&analysis_id, &text, level)
    })
    .await
    .map_err(ApiError::analyze)?;
    Ok(Json(analysis))
}

// ── Finding aids ──────────────────────────────────────────────────────────

fn analyze_fields(request: AnalyzeRequest) -> ApiResult<(String, String, EducationLevel)> {
    let missing = || ApiError::bad_request("Missing required data").analyze();
    let present = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

    let analysis_id = present(request.analysis_id).ok_or_else(missing)?;
    let text = present(request.selected_text).ok_or_else(missing)?;
    let level = present(request.education_level).ok_or_else(missing)?;
    let level = level
        .parse::<EducationLevel>()
        .map_err(|e| ApiError::bad_request(e.to_string()).analyze())?;
    Ok((analysis_id, text, level))
}

async fn analyze_text(
    State(wb): State<AppState>,
    body: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> ApiResult<Json<Analysis>> {
    let Json(request) = body.map_err(|e| ApiError::from(e).analyze())?;
    let (analysis_id, text, level) = analyze_fields(request)?;
    let analysis = blocking(&wb, move |wb| wb.analyze_selection(&analysis_id, &text, level))
        .await
        .map_err(ApiError::analyze)?;
    Ok(Json(analysis))
}

async fn upload_finding_aid(
    State(wb): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut education_level = None;
    let mut project = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                file = Some((filename, field.bytes().await?.to_vec()));
            }
            Some("education_level") => education_level = Some(field.text().await?),
            Some("project") => project = Some(field.text().await?),
            _ => {}
        }
    }

    let (filename, data) = file
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| ApiError::bad_request("a finding aid file is required"))?;
    let education_level = education_level
        .ok_or_else(|| ApiError::bad_request("education_level is required"))?
        .parse::<EducationLevel>()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    let project = project
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("project is required"))?;

    let receipt = blocking(&wb, move |wb| {
        wb.upload_finding_aid(Upload {
            filename: &filename,
            data: &data,
            education_level,
            project_id: &project,
        })
    })
    .await?;
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            success: true,
            message: "Finding aid uploaded and text extracted successfully!".into(),
            receipt,
        }),
    ))
}

async fn get_analysis(
    State(wb): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<AnalysisView>> {
    let record = blocking(&wb, move |wb| wb.analysis(&id)).await?;
    let state = record.doc.state();
    Ok(Json(AnalysisView { record, state }))
}

async fn delete_analysis(
    State(wb): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<StatusResponse>> {
    blocking(&wb, move |wb| wb.delete_analysis(&id)).await?;
    Ok(StatusResponse::ok("Analysis deleted"))
}

async fn analyze_full(
    State(wb): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Analysis>> {
    let analysis = blocking(&wb, move |wb| wb.analyze_full(&id))
        .await
        .map_err(ApiError::analyze)?;
    Ok(Json(analysis))
}

// ── Images ────────────────────────────────────────────────────────────────

async fn process_image(
    State(wb): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<ImageResponse>> {
    let mut title = None;
    let mut image: Option<(String, Vec<u8>)> = None;
    let mut sizes: Vec<String> = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("title") => title = Some(field.text().await?),
            Some("image") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                image = Some((filename, field.bytes().await?.to_vec()));
            }
            Some("sizes") => {
                let text = field.text().await?;
                sizes.extend(
                    text.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string),
                );
            }
            _ => {}
        }
    }

    let title = title
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("title is required"))?;
    let (filename, data) = image.ok_or_else(|| ApiError::bad_request("an image is required"))?;

    let results = blocking(&wb, move |wb| {
        wb.process_image(&title, &filename, &data, &sizes)
    })
    .await?;
    Ok(Json(ImageResponse {
        success: true,
        message: "Image processed successfully!".into(),
        results,
    }))
}

// ── Router ────────────────────────────────────────────────────────────────

/// Build the application router.
pub fn router(workbench: Arc<Workbench>) -> Router {
    let body_limit = workbench
        .max_content_length()
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/health", get(health))
        // Books.
        .route("/books", get(list_books).post(create_book))
        .route(
            "/books/{id}",
            get(get_book).put(update_book).delete(delete_book),
        )
        // Projects.
        .route("/projects", get(list_projects).post(create_project))
        .route(
            "/projects/{id}",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route("/projects/{id}/search", post(project_search))
        .route("/projects/{id}/remove_finding_aid", post(remove_finding_aid))
        .route("/projects/{id}/analyze", post(project_analyze))
        // Finding aids.
        .route("/finding-aids", post(upload_finding_aid))
        .route("/finding-aids/analyze", post(analyze_text))
        .route("/analyses/{id}", get(get_analysis).delete(delete_analysis))
        .route("/analyses/{id}/analyze-full", post(analyze_full))
        // Images.
        .route("/images", post(process_image))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(workbench)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(workbench: Arc<Workbench>, addr: &str) -> std::io::Result<()> {
    let app = router(workbench);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "libris server listening");
    axum::serve(listener, app).await
}
