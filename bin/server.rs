// Tier Board - Web Server
// REST adapter over the editor and the library, with Axum

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tier_board::identity;
use tier_board::protocol;
use tier_board::render::{self, SHARE_FILE_STEM};
use tier_board::{
    ApplyOutcome, BusyFlag, Command, Config, DataUriLoader, DeleteOutcome, Editor, LibraryEntry, LibraryIndex, NewEntry,
    RenderedBoard, Store, SvgRasterizer, TierError, Visibility,
};
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

/// Optional per-request viewer id; falls back to this server's own id
const VIEWER_HEADER: &str = "x-viewer-id";

/// Shared application state
#[derive(Clone)]
struct AppState {
    editor: Arc<Mutex<Editor>>,
    library: LibraryIndex,
    store: Store,
    image_export: BusyFlag,
    author: Option<String>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let body: ApiResponse<()> = ApiResponse {
        success: false,
        data: None,
        error: Some(message.into()),
    };
    (status, Json(body)).into_response()
}

fn lock_editor(state: &AppState) -> Result<MutexGuard<'_, Editor>, Response> {
    state.editor.lock().map_err(|_| {
        tracing::error!("editor lock poisoned");
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "editor unavailable")
    })
}

fn viewer_id(state: &AppState, headers: &HeaderMap) -> String {
    headers
        .get(VIEWER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| identity::viewer_id(&state.store))
}

/// `attachment` header carrying both a plain and an RFC 5987 file name
fn content_disposition(filename: &str) -> String {
    let ascii: String = filename
        .chars()
        .map(|c| if c.is_ascii_graphic() && c != '"' && c != '\\' { c } else { '_' })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii,
        urlencoding::encode(filename)
    )
}

// ============================================================================
// Request / Response types
// ============================================================================

#[derive(Deserialize)]
struct CommandsRequest {
    commands: Vec<Command>,
}

#[derive(Serialize)]
struct CommandsResponse {
    outcomes: Vec<ApplyOutcome>,
    board: RenderedBoard,
}

#[derive(Deserialize)]
struct LibraryQuery {
    visibility: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveRequest {
    name: String,
    #[serde(default)]
    is_public: bool,
    author: Option<String>,
}

/// Library listing row (rows/labels omitted)
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EntrySummary {
    id: String,
    name: String,
    author: String,
    is_public: bool,
    thumbnail: String,
    created_at: String,
}

impl From<LibraryEntry> for EntrySummary {
    fn from(e: LibraryEntry) -> Self {
        Self {
            id: e.id,
            name: e.name,
            author: e.author,
            is_public: e.is_public,
            thumbnail: e.thumbnail,
            created_at: e.created_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
struct EntryResponse {
    entry: LibraryEntry,
    view: RenderedBoard,
}

#[derive(Serialize)]
struct DeleteResponse {
    id: String,
    deleted: bool,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/board - Current board, ranked, with scores and accents
async fn get_board(State(state): State<AppState>) -> Response {
    let editor = match lock_editor(&state) {
        Ok(editor) => editor,
        Err(resp) => return resp,
    };
    Json(ApiResponse::ok(RenderedBoard::from_board(editor.board()))).into_response()
}

/// POST /api/board/commands - Apply commands in order
async fn apply_commands(State(state): State<AppState>, Json(req): Json<CommandsRequest>) -> Response {
    let mut editor = match lock_editor(&state) {
        Ok(editor) => editor,
        Err(resp) => return resp,
    };

    let outcomes = editor.execute_all(&req.commands);
    tracing::info!(count = req.commands.len(), "applied commands");

    Json(ApiResponse::ok(CommandsResponse {
        outcomes,
        board: RenderedBoard::from_board(editor.board()),
    }))
    .into_response()
}

/// GET /api/board/export - Download the export file
async fn export_board(State(state): State<AppState>) -> Response {
    let editor = match lock_editor(&state) {
        Ok(editor) => editor,
        Err(resp) => return resp,
    };
    let board = editor.board();

    match protocol::export_json(board) {
        Ok(json) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/json".to_string()),
                (header::CONTENT_DISPOSITION, content_disposition(&protocol::export_filename(&board.title))),
            ],
            json,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "export encoding failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "export failed")
        }
    }
}

/// POST /api/board/import - Replace the board with an export file (grades cleared)
async fn import_board(State(state): State<AppState>, body: String) -> Response {
    let mut editor = match lock_editor(&state) {
        Ok(editor) => editor,
        Err(resp) => return resp,
    };

    match editor.import_json(&body) {
        Ok(board) => Json(ApiResponse::ok(RenderedBoard::from_board(board))).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "import rejected");
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
    }
}

/// GET /api/board/image - Render the board; one export at a time
async fn board_image(State(state): State<AppState>) -> Response {
    let Some(token) = state.image_export.try_acquire() else {
        return error_response(StatusCode::CONFLICT, "an image export is already running");
    };

    let view = match lock_editor(&state) {
        Ok(editor) => RenderedBoard::from_board(editor.board()),
        Err(resp) => return resp,
    };

    let rendered = tokio::task::spawn_blocking(move || {
        let _token = token;
        render::render_image(&view, &DataUriLoader, &SvgRasterizer::default())
    })
    .await;

    match rendered {
        Ok(Ok(image)) => {
            let filename = image.filename(SHARE_FILE_STEM);
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, image.mime.clone()),
                    (header::CONTENT_DISPOSITION, content_disposition(&filename)),
                ],
                Bytes::from(image.bytes),
            )
                .into_response()
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "image export failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "image export failed")
        }
        Err(e) => {
            tracing::error!(error = %e, "image export task panicked");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "image export failed")
        }
    }
}

/// GET /api/library?visibility=public|private - Entries visible to the viewer
async fn list_library(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<LibraryQuery>,
) -> Response {
    let visibility = match query.visibility.as_deref().unwrap_or("public").parse::<Visibility>() {
        Ok(v) => v,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };
    let viewer = viewer_id(&state, &headers);

    let entries: Vec<EntrySummary> = state
        .library
        .list(visibility, &viewer)
        .into_iter()
        .map(EntrySummary::from)
        .collect();

    Json(ApiResponse::ok(entries)).into_response()
}

/// POST /api/library - Save the current board; the thumbnail follows later
async fn save_to_library(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SaveRequest>,
) -> Response {
    let author = req
        .author
        .clone()
        .or_else(|| state.author.clone())
        .filter(|a| !a.trim().is_empty())
        .unwrap_or_else(|| identity::author_name(&state.store));
    let author_id = viewer_id(&state, &headers);

    let created = {
        let editor = match lock_editor(&state) {
            Ok(editor) => editor,
            Err(resp) => return resp,
        };
        state.library.create(NewEntry {
            board: editor.board(),
            name: &req.name,
            is_public: req.is_public,
            author: &author,
            author_id: &author_id,
        })
    };

    match created {
        Ok(entry) => {
            let library = state.library.clone();
            let pending = entry.clone();
            tokio::task::spawn_blocking(move || {
                library.generate_thumbnail(&pending, &DataUriLoader, &SvgRasterizer::default());
            });
            (StatusCode::CREATED, Json(ApiResponse::ok(EntrySummary::from(entry)))).into_response()
        }
        Err(TierError::Validation(msg)) => error_response(StatusCode::BAD_REQUEST, msg),
        Err(e) => {
            tracing::error!(error = %e, "library save failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "save failed")
        }
    }
}

/// GET /api/library/:id - One entry with its read-only view
async fn get_library_entry(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.library.get(&id) {
        Some(entry) => {
            let view = entry.read_only_view();
            Json(ApiResponse::ok(EntryResponse { entry, view })).into_response()
        }
        None => error_response(StatusCode::NOT_FOUND, format!("no saved board with id {}", id)),
    }
}

/// DELETE /api/library/:id - Idempotent delete; private entries need their author
async fn delete_library_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    match state.library.delete(&id, &viewer_id(&state, &headers)) {
        DeleteOutcome::NotOwner => error_response(StatusCode::FORBIDDEN, "not your board"),
        outcome => Json(ApiResponse::ok(DeleteResponse { id, deleted: outcome.is_deleted() })).into_response(),
    }
}

fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/board", get(get_board))
        .route("/board/commands", post(apply_commands))
        .route("/board/export", get(export_board))
        .route("/board/import", post(import_board))
        .route("/board/image", get(board_image))
        .route("/library", get(list_library).post(save_to_library))
        .route("/library/:id", get(get_library_entry).delete(delete_library_entry))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("🌐 Tier Board - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = Config::load().context("Failed to load configuration")?;
    let store = Store::open(&config.database_path)
        .with_context(|| format!("Failed to open database {:?}", config.database_path))?;
    println!("✓ Database opened: {:?}", config.database_path);

    let state = AppState {
        editor: Arc::new(Mutex::new(Editor::load(store.clone()))),
        library: LibraryIndex::new(store.clone()),
        store,
        image_export: BusyFlag::new(),
        author: config.user_name.clone(),
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_address))?;

    println!("\n🚀 Server running on http://{}", config.bind_address);
    println!("   API: http://{}/api/board", config.bind_address);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, router(state))
        .await
        .context("Server stopped unexpectedly")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn state() -> AppState {
        let store = Store::open_in_memory().unwrap();
        AppState {
            editor: Arc::new(Mutex::new(Editor::load(store.clone()))),
            library: LibraryIndex::new(store.clone()),
            store,
            image_export: BusyFlag::new(),
            author: None,
        }
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_commands_rank_the_board() {
        let app = router(state());
        let body = serde_json::json!({
            "commands": [
                { "type": "add_row" },
                { "type": "drop_item", "row": 1, "cell": 0, "label": "SS" }
            ]
        });

        let resp = app
            .oneshot(
                Request::post("/api/board/commands")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["data"]["board"]["rows"][0]["score"], 5.0);
        assert_eq!(json["data"]["outcomes"][1]["movements"][0]["direction"], "up");
    }

    #[tokio::test]
    async fn test_bad_import_is_rejected() {
        let app = router(state());

        let resp = app
            .oneshot(Request::post("/api/board/import").body(Body::from("[1, 2]")).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn test_private_entries_follow_viewer_header() {
        let state = state();
        let save = serde_json::json!({ "name": "Mine", "isPublic": false });

        let resp = router(state.clone())
            .oneshot(
                Request::post("/api/library")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(VIEWER_HEADER, "user_a")
                    .body(Body::from(save.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        for (viewer, expected) in [("user_a", 1), ("user_b", 0)] {
            let resp = router(state.clone())
                .oneshot(
                    Request::get("/api/library?visibility=private")
                        .header(VIEWER_HEADER, viewer)
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            let json = body_json(resp).await;
            assert_eq!(json["data"].as_array().unwrap().len(), expected);
        }
    }

    #[tokio::test]
    async fn test_delete_twice_is_fine() {
        let app = router(state());

        for _ in 0..2 {
            let resp = app
                .clone()
                .oneshot(Request::delete("/api/library/tier_missing").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
            let json = body_json(resp).await;
            assert_eq!(json["data"]["deleted"], false);
        }
    }

    #[tokio::test]
    async fn test_private_entry_delete_needs_its_author() {
        let state = state();
        let entry = state
            .library
            .create(NewEntry {
                board: &tier_board::Board::template(),
                name: "Mine",
                is_public: false,
                author: "Ana",
                author_id: "user_a",
            })
            .unwrap();
        let uri = format!("/api/library/{}", entry.id);

        let resp = router(state.clone())
            .oneshot(Request::delete(uri.as_str()).header(VIEWER_HEADER, "user_b").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert!(state.library.get(&entry.id).is_some());

        let resp = router(state.clone())
            .oneshot(Request::delete(uri.as_str()).header(VIEWER_HEADER, "user_a").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["data"]["deleted"], true);
        assert!(state.library.get(&entry.id).is_none());
    }

    #[test]
    fn test_content_disposition_encodes_name() {
        let value = content_disposition("Mi Lista.json");
        assert_eq!(value, "attachment; filename=\"Mi_Lista.json\"; filename*=UTF-8''Mi%20Lista.json");
    }
}
