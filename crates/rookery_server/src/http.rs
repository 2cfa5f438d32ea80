//! HTTP and WebSocket bindings.

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, Query, State, WebSocketUpgrade},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures::StreamExt;
use rookery_core::{MoveError, ParticipantId, Session, SessionId, TimeControl};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tracing::{debug, info, instrument, warn};

use crate::connection::{self, ConnectionConfig};
use crate::service::{GameError, GameService};
use crate::store::ArchivedGame;

/// Shared state behind every route.
#[derive(Debug, Clone, derive_new::new)]
pub struct AppState {
    service: GameService,
    connection: ConnectionConfig,
    default_time_control: TimeControl,
}

/// Body of `POST /games`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGameRequest {
    /// Participant playing White.
    pub white_id: ParticipantId,
    /// Participant playing Black.
    pub black_id: ParticipantId,
    /// Clock settings; the server default applies when omitted.
    #[serde(default)]
    pub time_control: Option<TimeControl>,
}

/// Body of `POST /games/{id}/moves`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveRequest {
    /// Participant submitting the move.
    pub player_id: ParticipantId,
    /// Move notation.
    #[serde(rename = "move")]
    pub notation: String,
}

/// Query string of `GET /ws`.
#[derive(Debug, Clone, Deserialize)]
pub struct LiveParams {
    /// Session to subscribe to.
    pub game_id: SessionId,
    /// Identity of the subscriber.
    pub player_id: ParticipantId,
}

/// JSON error body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// A [`GameError`] rendered as an HTTP response.
#[derive(Debug, derive_more::Display)]
pub enum ApiError {
    /// Failure reported by the game service.
    #[display("{}", _0)]
    Game(GameError),
    /// Malformed request.
    #[display("{}", _0)]
    BadRequest(String),
}

impl From<GameError> for ApiError {
    fn from(err: GameError) -> Self {
        Self::Game(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Game(GameError::Validation(err)) => match err {
                MoveError::AlreadyFinished | MoveError::WrongTurn(_) | MoveError::NotWhiteStart => {
                    StatusCode::CONFLICT
                }
                MoveError::IllegalMove(_) => StatusCode::BAD_REQUEST,
                MoveError::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Game(GameError::InvalidRequest(_)) => StatusCode::BAD_REQUEST,
            ApiError::Game(GameError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Game(GameError::Persistence(_)) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(%status, error = %self, "Request failed");
        } else {
            debug!(%status, error = %self, "Request rejected");
        }
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/games", post(create_game))
        .route("/games/{id}", get(get_game))
        .route("/games/{id}/moves", post(make_move))
        .route("/archive/{id}", get(get_archived))
        .route("/ws", get(live))
        .layer(ServiceBuilder::new().map_request(|req: Request<Body>| {
            info!(method = %req.method(), uri = %req.uri(), "Incoming HTTP request");
            req
        }))
        .with_state(state)
}

#[instrument(skip(state))]
async fn create_game(
    State(state): State<AppState>,
    Json(request): Json<CreateGameRequest>,
) -> Result<(StatusCode, Json<Session>), ApiError> {
    let time_control = request.time_control.unwrap_or(state.default_time_control);
    let session = state
        .service
        .create(request.white_id, request.black_id, time_control)
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

#[instrument(skip(state))]
async fn get_game(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
) -> Result<Json<Session>, ApiError> {
    Ok(Json(state.service.get(id).await?))
}

#[instrument(skip(state))]
async fn make_move(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
    Json(request): Json<MoveRequest>,
) -> Result<Json<Session>, ApiError> {
    let session = state
        .service
        .process_move(id, &request.player_id, &request.notation)
        .await?;
    Ok(Json(session))
}

#[instrument(skip(state))]
async fn get_archived(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
) -> Result<Json<ArchivedGame>, ApiError> {
    Ok(Json(state.service.get_archived(id).await?))
}

#[instrument(skip(state, upgrade))]
async fn live(
    State(state): State<AppState>,
    Query(params): Query<LiveParams>,
    upgrade: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    if params.player_id.trim().is_empty() {
        return Err(ApiError::BadRequest("player_id must not be empty".to_string()));
    }
    state.service.get(params.game_id).await?;

    let AppState {
        service,
        connection: limits,
        ..
    } = state;
    Ok(upgrade
        .max_message_size(*limits.max_frame())
        .on_upgrade(move |socket| {
            let (writer, reader) = socket.split();
            connection::run(
                service,
                limits,
                params.game_id,
                params.player_id,
                reader,
                writer,
            )
        }))
}
