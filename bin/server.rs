// Digital Pet Shelter - Web Server
// JSON API with Axum

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Path, Query, Request, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use pet_shelter::{
    AdoptRequest, Config, Database, DirectorySessions, Event, FieldError, Pet, PetError,
    PetFilter, PetService, PetUpdate, SessionResolver, User,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{fmt, EnvFilter};

/// Header carrying the caller's credential, resolved by the SessionResolver
const CALLER_HEADER: &str = "x-user-id";

/// Shared application state
#[derive(Clone)]
struct AppState {
    service: PetService,
    sessions: Arc<dyn SessionResolver>,
}

impl AppState {
    fn new(db: Database) -> Self {
        let directory = Arc::new(db.clone());
        Self {
            service: PetService::new(Arc::new(db), directory.clone()),
            sessions: Arc::new(DirectorySessions::new(directory)),
        }
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<FieldError>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            count: None,
            message: None,
            errors: Vec::new(),
        }
    }

    fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl<T> ApiResponse<Vec<T>> {
    fn list(data: Vec<T>) -> Self {
        let count = data.len();
        Self {
            count: Some(count),
            ..Self::ok(data)
        }
    }
}

/// Pet plus the derived display fields
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PetResponse {
    #[serde(flatten)]
    pet: Pet,
    image_url: String,
    rarity_color: &'static str,
    description: &'static str,
    needs_care: bool,
}

impl From<Pet> for PetResponse {
    fn from(pet: Pet) -> Self {
        Self {
            image_url: pet.image_url(),
            rarity_color: pet.rarity_color(),
            description: pet.description(),
            needs_care: pet.stats.needs_care(),
            pet,
        }
    }
}

fn pet_list(pets: Vec<Pet>) -> ApiResponse<Vec<PetResponse>> {
    ApiResponse::list(pets.into_iter().map(PetResponse::from).collect())
}

#[derive(Deserialize)]
struct RegisterRequest {
    username: String,
    email: Option<String>,
}

#[derive(Deserialize)]
struct ByUsernameRequest {
    username: Option<String>,
    #[serde(flatten)]
    pet: AdoptRequest,
}

/// A missing action is treated like an unrecognized one
#[derive(Deserialize)]
struct CareRequest {
    action: Option<String>,
}

// ============================================================================
// Errors
// ============================================================================

struct ApiError(PetError);

impl From<PetError> for ApiError {
    fn from(err: PetError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            PetError::Validation(_) => StatusCode::BAD_REQUEST,
            PetError::NotFound(_) => StatusCode::NOT_FOUND,
            PetError::Unauthenticated => StatusCode::UNAUTHORIZED,
            PetError::Conflict(_) => StatusCode::CONFLICT,
            PetError::Database(_) | PetError::Serialization(_) | PetError::Unavailable(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let message = if self.0.is_persistence() {
            tracing::error!(error = %self.0, "request failed");
            "Internal storage error".to_string()
        } else {
            self.0.to_string()
        };

        let body = ApiResponse::<()> {
            success: false,
            data: None,
            count: None,
            message: Some(message),
            errors: self.0.field_errors().to_vec(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn invalid_input(field: &str, message: impl Into<String>) -> PetError {
    PetError::Validation(vec![FieldError::new(field, message)])
}

// ============================================================================
// Extractors
// ============================================================================

/// JSON body; decoding failures name the offending field in the envelope
struct ApiJson<T>(T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|rejection| invalid_input("body", rejection.body_text()))?;
        Ok(ApiJson(decode_json(&bytes)?))
    }
}

fn decode_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, PetError> {
    let mut deserializer = serde_json::Deserializer::from_slice(bytes);
    let value = serde_path_to_error::deserialize(&mut deserializer).map_err(|err| {
        let path = err.path().to_string();
        let field = if path.is_empty() || path == "." { "body" } else { path.as_str() };
        invalid_input(field, err.inner().to_string())
    })?;
    deserializer
        .end()
        .map_err(|e| invalid_input("body", e.to_string()))?;
    Ok(value)
}

/// Query string counterpart of [`ApiJson`]
struct ApiQuery<T>(T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| invalid_input("query", rejection.body_text()))?;
        Ok(ApiQuery(value))
    }
}

/// Authenticated caller, resolved from CALLER_HEADER
struct Caller(User);

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let credential = parts
            .headers
            .get(CALLER_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(PetError::Unauthenticated)?;

        let user = state
            .sessions
            .current_user(credential)?
            .ok_or(PetError::Unauthenticated)?;
        Ok(Caller(user))
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/users - Register a directory entry
async fn register_user(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let user = state
        .service
        .register_user(&body.username, body.email.as_deref())?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(user))))
}

/// GET /api/pets - Caller's pets, optionally filtered
async fn list_pets(
    State(state): State<AppState>,
    Caller(user): Caller,
    ApiQuery(filter): ApiQuery<PetFilter>,
) -> ApiResult<impl IntoResponse> {
    let pets = state.service.search_owned_pets(&user.id, &filter)?;
    Ok(Json(pet_list(pets)))
}

/// POST /api/pets - Adopt a pet for the caller
async fn adopt_pet(
    State(state): State<AppState>,
    Caller(user): Caller,
    ApiJson(body): ApiJson<AdoptRequest>,
) -> ApiResult<impl IntoResponse> {
    let pet = state.service.adopt_pet(&user.id, body)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(PetResponse::from(pet)))))
}

/// GET /api/pets/public - Pets without an owner
async fn list_public_pets(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let pets = state.service.list_public_pets()?;
    Ok(Json(pet_list(pets)))
}

/// POST /api/pets/public - Create an unowned pet
async fn adopt_public_pet(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<AdoptRequest>,
) -> ApiResult<impl IntoResponse> {
    let pet = state.service.adopt_public_pet(body)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(PetResponse::from(pet)))))
}

/// POST /api/pets/by-username - Adopt on behalf of a named user
async fn adopt_by_username(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ByUsernameRequest>,
) -> ApiResult<impl IntoResponse> {
    let username = body
        .username
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| {
            PetError::Validation(vec![FieldError::new("username", "Required field is missing")])
        })?;

    let pet = state.service.adopt_pet_by_username(username, body.pet)?;
    let message = format!("Pet created, owner: {}", username);
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(PetResponse::from(pet)).with_message(message)),
    ))
}

/// GET /api/pets/:id
async fn get_pet(
    State(state): State<AppState>,
    Caller(user): Caller,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let pet = state.service.get_pet(&id, &user.id)?;
    Ok(Json(ApiResponse::ok(PetResponse::from(pet))))
}

/// PUT /api/pets/:id - Partial update of an owned pet
async fn update_pet(
    State(state): State<AppState>,
    Caller(user): Caller,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<PetUpdate>,
) -> ApiResult<impl IntoResponse> {
    let pet = state.service.update_owned_pet(&id, &user.id, &body)?;
    Ok(Json(ApiResponse::ok(PetResponse::from(pet))))
}

/// DELETE /api/pets/:id
async fn delete_pet(
    State(state): State<AppState>,
    Caller(user): Caller,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    if !state.service.delete_pet(&id, &user.id)? {
        return Err(PetError::pet_not_found().into());
    }
    Ok(Json(ApiResponse::ok(true).with_message("Pet deleted")))
}

/// POST /api/pets/:id/care - feed, play or rest
async fn care_for_pet(
    State(state): State<AppState>,
    Caller(user): Caller,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<CareRequest>,
) -> ApiResult<impl IntoResponse> {
    let action = body.action.unwrap_or_default();
    let pet = state.service.apply_care_action(&id, &user.id, &action)?;
    Ok(Json(ApiResponse::ok(PetResponse::from(pet))))
}

/// GET /api/pets/:id/events - Activity log
async fn pet_events(
    State(state): State<AppState>,
    Caller(user): Caller,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let events: Vec<Event> = state.service.pet_activity(&id, &user.id)?;
    Ok(Json(ApiResponse::list(events)))
}

fn app(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/users", post(register_user))
        .route("/pets", get(list_pets).post(adopt_pet))
        .route("/pets/public", get(list_public_pets).post(adopt_public_pet))
        .route("/pets/by-username", post(adopt_by_username))
        .route("/pets/:id", get(get_pet).put(update_pet).delete(delete_pet))
        .route("/pets/:id/care", post(care_for_pet))
        .route("/pets/:id/events", get(pet_events))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();

    let config = Config::from_env()?;
    let db = Database::open(&config.db_path)?;
    tracing::info!(path = ?config.db_path, "database opened");

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("pet shelter listening on http://{}", addr);

    axum::serve(listener, app(AppState::new(db)))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}
