//! REST API for the dashboard (Axum, port 11111 by default).
//!
//! Everything except `/register`, `/login` and `/health` sits behind the
//! bearer-token middleware; the token subject (an email) is the actor
//! recorded on every write.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, Request, StatusCode},
    middleware::{self, Next},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post, put},
    Extension, Json, Router,
};
use chrono::{Local, NaiveDate};
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::aggregate::{self, PaymentFilter, TimeRange};
use crate::auth::{hash_password, verify_password, AuthKeys};
use crate::error::{Error, Result};
use crate::markdown;
use crate::models::{AppData, AuthPayload, NewPayment, NewTenant, ReportHistoryItem, Tenant, TenantForm, User};
use crate::mutations::Mutations;
use crate::report::{ReportGenerator, ReportStream};
use crate::storage::{Repository, Snapshot, Storage};

const MIN_PASSWORD_LEN: usize = 6;

/// Shared app state for REST handlers (Arc-wrapped for concurrency)
pub struct AppState {
    storage: Storage,
    mutations: Mutations<Storage>,
    keys: AuthKeys,
    reports: Arc<dyn ReportGenerator>,
}

impl AppState {
    pub fn new(storage: Storage, keys: AuthKeys, reports: Arc<dyn ReportGenerator>) -> Self {
        Self {
            mutations: Mutations::new(storage.clone()),
            storage,
            keys,
            reports,
        }
    }

    fn current(&self) -> Result<Arc<AppData>> {
        self.storage
            .snapshot()?
            .ok_or_else(|| Error::not_found("state document is not initialized"))
    }
}

#[derive(Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

/// Generic REST response (JSON)
#[derive(Serialize, Deserialize)]
pub struct RestResponse {
    pub success: bool,
    pub message: String,
}

impl RestResponse {
    fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
        })
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Auth(_) => StatusCode::UNAUTHORIZED,
            Error::Report(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "request failed");
            "internal server error".to_string()
        } else {
            warn!(%status, error = %self, "request rejected");
            self.to_string()
        };
        (status, Json(RestResponse { success: false, message })).into_response()
    }
}

/// Serialize borrowed views before the snapshot they point into is dropped.
fn json<T: Serialize>(value: T) -> Response {
    Json(value).into_response()
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> std::result::Result<Response, StatusCode> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let claims = state
        .keys
        .validate_jwt(token)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);

    let auth_routes = Router::new()
        .route("/data", get(data_handler))
        .route("/events", get(events_handler))
        .route("/dashboard", get(dashboard_handler))
        .route("/vacancy", get(vacancy_handler))
        .route("/audit", get(audit_handler))
        .route("/hostels", post(add_hostel_handler))
        .route("/hostels/:hostel_id/floors", post(add_floor_handler))
        .route("/hostels/:hostel_id/floors/:floor_id/rooms", post(add_room_handler))
        .route("/tenants", get(list_tenants_handler).post(add_tenant_handler))
        .route("/tenants/search", get(search_tenants_handler))
        .route("/tenants/:tenant_id", put(update_tenant_handler))
        .route("/tenants/:tenant_id/deactivate", post(deactivate_tenant_handler))
        .route("/tenants/:tenant_id/payments", get(tenant_payments_handler))
        .route("/payments", get(list_payments_handler).post(record_payment_handler))
        .route("/payments/years", get(payment_years_handler))
        .route("/reports", get(report_history_handler).post(generate_report_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/register", post(register_handler))
        .route("/login", post(login_handler))
        .route("/health", get(health_handler))
        .merge(auth_routes)
        .with_state(state)
}

async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Credentials>,
) -> Result<(StatusCode, Json<RestResponse>)> {
    let email = payload.email.trim().to_lowercase();
    if !email.contains('@') {
        return Err(Error::validation("a valid email is required"));
    }
    if payload.password.len() < MIN_PASSWORD_LEN {
        return Err(Error::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    let user = User {
        email,
        password_hash: hash_password(&payload.password)?,
    };
    state.storage.create_user(&user)?;
    info!(email = %user.email, "user registered");
    Ok((StatusCode::CREATED, RestResponse::ok("User registered")))
}

async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Credentials>,
) -> Result<Json<LoginResponse>> {
    let rejected = || Error::Auth("invalid email or password".to_string());
    let user = state
        .storage
        .get_user(&payload.email.trim().to_lowercase())?
        .ok_or_else(rejected)?;

    if !verify_password(&payload.password, &user.password_hash) {
        return Err(rejected());
    }

    let token = state.keys.create_jwt(&user.email)?;
    Ok(Json(LoginResponse { token }))
}

async fn health_handler() -> Json<RestResponse> {
    RestResponse::ok("hostel dashboard healthy")
}

async fn data_handler(State(state): State<Arc<AppState>>) -> Result<Response> {
    let data = state.current()?;
    Ok(json(&*data))
}

/// Server-sent events: the current snapshot, then one event per committed write.
async fn events_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>> {
    let rx = state.storage.subscribe();
    let initial = rx.borrow().clone();
    let updates = stream::unfold(rx, |mut rx| async move {
        rx.changed().await.ok()?;
        let snapshot = rx.borrow_and_update().clone();
        Some((snapshot, rx))
    });
    let events = stream::once(async move { initial })
        .chain(updates)
        .filter_map(|snapshot: Snapshot| async move {
            snapshot.map(|data| Event::default().event("snapshot").json_data(&*data))
        });
    Sse::new(events).keep_alive(KeepAlive::default())
}

#[derive(Deserialize)]
pub struct DashboardQuery {
    #[serde(default)]
    pub range: TimeRange,
}

async fn dashboard_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DashboardQuery>,
) -> Result<Response> {
    let data = state.current()?;
    Ok(json(aggregate::dashboard(&data, query.range, today())))
}

async fn vacancy_handler(State(state): State<Arc<AppState>>) -> Result<Response> {
    let data = state.current()?;
    Ok(json(aggregate::list_vacant_rooms(&data)))
}

async fn audit_handler(State(state): State<Arc<AppState>>) -> Result<Response> {
    let data = state.current()?;
    Ok(json(aggregate::sorted_audit_log(&data)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddHostelRequest {
    pub name: String,
    pub address: String,
}

async fn add_hostel_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthPayload>,
    Json(payload): Json<AddHostelRequest>,
) -> Result<Response> {
    let hostel = state
        .mutations
        .add_hostel(&payload.name, &payload.address, &claims.sub)?;
    Ok((StatusCode::CREATED, Json(hostel)).into_response())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddFloorRequest {
    /// Defaults to one above the highest existing floor.
    #[serde(default)]
    pub floor_number: Option<i32>,
}

async fn add_floor_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthPayload>,
    Path(hostel_id): Path<String>,
    Json(payload): Json<AddFloorRequest>,
) -> Result<Response> {
    let floor_number = match payload.floor_number {
        Some(number) => number,
        None => {
            let data = state.current()?;
            let hostel = data
                .hostels
                .get(&hostel_id)
                .ok_or_else(|| Error::not_found(format!("hostel {hostel_id}")))?;
            aggregate::next_floor_number(hostel)
        }
    };
    let floor = state.mutations.add_floor(&hostel_id, floor_number, &claims.sub)?;
    Ok((StatusCode::CREATED, Json(floor)).into_response())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddRoomRequest {
    pub room_number: String,
    pub capacity: u32,
}

async fn add_room_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthPayload>,
    Path((hostel_id, floor_id)): Path<(String, String)>,
    Json(payload): Json<AddRoomRequest>,
) -> Result<Response> {
    let room = state.mutations.add_room(
        &hostel_id,
        &floor_id,
        &payload.room_number,
        payload.capacity,
        &claims.sub,
    )?;
    Ok((StatusCode::CREATED, Json(room)).into_response())
}

async fn list_tenants_handler(State(state): State<Arc<AppState>>) -> Result<Response> {
    let data = state.current()?;
    Ok(json(aggregate::list_tenants(&data)))
}

async fn add_tenant_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthPayload>,
    Json(payload): Json<NewTenant>,
) -> Result<Response> {
    let tenant = state
        .mutations
        .save_tenant(TenantForm::Draft(payload), &claims.sub)?;
    Ok((StatusCode::CREATED, Json(tenant)).into_response())
}

async fn update_tenant_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthPayload>,
    Path(tenant_id): Path<String>,
    Json(payload): Json<Tenant>,
) -> Result<Json<Tenant>> {
    if payload.id != tenant_id {
        return Err(Error::validation("tenant id in body does not match the path"));
    }
    let tenant = state
        .mutations
        .save_tenant(TenantForm::Existing(payload), &claims.sub)?;
    Ok(Json(tenant))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeactivateRequest {
    /// Defaults to today.
    #[serde(default)]
    pub check_out_date: Option<NaiveDate>,
}

async fn deactivate_tenant_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthPayload>,
    Path(tenant_id): Path<String>,
    Json(payload): Json<DeactivateRequest>,
) -> Result<Json<RestResponse>> {
    let check_out_date = payload.check_out_date.unwrap_or_else(today);
    state
        .mutations
        .deactivate_tenant(&tenant_id, check_out_date, &claims.sub)?;
    Ok(RestResponse::ok(format!("Tenant {tenant_id} deactivated")))
}

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

async fn search_tenants_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Response> {
    let data = state.current()?;
    Ok(json(aggregate::search_tenants(&data, &query.q)))
}

async fn tenant_payments_handler(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
) -> Result<Response> {
    let data = state.current()?;
    if !data.tenants.contains_key(&tenant_id) {
        return Err(Error::not_found(format!("tenant {tenant_id}")));
    }
    Ok(json(aggregate::tenant_payments(&data, &tenant_id)))
}

#[derive(Deserialize)]
pub struct PaymentsQuery {
    pub year: i32,
    pub month: u32,
    /// Hostel id; absent or empty means all hostels.
    #[serde(default)]
    pub hostel: Option<String>,
}

async fn list_payments_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PaymentsQuery>,
) -> Result<Response> {
    let data = state.current()?;
    let filter = PaymentFilter {
        year: query.year,
        month: query.month,
        hostel_id: query.hostel.filter(|h| !h.is_empty()),
    };
    Ok(json(aggregate::filter_payments(&data, &filter)))
}

async fn payment_years_handler(State(state): State<Arc<AppState>>) -> Result<Json<Vec<i32>>> {
    let data = state.current()?;
    Ok(Json(aggregate::years_with_payments(&data)))
}

async fn record_payment_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthPayload>,
    Json(payload): Json<NewPayment>,
) -> Result<Response> {
    let data = state.current()?;
    if aggregate::has_full_payment(&data, &payload.tenant_id, payload.month, payload.year) {
        return Err(Error::Conflict(format!(
            "a full payment for {}/{} is already recorded",
            payload.month, payload.year
        )));
    }
    let payment = state.mutations.record_payment(payload, &claims.sub)?;
    Ok((StatusCode::CREATED, Json(payment)).into_response())
}

#[derive(Serialize)]
struct ReportView<'a> {
    #[serde(flatten)]
    item: &'a ReportHistoryItem,
    html: String,
}

async fn report_history_handler(State(state): State<Arc<AppState>>) -> Result<Response> {
    let data = state.current()?;
    let views: Vec<ReportView<'_>> = aggregate::sorted_report_history(&data)
        .into_iter()
        .map(|item| ReportView {
            html: markdown::render(&item.report),
            item,
        })
        .collect();
    Ok(json(views))
}

#[derive(Deserialize)]
pub struct ReportRequest {
    pub query: String,
}

/// Streams the report as plain text. Saved to history only if the model
/// finished without error.
async fn generate_report_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthPayload>,
    Json(payload): Json<ReportRequest>,
) -> Result<Response> {
    let query = payload.query.trim().to_string();
    if query.is_empty() {
        return Err(Error::validation("query is required"));
    }
    let data = state.current()?;
    info!(actor = %claims.sub, %query, "generating report");
    let fragments = state.reports.generate(&data, &query).await?;

    let body = report_body(fragments, state.mutations.clone(), query, claims.sub);
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(body),
    )
        .into_response())
}

struct ReportProgress {
    fragments: ReportStream,
    text: String,
    mutations: Mutations<Storage>,
    query: String,
    actor: String,
    done: bool,
}

fn report_body(
    fragments: ReportStream,
    mutations: Mutations<Storage>,
    query: String,
    actor: String,
) -> impl Stream<Item = std::result::Result<String, Infallible>> + Send + 'static {
    let progress = ReportProgress {
        fragments,
        text: String::new(),
        mutations,
        query,
        actor,
        done: false,
    };
    stream::unfold(progress, |mut progress| async move {
        if progress.done {
            return None;
        }
        match progress.fragments.next().await {
            Some(Ok(fragment)) => {
                progress.text.push_str(&fragment);
                Some((Ok(fragment), progress))
            }
            Some(Err(e)) => {
                warn!(error = %e, "report stream failed");
                progress.done = true;
                Some((Ok(format!("\n\nError: {e}")), progress))
            }
            None => {
                if !progress.text.trim().is_empty() {
                    if let Err(e) = progress.mutations.add_report_to_history(
                        &progress.query,
                        &progress.text,
                        &progress.actor,
                    ) {
                        error!(error = %e, "could not save report to history");
                    }
                }
                None
            }
        }
    })
}
