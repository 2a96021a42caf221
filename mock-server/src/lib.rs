//! In-memory stand-in for the SSO ticket service.
//!
//! Serves the two ticket endpoints the web glue talks to, plus a JSON
//! endpoint that issues tickets so tests can seed users without going
//! through a scan login. Responses use the service's JSON envelope:
//! `{"err":"0","detail":{...}}` on success, `{"err":"err:NN","detail":"msg"}`
//! otherwise.

use std::{
    collections::HashMap,
    convert::Infallible,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};
use uuid::Uuid;

pub const FETCH_PATH: &str = "/bms-sso/fetch-by-ticket";
pub const TTL_PATH: &str = "/bms-sso/ttl-by-ticket";
pub const ISSUE_PATH: &str = "/bms-sso/tickets";

pub const ERR_MISSING_TICKET: &str = "err:21";
pub const ERR_UNKNOWN_TICKET: &str = "err:22";
pub const ERR_CLIENT_MISMATCH: &str = "err:28";

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UserInfo {
    pub sso_name: String,
    pub sso_contact_type: u8,
    pub sso_mobile: String,
    pub sso_user_dept_info: Vec<Dept>,
    pub sso_avatar: String,
    pub sso_job_title: String,
    pub sso_company_name: String,
    pub sso_email: String,
    pub sso_dingding_user_id: String,
    pub sso_dingding_union_id: String,
    pub sso_dingding_nick_name: String,
    pub sso_ticket: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Dept {
    pub sso_dept_id: String,
    pub sso_dept_name: String,
    pub sso_is_dept_owner: String,
}

#[derive(Deserialize)]
pub struct IssueTicket {
    pub client_ip: String,
    pub user_agent: String,
    pub user: UserInfo,
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Issued {
    pub ticket: String,
    pub ttl_secs: u64,
}

/// Form posted to the fetch and ttl endpoints. Every field is optional so a
/// missing ticket is answered with the service's own error code rather than
/// a form rejection.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TicketForm {
    pub sso_ticket: String,
    pub client_ip: String,
    pub user_agent: String,
    pub renew: String,
}

/// Server behaviour switches.
#[derive(Clone, Debug)]
pub struct Settings {
    pub ticket_ttl: Duration,
    pub allow_renew: bool,
    /// Stream fetch responses in chunks of this size, forcing chunked
    /// transfer-encoding the way large responses from the real service are
    /// framed.
    pub chunk_size: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ticket_ttl: Duration::from_secs(300),
            allow_renew: true,
            chunk_size: None,
        }
    }
}

impl Settings {
    /// Read `SSO_TICKET_TTL` (seconds), `SSO_ALLOW_RENEW` (`yes`/`no`) and
    /// `SSO_CHUNK_SIZE` (bytes), keeping defaults for unset or bad values.
    pub fn from_env() -> Self {
        let mut settings = Settings::default();
        if let Some(ttl) = env_parse::<u64>("SSO_TICKET_TTL") {
            settings.ticket_ttl = Duration::from_secs(ttl);
        }
        if let Ok(flag) = std::env::var("SSO_ALLOW_RENEW") {
            settings.allow_renew = flag.eq_ignore_ascii_case("yes");
        }
        settings.chunk_size = env_parse::<usize>("SSO_CHUNK_SIZE").filter(|&n| n > 0);
        settings
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.trim().parse().ok()
}

#[derive(Debug)]
struct TicketRecord {
    user: UserInfo,
    client_ip: String,
    user_agent: String,
    ttl: Duration,
    expires_at: Instant,
}

impl TicketRecord {
    fn matches(&self, form: &TicketForm) -> bool {
        self.client_ip == form.client_ip && self.user_agent == form.user_agent
    }
}

type Db = Arc<RwLock<HashMap<String, TicketRecord>>>;

#[derive(Clone)]
pub struct AppState {
    db: Db,
    settings: Settings,
}

pub fn app() -> Router {
    app_with(Settings::default())
}

pub fn app_with(settings: Settings) -> Router {
    router(AppState {
        db: Db::default(),
        settings,
    })
}

fn router(state: AppState) -> Router {
    Router::new()
        .route(FETCH_PATH, post(fetch_by_ticket))
        .route(TTL_PATH, post(ttl_by_ticket))
        .route(ISSUE_PATH, post(issue_ticket))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with(listener, Settings::default()).await
}

pub async fn run_with(listener: TcpListener, settings: Settings) -> Result<(), std::io::Error> {
    let state = AppState {
        db: Db::default(),
        settings,
    };
    tokio::spawn(reap_expired(state.db.clone(), Duration::from_secs(60)));
    axum::serve(listener, router(state)).await
}

/// Drop expired tickets every `period`.
async fn reap_expired(db: Db, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        let now = Instant::now();
        let mut tickets = db.write().await;
        let before = tickets.len();
        tickets.retain(|_, record| record.expires_at > now);
        let removed = before - tickets.len();
        if removed > 0 {
            debug!(removed, "reaped expired tickets");
        }
    }
}

async fn issue_ticket(
    State(state): State<AppState>,
    Json(input): Json<IssueTicket>,
) -> (StatusCode, Json<Issued>) {
    let ticket = Uuid::new_v4().simple().to_string();
    let ttl = input
        .ttl_secs
        .map(Duration::from_secs)
        .unwrap_or(state.settings.ticket_ttl);
    let mut user = input.user;
    user.sso_ticket = ticket.clone();

    info!(name = %user.sso_name, ttl_secs = ttl.as_secs(), "issued ticket");
    state.db.write().await.insert(
        ticket.clone(),
        TicketRecord {
            user,
            client_ip: input.client_ip,
            user_agent: input.user_agent,
            ttl,
            expires_at: Instant::now() + ttl,
        },
    );
    (
        StatusCode::CREATED,
        Json(Issued {
            ticket,
            ttl_secs: ttl.as_secs(),
        }),
    )
}

async fn fetch_by_ticket(State(state): State<AppState>, Form(form): Form<TicketForm>) -> Response {
    if form.sso_ticket.is_empty() {
        return envelope_error(StatusCode::NOT_IMPLEMENTED, ERR_MISSING_TICKET, "missing sso_ticket");
    }

    let now = Instant::now();
    let mut tickets = state.db.write().await;
    let Some(record) = tickets.get_mut(&form.sso_ticket) else {
        return envelope_error(StatusCode::OK, ERR_UNKNOWN_TICKET, "ticket not found");
    };
    if !record.matches(&form) {
        return envelope_error(StatusCode::GONE, ERR_CLIENT_MISMATCH, "ticket does not match client");
    }
    if now >= record.expires_at {
        tickets.remove(&form.sso_ticket);
        return envelope_error(StatusCode::OK, ERR_UNKNOWN_TICKET, "ticket expired");
    }
    if form.renew == "1" && state.settings.allow_renew {
        record.expires_at = now + record.ttl;
        debug!(ticket = %form.sso_ticket, "renewed ticket");
    }

    let body = json!({ "err": "0", "detail": record.user });
    drop(tickets);
    info!(ticket = %form.sso_ticket, "ticket fetched");
    match state.settings.chunk_size {
        Some(size) => chunked_json(&body, size),
        None => Json(body).into_response(),
    }
}

async fn ttl_by_ticket(State(state): State<AppState>, Form(form): Form<TicketForm>) -> Response {
    if form.sso_ticket.is_empty() {
        return envelope_error(StatusCode::NOT_IMPLEMENTED, ERR_MISSING_TICKET, "missing sso_ticket");
    }
    let tickets = state.db.read().await;
    match tickets.get(&form.sso_ticket) {
        Some(record) if !record.matches(&form) => {
            envelope_error(StatusCode::GONE, ERR_CLIENT_MISMATCH, "ticket does not match client")
        }
        Some(record) => seconds_left(record.expires_at, Instant::now())
            .to_string()
            .into_response(),
        None => "ticket not found".into_response(),
    }
}

/// Whole seconds until `expires_at`, negative once it has passed.
fn seconds_left(expires_at: Instant, now: Instant) -> i64 {
    match expires_at.checked_duration_since(now) {
        Some(left) => left.as_secs() as i64,
        None => -((now - expires_at).as_secs() as i64),
    }
}

fn envelope_error(status: StatusCode, err: &str, detail: &str) -> Response {
    (status, Json(json!({ "err": err, "detail": detail }))).into_response()
}

/// Serialize `body` and send it as a stream of `size`-byte frames. With no
/// length known up front, hyper frames the response with chunked encoding.
fn chunked_json(body: &Value, size: usize) -> Response {
    let bytes = body.to_string().into_bytes();
    let frames: Vec<Vec<u8>> = bytes.chunks(size).map(<[u8]>::to_vec).collect();
    let stream = futures_util::stream::iter(frames.into_iter().map(Ok::<_, Infallible>));
    (
        [(header::CONTENT_TYPE, "application/json")],
        Body::from_stream(stream),
    )
        .into_response()
}
