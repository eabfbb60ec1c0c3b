use std::sync::{Arc, Mutex};

use anyhow::Context;
use axum::{
    Form, Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::limit::RequestBodyLimitLayer;
use time::Duration;
use tower_sessions::cookie::{Key, SameSite};
use tower_sessions::{Expiry, MemoryStore, Session, SessionManagerLayer};
use tracing::{error, info, warn};

use crate::session::{self, Authenticator, MAX_SESSION_TTL_HOURS, SESSION_COOKIE, SharedPassword};
use crate::tls::TlsPaths;
use mealbook_core::db::{Database, InsertOutcome};
use mealbook_core::params::{
    ErrorCode, IngredientFormError, IngredientQuery, LookupError, MealFormError, MealQueryError,
    MealQueryMode, RawIngredientForm, RawIngredientQuery, RawMealForm, RawMealQuery,
};

const BODY_LIMIT: usize = 1024 * 1024; // 1 MiB

#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Database>>,
    auth: Arc<dyn Authenticator>,
    /// Prefix for redirect targets and the cookie path. Empty or `/segment`.
    base_path: String,
    /// Idle time after which a login lapses.
    session_ttl: Duration,
    secure_cookies: bool,
}

impl AppState {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_path)
    }

    fn cookie_path(&self) -> String {
        if self.base_path.is_empty() {
            "/".to_string()
        } else {
            self.base_path.clone()
        }
    }
}

// --- Response envelope ---

#[derive(Serialize)]
struct Envelope<T: Serialize> {
    msg: String,
    code: i64,
    data: T,
}

fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        msg: "ok".to_string(),
        code: 0,
        data,
    })
}

// --- Error handling ---

#[derive(Debug)]
enum ApiError {
    Domain { code: i64, msg: String },
    Internal(anyhow::Error),
}

impl ApiError {
    fn domain<E: ErrorCode>(err: E) -> Self {
        Self::Domain {
            code: err.code(),
            msg: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, msg) = match self {
            Self::Domain { code, msg } => (StatusCode::BAD_REQUEST, code, msg),
            Self::Internal(err) => {
                error!("internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    -1,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(Envelope { msg, code, data: () })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

// --- Middleware ---

async fn require_session(
    State(state): State<AppState>,
    session: Session,
    request: Request,
    next: Next,
) -> Response {
    if !session::is_logged_in(&session).await {
        return Redirect::to(&state.url("/login")).into_response();
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'; form-action 'self'; frame-ancestors 'none'"),
    );
    response
}

// --- Pages ---

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn login_page(base_path: &str, failed: bool) -> String {
    let base = escape_html(base_path);
    let notice = if failed {
        "<p role=\"alert\">Wrong password.</p>\n"
    } else {
        ""
    };
    format!(
        "<!DOCTYPE html>
<html lang=\"en\">
<head><meta charset=\"utf-8\"><title>mealbook: log in</title></head>
<body>
<h1>mealbook</h1>
{notice}<form method=\"post\" action=\"{base}/login\">
<label>Password <input type=\"password\" name=\"password\" autofocus required></label>
<button type=\"submit\">Log in</button>
</form>
</body>
</html>
"
    )
}

fn index_page(base_path: &str) -> String {
    let base = escape_html(base_path);
    format!(
        "<!DOCTYPE html>
<html lang=\"en\">
<head><meta charset=\"utf-8\"><title>mealbook</title></head>
<body>
<h1>mealbook</h1>
<ul>
<li><a href=\"{base}/api/meals\">Meals</a></li>
<li><a href=\"{base}/api/meals?mode=random\">Random meal</a></li>
</ul>
<form method=\"post\" action=\"{base}/logout\"><button type=\"submit\">Log out</button></form>
</body>
</html>
"
    )
}

// --- Session handlers ---

#[derive(Deserialize)]
struct LoginForm {
    #[serde(default)]
    password: String,
}

async fn login_form(State(state): State<AppState>) -> Html<String> {
    Html(login_page(&state.base_path, false))
}

async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Response, ApiError> {
    if !state.auth.verify(&form.password) {
        warn!("failed login attempt");
        return Ok((
            StatusCode::UNAUTHORIZED,
            Html(login_page(&state.base_path, true)),
        )
            .into_response());
    }

    session::log_in(&session).await?;
    info!("login succeeded");
    Ok(Redirect::to(&state.url("/")).into_response())
}

async fn logout(State(state): State<AppState>, session: Session) -> Result<Redirect, ApiError> {
    session::log_out(&session).await?;
    info!("logged out");
    Ok(Redirect::to(&state.url("/login")))
}

async fn index(State(state): State<AppState>) -> Html<String> {
    Html(index_page(&state.base_path))
}

// --- Meals ---

async fn list_meals(
    State(state): State<AppState>,
    Query(raw): Query<RawMealQuery>,
) -> Result<Response, ApiError> {
    let (mode, filter) = raw.parse().map_err(ApiError::domain)?;

    let db = state
        .db
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);

    match mode {
        MealQueryMode::Search => {
            let meals = db.search_meals(&filter).context("failed to search meals")?;
            Ok(ok(meals).into_response())
        }
        MealQueryMode::Random => {
            let meal = db
                .random_meal(&filter, &mut rand::rng())
                .context("failed to pick a random meal")?
                .ok_or(ApiError::domain(MealQueryError::NoMatch))?;
            Ok(ok(meal).into_response())
        }
    }
}

async fn create_meal(
    State(state): State<AppState>,
    Form(raw): Form<RawMealForm>,
) -> Result<Json<Envelope<serde_json::Value>>, ApiError> {
    let meal = raw.parse().map_err(ApiError::domain)?;

    let db = state
        .db
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);

    match db.insert_meal(&meal).context("failed to insert meal")? {
        InsertOutcome::Created(id) => {
            info!(meal_id = id, title = %meal.title, "meal created");
            Ok(ok(json!({ "meal_id": id })))
        }
        InsertOutcome::AlreadyExists => Err(ApiError::domain(MealFormError::DuplicateTitle)),
    }
}

async fn get_meal(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Response, ApiError> {
    let db = state
        .db
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let meal = db
        .get_meal(id)
        .context("failed to load meal")?
        .ok_or(ApiError::domain(LookupError::NotFound))?;
    Ok(ok(meal).into_response())
}

async fn delete_meal(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Envelope<()>>, ApiError> {
    let db = state
        .db
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    if db.delete_meal(id).context("failed to delete meal")? {
        info!(meal_id = id, "meal deleted");
    }
    Ok(ok(()))
}

// --- Ingredients ---

async fn list_ingredients(
    State(state): State<AppState>,
    Query(raw): Query<RawIngredientQuery>,
) -> Result<Response, ApiError> {
    let query = raw.parse().map_err(ApiError::domain)?;

    let db = state
        .db
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);

    let ingredients = match query {
        IngredientQuery::Search(pattern) => db.search_ingredients(&pattern),
        IngredientQuery::Many(ids) => db.get_ingredients_by_ids(&ids),
    }
    .context("failed to query ingredients")?;

    Ok(ok(ingredients).into_response())
}

async fn create_ingredient(
    State(state): State<AppState>,
    Form(raw): Form<RawIngredientForm>,
) -> Result<Json<Envelope<serde_json::Value>>, ApiError> {
    let name = raw.parse().map_err(ApiError::domain)?;

    let db = state
        .db
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);

    match db
        .insert_ingredient(&name)
        .context("failed to insert ingredient")?
    {
        InsertOutcome::Created(id) => {
            info!(ingredient_id = id, %name, "ingredient created");
            Ok(ok(json!({ "ingredient_id": id })))
        }
        InsertOutcome::AlreadyExists => Err(ApiError::domain(IngredientFormError::Duplicate)),
    }
}

async fn get_ingredient(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let db = state
        .db
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let ingredient = db
        .get_ingredient(id)
        .context("failed to load ingredient")?
        .ok_or(ApiError::domain(LookupError::NotFound))?;
    Ok(ok(ingredient).into_response())
}

async fn delete_ingredient(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Envelope<()>>, ApiError> {
    let db = state
        .db
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    if db
        .delete_ingredient(id)
        .context("failed to delete ingredient")?
    {
        info!(ingredient_id = id, "ingredient deleted");
    }
    Ok(ok(()))
}

// --- Router builder ---

/// Leading slash, no trailing slash; `""` for the root.
pub fn normalize_base_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

fn build_router(state: AppState) -> Router {
    // The signing key and the store are per process: a restart logs everyone out.
    let sessions = SessionManagerLayer::new(MemoryStore::default())
        .with_name(SESSION_COOKIE)
        .with_path(state.cookie_path())
        .with_http_only(true)
        .with_same_site(SameSite::Lax)
        .with_secure(state.secure_cookies)
        .with_expiry(Expiry::OnInactivity(state.session_ttl))
        .with_signed(Key::generate());

    let protected = Router::new()
        .route("/", get(index))
        .route("/logout", get(logout).post(logout))
        .route("/api/meals", get(list_meals).post(create_meal))
        .route("/api/meals/{id}", get(get_meal).delete(delete_meal))
        .route(
            "/api/ingredients",
            get(list_ingredients).post(create_ingredient),
        )
        .route(
            "/api/ingredients/{id}",
            get(get_ingredient).delete(delete_ingredient),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    Router::new()
        .route("/login", get(login_form).post(login))
        .merge(protected)
        .layer(sessions)
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub struct ServeOptions {
    pub port: u16,
    pub bind: String,
    pub base_path: String,
    pub session_ttl_hours: u32,
    pub password: String,
    pub tls: Option<TlsPaths>,
}

pub async fn start_server(db: Database, options: ServeOptions) -> anyhow::Result<()> {
    anyhow::ensure!(
        (1..=MAX_SESSION_TTL_HOURS).contains(&options.session_ttl_hours),
        "session TTL must be between 1 and {MAX_SESSION_TTL_HOURS} hours"
    );
    let state = AppState {
        db: Arc::new(Mutex::new(db)),
        auth: Arc::new(SharedPassword::new(&options.password)?),
        base_path: normalize_base_path(&options.base_path),
        session_ttl: Duration::hours(i64::from(options.session_ttl_hours)),
        secure_cookies: options.tls.is_some(),
    };
    let base_path = state.base_path.clone();

    let app = build_router(state);
    let bind = &options.bind;
    let port = options.port;

    if bind != "127.0.0.1" && bind != "localhost" && options.tls.is_none() {
        warn!(
            %bind,
            "listening beyond localhost without TLS; the password and session cookie travel in clear text"
        );
    }

    if let Some(tls) = options.tls {
        let fingerprint = tls.ensure()?;

        let rustls_config =
            axum_server::tls_rustls::RustlsConfig::from_pem_file(&tls.cert, &tls.key)
                .await
                .context("failed to load TLS certificate")?;

        let addr = format!("{bind}:{port}")
            .parse::<std::net::SocketAddr>()
            .context("invalid bind address")?;

        info!(%fingerprint, "certificate fingerprint (SHA-256)");
        info!("listening on https://{bind}:{port} (base path {base_path:?})");

        axum_server::bind_rustls(addr, rustls_config)
            .serve(app.into_make_service())
            .await?;
    } else {
        let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
            .await
            .with_context(|| format!("failed to bind {bind}:{port}"))?;
        info!("listening on http://{bind}:{port} (base path {base_path:?})");
        axum::serve(listener, app).await?;
    }

    Ok(())
}
