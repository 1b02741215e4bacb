use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use axum::{
    Extension, Json, Router,
    extract::{Path, Request, State},
    http::{StatusCode, header::AUTHORIZATION},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use capacious_e2e::{
    TokenError,
    config::{ApiConfig, AuthConfig, E2eConfig},
    fixtures::Fixture,
    harness::TestEnv,
    jwt,
    scenario::{Scenario, ScenarioReport},
    suites::{SEEDED_EVENT_ID, auth_suite, events_suite},
    validate::is_string_valid_uuid,
};
use chrono::{SecondsFormat, TimeDelta, Utc};
use jsonwebtoken::errors::ErrorKind;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;

/// In-process stand-in for the Capacious API, reproducing its JWT middleware
/// status codes and the event endpoints the suites touch.
const SECRET: &str = "stub-secret";

#[derive(Clone)]
struct StubState {
    secret: String,
    stale_timestamps: bool,
    events: Arc<Mutex<HashMap<String, Value>>>,
}

#[derive(Clone)]
struct CurrentUser(Option<String>);

#[derive(Deserialize)]
struct Login {
    email: String,
    password: String,
}

async fn jwt_gate(State(state): State<StubState>, mut request: Request, next: Next) -> Response {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let user = match header.as_deref() {
        None | Some("") => None,
        Some(raw) => {
            let mut parts = raw.split_whitespace();
            let token = match (parts.next(), parts.next(), parts.next()) {
                (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => {
                    token
                }
                _ => return StatusCode::BAD_REQUEST.into_response(),
            };
            match jwt::verify_jwt(&state.secret, token) {
                Ok(claims) => Some(claims.sub),
                Err(TokenError::Verify(err)) => {
                    let status = match err.kind() {
                        ErrorKind::ExpiredSignature | ErrorKind::ImmatureSignature => {
                            StatusCode::UNAUTHORIZED
                        }
                        ErrorKind::InvalidToken
                        | ErrorKind::Base64(_)
                        | ErrorKind::Json(_)
                        | ErrorKind::Utf8(_) => StatusCode::BAD_REQUEST,
                        _ => StatusCode::INTERNAL_SERVER_ERROR,
                    };
                    return status.into_response();
                }
                Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
            }
        }
    };

    request.extensions_mut().insert(CurrentUser(user));
    next.run(request).await
}

async fn create_event(
    State(state): State<StubState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(body): Json<Value>,
) -> Response {
    if user.is_none() {
        return (StatusCode::UNAUTHORIZED, "You need a valid user id to create an event!")
            .into_response();
    }
    let stamp = if state.stale_timestamps {
        (Utc::now() - TimeDelta::hours(1)).to_rfc3339_opts(SecondsFormat::Nanos, true)
    } else {
        Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
    };
    let id = uuid::Uuid::new_v4().to_string();
    let event = json!({
        "event_id": id,
        "name": body["name"].as_str().unwrap_or_default(),
        "description": body["description"].as_str().unwrap_or_default(),
        "location": body["location"].as_str().unwrap_or_default(),
        "start_time": "0001-01-01T00:00:00Z",
        "end_time": "0001-01-01T00:00:00Z",
        "respond_by": "0001-01-01T00:00:00Z",
        "allowed_friends": body["allowed_friends"].as_i64().unwrap_or_default(),
        "created_at": stamp,
        "updated_at": stamp,
    });
    state.events.lock().insert(id, event.clone());
    (StatusCode::CREATED, Json(event)).into_response()
}

async fn get_event(State(state): State<StubState>, Path(id): Path<String>) -> Response {
    match state.events.lock().get(&id) {
        Some(event) => Json(event.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn menu_items(State(state): State<StubState>, Path(id): Path<String>) -> Response {
    if !state.events.lock().contains_key(&id) {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(json!([{
        "menu_item_id": "6c1f3a8c-7917-11e5-8b8e-a37beb0fdae8",
        "item_order": 1,
        "name": "Entree",
        "num_choices": 1,
        "options": [],
    }]))
    .into_response()
}

async fn seating_request_choices(
    State(state): State<StubState>,
    Path(id): Path<String>,
) -> Response {
    if !state.events.lock().contains_key(&id) {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(json!([{
        "invitee_request_id": "cd7bc650-2e71-11e5-a390-675459b99309",
        "first_name": "Cave",
        "last_name": "Johnson",
    }]))
    .into_response()
}

async fn login(State(state): State<StubState>, Json(login): Json<Login>) -> Response {
    if login.email.to_lowercase() != "1498@aperturescience.com" || login.password != "GLaDOS" {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    match jwt::signed_jwt(
        &state.secret,
        jwt::VALID_USER_ID,
        Utc::now() + TimeDelta::hours(72),
    ) {
        Ok(token) => Json(json!({ "token": token })).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn spawn_stub(stale_timestamps: bool) -> anyhow::Result<SocketAddr> {
    let seeded = json!({
        "event_id": SEEDED_EVENT_ID,
        "name": "Seeded",
        "description": "",
        "location": "",
        "start_time": "0001-01-01T00:00:00Z",
        "end_time": "0001-01-01T00:00:00Z",
        "respond_by": "0001-01-01T00:00:00Z",
        "allowed_friends": 0,
    });
    let state = StubState {
        secret: SECRET.into(),
        stale_timestamps,
        events: Arc::new(Mutex::new(HashMap::from([(
            SEEDED_EVENT_ID.to_string(),
            seeded,
        )]))),
    };

    let api = Router::new()
        .route("/events", post(create_event))
        .route("/events/{id}", get(get_event))
        .route("/events/{id}/relationships/menu_items", get(menu_items))
        .route(
            "/events/{id}/relationships/seating_request_choices",
            get(seating_request_choices),
        )
        .route("/token", post(login))
        .layer(middleware::from_fn_with_state(state.clone(), jwt_gate))
        .with_state(state);
    let app = Router::new().nest("/api/v1", api);

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(addr)
}

fn config_for(addr: SocketAddr, secret: &str) -> E2eConfig {
    E2eConfig {
        api: ApiConfig {
            host: addr.ip().to_string(),
            port: addr.port(),
            ..ApiConfig::default()
        },
        auth: AuthConfig {
            jwt_secret: secret.into(),
            ..AuthConfig::default()
        },
    }
}

/// Run a scenario from a blocking thread, since the client is synchronous.
async fn run_scenario(
    name: &'static str,
    config: E2eConfig,
    scenario: Scenario,
) -> anyhow::Result<(ScenarioReport, Vec<Value>)> {
    tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        let dir = tempfile::tempdir()?;
        let env = TestEnv::up_at(name, dir.path().join(name), config)?;
        let report = env.run(&scenario)?;
        let observations = std::fs::read_to_string(env.artifacts_dir().join("observations.jsonl"))?
            .lines()
            .map(serde_json::from_str)
            .collect::<Result<Vec<Value>, _>>()?;
        Ok((report, observations))
    })
    .await?
}

#[tokio::test(flavor = "multi_thread")]
async fn auth_suite_passes_against_stub() -> anyhow::Result<()> {
    let addr = spawn_stub(false).await?;
    let config = config_for(addr, SECRET);
    let scenario = auth_suite(&config.auth);

    let (report, observations) = run_scenario("auth_stub", config, scenario).await?;
    let statuses: Vec<u16> = report.steps.iter().map(|s| s.status).collect();
    assert_eq!(statuses, [200, 500, 400, 401, 200, 401]);
    assert_eq!(observations.len(), 6);
    assert_eq!(observations[2]["request"]["auth"], "empty_bearer");
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn events_suite_creates_and_reads_back() -> anyhow::Result<()> {
    let addr = spawn_stub(false).await?;
    let config = config_for(addr, SECRET);

    let (report, observations) = run_scenario("events_stub", config, events_suite()?).await?;
    let event_id = &report.variables["event_id"];
    assert!(is_string_valid_uuid(event_id));
    assert_eq!(report.steps[1].path, format!("/events/{event_id}"));
    assert_eq!(report.steps[2].status, 404);
    assert_eq!(observations[0]["response"]["status"], 201);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn scenario_file_runs_with_declared_inputs() -> anyhow::Result<()> {
    let addr = spawn_stub(false).await?;
    let config = config_for(addr, SECRET);
    let scenario: Scenario = serde_json::from_value(Fixture::load_json("scenarios/event_menu.json")?)?;

    let (report, _) = run_scenario("event_menu_stub", config, scenario).await?;
    assert_eq!(report.steps.len(), 2);
    assert!(report.steps.iter().all(|s| s.status == 200));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn stale_timestamps_fail_the_create_step() -> anyhow::Result<()> {
    let addr = spawn_stub(true).await?;
    let config = config_for(addr, SECRET);

    let err = run_scenario("events_stale_stub", config, events_suite()?)
        .await
        .expect_err("stale created_at must fail normalization");
    let message = format!("{err:#}");
    assert!(message.contains("create event"), "{message}");
    assert!(message.contains("not less than a second old"), "{message}");
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn mismatched_secret_names_the_failing_step() -> anyhow::Result<()> {
    let addr = spawn_stub(false).await?;
    let config = config_for(addr, "some-other-secret");
    let scenario = auth_suite(&config.auth);

    let err = run_scenario("auth_wrong_secret_stub", config, scenario)
        .await
        .expect_err("stub must reject tokens signed with another secret");
    let message = format!("{err:#}");
    assert!(message.contains("valid jwt is accepted"), "{message}");
    assert!(message.contains("expected status 200 but got 500"), "{message}");
    Ok(())
}
