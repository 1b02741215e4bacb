//! Built-in scenarios for the Capacious API.

use std::collections::BTreeMap;

use anyhow::Result;
use serde_json::json;

use crate::client::Method;
use crate::config::AuthConfig;
use crate::fixtures::Fixture;
use crate::scenario::{Auth, Expect, ResponseShape, Scenario, Step};

/// Event the API is seeded with; readable without auth.
pub const SEEDED_EVENT_ID: &str = "cd7bc650-2e71-11e5-a390-675459d99309";
/// Well-formed id that no event has.
pub const UNKNOWN_EVENT_ID: &str = "00000000-0000-0000-0000-000000000000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Suite {
    Auth,
    Events,
    All,
}

impl Suite {
    pub fn scenarios(self, auth: &AuthConfig) -> Result<Vec<Scenario>> {
        Ok(match self {
            Self::Auth => vec![auth_suite(auth)],
            Self::Events => vec![events_suite()?],
            Self::All => vec![auth_suite(auth), events_suite()?],
        })
    }
}

fn get_seeded_event(name: &str, auth: Auth, status: u16) -> Step {
    Step {
        name: name.into(),
        method: Method::Get,
        path: "/events/{event_id}".into(),
        auth,
        body: None,
        capture: BTreeMap::new(),
        expect: Expect {
            status,
            ..Expect::default()
        },
    }
}

/// JWT middleware and login behaviour.
pub fn auth_suite(auth: &AuthConfig) -> Scenario {
    let login = |name: &str, password: &str, expect: Expect| Step {
        name: name.into(),
        method: Method::Post,
        path: "/token".into(),
        auth: Auth::None,
        body: Some(json!({
            "email": auth.login_email,
            "password": password,
        })),
        capture: BTreeMap::new(),
        expect,
    };

    Scenario {
        name: "auth".into(),
        inputs: BTreeMap::from([("event_id".to_string(), SEEDED_EVENT_ID.to_string())]),
        steps: vec![
            get_seeded_event("valid jwt is accepted", Auth::ValidUser, 200),
            get_seeded_event("jwt signed with wrong secret", Auth::WrongSecret, 500),
            get_seeded_event("bearer header without token", Auth::EmptyBearer, 400),
            get_seeded_event("expired jwt", Auth::Expired, 401),
            login(
                "login with valid credentials",
                &auth.login_password,
                Expect {
                    status: 200,
                    token_at: Some("/token".into()),
                    ..Expect::default()
                },
            ),
            login(
                "login with invalid credentials",
                &invalid_password(&auth.login_password),
                Expect {
                    status: 401,
                    absent: vec!["/token".into()],
                    ..Expect::default()
                },
            ),
        ],
    }
}

/// A password that differs from `valid` only by the case of its last character
/// (or gains a suffix when that is not possible).
fn invalid_password(valid: &str) -> String {
    let mut out = valid.to_string();
    match valid.chars().last() {
        Some(last) if last.is_ascii_alphabetic() => {
            out.pop();
            if last.is_ascii_uppercase() {
                out.push(last.to_ascii_lowercase());
            } else {
                out.push(last.to_ascii_uppercase());
            }
        }
        _ => out.push('!'),
    }
    out
}

/// Create an event, read it back, and probe an unknown id.
pub fn events_suite() -> Result<Scenario> {
    let expected = Fixture::load_json("expected/create_event.json")?;
    let request = Fixture::load_json("inputs/create_event.json")?;

    Ok(Scenario {
        name: "events".into(),
        inputs: BTreeMap::from([("missing_event_id".to_string(), UNKNOWN_EVENT_ID.to_string())]),
        steps: vec![
            Step {
                name: "create event".into(),
                method: Method::Post,
                path: "/events".into(),
                auth: Auth::ValidUser,
                body: Some(request),
                capture: BTreeMap::from([("event_id".to_string(), "/event_id".to_string())]),
                expect: Expect {
                    status: 201,
                    content_type: Some("application/json".into()),
                    body: Some(expected),
                    shape: ResponseShape::Event,
                    ..Expect::default()
                },
            },
            Step {
                name: "read created event".into(),
                method: Method::Get,
                path: "/events/{event_id}".into(),
                auth: Auth::None,
                body: None,
                capture: BTreeMap::new(),
                expect: Expect {
                    status: 200,
                    content_type: Some("application/json".into()),
                    ..Expect::default()
                },
            },
            Step {
                name: "unknown event".into(),
                method: Method::Get,
                path: "/events/{missing_event_id}".into(),
                auth: Auth::None,
                body: None,
                capture: BTreeMap::new(),
                expect: Expect {
                    status: 404,
                    ..Expect::default()
                },
            },
        ],
    })
}
