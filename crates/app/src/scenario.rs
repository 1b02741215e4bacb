use std::{
    collections::BTreeMap,
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::client::{ApiClient, ApiResponse, Method};
use crate::fixtures::{IdFields, clean_menu_choice_ids, clean_seating_request_ids};
use crate::jwt;
use crate::normalize::Normalizer;
use crate::records::{Event, MenuChoice, SeatingRequest, from_body, to_body};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    /// Variables available to path templates before any step runs.
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub method: Method,
    /// Request path relative to the API base; `{var}` placeholders are substituted.
    pub path: String,
    #[serde(default)]
    pub auth: Auth,
    #[serde(default)]
    pub body: Option<Value>,
    /// Variable name -> JSON pointer into the raw response body.
    #[serde(default)]
    pub capture: BTreeMap<String, String>,
    pub expect: Expect,
}

/// Authorization header sent with a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Auth {
    #[default]
    None,
    ValidUser,
    InvalidUser,
    WrongSecret,
    Expired,
    /// `Bearer` with no token.
    EmptyBearer,
}

pub const WRONG_SECRET: &str = "this_is_not_the_right_secret";

impl Auth {
    pub fn header(self, secret: &str) -> Result<Option<String>> {
        let token = match self {
            Self::None => return Ok(None),
            Self::EmptyBearer => return Ok(Some("Bearer".into())),
            Self::ValidUser => jwt::valid_jwt(secret)?,
            Self::InvalidUser => jwt::valid_jwt_with_invalid_user(secret)?,
            Self::WrongSecret => jwt::valid_jwt(WRONG_SECRET)?,
            Self::Expired => jwt::expired_jwt(secret)?,
        };
        Ok(Some(format!("Bearer {token}")))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Expect {
    pub status: u16,
    #[serde(default)]
    pub content_type: Option<String>,
    /// Expected body after `shape` normalization.
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub shape: ResponseShape,
    /// JSON pointers that must not resolve in the response.
    #[serde(default)]
    pub absent: Vec<String>,
    /// JSON pointer to a token that must verify against the configured secret.
    #[serde(default)]
    pub token_at: Option<String>,
}

/// How a response body is normalized before comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseShape {
    #[default]
    Verbatim,
    Event,
    MenuChoices,
    SeatingRequests {
        #[serde(default)]
        ids: IdFields,
    },
    /// Walk the whole document with the default [`Normalizer`].
    Normalized,
}

impl ResponseShape {
    pub fn apply(self, body: &Value) -> Result<Value> {
        let now = Utc::now();
        let cleaned = match self {
            Self::Verbatim => body.clone(),
            Self::Event => {
                let event: Event = from_body("event", body.clone())?;
                to_body("event", &event.clean(now)?)?
            }
            Self::MenuChoices => {
                let choices: Vec<MenuChoice> = from_body("menu_choices", body.clone())?;
                to_body("menu_choices", &clean_menu_choice_ids(&choices)?)?
            }
            Self::SeatingRequests { ids } => {
                let requests: Vec<SeatingRequest> = from_body("seating_requests", body.clone())?;
                to_body(
                    "seating_requests",
                    &clean_seating_request_ids(&requests, ids)?,
                )?
            }
            Self::Normalized => Normalizer::default().at(now).normalize(body)?,
        };
        Ok(cleaned)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub name: String,
    pub method: Method,
    pub path: String,
    pub status: u16,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub scenario: String,
    pub steps: Vec<StepReport>,
    pub variables: BTreeMap<String, String>,
}

pub struct ScenarioRunner {
    client: ApiClient,
    secret: String,
    observations: PathBuf,
}

impl ScenarioRunner {
    pub fn new(client: ApiClient, secret: impl Into<String>, artifacts_dir: &Path) -> Self {
        Self {
            client,
            secret: secret.into(),
            observations: artifacts_dir.join("observations.jsonl"),
        }
    }

    pub fn observations_path(&self) -> &Path {
        &self.observations
    }

    /// Run every step in order, stopping at the first failed expectation.
    pub fn run(&self, scenario: &Scenario) -> Result<ScenarioReport> {
        info!(scenario = %scenario.name, steps = scenario.steps.len(), "running scenario");
        let mut vars = scenario.inputs.clone();
        let mut steps = Vec::with_capacity(scenario.steps.len());

        for step in &scenario.steps {
            let path = render_path(&step.path, &vars)
                .with_context(|| format!("step '{}' of '{}'", step.name, scenario.name))?;
            let header = step.auth.header(&self.secret)?;
            let response = self
                .client
                .send(step.method, &path, header.as_deref(), step.body.as_ref())?;
            self.record(&scenario.name, step, &path, &response)?;

            if let Err(err) = self.check(&step.expect, &response) {
                warn!(
                    scenario = %scenario.name,
                    step = %step.name,
                    status = response.status,
                    "expectation failed"
                );
                return Err(err.context(format!(
                    "step '{}' of '{}' ({} {path})",
                    step.name, scenario.name, step.method
                )));
            }

            for (var, pointer) in &step.capture {
                let value = response
                    .body
                    .pointer(pointer)
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        anyhow!(
                            "step '{}' could not capture {var}: no string at {pointer}",
                            step.name
                        )
                    })?;
                vars.insert(var.clone(), value.to_string());
            }

            info!(step = %step.name, status = response.status, "step passed");
            steps.push(StepReport {
                name: step.name.clone(),
                method: step.method,
                path,
                status: response.status,
            });
        }

        Ok(ScenarioReport {
            scenario: scenario.name.clone(),
            steps,
            variables: vars,
        })
    }

    fn check(&self, expect: &Expect, response: &ApiResponse) -> Result<()> {
        if response.status != expect.status {
            bail!(
                "expected status {} but got {} (body: {})",
                expect.status,
                response.status,
                response.body
            );
        }

        if let Some(expected) = &expect.content_type {
            let actual = response.content_type.as_deref().unwrap_or_default();
            if !actual.starts_with(expected.as_str()) {
                bail!("expected content type {expected:?} but got {actual:?}");
            }
        }

        for pointer in &expect.absent {
            if response.body.pointer(pointer).is_some() {
                bail!("expected nothing at {pointer} but found {}", response.body);
            }
        }

        if let Some(pointer) = &expect.token_at {
            let token = response
                .body
                .pointer(pointer)
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow!("no token at {pointer}"))?;
            jwt::verify_jwt(&self.secret, token)?;
        }

        if let Some(expected) = &expect.body {
            let actual = expect.shape.apply(&response.body)?;
            if actual != *expected {
                bail!(
                    "body mismatch:\n  actual:   {}\n  expected: {}",
                    actual,
                    expected
                );
            }
        }

        Ok(())
    }

    fn record(&self, scenario: &str, step: &Step, path: &str, response: &ApiResponse) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.observations)
            .with_context(|| format!("failed to open {}", self.observations.display()))?;
        let line = json!({
            "scenario": scenario,
            "step": step.name,
            "request": {"method": step.method, "path": path, "auth": step.auth},
            "response": response,
        });
        writeln!(file, "{}", serde_json::to_string(&line)?)
            .with_context(|| format!("failed to write {}", self.observations.display()))?;
        Ok(())
    }
}

/// Substitute `{var}` placeholders; an unknown variable is an error.
pub fn render_path(template: &str, vars: &BTreeMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after
            .find('}')
            .ok_or_else(|| anyhow!("unterminated placeholder in {template}"))?;
        let name = &after[..end];
        let value = vars
            .get(name)
            .ok_or_else(|| anyhow!("unknown variable {{{name}}} in {template}"))?;
        out.push_str(value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
