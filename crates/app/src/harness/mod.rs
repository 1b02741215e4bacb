use std::{
    fs,
    io::Write,
    net::{TcpStream, ToSocketAddrs},
    path::{Path, PathBuf},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::{debug, info};

use crate::client::ApiClient;
use crate::config::E2eConfig;
use crate::scenario::{Scenario, ScenarioReport, ScenarioRunner};

const PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Per-run E2E environment: a client for the API under test plus log and artifact
/// directories under `target/e2e/<name>` that are kept for inspection.
pub struct TestEnv {
    name: String,
    root: PathBuf,
    logs_dir: PathBuf,
    artifacts_dir: PathBuf,
    config: E2eConfig,
    client: ApiClient,
}

impl TestEnv {
    /// Prepare directories and write the environment snapshot. Does not require the API.
    pub fn up(config: E2eConfig) -> Result<Self> {
        let name = resolve_test_name();
        let root = crate::workspace_root()
            .join("target")
            .join("e2e")
            .join(&name)
            .into_std_path_buf();
        Self::up_at(name, root, config)
    }

    /// Like [`TestEnv::up`] but rooted at an explicit directory.
    pub fn up_at(name: impl Into<String>, root: PathBuf, config: E2eConfig) -> Result<Self> {
        let name = name.into();
        let logs_dir = root.join("logs");
        let artifacts_dir = root.join("artifacts");
        fs::create_dir_all(&logs_dir)
            .with_context(|| format!("failed to create logs dir at {}", logs_dir.display()))?;
        fs::create_dir_all(&artifacts_dir).with_context(|| {
            format!(
                "failed to create artifacts dir at {}",
                artifacts_dir.display()
            )
        })?;

        let snapshot = EnvSnapshot::capture(&name, &root, &config);
        write_json(&root.join("env.json"), &snapshot)?;
        write_text(&logs_dir.join("READY"), "ok\n")?;

        let client = ApiClient::new(&config.api);
        let env = Self {
            name,
            root,
            logs_dir,
            artifacts_dir,
            config,
            client,
        };
        env.append_log(&format!("harness ready against {}", env.client.base_url()))?;
        info!(name = %env.name, root = %env.root.display(), "e2e environment ready");
        Ok(env)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    pub fn artifacts_dir(&self) -> &Path {
        &self.artifacts_dir
    }

    pub fn config(&self) -> &E2eConfig {
        &self.config
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn runner(&self) -> ScenarioRunner {
        ScenarioRunner::new(
            self.client.clone(),
            self.config.auth.jwt_secret.clone(),
            &self.artifacts_dir,
        )
    }

    /// Run a scenario, journaling the outcome and writing its report as an artifact.
    pub fn run(&self, scenario: &Scenario) -> Result<ScenarioReport> {
        self.append_log(&format!("scenario {} started", scenario.name))?;
        match self.runner().run(scenario) {
            Ok(report) => {
                write_json(&self.report_path(&scenario.name), &report)?;
                self.append_log(&format!("scenario {} passed", scenario.name))?;
                Ok(report)
            }
            Err(err) => {
                self.append_log(&format!("scenario {} failed: {err:#}", scenario.name))?;
                Err(err)
            }
        }
    }

    /// Report file for a scenario; the name is reduced to one path-safe segment.
    pub fn report_path(&self, scenario: &str) -> PathBuf {
        let mut stem = sanitize(scenario);
        if stem.is_empty() {
            stem = "scenario".into();
        }
        self.artifacts_dir.join(format!("{stem}.report.json"))
    }

    pub fn healthcheck(&self) -> Result<()> {
        if !self.logs_dir.exists() {
            bail!("logs dir missing at {}", self.logs_dir.display());
        }
        if !self.artifacts_dir.exists() {
            bail!("artifacts dir missing at {}", self.artifacts_dir.display());
        }
        let ready_marker = self.logs_dir.join("READY");
        if !ready_marker.exists() {
            bail!("missing READY marker at {}", ready_marker.display());
        }
        if !api_available(&self.config) {
            bail!("API not reachable at {}", self.config.api.socket_addr());
        }
        write_text(
            &self.logs_dir.join("healthcheck.txt"),
            format!("healthy at {}\n", now_millis()),
        )
    }

    fn append_log(&self, line: &str) -> Result<()> {
        let journal = self.logs_dir.join("harness.log");
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&journal)
            .with_context(|| format!("failed to open {}", journal.display()))?;
        writeln!(file, "[{}] {line}", now_millis())
            .with_context(|| format!("failed to write {}", journal.display()))?;
        Ok(())
    }
}

/// Quick check that something is listening on the configured API address.
pub fn api_available(config: &E2eConfig) -> bool {
    let addr = config.api.socket_addr();
    let Ok(addrs) = addr.to_socket_addrs() else {
        debug!(%addr, "API address did not resolve");
        return false;
    };
    addrs
        .into_iter()
        .any(|sock| TcpStream::connect_timeout(&sock, PROBE_TIMEOUT).is_ok())
}

/// Whether a live test should run. Returns an error instead of `false` when
/// `E2E_REQUIRE_API` demands the API be up.
pub fn ensure_api(test: &str, config: &E2eConfig) -> Result<bool> {
    if api_available(config) {
        return Ok(true);
    }
    let strict = std::env::var("E2E_REQUIRE_API")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if strict {
        bail!(
            "{test} requires the API but nothing listens on {}",
            config.api.socket_addr()
        );
    }
    eprintln!(
        "{test}: skipping, API not reachable at {}",
        config.api.socket_addr()
    );
    Ok(false)
}

#[derive(Debug, Serialize)]
struct EnvSnapshot {
    name: String,
    root: PathBuf,
    base_url: String,
    jwt_secret_set: bool,
    timestamp_ms: u128,
    env_test_name: Option<String>,
}

impl EnvSnapshot {
    fn capture(name: &str, root: &Path, config: &E2eConfig) -> Self {
        Self {
            name: name.to_string(),
            root: root.to_path_buf(),
            base_url: config.api.base_url(),
            jwt_secret_set: !config.auth.jwt_secret.is_empty(),
            timestamp_ms: now_millis(),
            env_test_name: std::env::var("E2E_TEST_NAME").ok(),
        }
    }
}

fn resolve_test_name() -> String {
    if let Ok(name) = std::env::var("E2E_TEST_NAME") {
        let cleaned = sanitize(&name);
        if !cleaned.is_empty() {
            return cleaned;
        }
    }

    if let Some(thread_name) = std::thread::current().name() {
        let cleaned = sanitize(thread_name);
        if !cleaned.is_empty() && cleaned != "main" {
            return cleaned;
        }
    }

    format!("e2e-{}", now_millis())
}

fn sanitize(input: &str) -> String {
    let mut out = String::new();
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    let data = serde_json::to_vec_pretty(value).context("failed to serialize JSON")?;
    fs::write(path, data).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn write_text(path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
