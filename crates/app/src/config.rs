use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::APP_NAME;

static DEFAULT_CONFIG: Lazy<E2eConfig> = Lazy::new(E2eConfig::default);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct E2eConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            host: default_host(),
            port: default_port(),
            prefix: default_prefix(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl ApiConfig {
    /// Base URL every request path is appended to, e.g. `http://localhost:8000/api/v1`.
    pub fn base_url(&self) -> String {
        let prefix = self.prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("{}://{}:{}", self.scheme, self.host, self.port)
        } else {
            format!("{}://{}:{}/{prefix}", self.scheme, self.host, self.port)
        }
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_scheme() -> String {
    "http".into()
}

fn default_host() -> String {
    "localhost".into()
}

fn default_port() -> u16 {
    8000
}

fn default_prefix() -> String {
    "/api/v1".into()
}

fn default_timeout_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared HS512 secret; the API reads the same value from `GO_JWT_MIDDLEWARE_KEY`.
    #[serde(default)]
    pub jwt_secret: String,
    #[serde(default = "default_login_email")]
    pub login_email: String,
    #[serde(default = "default_login_password")]
    pub login_password: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            login_email: default_login_email(),
            login_password: default_login_password(),
        }
    }
}

fn default_login_email() -> String {
    "1498@aperturescience.com".into()
}

fn default_login_password() -> String {
    "GLaDOS".into()
}

/// Load configuration: defaults < TOML file < `CAPACIOUS_*` env < `PORT` / `GO_JWT_MIDDLEWARE_KEY`.
pub fn load_config(explicit_path: Option<&Utf8Path>) -> Result<E2eConfig> {
    let mut figment = Figment::from(Serialized::defaults(DEFAULT_CONFIG.clone()));

    if let Some(path) = explicit_path {
        debug!(%path, "loading config file");
        figment = figment.merge(Toml::file(path));
    } else if let Some(path) = resolve_default_config_path() {
        debug!(%path, "loading config file");
        figment = figment.merge(Toml::file(path));
    } else {
        warn!("no config file found; relying on defaults + env overrides");
    }

    figment = figment
        .merge(Env::prefixed("CAPACIOUS_").split("__"))
        .merge(Env::raw().only(&["PORT"]).map(|_| "api.port".into()))
        .merge(
            Env::raw()
                .only(&["GO_JWT_MIDDLEWARE_KEY"])
                .map(|_| "auth.jwt_secret".into()),
        );

    figment
        .extract()
        .context("failed to load capacious-e2e configuration")
}

fn resolve_default_config_path() -> Option<Utf8PathBuf> {
    let repo_relative = crate::workspace_root().join("config/e2e.toml");
    if repo_relative.exists() {
        return Some(repo_relative);
    }

    if let Some(dirs) = ProjectDirs::from("io", "Capacious", APP_NAME)
        && let Ok(path) = Utf8PathBuf::from_path_buf(dirs.config_dir().join("config.toml"))
        && path.exists()
    {
        return Some(path);
    }

    None
}
