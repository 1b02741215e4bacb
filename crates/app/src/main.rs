use std::{fs, io::Read};

use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use capacious_e2e::{
    config::{E2eConfig, load_config},
    harness::{TestEnv, api_available},
    jwt,
    normalize::Normalizer,
    scenario::Scenario,
    suites::Suite,
    validate::is_string_valid_uuid,
};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(
    name = "capacious-e2e",
    version,
    about = "End-to-end fixtures and suites for the Capacious API"
)]
struct Cli {
    /// Path to the configuration file (defaults to config/e2e.toml)
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<Utf8PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a signed HS512 token
    Token(TokenArgs),
    /// Verify a token against the configured secret and print its claims
    Verify {
        token: String,
        #[arg(long)]
        secret: Option<String>,
    },
    /// Exit non-zero unless VALUE is a canonical UUID
    CheckUuid { value: String },
    /// Replace ids and recent timestamps in a JSON document with sentinels
    Normalize {
        /// Read from this file instead of stdin
        #[arg(long, value_name = "PATH")]
        input: Option<Utf8PathBuf>,
        /// Extra key to treat as a UUID field (repeatable)
        #[arg(long = "id-field", value_name = "KEY")]
        id_fields: Vec<String>,
    },
    /// Run suites or a scenario file against the API
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct TokenArgs {
    /// Sign for a user the API does not know
    #[arg(long, conflicts_with = "expired")]
    invalid_user: bool,
    /// Sign an already expired token
    #[arg(long)]
    expired: bool,
    /// Override the configured secret
    #[arg(long)]
    secret: Option<String>,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[arg(long, value_enum, default_value = "all")]
    suite: Suite,
    /// Run this scenario JSON file instead of a built-in suite
    #[arg(long, value_name = "PATH")]
    scenario: Option<Utf8PathBuf>,
}

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Token(args) => println!("{}", token_for(&config, args)?),
        Command::Verify { token, secret } => {
            let secret = secret.unwrap_or_else(|| config.auth.jwt_secret.clone());
            let claims = jwt::verify_jwt(&secret, &token)?;
            println!("{}", serde_json::to_string_pretty(&claims)?);
        }
        Command::CheckUuid { value } => {
            if !is_string_valid_uuid(&value) {
                bail!("{value:?} is not a UUID");
            }
            println!("ok");
        }
        Command::Normalize { input, id_fields } => {
            let raw = read_input(input.as_deref())?;
            println!("{}", normalize_text(&raw, id_fields)?);
        }
        Command::Run(args) => run(config, args)?,
    }

    Ok(())
}

fn token_for(config: &E2eConfig, args: TokenArgs) -> Result<String> {
    let secret = args
        .secret
        .unwrap_or_else(|| config.auth.jwt_secret.clone());
    if secret.is_empty() {
        bail!("no JWT secret configured; set GO_JWT_MIDDLEWARE_KEY or pass --secret");
    }
    let token = if args.expired {
        jwt::expired_jwt(&secret)?
    } else if args.invalid_user {
        jwt::valid_jwt_with_invalid_user(&secret)?
    } else {
        jwt::valid_jwt(&secret)?
    };
    Ok(token)
}

fn read_input(input: Option<&Utf8Path>) -> Result<String> {
    match input {
        Some(path) => fs::read_to_string(path).with_context(|| format!("failed to read {path}")),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn normalize_text(raw: &str, id_fields: Vec<String>) -> Result<String> {
    let value: Value = serde_json::from_str(raw).context("input is not valid JSON")?;
    let normalizer = id_fields
        .into_iter()
        .fold(Normalizer::default(), |n, field| n.with_id_field(field));
    let normalized = normalizer.normalize(&value)?;
    Ok(serde_json::to_string_pretty(&normalized)?)
}

fn run(config: E2eConfig, args: RunArgs) -> Result<()> {
    if !api_available(&config) {
        bail!("API not reachable at {}", config.api.socket_addr());
    }

    let scenarios = match &args.scenario {
        Some(path) => {
            let data =
                fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
            let scenario: Scenario = serde_json::from_str(&data)
                .with_context(|| format!("invalid scenario file {path}"))?;
            vec![scenario]
        }
        None => args.suite.scenarios(&config.auth)?,
    };

    let env = TestEnv::up(config)?;
    let mut failed = 0usize;
    for scenario in &scenarios {
        match env.run(scenario) {
            Ok(report) => info!(
                scenario = %report.scenario,
                steps = report.steps.len(),
                "scenario passed"
            ),
            Err(err) => {
                failed += 1;
                error!(scenario = %scenario.name, "{err:#}");
            }
        }
    }

    info!(artifacts = %env.artifacts_dir().display(), "run finished");
    if failed > 0 {
        bail!("{failed} of {} scenarios failed", scenarios.len());
    }
    Ok(())
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
