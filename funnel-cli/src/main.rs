use anyhow::{Context, Result};
use clap::Parser;
use funnel_config::{ConfigLoader, FunnelConfig, LogLevel};
use funnel_http::{CancellationToken, HttpError, HttpMethod, HttpResponse, ResilientClient};
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use tracing::{debug, error, info, warn};

mod cli;
use cli::{Cli, Commands, ConfigCommands};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // `config sample` must work even when the environment holds a broken config
    if let Commands::Config {
        config_cmd: ConfigCommands::Sample,
    } = cli.command
    {
        return Ok(print_sample());
    }

    let mut config = load_config(cli.config.as_ref())?;
    if let Some(ref level) = cli.log_level {
        config.logging.level = LogLevel::from_str(level)
            .map_err(|e| anyhow::anyhow!("Invalid --log-level '{}': {}", level, e))?;
    }
    funnel_logging::init_logging_from_config(&config.logging)?;

    debug!("Funnel CLI starting");

    match cli.command {
        Commands::Probe {
            url,
            method,
            attempts,
            body,
            headers,
        } => probe_command(config, &url, &method, attempts, body, headers).await,
        Commands::Config { config_cmd } => match config_cmd {
            ConfigCommands::Show => {
                let yaml =
                    serde_yaml::to_string(&config).context("Failed to render configuration")?;
                print!("{}", yaml);
                Ok(ExitCode::SUCCESS)
            }
            ConfigCommands::Validate => {
                // Loading already validated every domain
                println!("Configuration is valid");
                info!("Configuration validation passed");
                Ok(ExitCode::SUCCESS)
            }
            ConfigCommands::Sample => Ok(print_sample()),
        },
    }
}

fn print_sample() -> ExitCode {
    print!("{}", FunnelConfig::generate_sample());
    ExitCode::SUCCESS
}

fn load_config(config_path: Option<&PathBuf>) -> Result<FunnelConfig> {
    let loader = ConfigLoader::new();

    match config_path {
        Some(path) => loader
            .from_file(path)
            .with_context(|| format!("Failed to load configuration from {:?}", path)),
        None => loader
            .from_env()
            .context("Failed to load configuration from environment"),
    }
}

async fn probe_command(
    config: FunnelConfig,
    url: &str,
    method: &str,
    attempts: Option<u32>,
    body: Option<String>,
    headers: Vec<(String, String)>,
) -> Result<ExitCode> {
    let method = HttpMethod::from_str(method)?;
    let client = ResilientClient::new(config.http.into()).context("Failed to build HTTP client")?;

    let mut policy = client.policy().clone();
    if let Some(attempts) = attempts {
        policy = policy.with_max_attempts(attempts);
    }

    let mut request = client.prepare(method, url)?;
    for (name, value) in &headers {
        request = request.header(name, value)?;
    }
    if let Some(ref body) = body {
        let json: serde_json::Value =
            serde_json::from_str(body).context("--body is not valid JSON")?;
        request = request.json(&json)?;
    }

    let token = CancellationToken::new();
    let interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling request");
            interrupt.cancel();
        }
    });

    info!("Probing {} {}", method, url);
    let outcome = client
        .fetch_with_cancellation(request, &policy, &token)
        .await;
    let state = client.circuit_state();

    match outcome {
        Ok(response) => {
            print_response(&response);
            println!("circuit: {}", state);
            Ok(if response.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Err(e @ HttpError::Cancelled) => {
            eprintln!("{}", e);
            Ok(ExitCode::from(130))
        }
        Err(e) => {
            error!("Probe failed: {}", e);
            eprintln!("{}", e.user_message());
            println!("circuit: {}", state);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_response(response: &HttpResponse) {
    println!("status: {}", response.status());
    for (name, value) in response.headers() {
        println!("{}: {}", name, value.to_str().unwrap_or("<binary>"));
    }
    println!();

    let text = response.text();
    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(json) => match serde_json::to_string_pretty(&json) {
            Ok(pretty) => println!("{}", pretty),
            Err(_) => println!("{}", text),
        },
        Err(_) => println!("{}", text),
    }
}
