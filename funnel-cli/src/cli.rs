//! CLI argument parsing definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send one request through the retrying, circuit-breaking client
    Probe {
        /// Absolute URL, or a path relative to http.base_url
        #[arg(value_name = "URL")]
        url: String,

        /// HTTP method
        #[arg(long, value_name = "METHOD", default_value = "GET")]
        method: String,

        /// Override retry.max_attempts for this request
        #[arg(long, value_name = "N")]
        attempts: Option<u32>,

        /// JSON request body (example: --body='{"email":"ada@example.com"}')
        #[arg(long, value_name = "JSON")]
        body: Option<String>,

        /// Extra request header, repeatable (example: --header 'X-Trace: abc')
        #[arg(long = "header", value_name = "K:V", value_parser = parse_header)]
        headers: Vec<(String, String)>,
    },

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        config_cmd: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration (file plus environment) as YAML
    Show,

    /// Print a sample configuration file
    Sample,

    /// Load and validate the configuration
    Validate,
}

/// Parse a `Name: value` header argument
pub fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected NAME:VALUE, got '{}'", raw))?;

    let name = name.trim();
    if name.is_empty() {
        return Err(format!("header name is empty in '{}'", raw));
    }

    Ok((name.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe() {
        let cli = Cli::try_parse_from([
            "funnel",
            "--log-level",
            "debug",
            "probe",
            "https://crm.example.com/api/v4/users",
            "--method",
            "post",
            "--attempts",
            "5",
            "--body",
            r#"{"a":1}"#,
            "--header",
            "X-Trace: abc",
            "--header",
            "Accept:application/json",
        ])
        .unwrap();

        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Commands::Probe {
                url,
                method,
                attempts,
                body,
                headers,
            } => {
                assert_eq!(url, "https://crm.example.com/api/v4/users");
                assert_eq!(method, "post");
                assert_eq!(attempts, Some(5));
                assert_eq!(body.as_deref(), Some(r#"{"a":1}"#));
                assert_eq!(
                    headers,
                    vec![
                        ("X-Trace".to_string(), "abc".to_string()),
                        ("Accept".to_string(), "application/json".to_string()),
                    ]
                );
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_config_commands() {
        let cli = Cli::try_parse_from(["funnel", "config", "show", "--config", "funnel.yaml"])
            .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("funnel.yaml")));
        assert!(matches!(
            cli.command,
            Commands::Config {
                config_cmd: ConfigCommands::Show
            }
        ));
    }

    #[test]
    fn test_parse_header_rejects_malformed() {
        assert!(parse_header("no-colon").is_err());
        assert!(parse_header(": value").is_err());
        assert_eq!(
            parse_header("Authorization: Bearer a:b").unwrap(),
            ("Authorization".to_string(), "Bearer a:b".to_string())
        );
    }

    #[test]
    fn test_probe_requires_url() {
        assert!(Cli::try_parse_from(["funnel", "probe"]).is_err());
    }
}
