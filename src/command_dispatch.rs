//! Purpose: Hold top-level CLI command dispatch for `sheetrelay`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Precedence is built-in defaults, then the config file, then flags.
//! Invariants: Credentials are resolved only for commands that reach the API.

use super::*;

use sheetrelay::api::{CredentialSources, SCOPES, SheetsClient, load_token_source};
use sheetrelay::config::Config;
use sheetrelay::job::{DestinationStatus, run_export, run_replicate};
use tracing::info;

use super::report_json::{destination_notice, export_json, replicate_json};

pub(super) fn dispatch_command(cli: Cli) -> Result<RunOutcome, Error> {
    let color_mode = cli.color;
    match cli.command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "sheetrelay", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Export {
            source,
            destination,
        } => {
            let mut config = load_config(cli.config, cli.credentials)?;
            if let Some(source) = source {
                config.export.source_id = source;
            }
            if let Some(destination) = destination {
                config.export.destination_id = destination;
            }
            let client = connect(&config)?;
            let report = run_export(&client, &config.retry, &config.export)?;
            emit_json(export_json(&config.export, &report));
            Ok(RunOutcome::ok())
        }
        Command::Replicate { origin } => {
            let mut config = load_config(cli.config, cli.credentials)?;
            if let Some(origin) = origin {
                config.replicate.origin_id = origin;
            }
            let client = connect(&config)?;
            let report = run_replicate(&client, &config.retry, &config.replicate)?;
            for notice in report.destinations.iter().filter_map(destination_notice) {
                emit_notice(&notice, color_mode);
            }
            emit_json(replicate_json(&config.replicate, &report));

            let first_failure =
                report
                    .destinations
                    .iter()
                    .find_map(|outcome| match &outcome.status {
                        DestinationStatus::Failed { error } => Some(error.kind()),
                        _ => None,
                    });
            Ok(match first_failure {
                Some(kind) => RunOutcome::with_code(to_exit_code(kind)),
                None => RunOutcome::ok(),
            })
        }
    }
}

fn load_config(path: Option<PathBuf>, credentials: Option<PathBuf>) -> Result<Config, Error> {
    let mut config = match path {
        Some(path) => {
            let config = Config::load(&path)?;
            info!("config loaded from {}", path.display());
            config
        }
        None => Config::default(),
    };
    if let Some(credentials) = credentials {
        config.credentials = credentials;
    }
    Ok(config)
}

fn connect(config: &Config) -> Result<SheetsClient, Error> {
    let sources = CredentialSources::from_env(config.credentials.clone());
    let tokens = load_token_source(&sources, SCOPES)?;
    SheetsClient::new(&config.client, tokens)
}
