//! Purpose: `sheetrelay` CLI entry point.
//! Role: Binary crate root; parses args, sets up logging, runs jobs, emits JSON on stdout.
//! Invariants: Each job prints exactly one JSON summary on stdout.
//! Invariants: Errors are emitted as JSON on stderr (text when stderr is a terminal).
//! Invariants: Process exit code is derived from `api::to_exit_code`.
#![allow(clippy::result_large_err)]
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::{
    CommandFactory, Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind,
};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::UtcTime;

mod command_dispatch;
mod report_json;

use sheetrelay::api::{Error, ErrorKind, to_exit_code};
use sheetrelay::notice::{Notice, notice_json};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(clap_error_summary(&err))
                        .with_hint("Try `sheetrelay --help`."),
                    ColorMode::Auto,
                ));
            }
        },
    };

    let color_mode = cli.color;
    init_tracing(cli.log_level.as_deref()).map_err(|err| (err, color_mode))?;

    command_dispatch::dispatch_command(cli)
        .map_err(add_auth_hint)
        .map_err(add_exhausted_hint)
        .map_err(add_internal_hint)
        .map_err(|err| (err, color_mode))
}

#[derive(Parser)]
#[command(
    name = "sheetrelay",
    version,
    about = "Copy and filter ranges between Google Sheets documents",
    long_about = r#"Copy and filter ranges between Google Sheets documents.

Reads are adaptive: one whole-range request first, then row segments that
grow on success and halve on failure. Writes clear the destination, grow its
grid when needed, and send rows in chunks. Every remote call is retried with
capped exponential backoff."#,
    after_help = r#"CREDENTIALS
  SHEETS_ACCESS_TOKEN   bearer token used as-is
  GOOGLE_CREDENTIALS    service account key JSON
  --credentials FILE    service account key file (default: credentials.json)

EXAMPLES
  $ sheetrelay export --source <ID> --destination <ID>
  $ sheetrelay replicate --origin <ID>
  $ sheetrelay --config jobs.json --log-level debug replicate"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        help = "JSON config file overriding built-in defaults",
        value_hint = ValueHint::FilePath
    )]
    config: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        help = "Service account key file (default: credentials.json)",
        value_hint = ValueHint::FilePath
    )]
    credentials: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        value_name = "FILTER",
        help = "Log filter such as info, debug or sheetrelay=trace (default: $RUST_LOG, then info)"
    )]
    log_level: Option<String>,
    #[arg(
        long,
        global = true,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "Copy selected columns of the source sheet into the destination sheet",
        after_help = r#"EXAMPLES
  $ sheetrelay export --source <ID> --destination <ID>"#
    )]
    Export {
        #[arg(long, value_name = "ID", help = "Source spreadsheet id")]
        source: Option<String>,
        #[arg(long, value_name = "ID", help = "Destination spreadsheet id")]
        destination: Option<String>,
    },
    #[command(
        about = "Fan the source sheet out to every destination listed in the config sheet",
        after_help = r#"NOTES
  - Destinations come from the filter/id column pair of the origin's config sheet.
  - A destination without the target sheet is skipped; a failing one is reported
    and the run continues. The exit code reflects the first failure."#
    )]
    Replicate {
        #[arg(long, value_name = "ID", help = "Origin spreadsheet id")]
        origin: Option<String>,
    },
    #[command(about = "Generate shell completions")]
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn init_tracing(level: Option<&str>) -> Result<(), Error> {
    let env_filter = match level {
        Some(level) => EnvFilter::try_new(level).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("invalid --log-level '{level}'"))
                .with_hint("Use a level such as info or debug, or a directive like sheetrelay=trace.")
                .with_source(err)
        })?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_timer(UtcTime::rfc_3339())
        .with_writer(io::stderr)
        .try_init();
    Ok(())
}

fn add_auth_hint(err: Error) -> Error {
    if err.hint().is_some() {
        return err;
    }
    match err.kind() {
        ErrorKind::Auth => err.with_hint(
            "Check that the service account key is valid and the token has not been revoked.",
        ),
        ErrorKind::Permission => err.with_hint(
            "Share the spreadsheet with the service account email, or check the API is enabled.",
        ),
        ErrorKind::NotFound => err.with_hint("Check the spreadsheet id."),
        _ => err,
    }
}

fn add_exhausted_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Exhausted || err.hint().is_some() {
        return err;
    }
    err.with_hint("The API kept failing. Retry later or raise retry.max_attempts in the config.")
}

fn add_internal_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Internal || err.hint().is_some() {
        return err;
    }
    err.with_hint(
        "Unexpected internal failure. Retry with RUST_LOG=debug and share command/context if it persists.",
    )
}

fn emit_json(value: Value) {
    let pretty = io::stdout().is_terminal();
    let json = if pretty {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn emit_notice(notice: &Notice, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        let label = colorize_label("notice:", color_mode.use_color(is_tty), AnsiColor::Yellow);
        eprintln!("{label} {} (spreadsheet: {})", notice.message, notice.target);
        return;
    }

    let value = notice_json(notice);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"notice\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::Permission => "permission denied".to_string(),
        ErrorKind::Auth => "authentication failed".to_string(),
        ErrorKind::RateLimited => "rate limited".to_string(),
        ErrorKind::Unavailable => "service unavailable".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
        ErrorKind::Structure => "unexpected sheet structure".to_string(),
        ErrorKind::Exhausted => "retries exhausted".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

pub(crate) fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(spreadsheet) = err.spreadsheet() {
        inner.insert("spreadsheet".to_string(), json!(spreadsheet));
    }
    if let Some(range) = err.range() {
        inner.insert("range".to_string(), json!(range));
    }
    if let Some(status) = err.status() {
        inner.insert("status".to_string(), json!(status));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    ));

    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(spreadsheet) = err.spreadsheet() {
        lines.push(format!(
            "{} {spreadsheet}",
            colorize_label("spreadsheet:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(range) = err.range() {
        lines.push(format!(
            "{} {range}",
            colorize_label("range:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(status) = err.status() {
        lines.push(format!(
            "{} {status}",
            colorize_label("status:", use_color, AnsiColor::Yellow)
        ));
    }

    let causes = error_causes(err);
    if let Some(cause) = causes.first() {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
    }

    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}
