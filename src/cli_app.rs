//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use serde_json::{Value, json};
use thiserror::Error;

use fsevents_agent::aggregator::AccessStore;
use fsevents_agent::core::config::Config;
use fsevents_agent::core::errors::AgentError;
use fsevents_agent::daemon::loop_main::AgentDaemon;
use fsevents_agent::persist::{RestoreOutcome, restore};
use fsevents_agent::platform::pal::detect_platform;
use fsevents_agent::report::{JsonLineSink, ReportSink, run_check};

/// Filesystem access-latency agent: cache-versus-tape read telemetry.
#[derive(Debug, Parser)]
#[command(
    name = "fsevents-agent",
    author,
    version,
    about = "File open/close latency agent",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Config file (TOML). Defaults plus environment overrides when omitted.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Watch the configured directories and report periodically.
    Run,
    /// Print the report for the persisted state once, without saving.
    Report(ReportArgs),
    /// Show or validate the effective configuration.
    Config(ConfigArgs),
    /// Print version information.
    Version(VersionArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args)]
struct ReportArgs {
    /// State file to read instead of the configured one.
    #[arg(long, value_name = "PATH")]
    state: Option<PathBuf>,
    /// Indent the report.
    #[arg(long)]
    pretty: bool,
}

#[derive(Debug, Clone, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration (default).
    Show,
    /// Load and validate, printing only the config hash.
    Validate,
}

#[derive(Debug, Clone, Args)]
struct VersionArgs {
    /// Include build metadata.
    #[arg(long)]
    verbose: bool,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Bad configuration or input; nothing was started.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Json(_) => 3,
        }
    }
}

impl From<AgentError> for CliError {
    fn from(error: AgentError) -> Self {
        let message = format!("[{}] {error}", error.code());
        if error.is_fatal_at_startup() {
            Self::User(message)
        } else {
            Self::Runtime(message)
        }
    }
}

pub fn run(cli: &Cli) -> Result<(), CliError> {
    match &cli.command {
        Command::Run => run_agent(cli),
        Command::Report(args) => run_report(cli, args),
        Command::Config(args) => run_config(cli, args),
        Command::Version(args) => emit_version(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

fn run_agent(cli: &Cli) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let mut daemon = AgentDaemon::init(config)?;
    daemon.run()?;
    Ok(())
}

fn run_report(cli: &Cli, args: &ReportArgs) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let state_path = args
        .state
        .clone()
        .unwrap_or_else(|| config.paths.state_file.clone());

    let store = AccessStore::new(config.engine.clone(), detect_platform());
    match restore(&store, &state_path, config.persistence.restore_policy)? {
        RestoreOutcome::Missing => {
            eprintln!("[FSE-STATE] no state at {}, reporting empty", state_path.display());
        }
        RestoreOutcome::Discarded { reason } => {
            eprintln!("[FSE-STATE] ignoring unusable state: {reason}");
        }
        RestoreOutcome::Restored { .. } => {}
    }

    let outcome = run_check(&store, None);
    let mut sink = JsonLineSink::new(io::stdout());
    if args.pretty {
        sink = sink.pretty();
    }
    sink.emit(&outcome.report)?;
    Ok(())
}

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let hash = config.stable_hash()?;

    match args.command.as_ref().unwrap_or(&ConfigCommand::Show) {
        ConfigCommand::Show => match output_mode(cli) {
            OutputMode::Human => {
                let toml_str = toml::to_string_pretty(&config)
                    .map_err(|e| CliError::Runtime(format!("serialize config: {e}")))?;
                println!("# config_hash = {hash}");
                println!("{toml_str}");
            }
            OutputMode::Json => {
                let payload = json!({
                    "command": "config show",
                    "config_hash": hash,
                    "config": serde_json::to_value(&config)?,
                });
                write_json_line(&payload)?;
            }
        },
        ConfigCommand::Validate => match output_mode(cli) {
            OutputMode::Human => println!("config ok (hash {hash})"),
            OutputMode::Json => {
                write_json_line(&json!({
                    "command": "config validate",
                    "ok": true,
                    "config_hash": hash,
                }))?;
            }
        },
    }
    Ok(())
}

fn emit_version(cli: &Cli, args: &VersionArgs) -> Result<(), CliError> {
    let version = env!("CARGO_PKG_VERSION");
    let package = env!("CARGO_PKG_NAME");
    let target = option_env!("TARGET").unwrap_or("unknown");
    let profile = option_env!("PROFILE").unwrap_or("unknown");

    match output_mode(cli) {
        OutputMode::Human => {
            println!("fsevents-agent {version}");
            if args.verbose {
                println!("package: {package}");
                println!("target: {target}");
                println!("profile: {profile}");
            }
        }
        OutputMode::Json => {
            write_json_line(&json!({
                "binary": "fsevents-agent",
                "version": version,
                "package": package,
                "build": { "target": target, "profile": profile },
            }))?;
        }
    }
    Ok(())
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("FSE_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }
    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };
    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_before_and_after_subcommand() {
        assert!(Cli::try_parse_from(["fsevents-agent", "--config", "/etc/fse.toml", "run"]).is_ok());
        assert!(Cli::try_parse_from(["fsevents-agent", "report", "--config", "/etc/fse.toml"]).is_ok());
    }

    #[test]
    fn parses_all_subcommands() {
        let cases = [
            vec!["fsevents-agent", "run"],
            vec!["fsevents-agent", "report", "--state", "/tmp/state.json", "--pretty"],
            vec!["fsevents-agent", "config"],
            vec!["fsevents-agent", "config", "validate"],
            vec!["fsevents-agent", "--json", "config", "show"],
            vec!["fsevents-agent", "version", "--verbose"],
            vec!["fsevents-agent", "completions", "zsh"],
        ];
        for case in cases {
            assert!(Cli::try_parse_from(case.clone()).is_ok(), "failed to parse {case:?}");
        }
    }

    #[test]
    fn requires_a_subcommand() {
        assert!(Cli::try_parse_from(["fsevents-agent"]).is_err());
    }

    #[test]
    fn startup_errors_map_to_user_exit_code() {
        let fatal: CliError = AgentError::WatchList {
            path: PathBuf::from("watch.cnf"),
            details: "missing".to_string(),
        }
        .into();
        assert_eq!(fatal.exit_code(), 1);
        assert!(fatal.to_string().starts_with("[FSE-1004]"));

        let runtime: CliError = AgentError::Runtime {
            details: "thread".to_string(),
        }
        .into();
        assert_eq!(runtime.exit_code(), 2);
    }

    #[test]
    fn output_mode_resolution() {
        assert_eq!(resolve_output_mode(true, Some("human"), true), OutputMode::Json);
        assert_eq!(resolve_output_mode(false, Some("json"), true), OutputMode::Json);
        assert_eq!(resolve_output_mode(false, Some(" Human "), false), OutputMode::Human);
        assert_eq!(resolve_output_mode(false, None, true), OutputMode::Human);
        assert_eq!(resolve_output_mode(false, Some("bogus"), false), OutputMode::Json);
    }
}
