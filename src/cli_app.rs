//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{ColoredString, Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use log_retention_helper::apply::service::SystemdController;
use log_retention_helper::apply::{
    ApplyOptions, ApplyReport, ApplyStatus, Configurator, Subsystem,
};
use log_retention_helper::core::config::Config;
use log_retention_helper::core::errors::LrhError;
use log_retention_helper::logger::jsonl::{JsonlConfig, JsonlWriter, LogEntry};
use log_retention_helper::monitor::probe::DiskProbe;
use log_retention_helper::platform::pal::detect_platform;
use log_retention_helper::policy::retention::{
    DiskSpaceSample, Recommendation, RetentionMode, RetentionParameters, parameters_for,
};

/// Log Retention Helper: sizes container and journal log rotation to free disk space.
#[derive(Debug, Parser)]
#[command(
    name = "lrh",
    author,
    version,
    about = "Log Retention Helper - disk-aware log rotation limits",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Increase verbosity.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (errors only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Sample free space and print the recommended retention limits.
    Show(SampleArgs),
    /// Write the recommended limits into the log subsystem configs.
    Apply(ApplyArgs),
    /// Compare on-disk limits against the current recommendation.
    Status(SampleArgs),
    /// Print every retention mode with its free-space interval and limits.
    Table,
    /// View and validate configuration.
    Config(ConfigArgs),
    /// Show version and optional build metadata.
    Version(VersionArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args, Default)]
struct SampleArgs {
    /// Filesystem to probe (defaults to `probe.path` from config).
    #[arg(long, value_name = "PATH", conflicts_with = "available_gb")]
    path: Option<PathBuf>,
    /// Skip probing and use this many GiB of available space.
    #[arg(long, value_name = "GB")]
    available_gb: Option<u64>,
}

#[derive(Debug, Clone, Args, Default)]
struct ApplyArgs {
    #[command(flatten)]
    sample: SampleArgs,
    /// Force a retention mode instead of classifying the sample.
    #[arg(long, value_name = "MODE")]
    mode: Option<RetentionMode>,
    /// Show what would change without writing anything.
    #[arg(long)]
    dry_run: bool,
    /// Write configs but do not restart services.
    #[arg(long)]
    no_restart: bool,
}

#[derive(Debug, Clone, Args, Default)]
struct ConfigArgs {
    /// Config operation to run.
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print resolved config file path.
    Path,
    /// Print effective merged configuration.
    Show,
    /// Validate configuration and exit.
    Validate,
}

#[derive(Debug, Clone, Args, Default)]
struct VersionArgs {
    /// Include additional build metadata fields.
    #[arg(long)]
    verbose: bool,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
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
    /// Invalid user input or configuration.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Internal bug or invariant violation.
    #[error("{0}")]
    Internal(String),
    /// Some subsystems were configured, others failed.
    #[error("{0}")]
    Partial(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Internal(_) | Self::Json(_) => 3,
            Self::Partial(_) => 4,
        }
    }
}

impl From<LrhError> for CliError {
    fn from(err: LrhError) -> Self {
        match err {
            LrhError::InvalidConfig { .. }
            | LrhError::MissingConfig { .. }
            | LrhError::ConfigParse { .. } => Self::User(err.to_string()),
            LrhError::Serialization { .. } => Self::Internal(err.to_string()),
            _ => Self::Runtime(err.to_string()),
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Show(args) => run_show(cli, args),
        Command::Apply(args) => run_apply(cli, args),
        Command::Status(args) => run_status(cli, args),
        Command::Table => run_table(cli),
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

/// Where a sample's numbers came from.
struct Sampled {
    sample: DiskSpaceSample,
    /// Probed path; `None` for a manual `--available-gb`.
    path: Option<PathBuf>,
}

impl Sampled {
    fn source(&self) -> &'static str {
        if self.path.is_some() {
            "probe"
        } else {
            "override"
        }
    }
}

fn take_sample(config: &Config, args: &SampleArgs) -> Result<Sampled, LrhError> {
    if let Some(gb) = args.available_gb {
        return Ok(Sampled {
            sample: DiskSpaceSample::with_available(gb),
            path: None,
        });
    }
    let path = args.path.clone().unwrap_or_else(|| config.probe.path.clone());
    let probe = DiskProbe::new(detect_platform()?);
    let sample = probe.sample(&path)?;
    Ok(Sampled {
        sample,
        path: Some(path),
    })
}

fn activity_log(config: &Config) -> JsonlWriter {
    JsonlWriter::open(JsonlConfig::at(&config.paths.activity_log))
}

fn run_show(cli: &Cli, args: &SampleArgs) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let sampled = take_sample(&config, args)?;
    let rec = Recommendation::from_sample(sampled.sample);

    match output_mode(cli) {
        OutputMode::Human => {
            if cli.quiet {
                return Ok(());
            }
            print_sample(&sampled);
            print_recommendation(&rec, cli.verbose);
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "show",
                "source": sampled.source(),
                "path": sampled.path.as_ref().map(|p| p.to_string_lossy()),
                "sample": rec.sample,
                "mode": rec.mode,
                "parameters": rec.parameters,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn run_apply(cli: &Cli, args: &ApplyArgs) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let (sampled, probe_error, rec) = match take_sample(&config, &args.sample) {
        Ok(sampled) => {
            let rec = args.mode.map_or_else(
                || Recommendation::from_sample(sampled.sample),
                |mode| Recommendation::forced(Some(sampled.sample), mode),
            );
            (Some(sampled), None, rec)
        }
        Err(err) => {
            if !args.dry_run {
                activity_log(&config).write_all(&[LogEntry::error(&err)]);
            }
            // Only a forced mode can go on without a sample.
            let Some(mode) = args.mode else {
                return Err(err.into());
            };
            if cli.verbose {
                eprintln!("lrh: probe failed, continuing with --mode: {err}");
            }
            (None, Some(err), Recommendation::forced(None, mode))
        }
    };

    let services = SystemdController::default();
    let configurator = Configurator::new(&config, &services);
    let report = configurator.apply(
        &rec.parameters,
        ApplyOptions {
            dry_run: args.dry_run,
            restart: !args.no_restart,
        },
    );

    if !args.dry_run {
        let mut entries = vec![LogEntry::recommendation(&rec)];
        for outcome in &report.outcomes {
            entries.extend(LogEntry::from_outcome(outcome, rec.mode.as_str()));
        }
        activity_log(&config).write_all(&entries);
    }

    match output_mode(cli) {
        OutputMode::Human => {
            if !cli.quiet {
                match (&sampled, &probe_error) {
                    (Some(sampled), _) => print_sample(sampled),
                    (None, Some(err)) => println!("Disk: not sampled ({err})"),
                    (None, None) => {}
                }
                print_recommendation(&rec, false);
                if args.mode.is_some() {
                    println!("  (mode forced with --mode)");
                }
                println!();
                print_report(&report, cli.verbose);
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "apply",
                "dry_run": args.dry_run,
                "forced": args.mode.is_some(),
                "source": sampled.as_ref().map_or("probe-failed", Sampled::source),
                "probe_error": probe_error.as_ref().map(|err| json!({
                    "code": err.code(),
                    "message": err.to_string(),
                })),
                "sample": rec.sample,
                "mode": rec.mode,
                "parameters": rec.parameters,
                "outcomes": report.outcomes,
                "failed": report.failed_count(),
            });
            write_json_line(&payload)?;
        }
    }

    let failed = report.failed_count();
    if failed > 0 {
        return Err(CliError::Partial(format!(
            "{failed} of {} subsystem(s) failed",
            report.outcomes.len()
        )));
    }
    Ok(())
}

fn run_status(cli: &Cli, args: &SampleArgs) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let sampled = take_sample(&config, args)?;
    let rec = Recommendation::from_sample(sampled.sample);

    let services = SystemdController::default();
    let configurator = Configurator::new(&config, &services);
    let current = configurator.inspect()?;

    let container_in_sync = current
        .container
        .as_ref()
        .is_some_and(|c| c.matches(&rec.parameters));
    let journal_in_sync = current
        .journal
        .as_ref()
        .is_some_and(|j| j.matches(&rec.parameters));
    let service_state = |subsystem: Subsystem| {
        configurator
            .service_state(subsystem)
            .unwrap_or_else(|_| "unknown".to_string())
    };

    match output_mode(cli) {
        OutputMode::Human => {
            if cli.quiet {
                return Ok(());
            }
            print_sample(&sampled);
            println!("Recommended: {}", mode_label(rec.mode));
            println!();

            let params = &rec.parameters;
            println!(
                "Container logs ({})",
                config.container.daemon_config.display()
            );
            match &current.container {
                Some(c) => {
                    print_setting("log-driver", c.log_driver.as_deref(), "json-file");
                    print_setting("max-size", c.max_size.as_deref(), params.container_log_max_size);
                    print_setting(
                        "max-file",
                        c.max_file.as_deref(),
                        &params.container_log_max_file.to_string(),
                    );
                }
                None => println!("  (file not present)"),
            }
            println!("  in sync: {}", sync_label(container_in_sync));
            if cli.verbose {
                println!(
                    "  service {}: {}",
                    config.container.service,
                    service_state(Subsystem::Container)
                );
            }
            println!();

            println!("Journal ({})", config.journal.config_file.display());
            match &current.journal {
                Some(j) => {
                    print_setting("SystemMaxUse", j.max_use.as_deref(), params.journal_max_use);
                    print_setting("SystemKeepFree", j.keep_free.as_deref(), params.journal_keep_free);
                    print_setting(
                        "SystemMaxFileSize",
                        j.max_file_size.as_deref(),
                        params.journal_max_file_size,
                    );
                }
                None => println!("  (file not present)"),
            }
            println!("  in sync: {}", sync_label(journal_in_sync));
            if cli.verbose {
                println!(
                    "  service {}: {}",
                    config.journal.service,
                    service_state(Subsystem::Journal)
                );
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "status",
                "source": sampled.source(),
                "sample": rec.sample,
                "mode": rec.mode,
                "parameters": rec.parameters,
                "container": {
                    "config_path": config.container.daemon_config.to_string_lossy(),
                    "enabled": config.container.enabled,
                    "current": current.container,
                    "in_sync": container_in_sync,
                    "service": config.container.service,
                    "service_state": service_state(Subsystem::Container),
                },
                "journal": {
                    "config_path": config.journal.config_file.to_string_lossy(),
                    "enabled": config.journal.enabled,
                    "current": current.journal,
                    "in_sync": journal_in_sync,
                    "service": config.journal.service,
                    "service_state": service_state(Subsystem::Journal),
                },
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn run_table(cli: &Cli) -> Result<(), CliError> {
    match output_mode(cli) {
        OutputMode::Human => {
            println!(
                "{:<8} {:<12} {:>9} {:>9} {:>9} {:>10} {:>14}",
                "MODE", "AVAILABLE", "MAX-SIZE", "MAX-FILE", "MAX-USE", "KEEP-FREE", "MAX-FILE-SIZE"
            );
            for mode in RetentionMode::ALL {
                let p = parameters_for(mode);
                println!(
                    "{:<8} {:<12} {:>9} {:>9} {:>9} {:>10} {:>14}",
                    mode.as_str(),
                    interval_label(mode),
                    p.container_log_max_size,
                    p.container_log_max_file,
                    p.journal_max_use,
                    p.journal_keep_free,
                    p.journal_max_file_size,
                );
            }
        }
        OutputMode::Json => {
            let modes: Vec<Value> = RetentionMode::ALL
                .into_iter()
                .map(|mode| {
                    json!({
                        "mode": mode,
                        "min_available_gb": mode.lower_bound_gb(),
                        "max_available_gb": mode.upper_bound_gb(),
                        "description": mode.description(),
                        "parameters": parameters_for(mode),
                    })
                })
                .collect();
            write_json_line(&json!({ "command": "table", "modes": modes }))?;
        }
    }
    Ok(())
}

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match &args.command {
        None | Some(ConfigCommand::Path) => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            let exists = path.exists();

            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", path.display());
                    if !exists {
                        println!("  (file does not exist; defaults will be used)");
                    }
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config path",
                        "path": path.to_string_lossy(),
                        "exists": exists,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Show) => {
            let config = Config::load(cli.config.as_deref())?;

            match output_mode(cli) {
                OutputMode::Human => {
                    let toml_str = toml::to_string_pretty(&config)
                        .map_err(|e| CliError::Internal(format!("serialize config: {e}")))?;
                    println!("{toml_str}");
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config show",
                        "config": serde_json::to_value(&config)?,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Validate) => match Config::load(cli.config.as_deref()) {
            Ok(config) => {
                let hash = config.stable_hash()?;

                match output_mode(cli) {
                    OutputMode::Human => {
                        println!("Configuration is valid.");
                        println!("  Source: {}", config.paths.config_file.display());
                        println!("  Hash: {hash}");
                    }
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": true,
                            "path": config.paths.config_file.to_string_lossy(),
                            "hash": hash,
                        });
                        write_json_line(&payload)?;
                    }
                }
                Ok(())
            }
            Err(e) => {
                match output_mode(cli) {
                    OutputMode::Human => eprintln!("Configuration is INVALID: {e}"),
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": false,
                            "error_code": e.code(),
                            "error": e.to_string(),
                        });
                        write_json_line(&payload)?;
                    }
                }
                Err(CliError::User(format!("invalid config: {e}")))
            }
        },
    }
}

fn emit_version(cli: &Cli, args: &VersionArgs) -> Result<(), CliError> {
    let version = env!("CARGO_PKG_VERSION");
    let package = env!("CARGO_PKG_NAME");
    let target = option_env!("TARGET").unwrap_or("unknown");
    let profile = option_env!("PROFILE").unwrap_or("unknown");
    let git_sha = option_env!("GIT_SHA").unwrap_or("unknown");

    match output_mode(cli) {
        OutputMode::Human => {
            println!("lrh {version}");
            if args.verbose {
                println!("package: {package}");
                println!("target: {target}");
                println!("profile: {profile}");
                println!("git_sha: {git_sha}");
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "binary": "lrh",
                "version": version,
                "package": package,
                "build": {
                    "target": target,
                    "profile": profile,
                    "git_sha": git_sha,
                }
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

// ──────────────────────── human rendering ────────────────────────

fn print_sample(sampled: &Sampled) {
    let s = &sampled.sample;
    match &sampled.path {
        Some(path) => println!(
            "Disk {}: {} GiB available of {} GiB ({}% used)",
            path.display(),
            s.available_gb,
            s.total_gb,
            s.used_percent
        ),
        None => println!("Disk: {} GiB available (manual override)", s.available_gb),
    }
}

fn print_recommendation(rec: &Recommendation, verbose: bool) {
    println!("Mode: {} [{}]", mode_label(rec.mode), interval_label(rec.mode));
    if verbose {
        println!("  {}", rec.mode.description());
    }
    print_parameters(&rec.parameters);
}

fn print_parameters(p: &RetentionParameters) {
    println!("  container max-size       {}", p.container_log_max_size);
    println!("  container max-file       {}", p.container_log_max_file);
    println!("  journal SystemMaxUse     {}", p.journal_max_use);
    println!("  journal SystemKeepFree   {}", p.journal_keep_free);
    println!("  journal SystemMaxFileSize {}", p.journal_max_file_size);
}

fn print_report(report: &ApplyReport, verbose: bool) {
    for outcome in &report.outcomes {
        println!(
            "{:<10} {:<15} {}",
            outcome.subsystem.as_str(),
            status_label(outcome.status),
            outcome.message
        );
        if let Some(backup) = &outcome.backup_path {
            println!("{:<10} backup: {}", "", backup.display());
        }
        if verbose {
            if let Some(preview) = &outcome.preview {
                println!("--- {} (preview)", outcome.config_path.display());
                print!("{preview}");
            }
        }
    }
}

fn print_setting(key: &str, current: Option<&str>, wanted: &str) {
    let shown = current.unwrap_or("(unset)");
    if current == Some(wanted) {
        println!("  {key:<18} {shown}");
    } else {
        println!("  {key:<18} {shown} -> {}", wanted.yellow());
    }
}

fn interval_label(mode: RetentionMode) -> String {
    match mode.upper_bound_gb() {
        Some(upper) => format!("{}-{upper} GiB", mode.lower_bound_gb()),
        None => format!(">= {} GiB", mode.lower_bound_gb()),
    }
}

fn mode_label(mode: RetentionMode) -> ColoredString {
    match mode {
        RetentionMode::Strict => mode.as_str().red().bold(),
        RetentionMode::Normal => mode.as_str().yellow().bold(),
        RetentionMode::Relaxed => mode.as_str().green().bold(),
        RetentionMode::Ample => mode.as_str().cyan().bold(),
    }
}

fn status_label(status: ApplyStatus) -> ColoredString {
    let text = status.to_string();
    let text = text.as_str();
    match status {
        ApplyStatus::Updated => text.green(),
        ApplyStatus::Unchanged | ApplyStatus::Skipped => text.normal(),
        ApplyStatus::DryRun => text.cyan(),
        ApplyStatus::RestartFailed => text.yellow(),
        ApplyStatus::Failed => text.red().bold(),
    }
}

fn sync_label(in_sync: bool) -> ColoredString {
    if in_sync { "yes".green() } else { "no".yellow() }
}

// ──────────────────────── output plumbing ────────────────────────

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("LRH_OUTPUT_FORMAT").ok();
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
