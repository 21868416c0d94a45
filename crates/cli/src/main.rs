//! Basic Builder CLI entry point.
//!
//! This binary is the composition root for the entire system. Responsibilities:
//!
//! 1. **Parse configuration**: global flags and `BB_*` environment variables
//!    become one immutable [`pipeline::RunConfig`].
//! 2. **Wire observability**: `tracing-subscriber` with a text or JSON layer
//!    and an optional OpenTelemetry OTLP exporter. All `tracing` spans and
//!    events emitted by every crate in the workspace flow through it.
//! 3. **Construct infrastructure**: `GitCliFetcher` and `ShellTaskRunner`
//!    injected into a `PipelineExecutor`.
//! 4. **Select mode**:
//!    - `run`: serve webhooks over HTTP and process them on a worker pool.
//!    - `exec`: run one pipeline from a saved payload and exit.

mod commands;
mod telemetry;

use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, CommandFactory, Parser, Subcommand};
use pipeline::RunConfig;

use crate::telemetry::LogFormat;

#[derive(Parser, Debug)]
#[command(name = "bbuilder", about = "Basic Builder (bbuilder) CLI", disable_version_flag = true)]
struct Cli {
    /// Print the version and exit
    #[arg(long)]
    version: bool,

    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Directory to perform build tasks
    #[arg(short = 'w', long, env = "BB_WORK_DIR", default_value = RunConfig::DEFAULT_WORK_DIR, global = true)]
    work_dir: PathBuf,

    /// Enable debug logging
    #[arg(short = 'd', long, env = "BB_DEBUG", global = true)]
    debug: bool,

    /// SSH deploy key used for every clone; without it clones are anonymous
    #[arg(short = 'k', long, env = "BB_SSH_KEY", global = true)]
    ssh_key: Option<PathBuf>,

    /// Per-command time limit for tasks
    #[arg(long, env = "BB_TASK_TIMEOUT", value_name = "SECONDS", global = true)]
    task_timeout: Option<u64>,

    /// Log line format
    #[arg(long, env = "BB_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    /// OTLP gRPC endpoint for span export (e.g. http://localhost:4317)
    #[arg(long, env = "BB_OTLP_ENDPOINT", global = true)]
    otlp_endpoint: Option<String>,
}

impl GlobalArgs {
    fn run_config(&self) -> RunConfig {
        let mut config = RunConfig::new(&self.work_dir).with_debug(self.debug);
        if let Some(key) = &self.ssh_key {
            config = config.with_ssh_key(key);
        }
        if let Some(secs) = self.task_timeout {
            config = config.with_task_timeout(Duration::from_secs(secs));
        }
        config
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the Basic Builder server
    Run(RunArgs),
    /// Run one pipeline from a saved webhook payload
    Exec(ExecArgs),
}

#[derive(Args, Debug)]
pub(crate) struct RunArgs {
    /// Listen on this address
    #[arg(short = 'a', long, env = "BB_LISTEN_ADDR", default_value = "0.0.0.0")]
    listen_addr: IpAddr,

    /// Listen on this port
    #[arg(short = 'p', long, env = "BB_LISTEN_PORT", default_value_t = 7999)]
    listen_port: u16,

    /// Number of builds run at once
    #[arg(short = 'c', long, env = "BB_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Shared webhook secret; requests without a valid signature are rejected
    #[arg(short = 's', long, env = "BB_AUTH_KEY", hide_env_values = true)]
    auth_key: Option<String>,
}

#[derive(Args, Debug)]
pub(crate) struct ExecArgs {
    /// Webhook dialect (gitea or github)
    #[arg(long)]
    hook_type: String,

    /// Event name, as the dialect's event header would carry it
    #[arg(long)]
    event: String,

    /// JSON file holding the webhook body
    #[arg(long)]
    payload: PathBuf,

    /// Task id (and workspace directory name); generated when omitted
    #[arg(long)]
    task_id: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.version {
        println!("Basic Builder version {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }
    let Some(command) = cli.command else {
        // Best effort: nothing useful to do if stdout is gone.
        let _ = Cli::command().print_help();
        return ExitCode::FAILURE;
    };

    let telemetry = match telemetry::init(
        cli.global.log_format,
        cli.global.debug,
        cli.global.otlp_endpoint.as_deref(),
    ) {
        Ok(telemetry) => telemetry,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let config = cli.global.run_config();
    let result = match command {
        Commands::Run(args) => commands::run(config, args).await,
        Commands::Exec(args) => commands::exec(config, args).await,
    };
    telemetry.shutdown();

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_defaults() {
        let cli = Cli::try_parse_from(["bbuilder", "run"]).unwrap();
        let Some(Commands::Run(args)) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.listen_addr.to_string(), "0.0.0.0");
        assert_eq!(args.listen_port, 7999);
        assert_eq!(args.concurrency, 1);
        assert!(args.auth_key.is_none());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "bbuilder", "run", "-w", "/srv/builds", "-d", "-k", "/keys/deploy", "--task-timeout", "30",
        ])
        .unwrap();
        let config = cli.global.run_config();

        assert_eq!(config.work_dir, PathBuf::from("/srv/builds"));
        assert!(config.debug);
        assert_eq!(config.ssh_key, Some(PathBuf::from("/keys/deploy")));
        assert_eq!(config.task_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_exec_arguments() {
        let cli = Cli::try_parse_from([
            "bbuilder",
            "exec",
            "--hook-type",
            "gitea",
            "--event",
            "push",
            "--payload",
            "body.json",
        ])
        .unwrap();
        let Some(Commands::Exec(args)) = cli.command else {
            panic!("expected exec");
        };
        assert_eq!(args.hook_type, "gitea");
        assert_eq!(args.event, "push");
        assert_eq!(args.payload, PathBuf::from("body.json"));
        assert!(args.task_id.is_none());
    }

    #[test]
    fn test_exec_requires_payload() {
        assert!(Cli::try_parse_from(["bbuilder", "exec", "--hook-type", "gitea", "--event", "push"]).is_err());
    }

    #[test]
    fn test_version_flag() {
        let cli = Cli::try_parse_from(["bbuilder", "--version"]).unwrap();
        assert!(cli.version);
        assert!(cli.command.is_none());
    }
}
