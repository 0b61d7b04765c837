// SPDX-License-Identifier: MPL-2.0
//! `app_vitals` command-line tool: inspect and maintain the diagnostics data
//! an application has stored in its data directory.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use app_vitals::app::{logging, paths};
use app_vitals::config;
use app_vitals::error::{Error, Result};
use app_vitals::infrastructure::FileStore;
use app_vitals::Vitals;

const HELP: &str = "\
app_vitals - application diagnostics

USAGE:
  app_vitals [OPTIONS] <COMMAND>

COMMANDS:
  diagnose          Print a health snapshot as JSON
  issues            List detected issues
  recover           Run recovery actions
  export [PATH]     Write an export bundle (default: current directory)
  clear-all         Delete all stored diagnostics data

OPTIONS:
  --data-dir <DIR>     Override the data directory
  --config-dir <DIR>   Override the config directory
  -h, --help           Print this help
";

enum Command {
    Diagnose,
    Issues,
    Recover,
    Export(Option<PathBuf>),
    ClearAll,
}

fn parse_args() -> std::result::Result<Option<Command>, pico_args::Error> {
    let mut args = pico_args::Arguments::from_env();
    if args.contains(["-h", "--help"]) {
        return Ok(None);
    }

    let data_dir: Option<String> = args.opt_value_from_str("--data-dir")?;
    let config_dir: Option<String> = args.opt_value_from_str("--config-dir")?;
    paths::init_cli_overrides(data_dir, config_dir);

    let command = match args.subcommand()?.as_deref() {
        Some("diagnose") => Command::Diagnose,
        Some("issues") => Command::Issues,
        Some("recover") => Command::Recover,
        Some("export") => Command::Export(args.opt_free_from_str()?),
        Some("clear-all") => Command::ClearAll,
        _ => return Ok(None),
    };

    let remaining = args.finish();
    if !remaining.is_empty() {
        tracing::warn!(?remaining, "ignoring unused arguments");
    }
    Ok(Some(command))
}

async fn run(command: Command) -> Result<()> {
    let config = config::load()?;
    let store_dir = paths::get_store_dir()
        .ok_or_else(|| Error::Config("no data directory available".to_string()))?;

    let vitals = Vitals::builder(Arc::new(FileStore::new(store_dir)))
        .config(config)
        .open()
        .await;
    let diagnostics = vitals.diagnostics();

    let outcome = match command {
        Command::Diagnose => {
            let snapshot = diagnostics.run_diagnostics().await;
            print_json(&snapshot)
        }
        Command::Issues => {
            let issues = diagnostics.check_common_issues().await;
            if issues.is_empty() {
                println!("No issues detected.");
            }
            for issue in issues {
                println!("[{}] {}\n    -> {}", issue.severity, issue.description, issue.solution);
            }
            Ok(())
        }
        Command::Recover => {
            let result = diagnostics.perform_recovery_actions().await;
            for action in &result.actions_performed {
                println!("- {action}");
            }
            println!("{}", if result.success { "Recovery succeeded." } else { "Recovery incomplete." });
            Ok(())
        }
        Command::Export(path) => {
            let target = path.unwrap_or_else(|| PathBuf::from("."));
            diagnostics
                .export_to_file(&target)
                .await
                .map(|written| println!("{}", written.display()))
                .map_err(Error::from)
        }
        Command::ClearAll => diagnostics
            .clear_all_data()
            .await
            .map(|removed| println!("Removed {removed} stored entries."))
            .map_err(Error::from),
    };

    vitals.shutdown().await;
    outcome
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|err| Error::Config(format!("cannot serialize output: {err}")))?;
    println!("{json}");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init_tracing(logging::DEFAULT_FILTER);

    let command = match parse_args() {
        Ok(Some(command)) => command,
        Ok(None) => {
            print!("{HELP}");
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            eprintln!("error: {err}\n\n{HELP}");
            return ExitCode::from(2);
        }
    };

    match run(command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
