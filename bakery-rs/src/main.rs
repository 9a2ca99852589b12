use std::io::stdout;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use crossterm::style::Stylize;
use crossterm::tty::IsTty;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bakery::cli::{self, Cli, CliCommand, RunArgs};
use bakery::config::Config;
use bakery::executor::{LogEntry, LogState};
use bakery::fs_executor::{FsExecutor, FsProbe};
use bakery::script::{check_script, BuildReport, BuildStatus, Interpreter, Script};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    let config = match cli::load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("bakery: {e}");
            return ExitCode::from(4);
        }
    };

    match cli.command {
        CliCommand::Run(args) => run(config, args).await,
        CliCommand::Check { scripts } => check(&config, &scripts),
    }
}

// ── run ───────────────────────────────────────────────────────────────────────

async fn run(mut config: Config, args: RunArgs) -> ExitCode {
    let host_vars = match args.apply(&mut config).and_then(|()| args.host_vars()) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("bakery: {e}");
            return ExitCode::FAILURE;
        }
    };

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    let scripts = args.scripts.clone();
    let build = tokio::task::spawn_blocking(move || {
        let mut exec = FsExecutor::new();
        let probe = FsProbe::default();
        let mut interp = Interpreter::new(config, &mut exec, &probe);
        interp.set_cancel_handle(flag);
        for (key, value) in host_vars {
            interp.set_fixed(&key, value);
        }
        interp.run_build(&scripts)
    });
    tokio::pin!(build);

    let timeout = args.timeout;
    let deadline = async move {
        match timeout {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let joined = loop {
        tokio::select! {
            res = &mut build => break res,
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted, cancelling build");
                cancel.store(true, Ordering::Relaxed);
            }
            _ = &mut deadline, if !cancel.load(Ordering::Relaxed) => {
                warn!(secs = ?timeout, "timeout reached, cancelling build");
                cancel.store(true, Ordering::Relaxed);
            }
        }
    };

    match joined {
        Ok(Ok(report)) => {
            print_report(&report);
            match report.status {
                BuildStatus::Finished | BuildStatus::Exited => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            }
        }
        Ok(Err(e)) => {
            eprintln!("bakery: {e}");
            if let bakery::error::EngineError::Parse { errors, .. } = &e {
                for err in errors {
                    eprintln!("  {err}");
                }
            }
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
        Err(e) => {
            eprintln!("bakery: build task failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn print_report(report: &BuildReport) {
    let color = stdout().is_tty();
    for entry in &report.logs {
        println!("{}", render(entry, color));
    }
    let status = format!("{:?}", report.status);
    let status = match (color, report.status) {
        (false, _) => status,
        (true, BuildStatus::Finished | BuildStatus::Exited) => status.green().bold().to_string(),
        (true, _) => status.red().bold().to_string(),
    };
    println!("Build {status}: {} log entries", report.logs.len());
}

fn render(entry: &LogEntry, color: bool) -> String {
    let tag = format!("[{}]", entry.state);
    let tag = if color {
        match entry.state {
            LogState::Success => tag.green(),
            LogState::Info => tag.cyan(),
            LogState::Ignore | LogState::Muted => tag.dark_grey(),
            LogState::Warning => tag.yellow(),
            LogState::Overwrite => tag.magenta(),
            LogState::Error => tag.red().bold(),
        }
        .to_string()
    } else {
        tag
    };
    let indent = "  ".repeat(entry.depth.saturating_sub(1));
    if entry.line > 0 {
        format!("{indent}{tag} {} (line {}: {})", entry.message, entry.line, entry.raw.trim())
    } else {
        format!("{indent}{tag} {}", entry.message)
    }
}

// ── check ─────────────────────────────────────────────────────────────────────

fn check(config: &Config, scripts: &[PathBuf]) -> ExitCode {
    let mut code = ExitCode::SUCCESS;
    for path in scripts {
        let script = match Script::load(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("bakery: {e}");
                code = ExitCode::from(4);
                continue;
            }
        };
        let errors = check_script(&script, config);
        info!(script = %path.display(), errors = errors.len(), "checked");
        if errors.is_empty() {
            println!("{}: ok", path.display());
            continue;
        }
        for (section, err) in &errors {
            println!("{}: [{section}] {err}", path.display());
        }
        code = ExitCode::from(2);
    }
    code
}
