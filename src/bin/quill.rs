use std::{fs, path::PathBuf, process::ExitCode, thread};

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use quill::{Interpreter, QuillError, Repl, RunOutcome, RuntimeConfig, ScopePolicy};

#[derive(Parser)]
#[command(author, version, about = "Quill scripting language runtime")]
struct Args {
    /// Resolve function scopes where functions are defined instead of
    /// where they are called
    #[arg(long, global = true)]
    lexical: bool,
    /// Maximum nesting of user function calls
    #[arg(long, global = true, default_value_t = 2000)]
    max_depth: usize,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a Quill script file
    Run { script: PathBuf },
    /// Start an interactive REPL session
    Repl,
    /// Evaluate a snippet of Quill code
    Eval { source: String },
}

fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();
    let config = RuntimeConfig {
        scope_policy: if args.lexical {
            ScopePolicy::Lexical
        } else {
            ScopePolicy::Dynamic
        },
        max_call_depth: args.max_depth,
        ..RuntimeConfig::default()
    };
    let result = match args.command.unwrap_or(Command::Repl) {
        Command::Run { script } => run_script(script, config),
        Command::Repl => Repl::with_config(config).run(),
        Command::Eval { source } => run_source("<eval>", &source, config),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

/// Logs to stderr, filtered by `QUILL_LOG` (default `warn`).
fn init_tracing() {
    let filter = EnvFilter::try_from_env("QUILL_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

fn run_script(path: PathBuf, config: RuntimeConfig) -> Result<(), QuillError> {
    let source = fs::read_to_string(&path)?;
    run_source(&path.display().to_string(), &source, config)
}

/// Drives a script to completion, sleeping through `wait` requests.
fn run_source(name: &str, source: &str, config: RuntimeConfig) -> Result<(), QuillError> {
    let mut interpreter = Interpreter::with_config(config);
    let mut outcome = interpreter.execute_named(name, source)?;
    while let RunOutcome::Paused = outcome {
        match interpreter.pending_wake() {
            Some(delay) => thread::sleep(delay),
            None => tracing::warn!("script paused without a wake-up time; resuming"),
        }
        outcome = interpreter.resume()?;
    }
    Ok(())
}
