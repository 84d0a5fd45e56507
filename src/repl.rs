use rustyline::{error::ReadlineError, DefaultEditor};

use crate::{
    diagnostics::{QuillError, Result},
    runtime::{Interpreter, RuntimeConfig},
    scheduler::RunOutcome,
    value::Value,
};

/// Line-oriented session over one interpreter, so globals persist between
/// entries.
pub struct Repl {
    interpreter: Interpreter,
}

impl Default for Repl {
    fn default() -> Self {
        Self::new()
    }
}

impl Repl {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig {
            source_name: "<repl>".to_string(),
            ..RuntimeConfig::default()
        })
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            interpreter: Interpreter::with_config(config),
        }
    }

    pub fn run(&mut self) -> Result<()> {
        let mut editor = DefaultEditor::new().map_err(readline_error)?;
        loop {
            let prompt = if self.interpreter.is_paused() { ".. " } else { ">> " };
            match editor.readline(prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    match trimmed {
                        ":quit" | ":exit" => break,
                        "" => continue,
                        ":resume" => {
                            let outcome = self.interpreter.resume();
                            self.report(outcome);
                            continue;
                        }
                        _ => {}
                    }
                    editor.add_history_entry(trimmed).ok();
                    let outcome = self.interpreter.execute(trimmed);
                    self.report(outcome);
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(err) => return Err(readline_error(err)),
            }
        }
        Ok(())
    }

    fn report(&mut self, outcome: Result<RunOutcome>) {
        match outcome {
            Ok(RunOutcome::Completed(Value::Null)) => {}
            Ok(RunOutcome::Completed(value)) => println!("{value:?}"),
            Ok(RunOutcome::Paused) => match self.interpreter.pending_wake() {
                Some(delay) => {
                    std::thread::sleep(delay);
                    let resumed = self.interpreter.resume();
                    self.report(resumed);
                }
                None => println!("(paused, enter :resume to continue)"),
            },
            Ok(RunOutcome::Handled(diag)) => {
                tracing::debug!(kind = diag.kind.label(), "error handled by script");
            }
            Err(QuillError::Diagnostic(diag)) => eprintln!("{diag}"),
            Err(other) => eprintln!("error: {other}"),
        }
    }
}

fn readline_error(err: ReadlineError) -> QuillError {
    QuillError::from(std::io::Error::new(std::io::ErrorKind::Other, err))
}
