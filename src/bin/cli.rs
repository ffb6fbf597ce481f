//! sqlvtab - Expression REPL

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing_subscriber::EnvFilter;

use sqlvtab::{Evaluator, Value};

/// Print welcome banner
fn print_banner() {
    println!(
        r#"
 sqlvtab expression shell
 Type '.help' for help, '.quit' to exit
"#
    );
}

/// Print help message
fn print_help() {
    println!(
        r#"
Commands:
  .help              Show this help message
  .quit              Exit
  .row <json>        Set the row context from a JSON object
  .inputs <expr>     Show the columns an expression reads
  .clear             Empty the row context

Anything else is evaluated as an expression against the row context.

Examples:
  .row {{"foo.bar": 5, "t.name": "alice"}}
  3 + foo.bar
  t.name = 'alice' AND foo.bar > 4
"#
    );
}

/// Parse a JSON object into a row context
fn parse_row(json: &str) -> Result<IndexMap<String, Value>> {
    let parsed: serde_json::Value = serde_json::from_str(json).context("invalid JSON")?;
    let serde_json::Value::Object(map) = parsed else {
        bail!("row must be a JSON object");
    };
    Ok(map.iter().map(|(k, v)| (k.clone(), Value::from(v))).collect())
}

/// Handle special dot commands; returns false to exit
fn handle_special_command(cmd: &str, row: &mut IndexMap<String, Value>) -> Result<bool> {
    let (name, rest) = cmd.split_once(char::is_whitespace).unwrap_or((cmd, ""));
    let rest = rest.trim();

    match name {
        ".help" => print_help(),
        ".quit" | ".exit" => return Ok(false),
        ".row" => {
            *row = parse_row(rest)?;
            println!("{} column(s) set", row.len());
        }
        ".clear" => row.clear(),
        ".inputs" => {
            let evaluator = Evaluator::compile(rest)?;
            for input in evaluator.inputs() {
                println!("  {}", input);
            }
        }
        other => {
            eprintln!("Unknown command: {}", other);
            eprintln!("Type '.help' for available commands.");
        }
    }
    Ok(true)
}

/// Compile and evaluate one expression
fn evaluate(text: &str, row: &IndexMap<String, Value>) -> Result<()> {
    let evaluator = Evaluator::compile(text)?;
    let value = evaluator.eval(row)?;
    println!("{} ({})", value, value.type_name());
    Ok(())
}

/// Main REPL loop
fn run_repl() -> Result<()> {
    let mut editor = DefaultEditor::new()?;
    let mut row = IndexMap::new();

    print_banner();

    loop {
        let line = match editor.readline("sqlvtab> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(trimmed);

        if trimmed.starts_with('.') {
            match handle_special_command(trimmed, &mut row) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => eprintln!("Error: {:#}", e),
            }
            continue;
        }

        if let Err(e) = evaluate(trimmed, &row) {
            eprintln!("Error: {:#}", e);
        }
    }

    println!("Goodbye!");
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    run_repl()
}
