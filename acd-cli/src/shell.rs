use std::io::{self, Write};

use colored::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::debug;

use acd_core::FormulaVariant;
use acd_engine::presenter::{self, result_line};
use acd_engine::{
    ComputationResult, EngineError, EngineEvent, EngineHandle, EngineSnapshot, Notice,
    NoticeKind, RecomputeTrigger,
};

#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error("{0}")]
    Usage(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("terminal I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// One line typed at the interactive prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Edit,
    Set(String),
    Apply,
    Cancel,
    Variant(FormulaVariant),
    Calculate,
    Show,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  edit                 freeze the time input and start editing
  set <YYYY-MM-DDTHH:MM>  change the draft time
  apply                commit the draft and recalculate
  cancel               discard the draft
  variant <bypass|menu>  select the password type
  calc                 calculate now
  show                 print the current state
  quit                 leave";

pub fn parse_line(line: &str) -> Result<Option<ShellCommand>, ShellError> {
    let mut parts = line.split_whitespace();
    let Some(verb) = parts.next() else {
        return Ok(None);
    };
    let rest = parts.collect::<Vec<_>>().join(" ");

    let command = match verb.to_ascii_lowercase().as_str() {
        "edit" => ShellCommand::Edit,
        "set" => {
            if rest.is_empty() {
                return Err(ShellError::Usage("usage: set <YYYY-MM-DDTHH:MM>".into()));
            }
            ShellCommand::Set(rest)
        }
        "apply" => ShellCommand::Apply,
        "cancel" => ShellCommand::Cancel,
        "variant" | "type" => {
            let variant = rest
                .parse::<FormulaVariant>()
                .map_err(|err| ShellError::Usage(err.to_string()))?;
            ShellCommand::Variant(variant)
        }
        "calc" | "calculate" => ShellCommand::Calculate,
        "show" | "status" => ShellCommand::Show,
        "help" | "?" => ShellCommand::Help,
        "quit" | "exit" | "q" => ShellCommand::Quit,
        other => return Err(ShellError::Usage(format!("unknown command '{other}', try 'help'"))),
    };
    Ok(Some(command))
}

/// Reads commands from stdin until `quit` or end of input.
pub async fn run(handle: EngineHandle) -> Result<(), ShellError> {
    let background = tokio::spawn(print_background_updates(handle.subscribe_events()));
    print_snapshot(&handle.snapshot().await?);
    println!("{}", "type 'help' for commands".dimmed());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("acd> ");
        io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        let command = match parse_line(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                println!("{} {}", "✘".red().bold(), err);
                continue;
            }
        };

        if command == ShellCommand::Quit {
            break;
        }
        if let Err(err) = execute(&handle, command).await {
            match err {
                ShellError::Engine(EngineError::ShuttingDown) | ShellError::Io(_) => {
                    background.abort();
                    return Err(err);
                }
                other => println!("{} {}", "✘".red().bold(), other),
            }
        }
    }

    background.abort();
    Ok(())
}

async fn execute(handle: &EngineHandle, command: ShellCommand) -> Result<(), ShellError> {
    match command {
        ShellCommand::Edit => {
            let draft = handle.begin_edit().await?;
            println!("editing, draft {}", presenter::input_value(&draft).bold());
        }
        ShellCommand::Set(raw) => match handle.update_draft(raw).await {
            Ok(draft) => println!("draft {}", presenter::input_value(&draft).bold()),
            Err(err @ EngineError::InvalidTimestampInput(_)) => {
                print_notice(&Notice::failure(err.to_string()))
            }
            Err(err) => return Err(err.into()),
        },
        ShellCommand::Apply => {
            let outcome = handle.apply_edit().await;
            report_explicit(handle, outcome).await?;
        }
        ShellCommand::Cancel => {
            handle.cancel_edit().await?;
            println!("edit cancelled");
        }
        ShellCommand::Variant(variant) => {
            handle.select_variant(variant).await?;
            let snapshot = handle.snapshot().await?;
            if let Some(result) = &snapshot.result {
                print_result(result);
            }
        }
        ShellCommand::Calculate => {
            println!("{}", "Calculating…".dimmed());
            let outcome = handle.calculate().await;
            report_explicit(handle, outcome).await?;
        }
        ShellCommand::Show => print_snapshot(&handle.snapshot().await?),
        ShellCommand::Help => println!("{HELP}"),
        ShellCommand::Quit => {}
    }
    Ok(())
}

async fn report_explicit(
    handle: &EngineHandle,
    outcome: Result<ComputationResult, EngineError>,
) -> Result<(), ShellError> {
    match outcome {
        Ok(result) => print_result(&result),
        Err(EngineError::ComputationFailure(_)) => {}
        Err(err) => return Err(err.into()),
    }
    if let Some(notice) = handle.snapshot().await?.notice {
        print_notice(&notice);
    }
    Ok(())
}

async fn print_background_updates(mut events: broadcast::Receiver<EngineEvent>) {
    loop {
        match events.recv().await {
            Ok(EngineEvent::ResultChanged {
                result,
                trigger: RecomputeTrigger::ClockTick,
            }) => {
                println!();
                println!("{} {}", "↻".cyan(), result_line(&result));
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "shell fell behind engine events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

pub fn print_result(result: &ComputationResult) {
    println!(
        "{} {}  {}",
        result.variant.label().bold(),
        result.timestamp.to_input_string(),
        result.code.green().bold()
    );
}

pub fn print_notice(notice: &Notice) {
    match notice.kind {
        NoticeKind::Success => println!("{} {}", "✔".green().bold(), notice.message),
        NoticeKind::Failure => println!("{} {}", "✘".red().bold(), notice.message),
    }
}

pub fn print_snapshot(snapshot: &EngineSnapshot) {
    let clock = presenter::clock_display(&snapshot.committed);
    println!("  Time:    {} {}", clock.time, clock.date);
    if let Some(draft) = &snapshot.draft {
        println!("  Draft:   {} {}", presenter::input_value(draft), "(editing)".yellow());
    }
    println!(
        "  Type:    {} {}",
        snapshot.variant.label(),
        snapshot.variant.formula().dimmed()
    );
    match &snapshot.result {
        Some(result) => println!("  Code:    {}", result.code.green().bold()),
        None => println!("  Code:    {}", "----".dimmed()),
    }
}
