//! Console
//!
//! Terminal side of the tool: the numbered menu, line prompts, masked
//! password entry, and rendering of dispatcher events and reports.

use crate::dispatcher::{Command, CommandSource, DispatchEvent, DispatchSink, Prompt};
use crate::lifecycle::{BatchSummary, Outcome};
use crate::report::InventoryReport;
use anyhow::{Context, Result};
use crossterm::event::{read, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::style::Stylize;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::io::{self, BufRead, Write};

/// Print the main menu
pub fn print_menu() {
    println!();
    println!("{}", "Select an action:".bold());
    for command in Command::MENU {
        println!("{}. {}", command.menu_number(), command.menu_label());
    }
}

/// Reads answers from stdin, printing the menu before each command prompt
pub struct StdinSource {
    stdin: io::Stdin,
}

impl StdinSource {
    pub fn new() -> Self {
        Self { stdin: io::stdin() }
    }
}

impl Default for StdinSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandSource for StdinSource {
    fn next_input(&mut self, prompt: Prompt) -> Option<String> {
        if prompt == Prompt::Command {
            print_menu();
        }
        print!("{}", prompt.text());
        let _ = io::stdout().flush();

        let mut line = String::new();
        match self.stdin.lock().read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
            Err(e) => {
                tracing::warn!("Failed to read input: {}", e);
                None
            }
        }
    }
}

/// Prints dispatcher events to stdout
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl DispatchSink for ConsoleSink {
    fn emit(&mut self, event: DispatchEvent) {
        match event {
            DispatchEvent::InvalidSelection(e) => println!("{}", e.to_string().yellow()),
            DispatchEvent::Notice(message) => println!("{}", message.yellow()),
            DispatchEvent::Selection { command, resources } => {
                println!("{} ({} VMs):", command, resources.len());
                for res in &resources {
                    println!("  {} [{}]", res.name, res.state);
                }
            }
            DispatchEvent::Results { command, results } => {
                for result in &results {
                    let line = result.summary_line();
                    match result.outcome {
                        Outcome::Completed => println!("{}", line.green()),
                        Outcome::Skipped(_) => println!("{}", line.dark_grey()),
                        Outcome::Failed(_) => println!("{}", line.red()),
                    }
                }
                println!("{}: {}", command, BatchSummary::of(&results));
            }
            DispatchEvent::Rejected { command, error } => {
                println!("{}", format!("{} rejected: {}", command, error).red())
            }
            DispatchEvent::Exiting => println!("Exiting."),
        }
    }
}

/// Print session info and VM details
pub fn print_report(report: &InventoryReport) {
    for line in report.session_lines() {
        println!("{}", line);
    }
    if report.rows.is_empty() {
        println!("\n{}", "No VMs match.".yellow());
    }
    for row in &report.rows {
        println!("\n{}", row);
    }
}

/// Read one line from stdin after printing `prompt`
pub fn prompt_line(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read input")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Raw mode for the lifetime of the guard
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> Result<Self> {
        enable_raw_mode().context("Failed to enable raw mode")?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

/// Prompt for a password without echoing it
pub fn prompt_password(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut password = String::new();
    {
        let raw_mode = RawModeGuard::enable()?;
        loop {
            let Event::Key(key) = read().context("Failed to read key")? else {
                continue;
            };
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Enter => break,
                KeyCode::Backspace => {
                    password.pop();
                }
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    drop(raw_mode);
                    println!();
                    return Err(anyhow::anyhow!("Password entry cancelled"));
                }
                KeyCode::Char(c) => password.push(c),
                _ => {}
            }
        }
    }
    println!();
    Ok(password)
}
