//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print rows as a table, or the serializable `value` as JSON
pub fn print_rows<T: Tabled, V: Serialize + ?Sized>(
    rows: Vec<T>,
    value: &V,
    format: OutputFormat,
    empty_message: &str,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Table => {
            if rows.is_empty() {
                print_warning(empty_message);
            } else {
                println!("{}", Table::new(rows).with(Style::rounded()));
            }
        }
        OutputFormat::Json => print_json(value)?,
    }
    Ok(())
}

pub fn print_json<V: Serialize + ?Sized>(value: &V) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Color a pass or target outcome
pub fn color_status(status: &str) -> String {
    match status {
        "Success" | "Succeeded" => status.green().to_string(),
        "Abstained" => status.yellow().to_string(),
        "" => "-".dimmed().to_string(),
        "Failed" => status.red().to_string(),
        // Anything else is a joined failure text
        _ => truncate(status, 80).red().to_string(),
    }
}

/// Shorten `text` to at most `limit` characters
pub fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit.saturating_sub(3)) {
        Some((idx, _)) if text.chars().count() > limit => format!("{}...", &text[..idx]),
        _ => text.to_string(),
    }
}

/// `22:00-06:59` style label for an inclusive hour window
pub fn format_window(from: u32, to: u32) -> String {
    format!("{:02}:00-{:02}:59", from, to)
}
