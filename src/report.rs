//! Text and JSON rendering of scan results

use std::fmt::Write;

use crate::models::ScanResult;

const RULE: &str = "---------------------------------------------------------";

const GREEN: u8 = 32;
const MAGENTA: u8 = 35;
const RED: u8 = 31;

/// Display flags for the text report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    /// Show sizes as 2.1G / 340.5M / 12K
    pub human: bool,
    /// Only list entries above 1% of the total
    pub summary: bool,
    /// Include directories with no file bytes
    pub zeroes: bool,
    /// Colour human-readable sizes
    pub colors: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            human: false,
            summary: true,
            zeroes: false,
            colors: true,
        }
    }
}

impl FormatOptions {
    /// Build options from command line flags
    ///
    /// Listing zero-size entries turns the summary off.
    pub fn from_flags(human: bool, nosummary: bool, zeroes: bool, nocolors: bool) -> Self {
        Self {
            human,
            summary: !nosummary && !zeroes,
            zeroes,
            colors: !nocolors,
        }
    }
}

/// Render the text report
pub fn render(result: &ScanResult, options: &FormatOptions) -> String {
    let dir = result.root.display();
    let total = result.total_bytes();
    let one_percent = total as f64 / 100.0;

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} files size: {}",
        dir,
        format_size(result.root_bytes(), options)
    );
    let _ = writeln!(out, "{} total size: {}", dir, format_size(total, options));

    if options.summary {
        let _ = writeln!(out, "Entries that consume at least 1% of space in this path");
    }
    let _ = writeln!(out, "{}", RULE);

    for (path, bytes) in result.sorted() {
        if options.summary && bytes as f64 <= one_percent {
            continue;
        }
        if !options.zeroes && bytes == 0 {
            continue;
        }
        let _ = writeln!(out, "{}\t\t{}", format_size(bytes, options), path.display());
    }

    if !result.errors.is_empty() {
        let _ = writeln!(
            out,
            "{} directories could not be read and were counted as empty",
            result.errors.len()
        );
    }
    out
}

/// Render the result as pretty-printed JSON
pub fn render_json(result: &ScanResult) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(result)
}

/// Format a byte count according to the display flags
pub fn format_size(size: u64, options: &FormatOptions) -> String {
    if !options.human {
        return size.to_string();
    }
    let colors = options.colors;
    if size > 1_000_000_000 {
        let text = format!("{}G", round2(size, 1_000_000_000));
        bold(&paint(&text, RED, colors), colors)
    } else if size > 1_000_000 {
        paint(&format!("{}M", round2(size, 1_000_000)), RED, colors)
    } else if size > 1_000 {
        paint(&format!("{}K", round2(size, 1_000)), MAGENTA, colors)
    } else {
        paint(&size.to_string(), GREEN, colors)
    }
}

/// Round to two decimal places
fn round2(size: u64, divisor: u64) -> f64 {
    ((size as f64 / divisor as f64) * 100.0).round() / 100.0
}

fn paint(content: &str, color: u8, enabled: bool) -> String {
    if enabled {
        format!("\x1B[{}m{}\x1B[0m", color, content)
    } else {
        content.to_string()
    }
}

fn bold(content: &str, enabled: bool) -> String {
    if enabled {
        format!("\x1B[1m{}\x1B[0m", content)
    } else {
        content.to_string()
    }
}
