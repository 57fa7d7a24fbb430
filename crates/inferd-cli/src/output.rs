//! Output formatting for the inferd CLI

use clap::ValueEnum;
use colored::*;
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use inferd_core::{BudgetPlan, PressureLevel};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table format
    Table,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Table
    }
}

fn table_with_headers(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(
        headers
            .iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold).fg(Color::Cyan))
            .collect::<Vec<_>>(),
    );
    table
}

/// Render a budget plan as a table
pub fn plan_table(plan: &BudgetPlan, total_bytes: Option<u64>) -> Table {
    let mut table = table_with_headers(&["Service", "Fraction", "Reserved"]);
    for (name, fraction) in plan.fractions() {
        let reserved = total_bytes
            .map(|total| format_bytes((total as f64 * fraction) as u64))
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            name.clone(),
            format!("{:.2}", fraction),
            reserved,
        ]);
    }
    table.add_row(vec![
        "(safety margin)".dimmed().to_string(),
        format!("{:.2}", plan.safety_margin()),
        total_bytes
            .map(|total| format_bytes((total as f64 * plan.safety_margin()) as u64))
            .unwrap_or_else(|| "-".to_string()),
    ]);
    table
}

/// One row of the status display
pub struct StatusRow {
    pub service: String,
    pub state: String,
    pub port: u16,
    pub fraction: f64,
    pub probe: std::result::Result<(), String>,
}

/// Render status rows as a table
pub fn status_table(rows: &[StatusRow]) -> Table {
    let mut table = table_with_headers(&["Service", "State", "Port", "Fraction", "Probe"]);
    for row in rows {
        let probe = match &row.probe {
            Ok(()) => "ok".green().to_string(),
            Err(e) => e.red().to_string(),
        };
        table.add_row(vec![
            row.service.clone(),
            colorize_state(&row.state).to_string(),
            row.port.to_string(),
            format!("{:.2}", row.fraction),
            probe,
        ]);
    }
    table
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message.green());
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message.red());
}

pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow().bold(), message.yellow());
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message.blue());
}

/// Colorize a service state name
pub fn colorize_state(state: &str) -> ColoredString {
    match state.to_lowercase().as_str() {
        "healthy" => state.green(),
        "starting" => state.yellow(),
        "degraded" => state.yellow(),
        "failed" => state.red(),
        "pending" | "stopped" => state.dimmed(),
        _ => state.normal(),
    }
}

/// Colorize a pressure level
pub fn colorize_pressure(level: PressureLevel) -> ColoredString {
    let text = level.to_string();
    match level {
        PressureLevel::Healthy => text.green(),
        PressureLevel::Warning => text.yellow(),
        PressureLevel::Critical => text.red().bold(),
    }
}

/// Helper function to format bytes
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(24 * 1024 * 1024 * 1024), "24.0 GiB");
    }

    #[test]
    fn test_plan_table_includes_margin_row() {
        let spec = inferd_core::ServiceSpec {
            name: "vllm".to_string(),
            command: "vllm".to_string(),
            args: vec![],
            env: std::collections::HashMap::new(),
            working_dir: None,
            port: 8000,
            readiness_url: url::Url::parse("http://127.0.0.1:8000/health").unwrap(),
            memory_fraction: 0.75,
            min_fraction: 0.0,
            max_fraction: 1.0,
            start_order: 0,
            depends_on: None,
        };
        let plan = inferd_core::plan(&[spec], 0.05).unwrap();
        let rendered = plan_table(&plan, Some(32 * 1024 * 1024 * 1024)).to_string();
        assert!(rendered.contains("vllm"));
        assert!(rendered.contains("0.75"));
        assert!(rendered.contains("24.0 GiB"));
    }

    #[test]
    fn test_colorize_pressure_levels() {
        // Rendering must carry the level name regardless of color support
        assert!(colorize_pressure(PressureLevel::Critical)
            .to_string()
            .contains("critical"));
        assert!(colorize_pressure(PressureLevel::Healthy)
            .to_string()
            .contains("healthy"));
    }
}
