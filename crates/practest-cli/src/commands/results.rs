//! Results view: reads the handed-off result once and prints it.

use comfy_table::{Cell, Table};
use serde_json::Value;

use practest_core::handoff::ResultHandoff;
use practest_core::model::ResultPayload;

/// Print the pending result. Returns `false` if there was nothing to show.
pub fn show(handoff: &ResultHandoff) -> bool {
    match handoff.consume() {
        Some(payload) => {
            println!("{}", render(&payload));
            true
        }
        None => {
            eprintln!("No result to show.");
            false
        }
    }
}

fn render(payload: &ResultPayload) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Field", "Value"]);

    table.add_row(vec![Cell::new("Module"), Cell::new(payload.module)]);
    table.add_row(vec![Cell::new("Attempt"), Cell::new(&payload.attempt_id)]);
    table.add_row(vec![
        Cell::new("Submitted"),
        Cell::new(format!(
            "{} ({})",
            payload.meta.submitted_at.format("%Y-%m-%d %H:%M:%S UTC"),
            payload.meta.reason
        )),
    ]);
    if let Some(words) = payload.meta.word_count {
        table.add_row(vec![Cell::new("Words"), Cell::new(words)]);
    }
    if let Some(mime) = &payload.meta.audio_mime {
        table.add_row(vec![Cell::new("Audio"), Cell::new(mime)]);
    }

    match &payload.report.0 {
        Value::Object(fields) => {
            for (key, value) in fields {
                table.add_row(vec![Cell::new(key), Cell::new(display_value(value))]);
            }
        }
        other => {
            table.add_row(vec![Cell::new("Report"), Cell::new(display_value(other))]);
        }
    }

    table
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}
