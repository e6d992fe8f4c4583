//! Result shaping for display
//!
//! Single number -> sentence, two text columns -> "first last" list,
//! anything else -> row dump capped at `MAX_DISPLAY_ROWS`.

use crate::engine::EngineResult;
use crate::rows::CellValue;
use once_cell::sync::Lazy;
use regex::Regex;

pub const MAX_DISPLAY_ROWS: usize = 100;

static HOW_MANY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bhow many\s+(\w+)").unwrap());
static CUANTOS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bcu[áa]nt[oa]s\s+(\w+)").unwrap());

/// Human-readable rendering of one turn
pub fn format_result(res: &EngineResult) -> String {
    if res.needs_clarification {
        return format!(
            "Clarification needed: {}",
            res.error.as_deref().unwrap_or("please clarify the question.")
        );
    }

    if let Some(err) = &res.error {
        return format!("Error: {}", err);
    }

    let rows = match &res.results {
        Some(rows) if !rows.is_empty() => rows,
        _ => return "No results found.".to_string(),
    };

    let first = &rows[0];

    if rows.len() == 1 && first.len() == 1 && first[0].is_numeric() {
        return numeric_answer(&res.question, &first[0]);
    }

    if first.len() == 2 && first.iter().all(CellValue::is_text) {
        return rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join(", ");
    }

    rows.iter()
        .take(MAX_DISPLAY_ROWS)
        .map(|row| {
            row.iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(" | ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Sentence for a single numeric answer
///
/// "How many titles ..." -> "12 titles."; "¿Cuántos títulos ..." -> "12 títulos.".
/// Otherwise the bare value.
pub fn numeric_answer(question: &str, value: &CellValue) -> String {
    let rendered = render_number(value);
    let q = question.to_lowercase();

    if let Some(caps) = HOW_MANY.captures(&q).or_else(|| CUANTOS.captures(&q)) {
        return format!("{} {}.", rendered, &caps[1]);
    }

    rendered
}

fn render_number(value: &CellValue) -> String {
    match value {
        CellValue::Integer(i) => i.to_string(),
        CellValue::Real(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        CellValue::Real(f) => format!("{:.2}", f),
        other => other.to_string(),
    }
}
