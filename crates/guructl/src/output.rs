//! Terminal rendering of engine results

use guru_common::engine::EngineResult;
use guru_common::formatter::format_result;
use owo_colors::OwoColorize;

/// Human-readable block for one turn
pub fn render(res: &EngineResult) -> String {
    let mut out = String::new();

    if res.needs_clarification {
        out.push_str(&format!("{}\n", format_result(res).yellow()));
        return out;
    }

    if let Some(err) = &res.error {
        out.push_str(&format!("{} {}\n", "Error:".red().bold(), err));
        if let Some(generated) = &res.generated_sql {
            out.push_str(&format!("\n{}\n{}\n", "Generated SQL:".dimmed(), generated));
        }
        return out;
    }

    if res.cached {
        out.push_str(&format!("{}\n", "Cached result used.".cyan()));
    }

    if let Some(explanation) = &res.explanation {
        out.push_str(&format!("{} {}\n", "Explanation:".bold(), explanation));
    }

    if let Some(secs) = res.llm_generation_time {
        out.push_str(&format!("{}\n", format!("SQL generated in {:.2}s", secs).dimmed()));
    }

    out.push('\n');
    out.push_str(&format_result(res));
    out.push('\n');
    out
}

/// Pretty JSON envelope for scripting
pub fn render_json(res: &EngineResult) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(res)
}
