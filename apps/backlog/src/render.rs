use std::fmt::Write as _;

use client_core::ImportReport;
use shared::domain::Game;

/// One line per record for `list`.
pub fn game_line(game: &Game) -> String {
    let mut line = format!(
        "{}  [{:<11}]  {}  ({})",
        game.id,
        game.status.as_str(),
        game.name,
        game.console.join(", ")
    );
    if let Some(rating) = &game.personal_rating {
        let _ = write!(line, "  {rating}");
    }
    line
}

pub fn game_detail(game: &Game) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", game.name);
    let _ = writeln!(out, "  id:       {}", game.id);
    let _ = writeln!(out, "  status:   {}", game.status);
    let _ = writeln!(out, "  consoles: {}", game.console.join(", "));
    let optional = [
        ("category", &game.category),
        ("note", &game.note),
        ("rating", &game.personal_rating),
        ("comment", &game.comment),
    ];
    for (label, value) in optional {
        if let Some(value) = value {
            let _ = writeln!(out, "  {:<9} {value}", format!("{label}:"));
        }
    }
    let _ = writeln!(out, "  cover:    {}", game.cover_or_default());
    out
}

pub fn import_summary(report: &ImportReport) -> String {
    let mut summary = format!("imported {} game(s)", report.imported);
    if report.enriched + report.placeholders > 0 {
        let _ = write!(
            summary,
            ", fetched {} cover(s), {} without cover",
            report.enriched, report.placeholders
        );
    }
    if report.reassigned_ids > 0 {
        let _ = write!(summary, ", {} new id(s) assigned", report.reassigned_ids);
    }
    summary
}

#[cfg(test)]
#[path = "tests/render_tests.rs"]
mod tests;
