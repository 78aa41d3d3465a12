//! Report rendering.
//!
//! Three layouts are supported:
//! - plain console text, optionally colored
//! - Phabricator remarkup, for pasting into a review
//! - CSV, a diff summary row then one row per bug or CVE finding

use super::cli::OutputFormat;
use crate::cve::{CveRecord, NoteScraper};
use crate::diff::LineKind;
use crate::errors::Result;
use crate::report::ComparisonReport;
use colored::Colorize;
use serde::Serialize;
use std::io::Write;

struct Style {
    color: bool,
}

impl Style {
    fn bold(&self, text: &str) -> String {
        if self.color { text.bold().to_string() } else { text.to_string() }
    }

    fn green(&self, text: &str) -> String {
        if self.color { text.green().to_string() } else { text.to_string() }
    }

    fn red(&self, text: &str) -> String {
        if self.color { text.red().to_string() } else { text.to_string() }
    }
}

fn banner(title: &str, width: usize) -> String {
    format!("{} {} {}", "=".repeat(width), title, "=".repeat(width))
}

/// Reference links of `cve`; a failed lookup is reported and yields none.
fn cve_notes<'a>(cve: &'a CveRecord, scraper: &dyn NoteScraper) -> &'a [String] {
    match cve.notes(scraper) {
        Ok(notes) => notes,
        Err(e) => {
            log::warn!("unable to fetch notes for {}: {}", cve.id, e);
            &[]
        }
    }
}

/// Writes `report` to `out` in the requested `format`.
pub fn write_report(
    out: &mut dyn Write,
    report: &ComparisonReport,
    scraper: &dyn NoteScraper,
    format: OutputFormat,
    color: bool,
) -> Result<()> {
    match format {
        OutputFormat::Plain => write_text(out, report, scraper, &Style { color }, false),
        OutputFormat::Phab => write_text(out, report, scraper, &Style { color: false }, true),
        OutputFormat::Csv => write_csv(out, report),
    }
}

fn write_text(
    out: &mut dyn Write,
    report: &ComparisonReport,
    scraper: &dyn NoteScraper,
    style: &Style,
    phab: bool,
) -> Result<()> {
    let title = format!(
        "DebDiff Report {}: {} -> {}",
        report.package,
        report.old_version(),
        report.new_version()
    );
    writeln!(out, "{}", style.bold(&banner(&title, 10)))?;
    for snapshot in [&report.old, &report.new] {
        let date = snapshot
            .changelog()
            .map(|entry| entry.date.to_rfc2822())
            .unwrap_or_else(|| "unknown".to_string());
        writeln!(out, "{} changelog date: {}", snapshot.version, date)?;
    }

    let lines = report.diff_lines();
    if lines.is_empty() {
        writeln!(out, "{}", style.bold("No difference found"))?;
    } else {
        if phab {
            writeln!(out, "```")?;
        }
        for line in lines {
            let text = match line.kind {
                LineKind::Addition => style.green(&line.text),
                LineKind::Removal => style.red(&line.text),
                LineKind::Context => line.text,
            };
            writeln!(out, "{}", text)?;
        }
        if phab {
            writeln!(out, "```")?;
        }
    }

    writeln!(out, "{}", style.bold(&banner("Bug Report", 12)))?;
    match report.new_bugs() {
        None => writeln!(
            out,
            "{}",
            style.bold(&format!(
                "Changelog date of {} unknown, new bugs can't be determined",
                report.old_version()
            ))
        )?,
        Some(bugs) if bugs.is_empty() => writeln!(out, "{}", style.bold("No bug reports, YAY :D"))?,
        Some(bugs) => {
            for bug in bugs {
                if phab {
                    writeln!(
                        out,
                        "* {}: [[{} | {}]] {}",
                        bug.date,
                        bug.url(),
                        bug.bug_number,
                        bug.subject
                    )?;
                } else {
                    writeln!(
                        out,
                        " * {}: [{}] {}",
                        style.bold(&bug.date.to_string()),
                        style.bold(&bug.bug_number.to_string()),
                        bug.subject
                    )?;
                }
            }
        }
    }

    writeln!(out, "{}", style.bold(&banner("CVE Report", 12)))?;
    if report.fixed_cves.is_empty() {
        writeln!(out, "{}", style.bold("No CVE's fixed in this update"))?;
    }
    for cve in &report.fixed_cves {
        let notes = cve_notes(cve, scraper);
        if phab {
            writeln!(
                out,
                "* [[{} | {}]]: [{}] {}",
                cve.tracker_url(),
                cve.id,
                cve.scope,
                cve.description
            )?;
            for note in notes {
                writeln!(out, "** [[{0} | {0}]]", note)?;
            }
        } else {
            writeln!(out, " * {}: [{}] {}", style.bold(&cve.id), cve.scope, cve.description)?;
            for note in notes {
                writeln!(out, "\t\t - {}", note)?;
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct FindingRow<'a> {
    kind: &'static str,
    id: String,
    date: String,
    scope: &'a str,
    summary: &'a str,
}

fn diff_summary(report: &ComparisonReport) -> (&'static str, String) {
    let lines = report.diff_lines();
    if lines.is_empty() {
        return ("identical", "No difference found".to_string());
    }
    let count = |kind| lines.iter().filter(|line| line.kind == kind).count();
    (
        "changed",
        format!(
            "{} additions, {} removals",
            count(LineKind::Addition),
            count(LineKind::Removal)
        ),
    )
}

fn write_csv(out: &mut dyn Write, report: &ComparisonReport) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);

    let (outcome, summary) = diff_summary(report);
    writer.serialize(FindingRow {
        kind: "diff",
        id: outcome.to_string(),
        date: String::new(),
        scope: "",
        summary: &summary,
    })?;

    match report.new_bugs() {
        None => {
            let summary = format!("Changelog date of {} unknown", report.old_version());
            writer.serialize(FindingRow {
                kind: "bug",
                id: "unknown".to_string(),
                date: String::new(),
                scope: "",
                summary: &summary,
            })?;
        }
        Some(bugs) => {
            for bug in bugs {
                writer.serialize(FindingRow {
                    kind: "bug",
                    id: bug.bug_number.to_string(),
                    date: bug.date.to_string(),
                    scope: "",
                    summary: &bug.subject,
                })?;
            }
        }
    }
    for cve in &report.fixed_cves {
        writer.serialize(FindingRow {
            kind: "cve",
            id: cve.id.clone(),
            date: String::new(),
            scope: &cve.scope,
            summary: &cve.description,
        })?;
    }
    writer.flush()?;
    Ok(())
}
