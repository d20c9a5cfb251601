//! Result artifacts: the JSON rule file and the Markdown run report.
//!
//! `execution_time_seconds` is the only field that differs between two runs
//! on identical inputs; everything else is byte-stable.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::discover::{DiscoveredRule, DiscoveryOutcome};
use crate::error::Result;

/// Rules shown in the report's top-rules table.
const REPORT_TOP_RULES: usize = 5;

#[derive(Debug, Serialize)]
pub struct ResultsFile<'a> {
    pub rules: &'a [DiscoveredRule],
    pub metadata: Metadata<'a>,
}

#[derive(Debug, Serialize)]
pub struct Metadata<'a> {
    pub database: &'a str,
    pub total_rules: usize,
    pub execution_time_seconds: f64,
    pub status: &'a str,
}

/// Database stem used in artifact file names (`university.db` → `university`).
pub fn database_stem(db_path: &Path) -> String {
    db_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "database".to_string())
}

/// Write `MATILDA_<db>_results.json`; returns the path written.
pub fn write_results_json(
    output_dir: &Path,
    db_path: &Path,
    outcome: &DiscoveryOutcome,
    execution_time_seconds: f64,
) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)?;
    let stem = database_stem(db_path);
    let path = output_dir.join(format!("MATILDA_{stem}_results.json"));

    let file = ResultsFile {
        rules: &outcome.rules,
        metadata: Metadata {
            database: &stem,
            total_rules: outcome.rules.len(),
            execution_time_seconds,
            status: outcome.status.as_str(),
        },
    };
    let json = serde_json::to_string_pretty(&file).map_err(|e| {
        crate::error::DiscoveryError::InternalInvariant(format!("results serialization: {e}"))
    })?;
    std::fs::write(&path, json)?;
    tracing::info!(path = %path.display(), "results written");
    Ok(path)
}

/// Write `report_MATILDA_<db>.md`; returns the path written.
pub fn write_markdown_report(
    output_dir: &Path,
    db_path: &Path,
    outcome: &DiscoveryOutcome,
    results_path: &Path,
) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)?;
    let stem = database_stem(db_path);
    let path = output_dir.join(format!("report_MATILDA_{stem}.md"));

    let mut report = String::new();
    report.push_str("# MATILDA Run Report\n\n");
    report.push_str(&format!(
        "**Date:** {}\n",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    ));
    report.push_str(&format!("**Database:** {stem}\n"));
    report.push_str(&format!(
        "**Number of Rules Discovered:** {}\n",
        outcome.rules.len()
    ));
    report.push_str(&format!("**Status:** {}\n", outcome.status.as_str()));
    if let Some(reason) = outcome.cancel_reason {
        report.push_str(&format!("**Stopped by:** {}\n", reason.as_str()));
    }
    report.push_str(&format!("**Results Path:** {}\n\n", results_path.display()));

    report.push_str("## Top Rules\n\n");
    if outcome.rules.is_empty() {
        report.push_str("No rules satisfied the support and confidence thresholds.\n");
    } else {
        report.push_str("| Rank | Rule | Support | Confidence |\n");
        report.push_str("|------|------|---------|------------|\n");
        for (idx, rule) in outcome.rules.iter().take(REPORT_TOP_RULES).enumerate() {
            report.push_str(&format!(
                "| {} | {} | {} | {:.4} |\n",
                idx + 1,
                rule.tgd_string.replace('|', "\\|"),
                rule.support,
                rule.confidence
            ));
        }
    }

    report.push_str(&format!(
        "\n## Summary\n\n- Candidates enumerated: {}\n- Candidates validated: {}\n",
        outcome.candidates_enumerated, outcome.candidates_validated
    ));

    std::fs::write(&path, report)?;
    tracing::info!(path = %path.display(), "report written");
    Ok(path)
}
