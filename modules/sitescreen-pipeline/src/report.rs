//! Markdown run reports: a counts summary written at the end of every run.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::orchestrator::RunTotals;

pub fn write_report(
    path: &Path,
    title: &str,
    input_count: usize,
    totals: &RunTotals,
) -> Result<()> {
    let run_id = Uuid::new_v4();
    let mut lines: Vec<String> = vec![
        format!("# {title}"),
        String::new(),
        format!("**Run**: {run_id}"),
        format!("**Generated**: {}", Utc::now().format("%Y-%m-%d %H:%M:%S UTC")),
        String::new(),
        "## Summary".to_string(),
        String::new(),
        format!("- **Input records**: {input_count}"),
        format!("- **Processed**: {}", totals.processed),
        String::new(),
        "## Outcomes".to_string(),
        String::new(),
        "| Outcome | Count | % |".to_string(),
        "|---------|-------|---|".to_string(),
    ];

    let denom = totals.processed.max(1) as f64;
    for (label, count) in &totals.by_outcome {
        lines.push(format!(
            "| {label} | {count} | {:.1}% |",
            *count as f64 / denom * 100.0
        ));
    }
    lines.push(String::new());

    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    std::fs::write(path, lines.join("\n"))
        .with_context(|| format!("Failed to write report to {}", path.display()))?;

    info!(path = %path.display(), "Report saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_lists_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.md");

        let mut totals = RunTotals::default();
        totals.processed = 4;
        totals.by_outcome.insert("verified".to_string(), 3);
        totals.by_outcome.insert("crawl_failed".to_string(), 1);

        write_report(&path, "Website Verification Report", 10, &totals).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("# Website Verification Report"));
        assert!(content.contains("| verified | 3 | 75.0% |"));
        assert!(content.contains("| crawl_failed | 1 | 25.0% |"));
        assert!(content.contains("**Input records**: 10"));
    }
}
