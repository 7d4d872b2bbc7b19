use crate::cli::{AnalyzeArgs, DEFAULT_CONFIG, OutputFormat};
use crate::config::ProjectConfig;
use colored::Colorize;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table, presets::UTF8_FULL};
use ormlens::{Finding, Inspector, MetadataSet, QueryLog, RecordedPlans, Report, Severity};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FileReport<'a> {
    file: String,
    #[serde(flatten)]
    report: &'a Report,
}

pub fn run(args: AnalyzeArgs) -> anyhow::Result<()> {
    let project = if args.config.exists() {
        ProjectConfig::load(args.config.clone())?
    } else if args.config == Path::new(DEFAULT_CONFIG) {
        ProjectConfig::defaults()
    } else {
        anyhow::bail!("config file not found: {}", args.config.display());
    };
    let inputs = &project.file.inputs;

    let patterns: Vec<String> = if args.logs.is_empty() {
        inputs
            .logs
            .iter()
            .map(|l| project.resolve_path(l).to_string_lossy().into_owned())
            .collect()
    } else {
        args.logs.clone()
    };
    if patterns.is_empty() {
        anyhow::bail!("no query logs given (pass --log or set [inputs].logs in the config)");
    }
    let files = expand_patterns(&patterns)?;

    let metadata_path = args
        .metadata
        .clone()
        .or_else(|| inputs.metadata.as_ref().map(|m| project.resolve_path(m)));
    let metadata = match &metadata_path {
        Some(path) => {
            let raw = read(path)?;
            MetadataSet::from_json(&raw)
                .map_err(|e| anyhow::anyhow!("{}: {e}", path.display()))?
        }
        None => MetadataSet::new(),
    };
    tracing::debug!(entities = metadata.len(), "metadata loaded");

    let mut inspector = Inspector::new(project.file.inspect.clone())?;
    let plans_path = args
        .plans
        .clone()
        .or_else(|| inputs.plans.as_ref().map(|p| project.resolve_path(p)));
    if let Some(path) = &plans_path {
        let plans = RecordedPlans::from_json(&read(path)?)
            .map_err(|e| anyhow::anyhow!("{}: {e}", path.display()))?;
        tracing::debug!(plans = plans.len(), "recorded plans loaded");
        inspector = inspector.with_explain_runner(plans);
    }

    let mut reports: Vec<(PathBuf, Report)> = Vec::with_capacity(files.len());
    for file in files {
        let log = QueryLog::from_json(&read(&file)?)
            .map_err(|e| anyhow::anyhow!("{}: {e}", file.display()))?;
        let report = inspector.inspect(&log, &metadata);
        reports.push((file, report));
    }

    match args.format {
        OutputFormat::Json => {
            let out: Vec<FileReport<'_>> = reports
                .iter()
                .map(|(file, report)| FileReport {
                    file: file.display().to_string(),
                    report,
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Text => {
            for (file, report) in &reports {
                print_report(file, report);
            }
        }
    }

    let critical = reports.iter().any(|(_, r)| r.has_critical());
    let warnings = reports
        .iter()
        .any(|(_, r)| r.count_by_severity(Severity::Warning) > 0);
    if critical || (args.deny_warnings && warnings) {
        anyhow::bail!("analysis found issues");
    }

    Ok(())
}

fn read(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))
}

/// Plain paths are kept as is; glob patterns must match at least one file.
fn expand_patterns(patterns: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    let mut out: Vec<PathBuf> = Vec::new();
    for pattern in patterns {
        if !pattern.contains(|c: char| matches!(c, '*' | '?' | '[')) {
            out.push(PathBuf::from(pattern));
            continue;
        }
        let mut matched: Vec<PathBuf> = glob::glob(pattern)
            .map_err(|e| anyhow::anyhow!("invalid glob pattern {pattern}: {e}"))?
            .filter_map(Result::ok)
            .filter(|p| p.is_file())
            .collect();
        if matched.is_empty() {
            anyhow::bail!("no log files match {pattern}");
        }
        matched.sort();
        out.extend(matched);
    }
    out.dedup();
    Ok(out)
}

fn severity_cell(severity: Severity) -> Cell {
    let color = match severity {
        Severity::Critical => Color::Red,
        Severity::Warning => Color::Yellow,
        Severity::Info => Color::Blue,
    };
    Cell::new(severity.as_str())
        .fg(color)
        .add_attribute(Attribute::Bold)
}

fn header(title: &str) -> Cell {
    Cell::new(title).add_attribute(Attribute::Bold).fg(Color::Cyan)
}

fn findings_table(findings: &[Finding]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            header("#"),
            header("Severity"),
            header("Finding"),
            header("Count"),
            header("Time (ms)"),
            header("Suggestion"),
        ]);

    for (i, f) in findings.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            severity_cell(f.severity),
            Cell::new(&f.title),
            Cell::new(f.count),
            Cell::new(format!("{:.1}", f.total_time_ms)),
            Cell::new(&f.suggestion_ref).fg(Color::DarkGrey),
        ]);
    }
    table
}

fn print_report(file: &Path, report: &Report) {
    println!();
    println!("{}", file.display().to_string().bold().cyan());
    println!(
        "{}",
        format!(
            "{} queries, {} distinct, cache hit rate {:.0}%",
            report.query_count,
            report.unique_sql_count,
            report.cache.hit_rate * 100.0
        )
        .bright_black()
    );

    if report.findings.is_empty() {
        println!("  {} no issues found", "✓".green().bold());
        return;
    }

    println!("{}", findings_table(&report.findings));

    for (i, f) in report.findings.iter().enumerate() {
        println!();
        println!("{} {}", format!("[{}]", i + 1).bold(), f.title.bold());
        println!("    {}", f.description);
        if let Some(sample) = f.sample_queries.first() {
            println!("    {} {}", "sql:".bright_black(), sample);
        }
        if let Some(frame) = f.backtrace.as_ref().and_then(|b| b.first()) {
            println!("    {} {}", "at:".bright_black(), frame.describe());
        }
    }

    let critical = report.count_by_severity(Severity::Critical);
    let warning = report.count_by_severity(Severity::Warning);
    println!();
    println!(
        "{} critical, {} warning, {} info",
        critical.to_string().red().bold(),
        warning.to_string().yellow().bold(),
        report.count_by_severity(Severity::Info)
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_paths_pass_through() {
        let files = expand_patterns(&["a.json".to_string(), "a.json".to_string()]).unwrap();
        assert_eq!(files, vec![PathBuf::from("a.json")]);
    }

    #[test]
    fn unmatched_glob_is_an_error() {
        let err = expand_patterns(&["/nonexistent-ormlens-dir/*.json".to_string()]).unwrap_err();
        assert!(err.to_string().contains("no log files match"));
    }
}
