use crate::cli::{NormalizeArgs, OutputFormat};
use colored::Colorize;
use ormlens_sql::{AnalysisCache, LoadPattern, ParsedQueryFacts};
use serde::Serialize;
use std::io::Read;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatementReport {
    source: String,
    sql: String,
    pattern: Option<String>,
    load: LoadPattern,
    facts: ParsedQueryFacts,
}

pub fn run(args: NormalizeArgs) -> anyhow::Result<()> {
    let mut inputs: Vec<(String, String)> = Vec::new();
    if args.files.is_empty() {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| anyhow::anyhow!("failed to read stdin: {e}"))?;
        if buf.trim().is_empty() {
            anyhow::bail!("no SQL provided (pass files or pipe SQL to stdin)");
        }
        inputs.push(("stdin".to_string(), buf));
    } else {
        for file in &args.files {
            let content = std::fs::read_to_string(file)
                .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", file.display()))?;
            inputs.push((file.display().to_string(), content));
        }
    }

    let cache = AnalysisCache::new();
    let mut reports = Vec::new();
    for (name, content) in &inputs {
        let stmts = split_statements(content);
        if stmts.is_empty() {
            anyhow::bail!("no SQL statements found in {name}");
        }
        for (idx, sql) in stmts.into_iter().enumerate() {
            reports.push(StatementReport {
                source: format!("{name}:stmt{}", idx + 1),
                pattern: cache.normalized_pattern(&sql),
                load: cache.classify_load(&sql),
                facts: ParsedQueryFacts::clone(&cache.facts(&sql)),
                sql,
            });
        }
    }

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
        OutputFormat::Text => reports.iter().for_each(print_statement),
    }
    Ok(())
}

/// Split on top-level semicolons with the Postgres scanner; ORM SQL the
/// scanner rejects is treated as one statement.
fn split_statements(content: &str) -> Vec<String> {
    let pieces: Vec<String> = match pg_query::split_with_scanner(content) {
        Ok(pieces) => pieces.into_iter().map(str::to_string).collect(),
        Err(e) => {
            tracing::debug!(error = %e, "scanner split failed, using whole input");
            vec![content.to_string()]
        }
    };
    pieces
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn load_label(load: LoadPattern) -> String {
    match load {
        LoadPattern::Collection { has_limit: true } => "collection (paginated)".to_string(),
        LoadPattern::Collection { has_limit: false } => "collection".to_string(),
        LoadPattern::Proxy => "proxy".to_string(),
        LoadPattern::Unknown => "unknown".to_string(),
    }
}

fn print_statement(r: &StatementReport) {
    let facts = &r.facts;
    println!("{}", r.source.bold().cyan());
    println!(
        "  {} {}",
        "pattern:".bright_black(),
        r.pattern.as_deref().unwrap_or("(empty)")
    );
    println!("  {} {}", "load:".bright_black(), load_label(r.load));
    if let Some(main) = &facts.main_table {
        match &main.alias {
            Some(alias) => println!("  {} {} {alias}", "table:".bright_black(), main.table),
            None => println!("  {} {}", "table:".bright_black(), main.table),
        }
    }
    for join in &facts.joins {
        let on: Vec<String> = join
            .conditions
            .iter()
            .map(|c| format!("{} = {}", c.left, c.right))
            .collect();
        println!(
            "  {} {} {} ON {}",
            "join:".bright_black(),
            join.join_type,
            join.qualifier(),
            on.join(" AND ")
        );
    }
    for cond in &facts.where_conditions {
        println!(
            "  {} {} {} ({:?})",
            "where:".bright_black(),
            cond.column,
            cond.operator,
            cond.value
        );
    }
    if facts.has_limit {
        println!(
            "  {} {}",
            "limit:".bright_black(),
            facts
                .limit_value
                .map(|v| v.to_string())
                .unwrap_or_else(|| "?".to_string())
        );
    }
    if !facts.aggregation_functions.is_empty() {
        println!(
            "  {} {}",
            "aggregates:".bright_black(),
            facts.aggregation_functions.join(", ")
        );
    }
    println!("  {} {:?}", "source:".bright_black(), facts.source);
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_semicolons() {
        let stmts = split_statements("SELECT 1;\nSELECT * FROM users WHERE id = 2;\n");
        assert_eq!(stmts, vec!["SELECT 1", "SELECT * FROM users WHERE id = 2"]);
    }

    #[test]
    fn blank_input_has_no_statements() {
        assert!(split_statements("  \n ").is_empty());
    }
}
