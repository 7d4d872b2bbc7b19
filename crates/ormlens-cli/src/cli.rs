use std::path::PathBuf;

pub const DEFAULT_CONFIG: &str = "ormlens.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelpTopic {
    Root,
    Analyze,
    Normalize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    fn parse(v: &str) -> anyhow::Result<Self> {
        match v {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => anyhow::bail!("unknown format: {other} (expected text or json)"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Command {
    Help(HelpTopic),
    Analyze(AnalyzeArgs),
    Normalize(NormalizeArgs),
}

#[derive(Debug, Clone)]
pub struct AnalyzeArgs {
    pub config: PathBuf,
    /// Log files or glob patterns; empty means `[inputs].logs` from the config.
    pub logs: Vec<String>,
    pub metadata: Option<PathBuf>,
    pub plans: Option<PathBuf>,
    pub format: OutputFormat,
    pub deny_warnings: bool,
}

#[derive(Debug, Clone)]
pub struct NormalizeArgs {
    pub format: OutputFormat,
    pub files: Vec<PathBuf>,
}

pub fn parse_args(args: &[String]) -> anyhow::Result<Command> {
    let mut it = args.iter().skip(1);
    let Some(first) = it.next() else {
        return Ok(Command::Help(HelpTopic::Root));
    };

    match first.as_str() {
        "-h" | "--help" => Ok(Command::Help(HelpTopic::Root)),
        "analyze" => parse_analyze(it.map(|s| s.as_str())),
        "normalize" => parse_normalize(it.map(|s| s.as_str())),
        _ => anyhow::bail!("unknown command: {first}"),
    }
}

fn parse_analyze<'a>(mut it: impl Iterator<Item = &'a str>) -> anyhow::Result<Command> {
    let mut config = PathBuf::from(DEFAULT_CONFIG);
    let mut logs: Vec<String> = Vec::new();
    let mut metadata: Option<PathBuf> = None;
    let mut plans: Option<PathBuf> = None;
    let mut format = OutputFormat::default();
    let mut deny_warnings = false;

    while let Some(token) = it.next() {
        match token {
            "-h" | "--help" => return Ok(Command::Help(HelpTopic::Analyze)),
            "--config" => {
                let Some(v) = it.next() else {
                    anyhow::bail!("--config requires a value");
                };
                config = PathBuf::from(v);
            }
            _ if token.starts_with("--config=") => {
                config = PathBuf::from(token.trim_start_matches("--config="));
            }
            "--log" => {
                let Some(v) = it.next() else {
                    anyhow::bail!("--log requires a value");
                };
                logs.push(v.to_string());
            }
            _ if token.starts_with("--log=") => {
                logs.push(token.trim_start_matches("--log=").to_string());
            }
            "--metadata" => {
                let Some(v) = it.next() else {
                    anyhow::bail!("--metadata requires a value");
                };
                metadata = Some(PathBuf::from(v));
            }
            _ if token.starts_with("--metadata=") => {
                metadata = Some(PathBuf::from(token.trim_start_matches("--metadata=")));
            }
            "--plans" => {
                let Some(v) = it.next() else {
                    anyhow::bail!("--plans requires a value");
                };
                plans = Some(PathBuf::from(v));
            }
            _ if token.starts_with("--plans=") => {
                plans = Some(PathBuf::from(token.trim_start_matches("--plans=")));
            }
            "--format" => {
                let Some(v) = it.next() else {
                    anyhow::bail!("--format requires a value");
                };
                format = OutputFormat::parse(v)?;
            }
            _ if token.starts_with("--format=") => {
                format = OutputFormat::parse(token.trim_start_matches("--format="))?;
            }
            "--deny-warnings" => deny_warnings = true,
            other if other.starts_with('-') => anyhow::bail!("unknown argument: {other}"),
            other => logs.push(other.to_string()),
        }
    }

    Ok(Command::Analyze(AnalyzeArgs {
        config,
        logs,
        metadata,
        plans,
        format,
        deny_warnings,
    }))
}

fn parse_normalize<'a>(mut it: impl Iterator<Item = &'a str>) -> anyhow::Result<Command> {
    let mut format = OutputFormat::default();
    let mut files: Vec<PathBuf> = Vec::new();

    while let Some(token) = it.next() {
        match token {
            "-h" | "--help" => return Ok(Command::Help(HelpTopic::Normalize)),
            "--format" => {
                let Some(v) = it.next() else {
                    anyhow::bail!("--format requires a value");
                };
                format = OutputFormat::parse(v)?;
            }
            _ if token.starts_with("--format=") => {
                format = OutputFormat::parse(token.trim_start_matches("--format="))?;
            }
            other if other.starts_with('-') => anyhow::bail!("unknown argument: {other}"),
            other => files.push(PathBuf::from(other)),
        }
    }

    Ok(Command::Normalize(NormalizeArgs { format, files }))
}

pub fn print_help(topic: HelpTopic) {
    match topic {
        HelpTopic::Root => {
            println!(
                "\
ormlens - find N+1 queries and other ORM anti-patterns in query logs

USAGE:
  ormlens <COMMAND> [OPTIONS]

COMMANDS:
  analyze       Inspect captured query logs and report findings
  normalize     Print the normalized pattern and structure of SQL statements

Run `ormlens <command> --help` for more."
            );
        }
        HelpTopic::Analyze => {
            println!(
                "\
USAGE:
  ormlens analyze [OPTIONS] [LOG]...

Each LOG is a JSON query log file or a glob pattern. Without any, the
[inputs].logs entries of the config file are used.

OPTIONS:
  --config <FILE>       Config file path (default: ormlens.toml)
  --log <FILE|GLOB>     Query log to inspect (repeatable)
  --metadata <FILE>     Relationship metadata JSON
  --plans <FILE>        Recorded EXPLAIN output, keyed by normalized pattern
  --format <FORMAT>     text (default) or json
  --deny-warnings       Exit non-zero on warnings, not only on critical findings
  -h, --help            Print help"
            );
        }
        HelpTopic::Normalize => {
            println!(
                "\
USAGE:
  ormlens normalize [OPTIONS] [FILE]...

Reads SQL from the files, or from stdin when none are given.

OPTIONS:
  --format <FORMAT>     text (default) or json
  -h, --help            Print help"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(tokens: &[&str]) -> Vec<String> {
        std::iter::once("ormlens")
            .chain(tokens.iter().copied())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn parse_analyze_with_logs_and_options() {
        let cmd = parse_args(&args(&[
            "analyze",
            "--log",
            "var/log/*.json",
            "extra.json",
            "--metadata=meta.json",
            "--format",
            "json",
            "--deny-warnings",
        ]))
        .unwrap();
        let Command::Analyze(analyze) = cmd else {
            panic!("expected analyze");
        };

        assert_eq!(analyze.config, PathBuf::from("ormlens.toml"));
        assert_eq!(analyze.logs, vec!["var/log/*.json", "extra.json"]);
        assert_eq!(analyze.metadata, Some(PathBuf::from("meta.json")));
        assert_eq!(analyze.format, OutputFormat::Json);
        assert!(analyze.deny_warnings);
        assert!(analyze.plans.is_none());
    }

    #[test]
    fn parse_normalize_files() {
        let cmd = parse_args(&args(&["normalize", "a.sql", "b.sql"])).unwrap();
        let Command::Normalize(normalize) = cmd else {
            panic!("expected normalize");
        };
        assert_eq!(
            normalize.files,
            vec![PathBuf::from("a.sql"), PathBuf::from("b.sql")]
        );
        assert_eq!(normalize.format, OutputFormat::Text);
    }

    #[test]
    fn parse_errors_and_help() {
        assert!(parse_args(&args(&["analyze", "--format", "xml"])).is_err());
        assert!(parse_args(&args(&["analyze", "--bogus"])).is_err());
        assert!(parse_args(&args(&["lint"])).is_err());
        assert!(matches!(
            parse_args(&args(&["normalize", "--help"])).unwrap(),
            Command::Help(HelpTopic::Normalize)
        ));
        assert!(matches!(
            parse_args(&args(&[])).unwrap(),
            Command::Help(HelpTopic::Root)
        ));
    }
}
