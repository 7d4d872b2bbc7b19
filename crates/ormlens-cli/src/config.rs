use ormlens::InspectConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ProjectConfig {
    pub config_dir: PathBuf,
    pub file: ConfigFile,
}

impl ProjectConfig {
    pub fn load(config_path: PathBuf) -> anyhow::Result<Self> {
        let config_dir = config_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();

        let raw = std::fs::read_to_string(&config_path).map_err(|e| {
            anyhow::anyhow!(
                "failed to read config file {}: {e}",
                config_path.display()
            )
        })?;

        let mut file = ConfigFile::parse(&raw).map_err(|e| {
            anyhow::anyhow!(
                "failed to parse config file {}: {e}",
                config_path.display()
            )
        })?;

        file.expand_env()?;
        file.validate()?;

        Ok(Self { config_dir, file })
    }

    /// Built-in defaults, used when no config file exists.
    pub fn defaults() -> Self {
        Self {
            config_dir: PathBuf::from("."),
            file: ConfigFile::default(),
        }
    }

    pub fn resolve_path(&self, p: impl AsRef<Path>) -> PathBuf {
        let p = p.as_ref();
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.config_dir.join(p)
        }
    }
}

/// `ormlens.toml`: an optional `[inputs]` table plus the inspection sections.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub inputs: InputsConfig,

    #[serde(flatten)]
    pub inspect: InspectConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InputsConfig {
    #[serde(default)]
    pub logs: Vec<String>,
    pub metadata: Option<String>,
    pub plans: Option<String>,
}

impl ConfigFile {
    fn parse(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    fn expand_env(&mut self) -> anyhow::Result<()> {
        for log in &mut self.inputs.logs {
            *log = expand_env_vars(log)?;
        }
        if let Some(metadata) = self.inputs.metadata.as_mut() {
            *metadata = expand_env_vars(metadata)?;
        }
        if let Some(plans) = self.inputs.plans.as_mut() {
            *plans = expand_env_vars(plans)?;
        }
        Ok(())
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.inputs.logs.iter().any(|l| l.trim().is_empty()) {
            anyhow::bail!("inputs.logs entries must not be empty");
        }
        self.inspect.validate()?;
        Ok(())
    }
}

fn expand_env_vars(input: &str) -> anyhow::Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();

            let mut key = String::new();
            let mut closed = false;
            for ch in chars.by_ref() {
                if ch == '}' {
                    closed = true;
                    break;
                }
                key.push(ch);
            }

            if !closed {
                anyhow::bail!("unterminated env var reference: ${{{key}}}");
            }
            if key.is_empty() {
                anyhow::bail!("invalid env var reference: ${{}}");
            }

            let v = std::env::var(&key)
                .map_err(|_| anyhow::anyhow!("missing env var for config expansion: {key}"))?;
            out.push_str(&v);
            continue;
        }

        out.push(c);
    }

    Ok(out)
}
