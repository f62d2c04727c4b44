use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory of knowledge entry JSON files, one entry per file
    pub kb_dir: PathBuf,
    /// Where the tantivy index is stored
    pub index_dir: PathBuf,
    /// Server bind address
    pub bind_addr: String,
    /// LLM provider configuration
    pub llm: LlmConfig,
    /// Feedback generation settings
    pub generation: GenerationConfig,
    /// Number of knowledge entries retrieved per finding
    pub results_per_finding: usize,
    /// Number of existing topics suggested when a finding has no match
    pub suggestion_count: usize,
    /// Scan raw source for knowledge tags in addition to analyzer findings
    pub scan_source: bool,
    /// External analyzer command; the file path is appended as the last argument
    pub analyzer_command: Option<String>,
    /// A command analyzer still running after this long is killed
    pub analyzer_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Deterministic placeholder substitution only
    Template,
    /// Generative backend, degrading to the template on failure
    Backend,
}

impl FromStr for StrategyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "template" => Ok(StrategyKind::Template),
            "backend" | "llm" => Ok(StrategyKind::Backend),
            _ => Err(ConfigError::Invalid {
                key: "KB_REVIEW_STRATEGY",
                value: s.to_string(),
                expected: "'template' or 'backend'",
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub strategy: StrategyKind,
    /// Custom feedback template; the built-in one is used when unset or unreadable
    pub template_path: Option<PathBuf>,
    /// Hard cap on the code excerpt embedded in prompts
    pub max_code_chars: usize,
    /// Maximum findings listed in one prompt
    pub max_prompt_findings: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "ollama" or "openai"
    pub provider: String,
    /// Base URL for the LLM API
    pub base_url: String,
    /// Model name for generation
    pub model: String,
    /// API key (only needed for cloud providers)
    pub api_key: Option<String>,
    /// Per-request timeout; generous to absorb model cold starts
    pub timeout_secs: u64,
    pub temperature: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kb_dir: PathBuf::from("./knowledgebase"),
            index_dir: PathBuf::from("./data/index"),
            bind_addr: "127.0.0.1:9000".to_string(),
            llm: LlmConfig::default(),
            generation: GenerationConfig::default(),
            results_per_finding: 3,
            suggestion_count: 3,
            scan_source: true,
            analyzer_command: None,
            analyzer_timeout_secs: 120,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Backend,
            template_path: None,
            max_code_chars: 800,
            max_prompt_findings: 5,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            model: "codellama:7b".to_string(),
            api_key: None,
            timeout_secs: 60,
            temperature: 0.7,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("KB_REVIEW_KB_DIR") {
            config.kb_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("KB_REVIEW_INDEX_DIR") {
            config.index_dir = PathBuf::from(dir);
        }
        if let Ok(addr) = std::env::var("KB_REVIEW_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(strategy) = std::env::var("KB_REVIEW_STRATEGY") {
            config.generation.strategy = strategy.parse()?;
        }
        if let Ok(path) = std::env::var("KB_REVIEW_TEMPLATE") {
            config.generation.template_path = Some(PathBuf::from(path));
        }
        if let Ok(val) = std::env::var("KB_REVIEW_MAX_CODE_CHARS") {
            if let Ok(v) = val.parse() {
                config.generation.max_code_chars = v;
            }
        }
        if let Ok(val) = std::env::var("KB_REVIEW_RESULTS_PER_FINDING") {
            if let Ok(v) = val.parse::<usize>() {
                config.results_per_finding = v.max(1);
            }
        }
        if let Ok(val) = std::env::var("KB_REVIEW_SCAN_SOURCE") {
            config.scan_source = !matches!(val.trim(), "0" | "false" | "no" | "off");
        }
        if let Ok(val) = std::env::var("KB_REVIEW_ANALYZER_TIMEOUT_SECS") {
            if let Ok(v) = val.parse::<u64>() {
                config.analyzer_timeout_secs = v.max(1);
            }
        }
        if let Ok(cmd) = std::env::var("KB_REVIEW_ANALYZER_COMMAND") {
            if !cmd.trim().is_empty() {
                config.analyzer_command = Some(cmd);
            }
        }

        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            config.llm.model = model;
        }
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            config.llm.api_key = Some(key);
        }
        if let Ok(val) = std::env::var("LLM_TIMEOUT_SECS") {
            if let Ok(v) = val.parse() {
                config.llm.timeout_secs = v;
            }
        }
        if let Ok(val) = std::env::var("LLM_TEMPERATURE") {
            if let Ok(v) = val.parse() {
                config.llm.temperature = v;
            }
        }

        Ok(config)
    }

    /// Check the paths a run cannot proceed without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.kb_dir.is_dir() {
            return Err(ConfigError::MissingPath {
                what: "knowledge base directory",
                path: self.kb_dir.clone(),
                remedy: "pass --kb <DIR> or set KB_REVIEW_KB_DIR to a directory of entry JSON files",
            });
        }
        if self.index_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingPath {
                what: "index location",
                path: self.index_dir.clone(),
                remedy: "pass --index <DIR> or set KB_REVIEW_INDEX_DIR",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_kind_parses() {
        assert_eq!("template".parse::<StrategyKind>().unwrap(), StrategyKind::Template);
        assert_eq!(" Backend ".parse::<StrategyKind>().unwrap(), StrategyKind::Backend);
        assert!("magic".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn test_validate_reports_missing_kb_dir_with_remedy() {
        let config = Config {
            kb_dir: PathBuf::from("/definitely/not/here"),
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("knowledge base directory"));
        assert!(msg.contains("--kb"));
    }

    #[test]
    fn test_validate_accepts_existing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            kb_dir: dir.path().to_path_buf(),
            index_dir: dir.path().join("index"),
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_bound_generation() {
        let config = Config::default();
        assert_eq!(config.llm.timeout_secs, 60);
        assert_eq!(config.generation.max_prompt_findings, 5);
        assert!((500..=1000).contains(&config.generation.max_code_chars));
    }
}
