use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::capability::CapabilityClass;
use crate::error::StocklensError;
use crate::providers::Generation;

const MAX_CONFIG_FILE_SIZE: u64 = 64 * 1024; // 64 KiB

/// Configuration shipped with the binary.
pub const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

// --- TOML deserialization structs (private, map 1:1 to TOML schema) ---

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    run: RunSection,
    #[serde(default)]
    generation: GenerationSection,
    #[serde(default)]
    classes: ClassesSection,
    #[serde(default)]
    providers: BTreeMap<String, ProviderSection>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RunSection {
    stocks_path: PathBuf,
    screenshots_dir: PathBuf,
    results_path: PathBuf,
    mirror_results_path: Option<PathBuf>,
    #[serde(default)]
    pipeline: Pipeline,
    #[serde(default)]
    request_delay_ms: u64,
    request_timeout_secs: u64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GenerationSection {
    temperature: f32,
    max_tokens: u32,
}

impl Default for GenerationSection {
    fn default() -> Self {
        let defaults = Generation::default();
        Self {
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ClassesSection {
    #[serde(default)]
    vision: ClassSection,
    #[serde(default)]
    text: ClassSection,
    #[serde(default)]
    reasoning: ClassSection,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ClassSection {
    #[serde(default)]
    priority: Vec<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ProviderSection {
    kind: ProviderKind,
    display_name: String,
    base_url: String,
    api_key_env: Option<String>,
    #[serde(default)]
    api_key_envs: Vec<String>,
    account_id_env: Option<String>,
    api_token_env: Option<String>,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    models: ModelsSection,
}

#[derive(Deserialize, Clone, Copy)]
#[serde(rename_all = "snake_case")]
enum ProviderKind {
    OpenaiCompatible,
    Gemini,
    Cloudflare,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ModelsSection {
    #[serde(default)]
    vision: Vec<String>,
    #[serde(default)]
    text: Vec<String>,
    #[serde(default)]
    reasoning: Vec<String>,
}

// --- Compiled configuration ---

/// How each stock moves through the providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pipeline {
    /// One vision call returns extraction, report and prediction together.
    #[default]
    Combined,
    /// Vision OCR, then a text report, then a reasoning prediction.
    Phased,
}

#[derive(Debug, Clone)]
pub struct RunSettings {
    pub stocks_path: PathBuf,
    pub screenshots_dir: PathBuf,
    pub results_path: PathBuf,
    pub mirror_results_path: Option<PathBuf>,
    pub pipeline: Pipeline,
    pub request_delay: Duration,
    pub request_timeout: Duration,
}

/// Credential wiring per backend family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    OpenAiCompatible {
        api_key_env: String,
        headers: Vec<(String, String)>,
    },
    Gemini {
        api_key_envs: Vec<String>,
    },
    Cloudflare {
        account_id_env: String,
        api_token_env: String,
    },
}

#[derive(Debug, Clone)]
pub struct ProviderSpec {
    pub key: String,
    pub display_name: String,
    pub base_url: String,
    pub backend: Backend,
    models: BTreeMap<CapabilityClass, Vec<String>>,
}

impl ProviderSpec {
    pub fn models(&self, class: CapabilityClass) -> &[String] {
        self.models
            .get(&class)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

pub struct Config {
    pub run: RunSettings,
    pub generation: Generation,
    priorities: BTreeMap<CapabilityClass, Vec<String>>,
    providers: BTreeMap<String, ProviderSpec>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("pipeline", &self.run.pipeline)
            .field("provider_count", &self.providers.len())
            .finish()
    }
}

impl FromStr for Config {
    type Err = StocklensError;

    /// Parse and validate a configuration from a TOML string.
    fn from_str(content: &str) -> Result<Self, StocklensError> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| StocklensError::ConfigLoad(e.to_string()))?;
        compile(file)
    }
}

impl Config {
    /// Load a configuration from a TOML file. Checks file size before reading.
    pub fn load(path: &Path) -> Result<Self, StocklensError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            StocklensError::ConfigLoad(format!("cannot read {}: {e}", path.display()))
        })?;

        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(StocklensError::ConfigLoad(format!(
                "config file exceeds {MAX_CONFIG_FILE_SIZE} byte limit"
            )));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            StocklensError::ConfigLoad(format!("cannot read {}: {e}", path.display()))
        })?;

        content.parse()
    }

    /// `path` when given, otherwise the built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, StocklensError> {
        match path {
            Some(path) => Self::load(path),
            None => DEFAULT_CONFIG.parse(),
        }
    }

    /// Provider keys for `class`, highest priority first.
    pub fn priority(&self, class: CapabilityClass) -> &[String] {
        self.priorities
            .get(&class)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn provider(&self, key: &str) -> Option<&ProviderSpec> {
        self.providers.get(key)
    }
}

fn compile(file: ConfigFile) -> Result<Config, StocklensError> {
    if file.run.request_timeout_secs == 0 {
        return Err(StocklensError::ConfigValidation(
            "run.request_timeout_secs must be greater than zero".to_owned(),
        ));
    }

    let providers = file
        .providers
        .into_iter()
        .map(|(key, section)| compile_provider(key, section).map(|spec| (spec.key.clone(), spec)))
        .collect::<Result<BTreeMap<_, _>, _>>()?;

    let mut priorities = BTreeMap::new();
    for (class, section) in [
        (CapabilityClass::Vision, file.classes.vision),
        (CapabilityClass::Text, file.classes.text),
        (CapabilityClass::Reasoning, file.classes.reasoning),
    ] {
        let mut seen = HashSet::new();
        for key in &section.priority {
            if !seen.insert(key.as_str()) {
                return Err(StocklensError::ConfigValidation(format!(
                    "class '{class}': provider '{key}' listed more than once"
                )));
            }
            let spec = providers.get(key).ok_or_else(|| {
                StocklensError::ConfigValidation(format!(
                    "class '{class}': unknown provider '{key}'"
                ))
            })?;
            if spec.models(class).is_empty() {
                return Err(StocklensError::ConfigValidation(format!(
                    "provider '{key}' is listed for class '{class}' but has no {class} models"
                )));
            }
        }
        priorities.insert(class, section.priority);
    }

    Ok(Config {
        run: RunSettings {
            stocks_path: file.run.stocks_path,
            screenshots_dir: file.run.screenshots_dir,
            results_path: file.run.results_path,
            mirror_results_path: file.run.mirror_results_path,
            pipeline: file.run.pipeline,
            request_delay: Duration::from_millis(file.run.request_delay_ms),
            request_timeout: Duration::from_secs(file.run.request_timeout_secs),
        },
        generation: Generation {
            temperature: file.generation.temperature,
            max_tokens: file.generation.max_tokens,
        },
        priorities,
        providers,
    })
}

fn compile_provider(key: String, section: ProviderSection) -> Result<ProviderSpec, StocklensError> {
    let missing = |field: &str| {
        StocklensError::ConfigValidation(format!("provider '{key}': missing '{field}'"))
    };

    let backend = match section.kind {
        ProviderKind::OpenaiCompatible => Backend::OpenAiCompatible {
            api_key_env: section.api_key_env.ok_or_else(|| missing("api_key_env"))?,
            headers: section.headers.into_iter().collect(),
        },
        ProviderKind::Gemini => {
            if section.api_key_envs.is_empty() {
                return Err(missing("api_key_envs"));
            }
            Backend::Gemini {
                api_key_envs: section.api_key_envs,
            }
        }
        ProviderKind::Cloudflare => Backend::Cloudflare {
            account_id_env: section.account_id_env.ok_or_else(|| missing("account_id_env"))?,
            api_token_env: section.api_token_env.ok_or_else(|| missing("api_token_env"))?,
        },
    };

    let models = [
        (CapabilityClass::Vision, section.models.vision),
        (CapabilityClass::Text, section.models.text),
        (CapabilityClass::Reasoning, section.models.reasoning),
    ]
    .into_iter()
    .filter(|(_, models)| !models.is_empty())
    .collect();

    Ok(ProviderSpec {
        key,
        display_name: section.display_name,
        base_url: section.base_url,
        backend,
        models,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[run]
stocks_path = "stocks.json"
screenshots_dir = "shots"
results_path = "out.json"
request_timeout_secs = 30

[classes.text]
priority = ["groq"]

[providers.groq]
kind = "openai_compatible"
display_name = "Groq"
base_url = "http://localhost"
api_key_env = "GROQ_API_KEY"

[providers.groq.models]
text = ["llama"]
"#;

    #[test]
    fn parse_default_config() {
        let config = Config::from_str(DEFAULT_CONFIG).expect("default config should parse");
        assert_eq!(config.run.pipeline, Pipeline::Combined);
        assert_eq!(config.run.request_delay, Duration::from_millis(1500));
        assert_eq!(
            config.priority(CapabilityClass::Vision),
            ["openrouter", "gemini", "groq", "cloudflare"]
        );
        let gemini = config.provider("gemini").expect("gemini should exist");
        assert!(matches!(&gemini.backend, Backend::Gemini { api_key_envs } if api_key_envs.len() == 3));
        assert_eq!(gemini.models(CapabilityClass::Reasoning).len(), 2);
        let openrouter = config.provider("openrouter").expect("openrouter should exist");
        match &openrouter.backend {
            Backend::OpenAiCompatible { headers, .. } => assert_eq!(headers.len(), 2),
            other => panic!("unexpected backend {other:?}"),
        }
    }

    #[test]
    fn minimal_config_defaults() {
        let config = Config::from_str(MINIMAL).expect("minimal config should parse");
        assert_eq!(config.run.pipeline, Pipeline::Combined);
        assert_eq!(config.run.request_delay, Duration::ZERO);
        assert!(config.run.mirror_results_path.is_none());
        assert_eq!(config.generation, Generation::default());
        assert!(config.priority(CapabilityClass::Vision).is_empty());
        assert_eq!(config.priority(CapabilityClass::Text), ["groq"]);
    }

    #[test]
    fn unknown_provider_in_priority() {
        let toml = MINIMAL.replace(r#"priority = ["groq"]"#, r#"priority = ["groq", "mistral"]"#);
        let err = Config::from_str(&toml).unwrap_err();
        assert!(matches!(err, StocklensError::ConfigValidation(ref m) if m.contains("mistral")));
    }

    #[test]
    fn duplicate_priority_entry() {
        let toml = MINIMAL.replace(r#"priority = ["groq"]"#, r#"priority = ["groq", "groq"]"#);
        let err = Config::from_str(&toml).unwrap_err();
        assert!(matches!(err, StocklensError::ConfigValidation(_)));
    }

    #[test]
    fn provider_without_models_for_class() {
        let toml = format!("{MINIMAL}\n[classes.vision]\npriority = [\"groq\"]\n");
        let err = Config::from_str(&toml).unwrap_err();
        assert!(matches!(err, StocklensError::ConfigValidation(ref m) if m.contains("vision")));
    }

    #[test]
    fn zero_timeout_rejected() {
        let toml = MINIMAL.replace("request_timeout_secs = 30", "request_timeout_secs = 0");
        let err = Config::from_str(&toml).unwrap_err();
        assert!(matches!(err, StocklensError::ConfigValidation(_)));
    }

    #[test]
    fn unknown_toml_field() {
        let toml = MINIMAL.replace("[run]\n", "[run]\nsurprise = true\n");
        let err = Config::from_str(&toml).unwrap_err();
        assert!(matches!(err, StocklensError::ConfigLoad(_)));
    }

    #[test]
    fn unknown_provider_kind() {
        let toml = MINIMAL.replace("openai_compatible", "carrier_pigeon");
        let err = Config::from_str(&toml).unwrap_err();
        assert!(matches!(err, StocklensError::ConfigLoad(_)));
    }

    #[test]
    fn missing_credential_field() {
        let toml = MINIMAL.replace("api_key_env = \"GROQ_API_KEY\"\n", "");
        let err = Config::from_str(&toml).unwrap_err();
        assert!(matches!(err, StocklensError::ConfigValidation(ref m) if m.contains("api_key_env")));
    }

    #[test]
    fn load_rejects_oversized_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.toml");
        std::fs::write(&path, "#".repeat((MAX_CONFIG_FILE_SIZE + 1) as usize)).unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, StocklensError::ConfigLoad(ref m) if m.contains("limit")));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stocklens.toml");
        std::fs::write(&path, MINIMAL).unwrap();
        let config = Config::load_or_default(Some(&path)).unwrap();
        assert_eq!(config.priority(CapabilityClass::Text), ["groq"]);
    }
}
