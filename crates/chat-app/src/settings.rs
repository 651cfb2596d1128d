use std::path::{Path, PathBuf};

use figment::{
    Figment, Provider,
    providers::{Env, Format, Json, Serialized},
};
use lumen_llm::{DEFAULT_GEMINI_MODEL, ProviderConfig, RIG_GEMINI_PROVIDER_ID, ResponseMode};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use snafu::{ResultExt, Snafu};

pub const DEFAULT_PROVIDER_ID: &str = RIG_GEMINI_PROVIDER_ID;
pub const SETTINGS_DIRECTORY_NAME: &str = "lumen";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "LUMEN_";
/// Credential variables consulted when no key is configured explicitly.
pub const FALLBACK_API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "GOOGLE_GENAI_API_KEY"];

/// Env values are parsed by figment, so `LUMEN_API_KEY=12345` arrives as a number.
/// String fields accept any scalar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_provider_id", deserialize_with = "deserialize_scalar_string")]
    pub provider_id: String,
    #[serde(default, deserialize_with = "deserialize_scalar_string")]
    pub api_key: String,
    #[serde(default = "default_model", deserialize_with = "deserialize_scalar_string")]
    pub model: String,
    #[serde(default, deserialize_with = "deserialize_scalar_string")]
    pub endpoint: String,
    #[serde(
        default,
        serialize_with = "serialize_response_mode",
        deserialize_with = "deserialize_response_mode"
    )]
    pub response_mode: ResponseMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider_id: default_provider_id(),
            api_key: String::new(),
            model: default_model(),
            endpoint: String::new(),
            response_mode: ResponseMode::default(),
        }
    }
}

impl Settings {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".lumen"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    /// Layers defaults, the JSON file at `path` (if present) and `LUMEN_*`
    /// environment variables, in that order.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        if path.exists() {
            figment = figment.merge(Json::file(path));
        } else {
            tracing::info!("settings file not found at {:?}, using defaults", path);
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX));

        let settings = Self::extract(figment)?;
        Ok(settings.with_fallback_api_key(|name| std::env::var(name).ok()))
    }

    /// A value that cannot be read only resets its own field; an unreadable
    /// source (malformed JSON) fails the whole load.
    fn extract(figment: Figment) -> Result<Self, SettingsError> {
        match figment.extract::<Settings>() {
            Ok(settings) => Ok(settings.normalized()),
            Err(error) => {
                tracing::warn!(
                    error = %error,
                    "invalid settings value, keeping the readable fields"
                );
                Self::extract_fields(&figment)
            }
        }
    }

    fn extract_fields(figment: &Figment) -> Result<Self, SettingsError> {
        figment.data().context(ExtractSnafu {
            stage: "read-settings-sources",
        })?;

        let defaults = Settings::default();
        let field = |key: &str, fallback: String| {
            match figment.extract_inner::<ScalarString>(key) {
                Ok(ScalarString(value)) => value,
                Err(error) => {
                    if !error.missing() {
                        tracing::warn!(key, error = %error, "ignoring invalid settings value");
                    }
                    fallback
                }
            }
        };

        let response_mode = figment
            .extract_inner::<ScalarString>("response_mode")
            .map(|ScalarString(value)| parse_response_mode(&value))
            .unwrap_or(defaults.response_mode);

        let settings = Settings {
            provider_id: field("provider_id", defaults.provider_id.clone()),
            api_key: field("api_key", defaults.api_key.clone()),
            model: field("model", defaults.model.clone()),
            endpoint: field("endpoint", defaults.endpoint.clone()),
            response_mode,
        };
        Ok(settings.normalized())
    }

    /// Fills a blank key from the first non-empty fallback variable.
    pub fn with_fallback_api_key(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if !self.api_key.is_empty() {
            return self;
        }

        if let Some(key) = FALLBACK_API_KEY_VARS
            .iter()
            .filter_map(|name| lookup(name))
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty())
        {
            self.api_key = key;
        }
        self
    }

    pub fn normalized(mut self) -> Self {
        self.provider_id = if self.provider_id.trim().is_empty() {
            default_provider_id()
        } else {
            self.provider_id.trim().to_string()
        };
        self.api_key = self.api_key.trim().to_string();
        self.model = if self.model.trim().is_empty() {
            default_model()
        } else {
            self.model.trim().to_string()
        };
        self.endpoint = self.endpoint.trim().to_string();
        self
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// A missing key is passed through; the backend rejects the first request.
    pub fn to_provider_config(&self) -> ProviderConfig {
        ProviderConfig::new(&self.provider_id, &self.api_key, &self.endpoint)
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to load settings on `{stage}`: {source}"))]
    Extract {
        stage: &'static str,
        source: figment::Error,
    },
}

fn default_provider_id() -> String {
    DEFAULT_PROVIDER_ID.to_string()
}

fn default_model() -> String {
    DEFAULT_GEMINI_MODEL.to_string()
}

fn serialize_response_mode<S>(value: &ResponseMode, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(match value {
        ResponseMode::Streaming => "streaming",
        ResponseMode::SingleShot => "single-shot",
    })
}

fn deserialize_response_mode<'de, D>(deserializer: D) -> Result<ResponseMode, D::Error>
where
    D: Deserializer<'de>,
{
    let ScalarString(value) = ScalarString::deserialize(deserializer)?;
    Ok(parse_response_mode(&value))
}

fn deserialize_scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    ScalarString::deserialize(deserializer).map(|ScalarString(value)| value)
}

/// Any string, number, bool or char, kept in its textual form.
struct ScalarString(String);

impl<'de> Deserialize<'de> for ScalarString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(ScalarStringVisitor)
    }
}

struct ScalarStringVisitor;

impl Visitor<'_> for ScalarStringVisitor {
    type Value = ScalarString;

    fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("a string, number or bool")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        Ok(ScalarString(value.to_string()))
    }

    fn visit_string<E: de::Error>(self, value: String) -> Result<Self::Value, E> {
        Ok(ScalarString(value))
    }

    fn visit_char<E: de::Error>(self, value: char) -> Result<Self::Value, E> {
        Ok(ScalarString(value.to_string()))
    }

    fn visit_bool<E: de::Error>(self, value: bool) -> Result<Self::Value, E> {
        Ok(ScalarString(value.to_string()))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
        Ok(ScalarString(value.to_string()))
    }

    fn visit_i128<E: de::Error>(self, value: i128) -> Result<Self::Value, E> {
        Ok(ScalarString(value.to_string()))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
        Ok(ScalarString(value.to_string()))
    }

    fn visit_u128<E: de::Error>(self, value: u128) -> Result<Self::Value, E> {
        Ok(ScalarString(value.to_string()))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Self::Value, E> {
        Ok(ScalarString(value.to_string()))
    }
}

fn parse_response_mode(value: &str) -> ResponseMode {
    match value.trim().to_ascii_lowercase().as_str() {
        "single-shot" | "single_shot" | "singleshot" | "single" => ResponseMode::SingleShot,
        _ => ResponseMode::Streaming,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_json(json: &str) -> Settings {
        let figment =
            Figment::from(Serialized::defaults(Settings::default())).merge(Json::string(json));
        Settings::extract(figment).unwrap()
    }

    #[test]
    fn defaults_target_gemini_streaming() {
        let settings = Settings::default();
        assert_eq!(settings.provider_id, "gemini");
        assert_eq!(settings.model, "gemini-2.5-flash");
        assert_eq!(settings.response_mode, ResponseMode::Streaming);
        assert!(!settings.has_api_key());
    }

    #[test]
    fn json_overrides_are_normalized() {
        let settings = from_json(
            r#"{ "provider_id": "  ", "api_key": " secret ", "model": " gemini-2.5-pro ",
                 "response_mode": "Single-Shot" }"#,
        );
        assert_eq!(settings.provider_id, "gemini");
        assert_eq!(settings.api_key, "secret");
        assert_eq!(settings.model, "gemini-2.5-pro");
        assert_eq!(settings.response_mode, ResponseMode::SingleShot);
    }

    #[test]
    fn blank_model_restores_default() {
        let settings = from_json(r#"{ "model": "" }"#);
        assert_eq!(settings.model, DEFAULT_GEMINI_MODEL);
    }

    #[test]
    fn fallback_key_fills_only_blank_key() {
        let lookup = |name: &str| match name {
            "GEMINI_API_KEY" => Some("  ".to_string()),
            "GOOGLE_GENAI_API_KEY" => Some("from-env".to_string()),
            _ => None,
        };

        let filled = Settings::default().with_fallback_api_key(lookup);
        assert_eq!(filled.api_key, "from-env");

        let explicit = Settings {
            api_key: "configured".to_string(),
            ..Settings::default()
        }
        .with_fallback_api_key(lookup);
        assert_eq!(explicit.api_key, "configured");
    }

    #[test]
    fn numeric_and_bool_env_values_load_as_strings() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(SETTINGS_FILE_NAME, r#"{ "model": "gemini-2.5-pro" }"#)?;
            jail.set_env("LUMEN_API_KEY", "12345");
            jail.set_env("LUMEN_ENDPOINT", "true");

            let settings =
                Settings::load(Path::new(SETTINGS_FILE_NAME)).map_err(|error| error.to_string())?;

            assert_eq!(settings.api_key, "12345");
            assert_eq!(settings.endpoint, "true");
            assert_eq!(settings.model, "gemini-2.5-pro");
            Ok(())
        });
    }

    #[test]
    fn env_overrides_file_values() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                SETTINGS_FILE_NAME,
                r#"{ "api_key": "from-file", "response_mode": "single-shot" }"#,
            )?;
            jail.set_env("LUMEN_API_KEY", "from-env");

            let settings =
                Settings::load(Path::new(SETTINGS_FILE_NAME)).map_err(|error| error.to_string())?;

            assert_eq!(settings.api_key, "from-env");
            assert_eq!(settings.response_mode, ResponseMode::SingleShot);
            Ok(())
        });
    }

    #[test]
    fn one_invalid_value_keeps_the_rest_of_the_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                SETTINGS_FILE_NAME,
                r#"{ "api_key": "kept", "model": ["not", "a", "model"], "endpoint": "https://example.test" }"#,
            )?;

            let settings =
                Settings::load(Path::new(SETTINGS_FILE_NAME)).map_err(|error| error.to_string())?;

            assert_eq!(settings.api_key, "kept");
            assert_eq!(settings.model, DEFAULT_GEMINI_MODEL);
            assert_eq!(settings.endpoint, "https://example.test");
            Ok(())
        });
    }

    #[test]
    fn malformed_file_is_an_error() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(SETTINGS_FILE_NAME, "{ not json")?;

            let result = Settings::load(Path::new(SETTINGS_FILE_NAME));

            assert!(matches!(result, Err(SettingsError::Extract { .. })));
            Ok(())
        });
    }

    #[test]
    fn missing_key_still_produces_provider_config() {
        let config = Settings::default().to_provider_config();
        assert_eq!(config.provider_id, "gemini");
        assert!(config.api_key.is_empty());
    }
}
