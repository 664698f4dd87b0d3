use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EasingSetting {
    #[default]
    Linear,
    Smoothstep,
    EaseInOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendSetting {
    #[default]
    Auto,
    Modern,
    Legacy,
    Raster,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SlideConfig {
    pub version: u32,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default = "default_effect")]
    pub effect: String,
    #[serde(default = "default_true")]
    pub autoplay: bool,
    #[serde(
        default = "default_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub autoplay_interval: Duration,
    #[serde(
        default = "default_transition",
        deserialize_with = "deserialize_duration"
    )]
    pub transition_duration: Duration,
    #[serde(
        default,
        deserialize_with = "deserialize_duration_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub decode_timeout: Option<Duration>,
    #[serde(default = "default_true", rename = "loop")]
    pub loop_enabled: bool,
    #[serde(default = "default_true")]
    pub allow_raster_fallback: bool,
    #[serde(default)]
    pub start_index: usize,
    #[serde(default, deserialize_with = "deserialize_easing")]
    pub easing: EasingSetting,
    #[serde(default, deserialize_with = "deserialize_backend")]
    pub backend: BackendSetting,
    #[serde(default)]
    pub surface: SurfaceConfig,
    #[serde(default)]
    pub effect_manifests: Vec<PathBuf>,
}

impl Default for SlideConfig {
    fn default() -> Self {
        Self {
            version: 1,
            images: Vec::new(),
            effect: default_effect(),
            autoplay: true,
            autoplay_interval: default_interval(),
            transition_duration: default_transition(),
            decode_timeout: None,
            loop_enabled: true,
            allow_raster_fallback: true,
            start_index: 0,
            easing: EasingSetting::default(),
            backend: BackendSetting::default(),
            surface: SurfaceConfig::default(),
            effect_manifests: Vec::new(),
        }
    }
}

fn default_effect() -> String {
    "fade".to_string()
}

fn default_true() -> bool {
    true
}

fn default_width() -> u32 {
    1280
}

fn default_height() -> u32 {
    720
}

fn default_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_transition() -> Duration {
    Duration::from_secs(1)
}

fn default_decode_timeout() -> Duration {
    Duration::from_secs(30)
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_duration_opt(deserializer).map(|d| d.unwrap_or_default())
}

fn deserialize_duration_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Option<Duration>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            parse_duration(v).map(Some).map_err(E::custom)
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(Duration::from_secs(v)))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs(v as u64)))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Duration::try_from_secs_f64(v)
                .map(Some)
                .map_err(|err| E::custom(format!("duration {v} is out of range: {err}")))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(Visitor)
}

/// Parses `"750ms"`, `"2s"` or a bare number of seconds (`"1.5"`).
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let trimmed = raw.trim();
    if let Ok(seconds) = trimmed.parse::<f64>() {
        if seconds.is_nan() || seconds.is_sign_negative() {
            return Err(format!("invalid duration '{raw}': must be non-negative"));
        }
        return Duration::try_from_secs_f64(seconds)
            .map_err(|err| format!("invalid duration '{raw}': {err}"));
    }
    humantime::parse_duration(trimmed).map_err(|err| format!("invalid duration '{raw}': {err}"))
}

fn deserialize_easing<'de, D>(deserializer: D) -> Result<EasingSetting, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_easing(&raw).map_err(de::Error::custom)
}

fn deserialize_backend<'de, D>(deserializer: D) -> Result<BackendSetting, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_backend(&raw).map_err(de::Error::custom)
}

pub fn parse_easing(raw: &str) -> Result<EasingSetting, String> {
    let normalized = raw.trim().to_ascii_lowercase().replace('_', "-");
    match normalized.as_str() {
        "linear" | "none" => Ok(EasingSetting::Linear),
        "smoothstep" | "smooth" => Ok(EasingSetting::Smoothstep),
        "ease-in-out" | "easeinout" | "ease" => Ok(EasingSetting::EaseInOut),
        other => Err(format!("invalid easing '{other}'")),
    }
}

pub fn parse_backend(raw: &str) -> Result<BackendSetting, String> {
    let normalized = raw.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "auto" | "default" => Ok(BackendSetting::Auto),
        "modern" | "gpu" => Ok(BackendSetting::Modern),
        "legacy" | "gl" => Ok(BackendSetting::Legacy),
        "raster" | "cpu" | "software" => Ok(BackendSetting::Raster),
        other => Err(format!("invalid backend '{other}'")),
    }
}

impl SlideConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: SlideConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn decode_timeout(&self) -> Duration {
        self.decode_timeout.unwrap_or_else(default_decode_timeout)
    }

    /// Resolves relative manifest paths against the directory holding the config file.
    pub fn resolve_relative_to(&mut self, base: &std::path::Path) {
        for manifest in &mut self.effect_manifests {
            if manifest.is_relative() {
                *manifest = base.join(&*manifest);
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        if self.effect.trim().is_empty() {
            return Err(ConfigError::Invalid("effect may not be empty".into()));
        }

        for (index, image) in self.images.iter().enumerate() {
            if image.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "images[{index}] must not be empty"
                )));
            }
        }

        if !self.images.is_empty() && self.start_index >= self.images.len() {
            return Err(ConfigError::Invalid(format!(
                "start_index {} is out of range for {} images",
                self.start_index,
                self.images.len()
            )));
        }

        if self.autoplay && self.autoplay_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "autoplay_interval must be greater than zero when autoplay is enabled".into(),
            ));
        }

        if let Some(timeout) = self.decode_timeout {
            if timeout.is_zero() {
                return Err(ConfigError::Invalid(
                    "decode_timeout must be greater than zero".into(),
                ));
            }
        }

        if self.surface.width == 0 || self.surface.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "surface dimensions must be non-zero (got {}x{})",
                self.surface.width, self.surface.height
            )));
        }

        Ok(())
    }
}
