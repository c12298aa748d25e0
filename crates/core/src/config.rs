use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

pub const DEFAULT_TICK_MS: u64 = 2000;
pub const DEFAULT_FRAME_SIZE: usize = 2048;
pub const DEFAULT_HOP_SIZE: usize = 512;
pub const DEFAULT_CAPTURE_WINDOW_MS: u64 = 3000;
pub const DEFAULT_SESSION_SECS: u64 = 30;
pub const ENV_MODEL_PATH: &str = "VOCAL_EMOTION_MODEL";
pub const ENV_TICK_MS: &str = "VOCAL_EMOTION_TICK_MS";

const MIN_FRAME_SIZE: usize = 16;

/// Period of the inference scheduler. Always at least 1 ms.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "RawTickInterval")]
pub struct TickInterval {
    period_ms: u64,
}

#[derive(Deserialize)]
struct RawTickInterval {
    period_ms: u64,
}

impl TryFrom<RawTickInterval> for TickInterval {
    type Error = ConfigError;

    fn try_from(raw: RawTickInterval) -> Result<Self, Self::Error> {
        Self::new(raw.period_ms)
    }
}

impl TickInterval {
    pub fn new(period_ms: u64) -> Result<Self, ConfigError> {
        if period_ms == 0 {
            return Err(ConfigError::ZeroTickInterval);
        }
        Ok(Self { period_ms })
    }

    pub fn period_ms(&self) -> u64 {
        self.period_ms
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

impl Default for TickInterval {
    fn default() -> Self {
        Self {
            period_ms: DEFAULT_TICK_MS,
        }
    }
}

/// Framing parameters shared by every frame-based feature group.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "RawExtractorConfig")]
pub struct ExtractorConfig {
    frame_size: usize,
    hop_size: usize,
}

#[derive(Deserialize)]
struct RawExtractorConfig {
    frame_size: usize,
    hop_size: usize,
}

impl TryFrom<RawExtractorConfig> for ExtractorConfig {
    type Error = ConfigError;

    fn try_from(raw: RawExtractorConfig) -> Result<Self, Self::Error> {
        Self::new(raw.frame_size, raw.hop_size)
    }
}

impl ExtractorConfig {
    pub fn new(frame_size: usize, hop_size: usize) -> Result<Self, ConfigError> {
        if frame_size < MIN_FRAME_SIZE {
            return Err(ConfigError::FrameTooSmall(frame_size));
        }
        if hop_size == 0 || hop_size > frame_size {
            return Err(ConfigError::InvalidHop {
                hop: hop_size,
                frame: frame_size,
            });
        }
        Ok(Self {
            frame_size,
            hop_size,
        })
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            frame_size: DEFAULT_FRAME_SIZE,
            hop_size: DEFAULT_HOP_SIZE,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum AudioInput {
    /// No capture device; the session runs on the simulator only.
    Simulated,
    Wav(PathBuf),
    Silence { sample_rate: u32 },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    pub input: AudioInput,
    pub model_path: Option<PathBuf>,
    pub tick: TickInterval,
    pub extractor: ExtractorConfig,
    pub session_length: Duration,
    pub seed: Option<u64>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("tick interval must be > 0 ms")]
    ZeroTickInterval,
    #[error("frame size must be at least 16 samples, got {0}")]
    FrameTooSmall(usize),
    #[error("hop size must be in 1..={frame}, got {hop}")]
    InvalidHop { hop: usize, frame: usize },
    #[error("session length must be > 0 s")]
    ZeroSessionLength,
    #[error("invalid value for {key}: {value}")]
    InvalidEnvValue { key: String, value: String },
}

pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Clone, Debug, Default)]
pub struct StdEnv;

impl Env for StdEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MapEnv {
    vars: std::collections::BTreeMap<String, String>,
}

impl MapEnv {
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_owned(), value.to_owned());
        self
    }
}

impl Env for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn resolve_optional_path(
    cli_value: Option<PathBuf>,
    env_key: &str,
    env: &impl Env,
) -> Option<PathBuf> {
    match cli_value {
        Some(v) => Some(v),
        None => env.var(env_key).filter(|v| !v.trim().is_empty()).map(PathBuf::from),
    }
}

pub fn resolve_u64_with_default(
    cli_value: Option<u64>,
    env_key: &str,
    env: &impl Env,
    default: u64,
) -> Result<u64, ConfigError> {
    match cli_value {
        Some(v) => Ok(v),
        None => match env.var(env_key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnvValue {
                    key: env_key.to_owned(),
                    value: raw,
                }),
            None => Ok(default),
        },
    }
}

pub fn session_length(secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::ZeroSessionLength);
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_interval_rejects_zero() {
        assert_eq!(TickInterval::new(0), Err(ConfigError::ZeroTickInterval));
        let t = TickInterval::new(250).expect("nonzero");
        assert_eq!(t.duration(), Duration::from_millis(250));
    }

    #[test]
    fn extractor_config_validates_hop() {
        assert!(ExtractorConfig::new(2048, 512).is_ok());
        assert_eq!(
            ExtractorConfig::new(2048, 0),
            Err(ConfigError::InvalidHop { hop: 0, frame: 2048 })
        );
        assert_eq!(
            ExtractorConfig::new(256, 512),
            Err(ConfigError::InvalidHop { hop: 512, frame: 256 })
        );
        assert_eq!(ExtractorConfig::new(8, 4), Err(ConfigError::FrameTooSmall(8)));
    }

    #[test]
    fn deserialized_tick_interval_is_validated() {
        let err = serde_json::from_str::<TickInterval>(r#"{"period_ms":0}"#).unwrap_err();
        assert!(err.to_string().contains("tick interval must be > 0 ms"));

        let t: TickInterval = serde_json::from_str(r#"{"period_ms":250}"#).unwrap();
        assert_eq!(t.period_ms(), 250);
        assert_eq!(serde_json::to_string(&t).unwrap(), r#"{"period_ms":250}"#);
    }

    #[test]
    fn deserialized_extractor_config_is_validated() {
        assert!(serde_json::from_str::<ExtractorConfig>(r#"{"frame_size":2048,"hop_size":0}"#).is_err());
        assert!(serde_json::from_str::<ExtractorConfig>(r#"{"frame_size":8,"hop_size":4}"#).is_err());

        let c: ExtractorConfig = serde_json::from_str(r#"{"frame_size":1024,"hop_size":256}"#).unwrap();
        assert_eq!((c.frame_size(), c.hop_size()), (1024, 256));
    }

    #[test]
    fn model_path_cli_takes_precedence_over_env() {
        let env = MapEnv::default().with_var(ENV_MODEL_PATH, "/env/model.json");
        let p = resolve_optional_path(Some(PathBuf::from("/cli/model.json")), ENV_MODEL_PATH, &env);
        assert_eq!(p, Some(PathBuf::from("/cli/model.json")));
    }

    #[test]
    fn model_path_env_used_when_cli_missing() {
        let env = MapEnv::default().with_var(ENV_MODEL_PATH, "/env/model.json");
        let p = resolve_optional_path(None, ENV_MODEL_PATH, &env);
        assert_eq!(p, Some(PathBuf::from("/env/model.json")));
    }

    #[test]
    fn blank_env_model_path_is_ignored() {
        let env = MapEnv::default().with_var(ENV_MODEL_PATH, "  ");
        assert_eq!(resolve_optional_path(None, ENV_MODEL_PATH, &env), None);
    }

    #[test]
    fn tick_ms_resolution_order() {
        let env = MapEnv::default().with_var(ENV_TICK_MS, "500");
        assert_eq!(resolve_u64_with_default(Some(100), ENV_TICK_MS, &env, 2000), Ok(100));
        assert_eq!(resolve_u64_with_default(None, ENV_TICK_MS, &env, 2000), Ok(500));
        let empty = MapEnv::default();
        assert_eq!(resolve_u64_with_default(None, ENV_TICK_MS, &empty, 2000), Ok(2000));
    }

    #[test]
    fn tick_ms_env_must_parse() {
        let env = MapEnv::default().with_var(ENV_TICK_MS, "fast");
        assert!(matches!(
            resolve_u64_with_default(None, ENV_TICK_MS, &env, 2000),
            Err(ConfigError::InvalidEnvValue { .. })
        ));
    }
}
