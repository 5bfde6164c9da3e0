use std::time::Duration;

/// Application-level constants
pub const APP_NAME: &str = "Dermascan";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Backend used when `DERMASCAN_API_URL` is not set.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Minimum symptom description length for a text-only analysis.
pub const MIN_SYMPTOM_CHARS: usize = 10;

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "info,dermascan=debug"
    } else {
        "info"
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?} ({reason})")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}

// ═══════════════════════════════════════════════════════════
// ScanConfig
// ═══════════════════════════════════════════════════════════

/// Backend endpoint paths, relative to `ScanConfig::api_url`.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub skin_check: String,
    pub analyze_image: String,
    pub analyze_text: String,
    /// Contains a `{id}` placeholder for the result identifier.
    pub share: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            skin_check: "/api/scan/skin-check".into(),
            analyze_image: "/api/scan/analyze".into(),
            analyze_text: "/api/scan/analyze-text".into(),
            share: "/api/scan/{id}/share".into(),
        }
    }
}

impl Endpoints {
    pub fn share_path(&self, result_id: &str) -> String {
        self.share.replace("{id}", result_id)
    }
}

/// Image Normalizer bounds.
#[derive(Debug, Clone)]
pub struct NormalizerLimits {
    /// Upper bound on the encoded upload payload.
    pub max_upload_bytes: usize,
    /// Longest side after bounding.
    pub max_dimension: u32,
    /// Raw inputs above this are rejected before decoding.
    pub max_raw_bytes: usize,
    /// JPEG qualities tried in order until the payload fits.
    pub jpeg_quality_ladder: Vec<u8>,
}

impl Default for NormalizerLimits {
    fn default() -> Self {
        Self {
            max_upload_bytes: 4 * 1024 * 1024,
            max_dimension: 1920,
            max_raw_bytes: 25 * 1024 * 1024,
            jpeg_quality_ladder: vec![85, 75, 60, 50, 40],
        }
    }
}

/// Cosmetic progress ticker parameters. Percentages.
#[derive(Debug, Clone)]
pub struct ProgressSettings {
    pub floor: u8,
    pub ceiling: u8,
    pub tick: Duration,
    pub min_step: u8,
    pub max_step: u8,
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            floor: 10,
            ceiling: 90,
            tick: Duration::from_millis(800),
            min_step: 1,
            max_step: 8,
        }
    }
}

/// Everything the scan pipeline needs to know about its environment.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub api_url: String,
    pub endpoints: Endpoints,
    pub connect_timeout: Duration,
    /// Per-request timeout for the two analysis endpoints.
    pub analysis_timeout: Duration,
    /// Per-request timeout for the skin classifier and the share call.
    pub classifier_timeout: Duration,
    pub limits: NormalizerLimits,
    pub progress: ProgressSettings,
    pub min_symptom_chars: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.into(),
            endpoints: Endpoints::default(),
            connect_timeout: Duration::from_secs(10),
            analysis_timeout: Duration::from_secs(120),
            classifier_timeout: Duration::from_secs(30),
            limits: NormalizerLimits::default(),
            progress: ProgressSettings::default(),
            min_symptom_chars: MIN_SYMPTOM_CHARS,
        }
    }
}

impl ScanConfig {
    /// Defaults overridden by `DERMASCAN_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as `from_env` with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("DERMASCAN_API_URL") {
            let trimmed = url.trim().trim_end_matches('/');
            if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
                return Err(ConfigError::InvalidValue {
                    var: "DERMASCAN_API_URL",
                    value: url,
                    reason: "expected an http(s) URL".into(),
                });
            }
            config.api_url = trimmed.to_string();
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "DERMASCAN_CONNECT_TIMEOUT_SECS")? {
            config.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "DERMASCAN_ANALYSIS_TIMEOUT_SECS")? {
            config.analysis_timeout = Duration::from_secs(secs);
        }
        if let Some(bytes) = parse_var::<usize>(&lookup, "DERMASCAN_MAX_UPLOAD_BYTES")? {
            config.limits.max_upload_bytes = bytes;
        }
        if let Some(dim) = parse_var::<u32>(&lookup, "DERMASCAN_MAX_DIMENSION")? {
            if dim == 0 {
                return Err(ConfigError::InvalidValue {
                    var: "DERMASCAN_MAX_DIMENSION",
                    value: dim.to_string(),
                    reason: "must be positive".into(),
                });
            }
            config.limits.max_dimension = dim;
        }

        Ok(config)
    }

    /// Absolute URL for an endpoint path.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                var,
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_bounds() {
        let config = ScanConfig::default();
        assert_eq!(config.limits.max_upload_bytes, 4 * 1024 * 1024);
        assert_eq!(config.limits.max_dimension, 1920);
        assert_eq!(config.min_symptom_chars, 10);
        assert!(config.progress.floor < config.progress.ceiling);
        assert!(config.progress.ceiling < 100);
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = ScanConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn env_overrides_apply() {
        let config = ScanConfig::from_lookup(lookup_from(&[
            ("DERMASCAN_API_URL", "https://api.example.org/"),
            ("DERMASCAN_ANALYSIS_TIMEOUT_SECS", "45"),
            ("DERMASCAN_MAX_DIMENSION", "1024"),
        ]))
        .unwrap();
        assert_eq!(config.api_url, "https://api.example.org");
        assert_eq!(config.analysis_timeout, Duration::from_secs(45));
        assert_eq!(config.limits.max_dimension, 1024);
    }

    #[test]
    fn invalid_number_is_an_error() {
        let err = ScanConfig::from_lookup(lookup_from(&[(
            "DERMASCAN_CONNECT_TIMEOUT_SECS",
            "soon",
        )]))
        .unwrap_err();
        assert!(err.to_string().contains("DERMASCAN_CONNECT_TIMEOUT_SECS"));
    }

    #[test]
    fn non_http_url_rejected() {
        let result = ScanConfig::from_lookup(lookup_from(&[("DERMASCAN_API_URL", "ftp://x")]));
        assert!(result.is_err());
    }

    #[test]
    fn zero_dimension_rejected() {
        let result = ScanConfig::from_lookup(lookup_from(&[("DERMASCAN_MAX_DIMENSION", "0")]));
        assert!(result.is_err());
    }

    #[test]
    fn share_path_substitutes_id() {
        let endpoints = Endpoints::default();
        assert_eq!(endpoints.share_path("abc-1"), "/api/scan/abc-1/share");
    }

    #[test]
    fn url_joins_base_and_path() {
        let config = ScanConfig::default();
        assert_eq!(
            config.url("/api/scan/analyze"),
            "http://localhost:8000/api/scan/analyze"
        );
    }

    #[test]
    fn app_name_is_dermascan() {
        assert_eq!(APP_NAME, "Dermascan");
    }
}
