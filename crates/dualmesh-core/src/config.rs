//! Serde helpers shared by the configuration types of every crate
//!
//! Durations are written the human way (`"5s"`, `"48h"`, `"10m"`) in TOML
//! configuration files.

/// Serde module for `Duration` fields using humantime notation
///
/// ```rust
/// use serde::{Deserialize, Serialize};
/// use std::time::Duration;
///
/// #[derive(Serialize, Deserialize)]
/// struct Example {
///     #[serde(with = "dualmesh_core::config::humantime_serde")]
///     window: Duration,
/// }
/// ```
pub mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        #[serde(with = "super::humantime_serde")]
        window: Duration,
    }

    #[test]
    fn test_parse_humantime() {
        let sample: Sample = toml::from_str("window = \"5s\"").unwrap();
        assert_eq!(sample.window, Duration::from_secs(5));

        let sample: Sample = toml::from_str("window = \"48h\"").unwrap();
        assert_eq!(sample.window, Duration::from_secs(48 * 3600));
    }

    #[test]
    fn test_serialize_humantime() {
        let json = serde_json::to_string(&Sample {
            window: Duration::from_secs(90),
        })
        .unwrap();
        assert_eq!(json, r#"{"window":"1m 30s"}"#);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(toml::from_str::<Sample>("window = \"soon\"").is_err());
    }
}
