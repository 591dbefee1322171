use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{EngineError, Result};

/// A duration as it appears in configuration: raw milliseconds or a short
/// suffixed string (`"500ms"`, `"30s"`, `"5m"`, `"1h"`, `"2d"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DurationSpec {
    Millis(u64),
    Text(String),
}

impl DurationSpec {
    pub fn to_duration(&self) -> Result<Duration> {
        match self {
            DurationSpec::Millis(ms) => Ok(Duration::from_millis(*ms)),
            DurationSpec::Text(raw) => parse_duration_text(raw)
                .ok_or_else(|| EngineError::Configuration(format!("Invalid duration '{raw}'"))),
        }
    }

    pub fn as_millis(&self) -> Result<u64> {
        Ok(self.to_duration()?.as_millis() as u64)
    }
}

/// Parse a suffixed duration string. A bare number is taken as milliseconds.
fn parse_duration_text(raw: &str) -> Option<Duration> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(value) = trimmed.strip_suffix("ms") {
        return value.trim().parse::<u64>().ok().map(Duration::from_millis);
    }

    // Split on the last char's boundary; the suffix may be multibyte.
    let last = trimmed.chars().last()?;
    let (value, _) = trimmed.split_at(trimmed.len() - last.len_utf8());
    let scale_ms: u64 = match last {
        's' | 'S' => 1_000,
        'm' | 'M' => 60_000,
        'h' | 'H' => 3_600_000,
        'd' | 'D' => 86_400_000,
        _ => return trimmed.parse::<u64>().ok().map(Duration::from_millis),
    };

    value
        .trim()
        .parse::<u64>()
        .ok()
        .map(|v| Duration::from_millis(v * scale_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_suffixed_strings() {
        assert_eq!(
            DurationSpec::Text("500ms".into()).to_duration().unwrap(),
            Duration::from_millis(500)
        );
        assert_eq!(
            DurationSpec::Text("30s".into()).to_duration().unwrap(),
            Duration::from_secs(30)
        );
        assert_eq!(
            DurationSpec::Text("5m".into()).to_duration().unwrap(),
            Duration::from_secs(300)
        );
        assert_eq!(
            DurationSpec::Text("1h".into()).to_duration().unwrap(),
            Duration::from_secs(3_600)
        );
        assert_eq!(
            DurationSpec::Text("2d".into()).to_duration().unwrap(),
            Duration::from_secs(172_800)
        );
    }

    #[test]
    fn bare_numbers_are_milliseconds() {
        assert_eq!(
            DurationSpec::Millis(10).to_duration().unwrap(),
            Duration::from_millis(10)
        );
        assert_eq!(
            DurationSpec::Text("250".into()).to_duration().unwrap(),
            Duration::from_millis(250)
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(DurationSpec::Text("soon".into()).to_duration().is_err());
        assert!(DurationSpec::Text("".into()).to_duration().is_err());
    }

    #[test]
    fn multibyte_suffixes_are_rejected_cleanly() {
        assert!(DurationSpec::Text("5µ".into()).to_duration().is_err());
        assert!(DurationSpec::Text("µ".into()).to_duration().is_err());
        assert!(DurationSpec::Text("3時間".into()).to_duration().is_err());
    }

    #[test]
    fn deserializes_both_shapes() {
        let ms: DurationSpec = serde_json::from_str("750").unwrap();
        assert_eq!(ms, DurationSpec::Millis(750));
        let text: DurationSpec = serde_json::from_str("\"1h\"").unwrap();
        assert_eq!(text, DurationSpec::Text("1h".into()));
    }
}
