//! Sentinel definitions and their persisted document shape.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Trigger kind. The hotkey kind serializes as `behavior` to match the
/// management tool surface (`add_behavior_sentinel`, `remove_sentinel`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SentinelKind {
    #[serde(rename = "time")]
    Time,
    #[serde(rename = "file")]
    File,
    #[serde(rename = "behavior")]
    Hotkey,
}

impl FromStr for SentinelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "time" => Ok(Self::Time),
            "file" => Ok(Self::File),
            "behavior" | "hotkey" => Ok(Self::Hotkey),
            other => Err(format!("unknown sentinel kind '{other}'")),
        }
    }
}

impl std::fmt::Display for SentinelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Time => write!(f, "time"),
            Self::File => write!(f, "file"),
            Self::Hotkey => write!(f, "behavior"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    pub fn to_seconds(self, interval: u64) -> u64 {
        match self {
            Self::Seconds => interval,
            Self::Minutes => interval * 60,
            Self::Hours => interval * 3600,
            Self::Days => interval * 86_400,
        }
    }
}

impl FromStr for TimeUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "seconds" => Ok(Self::Seconds),
            "minutes" => Ok(Self::Minutes),
            "hours" => Ok(Self::Hours),
            "days" => Ok(Self::Days),
            other => Err(format!("unknown time unit '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSentinel {
    pub interval: u64,
    pub unit: TimeUnit,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSentinel {
    pub path: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotkeySentinel {
    pub key_combo: String,
    pub description: String,
}

/// The persisted `sentinels.json` document: a flat map kind → id → payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SentinelDoc {
    #[serde(default)]
    pub time: HashMap<String, TimeSentinel>,
    #[serde(default)]
    pub file: HashMap<String, FileSentinel>,
    #[serde(default)]
    pub behavior: HashMap<String, HotkeySentinel>,
}

impl SentinelDoc {
    pub fn is_empty(&self) -> bool {
        self.time.is_empty() && self.file.is_empty() && self.behavior.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_strings() {
        assert_eq!("time".parse::<SentinelKind>().unwrap(), SentinelKind::Time);
        assert_eq!("behavior".parse::<SentinelKind>().unwrap(), SentinelKind::Hotkey);
        assert_eq!("hotkey".parse::<SentinelKind>().unwrap(), SentinelKind::Hotkey);
        assert!("cosmic".parse::<SentinelKind>().is_err());
        assert_eq!(SentinelKind::Hotkey.to_string(), "behavior");
    }

    #[test]
    fn time_units_convert_to_seconds() {
        assert_eq!(TimeUnit::Seconds.to_seconds(5), 5);
        assert_eq!(TimeUnit::Minutes.to_seconds(2), 120);
        assert_eq!(TimeUnit::Hours.to_seconds(1), 3600);
        assert_eq!(TimeUnit::Days.to_seconds(1), 86_400);
    }

    #[test]
    fn doc_serializes_as_flat_kind_map() {
        let mut doc = SentinelDoc::default();
        doc.time.insert(
            "time_ab".into(),
            TimeSentinel {
                interval: 1,
                unit: TimeUnit::Seconds,
                description: "Heartbeat".into(),
            },
        );
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["time"]["time_ab"]["interval"], 1);
        assert_eq!(json["time"]["time_ab"]["unit"], "seconds");

        let back: SentinelDoc = serde_json::from_value(json).unwrap();
        assert_eq!(back.time.len(), 1);
    }
}
