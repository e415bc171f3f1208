//! Repeat descriptor for recurring reminders

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatFrequency {
    Daily,
    Weekly,
    Monthly,
}

/// Canonical repeat descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatRule {
    pub frequency: RepeatFrequency,
    /// Step between occurrences, in units of `frequency` (minimum 1)
    #[serde(default = "default_interval")]
    pub interval: u32,
    /// ISO weekdays (1 = Monday .. 7 = Sunday) for weekly rules; order is kept
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub weekdays: Vec<u8>,
    /// Last instant (Unix ms) an occurrence may fall on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<i64>,
}

const fn default_interval() -> u32 {
    1
}

impl RepeatRule {
    pub const fn new(frequency: RepeatFrequency) -> Self {
        Self {
            frequency,
            interval: 1,
            weekdays: Vec::new(),
            until: None,
        }
    }

    #[must_use]
    pub const fn with_interval(mut self, interval: u32) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub fn with_weekdays(mut self, weekdays: Vec<u8>) -> Self {
        self.weekdays = weekdays;
        self
    }

    #[must_use]
    pub const fn until(mut self, until: i64) -> Self {
        self.until = Some(until);
        self
    }

    /// Map a legacy rule name to a canonical descriptor
    pub fn from_legacy(rule: &str) -> Option<Self> {
        let frequency = match rule.trim().to_ascii_lowercase().as_str() {
            "daily" => RepeatFrequency::Daily,
            "weekly" => RepeatFrequency::Weekly,
            "monthly" => RepeatFrequency::Monthly,
            _ => return None,
        };
        Some(Self::new(frequency))
    }

    pub fn step(&self) -> u32 {
        self.interval.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_names_map_to_frequencies() {
        assert_eq!(
            RepeatRule::from_legacy(" Weekly "),
            Some(RepeatRule::new(RepeatFrequency::Weekly))
        );
        assert_eq!(RepeatRule::from_legacy("hourly"), None);
    }

    #[test]
    fn missing_interval_defaults_to_one() {
        let rule: RepeatRule = serde_json::from_str(r#"{"frequency":"daily"}"#).unwrap();
        assert_eq!(rule.interval, 1);
        assert!(rule.weekdays.is_empty());
        assert_eq!(rule.until, None);
    }

    #[test]
    fn zero_interval_steps_by_one() {
        let rule = RepeatRule::new(RepeatFrequency::Daily).with_interval(0);
        assert_eq!(rule.step(), 1);
    }
}
