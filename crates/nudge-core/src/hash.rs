//! Stable content fingerprints.
//!
//! Values are canonicalized before hashing: object keys are sorted at every
//! depth and `null` members are dropped, so `{"a": null}` and `{}` hash the
//! same. Array order is kept. The digest is SHA-256, hex encoded.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::models::{Note, RepeatRule};

/// Canonical JSON text for `value`
pub fn canonical_json(value: &Value) -> String {
    canonicalize(value).to_string()
}

/// SHA-256 of the canonical JSON text of `value`
pub fn canonical_digest(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(value).as_bytes());
    hex::encode(hasher.finalize())
}

/// Fingerprint of scheduling-relevant fields
pub fn schedule_hash(fields: &Value) -> String {
    canonical_digest(fields)
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys = map
                .iter()
                .filter(|(_, member)| !member.is_null())
                .collect::<Vec<_>>();
            keys.sort_by(|(left, _), (right, _)| left.cmp(right));
            let sorted = keys
                .into_iter()
                .map(|(key, member)| (key.clone(), canonicalize(member)))
                .collect::<Map<String, Value>>();
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// The subset of a note that decides what alert gets issued
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleFields {
    /// Resolved trigger (snooze, recurrence or one-shot)
    pub trigger_at: Option<i64>,
    pub repeat_rule: Option<String>,
    pub repeat: Option<RepeatRule>,
    pub active: bool,
    pub snoozed_until: Option<i64>,
    pub title: String,
}

impl ScheduleFields {
    pub fn from_note(note: &Note, effective_trigger: Option<i64>) -> Self {
        let (title, _) = note.notification_text();
        Self {
            trigger_at: effective_trigger,
            repeat_rule: note.repeat_rule.clone(),
            repeat: note.repeat.clone(),
            active: note.active,
            snoozed_until: note.snoozed_until,
            title,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "trigger_at": self.trigger_at,
            "repeat_rule": self.repeat_rule,
            "repeat": self.repeat.as_ref().map(|repeat| {
                serde_json::json!({
                    "frequency": repeat.frequency,
                    "interval": repeat.interval,
                    "weekdays": repeat.weekdays,
                    "until": repeat.until,
                })
            }),
            "active": self.active,
            "snoozed_until": self.snoozed_until,
            "title": self.title,
        })
    }

    pub fn hash(&self) -> String {
        schedule_hash(&self.to_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RepeatFrequency;
    use serde_json::json;

    fn base() -> Value {
        json!({
            "trigger_at": 1_700_000_000_000_i64,
            "repeat_rule": "weekly",
            "active": true,
            "snoozed_until": null,
            "title": "Standup",
            "repeat_config": {
                "weekdays": [1, 3, 5],
                "time": {"hour": 9, "minute": 30}
            }
        })
    }

    #[test]
    fn hash_ignores_key_order_at_every_depth() {
        let reordered = json!({
            "repeat_config": {
                "time": {"minute": 30, "hour": 9},
                "weekdays": [1, 3, 5]
            },
            "title": "Standup",
            "snoozed_until": null,
            "active": true,
            "repeat_rule": "weekly",
            "trigger_at": 1_700_000_000_000_i64
        });
        assert_eq!(schedule_hash(&base()), schedule_hash(&reordered));
    }

    #[test]
    fn hash_treats_null_and_absent_alike() {
        let mut without_snooze = base();
        without_snooze
            .as_object_mut()
            .unwrap()
            .remove("snoozed_until");
        assert_eq!(schedule_hash(&base()), schedule_hash(&without_snooze));
    }

    #[test]
    fn hash_changes_with_each_included_field() {
        let original = schedule_hash(&base());
        let edits: Vec<(&str, Value)> = vec![
            ("trigger_at", json!(1_700_000_000_001_i64)),
            ("repeat_rule", json!("daily")),
            ("active", json!(false)),
            ("snoozed_until", json!(1_700_000_100_000_i64)),
            ("title", json!("Retro")),
            (
                "repeat_config",
                json!({"weekdays": [1, 3, 5], "time": {"hour": 10, "minute": 30}}),
            ),
            (
                "repeat_config",
                json!({"weekdays": [5, 3, 1], "time": {"hour": 9, "minute": 30}}),
            ),
        ];

        for (field, value) in edits {
            let mut changed = base();
            changed[field] = value;
            assert_ne!(original, schedule_hash(&changed), "editing {field}");
        }
    }

    #[test]
    fn digest_is_hex_sha256() {
        let digest = canonical_digest(&json!({"b": 1, "a": [true, null]}));
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(
            canonical_json(&json!({"b": 1, "a": [true, null]})),
            r#"{"a":[true,null],"b":1}"#
        );
    }

    #[test]
    fn schedule_fields_track_note_edits() {
        let note = Note::new("owner-1", "Stretch").with_repeat(
            RepeatRule::new(RepeatFrequency::Weekly).with_weekdays(vec![1, 3]),
            1_000,
        );
        let fields = ScheduleFields::from_note(&note, Some(5_000));
        let same = ScheduleFields::from_note(&note.clone(), Some(5_000));
        assert_eq!(fields.hash(), same.hash());

        let mut reordered = note.clone();
        reordered.repeat = Some(RepeatRule::new(RepeatFrequency::Weekly).with_weekdays(vec![3, 1]));
        assert_ne!(
            fields.hash(),
            ScheduleFields::from_note(&reordered, Some(5_000)).hash()
        );

        let mut snoozed = note;
        snoozed.snoozed_until = Some(9_000);
        assert_ne!(
            fields.hash(),
            ScheduleFields::from_note(&snoozed, Some(9_000)).hash()
        );
    }
}
