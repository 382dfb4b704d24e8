use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;
use uuid::Uuid;

use crate::api::ApiError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ViolationType {
    TabSwitch,
    AppSwitch,
    RapidCompletion,
    PasteDetected,
    SuspiciousActivity,
    ExcessiveInactivity,
    AiContentDetected,
    /// Kinds introduced by newer backends are carried through untouched.
    Other(String),
}

impl ViolationType {
    pub fn as_str(&self) -> &str {
        match self {
            ViolationType::TabSwitch => "tab_switch",
            ViolationType::AppSwitch => "app_switch",
            ViolationType::RapidCompletion => "rapid_completion",
            ViolationType::PasteDetected => "paste_detected",
            ViolationType::SuspiciousActivity => "suspicious_activity",
            ViolationType::ExcessiveInactivity => "excessive_inactivity",
            ViolationType::AiContentDetected => "ai_content_detected",
            ViolationType::Other(s) => s,
        }
    }
}

impl From<String> for ViolationType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "tab_switch" => ViolationType::TabSwitch,
            "app_switch" => ViolationType::AppSwitch,
            "rapid_completion" => ViolationType::RapidCompletion,
            "paste_detected" => ViolationType::PasteDetected,
            "suspicious_activity" => ViolationType::SuspiciousActivity,
            "excessive_inactivity" => ViolationType::ExcessiveInactivity,
            "ai_content_detected" => ViolationType::AiContentDetected,
            _ => ViolationType::Other(s),
        }
    }
}

impl From<ViolationType> for String {
    fn from(t: ViolationType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for ViolationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Backend-assigned identity; absent for records held only in the outbox.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_id: Option<Uuid>,
    pub student_id: i64,
    pub assignment_id: i64,
    pub violation_type: ViolationType,
    #[serde(default)]
    pub description: String,
    #[serde(with = "timestamp")]
    pub detected_at: DateTime<Utc>,
    #[serde(default)]
    pub time_away_seconds: i64,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_added_during_absence: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_similarity_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paste_content_length: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignment_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
}

/// `(student_id, violation_type, detected_at)` at whole-second precision.
pub type CompositeKey = (i64, ViolationType, i64);

impl Violation {
    pub fn composite_key(&self) -> CompositeKey {
        (
            self.student_id,
            self.violation_type.clone(),
            self.detected_at.timestamp(),
        )
    }
}

/// Details of a freshly observed integrity event, before any identity exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "snake_case", deserialize = "camelCase"))]
pub struct NewViolation {
    pub student_id: i64,
    pub assignment_id: i64,
    pub violation_type: ViolationType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub time_away_seconds: i64,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_added_during_absence: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_similarity_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paste_content_length: Option<i64>,
}

impl NewViolation {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.student_id <= 0 {
            return Err(ApiError::Validation(
                "student_id must be a positive integer".into(),
            ));
        }
        if self.assignment_id <= 0 {
            return Err(ApiError::Validation(
                "assignment_id must be a positive integer".into(),
            ));
        }
        if self.time_away_seconds < 0 {
            return Err(ApiError::Validation(
                "time_away_seconds cannot be negative".into(),
            ));
        }
        if let Some(score) = self.ai_similarity_score {
            if !(0.0..=1.0).contains(&score) {
                return Err(ApiError::Validation(
                    "ai_similarity_score must be between 0 and 1".into(),
                ));
            }
        }
        Ok(())
    }

    /// Materializes the event as a record that has never reached the backend.
    pub fn into_local(self, detected_at: DateTime<Utc>) -> Violation {
        Violation {
            id: None,
            local_id: Some(Uuid::new_v4()),
            student_id: self.student_id,
            assignment_id: self.assignment_id,
            violation_type: self.violation_type,
            description: self.description,
            detected_at,
            time_away_seconds: self.time_away_seconds,
            severity: self.severity,
            content_added_during_absence: self.content_added_during_absence,
            ai_similarity_score: self.ai_similarity_score,
            paste_content_length: self.paste_content_length,
            student_name: None,
            assignment_name: None,
            class_name: None,
        }
    }
}

/// Decodes a list payload entry by entry, dropping entries that do not parse.
pub fn decode_violations(items: Vec<serde_json::Value>, source: &str) -> Vec<Violation> {
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<Violation>(item) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(source, error = %e, "skipping malformed violation entry");
                None
            }
        })
        .collect()
}

/// Backend timestamps arrive as RFC 3339 or as naive ISO-8601 in UTC.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn parse(s: &str) -> Option<DateTime<Utc>> {
        let s = s.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.with_timezone(&Utc));
        }
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
            .map(|naive| naive.and_utc())
    }

    pub fn format(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format(dt))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn naive_and_zulu_timestamps_share_a_key() {
        let a: Violation = serde_json::from_value(json!({
            "id": 1, "student_id": 5, "assignment_id": 7,
            "violation_type": "paste_detected", "description": "",
            "detected_at": "2024-01-01T00:00:00Z", "time_away_seconds": 0,
            "severity": "low"
        }))
        .expect("zulu");
        let b: Violation = serde_json::from_value(json!({
            "student_id": 5, "assignment_id": 7,
            "violation_type": "paste_detected",
            "detected_at": "2024-01-01T00:00:00.412000",
            "severity": "low"
        }))
        .expect("naive");
        assert_eq!(a.composite_key(), b.composite_key());
    }

    #[test]
    fn unknown_violation_type_round_trips() {
        let t = ViolationType::from("screen_share".to_string());
        assert_eq!(t, ViolationType::Other("screen_share".into()));
        assert_eq!(String::from(t), "screen_share");
    }

    #[test]
    fn report_params_use_camel_case() {
        let nv: NewViolation = serde_json::from_value(json!({
            "studentId": 42, "assignmentId": 7, "violationType": "tab_switch",
            "timeAwaySeconds": 30, "severity": "medium", "description": "left tab"
        }))
        .expect("parse new violation");
        assert!(nv.validate().is_ok());
        let body = serde_json::to_value(&nv).expect("serialize");
        assert_eq!(body["student_id"], json!(42));
        assert_eq!(body["violation_type"], json!("tab_switch"));
    }

    #[test]
    fn negative_time_away_is_rejected() {
        let nv = NewViolation {
            student_id: 1,
            assignment_id: 1,
            violation_type: ViolationType::TabSwitch,
            description: String::new(),
            time_away_seconds: -1,
            severity: Severity::Low,
            content_added_during_absence: None,
            ai_similarity_score: None,
            paste_content_length: None,
        };
        assert!(matches!(nv.validate(), Err(ApiError::Validation(_))));
    }
}
