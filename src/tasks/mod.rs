//! Task records and the payloads that create and edit them.
//!
//! A [`Task`] is stored as a JSON-shaped document with camelCase field names.
//! Requests never build a `Task` directly: creation goes through [`NewTask`],
//! edits through [`TaskUpdate`], and both are checked before anything reaches
//! the store. The store itself only ever applies a [`TaskPatch`], a set of
//! field-level writes.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Recurrence labels accepted on create and edit.
pub const FREQUENCY_LABELS: [&str; 3] = ["Every Day", "Every Week", "Every Month"];

/// Frequency given to a recurring task that does not name one.
pub const DEFAULT_FREQUENCY: &str = "Every Day";

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generates a fresh random id.
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Identity of a registered user; also the routing key for push channels.
    UserId
);
string_id!(
    /// Store-assigned task identifier.
    TaskId
);

/// How often a recurring task comes back, derived from its frequency label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Daily,
    Weekly,
    Monthly,
}

impl Cadence {
    /// Case-insensitive substring match: `"Every Week"` is weekly. Anything
    /// that names neither a week nor a month is daily.
    pub fn from_label(label: &str) -> Self {
        let label = label.to_ascii_lowercase();
        if label.contains("week") {
            Cadence::Weekly
        } else if label.contains("month") {
            Cadence::Monthly
        } else {
            Cadence::Daily
        }
    }
}

/// Returns the canonical spelling of a recognized frequency label.
pub fn canonical_frequency(label: &str) -> Option<&'static str> {
    let label = label.trim();
    FREQUENCY_LABELS
        .iter()
        .copied()
        .find(|known| known.eq_ignore_ascii_case(label))
}

/// Parses a stored due date: RFC 3339, or a bare `YYYY-MM-DD` meaning the
/// start of that day in `tz`.
pub fn parse_due_date<Tz: TimeZone>(raw: &str, tz: &Tz) -> Option<DateTime<Tz>> {
    let raw = raw.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Some(instant.with_timezone(tz));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    tz.from_local_datetime(&date.and_time(NaiveTime::MIN))
        .earliest()
}

/// A stored task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub recurring: bool,
    /// Present only while `recurring` is true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<String>,
    pub owner_id: UserId,
    /// Immutable. Optional only because imported documents may lack it.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Insertion-ordered.
    #[serde(default)]
    pub completed_dates: Vec<NaiveDate>,
    /// Kept as written; a value that does not parse never fires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_notified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("title required")]
    EmptyTitle,

    #[error("unknown frequency {0:?}; expected one of Every Day, Every Week, Every Month")]
    UnknownFrequency(String),

    #[error("invalid due date {0:?}; expected RFC 3339 or YYYY-MM-DD")]
    InvalidDueDate(String),
}

fn checked_title(title: &str) -> Result<String, TaskError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(TaskError::EmptyTitle);
    }
    Ok(title.to_owned())
}

fn checked_frequency(label: Option<&str>) -> Result<String, TaskError> {
    match label {
        None => Ok(DEFAULT_FREQUENCY.to_owned()),
        Some(label) if label.trim().is_empty() => Ok(DEFAULT_FREQUENCY.to_owned()),
        Some(label) => canonical_frequency(label)
            .map(str::to_owned)
            .ok_or_else(|| TaskError::UnknownFrequency(label.to_owned())),
    }
}

fn checked_due_date(raw: &str) -> Result<String, TaskError> {
    match parse_due_date(raw, &Utc) {
        Some(_) => Ok(raw.trim().to_owned()),
        None => Err(TaskError::InvalidDueDate(raw.to_owned())),
    }
}

/// Body of a create request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub recurring: bool,
    #[serde(default)]
    pub frequency: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
}

impl NewTask {
    /// Validates the request and builds the record to insert.
    pub fn into_task(self, owner: UserId, now: DateTime<Utc>) -> Result<Task, TaskError> {
        let title = checked_title(&self.title)?;
        let frequency = if self.recurring {
            Some(checked_frequency(self.frequency.as_deref())?)
        } else {
            None
        };
        let due_date = self.due_date.as_deref().map(checked_due_date).transpose()?;

        Ok(Task {
            id: TaskId::generate(),
            title,
            details: self.details.unwrap_or_default(),
            recurring: self.recurring,
            frequency,
            owner_id: owner,
            created_at: Some(now),
            completed_dates: Vec::new(),
            due_date,
            last_notified_at: None,
            updated_at: Some(now),
        })
    }
}

// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Body of an edit request. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub details: Option<String>,
    pub recurring: Option<bool>,
    pub frequency: Option<String>,
    pub completed_dates: Option<Vec<NaiveDate>>,
    #[serde(default, deserialize_with = "nullable")]
    pub due_date: Option<Option<String>>,
}

impl TaskUpdate {
    /// Validates the edit against the task's current state and returns the
    /// field-level writes it implies.
    ///
    /// Turning `recurring` off clears the frequency; turning it on without a
    /// label falls back to the existing label or the default.
    pub fn into_patch(self, current: &Task, now: DateTime<Utc>) -> Result<TaskPatch, TaskError> {
        let mut patch = TaskPatch {
            updated_at: Some(now),
            ..TaskPatch::default()
        };

        if let Some(title) = self.title {
            patch.title = Some(checked_title(&title)?);
        }
        patch.details = self.details;
        patch.completed_dates = self.completed_dates;

        let recurring = self.recurring.unwrap_or(current.recurring);
        patch.recurring = self.recurring;
        if recurring {
            let label = self.frequency.as_deref().or(current.frequency.as_deref());
            let frequency = checked_frequency(label)?;
            if current.frequency.as_deref() != Some(frequency.as_str()) {
                patch.frequency = Some(Some(frequency));
            }
        } else if current.frequency.is_some() || self.frequency.is_some() {
            patch.frequency = Some(None);
        }

        patch.due_date = match self.due_date {
            Some(Some(raw)) => Some(Some(checked_due_date(&raw)?)),
            Some(None) => Some(None),
            None => None,
        };

        Ok(patch)
    }
}

/// Field-level writes applied atomically to one stored task.
///
/// `None` leaves a field untouched; for optional fields `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub details: Option<String>,
    pub recurring: Option<bool>,
    pub frequency: Option<Option<String>>,
    pub completed_dates: Option<Vec<NaiveDate>>,
    /// Appended to the stored dates unless already present. Applied after
    /// `completed_dates`.
    pub add_completed_date: Option<NaiveDate>,
    pub due_date: Option<Option<String>>,
    pub last_notified_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TaskPatch {
    /// The scheduler's only write: stamp a successful delivery.
    pub fn notified_at(at: DateTime<Utc>) -> Self {
        Self {
            last_notified_at: Some(at),
            ..Self::default()
        }
    }

    /// Records a completion without reading the current dates first.
    pub fn completed_on(date: NaiveDate, at: DateTime<Utc>) -> Self {
        Self {
            add_completed_date: Some(date),
            updated_at: Some(at),
            ..Self::default()
        }
    }

    pub fn apply(self, task: &mut Task) {
        if let Some(title) = self.title {
            task.title = title;
        }
        if let Some(details) = self.details {
            task.details = details;
        }
        if let Some(recurring) = self.recurring {
            task.recurring = recurring;
        }
        if let Some(frequency) = self.frequency {
            task.frequency = frequency;
        }
        if let Some(dates) = self.completed_dates {
            task.completed_dates = dates;
        }
        if let Some(date) = self.add_completed_date {
            if !task.completed_dates.contains(&date) {
                task.completed_dates.push(date);
            }
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(at) = self.last_notified_at {
            // Never move the stamp backwards.
            if task.last_notified_at.is_none_or(|prev| at >= prev) {
                task.last_notified_at = Some(at);
            }
        }
        if let Some(at) = self.updated_at {
            task.updated_at = Some(at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn create(body: &str) -> Result<Task, TaskError> {
        let new: NewTask = serde_json::from_str(body).unwrap();
        new.into_task(UserId::from("u-1"), now())
    }

    #[test]
    fn completion_append_skips_existing_date() {
        let mut task = create(r#"{"title":"stretch","recurring":true}"#).unwrap();
        let monday = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let tuesday = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();

        TaskPatch::completed_on(monday, now()).apply(&mut task);
        TaskPatch::completed_on(tuesday, now()).apply(&mut task);
        TaskPatch::completed_on(monday, now()).apply(&mut task);
        assert_eq!(task.completed_dates, vec![monday, tuesday]);
        assert_eq!(task.updated_at, Some(now()));

        let replace_then_add = TaskPatch {
            completed_dates: Some(vec![tuesday]),
            add_completed_date: Some(tuesday),
            ..TaskPatch::default()
        };
        replace_then_add.apply(&mut task);
        assert_eq!(task.completed_dates, vec![tuesday]);
    }

    #[test]
    fn cadence_from_label() {
        assert_eq!(Cadence::from_label("Every Week"), Cadence::Weekly);
        assert_eq!(Cadence::from_label("every MONTH"), Cadence::Monthly);
        assert_eq!(Cadence::from_label("Every Day"), Cadence::Daily);
        assert_eq!(Cadence::from_label("fortnightly-ish"), Cadence::Daily);
    }

    #[test]
    fn create_requires_title() {
        assert_eq!(create(r#"{"title":"   "}"#), Err(TaskError::EmptyTitle));
        assert_eq!(create(r#"{}"#), Err(TaskError::EmptyTitle));
    }

    #[test]
    fn recurring_defaults_to_daily_and_one_off_has_no_frequency() {
        let task = create(r#"{"title":"water plants","recurring":true}"#).unwrap();
        assert_eq!(task.frequency.as_deref(), Some("Every Day"));
        assert_eq!(task.created_at, Some(now()));

        let task = create(r#"{"title":"taxes","frequency":"Every Week"}"#).unwrap();
        assert!(!task.recurring);
        assert_eq!(task.frequency, None);
    }

    #[test]
    fn frequency_is_canonicalized_or_rejected() {
        let task = create(r#"{"title":"t","recurring":true,"frequency":"every week"}"#).unwrap();
        assert_eq!(task.frequency.as_deref(), Some("Every Week"));

        let err = create(r#"{"title":"t","recurring":true,"frequency":"Every Decade"}"#);
        assert!(matches!(err, Err(TaskError::UnknownFrequency(_))));
    }

    #[test]
    fn due_date_formats() {
        assert!(create(r#"{"title":"t","dueDate":"2024-06-01T00:00:00Z"}"#).is_ok());
        assert!(create(r#"{"title":"t","dueDate":"2024-06-01"}"#).is_ok());
        let err = create(r#"{"title":"t","dueDate":"next tuesday"}"#);
        assert!(matches!(err, Err(TaskError::InvalidDueDate(_))));
    }

    #[test]
    fn record_serializes_camel_case() {
        let task = create(r#"{"title":"t","recurring":true}"#).unwrap();
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["ownerId"], "u-1");
        assert_eq!(json["completedDates"], serde_json::json!([]));
        assert!(json.get("lastNotifiedAt").is_none());
        assert!(json.get("createdAt").is_some());
    }

    #[test]
    fn update_turning_recurring_off_clears_frequency() {
        let task = create(r#"{"title":"t","recurring":true,"frequency":"Every Month"}"#).unwrap();
        let update: TaskUpdate = serde_json::from_str(r#"{"recurring":false}"#).unwrap();
        let patch = update.into_patch(&task, now()).unwrap();
        assert_eq!(patch.recurring, Some(false));
        assert_eq!(patch.frequency, Some(None));
    }

    #[test]
    fn update_distinguishes_null_from_absent_due_date() {
        let task = create(r#"{"title":"t","dueDate":"2024-06-01"}"#).unwrap();

        let absent: TaskUpdate = serde_json::from_str(r#"{"title":"renamed"}"#).unwrap();
        let patch = absent.into_patch(&task, now()).unwrap();
        assert_eq!(patch.due_date, None);
        assert_eq!(patch.title.as_deref(), Some("renamed"));

        let cleared: TaskUpdate = serde_json::from_str(r#"{"dueDate":null}"#).unwrap();
        let patch = cleared.into_patch(&task, now()).unwrap();
        assert_eq!(patch.due_date, Some(None));
    }

    #[test]
    fn patch_touches_only_named_fields() {
        let mut task = create(r#"{"title":"t","details":"keep me"}"#).unwrap();
        let stamp = now() + chrono::TimeDelta::hours(1);
        TaskPatch::notified_at(stamp).apply(&mut task);
        assert_eq!(task.details, "keep me");
        assert_eq!(task.last_notified_at, Some(stamp));

        TaskPatch::notified_at(now()).apply(&mut task);
        assert_eq!(task.last_notified_at, Some(stamp));
    }
}
