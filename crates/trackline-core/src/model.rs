use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

macro_rules! entity_id {
    ($name:ident, $label:literal) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ClientError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().parse::<i64>() {
                    Ok(value) if value >= 1 => Ok(Self(value)),
                    _ => Err(ClientError::Validation(format!(
                        concat!("expected a positive ", $label, " id, got: {}"),
                        s
                    ))),
                }
            }
        }
    };
}

entity_id!(ProjectId, "project");
entity_id!(TaskId, "task");
entity_id!(CommentId, "comment");

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub owner_id: Option<i64>,
}

/// Workflow state of a task.
///
/// The service treats status as a free string; the known values get their
/// own variants and anything else is carried through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    Open,
    InProgress,
    Done,
    Other(String),
}

impl TaskStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Other(raw) => raw.as_str(),
        }
    }
}

impl From<String> for TaskStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "open" => Self::Open,
            "in_progress" => Self::InProgress,
            "done" => Self::Done,
            _ => Self::Other(raw),
        }
    }
}

impl From<TaskStatus> for String {
    fn from(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub project_id: ProjectId,
    pub status: TaskStatus,
    pub priority: i32,
    #[serde(default)]
    pub assignee_id: Option<i64>,
    #[serde(default, with = "timestamp_serde::option")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp_serde::option")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp_serde::option")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Comment {
    pub id: CommentId,
    pub body: String,
    #[serde(with = "timestamp_serde")]
    pub created_at: DateTime<Utc>,
    pub author_id: i64,
    pub task_id: TaskId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NewProject {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl NewProject {
    /// Trims both fields; a blank description becomes `None`.
    pub fn new(name: &str, description: Option<&str>) -> ClientResult<Self> {
        Ok(Self {
            name: required("project name", name)?,
            description: optional(description),
        })
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl NewTask {
    pub fn new(title: &str, description: Option<&str>) -> ClientResult<Self> {
        Ok(Self {
            title: required("task title", title)?,
            description: optional(description),
        })
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NewComment {
    pub body: String,
}

impl NewComment {
    pub fn new(body: &str) -> ClientResult<Self> {
        Ok(Self {
            body: required("comment body", body)?,
        })
    }
}

fn required(field: &str, value: &str) -> ClientResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ClientError::Validation(format!("{field} cannot be empty")));
    }
    Ok(trimmed.to_string())
}

fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

/// Timestamps as the service writes them.
///
/// Accepts RFC 3339 with an offset, and naive ISO-8601 date-times which the
/// service emits for UTC values. Always writes RFC 3339.
pub mod timestamp_serde {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    const NAIVE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

    pub fn parse(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        let raw = raw.trim();
        match DateTime::parse_from_rfc3339(raw) {
            Ok(dt) => Ok(dt.with_timezone(&Utc)),
            Err(_) => NaiveDateTime::parse_from_str(raw, NAIVE_FORMAT).map(|ndt| ndt.and_utc()),
        }
    }

    pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(dt: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match dt {
                Some(value) => super::serialize(value, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let raw = Option::<String>::deserialize(deserializer)?;
            raw.map(|value| super::parse(&value).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{Comment, NewProject, NewTask, Project, ProjectId, Task, TaskStatus};
    use crate::error::ClientError;

    #[test]
    fn decodes_service_task_with_naive_timestamps() {
        let raw = r#"{
            "id": 7,
            "title": "Ship it",
            "description": null,
            "project_id": 3,
            "status": "in_progress",
            "priority": 2,
            "assignee_id": null,
            "due_date": null,
            "created_at": "2024-05-01T12:30:00.123456",
            "updated_at": "2024-05-01T12:30:00"
        }"#;
        let task: Task = serde_json::from_str(raw).expect("decode task");
        assert_eq!(task.project_id, ProjectId(3));
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(
            task.updated_at,
            Some(
                Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0)
                    .single()
                    .expect("valid time")
            )
        );
        assert!(task.created_at.is_some());
    }

    #[test]
    fn unknown_status_round_trips_verbatim() {
        let status: TaskStatus =
            serde_json::from_str(r#""blocked_on_review""#).expect("decode status");
        assert_eq!(status, TaskStatus::Other("blocked_on_review".to_string()));
        assert_eq!(
            serde_json::to_string(&status).expect("encode status"),
            r#""blocked_on_review""#
        );
    }

    #[test]
    fn comment_accepts_rfc3339_with_offset() {
        let raw = r#"{"id":1,"body":"hi","created_at":"2024-05-01T14:30:00+02:00","author_id":4,"task_id":9}"#;
        let comment: Comment = serde_json::from_str(raw).expect("decode comment");
        assert_eq!(
            comment.created_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0)
                .single()
                .expect("valid time")
        );
    }

    #[test]
    fn project_tolerates_missing_optional_fields() {
        let project: Project =
            serde_json::from_str(r#"{"id":5,"name":"Alpha"}"#).expect("decode project");
        assert_eq!(project.description, None);
        assert_eq!(project.owner_id, None);
    }

    #[test]
    fn drafts_trim_and_reject_blank_required_fields() {
        let draft = NewProject::new("  Alpha ", Some("   ")).expect("valid draft");
        assert_eq!(draft.name, "Alpha");
        assert_eq!(draft.description, None);
        assert_eq!(
            serde_json::to_value(&draft).expect("encode"),
            serde_json::json!({"name": "Alpha"})
        );

        assert!(matches!(
            NewTask::new("   ", None),
            Err(ClientError::Validation(_))
        ));
    }

    #[test]
    fn ids_parse_only_positive_integers() {
        assert_eq!("12".parse::<ProjectId>().expect("parse"), ProjectId(12));
        assert!("0".parse::<ProjectId>().is_err());
        assert!("abc".parse::<ProjectId>().is_err());
    }
}
