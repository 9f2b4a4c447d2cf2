use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::datetime::lenient_date_serde;

/// Server-side status vocabulary. The rendering layer never sees these
/// directly; it works with [`ViewStatus`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Active,
    Doing,
    Completed,
}

/// Presentation vocabulary for statuses, as shown in filters and lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewStatus {
    Todo,
    Doing,
    Done,
}

impl Status {
    /// Maps the wire status to its presentation form. [`ViewStatus::status`]
    /// is the exact inverse; round-tripping either way is the identity.
    pub fn view(self) -> ViewStatus {
        match self {
            Status::Active => ViewStatus::Todo,
            Status::Doing => ViewStatus::Doing,
            Status::Completed => ViewStatus::Done,
        }
    }
}

impl ViewStatus {
    pub fn status(self) -> Status {
        match self {
            ViewStatus::Todo => Status::Active,
            ViewStatus::Doing => Status::Doing,
            ViewStatus::Done => Status::Completed,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "todo" => Some(Self::Todo),
            "doing" => Some(Self::Doing),
            "done" => Some(Self::Done),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::Doing => "doing",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for ViewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// Sort rank for tasks with no recognized priority.
pub const UNRANKED: u8 = 99;

impl Priority {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }

    pub fn rank(self) -> u8 {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rank used by the priority sort; `None` and unrecognized values sort
/// after all three known priorities.
pub fn priority_rank(priority: Option<Priority>) -> u8 {
    priority.map(Priority::rank).unwrap_or(UNRANKED)
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Work,
    Personal,
    Shopping,
    Health,
    Education,
    Other,
}

impl Category {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "work" => Some(Self::Work),
            "personal" => Some(Self::Personal),
            "shopping" => Some(Self::Shopping),
            "health" => Some(Self::Health),
            "education" => Some(Self::Education),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Work => "work",
            Self::Personal => "personal",
            Self::Shopping => "shopping",
            Self::Health => "health",
            Self::Education => "education",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only projection of a task record as the server owns it.
///
/// Priority, category, and deadline deserialize leniently: a value the
/// client does not recognize becomes `None` instead of failing the whole
/// fetch. Unknown fields are retained in `extra` so snapshots round-trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(rename = "task")]
    pub title: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default, deserialize_with = "de_lenient_priority")]
    pub priority: Option<Priority>,

    pub status: Status,

    #[serde(default, deserialize_with = "de_lenient_category")]
    pub category: Option<Category>,

    #[serde(default, with = "lenient_date_serde")]
    pub deadline: Option<DateTime<Utc>>,

    #[serde(default, rename = "userId")]
    pub owner_id: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>, status: Status) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            priority: None,
            status,
            category: None,
            deadline: None,
            owner_id: None,
            extra: BTreeMap::new(),
        }
    }

    /// Category shown for this task; missing categories display as `other`.
    pub fn display_category(&self) -> Category {
        self.category.unwrap_or(Category::Other)
    }

    /// A task counts as overdue only while it is not done.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status.view() != ViewStatus::Done
            && self.deadline.map(|deadline| deadline < now).unwrap_or(false)
    }
}

fn de_lenient_priority<'de, D>(deserializer: D) -> Result<Option<Priority>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(value) => value.as_str().and_then(Priority::parse),
        None => None,
    })
}

fn de_lenient_category<'de, D>(deserializer: D) -> Result<Option<Category>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(value) => value.as_str().and_then(Category::parse),
        None => None,
    })
}
