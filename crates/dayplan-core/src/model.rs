use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::datetime::{wire_dates, wire_instant};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub content: String,

    #[serde(default)]
    pub category: String,

    #[serde(default)]
    pub is_public: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default)]
    pub last_edited: i64,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Note {
    pub fn new(title: String, category: String) -> Self {
        Self {
            id: String::new(),
            title,
            content: String::new(),
            category,
            is_public: false,
            user_id: None,
            last_edited: 0,
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TodoStatus {
    #[default]
    Pending,
    NotStarted,
    InProgress,
    Completed,
}

impl TodoStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TodoStatus::Pending => "pending",
            TodoStatus::NotStarted => "not-started",
            TodoStatus::InProgress => "in-progress",
            TodoStatus::Completed => "completed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(TodoStatus::Pending),
            "not-started" | "notstarted" | "todo" | "to-do" => Some(TodoStatus::NotStarted),
            "in-progress" | "inprogress" | "active" | "started" => Some(TodoStatus::InProgress),
            "completed" | "done" => Some(TodoStatus::Completed),
            _ => None,
        }
    }

    pub fn is_completed(self) -> bool {
        self == TodoStatus::Completed
    }
}

/// Todo importance, stored on the wire as `0`, `1` or `2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub enum Importance {
    #[default]
    Low,
    Medium,
    High,
}

impl Importance {
    pub fn level(self) -> u8 {
        match self {
            Importance::Low => 0,
            Importance::Medium => 1,
            Importance::High => 2,
        }
    }

    pub fn from_level(level: i64) -> Self {
        match level {
            i64::MIN..=0 => Importance::Low,
            1 => Importance::Medium,
            _ => Importance::High,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "0" | "l" | "low" => Some(Importance::Low),
            "1" | "m" | "medium" => Some(Importance::Medium),
            "2" | "h" | "high" => Some(Importance::High),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Importance::Low => "Low",
            Importance::Medium => "Medium",
            Importance::High => "High",
        }
    }
}

impl Serialize for Importance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.level())
    }
}

impl<'de> Deserialize<'de> for Importance {
    // Select inputs store the level as a string.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        match &raw {
            Value::Null => Ok(Importance::Low),
            Value::Number(num) => Ok(Importance::from_level(
                num.as_i64()
                    .or_else(|| num.as_f64().map(|f| f as i64))
                    .unwrap_or(0),
            )),
            Value::String(text) => Importance::parse(text)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid importance: {text}"))),
            other => Err(serde::de::Error::custom(format!(
                "invalid importance: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default, with = "wire_instant::option")]
    pub due_date: Option<DateTime<Utc>>,

    #[serde(default = "subtask_default_status")]
    pub status: TodoStatus,

    #[serde(default)]
    pub importance: Importance,
}

impl Subtask {
    pub fn new(id: String, title: String) -> Self {
        Self {
            id,
            title,
            description: String::new(),
            due_date: None,
            status: subtask_default_status(),
            importance: Importance::Low,
        }
    }
}

fn subtask_default_status() -> TodoStatus {
    TodoStatus::NotStarted
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,

    #[serde(default, with = "wire_instant::option")]
    pub due_date: Option<DateTime<Utc>>,

    #[serde(
        default,
        with = "wire_instant::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub start: Option<DateTime<Utc>>,

    #[serde(
        default,
        with = "wire_instant::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub end: Option<DateTime<Utc>>,

    #[serde(default)]
    pub status: TodoStatus,

    #[serde(default)]
    pub importance: Importance,

    #[serde(default)]
    pub category: String,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub subtasks: Vec<Subtask>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default)]
    pub last_edited: i64,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Todo {
    pub fn new(title: String) -> Self {
        Self {
            id: String::new(),
            title,
            content: String::new(),
            due_date: None,
            start: None,
            end: None,
            status: TodoStatus::Pending,
            importance: Importance::Low,
            category: String::new(),
            subtasks: vec![],
            user_id: None,
            last_edited: 0,
            extra: BTreeMap::new(),
        }
    }

    /// Percentage of completed subtasks; 0 when there are none.
    pub fn subtask_progress(&self) -> f64 {
        if self.subtasks.is_empty() {
            return 0.0;
        }
        let done = self
            .subtasks
            .iter()
            .filter(|sub| sub.status.is_completed())
            .count();
        done as f64 / self.subtasks.len() as f64 * 100.0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "l" | "low" => Some(Priority::Low),
            "m" | "medium" => Some(Priority::Medium),
            "h" | "high" => Some(Priority::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    #[default]
    Confirmed,
    Tentative,
    Canceled,
}

impl EventStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "confirmed" => Some(EventStatus::Confirmed),
            "tentative" => Some(EventStatus::Tentative),
            "canceled" | "cancelled" => Some(EventStatus::Canceled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<Value>", into = "String")]
pub enum Frequency {
    #[default]
    None,
    Day,
    Week,
    Month,
    Year,
}

impl Frequency {
    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::None => "none",
            Frequency::Day => "day",
            Frequency::Week => "week",
            Frequency::Month => "month",
            Frequency::Year => "year",
        }
    }

    /// Strict variant of the wire conversion: unknown words are `None`
    /// rather than a non-recurring rule.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "none" | "once" => Some(Frequency::None),
            "day" | "daily" => Some(Frequency::Day),
            "week" | "weekly" => Some(Frequency::Week),
            "month" | "monthly" => Some(Frequency::Month),
            "year" | "yearly" => Some(Frequency::Year),
            _ => None,
        }
    }
}

impl From<String> for Frequency {
    fn from(raw: String) -> Self {
        Frequency::parse(&raw).unwrap_or_default()
    }
}

/// `null`, numbers and any other non-string value read as `None`.
impl From<Option<Value>> for Frequency {
    fn from(raw: Option<Value>) -> Self {
        match raw {
            Some(Value::String(text)) => Frequency::from(text),
            _ => Frequency::None,
        }
    }
}

impl From<Frequency> for String {
    fn from(freq: Frequency) -> Self {
        freq.as_str().to_string()
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Recurrence {
    #[serde(default)]
    pub frequency: Frequency,

    #[serde(default = "default_interval", deserialize_with = "lenient_interval")]
    pub interval: i64,

    #[serde(default, with = "weekday_tokens")]
    pub weekdays: Vec<Weekday>,

    #[serde(default, with = "wire_instant::option")]
    pub end_date: Option<DateTime<Utc>>,

    #[serde(
        default,
        with = "wire_instant::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub start: Option<DateTime<Utc>>,

    #[serde(default, with = "wire_dates")]
    pub blackout_dates: Vec<NaiveDate>,
}

impl Default for Recurrence {
    fn default() -> Self {
        Self {
            frequency: Frequency::None,
            interval: 1,
            weekdays: vec![],
            end_date: None,
            start: None,
            blackout_dates: vec![],
        }
    }
}

impl Recurrence {
    pub fn is_recurring(&self) -> bool {
        self.frequency != Frequency::None
    }
}

fn default_interval() -> i64 {
    1
}

// Form inputs persist the interval as a string; anything unreadable counts as 1.
fn lenient_interval<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    let parsed = match raw {
        Some(Value::Number(num)) => num.as_i64().or_else(|| num.as_f64().map(|f| f as i64)),
        Some(Value::String(text)) => text.trim().parse::<i64>().ok(),
        _ => None,
    };
    Ok(parsed.unwrap_or(1))
}

fn lenient_minutes<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::Number(num)) => num.as_u64().and_then(|n| u32::try_from(n).ok()),
        Some(Value::String(text)) => text.trim().parse::<u32>().ok(),
        _ => None,
    })
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

mod weekday_tokens {
    use chrono::Weekday;
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::datetime::{parse_weekday_token, weekday_token};

    pub fn serialize<S>(days: &[Weekday], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(days.len()))?;
        for day in days {
            seq.serialize_element(weekday_token(*day))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Weekday>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default();
        let mut out = Vec::with_capacity(raw.len());
        for token in raw {
            match parse_weekday_token(&token) {
                Some(day) if !out.contains(&day) => out.push(day),
                Some(_) => {}
                None => tracing::warn!(token = %token, "dropping unknown weekday token"),
            }
        }
        Ok(out)
    }
}

/// A stored calendar entry, possibly recurring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CalendarItem {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub title: String,

    #[serde(with = "wire_instant")]
    pub start: DateTime<Utc>,

    #[serde(with = "wire_instant")]
    pub end: DateTime<Utc>,

    #[serde(default)]
    pub all_day: bool,

    #[serde(default)]
    pub category: String,

    #[serde(default)]
    pub location: String,

    #[serde(default)]
    pub description: String,

    /// Notification lead time in minutes.
    #[serde(default, deserialize_with = "lenient_minutes")]
    pub notification: Option<u32>,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub status: EventStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<Recurrence>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default)]
    pub last_edited: i64,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl CalendarItem {
    pub fn new(title: String, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            id: String::new(),
            title,
            start,
            end,
            all_day: false,
            category: String::new(),
            location: String::new(),
            description: String::new(),
            notification: None,
            priority: Priority::Medium,
            status: EventStatus::Confirmed,
            recurrence: None,
            user_id: None,
            last_edited: 0,
            extra: BTreeMap::new(),
        }
    }

    pub fn is_recurring(&self) -> bool {
        self.recurrence
            .as_ref()
            .map(Recurrence::is_recurring)
            .unwrap_or(false)
    }
}

/// One concrete occurrence of a [`CalendarItem`]. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct EventInstance {
    /// Template snapshot with `start`/`end` moved to this occurrence.
    pub item: CalendarItem,
    pub occurrence_date: NaiveDate,
    pub recurring: bool,
}

impl EventInstance {
    pub fn start(&self) -> DateTime<Utc> {
        self.item.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.item.end
    }

    pub fn template_id(&self) -> &str {
        &self.item.id
    }
}
