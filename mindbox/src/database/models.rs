//! Document models
//!
//! Rust structs for the records held in the JSON document.
//! All models use serde for persistence and for the boundary layer.

use crate::config;
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A record addressable by id inside one of the document collections
pub trait Record {
    fn id(&self) -> &str;
}

/// Timestamps are written as RFC 3339. Older documents stored naive local
/// times without an offset; those are read back as UTC.
pub(crate) mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", raw)))
    }

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

/// Per-user preferences. Unknown keys are kept so a merge never drops them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    #[serde(default = "default_theme")]
    pub theme: String,
    #[serde(default = "default_true")]
    pub notifications: bool,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_theme() -> String {
    config::DEFAULT_THEME.to_string()
}

fn default_true() -> bool {
    true
}

fn default_language() -> String {
    config::DEFAULT_LANGUAGE.to_string()
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            theme: default_theme(),
            notifications: true,
            language: default_language(),
            extra: Map::new(),
        }
    }
}

impl UserSettings {
    /// Merge a partial settings object: provided keys overwrite, the rest stay.
    pub fn merge(&mut self, patch: Map<String, Value>) -> Result<()> {
        let mut merged = serde_json::to_value(&*self)?;
        if let Value::Object(current) = &mut merged {
            current.extend(patch);
        }

        *self = serde_json::from_value(merged)
            .map_err(|e| AppError::Validation(format!("Invalid settings: {}", e)))?;
        Ok(())
    }
}

/// A registered user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub about: String,
    #[serde(default = "default_avatar")]
    pub avatar: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub last_login: DateTime<Utc>,
    #[serde(default)]
    pub settings: UserSettings,
}

fn default_avatar() -> String {
    config::DEFAULT_AVATAR_URL.to_string()
}

impl User {
    pub fn new(
        first_name: String,
        last_name: String,
        email: String,
        phone: String,
        about: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            first_name,
            last_name,
            email,
            phone,
            about,
            avatar: default_avatar(),
            created_at: now,
            last_login: now,
            settings: UserSettings::default(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn has_custom_avatar(&self) -> bool {
        !self.avatar.is_empty() && self.avatar != config::DEFAULT_AVATAR_URL
    }
}

impl Record for User {
    fn id(&self) -> &str {
        &self.id
    }
}

/// A user-defined folder grouping entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct File {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default = "default_icon", deserialize_with = "icon_or_default")]
    pub icon: String,
    #[serde(default = "default_color", deserialize_with = "color_or_default")]
    pub color: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

fn default_icon() -> String {
    config::DEFAULT_FILE_ICON.to_string()
}

fn default_color() -> String {
    config::DEFAULT_FILE_COLOR.to_string()
}

// Older documents can hold an explicit null here
fn icon_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_icon))
}

fn color_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_color))
}

impl File {
    pub fn new(user_id: String, name: String, icon: Option<String>, color: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            name,
            icon: icon.unwrap_or_else(default_icon),
            color: color.unwrap_or_else(default_color),
            created_at: now,
            updated_at: now,
        }
    }
}

impl Record for File {
    fn id(&self) -> &str {
        &self.id
    }
}

/// One checkbox line inside a checklist element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistItem {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub checked: bool,
}

impl ChecklistItem {
    pub fn new(text: impl Into<String>, checked: bool) -> Self {
        Self {
            text: text.into(),
            checked,
        }
    }
}

/// A typed content block, discriminated by its `type` field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Element {
    Text {
        #[serde(default)]
        content: String,
    },
    Checklist {
        #[serde(default)]
        items: Vec<ChecklistItem>,
    },
    Highlight {
        #[serde(default)]
        content: String,
    },
    Problem {
        #[serde(default)]
        problem: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        solution: Option<String>,
    },
    Achievement {
        #[serde(default)]
        content: String,
    },
}

impl Element {
    pub fn text(content: impl Into<String>) -> Self {
        Element::Text {
            content: content.into(),
        }
    }

    pub fn checklist(items: Vec<ChecklistItem>) -> Self {
        Element::Checklist { items }
    }

    pub fn kind(&self) -> ElementType {
        match self {
            Element::Text { .. } => ElementType::Text,
            Element::Checklist { .. } => ElementType::Checklist,
            Element::Highlight { .. } => ElementType::Highlight,
            Element::Problem { .. } => ElementType::Problem,
            Element::Achievement { .. } => ElementType::Achievement,
        }
    }
}

/// The recognized element discriminators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementType {
    Text,
    Checklist,
    Highlight,
    Problem,
    Achievement,
}

impl ElementType {
    pub const ALL: [ElementType; 5] = [
        ElementType::Text,
        ElementType::Checklist,
        ElementType::Highlight,
        ElementType::Problem,
        ElementType::Achievement,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ElementType::Text => "text",
            ElementType::Checklist => "checklist",
            ElementType::Highlight => "highlight",
            ElementType::Problem => "problem",
            ElementType::Achievement => "achievement",
        }
    }
}

/// An element as stored in an entry.
///
/// Blocks with an unrecognized `type` are carried verbatim so saving the
/// document never loses them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryElement {
    Typed(Element),
    Untyped(Value),
}

impl EntryElement {
    pub fn kind(&self) -> Option<ElementType> {
        match self {
            EntryElement::Typed(element) => Some(element.kind()),
            EntryElement::Untyped(_) => None,
        }
    }
}

impl From<Element> for EntryElement {
    fn from(element: Element) -> Self {
        EntryElement::Typed(element)
    }
}

/// A journal record inside a file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub user_id: String,
    pub file_id: String,
    #[serde(default = "default_mood")]
    pub mood: String,
    #[serde(default)]
    pub elements: Vec<EntryElement>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

fn default_mood() -> String {
    config::DEFAULT_MOOD.to_string()
}

impl Entry {
    pub fn new(
        user_id: String,
        file_id: String,
        mood: Option<String>,
        elements: Vec<EntryElement>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            file_id,
            mood: mood.unwrap_or_else(default_mood),
            elements,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Record for Entry {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Register user request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterUserRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub about: Option<String>,
}

/// Update user request; only provided fields change
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub about: Option<String>,
    pub settings: Option<Map<String, Value>>,
}

/// Create file request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateFileRequest {
    pub name: String,
    pub icon: Option<String>,
    pub color: Option<String>,
}

/// Update file request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateFileRequest {
    pub name: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
}

/// Create entry request
#[derive(Debug, Clone, Deserialize)]
pub struct CreateEntryRequest {
    pub user_id: String,
    pub file_id: String,
    #[serde(default)]
    pub mood: Option<String>,
    #[serde(default)]
    pub elements: Vec<EntryElement>,
}

/// Update entry request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateEntryRequest {
    pub mood: Option<String>,
    pub elements: Option<Vec<EntryElement>>,
}

/// A file together with how many entries it holds
#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    #[serde(flatten)]
    pub file: File,
    pub entries_count: usize,
}

/// A file with its entries, newest first
#[derive(Debug, Clone, Serialize)]
pub struct FileDetail {
    #[serde(flatten)]
    pub file: File,
    pub entries: Vec<Entry>,
    pub entries_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_element_tagging() {
        let raw = json!([
            {"type": "text", "content": "hello"},
            {"type": "checklist", "items": [{"text": "a", "checked": true}, {"text": "b", "checked": false}]},
            {"type": "problem", "problem": "slow build"},
            {"type": "drawing", "strokes": [1, 2, 3]}
        ]);

        let elements: Vec<EntryElement> = serde_json::from_value(raw.clone()).unwrap();

        assert_eq!(elements[0].kind(), Some(ElementType::Text));
        assert_eq!(elements[1].kind(), Some(ElementType::Checklist));
        assert_eq!(elements[2].kind(), Some(ElementType::Problem));
        assert_eq!(elements[3].kind(), None);

        // Unknown blocks survive a write
        let written = serde_json::to_value(&elements).unwrap();
        assert_eq!(written[3], raw[3]);
        assert_eq!(written[0], raw[0]);
    }

    #[test]
    fn test_legacy_naive_timestamps_are_read_as_utc() {
        let parsed = timestamp::parse("2024-03-05T10:15:30.123456").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-03-05T10:15:30.123456+00:00");

        let parsed = timestamp::parse("2024-03-05T10:15:30").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-03-05T10:15:30+00:00");

        assert!(timestamp::parse("yesterday").is_none());
    }

    #[test]
    fn test_settings_merge_keeps_other_keys() {
        let mut settings = UserSettings::default();
        settings
            .merge(json!({"theme": "light", "font_size": 14}).as_object().unwrap().clone())
            .unwrap();

        assert_eq!(settings.theme, "light");
        assert!(settings.notifications);
        assert_eq!(settings.language, "ar");
        assert_eq!(settings.extra.get("font_size"), Some(&json!(14)));

        settings
            .merge(json!({"notifications": false}).as_object().unwrap().clone())
            .unwrap();
        assert!(!settings.notifications);
        assert_eq!(settings.theme, "light");
        assert_eq!(settings.extra.get("font_size"), Some(&json!(14)));
    }

    #[test]
    fn test_settings_merge_rejects_wrong_type() {
        let mut settings = UserSettings::default();
        let result = settings.merge(json!({"notifications": "loud"}).as_object().unwrap().clone());
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert!(settings.notifications);
    }

    #[test]
    fn test_user_defaults() {
        let user = User::new(
            "Ada".to_string(),
            "".to_string(),
            "ada@x.com".to_string(),
            "123".to_string(),
            String::new(),
        );
        assert_eq!(user.full_name(), "Ada");
        assert_eq!(user.avatar, config::DEFAULT_AVATAR_URL);
        assert!(!user.has_custom_avatar());
        assert_eq!(user.created_at, user.last_login);
    }
}
