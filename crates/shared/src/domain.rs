use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Cover reference stored when enrichment yields nothing.
pub const DEFAULT_COVER_URL: &str = "/default-cover.png";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(pub String);

impl GameId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GameId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for GameId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GameStatus {
    #[default]
    Todo,
    InProgress,
    Completed,
}

impl GameStatus {
    pub const ALL: [GameStatus; 3] = [
        GameStatus::Todo,
        GameStatus::InProgress,
        GameStatus::Completed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            GameStatus::Todo => "todo",
            GameStatus::InProgress => "in-progress",
            GameStatus::Completed => "completed",
        }
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// Completed records only leave through an explicit restart back to todo.
    pub fn can_transition_to(self, next: GameStatus) -> bool {
        matches!(
            (self, next),
            (GameStatus::Todo, GameStatus::InProgress)
                | (GameStatus::InProgress, GameStatus::Todo)
                | (GameStatus::InProgress, GameStatus::Completed)
                | (GameStatus::Completed, GameStatus::Todo)
        )
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "todo" => Ok(GameStatus::Todo),
            "in-progress" | "in_progress" | "inprogress" => Ok(GameStatus::InProgress),
            "completed" => Ok(GameStatus::Completed),
            other => Err(ValidationError::UnknownStatus(other.to_string())),
        }
    }
}

/// End-of-game grade on a 0..=10 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Grade(u8);

impl Grade {
    pub const MAX: u8 = 10;

    pub fn new(value: u8) -> Result<Self, ValidationError> {
        if value > Self::MAX {
            return Err(ValidationError::GradeOutOfRange {
                max: Self::MAX,
                actual: value,
            });
        }
        Ok(Self(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// The stored personal rating string, e.g. `8/10`.
    pub fn as_rating(self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.0, Self::MAX)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub id: GameId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "deserialize_console_tags")]
    pub console: Vec<String>,
    #[serde(default)]
    pub status: GameStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personal_rating: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
}

impl Game {
    pub fn has_console(&self, tag: &str) -> bool {
        let tag = tag.trim();
        console_tags(&self.console).any(|c| c == tag)
    }

    pub fn cover_or_default(&self) -> &str {
        self.cover_url.as_deref().unwrap_or(DEFAULT_COVER_URL)
    }
}

/// Older saves stored a single comma-joined string instead of a list.
#[derive(Deserialize)]
#[serde(untagged)]
enum ConsoleTags {
    Many(Vec<String>),
    One(String),
}

pub(crate) fn deserialize_console_tags<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let tags = match Option::<ConsoleTags>::deserialize(deserializer)? {
        Some(ConsoleTags::Many(tags)) => tags,
        Some(ConsoleTags::One(tag)) => vec![tag],
        None => Vec::new(),
    };
    Ok(normalize_consoles(&tags))
}

/// Fields collected by the add-game form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewGame {
    pub name: String,
    pub consoles: Vec<String>,
    pub status: GameStatus,
    pub category: Option<String>,
    pub note: Option<String>,
    pub personal_rating: Option<String>,
    pub comment: Option<String>,
}

impl NewGame {
    pub fn new(name: impl Into<String>, consoles: Vec<String>) -> Self {
        Self {
            name: name.into(),
            consoles,
            ..Self::default()
        }
    }

    /// Trims every field and rejects an empty name or console set.
    ///
    /// The returned record has no cover yet.
    pub fn into_game(self, id: GameId) -> Result<Game, ValidationError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }

        let console = normalize_consoles(&self.consoles);
        if console.is_empty() {
            return Err(ValidationError::EmptyConsoles);
        }

        Ok(Game {
            id,
            name,
            category: non_blank(self.category),
            console,
            status: self.status,
            note: non_blank(self.note),
            personal_rating: non_blank(self.personal_rating),
            comment: non_blank(self.comment),
            cover_url: None,
        })
    }
}

/// Splits comma-joined tags, trims them and drops blanks and repeats,
/// keeping first-seen order.
pub fn normalize_consoles(tags: &[String]) -> Vec<String> {
    let mut console: Vec<String> = Vec::with_capacity(tags.len());
    for tag in console_tags(tags) {
        if !console.iter().any(|c| c == tag) {
            console.push(tag.to_string());
        }
    }
    console
}

/// The individual tags of a console list, legacy comma-joined entries
/// included.
pub(crate) fn console_tags<'a>(tags: &'a [String]) -> impl Iterator<Item = &'a str> + 'a {
    tags.iter()
        .flat_map(|tag| tag.split(','))
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
}

pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
