use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;

use crate::{
    domain::{deserialize_console_tags, non_blank, normalize_consoles, Game, GameId, GameStatus},
    error::ImportError,
};

/// One element of an import file, before ids are settled.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedGame {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "deserialize_console_tags")]
    pub console: Vec<String>,
    #[serde(default)]
    pub status: Option<GameStatus>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub personal_rating: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub cover_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ImportBatch {
    pub games: Vec<Game>,
    /// Ids that were missing or already taken and had to be regenerated.
    pub reassigned: usize,
}

/// Parses an import file. Anything but a JSON array of game-shaped objects
/// with a name and at least one console is rejected as a whole.
pub fn parse_import(text: &str) -> Result<Vec<ImportedGame>, ImportError> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Array(entries) = value else {
        return Err(ImportError::NotAnArray);
    };

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            let imported: ImportedGame =
                serde_json::from_value(entry).map_err(|e| ImportError::InvalidEntry {
                    index,
                    reason: e.to_string(),
                })?;
            if imported.name.trim().is_empty() {
                return Err(ImportError::InvalidEntry {
                    index,
                    reason: "name is empty".into(),
                });
            }
            if normalize_consoles(&imported.console).is_empty() {
                return Err(ImportError::InvalidEntry {
                    index,
                    reason: "no console".into(),
                });
            }
            Ok(imported)
        })
        .collect()
}

/// Turns parsed entries into records, keeping each id unless it is blank or
/// collides with `existing` or an earlier entry.
pub fn prepare_import(existing: &HashSet<GameId>, entries: Vec<ImportedGame>) -> ImportBatch {
    let mut taken: HashSet<GameId> = existing.clone();
    let mut batch = ImportBatch::default();

    for entry in entries {
        let proposed = entry
            .id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(GameId::from);
        let id = match proposed {
            Some(id) if !taken.contains(&id) => id,
            _ => {
                batch.reassigned += 1;
                fresh_id(&taken)
            }
        };
        taken.insert(id.clone());

        batch.games.push(Game {
            id,
            name: entry.name.trim().to_string(),
            category: non_blank(entry.category),
            console: normalize_consoles(&entry.console),
            status: entry.status.unwrap_or_default(),
            note: non_blank(entry.note),
            personal_rating: non_blank(entry.personal_rating),
            comment: non_blank(entry.comment),
            cover_url: non_blank(entry.cover_url),
        });
    }

    batch
}

fn fresh_id(taken: &HashSet<GameId>) -> GameId {
    loop {
        let id = GameId::generate();
        if !taken.contains(&id) {
            return id;
        }
    }
}

/// Serializes the whole list in the same shape `parse_import` accepts.
pub fn export_games(games: &[Game]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(games)
}

#[cfg(test)]
#[path = "tests/transfer_tests.rs"]
mod tests;
