use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use shared::{
    domain::{non_blank, Game, GameId, GameStatus, Grade, NewGame, DEFAULT_COVER_URL},
    query::{categories, console_vocabulary, GameFilter},
    transfer::{export_games, parse_import, prepare_import},
};
use storage::Storage;
use tracing::{debug, info, warn};

pub mod error;
mod rawg;

pub use error::BacklogError;
pub use rawg::{
    RawgCoverProvider, DEFAULT_LOOKUP_TIMEOUT, RAWG_DEFAULT_BASE_URL, RAWG_PLACEHOLDER_KEY,
};

/// Source of cover art for a game name.
///
/// `Ok(None)` means the catalog had nothing; errors are transport or decode
/// failures. The backlog treats both the same way and stores the placeholder.
#[async_trait]
pub trait CoverProvider: Send + Sync {
    async fn find_cover(&self, game_name: &str) -> Result<Option<String>>;
}

/// Used when no catalog is configured.
pub struct MissingCoverProvider;

#[async_trait]
impl CoverProvider for MissingCoverProvider {
    async fn find_cover(&self, _game_name: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    /// Records that had no cover and got one from the catalog.
    pub enriched: usize,
    /// Records that had no cover and fell back to the placeholder.
    pub placeholders: usize,
    pub reassigned_ids: usize,
}

/// The single owner of the record list.
///
/// Every mutation updates memory first and then mirrors the full list and
/// the derived console vocabulary to storage before returning. If the write
/// fails the in-memory list is put back as it was.
pub struct Backlog {
    storage: Storage,
    covers: Arc<dyn CoverProvider>,
    games: Vec<Game>,
}

impl Backlog {
    pub async fn open(
        storage: Storage,
        covers: Arc<dyn CoverProvider>,
    ) -> Result<Self, BacklogError> {
        let games = storage.load_games().await?;
        let derived = console_vocabulary(&games);
        match storage.load_consoles().await? {
            Some(stored) if stored == derived => {}
            stored => {
                debug!(
                    had_entry = stored.is_some(),
                    consoles = derived.len(),
                    "backlog: rebuilding console vocabulary"
                );
                storage.save_consoles(&derived).await?;
            }
        }
        info!(games = games.len(), "backlog: opened");

        Ok(Self {
            storage,
            covers,
            games,
        })
    }

    pub fn games(&self) -> &[Game] {
        &self.games
    }

    pub fn get(&self, id: &GameId) -> Option<&Game> {
        self.games.iter().find(|g| &g.id == id)
    }

    pub fn list<'a>(&'a self, filter: &'a GameFilter) -> Vec<&'a Game> {
        filter.apply(&self.games).collect()
    }

    pub fn consoles(&self) -> Vec<String> {
        console_vocabulary(&self.games)
    }

    pub fn categories(&self) -> Vec<String> {
        categories(&self.games)
    }

    /// Adds a record from the entry form, then fills its cover in.
    ///
    /// The record is saved before the lookup starts, so a slow or failing
    /// catalog never loses the entry.
    pub async fn add_game(&mut self, new_game: NewGame) -> Result<Game, BacklogError> {
        let taken: HashSet<&GameId> = self.games.iter().map(|g| &g.id).collect();
        let mut id = GameId::generate();
        while taken.contains(&id) {
            id = GameId::generate();
        }

        let game = new_game.into_game(id.clone())?;
        let name = game.name.clone();
        let snapshot = self.games.clone();
        self.games.push(game);
        self.commit(snapshot).await?;
        info!(game_id = %id, name = %name, "backlog: game added");

        let cover = self.lookup_cover(&name).await;
        let snapshot = self.games.clone();
        let game = self.apply_cover(&id, cover)?;
        self.commit(snapshot).await?;
        Ok(game)
    }

    /// Merges the records of an import file into the backlog.
    ///
    /// A payload that is not an array of valid entries is rejected before
    /// anything changes. Entries without a cover are looked up concurrently.
    pub async fn import_json(&mut self, text: &str) -> Result<ImportReport, BacklogError> {
        let entries = parse_import(text)?;
        let existing: HashSet<GameId> = self.games.iter().map(|g| g.id.clone()).collect();
        let mut batch = prepare_import(&existing, entries);

        let pending: Vec<(GameId, String)> = batch
            .games
            .iter()
            .filter(|g| g.cover_url.is_none())
            .map(|g| (g.id.clone(), g.name.clone()))
            .collect();
        let this = &*self;
        let lookups = pending
            .iter()
            .map(|(id, name)| async move { (id.clone(), this.lookup_cover(name).await) });
        let covers: HashMap<GameId, Option<String>> =
            join_all(lookups).await.into_iter().collect();

        let mut report = ImportReport {
            imported: batch.games.len(),
            reassigned_ids: batch.reassigned,
            ..ImportReport::default()
        };
        for game in batch.games.iter_mut() {
            let Some(cover) = covers.get(&game.id) else {
                continue;
            };
            match cover {
                Some(url) => {
                    report.enriched += 1;
                    game.cover_url = Some(url.clone());
                }
                None => {
                    report.placeholders += 1;
                    game.cover_url = Some(DEFAULT_COVER_URL.to_string());
                }
            }
        }

        let snapshot = self.games.clone();
        self.games.append(&mut batch.games);
        self.commit(snapshot).await?;
        info!(
            imported = report.imported,
            enriched = report.enriched,
            placeholders = report.placeholders,
            reassigned_ids = report.reassigned_ids,
            "backlog: import finished"
        );
        Ok(report)
    }

    pub async fn start(&mut self, id: &GameId) -> Result<Game, BacklogError> {
        self.transition(id, GameStatus::Todo, GameStatus::InProgress, |_| {})
            .await
    }

    /// Back to todo; rating and comment are kept.
    pub async fn stop(&mut self, id: &GameId) -> Result<Game, BacklogError> {
        self.transition(id, GameStatus::InProgress, GameStatus::Todo, |_| {})
            .await
    }

    pub async fn end_game(
        &mut self,
        id: &GameId,
        grade: Grade,
        comment: Option<String>,
    ) -> Result<Game, BacklogError> {
        let comment = non_blank(comment);
        self.transition(id, GameStatus::InProgress, GameStatus::Completed, |game| {
            game.personal_rating = Some(grade.as_rating());
            game.comment = comment;
        })
        .await
    }

    /// Completed back to todo, dropping the rating and comment. Callers are
    /// expected to have confirmed with the user.
    pub async fn restart(&mut self, id: &GameId) -> Result<Game, BacklogError> {
        self.transition(id, GameStatus::Completed, GameStatus::Todo, |game| {
            game.personal_rating = None;
            game.comment = None;
        })
        .await
    }

    /// Replaces the comment in any status; a blank comment clears it.
    pub async fn edit_comment(
        &mut self,
        id: &GameId,
        comment: &str,
    ) -> Result<Game, BacklogError> {
        let snapshot = self.games.clone();
        let game = self.find_mut(id)?;
        game.comment = non_blank(Some(comment.to_string()));
        let game = game.clone();
        self.commit(snapshot).await?;
        info!(game_id = %id, "backlog: comment updated");
        Ok(game)
    }

    pub async fn delete(&mut self, id: &GameId) -> Result<Game, BacklogError> {
        let index = self
            .games
            .iter()
            .position(|g| &g.id == id)
            .ok_or_else(|| BacklogError::NotFound(id.clone()))?;
        let snapshot = self.games.clone();
        let removed = self.games.remove(index);
        self.commit(snapshot).await?;
        info!(game_id = %id, name = %removed.name, "backlog: game deleted");
        Ok(removed)
    }

    /// Runs the catalog lookup again for one record.
    pub async fn refresh_cover(&mut self, id: &GameId) -> Result<Game, BacklogError> {
        let name = self.find(id)?.name.clone();
        let cover = self.lookup_cover(&name).await;
        let snapshot = self.games.clone();
        let game = self.apply_cover(id, cover)?;
        self.commit(snapshot).await?;
        Ok(game)
    }

    pub fn export_json(&self) -> Result<String, BacklogError> {
        export_games(&self.games).map_err(|e| BacklogError::Storage(e.into()))
    }

    /// Moves a record that is currently in `from` to `to`.
    async fn transition<F>(
        &mut self,
        id: &GameId,
        from: GameStatus,
        to: GameStatus,
        update: F,
    ) -> Result<Game, BacklogError>
    where
        F: FnOnce(&mut Game),
    {
        let snapshot = self.games.clone();
        let game = self.find_mut(id)?;
        if game.status != from || !from.can_transition_to(to) {
            return Err(BacklogError::InvalidTransition {
                id: id.clone(),
                from: game.status,
                to,
            });
        }
        game.status = to;
        update(game);
        let game = game.clone();
        self.commit(snapshot).await?;
        info!(game_id = %id, %from, %to, "backlog: status changed");
        Ok(game)
    }

    /// Stores a lookup result on the record with `id`, the placeholder when
    /// the catalog had nothing.
    fn apply_cover(&mut self, id: &GameId, cover: Option<String>) -> Result<Game, BacklogError> {
        let game = self.find_mut(id)?;
        game.cover_url = Some(cover.unwrap_or_else(|| DEFAULT_COVER_URL.to_string()));
        Ok(game.clone())
    }

    async fn lookup_cover(&self, name: &str) -> Option<String> {
        match self.covers.find_cover(name).await {
            Ok(cover) => cover,
            Err(err) => {
                let error = format!("{err:#}");
                warn!(%error, name, "covers: lookup failed, using placeholder");
                None
            }
        }
    }

    fn find(&self, id: &GameId) -> Result<&Game, BacklogError> {
        self.get(id).ok_or_else(|| BacklogError::NotFound(id.clone()))
    }

    fn find_mut(&mut self, id: &GameId) -> Result<&mut Game, BacklogError> {
        self.games
            .iter_mut()
            .find(|g| &g.id == id)
            .ok_or_else(|| BacklogError::NotFound(id.clone()))
    }

    async fn persist(&self) -> Result<(), BacklogError> {
        let consoles = console_vocabulary(&self.games);
        self.storage.save_library(&self.games, &consoles).await?;
        Ok(())
    }

    /// Persists the current list, or restores `snapshot` if that fails.
    async fn commit(&mut self, snapshot: Vec<Game>) -> Result<(), BacklogError> {
        if let Err(err) = self.persist().await {
            warn!(error = %err, "backlog: write failed, changes rolled back");
            self.games = snapshot;
            return Err(err);
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
