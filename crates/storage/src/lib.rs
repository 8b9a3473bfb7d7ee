use anyhow::{Context, Result};
use shared::domain::Game;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{fs, path::Path, str::FromStr};
use tracing::warn;

/// Entry holding the full record list as a JSON array.
pub const GAMES_KEY: &str = "games";
/// Entry holding the derived console vocabulary as a JSON string array.
pub const CONSOLES_KEY: &str = "consoles";

const UPSERT_ENTRY: &str = "INSERT INTO kv_entries (key, value, updated_at)
     VALUES (?, ?, CURRENT_TIMESTAMP)
     ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP";

/// Durable key-value store backed by a single SQLite table.
#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        let connect_options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid database url '{database_url}'"))?
            .create_if_missing(true);
        if let Some(dir) = database_dir(&connect_options) {
            fs::create_dir_all(dir).with_context(|| {
                format!("failed to create database directory '{}'", dir.display())
            })?;
        }

        // every in-memory connection is its own database
        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open database '{database_url}'"))?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run storage migrations")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn get_item(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM kv_entries WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to read entry '{key}'"))?;
        Ok(row.map(|r| r.get::<String, _>(0)))
    }

    pub async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(UPSERT_ENTRY)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to write entry '{key}'"))?;
        Ok(())
    }

    /// Returns whether an entry was removed.
    pub async fn remove_item(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM kv_entries WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to remove entry '{key}'"))?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn keys(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT key FROM kv_entries ORDER BY key")
            .fetch_all(&self.pool)
            .await
            .context("failed to list entries")?;
        Ok(rows.into_iter().map(|r| r.get::<String, _>(0)).collect())
    }

    /// Loads the record list; a missing entry is an empty backlog.
    pub async fn load_games(&self) -> Result<Vec<Game>> {
        let Some(raw) = self.get_item(GAMES_KEY).await? else {
            return Ok(Vec::new());
        };
        serde_json::from_str(&raw)
            .with_context(|| format!("stored '{GAMES_KEY}' entry is corrupt"))
    }

    pub async fn save_games(&self, games: &[Game]) -> Result<()> {
        let raw = serde_json::to_string(games).context("failed to serialize games")?;
        self.set_item(GAMES_KEY, &raw).await
    }

    /// Loads the console vocabulary. A corrupt entry reads as absent so the
    /// caller rebuilds it from the records.
    pub async fn load_consoles(&self) -> Result<Option<Vec<String>>> {
        let Some(raw) = self.get_item(CONSOLES_KEY).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(consoles) => Ok(Some(consoles)),
            Err(e) => {
                warn!(error = %e, "storage: ignoring corrupt consoles entry");
                Ok(None)
            }
        }
    }

    pub async fn save_consoles(&self, consoles: &[String]) -> Result<()> {
        let raw = serde_json::to_string(consoles).context("failed to serialize consoles")?;
        self.set_item(CONSOLES_KEY, &raw).await
    }

    /// Writes the record list and the vocabulary in one transaction.
    pub async fn save_library(&self, games: &[Game], consoles: &[String]) -> Result<()> {
        let games_raw = serde_json::to_string(games).context("failed to serialize games")?;
        let consoles_raw =
            serde_json::to_string(consoles).context("failed to serialize consoles")?;

        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin library write")?;
        let entries = [
            (GAMES_KEY, games_raw.as_str()),
            (CONSOLES_KEY, consoles_raw.as_str()),
        ];
        for (key, value) in entries {
            sqlx::query(UPSERT_ENTRY)
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("failed to write entry '{key}'"))?;
        }
        tx.commit().await.context("failed to commit library write")?;
        Ok(())
    }
}

/// Directory holding a file-backed database. In-memory and bare file names
/// have none to create.
fn database_dir(options: &SqliteConnectOptions) -> Option<&Path> {
    options
        .get_filename()
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
