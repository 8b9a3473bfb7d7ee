use std::collections::BTreeSet;

use crate::domain::{console_tags, Game, GameStatus};

/// Predicates applied by the list view. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameFilter {
    pub search: Option<String>,
    pub status: Option<GameStatus>,
    pub category: Option<String>,
    pub console: Option<String>,
}

impl GameFilter {
    pub fn matches(&self, game: &Game) -> bool {
        let matches_search = match self.search.as_deref() {
            Some(search) => game
                .name
                .to_lowercase()
                .contains(&search.to_lowercase()),
            None => true,
        };
        let matches_status = match self.status {
            Some(status) => game.status == status,
            None => true,
        };
        let matches_category = match self.category.as_deref() {
            Some(category) => game.category.as_deref() == Some(category),
            None => true,
        };
        let matches_console = match self.console.as_deref() {
            Some(console) => game.has_console(console),
            None => true,
        };

        matches_search && matches_status && matches_category && matches_console
    }

    pub fn apply<'a>(&'a self, games: &'a [Game]) -> impl Iterator<Item = &'a Game> + 'a {
        games.iter().filter(move |game| self.matches(game))
    }
}

/// Sorted, deduplicated union of every record's console tags, split by the
/// same rule `Game::has_console` matches on.
pub fn console_vocabulary<'a, I>(games: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a Game>,
{
    games
        .into_iter()
        .flat_map(|game| console_tags(&game.console))
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Distinct non-empty categories in first-seen order.
pub fn categories(games: &[Game]) -> Vec<String> {
    let mut seen = Vec::new();
    for category in games.iter().filter_map(|g| g.category.as_deref()) {
        if !category.is_empty() && !seen.iter().any(|c: &String| c == category) {
            seen.push(category.to_string());
        }
    }
    seen
}

#[cfg(test)]
#[path = "tests/query_tests.rs"]
mod tests;
