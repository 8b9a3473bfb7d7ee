use super::*;
use anyhow::anyhow;
use shared::error::{ErrorCode, ValidationError};
use storage::GAMES_KEY;
use tokio::sync::Mutex;

/// Catalog double: known names map to covers, everything else has none.
struct StubCoverProvider {
    covers: HashMap<String, String>,
    fail_with: Option<String>,
    lookups: Arc<Mutex<Vec<String>>>,
}

impl StubCoverProvider {
    fn with_covers(covers: &[(&str, &str)]) -> Self {
        Self {
            covers: covers
                .iter()
                .map(|(name, url)| (name.to_string(), url.to_string()))
                .collect(),
            fail_with: None,
            lookups: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn failing(err: impl Into<String>) -> Self {
        let mut provider = Self::with_covers(&[]);
        provider.fail_with = Some(err.into());
        provider
    }
}

#[async_trait]
impl CoverProvider for StubCoverProvider {
    async fn find_cover(&self, game_name: &str) -> Result<Option<String>> {
        self.lookups.lock().await.push(game_name.to_string());
        if let Some(err) = &self.fail_with {
            return Err(anyhow!(err.clone()));
        }
        Ok(self.covers.get(game_name).cloned())
    }
}

async fn open_backlog(provider: StubCoverProvider) -> (Backlog, Storage, Arc<Mutex<Vec<String>>>) {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let lookups = provider.lookups.clone();
    let backlog = Backlog::open(storage.clone(), Arc::new(provider))
        .await
        .expect("open backlog");
    (backlog, storage, lookups)
}

fn form(name: &str, consoles: &[&str]) -> NewGame {
    NewGame::new(name, consoles.iter().map(|c| c.to_string()).collect())
}

async fn assert_vocabulary_in_sync(backlog: &Backlog, storage: &Storage) {
    let stored = storage
        .load_consoles()
        .await
        .expect("load consoles")
        .expect("consoles entry");
    assert_eq!(stored, console_vocabulary(backlog.games()));
    assert_eq!(storage.load_games().await.expect("load games"), backlog.games());
}

#[tokio::test]
async fn open_initializes_missing_console_vocabulary() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let seeded = r#"[{"id":"1","name":"Metroid Prime","console":["Gamecube","Switch"],"status":"todo"},
                     {"id":"2","name":"Pikmin","console":"Gamecube, Wii","status":"completed"}]"#;
    storage.set_item(GAMES_KEY, seeded).await.expect("seed");

    let backlog = Backlog::open(storage.clone(), Arc::new(MissingCoverProvider))
        .await
        .expect("open");

    assert_eq!(backlog.games().len(), 2);
    assert_eq!(
        storage.load_consoles().await.expect("consoles"),
        Some(vec![
            "Gamecube".to_string(),
            "Switch".to_string(),
            "Wii".to_string()
        ])
    );
}

#[tokio::test]
async fn add_game_fetches_cover_and_persists() {
    let provider = StubCoverProvider::with_covers(&[("Celeste", "https://media.example/celeste.jpg")]);
    let (mut backlog, storage, lookups) = open_backlog(provider).await;

    let game = backlog
        .add_game(form(" Celeste ", &["PC", "Switch"]))
        .await
        .expect("add");

    assert_eq!(game.name, "Celeste");
    assert_eq!(game.status, GameStatus::Todo);
    assert_eq!(game.cover_url.as_deref(), Some("https://media.example/celeste.jpg"));
    assert_eq!(*lookups.lock().await, ["Celeste"]);
    assert_eq!(backlog.consoles(), ["PC", "Switch"]);
    assert_vocabulary_in_sync(&backlog, &storage).await;
}

#[tokio::test]
async fn add_game_without_lookup_result_gets_placeholder() {
    let (mut backlog, _storage, _) = open_backlog(StubCoverProvider::with_covers(&[])).await;

    let game = backlog
        .add_game(form("Obscure Homebrew", &["NES"]))
        .await
        .expect("add");
    assert_eq!(game.cover_url.as_deref(), Some(DEFAULT_COVER_URL));
}

#[tokio::test]
async fn add_game_survives_lookup_failure() {
    let (mut backlog, storage, _) = open_backlog(StubCoverProvider::failing("connection reset")).await;

    let game = backlog
        .add_game(form("Hades", &["PC"]))
        .await
        .expect("lookup failure is not surfaced");
    assert_eq!(game.cover_url.as_deref(), Some(DEFAULT_COVER_URL));
    assert_eq!(storage.load_games().await.expect("games").len(), 1);
}

#[tokio::test]
async fn add_game_rejects_missing_fields_without_saving() {
    let (mut backlog, storage, lookups) = open_backlog(StubCoverProvider::with_covers(&[])).await;

    let err = backlog.add_game(form("  ", &["PC"])).await.expect_err("no name");
    assert!(matches!(err, BacklogError::Validation(ValidationError::EmptyName)));
    assert_eq!(err.code(), ErrorCode::Validation);

    let err = backlog.add_game(form("Tunic", &[])).await.expect_err("no console");
    assert!(matches!(err, BacklogError::Validation(ValidationError::EmptyConsoles)));

    assert!(backlog.games().is_empty());
    assert!(storage.load_games().await.expect("games").is_empty());
    assert!(lookups.lock().await.is_empty());
}

#[tokio::test]
async fn lifecycle_start_stop_end_restart() {
    let (mut backlog, storage, _) = open_backlog(StubCoverProvider::with_covers(&[])).await;
    let id = backlog.add_game(form("Okami", &["PS2"])).await.expect("add").id;

    let game = backlog.start(&id).await.expect("start");
    assert_eq!(game.status, GameStatus::InProgress);

    let game = backlog
        .edit_comment(&id, "wolf painting")
        .await
        .expect("comment");
    assert_eq!(game.comment.as_deref(), Some("wolf painting"));

    let game = backlog.stop(&id).await.expect("stop");
    assert_eq!(game.status, GameStatus::Todo);
    assert_eq!(game.comment.as_deref(), Some("wolf painting"));

    backlog.start(&id).await.expect("start again");
    let game = backlog
        .end_game(&id, Grade::new(9).expect("grade"), Some(" Beautiful ".into()))
        .await
        .expect("end");
    assert_eq!(game.status, GameStatus::Completed);
    assert_eq!(game.personal_rating.as_deref(), Some("9/10"));
    assert_eq!(game.comment.as_deref(), Some("Beautiful"));

    let game = backlog.restart(&id).await.expect("restart");
    assert_eq!(game.status, GameStatus::Todo);
    assert_eq!(game.personal_rating, None);
    assert_eq!(game.comment, None);

    let stored = storage.load_games().await.expect("games");
    assert_eq!(stored[0], game);
}

#[tokio::test]
async fn invalid_transitions_leave_record_untouched() {
    let (mut backlog, storage, _) = open_backlog(StubCoverProvider::with_covers(&[])).await;
    let id = backlog.add_game(form("Tetris", &["GB"])).await.expect("add").id;
    let before = backlog.get(&id).cloned().expect("present");

    let grade = Grade::new(7).expect("grade");
    for err in [
        backlog.stop(&id).await.expect_err("stop from todo"),
        backlog.end_game(&id, grade, None).await.expect_err("end from todo"),
        backlog.restart(&id).await.expect_err("restart from todo"),
    ] {
        assert!(
            matches!(err, BacklogError::InvalidTransition { from: GameStatus::Todo, .. }),
            "{err}"
        );
        assert_eq!(err.code(), ErrorCode::InvalidTransition);
    }

    backlog.start(&id).await.expect("start");
    backlog.end_game(&id, grade, None).await.expect("end");
    let err = backlog.stop(&id).await.expect_err("stop from completed");
    assert!(matches!(
        err,
        BacklogError::InvalidTransition {
            from: GameStatus::Completed,
            to: GameStatus::Todo,
            ..
        }
    ));
    let err = backlog.start(&id).await.expect_err("start from completed");
    assert!(matches!(err, BacklogError::InvalidTransition { .. }));

    let after = backlog.get(&id).cloned().expect("present");
    assert_eq!(after.status, GameStatus::Completed);
    assert_eq!(after.name, before.name);
    assert_eq!(storage.load_games().await.expect("games"), vec![after]);
}

#[tokio::test]
async fn delete_removes_exactly_one_record() {
    let (mut backlog, storage, _) = open_backlog(StubCoverProvider::with_covers(&[])).await;
    let a = backlog.add_game(form("Doom", &["PC"])).await.expect("a").id;
    let b = backlog.add_game(form("Quake", &["PC", "N64"])).await.expect("b").id;
    let c = backlog.add_game(form("Hexen", &["PC"])).await.expect("c").id;

    let removed = backlog.delete(&b).await.expect("delete");
    assert_eq!(removed.id, b);

    let remaining: Vec<&GameId> = backlog.games().iter().map(|g| &g.id).collect();
    assert_eq!(remaining, [&a, &c]);
    assert_eq!(backlog.consoles(), ["PC"]);
    assert_vocabulary_in_sync(&backlog, &storage).await;

    let err = backlog.delete(&b).await.expect_err("already gone");
    assert!(matches!(err, BacklogError::NotFound(ref id) if *id == b));
    assert_eq!(backlog.games().len(), 2);
}

#[tokio::test]
async fn import_merges_records_and_enriches_missing_covers() {
    let provider = StubCoverProvider::with_covers(&[("Hollow Knight", "https://media.example/hk.jpg")]);
    let (mut backlog, storage, lookups) = open_backlog(provider).await;
    backlog.add_game(form("Celeste", &["PC"])).await.expect("add");
    lookups.lock().await.clear();

    let payload = r#"[
        {"id":"hk","name":"Hollow Knight","console":["Switch"],"status":"in-progress"},
        {"id":"sk","name":"Shovel Knight","console":["3DS"],"coverUrl":"https://cdn.example/sk.png"},
        {"name":"Unknown Indie","console":["PC"],"category":"Indie"}
    ]"#;
    let report = backlog.import_json(payload).await.expect("import");

    assert_eq!(
        report,
        ImportReport {
            imported: 3,
            enriched: 1,
            placeholders: 1,
            reassigned_ids: 1,
        }
    );
    let mut looked_up = lookups.lock().await.clone();
    looked_up.sort();
    assert_eq!(looked_up, ["Hollow Knight", "Unknown Indie"]);

    assert_eq!(backlog.games().len(), 4);
    let hk = backlog.get(&GameId::from("hk")).expect("hk");
    assert_eq!(hk.cover_url.as_deref(), Some("https://media.example/hk.jpg"));
    assert_eq!(hk.status, GameStatus::InProgress);
    let sk = backlog.get(&GameId::from("sk")).expect("sk");
    assert_eq!(sk.cover_url.as_deref(), Some("https://cdn.example/sk.png"));
    let indie = &backlog.games()[3];
    assert_eq!(indie.cover_url.as_deref(), Some(DEFAULT_COVER_URL));

    assert_eq!(backlog.consoles(), ["3DS", "PC", "Switch"]);
    assert_eq!(backlog.categories(), ["Indie"]);
    assert_vocabulary_in_sync(&backlog, &storage).await;
}

#[tokio::test]
async fn import_of_non_array_leaves_backlog_unchanged() {
    let (mut backlog, storage, lookups) = open_backlog(StubCoverProvider::with_covers(&[])).await;
    backlog.add_game(form("Celeste", &["PC"])).await.expect("add");
    let before = backlog.games().to_vec();
    lookups.lock().await.clear();

    for payload in [
        r#"{"name":"Hades","console":["PC"]}"#,
        "\"just a string\"",
        "not json at all",
        r#"[{"name":"Hades","console":["PC"]}, 42]"#,
    ] {
        let err = backlog.import_json(payload).await.expect_err("rejected");
        assert_eq!(err.code(), ErrorCode::InvalidImport, "{payload}");
        assert_eq!(backlog.games(), before.as_slice());
        assert_eq!(storage.load_games().await.expect("games"), before);
    }
    assert!(lookups.lock().await.is_empty());
}

#[tokio::test]
async fn import_reassigns_colliding_ids() {
    let (mut backlog, _storage, _) = open_backlog(StubCoverProvider::with_covers(&[])).await;
    let existing = backlog.add_game(form("Celeste", &["PC"])).await.expect("add").id;

    let payload = format!(r#"[{{"id":"{existing}","name":"Celeste B-Sides","console":["PC"]}}]"#);
    let report = backlog.import_json(&payload).await.expect("import");
    assert_eq!(report.reassigned_ids, 1);

    let ids: HashSet<&GameId> = backlog.games().iter().map(|g| &g.id).collect();
    assert_eq!(ids.len(), 2);
    assert_eq!(backlog.get(&existing).expect("original").name, "Celeste");
}

#[tokio::test]
async fn list_applies_filter_predicates() {
    let (mut backlog, _storage, _) = open_backlog(StubCoverProvider::with_covers(&[])).await;
    let mut mario = form("Super Mario 64", &["N64"]);
    mario.category = Some("Mario".into());
    backlog.add_game(mario).await.expect("mario");
    let zelda = backlog
        .add_game(form("Ocarina of Time", &["N64", "3DS"]))
        .await
        .expect("zelda");
    backlog.start(&zelda.id).await.expect("start");

    let filter = GameFilter {
        console: Some("N64".into()),
        status: Some(GameStatus::InProgress),
        ..GameFilter::default()
    };
    let names: Vec<&str> = backlog.list(&filter).iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, ["Ocarina of Time"]);

    let filter = GameFilter {
        search: Some("mario".into()),
        category: Some("Mario".into()),
        ..GameFilter::default()
    };
    assert_eq!(backlog.list(&filter).len(), 1);
}

#[tokio::test]
async fn refresh_cover_replaces_placeholder() {
    let (mut backlog, _storage, _) = open_backlog(StubCoverProvider::with_covers(&[])).await;
    let game = backlog.add_game(form("Braid", &["PC"])).await.expect("add");
    assert_eq!(game.cover_url.as_deref(), Some(DEFAULT_COVER_URL));

    backlog.covers = Arc::new(StubCoverProvider::with_covers(&[(
        "Braid",
        "https://media.example/braid.jpg",
    )]));
    let game = backlog.refresh_cover(&game.id).await.expect("refresh");
    assert_eq!(game.cover_url.as_deref(), Some("https://media.example/braid.jpg"));
}

#[tokio::test]
async fn export_round_trips_through_import() {
    let (mut backlog, _storage, _) = open_backlog(StubCoverProvider::with_covers(&[])).await;
    let id = backlog.add_game(form("Outer Wilds", &["PC"])).await.expect("add").id;
    backlog.start(&id).await.expect("start");
    let exported = backlog.export_json().expect("export");

    let (mut other, _other_storage, lookups) =
        open_backlog(StubCoverProvider::with_covers(&[])).await;
    other.import_json(&exported).await.expect("import");
    assert_eq!(other.games(), backlog.games());
    assert!(lookups.lock().await.is_empty(), "covers already present");
}

#[tokio::test]
async fn comma_joined_consoles_are_stored_as_separate_tags() {
    let (mut backlog, storage, _) = open_backlog(StubCoverProvider::with_covers(&[])).await;
    backlog
        .import_json(r#"[{"id":"a","name":"Hades","console":"Switch, PC"}]"#)
        .await
        .expect("import");
    let celeste = backlog
        .add_game(form("Celeste", &["Switch, PC"]))
        .await
        .expect("add");

    assert_eq!(celeste.console, ["Switch", "PC"]);
    let hades = backlog.get(&GameId::from("a")).expect("hades");
    assert_eq!(hades.console, ["Switch", "PC"]);
    assert_eq!(backlog.consoles(), ["PC", "Switch"]);

    for console in backlog.consoles() {
        let filter = GameFilter {
            console: Some(console.clone()),
            ..GameFilter::default()
        };
        assert_eq!(backlog.list(&filter).len(), 2, "{console}");
    }
    assert_vocabulary_in_sync(&backlog, &storage).await;
}

#[tokio::test]
async fn legacy_comma_joined_tags_are_split_on_open() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage
        .set_item(GAMES_KEY, r#"[{"id":"1","name":"Pikmin","console":"Gamecube, Wii"}]"#)
        .await
        .expect("seed");

    let backlog = Backlog::open(storage, Arc::new(MissingCoverProvider))
        .await
        .expect("open");
    assert_eq!(backlog.games()[0].console, ["Gamecube", "Wii"]);
    let wii = GameFilter {
        console: Some("Wii".into()),
        ..GameFilter::default()
    };
    assert_eq!(backlog.list(&wii).len(), 1);
}

/// Answers later for names that come earlier in an import.
struct SlowCoverProvider {
    delays: HashMap<String, u64>,
    finished: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl CoverProvider for SlowCoverProvider {
    async fn find_cover(&self, game_name: &str) -> Result<Option<String>> {
        let delay = self.delays.get(game_name).copied().unwrap_or_default();
        tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        self.finished.lock().await.push(game_name.to_string());
        Ok(Some(format!("https://covers.example/{}.jpg", game_name.to_lowercase())))
    }
}

#[tokio::test]
async fn import_merges_out_of_order_lookups_by_record() {
    let finished = Arc::new(Mutex::new(Vec::new()));
    let provider = SlowCoverProvider {
        delays: [("Alpha", 300), ("Beta", 150), ("Gamma", 0)]
            .into_iter()
            .map(|(name, ms)| (name.to_string(), ms))
            .collect(),
        finished: finished.clone(),
    };
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let mut backlog = Backlog::open(storage.clone(), Arc::new(provider))
        .await
        .expect("open");

    let payload = r#"[
        {"id":"a","name":"Alpha","console":["PC"]},
        {"id":"b","name":"Beta","console":["PC"]},
        {"id":"g","name":"Gamma","console":["PC"]}
    ]"#;
    let report = backlog.import_json(payload).await.expect("import");
    assert_eq!(report.enriched, 3);

    assert_eq!(*finished.lock().await, ["Gamma", "Beta", "Alpha"]);
    let names: Vec<&str> = backlog.games().iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, ["Alpha", "Beta", "Gamma"]);
    for game in backlog.games() {
        let expected = format!("https://covers.example/{}.jpg", game.name.to_lowercase());
        assert_eq!(game.cover_url.as_deref(), Some(expected.as_str()), "{}", game.id);
    }
    assert_vocabulary_in_sync(&backlog, &storage).await;
}

#[tokio::test]
async fn failed_write_restores_previous_state() {
    let (mut backlog, storage, _) = open_backlog(StubCoverProvider::with_covers(&[])).await;
    let id = backlog.add_game(form("Celeste", &["PC"])).await.expect("add").id;
    let before = backlog.games().to_vec();

    storage.pool().close().await;

    let err = backlog.start(&id).await.expect_err("storage closed");
    assert_eq!(err.code(), ErrorCode::Internal);
    assert_eq!(backlog.games(), before.as_slice());

    backlog.delete(&id).await.expect_err("storage closed");
    backlog
        .add_game(form("Hades", &["PC"]))
        .await
        .expect_err("storage closed");
    backlog
        .import_json(r#"[{"name":"Tunic","console":["PC"]}]"#)
        .await
        .expect_err("storage closed");
    backlog.edit_comment(&id, "later").await.expect_err("storage closed");

    assert_eq!(backlog.games(), before.as_slice());
    assert_eq!(backlog.consoles(), ["PC"]);
}
