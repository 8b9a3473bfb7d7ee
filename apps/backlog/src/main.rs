use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{Backlog, CoverProvider, MissingCoverProvider, RawgCoverProvider};
use shared::{
    domain::{GameId, GameStatus, Grade, NewGame},
    query::GameFilter,
};
use storage::Storage;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod render;

use config::{load_settings, normalize_database_url};

#[derive(Parser, Debug)]
#[command(name = "backlog", version, about = "Track the games you want to play")]
struct Cli {
    /// SQLite database url or file path.
    #[arg(long, global = true)]
    database_url: Option<String>,
    /// TOML config file (defaults to ./backlog.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add a game and look up its cover.
    Add {
        name: String,
        /// Console tag; repeat or separate with commas.
        #[arg(long = "console", short = 'c', value_delimiter = ',')]
        consoles: Vec<String>,
        #[arg(long, default_value = "todo")]
        status: GameStatus,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        note: Option<String>,
        #[arg(long)]
        rating: Option<String>,
        #[arg(long)]
        comment: Option<String>,
    },
    /// List games matching every given filter.
    List {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        status: Option<GameStatus>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        console: Option<String>,
        #[arg(long)]
        json: bool,
    },
    Show {
        id: String,
    },
    /// todo -> in-progress
    Start {
        id: String,
    },
    /// in-progress -> todo
    Stop {
        id: String,
    },
    /// in-progress -> completed, with a grade out of 10.
    End {
        id: String,
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=10))]
        grade: u8,
        #[arg(long)]
        comment: Option<String>,
    },
    /// completed -> todo, clearing the grade and comment.
    Restart {
        id: String,
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Replace a game's comment; an empty text clears it.
    Comment {
        id: String,
        text: String,
    },
    Delete {
        id: String,
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Merge games from a JSON array file.
    Import {
        file: PathBuf,
    },
    /// Write all games as JSON to a file or stdout.
    Export {
        file: Option<PathBuf>,
    },
    Consoles,
    Categories,
    /// Look the cover up again.
    RefreshCover {
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = load_settings(cli.config.as_deref())?;
    if let Some(database_url) = &cli.database_url {
        settings.database_url = database_url.clone();
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let database_url = normalize_database_url(&settings.database_url);
    let storage = match Storage::new(&database_url).await {
        Ok(storage) => storage,
        Err(err) => {
            let error = format!("{err:#}");
            error!(%database_url, %error, "backlog: failed to open database");
            return Err(err);
        }
    };

    let rawg = RawgCoverProvider::new(
        &settings.rawg_base_url,
        settings.rawg_api_key.clone(),
        settings.request_timeout(),
    )?;
    let covers: Arc<dyn CoverProvider> = if rawg.has_api_key() {
        Arc::new(rawg)
    } else {
        warn!("RAWG API key not set; new games get the placeholder cover");
        Arc::new(MissingCoverProvider)
    };

    let mut backlog = Backlog::open(storage, covers).await?;
    run(&mut backlog, cli.command).await
}

async fn run(backlog: &mut Backlog, command: Command) -> Result<()> {
    match command {
        Command::Add {
            name,
            consoles,
            status,
            category,
            note,
            rating,
            comment,
        } => {
            let new_game = NewGame {
                name,
                consoles,
                status,
                category,
                note,
                personal_rating: rating,
                comment,
            };
            let game = backlog.add_game(new_game).await?;
            println!("added {}", render::game_line(&game));
        }
        Command::List {
            search,
            status,
            category,
            console,
            json,
        } => {
            let filter = GameFilter {
                search,
                status,
                category,
                console,
            };
            let games = backlog.list(&filter);
            if json {
                println!("{}", serde_json::to_string_pretty(&games)?);
            } else if games.is_empty() {
                println!("no games");
            } else {
                for game in games {
                    println!("{}", render::game_line(game));
                }
            }
        }
        Command::Show { id } => {
            let id = GameId::from(id);
            let Some(game) = backlog.get(&id) else {
                bail!("no game with id '{id}'");
            };
            print!("{}", render::game_detail(game));
        }
        Command::Start { id } => {
            let game = backlog.start(&GameId::from(id)).await?;
            println!("{}", render::game_line(&game));
        }
        Command::Stop { id } => {
            let game = backlog.stop(&GameId::from(id)).await?;
            println!("{}", render::game_line(&game));
        }
        Command::End { id, grade, comment } => {
            let game = backlog
                .end_game(&GameId::from(id), Grade::new(grade)?, comment)
                .await?;
            println!("{}", render::game_line(&game));
        }
        Command::Restart { id, yes } => {
            let id = GameId::from(id);
            if !yes
                && !confirm(
                    "Are you sure you want to restart this game? This will clear the grade and comment.",
                )?
            {
                println!("restart cancelled");
                return Ok(());
            }
            let game = backlog.restart(&id).await?;
            println!("{}", render::game_line(&game));
        }
        Command::Comment { id, text } => {
            let game = backlog.edit_comment(&GameId::from(id), &text).await?;
            print!("{}", render::game_detail(&game));
        }
        Command::Delete { id, yes } => {
            let id = GameId::from(id);
            let Some(game) = backlog.get(&id) else {
                bail!("no game with id '{id}'");
            };
            if !yes && !confirm(&format!("Remove '{}'?", game.name))? {
                println!("delete cancelled");
                return Ok(());
            }
            let removed = backlog.delete(&id).await?;
            println!("deleted {}", render::game_line(&removed));
        }
        Command::Import { file } => {
            let text = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("failed to read '{}'", file.display()))?;
            eprintln!("Importing games and fetching covers...");
            let report = backlog.import_json(&text).await?;
            println!("{}", render::import_summary(&report));
        }
        Command::Export { file } => {
            let json = backlog.export_json()?;
            match file {
                Some(path) => {
                    tokio::fs::write(&path, json)
                        .await
                        .with_context(|| format!("failed to write '{}'", path.display()))?;
                    println!(
                        "exported {} game(s) to {}",
                        backlog.games().len(),
                        path.display()
                    );
                }
                None => println!("{json}"),
            }
        }
        Command::Consoles => {
            for console in backlog.consoles() {
                println!("{console}");
            }
        }
        Command::Categories => {
            for category in backlog.categories() {
                println!("{category}");
            }
        }
        Command::RefreshCover { id } => {
            let game = backlog.refresh_cover(&GameId::from(id)).await?;
            println!("{}  {}", game.id, game.cover_or_default());
        }
    }

    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    let stdin = io::stdin();
    confirm_with(prompt, &mut stdin.lock(), &mut io::stderr())
}

fn confirm_with<R: BufRead, W: Write>(prompt: &str, input: &mut R, output: &mut W) -> Result<bool> {
    write!(output, "{prompt} [y/N] ")?;
    output.flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
