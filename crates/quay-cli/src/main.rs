//! quay CLI - offline client for remote content repositories
//!
//! Favorites management and sync passes from the terminal.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::aot::Generator;
use clap_complete::{generate, shells};
use quay_core::config::ClientConfig;
use quay_core::db::{
    RepositoryStore, SqliteRepositoryStore, SqliteSyncNodeStore, SyncNodeStore,
};
use quay_core::models::{Repository, SyncFailure};
use quay_core::services::{Client, DatabaseService};
use quay_core::session::{HttpSession, Session};
use quay_core::{NodeId, RemoteNode, SyncNode};
use serde::Serialize;
use thiserror::Error;

#[derive(Parser)]
#[command(name = "quay")]
#[command(about = "Keep favorite remote content available offline")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Optional path to the local database file
    #[arg(long, value_name = "PATH", global = true)]
    db_path: Option<PathBuf>,

    /// Optional directory for cached content
    #[arg(long, value_name = "PATH", global = true)]
    content_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage and list favorite nodes
    #[command(alias = "fav")]
    Favorites {
        #[command(subcommand)]
        command: FavoritesCommands,
    },
    /// Run a sync pass against the remote repository
    Sync,
    /// Show the local sync tree without touching the network
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum FavoritesCommands {
    /// List top-level favorites
    List {
        /// Bypass the cached listing and refetch from the server
        #[arg(long)]
        refresh: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark a node as favorite
    Add {
        /// Node ID
        id: String,
    },
    /// Remove a node from favorites
    Remove {
        /// Node ID
        id: String,
    },
    /// Check whether a node is favorited
    Check {
        /// Node ID
        id: String,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] quay_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Node ID cannot be empty")]
    EmptyNodeId,
    #[error("Invalid node ID: {0}")]
    InvalidNodeId(String),
    #[error(
        "No session configured. Set QUAY_SERVER_URL and QUAY_AUTH_TOKEN to reach the repository."
    )]
    NotConfigured,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("quay=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::from_env();
    let db_path = resolve_db_path(cli.db_path, &config);
    let content_dir = resolve_content_dir(cli.content_dir, &config);

    match cli.command {
        Commands::Favorites { command } => {
            let client = build_client(&config, &db_path, &content_dir).await?;
            match command {
                FavoritesCommands::List { refresh, json } => {
                    run_favorites_list(&client, refresh, json).await?;
                }
                FavoritesCommands::Add { id } => run_favorites_add(&client, &id).await?,
                FavoritesCommands::Remove { id } => run_favorites_remove(&client, &id).await?,
                FavoritesCommands::Check { id } => run_favorites_check(&client, &id).await?,
            }
        }
        Commands::Sync => {
            let client = build_client(&config, &db_path, &content_dir).await?;
            run_sync(&client).await?;
        }
        Commands::Status { json } => run_status(&db_path, json).await?,
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref())?,
    }

    Ok(())
}

async fn build_client(
    config: &ClientConfig,
    db_path: &Path,
    content_dir: &Path,
) -> Result<Client, CliError> {
    let session = build_session(config)?;
    tracing::debug!(db = %db_path.display(), "opening local database");
    let db = DatabaseService::open_path(db_path)?;
    Ok(Client::new(db, Arc::new(session), content_dir).await?)
}

fn build_session(config: &ClientConfig) -> Result<HttpSession, CliError> {
    if !config.is_configured() {
        return Err(CliError::NotConfigured);
    }

    let server_url = config.server_url.as_deref().unwrap_or_default();
    let auth_token = config.auth_token.as_deref().unwrap_or_default();
    Ok(HttpSession::new(server_url, auth_token)?)
}

#[derive(Debug, Serialize)]
struct FavoriteListItem {
    id: String,
    name: String,
    is_folder: bool,
    size_bytes: Option<u64>,
    modified_at: i64,
    relative_time: String,
}

async fn run_favorites_list(client: &Client, refresh: bool, as_json: bool) -> Result<(), CliError> {
    let nodes = client.favorites().top_level(refresh).await?;

    if as_json {
        let items = nodes
            .iter()
            .map(favorite_to_list_item)
            .collect::<Vec<FavoriteListItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if nodes.is_empty() {
        println!("No favorites");
    } else {
        for line in format_favorite_lines(&nodes) {
            println!("{line}");
        }
    }

    Ok(())
}

async fn run_favorites_add(client: &Client, raw_id: &str) -> Result<(), CliError> {
    let id = normalize_node_id(raw_id)?;
    let node = client.session().node(&id).await?;
    client.favorites().add(&node).await?;
    println!("Added favorite: {}", node.name);
    Ok(())
}

async fn run_favorites_remove(client: &Client, raw_id: &str) -> Result<(), CliError> {
    let id = normalize_node_id(raw_id)?;
    let node = client.session().node(&id).await?;
    client.favorites().remove(&node).await?;
    println!("Removed favorite: {}", node.name);
    Ok(())
}

async fn run_favorites_check(client: &Client, raw_id: &str) -> Result<(), CliError> {
    let id = normalize_node_id(raw_id)?;
    if client.favorites().is_favorite(&id).await? {
        println!("{id} is a favorite");
    } else {
        println!("{id} is not a favorite");
    }
    Ok(())
}

async fn run_sync(client: &Client) -> Result<(), CliError> {
    let report = client.sync_engine().sync().await?;
    println!(
        "Sync finished: {} examined, {} downloaded, {} uploaded, {} removed, {} failed",
        report.examined, report.downloaded, report.uploaded, report.removed, report.failed
    );
    Ok(())
}

struct StatusRow {
    depth: usize,
    node: SyncNode,
    failure: Option<SyncFailure>,
}

struct RepositoryStatus {
    repository: Repository,
    rows: Vec<StatusRow>,
}

#[derive(Debug, Serialize)]
struct StatusItem {
    repository: String,
    id: String,
    title: String,
    depth: usize,
    is_folder: bool,
    is_top_level: bool,
    downloaded: bool,
    last_downloaded_at: Option<i64>,
    reload_content: bool,
    pending_upload: bool,
    failure: Option<String>,
}

async fn run_status(db_path: &Path, as_json: bool) -> Result<(), CliError> {
    let db = DatabaseService::open_path(db_path)?;
    let sections = collect_status_rows(&db).await?;

    if as_json {
        let items = sections
            .iter()
            .flat_map(|section| {
                section.rows.iter().map(|row| status_to_item(section, row))
            })
            .collect::<Vec<StatusItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if sections.is_empty() {
        println!("No repositories tracked yet");
    } else {
        for line in render_status_lines(&sections) {
            println!("{line}");
        }
    }

    Ok(())
}

/// Walk every repository's synced tree depth-first, top-level entries first,
/// with records retained for upload appended at the end.
async fn collect_status_rows(db: &DatabaseService) -> Result<Vec<RepositoryStatus>, CliError> {
    let sections = db
        .with_db(|db| {
            let repository_store = SqliteRepositoryStore::new(db.connection());
            let node_store = SqliteSyncNodeStore::new(db.connection());

            let mut sections = Vec::new();
            for repository in repository_store.list()? {
                let mut rows = Vec::new();

                let mut stack: Vec<(usize, SyncNode)> = node_store
                    .top_level(&repository.id)?
                    .into_iter()
                    .rev()
                    .map(|node| (0, node))
                    .collect();

                while let Some((depth, node)) = stack.pop() {
                    for child in node_store.children(&node.id)?.into_iter().rev() {
                        stack.push((depth + 1, child));
                    }
                    let failure = node_store.failure(&node.id)?;
                    rows.push(StatusRow {
                        depth,
                        node,
                        failure,
                    });
                }

                for node in node_store.unfavorited_with_changes(&repository.id)? {
                    let failure = node_store.failure(&node.id)?;
                    rows.push(StatusRow {
                        depth: 0,
                        node,
                        failure,
                    });
                }

                sections.push(RepositoryStatus { repository, rows });
            }

            Ok(sections)
        })
        .await?;

    Ok(sections)
}

fn render_status_lines(sections: &[RepositoryStatus]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    let mut lines = Vec::new();

    for section in sections {
        lines.push(section.repository.base_url.clone());
        if section.rows.is_empty() {
            lines.push("  (no synced nodes)".to_string());
        }
        for row in &section.rows {
            lines.push(render_status_row(row, now_ms));
        }
    }

    lines
}

fn render_status_row(row: &StatusRow, now_ms: i64) -> String {
    let indent = "  ".repeat(row.depth + 1);
    let id = row.node.id.to_string();
    let short_id = id.chars().take(13).collect::<String>();

    let mut title = row.node.title.clone();
    if row.node.is_folder {
        title.push('/');
    }

    let mut line = format!(
        "{indent}{short_id:<13}  {title:<32}  {}",
        download_state(&row.node, now_ms)
    );
    if row.node.unfavorited_has_local_changes {
        line.push_str("  [pending upload]");
    }
    if let Some(failure) = &row.failure {
        line.push_str(&format!("  [failed: {}]", failure.description));
    }

    line.trim_end().to_string()
}

fn download_state(node: &SyncNode, now_ms: i64) -> String {
    if node.is_folder {
        return String::new();
    }

    match node.last_downloaded_at {
        None => "not downloaded".to_string(),
        Some(at) if node.reload_content => {
            format!("reload pending (last {})", format_relative_time(at, now_ms))
        }
        Some(at) => format!("synced {}", format_relative_time(at, now_ms)),
    }
}

fn status_to_item(section: &RepositoryStatus, row: &StatusRow) -> StatusItem {
    StatusItem {
        repository: section.repository.id.to_string(),
        id: row.node.id.to_string(),
        title: row.node.title.clone(),
        depth: row.depth,
        is_folder: row.node.is_folder,
        is_top_level: row.node.is_top_level,
        downloaded: row.node.is_downloaded(),
        last_downloaded_at: row.node.last_downloaded_at,
        reload_content: row.node.reload_content,
        pending_upload: row.node.unfavorited_has_local_changes,
        failure: row.failure.as_ref().map(|failure| failure.description.clone()),
    }
}

fn favorite_to_list_item(node: &RemoteNode) -> FavoriteListItem {
    let now_ms = Utc::now().timestamp_millis();
    FavoriteListItem {
        id: node.id.to_string(),
        name: node.name.clone(),
        is_folder: node.is_folder,
        size_bytes: node.size_bytes,
        modified_at: node.modified_at,
        relative_time: format_relative_time(node.modified_at, now_ms),
    }
}

fn format_favorite_lines(nodes: &[RemoteNode]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    nodes
        .iter()
        .map(|node| {
            let id = node.id.to_string();
            let short_id = id.chars().take(13).collect::<String>();
            let mut name = node.name.clone();
            if node.is_folder {
                name.push('/');
            }
            format!(
                "{short_id:<13}  {name:<32}  {}",
                format_relative_time(node.modified_at, now_ms)
            )
        })
        .collect()
}

fn run_completions(shell: CompletionShell, output_path: Option<&Path>) -> Result<(), CliError> {
    let mut command = Cli::command();
    let mut buffer = Vec::new();

    match shell {
        CompletionShell::Bash => generate_for_shell(shells::Bash, &mut command, &mut buffer),
        CompletionShell::Zsh => generate_for_shell(shells::Zsh, &mut command, &mut buffer),
        CompletionShell::Fish => generate_for_shell(shells::Fish, &mut command, &mut buffer),
    }

    if let Some(path) = output_path {
        std::fs::write(path, &buffer)?;
        println!("{}", path.display());
    } else {
        io::stdout().write_all(&buffer)?;
    }

    Ok(())
}

fn generate_for_shell<G: Generator>(
    generator: G,
    command: &mut clap::Command,
    buffer: &mut Vec<u8>,
) {
    generate(generator, command, "quay", buffer);
}

fn normalize_node_id(raw: &str) -> Result<NodeId, CliError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CliError::EmptyNodeId);
    }

    trimmed
        .parse()
        .map_err(|_| CliError::InvalidNodeId(trimmed.to_string()))
}

fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

fn resolve_db_path(cli_db_path: Option<PathBuf>, config: &ClientConfig) -> PathBuf {
    cli_db_path
        .or_else(|| config.db_path.clone())
        .unwrap_or_else(default_db_path)
}

fn resolve_content_dir(cli_content_dir: Option<PathBuf>, config: &ClientConfig) -> PathBuf {
    cli_content_dir
        .or_else(|| config.content_dir.clone())
        .unwrap_or_else(default_content_dir)
}

fn default_db_path() -> PathBuf {
    data_dir().join("quay.db")
}

fn default_content_dir() -> PathBuf {
    data_dir().join("content")
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("quay")
}
