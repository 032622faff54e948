//! # reposearch CLI
//!
//! ## Usage
//!
//! ```bash
//! reposearch --config ./config/reposearch.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `reposearch index` | Bring every project's index up to date |
//! | `reposearch search <tokens>...` | Search one project's index |
//! | `reposearch get <uri>` | Show one indexed document |
//! | `reposearch optimize` | Compact a project's index |
//! | `reposearch purge` | Delete a project's index and run history |
//! | `reposearch history` | Show the last successful run per repository |

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use reposearch::backend::changeset_ids::ChangesetIds;
use reposearch::config::{self, Config};
use reposearch::coordinator::{IndexDatabase, RunMode, RunOutcome};
use reposearch::history::{RunHistory, SqliteRunHistory};
use reposearch::logging;
use reposearch::models::OpenMode;

/// reposearch: full-text search over the files of version-controlled
/// repositories, kept current one changeset range at a time.
#[derive(Parser)]
#[command(name = "reposearch", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/reposearch.toml")]
    config: PathBuf,

    /// Increase log output on stderr (-v info, -vv debug).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index new changesets of every repository.
    ///
    /// Repositories never indexed before get a full walk of all branches
    /// and tags; the rest get the changesets since their last successful run.
    Index {
        /// Only index this project.
        #[arg(long)]
        project: Option<String>,
    },

    /// Search a project's index and print matching locators.
    Search {
        /// Words to search for.
        #[arg(required = true)]
        tokens: Vec<String>,

        #[arg(long)]
        project: String,

        /// Only match documents from this repository identifier.
        #[arg(long)]
        repository: Option<String>,

        /// Only match documents from this branch or tag.
        #[arg(long)]
        rev: Option<String>,

        /// Only match documents with this content type (e.g. `text/x-rust`).
        #[arg(long)]
        content_type: Option<String>,

        /// Match documents containing any of the words instead of all.
        #[arg(long)]
        any: bool,
    },

    /// Print a stored document by locator.
    Get {
        uri: String,

        #[arg(long)]
        project: String,

        /// Include the indexed text.
        #[arg(long)]
        text: bool,
    },

    /// Compact a project's index.
    Optimize {
        #[arg(long)]
        project: String,
    },

    /// Delete a project's index and its run history.
    Purge {
        #[arg(long)]
        project: String,
    },

    /// Show the last successful run of every repository in a project.
    History {
        #[arg(long)]
        project: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cfg = config::load_config(&cli.config)?;
    let history = Arc::new(
        SqliteRunHistory::open(&cfg.index.root.join(SqliteRunHistory::FILE))
            .await
            .context("Failed to open run history")?,
    );

    let ids = match ChangesetIds::open(&cfg.index.root.join(ChangesetIds::FILE)).await {
        Ok(ids) => Arc::new(ids),
        Err(e) => {
            history.close().await;
            return Err(e).context("Failed to open changeset ids");
        }
    };

    let result = run(&cli.command, &cfg, history.clone(), ids.clone()).await;
    ids.close().await;
    history.close().await;
    result
}

async fn run(
    command: &Commands,
    cfg: &Config,
    history: Arc<SqliteRunHistory>,
    ids: Arc<ChangesetIds>,
) -> Result<()> {
    match command {
        Commands::Index { project } => {
            let projects: Vec<_> = match project {
                Some(id) => vec![cfg.project(id)?],
                None => cfg.projects.iter().collect(),
            };
            for project in projects {
                let mut db = IndexDatabase::for_project(cfg, project, history.clone(), ids.clone())?;
                let runs = db.indexing().await;
                db.close().await;
                for repo_run in runs.with_context(|| {
                    format!("Indexing aborted for project '{}'", project.identifier)
                })? {
                    println!(
                        "{} {}  {}",
                        project.identifier,
                        repo_run.repository.display_identifier(),
                        describe(&repo_run.outcome)
                    );
                }
            }
            println!("ok");
        }
        Commands::Search {
            tokens,
            project,
            repository,
            rev,
            content_type,
            any,
        } => {
            let mut db = open_project(cfg, project, history, ids, OpenMode::Read).await?;
            let hits = db
                .search(
                    tokens,
                    repository.as_deref(),
                    rev.as_deref(),
                    content_type.as_deref(),
                    !any,
                )
                .await;
            db.close().await;
            let hits = hits?;
            if hits.is_empty() {
                println!("No results.");
            }
            for uri in hits {
                println!("{}", uri);
            }
        }
        Commands::Get { uri, project, text } => {
            let mut db = open_project(cfg, project, history, ids, OpenMode::Read).await?;
            let doc = db.get_document(uri, *text).await;
            db.close().await;
            match doc? {
                Some(doc) => {
                    println!("uri: {}", doc.uri);
                    println!("title: {}", doc.title);
                    println!("repository: {}", doc.repository);
                    println!("rev: {}", doc.rev.as_deref().unwrap_or("-"));
                    println!(
                        "content_type: {}",
                        doc.content_type.as_deref().unwrap_or("-")
                    );
                    if *text {
                        println!("---");
                        println!("{}", doc.text);
                    }
                }
                None => anyhow::bail!("No document at {}", uri),
            }
        }
        Commands::Optimize { project } => {
            let mut db = open_project(cfg, project, history, ids, OpenMode::Write).await?;
            let optimized = db.optimize().await;
            db.close().await;
            optimized?;
            println!("ok");
        }
        Commands::Purge { project } => {
            let project_cfg = cfg.project(project)?;
            let mut db = IndexDatabase::for_project(cfg, project_cfg, history, ids)?;
            db.remove().await?;
            println!("purged {}", project);
        }
        Commands::History { project } => {
            let project_cfg = cfg.project(project)?;
            let db = IndexDatabase::for_project(cfg, project_cfg, history, ids)?;
            for (repository, last) in db.last_successes().await? {
                match last {
                    Some(run) => println!(
                        "{}  changeset {} ({})  at {}",
                        repository.display_identifier(),
                        run.changeset_id,
                        run.revision,
                        chrono::DateTime::from_timestamp(run.created_at, 0)
                            .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
                            .unwrap_or_else(|| run.created_at.to_string())
                    ),
                    None => println!("{}  never indexed", repository.display_identifier()),
                }
            }
        }
    }
    Ok(())
}

async fn open_project(
    cfg: &Config,
    project: &str,
    history: Arc<dyn RunHistory>,
    ids: Arc<ChangesetIds>,
    mode: OpenMode,
) -> Result<IndexDatabase> {
    let project_cfg = cfg.project(project)?;
    let mut db = IndexDatabase::for_project(cfg, project_cfg, history, ids)?;
    db.open(mode).await?;
    Ok(db)
}

fn describe(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Indexed {
            changeset_id,
            mode,
            stats,
        } => format!(
            "{} to changeset {}: {} added, {} deleted, {} put failures",
            match mode {
                RunMode::Full => "indexed all",
                RunMode::Incremental => "indexed diff",
            },
            changeset_id,
            stats.added,
            stats.deleted,
            stats.put_failures
        ),
        RunOutcome::AlreadyCurrent { changeset_id } => {
            format!("already indexed (changeset {})", changeset_id)
        }
        RunOutcome::Empty => "no changesets".to_string(),
        RunOutcome::Failed { message } => format!("failed: {}", message),
    }
}
