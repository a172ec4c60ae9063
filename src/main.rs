use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use achievement_workflow::achievements::{AchievementContent, AchievementDetails, AchievementStatus, Caller, WorkflowId};
use achievement_workflow::config::{config, init_config, AppConfig};
use achievement_workflow::external::{password_digest, CredentialStore, LocalBlobStorage, StaticDirectory};
use achievement_workflow::stores::{DocumentStore, WorkflowStore};
use achievement_workflow::telemetry::{init_telemetry, shutdown_telemetry};
use achievement_workflow::workflows::{
    allowed_events, ListQuery, NewAttachment, Scope, WorkflowEngine, WorkflowError,
};

#[cfg(feature = "database")]
use achievement_workflow::database::DatabaseManager;
#[cfg(feature = "database")]
use achievement_workflow::stores::{SqliteDocumentStore, SqliteWorkflowStore};
#[cfg(not(feature = "database"))]
use achievement_workflow::stores::{InMemoryDocumentStore, InMemoryWorkflowStore};

#[derive(Parser)]
#[command(name = "achievement-workflow")]
#[command(about = "Student achievement submission and verification workflow")]
#[command(long_about = "Create, submit and review student achievements. Students draft and submit, \
                       assigned advisors verify or reject, admins see everything. Output is JSON.")]
struct Cli {
    /// Configuration file (defaults to ./achievement-workflow.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Username to authenticate as
    #[arg(long, short = 'u', global = true)]
    user: Option<String>,

    /// Password for --user
    #[arg(long, short = 'p', global = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct ContentArgs {
    /// Achievement title
    #[arg(long)]
    title: String,
    /// Achievement category, e.g. competition, publication, organization, certification
    #[arg(long = "type")]
    category: String,
    #[arg(long, default_value = "")]
    description: String,
    /// Category detail as key=value, repeatable
    #[arg(long = "detail", value_name = "KEY=VALUE")]
    details: Vec<String>,
    #[arg(long = "tag")]
    tags: Vec<String>,
    #[arg(long)]
    points: Option<u32>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a draft achievement (students)
    Create {
        #[command(flatten)]
        content: ContentArgs,
    },
    /// Show one achievement and the events it currently accepts
    Show { id: String },
    /// List achievements visible to the caller
    List {
        /// all, own or advisees; defaults to the caller's role
        #[arg(long)]
        scope: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value = "1")]
        page: usize,
        #[arg(long)]
        page_size: Option<usize>,
    },
    /// Replace the content of a draft
    Update {
        id: String,
        #[command(flatten)]
        content: ContentArgs,
    },
    /// Delete a draft
    Delete { id: String },
    /// Submit a draft or resubmit a rejected achievement
    Submit { id: String },
    /// Verify a submitted achievement (assigned advisor)
    Verify { id: String },
    /// Reject a submitted achievement (assigned advisor)
    Reject {
        id: String,
        #[arg(long)]
        note: String,
    },
    /// Status history of an achievement
    History { id: String },
    /// Aggregate statistics over the caller's visible achievements
    Stats {
        #[arg(long)]
        scope: Option<String>,
    },
    /// Attach a file to a draft
    Attach {
        id: String,
        file: PathBuf,
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Write a configuration file with default values
    InitConfig {
        #[arg(long, default_value = "achievement-workflow.toml")]
        path: PathBuf,
        #[arg(long, help = "Overwrite an existing configuration file")]
        force: bool,
    },
    /// Print the password digest used in the users file
    HashPassword { password: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::InitConfig { path, force } => init_config_command(&path, force),
        Commands::HashPassword { password } => {
            println!("{}", password_digest(&password));
            Ok(())
        }
        command => {
            let app_config = load_config(cli.config.as_deref())?;
            init_telemetry(&app_config.observability)?;

            let user = cli.user.ok_or_else(|| anyhow!("--user is required"))?;
            let password = cli.password.ok_or_else(|| anyhow!("--password is required"))?;

            let code = tokio::runtime::Runtime::new()?.block_on(async {
                run(&app_config, &user, &password, command).await
            })?;

            shutdown_telemetry();
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => {
            AppConfig::load_env_file()?;
            AppConfig::load_from(path)
        }
        None => {
            init_config()?;
            Ok(config()?.clone())
        }
    }
}

fn init_config_command(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(anyhow!(
            "{} already exists; use --force to overwrite",
            path.display()
        ));
    }
    AppConfig::default().save_to_file(path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

/// Everything a command needs, wired from configuration.
struct Services {
    engine: WorkflowEngine,
    credentials: Arc<StaticDirectory>,
    #[cfg(feature = "database")]
    database: DatabaseManager,
}

impl Services {
    async fn build(app_config: &AppConfig) -> Result<Self> {
        let directory = Arc::new(
            StaticDirectory::load(&app_config.directory.path)
                .await
                .with_context(|| {
                    format!(
                        "Failed to load user directory {}",
                        app_config.directory.path.display()
                    )
                })?,
        );

        #[cfg(feature = "database")]
        let database = {
            ensure_database_dir(&app_config.database.url)?;
            DatabaseManager::new(&app_config.database).await?
        };
        #[cfg(feature = "database")]
        let (documents, records): (Arc<dyn DocumentStore>, Arc<dyn WorkflowStore>) = (
            Arc::new(SqliteDocumentStore::new(database.pool().clone())),
            Arc::new(SqliteWorkflowStore::new(database.pool().clone())),
        );

        #[cfg(not(feature = "database"))]
        let (documents, records): (Arc<dyn DocumentStore>, Arc<dyn WorkflowStore>) = {
            warn!("Built without the database feature; achievements are not persisted");
            (
                Arc::new(InMemoryDocumentStore::new()),
                Arc::new(InMemoryWorkflowStore::new()),
            )
        };

        let engine = WorkflowEngine::new(
            documents,
            records,
            directory.clone(),
            Arc::new(LocalBlobStorage::new(&app_config.storage.blob_dir)),
        )
        .with_settings(app_config.engine_settings());

        Ok(Self {
            engine,
            credentials: directory,
            #[cfg(feature = "database")]
            database,
        })
    }

    async fn shutdown(&self) {
        #[cfg(feature = "database")]
        self.database.shutdown().await;
    }
}

/// Create the parent directory of a file-backed SQLite URL.
#[cfg(feature = "database")]
fn ensure_database_dir(url: &str) -> Result<()> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    let path = path.split('?').next().unwrap_or(path);

    if path.is_empty() || path.starts_with(":memory:") {
        return Ok(());
    }
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

async fn run(app_config: &AppConfig, user: &str, password: &str, command: Commands) -> Result<i32> {
    let services = Services::build(app_config).await?;

    let outcome = match services.credentials.authenticate(user, password).await {
        Ok(caller) => {
            info!(caller = %caller.identity, role = %caller.role, "Authenticated");
            execute(&services.engine, &caller, command).await
        }
        Err(err) => Err(WorkflowError::from(err).into()),
    };

    services.shutdown().await;

    match outcome {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(0)
        }
        Err(err) => {
            let status = err
                .downcast_ref::<WorkflowError>()
                .map(WorkflowError::status_code)
                .unwrap_or(400);
            eprintln!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "error": err.to_string(),
                    "status": status,
                }))?
            );
            Ok(1)
        }
    }
}

async fn execute(engine: &WorkflowEngine, caller: &Caller, command: Commands) -> Result<Value> {
    let value = match command {
        Commands::Create { content } => {
            let achievement = engine.create(caller, build_content(content)?).await?;
            serde_json::to_value(achievement)?
        }
        Commands::Show { id } => {
            let achievement = engine.get(caller, &WorkflowId::from(id)).await?;
            let allowed = allowed_events(achievement.status());
            json!({ "achievement": achievement, "allowed_events": allowed })
        }
        Commands::List {
            scope,
            status,
            page,
            page_size,
        } => {
            let scope = parse_scope(scope.as_deref(), caller)?;
            let status = status
                .as_deref()
                .map(str::parse::<AchievementStatus>)
                .transpose()
                .map_err(|e| anyhow!(e))?;
            let query = ListQuery {
                status,
                page,
                page_size,
            };
            serde_json::to_value(engine.list(caller, scope, query).await?)?
        }
        Commands::Update { id, content } => {
            let achievement = engine
                .update(caller, &WorkflowId::from(id), build_content(content)?)
                .await?;
            serde_json::to_value(achievement)?
        }
        Commands::Delete { id } => {
            let id = WorkflowId::from(id);
            engine.delete(caller, &id).await?;
            json!({ "deleted": id })
        }
        Commands::Submit { id } => {
            serde_json::to_value(engine.submit(caller, &WorkflowId::from(id)).await?)?
        }
        Commands::Verify { id } => {
            serde_json::to_value(engine.verify(caller, &WorkflowId::from(id)).await?)?
        }
        Commands::Reject { id, note } => {
            serde_json::to_value(engine.reject(caller, &WorkflowId::from(id), &note).await?)?
        }
        Commands::History { id } => {
            serde_json::to_value(engine.history(caller, &WorkflowId::from(id)).await?)?
        }
        Commands::Stats { scope } => {
            let scope = parse_scope(scope.as_deref(), caller)?;
            serde_json::to_value(engine.statistics(caller, scope).await?)?
        }
        Commands::Attach {
            id,
            file,
            content_type,
        } => {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let file_name = file
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| anyhow!("{} has no usable file name", file.display()))?
                .to_string();

            let achievement = engine
                .add_attachment(
                    caller,
                    &WorkflowId::from(id),
                    NewAttachment {
                        file_name,
                        content_type,
                        bytes,
                    },
                )
                .await?;
            serde_json::to_value(achievement)?
        }
        Commands::InitConfig { .. } | Commands::HashPassword { .. } => {
            warn!("Command does not need an authenticated session");
            Value::Null
        }
    };
    Ok(value)
}

fn parse_scope(scope: Option<&str>, caller: &Caller) -> Result<Scope> {
    match scope.map(|s| s.to_ascii_lowercase()).as_deref() {
        None => Ok(Scope::for_caller(caller)),
        Some("all") => Ok(Scope::All),
        Some("own") => Ok(Scope::Own),
        Some("advisees") => Ok(Scope::Advisees),
        Some(other) => Err(anyhow!("unknown scope: {other} (expected all, own or advisees)")),
    }
}

fn build_content(args: ContentArgs) -> Result<AchievementContent> {
    let mut fields = Map::new();
    for pair in &args.details {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("detail must be KEY=VALUE, got {pair}"))?;
        let value = value.trim();
        // numbers and booleans keep their type so typed details (rank, score) parse
        let value = match serde_json::from_str::<Value>(value) {
            Ok(parsed @ (Value::Number(_) | Value::Bool(_))) => parsed,
            _ => Value::String(value.to_string()),
        };
        fields.insert(key.trim().to_string(), value);
    }

    let details = AchievementDetails::from_category(&args.category, fields)?;
    let mut content = AchievementContent::new(args.title, details)
        .with_description(args.description)
        .with_tags(args.tags);
    if let Some(points) = args.points {
        content = content.with_points(points);
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_content_parses_details() {
        let content = build_content(ContentArgs {
            title: "Regional robotics".to_string(),
            category: "competition".to_string(),
            description: String::new(),
            details: vec![
                "competition_name = RoboCup".to_string(),
                "competition_level=regional".to_string(),
                "rank=3".to_string(),
            ],
            tags: vec!["robotics".to_string()],
            points: Some(20),
        })
        .unwrap();

        assert_eq!(content.category(), "competition");
        assert!(content.validate().is_ok());
        assert_eq!(content.points, Some(20));
    }

    #[test]
    fn test_build_content_rejects_malformed_detail() {
        let result = build_content(ContentArgs {
            title: "t".to_string(),
            category: "sports".to_string(),
            description: String::new(),
            details: vec!["no-separator".to_string()],
            tags: Vec::new(),
            points: None,
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_scope_defaults_to_role() {
        let advisor = Caller::advisor("a1");
        assert_eq!(parse_scope(None, &advisor).unwrap(), Scope::Advisees);
        assert_eq!(parse_scope(Some("ALL"), &advisor).unwrap(), Scope::All);
        assert!(parse_scope(Some("everyone"), &advisor).is_err());
    }

    #[test]
    fn test_cli_parses_reject() {
        let cli = Cli::try_parse_from([
            "achievement-workflow",
            "--user",
            "dr-bob",
            "--password",
            "pw",
            "reject",
            "wf-1",
            "--note",
            "missing proof",
        ])
        .unwrap();

        assert!(matches!(cli.command, Commands::Reject { ref note, .. } if note == "missing proof"));
    }
}
