use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taskflow::config::{Config, StoreBackend};
use taskflow::db::Database;
use taskflow::graph::{GraphSession, NoticeLevel};
use taskflow::models::*;
use taskflow::snapshot;
use taskflow::store::{EntityStore, MemoryStore};

#[derive(Parser)]
#[command(name = "taskflow")]
#[command(about = "Task and deliverable dependency graphs with auto-layout and portable snapshots")]
struct Cli {
    /// Store location (overrides config and TASKFLOW_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Store backend (overrides config and TASKFLOW_BACKEND)
    #[arg(long, global = true, value_enum)]
    backend: Option<StoreBackend>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ProjectScope {
    /// Project to operate on
    #[arg(short, long)]
    project: i64,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect or persist the effective configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Manage projects
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },
    /// Create or edit tasks
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },
    /// Create or edit deliverables
    Deliverable {
        #[command(subcommand)]
        action: DeliverableAction,
    },
    /// Connect two nodes, e.g. `connect task-1 deliverable-2`
    Connect {
        #[command(flatten)]
        scope: ProjectScope,
        source: String,
        target: String,
    },
    /// Remove a connection by its id
    Disconnect {
        #[command(flatten)]
        scope: ProjectScope,
        connection_id: i64,
    },
    /// Delete nodes and every connection touching them
    Delete {
        #[command(flatten)]
        scope: ProjectScope,
        #[arg(required = true)]
        nodes: Vec<String>,
    },
    /// Move a node and save its position
    Move {
        #[command(flatten)]
        scope: ProjectScope,
        node: String,
        #[arg(allow_negative_numbers = true)]
        x: f64,
        #[arg(allow_negative_numbers = true)]
        y: f64,
    },
    /// Lay out the whole diagram left to right and save every position
    Layout {
        #[command(flatten)]
        scope: ProjectScope,
    },
    /// List the diagram's nodes and edges
    Show {
        #[command(flatten)]
        scope: ProjectScope,
    },
    /// Write the project as a Markdown export document
    Export {
        #[command(flatten)]
        scope: ProjectScope,
        /// Output file or directory (stdout if omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Import an export document into the project
    Import {
        #[command(flatten)]
        scope: ProjectScope,
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the configuration after file, environment and flag overrides
    Show,
    /// Write the effective configuration to the config file
    Save,
}

#[derive(Subcommand)]
enum ProjectAction {
    List,
    Create {
        name: String,
        #[arg(short, long)]
        description: Option<String>,
    },
    Delete {
        id: i64,
    },
}

#[derive(Subcommand)]
enum TaskAction {
    Add {
        #[command(flatten)]
        scope: ProjectScope,
        name: String,
        #[arg(short, long, default_value = "")]
        description: String,
        /// Task status reference
        #[arg(long, default_value_t = DEFAULT_TASK_STATUS)]
        status: i64,
        #[arg(long, value_parser = parse_priority)]
        priority: Option<Priority>,
        #[arg(long)]
        start_date: Option<NaiveDate>,
        #[arg(long)]
        end_date: Option<NaiveDate>,
        #[arg(long)]
        duration_days: Option<i64>,
        /// Assignee reference
        #[arg(long)]
        assigned_to: Option<i64>,
    },
    Edit {
        #[command(flatten)]
        scope: ProjectScope,
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(long)]
        status: Option<i64>,
        #[arg(long, value_parser = parse_priority)]
        priority: Option<Priority>,
        #[arg(long)]
        start_date: Option<NaiveDate>,
        #[arg(long)]
        end_date: Option<NaiveDate>,
        #[arg(long)]
        duration_days: Option<i64>,
        #[arg(long)]
        assigned_to: Option<i64>,
    },
}

#[derive(Subcommand)]
enum DeliverableAction {
    Add {
        #[command(flatten)]
        scope: ProjectScope,
        name: String,
        #[arg(short, long, default_value = "")]
        description: String,
        /// Deliverable status reference
        #[arg(long, default_value_t = DEFAULT_DELIVERABLE_STATUS)]
        status: i64,
        /// Deliverable type reference
        #[arg(long = "type", default_value_t = DEFAULT_DELIVERABLE_TYPE)]
        type_id: i64,
        #[arg(long)]
        due_date: Option<NaiveDate>,
    },
    Edit {
        #[command(flatten)]
        scope: ProjectScope,
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(long)]
        status: Option<i64>,
        #[arg(long = "type")]
        type_id: Option<i64>,
        #[arg(long)]
        due_date: Option<NaiveDate>,
    },
}

fn parse_priority(s: &str) -> Result<Priority, String> {
    Priority::from_str(s).ok_or_else(|| format!("unknown priority {s:?} (low, medium, high, critical)"))
}

/// Initialize tracing with output to stderr so stdout carries only command output
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "taskflow=info".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let mut config = Config::load();
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if let Some(path) = cli.db {
        config.data_path = Some(path);
    }

    if let Commands::Config { action } = &cli.command {
        return run_config(&config, action);
    }

    let path = config.resolved_data_path()?;
    tracing::debug!("Opening {} store at {}", config.backend.as_str(), path.display());

    match config.backend {
        StoreBackend::Sqlite => {
            let db = Database::open(path)?;
            db.migrate()?;
            run(db, cli.command, &config)
        }
        StoreBackend::Json => run(MemoryStore::open(path)?, cli.command, &config),
    }
}

fn run<S: EntityStore>(store: S, command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Config { action } => run_config(config, &action),
        Commands::Project { action } => run_project(&store, action),
        Commands::Task { action } => match action {
            TaskAction::Add {
                scope,
                name,
                description,
                status,
                priority,
                start_date,
                end_date,
                duration_days,
                assigned_to,
            } => with_session(store, scope, |session| {
                let task = session.add_task(CreateTaskInput {
                    description,
                    status,
                    priority: priority.unwrap_or_default(),
                    start_date,
                    end_date,
                    duration_days,
                    assigned_to,
                    ..CreateTaskInput::named(name)
                })?;
                println!("{}", NodeId::task(task.id));
                Ok(())
            }),
            TaskAction::Edit {
                scope,
                id,
                name,
                description,
                status,
                priority,
                start_date,
                end_date,
                duration_days,
                assigned_to,
            } => with_session(store, scope, |session| {
                let input = UpdateTaskInput {
                    name,
                    description,
                    status,
                    priority,
                    start_date,
                    end_date,
                    duration_days,
                    assigned_to,
                };
                match session.edit_task(id, input)? {
                    Some(task) => println!("{}", NodeId::task(task.id)),
                    None => anyhow::bail!("Task {} not found", id),
                }
                Ok(())
            }),
        },
        Commands::Deliverable { action } => match action {
            DeliverableAction::Add {
                scope,
                name,
                description,
                status,
                type_id,
                due_date,
            } => with_session(store, scope, |session| {
                let deliverable = session.add_deliverable(CreateDeliverableInput {
                    description,
                    status,
                    type_id,
                    due_date,
                    ..CreateDeliverableInput::named(name)
                })?;
                println!("{}", NodeId::deliverable(deliverable.id));
                Ok(())
            }),
            DeliverableAction::Edit {
                scope,
                id,
                name,
                description,
                status,
                type_id,
                due_date,
            } => with_session(store, scope, |session| {
                let input = UpdateDeliverableInput {
                    name,
                    description,
                    status,
                    type_id,
                    due_date,
                };
                match session.edit_deliverable(id, input)? {
                    Some(deliverable) => println!("{}", NodeId::deliverable(deliverable.id)),
                    None => anyhow::bail!("Deliverable {} not found", id),
                }
                Ok(())
            }),
        },
        Commands::Connect {
            scope,
            source,
            target,
        } => with_session(store, scope, |session| {
            match session.connect(&source, &target)? {
                Some(connection) => println!("connection-{}", connection.id),
                None => anyhow::bail!("Expected node ids like task-1 or deliverable-2"),
            }
            Ok(())
        }),
        Commands::Disconnect {
            scope,
            connection_id,
        } => with_session(store, scope, |session| session.disconnect_by_id(connection_id)),
        Commands::Delete { scope, nodes } => {
            with_session(store, scope, |session| session.delete_nodes(&nodes))
        }
        Commands::Move { scope, node, x, y } => with_session(store, scope, |session| {
            session.move_node(&node, Position::new(x, y))
        }),
        Commands::Layout { scope } => {
            with_session(store, scope, |session| session.auto_layout(&config.layout))
        }
        Commands::Show { scope } => with_session(store, scope, |session| {
            print_graph(session);
            Ok(())
        }),
        Commands::Export { scope, out } => with_session(store, scope, |session| {
            let document = snapshot::export_document(session)?;
            match out {
                Some(path) => {
                    let path = if path.is_dir() {
                        path.join(snapshot::markdown::file_name(&session.project().name))
                    } else {
                        path
                    };
                    std::fs::write(&path, document)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("{}", path.display());
                }
                None => print!("{document}"),
            }
            Ok(())
        }),
        Commands::Import { scope, file } => with_session(store, scope, |session| {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let report = snapshot::import(session, &text)?;
            println!(
                "Created {} tasks, {} deliverables, {} connections ({} skipped)",
                report.tasks_created,
                report.deliverables_created,
                report.connections_created,
                report.connections_skipped
            );
            Ok(())
        }),
    }
}

fn run_config(config: &Config, action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            println!("{}", serde_json::to_string_pretty(config)?);
            println!("store: {}", config.resolved_data_path()?.display());
        }
        ConfigAction::Save => {
            let path = config.save()?;
            tracing::info!("Saved config to {}", path.display());
            println!("{}", path.display());
        }
    }
    Ok(())
}

fn run_project<S: EntityStore>(store: &S, action: ProjectAction) -> Result<()> {
    match action {
        ProjectAction::List => {
            for project in store.list_projects()? {
                println!("{}\t{}", project.id, project.name);
            }
        }
        ProjectAction::Create { name, description } => {
            let project = store.create_project(CreateProjectInput { name, description })?;
            tracing::info!("Created project {}", project.id);
            println!("{}", project.id);
        }
        ProjectAction::Delete { id } => {
            if !store.delete_project(id)? {
                anyhow::bail!("Project {} not found", id);
            }
        }
    }
    Ok(())
}

/// Open the scoped project, run `f`, then print whatever notices it queued.
fn with_session<S, F>(store: S, scope: ProjectScope, f: F) -> Result<()>
where
    S: EntityStore,
    F: FnOnce(&mut GraphSession<S>) -> Result<()>,
{
    let mut session = GraphSession::open(store, scope.project)?;
    let outcome = f(&mut session);

    for notice in session.take_notices() {
        match notice.level {
            NoticeLevel::Info => eprintln!("info: {}", notice.message),
            NoticeLevel::Error => eprintln!("error: {}", notice.message),
        }
    }
    outcome
}

fn print_graph<S: EntityStore>(session: &GraphSession<S>) {
    let graph = session.graph();
    println!("# {}", session.project().name);
    for node in &graph.nodes {
        println!(
            "{}\t{}\t({}, {})",
            node.id,
            node.data.name(),
            node.position.x,
            node.position.y
        );
    }
    for edge in &graph.edges {
        println!("{}\t{} -> {}", edge.id, edge.source, edge.target);
    }
}
