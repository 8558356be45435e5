use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tierflow::config::Config;
use tierflow::feasibility::{self, ChecklistEngine, FeatureRequest, ManifestSource};
use tierflow::orchestration::{
    AgentCliWorker, DispatchEvent, Dispatcher, FeasibilityWorker, GraphBuilder, RoleRouter,
    WorkRequest, Worker,
};
use tierflow::registry::{manifest, CapabilityRegistry, RoleId};
use tierflow::workflow::{CommandRunner, GatePhase, ValidationGate};
use tierflow::{render, Error, Result};

/// Tierflow - tiered agent orchestration with feasibility and validation gates
#[derive(Parser, Debug)]
#[command(name = "tierflow")]
#[command(version, about, long_about = None)]
#[command(
    after_help = "ENVIRONMENT:\n    TIERFLOW_DEBUG=1     Enable debug logging (alternative to --debug)"
)]
pub struct Cli {
    /// Enable debug logging (writes to ~/.tierflow/tierflow.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Config file (defaults to ~/.tierflow/tierflow.toml)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// List the roles in the capability registry
    Roles,

    /// Validate every agent definition in a directory
    LintAgents {
        /// Directory holding agent definition markdown files
        dir: PathBuf,
    },

    /// Build a work request into batches without running it
    Plan {
        /// Work request TOML file
        request: PathBuf,

        /// Role that owns the request
        #[arg(long = "as", default_value = "orchestrator")]
        root: String,
    },

    /// Dispatch a work request
    Run {
        /// Work request TOML file
        request: PathBuf,

        /// Role that owns the request
        #[arg(long = "as", default_value = "orchestrator")]
        root: String,

        /// Project manifest for the built-in feasibility analyst
        #[arg(long)]
        manifest: Option<PathBuf>,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Score a feature's prerequisites against a project manifest
    Feasibility {
        /// Feature request TOML file
        feature: PathBuf,

        /// Project manifest TOML file
        #[arg(long)]
        manifest: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the validation steps for a project
    Steps {
        /// Project directory
        #[arg(long, default_value = ".")]
        project: PathBuf,
    },

    /// Run the validation gate
    Validate {
        /// Project directory
        #[arg(long, default_value = ".")]
        project: PathBuf,

        /// Print the run as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    tierflow::log::init_with_debug(cli.debug);
    debug!(command = ?cli.command, "tierflow starting");

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Command::Roles => run_roles(&config),
        Command::LintAgents { dir } => run_lint_agents(&dir),
        Command::Plan { request, root } => run_plan(&config, &request, &root),
        Command::Run {
            request,
            root,
            manifest,
            json,
        } => run_dispatch(&config, &request, &root, manifest, json).await,
        Command::Feasibility {
            feature,
            manifest,
            json,
        } => run_feasibility(&feature, manifest, json).await,
        Command::Steps { project } => run_steps(&config, &project).await,
        Command::Validate { project, json } => run_validate(&config, project, json).await,
    }
}

fn load_registry(config: &Config) -> Result<CapabilityRegistry> {
    match config.roles_dir() {
        Some(dir) => {
            info!(dir = %dir.display(), "loading agent definitions");
            manifest::load_dir(&dir)
        }
        None => Ok(CapabilityRegistry::builtin()),
    }
}

fn run_roles(config: &Config) -> Result<()> {
    let registry = load_registry(config)?;
    for role in registry.roles() {
        let ops: Vec<String> = role
            .spec()
            .allowed_operations
            .iter()
            .map(|op| op.to_string())
            .collect();
        println!(
            "tier {}  {:<22} {:<9} {}",
            role.tier(),
            role.id(),
            role.capability(),
            ops.join(", ")
        );
    }
    Ok(())
}

fn run_lint_agents(dir: &Path) -> Result<()> {
    let mut invalid = 0;
    for path in manifest::definition_files(dir)? {
        let (report, _) = manifest::validate_file(&path);
        println!("{}", report.format());
        if !report.is_valid() {
            invalid += 1;
        }
    }
    if invalid > 0 {
        return Err(Error::Configuration(format!(
            "{} invalid agent definition(s)",
            invalid
        )));
    }
    Ok(())
}

fn run_plan(config: &Config, request: &Path, root: &str) -> Result<()> {
    let registry = load_registry(config)?;
    let request = WorkRequest::load(request)?;
    let graph = GraphBuilder::new(&registry).build(&RoleId::new(root)?, &request)?;

    println!("{}", request.summary);
    for batch in graph.layers()? {
        println!("batch {}", batch.depth);
        for id in &batch.nodes {
            let Some(node) = graph.get(id) else {
                continue;
            };
            let deps: Vec<&str> = graph
                .dependencies(id)
                .into_iter()
                .map(|d| d.id.as_str())
                .collect();
            let nested = node
                .subplan
                .as_ref()
                .map(|plan| format!(" [{} subtasks]", plan.slices.len()))
                .unwrap_or_default();
            if deps.is_empty() {
                println!("  {} ({}){}", id, node.role, nested);
            } else {
                println!("  {} ({}) after {}{}", id, node.role, deps.join(", "), nested);
            }
        }
    }
    Ok(())
}

async fn run_dispatch(
    config: &Config,
    request: &Path,
    root: &str,
    manifest: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let registry = Arc::new(load_registry(config)?);
    let request = WorkRequest::load(request)?;
    let root = RoleId::new(root)?;

    let command = config
        .effective_command()
        .split_whitespace()
        .next()
        .unwrap_or("claude");
    let agent: Arc<dyn Worker> =
        Arc::new(AgentCliWorker::new(command)?.with_cwd(std::env::current_dir()?));
    let mut router = RoleRouter::new(agent);
    if let Some(path) = manifest {
        let engine = ChecklistEngine::new(Arc::new(ManifestSource::new(path)));
        router = router.route(
            RoleId::new("feasibility-analyst")?,
            Arc::new(FeasibilityWorker::new(engine)),
        );
    }

    let (tx, mut rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    let dispatcher = Dispatcher::new(registry, Arc::new(router))
        .with_timeouts(config.timeout_policy())
        .with_events(tx)
        .with_cancellation(cancel.clone());

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling after the current batch");
            cancel.cancel();
        }
    });
    let progress = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_event(&event);
        }
    });

    let result = dispatcher.dispatch(&root, &request).await;
    drop(dispatcher);
    let _ = progress.await;
    let outcome = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print!("{}", render::graph_outcome(&outcome));
    }
    outcome.ensure_succeeded()
}

fn print_event(event: &DispatchEvent) {
    match event {
        DispatchEvent::BatchStarted { depth, nodes } => {
            eprintln!("batch {} started ({} nodes)", depth, nodes.len())
        }
        DispatchEvent::NodeStarted { node, role } => eprintln!("  {} -> {}", node, role),
        DispatchEvent::NodeSucceeded { node } => eprintln!("  {} succeeded", node),
        DispatchEvent::NodeFailed { node, cause } => eprintln!("  {} failed: {}", node, cause),
        DispatchEvent::BatchJoined { depth } => eprintln!("batch {} joined", depth),
        DispatchEvent::Cancelled { pending } => {
            eprintln!("cancelled with {} nodes pending", pending.len())
        }
        DispatchEvent::Completed { succeeded, failed } => {
            eprintln!("completed: {} succeeded, {} failed", succeeded, failed)
        }
    }
}

async fn run_feasibility(feature: &Path, manifest: PathBuf, json: bool) -> Result<()> {
    let content = tokio::fs::read_to_string(feature).await.map_err(|e| {
        Error::Configuration(format!("cannot read {}: {}", feature.display(), e))
    })?;
    let request: FeatureRequest = toml::from_str(&content)?;
    let engine = ChecklistEngine::new(Arc::new(ManifestSource::new(manifest)));
    let report = feasibility::analyze(&engine, &request).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render::feasibility_report(&request.feature, &report));
    }
    Ok(())
}

async fn run_steps(config: &Config, project: &Path) -> Result<()> {
    let gate = ValidationGate::new(config.validation.steps.clone());
    let steps = gate.resolve_steps(project).await?;
    if steps.is_empty() {
        println!("no validation steps detected in {}", project.display());
    }
    for (i, step) in steps.iter().enumerate() {
        println!("{}. [{}] {}: {}", i + 1, step.kind, step.name, step.command_line());
    }
    Ok(())
}

async fn run_validate(config: &Config, project: PathBuf, json: bool) -> Result<()> {
    let mut gate = ValidationGate::new(config.validation.steps.clone());
    gate.transition(GatePhase::Green)?;
    let runner = CommandRunner::new(project.clone(), config.step_timeout());
    let run = gate.validate(&runner, &project).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        print!("{}", render::validation_run(&run));
    }
    if !run.passed() {
        std::process::exit(1);
    }
    Ok(())
}
