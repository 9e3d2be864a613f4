use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codegraph_events::{new_correlation_id, run_failure, run_success};
use codegraph_infer::{Engine, HierarchicalOptions, InferenceConfig, InheritableOptions, Resolver, ResolverConfig, TransitiveOptions};
use codegraph_orchestrator::Orchestrator;
use codegraph_query::QueryRegistry;
use codegraph_registry::Registry;
use codegraph_storage::GraphStore;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about = "Code graph engine CLI", long_about = None)]
struct Args {
    /// Path to the SQLite graph store.
    #[arg(short, long, default_value = "codegraph.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every namespace's scenarios over the project described by a
    /// namespace config file, then sync the inference cache.
    Run {
        /// Path to the namespace/scenario config (TOML).
        #[arg(short, long)]
        config: PathBuf,
        /// Skip the cache sync after the run.
        #[arg(long)]
        no_sync_cache: bool,
    },
    /// Print the plan (matched files + scenario order) without touching
    /// the graph store.
    Plan {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Attempt to resolve every unknown-symbol node against known nodes.
    Resolve {
        #[arg(long, default_value_t = 0.6)]
        threshold: f64,
    },
    /// Print node/edge/cache counts.
    Stats,
    /// Run an Inference Engine query.
    Query {
        #[command(subcommand)]
        kind: QueryKind,
    },
}

#[derive(Subcommand, Debug)]
enum QueryKind {
    Hierarchical {
        #[arg(long)]
        edge_type: String,
        #[arg(long)]
        include_children: bool,
        #[arg(long)]
        include_parents: bool,
    },
    Transitive {
        #[arg(long)]
        edge_type: String,
        #[arg(long)]
        start_node: Option<i64>,
        #[arg(long, default_value_t = 10)]
        max_path_length: usize,
    },
    Inheritable {
        #[arg(long)]
        start_node: i64,
        #[arg(long)]
        parent_relation_type: String,
        #[arg(long)]
        child_relation_type: String,
        #[arg(long, default_value_t = 10)]
        max_inheritance_depth: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    let registry = Arc::new(Registry::with_core_types());

    match args.command {
        Command::Run { config, no_sync_cache } => run(&args.db, registry, &config, !no_sync_cache)?,
        Command::Plan { config } => plan(&config)?,
        Command::Resolve { threshold } => resolve(&args.db, registry, threshold)?,
        Command::Stats => stats(&args.db, registry)?,
        Command::Query { kind } => query(&args.db, registry, kind)?,
    }

    Ok(())
}

fn run(db: &PathBuf, registry: Arc<Registry>, config_path: &PathBuf, sync_cache: bool) -> Result<()> {
    let orchestrator = Orchestrator::load(config_path).context("loading namespace config")?;
    let store = GraphStore::open(db, registry.clone()).context("opening graph store")?;
    let queries = QueryRegistry::new();

    let correlation_id = new_correlation_id();
    let report = orchestrator.run(&store, &queries).context("running namespaces")?;

    if report.failed.is_empty() {
        run_success(&correlation_id, report.successful.len());
    } else {
        run_failure(&correlation_id, report.successful.len(), report.failed.len(), report.cancelled);
    }

    println!(
        "{} file(s) succeeded, {} failed ({} nodes, {} edges upserted, {} edges reclaimed)",
        report.successful.len(),
        report.failed.len(),
        report.stats.nodes_upserted,
        report.stats.edges_upserted,
        report.stats.edges_deleted,
    );
    for failure in &report.failed {
        eprintln!("  {} [{}]: {}", failure.file, failure.error_kind, failure.message);
    }

    if sync_cache {
        let engine = Engine::new(Arc::new(store), registry, InferenceConfig::default());
        engine.sync_cache(true).context("syncing inference cache")?;
        println!("inference cache synced");
    }

    Ok(())
}

fn plan(config_path: &PathBuf) -> Result<()> {
    let orchestrator = Orchestrator::load(config_path).context("loading namespace config")?;
    let plan = orchestrator.build_plan().context("building plan")?;
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

fn resolve(db: &PathBuf, registry: Arc<Registry>, threshold: f64) -> Result<()> {
    let store = GraphStore::open(db, registry).context("opening graph store")?;
    let resolver = Resolver::new(
        &store,
        ResolverConfig {
            confidence_threshold: threshold,
            ..ResolverConfig::default()
        },
    );
    let outcome = resolver.resolve_all().context("resolving unknown symbols")?;
    println!("resolved {} unknown symbol(s), {} left unresolved", outcome.resolved, outcome.unresolved);
    Ok(())
}

fn stats(db: &PathBuf, registry: Arc<Registry>) -> Result<()> {
    let store = GraphStore::open(db, registry).context("opening graph store")?;
    let stats = store.stats().context("reading store stats")?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn query(db: &PathBuf, registry: Arc<Registry>, kind: QueryKind) -> Result<()> {
    let store = Arc::new(GraphStore::open(db, registry.clone()).context("opening graph store")?);
    let engine = Engine::new(store, registry, InferenceConfig::default());

    let results = match kind {
        QueryKind::Hierarchical {
            edge_type,
            include_children,
            include_parents,
        } => engine.hierarchical(
            &edge_type,
            HierarchicalOptions {
                include_children,
                include_parents,
                max_depth: None,
            },
        )?,
        QueryKind::Transitive {
            edge_type,
            start_node,
            max_path_length,
        } => engine.transitive(
            start_node.map(codegraph_core::NodeId),
            &edge_type,
            TransitiveOptions {
                max_path_length,
                ..TransitiveOptions::default()
            },
        )?,
        QueryKind::Inheritable {
            start_node,
            parent_relation_type,
            child_relation_type,
            max_inheritance_depth,
        } => engine.inheritable(
            codegraph_core::NodeId(start_node),
            &parent_relation_type,
            &child_relation_type,
            InheritableOptions {
                max_inheritance_depth,
            },
        )?,
    };

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
