use anyhow::{bail, Context};
use clap::{ArgGroup, Args, Parser, Subcommand};
use common::{Identity, RunConfig, ScanConfig};
use crawler::{ScanSummary, Scanner};
use gcp::{credentials, GcpClient, IamCredentials, ResourceManager};
use ledger::FileLayout;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gcp-pivot")]
#[command(about = "Map what a set of GCP credentials can reach through impersonation", long_about = None)]
struct Cli {
    /// Log level (RUST_LOG takes precedence when set).
    #[arg(
        short,
        long,
        global = true,
        default_value = "warning",
        value_parser = ["info", "warning", "error"]
    )]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk impersonation paths from the given credentials and collect resources.
    Scan(ScanArgs),
    /// Print the scan config used when --config is not given.
    DefaultConfig,
}

#[derive(Args)]
#[command(group(
    ArgGroup::new("seeds")
        .required(true)
        .multiple(true)
        .args(["access_token_files", "access_token", "metadata"])
))]
struct ScanArgs {
    /// Directory for result files.
    #[arg(short, long)]
    output: PathBuf,
    /// Comma-separated files holding {"access_token": "..."}.
    #[arg(long, value_delimiter = ',')]
    access_token_files: Vec<PathBuf>,
    /// Raw OAuth2 access token.
    #[arg(long)]
    access_token: Option<String>,
    /// Use the token of the instance's default service account.
    #[arg(short, long)]
    metadata: bool,
    /// Only scan projects whose ID contains this string.
    #[arg(short = 'p', long)]
    target_project: Option<String>,
    /// Comma-separated project IDs to scan even if not listed.
    #[arg(short, long, value_delimiter = ',')]
    force_projects: Vec<String>,
    /// Scan config JSON (resource type -> {"fetch": bool, ...}).
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Keep only a fixed subset of fields per resource type.
    #[arg(long)]
    light_scan: bool,
    /// Projects collected concurrently.
    #[arg(long, default_value_t = 1)]
    project_workers: usize,
    /// Collectors run concurrently within one project.
    #[arg(long, default_value_t = 1)]
    resource_workers: usize,
    /// Seconds before a single collector call is abandoned.
    #[arg(long, default_value_t = 300)]
    collector_timeout_secs: u64,
    /// Do not try to impersonate discovered service accounts.
    #[arg(long)]
    no_impersonation: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("warning: .env: {}", e);
    }

    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match cli.command {
        Commands::Scan(args) => cmd_scan(args).await?,
        Commands::DefaultConfig => cmd_default_config()?,
    }

    Ok(())
}

fn init_logging(level: &str) {
    let level = match level {
        "warning" => "warn",
        other => other,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},hyper=warn,reqwest=warn,rustls=warn")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

// ---------------------------------------------------------------------------
// scan
// ---------------------------------------------------------------------------

async fn cmd_scan(args: ScanArgs) -> anyhow::Result<()> {
    let client = GcpClient::new()?;

    let seeds = load_seeds(&args, &client).await;
    if seeds.is_empty() {
        bail!("no usable seed credentials");
    }

    let config = run_config(&args)?;
    let run_stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before the UNIX epoch")?
        .as_secs();
    let layout = FileLayout::new(&config.output_dir, run_stamp);

    let manager = Arc::new(ResourceManager::new(client.clone()));
    let scanner = Scanner::new(
        manager.clone(),
        manager,
        Arc::new(IamCredentials::new(client.clone())),
        gcp::default_registry(&client),
        &config,
        layout.clone(),
    )?;
    let summary = scanner.run(seeds).await?;

    report_graph(&summary, &layout);
    print_summary(&summary);
    Ok(())
}

/// Malformed seeds are logged and skipped.
async fn load_seeds(args: &ScanArgs, client: &GcpClient) -> Vec<Identity> {
    let mut seeds = Vec::new();

    for path in &args.access_token_files {
        match credentials::from_token_file(path) {
            Ok(seed) => seeds.push(seed),
            Err(e) => error!(path = %path.display(), error = %e, "skipping token file"),
        }
    }

    if let Some(token) = &args.access_token {
        match credentials::from_raw_token(token) {
            Ok(seed) => seeds.push(seed),
            Err(e) => error!(error = %e, "skipping user-provided token"),
        }
    }

    if args.metadata {
        match credentials::from_metadata(client).await {
            Ok(seed) => seeds.push(seed),
            Err(e) => error!(error = %e, "failed to retrieve instance metadata"),
        }
    }

    info!(count = seeds.len(), "seed identities loaded");
    seeds
}

fn run_config(args: &ScanArgs) -> anyhow::Result<RunConfig> {
    let scan = match &args.config {
        Some(path) => ScanConfig::load(path)
            .with_context(|| format!("failed to load scan config {}", path.display()))?,
        None => ScanConfig::fetch_all(),
    };

    let mut config = RunConfig::new(&args.output, scan);
    config.project_workers = args.project_workers;
    config.resource_workers = args.resource_workers;
    config.forced_projects = args.force_projects.clone();
    config.target_project = args.target_project.clone();
    config.light_scan = args.light_scan;
    config.collector_timeout = Duration::from_secs(args.collector_timeout_secs);
    if args.no_impersonation {
        config.impersonation = false;
    }
    config.validate()?;
    Ok(config)
}

/// Logs reachability per seed and saves the DOT file. The scan itself already
/// completed, so a failed write is logged and does not change the exit status.
fn report_graph(summary: &ScanSummary, layout: &FileLayout) {
    if let Err(e) = write_graph(summary, layout) {
        error!(error = format!("{e:#}"), "impersonation graph not saved");
    }
}

fn write_graph(summary: &ScanSummary, layout: &FileLayout) -> anyhow::Result<()> {
    let graph = summary.graph();
    for seed in &summary.seeds {
        let reachable = graph.reachable_from(seed);
        if reachable.is_empty() {
            info!(seed = %seed, "no identities reachable through impersonation");
        } else {
            warn!(seed = %seed, reachable = ?reachable, "identities reachable through impersonation");
        }
    }

    let path = layout.graph_path();
    write_new(&path, graph.to_dot().as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), nodes = graph.node_count(), edges = graph.edge_count(), "impersonation graph saved");
    Ok(())
}

fn write_new(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    file.write_all(contents)
}

fn print_summary(summary: &ScanSummary) {
    println!("+------------------------------------------+");
    println!("| GCP PIVOT SCAN                           |");
    println!("+------------------------------------------+");
    println!("| Identities     : {:>23} |", summary.visited.len());
    println!("| Scan tasks     : {:>23} |", summary.tasks);
    println!("| Files written  : {:>23} |", summary.files_written.len());
    println!("| Conflicts      : {:>23} |", summary.conflicts);
    println!("| Write failures : {:>23} |", summary.write_failures);
    println!("| Collector errs : {:>23} |", summary.collector_failures);
    println!("| Impersonations : {:>23} |", summary.edges.len());
    println!("| Denied         : {:>23} |", summary.failed_impersonations);
    println!("+------------------------------------------+");

    if summary.edges.is_empty() {
        println!("No impersonation paths found.");
    } else {
        println!("\nIMPERSONATION EDGES:");
        for edge in &summary.edges {
            println!("  {} -> {}  (via {})", edge.source, edge.target, edge.project_id);
        }
    }
}

// ---------------------------------------------------------------------------
// default-config
// ---------------------------------------------------------------------------

fn cmd_default_config() -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&ScanConfig::fetch_all())?);
    Ok(())
}
