use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use krepis_smc::adapters::{catalog, find, verify, LitmusInterpreter, LitmusTest};
use krepis_smc::{CheckerConfig, CoherenceKind, Explorer, MemoryModel, Snapshot, VerificationResult};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Krepis stateless model checker
/// Explores every execution of a litmus program under a weak memory model
#[derive(Parser)]
#[command(name = "krepis-smc", version)]
#[command(about = "Stateless model checker for litmus programs", long_about = None)]
struct Cli {
    /// Log exploration decisions (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Explore a catalog test or a JSON litmus file
    Run {
        /// Catalog name or path to a `.json` program
        litmus: String,

        #[command(flatten)]
        checker: CheckerArgs,

        /// Write a resumable snapshot after the search stops
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// List the built-in litmus catalog
    List,
    /// Continue a search from an exported snapshot
    Resume {
        /// Snapshot written by `run --export`
        snapshot: PathBuf,
        /// Program the snapshot was taken from
        litmus: String,
        /// Write the frontier again when the search stops
        #[arg(long)]
        export: Option<PathBuf>,
    },
}

#[derive(Args)]
struct CheckerArgs {
    /// Memory model: sc, ra, rc11, lkmm
    #[arg(long, default_value = "rc11")]
    model: MemoryModel,

    /// Coherence strategy: mo (explicit order), mo-ooo (explicit, out of
    /// order) or wb (derived order)
    #[arg(long, default_value = "wb")]
    coherence: CoherenceKind,

    /// Keep exploring after the first finding
    #[arg(long)]
    keep_going: bool,

    /// Exploration worker threads
    #[arg(long, default_value_t = 1)]
    workers: usize,

    /// Skip the data-race detector
    #[arg(long)]
    no_races: bool,

    /// JSON file with a full checker configuration; flags are ignored
    #[arg(long)]
    config: Option<PathBuf>,
}

impl CheckerArgs {
    fn into_config(self) -> Result<CheckerConfig> {
        if let Some(path) = &self.config {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            return CheckerConfig::from_json(&json)
                .with_context(|| format!("parsing config {}", path.display()));
        }
        let mut config = CheckerConfig::default()
            .with_model(self.model)
            .with_coherence(self.coherence)
            .with_race_checks(!self.no_races)
            .with_workers(self.workers);
        if self.keep_going {
            config = config.keep_going();
        }
        Ok(config)
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let default = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_target(false)
        .init();

    match cli.command {
        Commands::List => {
            for test in catalog() {
                println!("{test}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run {
            litmus,
            checker,
            export,
        } => {
            let test = load_litmus(&litmus)?;
            let config = checker.into_config()?;
            info!(test = %test.name, model = %config.model, coherence = %config.coherence, "checking");

            let result = match &export {
                Some(path) => {
                    if config.workers > 1 {
                        bail!("--export needs a sequential search; drop --workers");
                    }
                    let mut explorer = Explorer::new(config);
                    let result = explorer.run(&mut LitmusInterpreter::new(&test))?;
                    save(&explorer, path)?;
                    result
                }
                None => verify(&test, &config)?,
            };
            Ok(report(&test, &result))
        }
        Commands::Resume {
            snapshot,
            litmus,
            export,
        } => {
            let test = load_litmus(&litmus)?;
            let snap = Snapshot::load(&snapshot)
                .with_context(|| format!("loading snapshot {}", snapshot.display()))?;
            info!(states = snap.frontier.len(), test = %test.name, "resuming");

            let mut explorer = snap.into_explorer();
            let result = explorer.run(&mut LitmusInterpreter::new(&test))?;
            if let Some(path) = &export {
                save(&explorer, path)?;
            }
            Ok(report(&test, &result))
        }
    }
}

fn load_litmus(name: &str) -> Result<LitmusTest> {
    if let Some(test) = find(name) {
        return Ok(test);
    }
    let path = Path::new(name);
    if !path.exists() {
        bail!("no catalog test or file named {name:?}; see `krepis-smc list`");
    }
    let json = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    LitmusTest::from_json(&json).with_context(|| format!("parsing litmus program {}", path.display()))
}

fn save(explorer: &Explorer, path: &Path) -> Result<()> {
    Snapshot::capture(explorer)
        .save(path)
        .with_context(|| format!("writing snapshot {}", path.display()))
}

fn report(test: &LitmusTest, result: &VerificationResult) -> ExitCode {
    let stats = &result.stats;
    println!("{test}");
    println!(
        "executions: {} complete, {} blocked, {} inconsistent",
        stats.complete, stats.blocked, stats.inconsistent
    );
    println!(
        "revisits:   {} forward, {} backward (max depth {})",
        stats.forward_revisits, stats.backward_revisits, stats.max_stack_depth
    );
    for (outcome, n) in &result.outcomes {
        println!("  {outcome}  ({n})");
    }
    if let Some(exists) = &test.exists {
        let verdict = if result.allows(exists) { "reachable" } else { "never observed" };
        println!("exists ({exists}): {verdict}");
    }
    for warning in &result.warnings {
        println!("warning: {warning}");
    }
    for finding in &result.findings {
        println!("error: {finding}");
    }
    if result.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
