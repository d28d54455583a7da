use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fedns_core::memory::{FederationFixture, MemoryFederation};
use fedns_core::SpecFetcher;
use fedns_discovery::HttpSpecFetcher;
use fedns_eval::EvalConfig;
use fedns_resolver::{ClientConfig, RegistryContext};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod runs;

use runs::Bench;

/// Benchmarks name resolution and asset registration against a simulated federation
#[derive(Parser, Debug)]
#[command(name = "fedns-bench")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Federation fixture describing the registries, their entry points and records
    #[arg(long, env = "FEDNS_FEDERATION", default_value = "bin/fedns-bench/fixtures/federation.json")]
    federation: PathBuf,

    /// Descriptor URL of the root registry (defaults to the fixture's)
    #[arg(long, env = "FEDNS_ROOT_SPEC_URL")]
    root_spec_url: Option<String>,

    /// Keep connections open and share them between runs
    #[arg(long)]
    use_cache: bool,

    /// Number of runs
    #[arg(long, default_value_t = 1)]
    runs: usize,

    /// Runs admitted per second
    #[arg(long, default_value_t = 1)]
    rps: u32,

    /// CSV file receiving one row per completed run
    #[arg(long, default_value = "eval.csv")]
    out_file: PathBuf,

    /// Seconds without a result before collection stops
    #[arg(long, default_value_t = 30)]
    idle_timeout: u64,

    /// Fetch registry descriptors over HTTP instead of from the fixture
    #[arg(long)]
    http_specs: bool,

    /// Rewrite descriptor hosts when fetching over HTTP, as FROM=TO
    #[arg(long, env = "FEDNS_REWRITE_HOST", requires = "http_specs")]
    rewrite_host: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve a domain once per run and record the latency
    Resolve {
        #[arg(long, default_value = "example.com")]
        domain: String,

        /// Reuse the last fetched descriptors instead of fetching per lookup
        #[arg(long)]
        relax: bool,
    },
    /// Register one asset per run and record the inclusion block
    Register {
        #[arg(long, default_value = "example.com")]
        domain: String,

        /// Seed of the signing account
        #[arg(long, default_value = "//Alice")]
        seed: String,
    },
    /// Relay registration events while registering assets
    Listen {
        #[arg(long, default_value = "example.com")]
        domain: String,

        #[arg(long, default_value = "//Alice")]
        seed: String,
    },
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_fixture(path: &Path) -> Result<FederationFixture> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read federation fixture {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse federation fixture {}", path.display()))
}

fn spec_fetcher(args: &Args, federation: &MemoryFederation) -> Result<Arc<dyn SpecFetcher>> {
    if !args.http_specs {
        return Ok(Arc::new(federation.clone()));
    }

    let mut fetcher = HttpSpecFetcher::new(Duration::from_secs(10))?;
    if let Some(rewrite) = &args.rewrite_host {
        let Some((from, to)) = rewrite.split_once('=') else {
            bail!("--rewrite-host expects FROM=TO, got {}", rewrite);
        };
        fetcher = fetcher.with_host_rewrite(from, to);
    }
    Ok(Arc::new(fetcher))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.json_logs);

    info!("Starting fedns-bench...");

    let fixture = load_fixture(&args.federation)?;
    let federation = MemoryFederation::from_fixture(&fixture)?;
    info!(
        "Federation loaded with {} second-level registries",
        fixture.registries.len()
    );

    let config = ClientConfig {
        root_spec_url: args
            .root_spec_url
            .clone()
            .unwrap_or_else(|| fixture.root.url.clone()),
        use_cache: args.use_cache,
        ..ClientConfig::default()
    };
    info!("Root spec URL: {}", config.root_spec_url);
    info!("Connection caching: {}", config.use_cache);

    let fetcher = spec_fetcher(&args, &federation)?;
    let ctx = Arc::new(RegistryContext::new(
        config,
        fetcher,
        Arc::new(federation.clone()),
    )?);

    let eval = EvalConfig {
        runs: args.runs,
        runs_per_second: args.rps,
        idle_timeout: Duration::from_secs(args.idle_timeout),
        ..EvalConfig::default()
    };
    let bench = Bench::new(ctx.clone(), federation, eval, args.out_file.clone());

    match args.command {
        Command::Resolve { domain, relax } => bench.resolve(&domain, relax).await?,
        Command::Register { domain, seed } => bench.register(&domain, &seed).await?,
        Command::Listen { domain, seed } => bench.listen(&domain, &seed).await?,
    }

    debug!("Final metrics:\n{}", ctx.metrics().gather()?);
    Ok(())
}
