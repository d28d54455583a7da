use anyhow::{Context, Result};
use fedns_api::PendingAssetResult;
use fedns_core::memory::{DevSigner, MemoryFederation};
use fedns_eval::{collect, run_per_second, subtract, write_csv, EvalConfig, EvalResult};
use fedns_resolver::{AssetRegistrar, EventListener, RegistryContext, Resolver};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// One benchmark invocation against a loaded federation
pub struct Bench {
    ctx: Arc<RegistryContext>,
    federation: MemoryFederation,
    eval: EvalConfig,
    out_file: PathBuf,
}

impl Bench {
    pub fn new(
        ctx: Arc<RegistryContext>,
        federation: MemoryFederation,
        eval: EvalConfig,
        out_file: PathBuf,
    ) -> Self {
        Self {
            ctx,
            federation,
            eval,
            out_file,
        }
    }

    /// Time `runs` resolutions of `domain`
    pub async fn resolve(&self, domain: &str, relax: bool) -> Result<()> {
        let resolver = Arc::new(Resolver::new(self.ctx.clone()));
        let (tx, mut rx) = mpsc::channel(self.eval.channel_capacity);

        info!(
            "Resolving {} {} times at {} per second",
            domain, self.eval.runs, self.eval.runs_per_second
        );
        let domain = domain.to_string();
        run_per_second(self.eval.runs, self.eval.runs_per_second, |run| {
            let resolver = resolver.clone();
            let domain = domain.clone();
            let tx = tx.clone();
            async move {
                let start = Instant::now();
                match resolver.resolve(&domain, relax).await {
                    Ok(endpoint) => {
                        info!("Run {} found {}", run, endpoint);
                        let elapsed = millis(start.elapsed());
                        let _ = tx.send(EvalResult::new(run as u64, elapsed)).await;
                    }
                    Err(e) => warn!("Run {} failed: {}", run, e),
                }
            }
        })
        .await?;
        drop(tx);

        let results = collect(&mut rx, self.eval.runs, self.eval.idle_timeout).await;
        write_csv(&self.out_file, &results)?;
        Ok(())
    }

    /// Register `runs` assets and record the block each landed in
    pub async fn register(&self, domain: &str, seed: &str) -> Result<()> {
        let (tx, mut rx) = mpsc::channel(self.eval.channel_capacity);
        self.drive_registrations(domain, seed, tx).await?;

        let results = collect(&mut rx, self.eval.runs, self.eval.idle_timeout).await;
        write_csv(&self.out_file, &to_eval_results(results))?;
        Ok(())
    }

    /// Relay registration events while registering assets.
    ///
    /// Writes the relayed blocks to the output file, the registrar's blocks
    /// next to it with a `_register` suffix, and their per-run difference
    /// with a `_diff` suffix.
    pub async fn listen(&self, domain: &str, seed: &str) -> Result<()> {
        let (events_tx, mut events_rx) = mpsc::channel(self.eval.channel_capacity);
        let listener = EventListener::new(self.ctx.clone());
        let runs = self.eval.runs;
        let listening =
            tokio::spawn(async move { listener.listen(events_tx, true, Some(runs)).await });
        self.wait_for_listener().await?;

        let (blocks_tx, mut blocks_rx) = mpsc::channel(self.eval.channel_capacity);
        self.drive_registrations(domain, seed, blocks_tx).await?;

        let relayed = collect(&mut events_rx, runs, self.eval.idle_timeout).await;
        let registered = collect(&mut blocks_rx, runs, self.eval.idle_timeout).await;
        drop(events_rx);
        match listening.await {
            Ok(Ok(count)) => info!("Listener relayed {} events", count),
            Ok(Err(e)) => warn!("Listener stopped with error: {}", e),
            Err(e) => warn!("Listener task failed: {}", e),
        }

        let register_file = sibling(&self.out_file, "register");
        let diff_file = sibling(&self.out_file, "diff");
        write_csv(&self.out_file, &to_eval_results(relayed))?;
        write_csv(&register_file, &to_eval_results(registered))?;
        subtract(&self.out_file, &register_file, &diff_file)?;
        info!("Block differences saved to {}", diff_file.display());
        Ok(())
    }

    /// Prime the signer's nonce with the sentinel label, then register one
    /// asset per run with consecutive nonces
    async fn drive_registrations(
        &self,
        domain: &str,
        seed: &str,
        results: mpsc::Sender<PendingAssetResult>,
    ) -> Result<()> {
        let registrar = Arc::new(AssetRegistrar::new(
            self.ctx.clone(),
            Arc::new(DevSigner::new(seed)),
        ));
        let sentinel = self.ctx.config().sentinel_label.clone();
        let nonce = registrar
            .register_asset(domain, &sentinel, 0, &results)
            .await
            .context("failed to prime the signer nonce")?;
        info!("Initial nonce: {}", nonce);

        let prefix = self.ctx.config().asset_prefix.clone();
        let domain = domain.to_string();
        run_per_second(self.eval.runs, self.eval.runs_per_second, |run| {
            let registrar = registrar.clone();
            let results = results.clone();
            let domain = domain.clone();
            let label = format!("{}{}", prefix, run);
            let nonce = nonce + run as u32 + 1;
            async move {
                // failures are logged by the registrar
                let _ = registrar
                    .register_asset(&domain, &label, nonce, &results)
                    .await;
            }
        })
        .await?;
        Ok(())
    }

    async fn wait_for_listener(&self) -> Result<()> {
        let root = self.ctx.root_spec().await?;
        let registry = self
            .federation
            .registry(&root.id)
            .with_context(|| format!("root registry {} is not simulated", root.id))?;

        let deadline = Instant::now() + Duration::from_secs(5);
        while registry.subscriber_count() == 0 {
            if Instant::now() > deadline {
                anyhow::bail!("listener did not subscribe to {}", root.id);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Ok(())
    }
}

fn millis(elapsed: Duration) -> i64 {
    i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
}

fn to_eval_results(results: Vec<PendingAssetResult>) -> Vec<EvalResult> {
    results
        .into_iter()
        .filter_map(|result| match result.index() {
            Some(run) => Some(EvalResult::new(
                run,
                i64::try_from(result.value).unwrap_or(i64::MAX),
            )),
            None => {
                warn!("Result label {} carries no run index", result.label);
                None
            }
        })
        .collect()
}

/// `dir/eval.csv` -> `dir/eval_<suffix>.csv`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "eval".to_string());
    path.with_file_name(format!("{}_{}.csv", stem, suffix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedns_core::memory::FederationFixture;
    use fedns_resolver::ClientConfig;
    use tempfile::TempDir;

    fn bench(dir: &TempDir, runs: usize) -> Bench {
        let fixture: FederationFixture =
            serde_json::from_str(include_str!("../fixtures/federation.json")).unwrap();
        let federation = MemoryFederation::from_fixture(&fixture).unwrap();
        let config = ClientConfig {
            root_spec_url: fixture.root.url.clone(),
            use_cache: true,
            ..ClientConfig::default()
        };
        let ctx = RegistryContext::new(
            config,
            Arc::new(federation.clone()),
            Arc::new(federation.clone()),
        )
        .unwrap();
        let eval = EvalConfig {
            runs,
            runs_per_second: 200,
            idle_timeout: Duration::from_secs(5),
            ..EvalConfig::default()
        };
        Bench::new(Arc::new(ctx), federation, eval, dir.path().join("eval.csv"))
    }

    fn rows(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn test_resolve_writes_one_row_per_run() {
        let dir = TempDir::new().unwrap();
        let bench = bench(&dir, 4);

        bench.resolve("example.com", true).await.unwrap();

        let rows = rows(&dir.path().join("eval.csv"));
        assert_eq!(rows[0], "Run,Execution Time (ms)");
        assert_eq!(rows.len(), 5);
    }

    #[tokio::test]
    async fn test_listen_reports_matching_blocks() {
        let dir = TempDir::new().unwrap();
        let bench = bench(&dir, 3);

        bench.listen("example.com", "//Alice").await.unwrap();

        assert_eq!(rows(&dir.path().join("eval.csv")).len(), 4);
        assert_eq!(rows(&dir.path().join("eval_register.csv")).len(), 4);
        let diff = rows(&dir.path().join("eval_diff.csv"));
        assert_eq!(diff[0], "Run,Time Difference (ms)");
        assert_eq!(diff.len(), 4);
        assert!(diff[1..].iter().all(|row| row.ends_with(",0")));
    }

    #[test]
    fn test_sibling_paths() {
        assert_eq!(
            sibling(Path::new("out/100rps.csv"), "diff"),
            PathBuf::from("out/100rps_diff.csv")
        );
        assert_eq!(sibling(Path::new("eval.csv"), "register"), PathBuf::from("eval_register.csv"));
    }

    #[test]
    fn test_results_keyed_by_run_index() {
        let results = to_eval_results(vec![
            PendingAssetResult::new("asset12", 40),
            PendingAssetResult::new("7", 41),
            PendingAssetResult::new("asset", 42),
        ]);
        assert_eq!(results, vec![EvalResult::new(12, 40), EvalResult::new(7, 41)]);
    }
}
