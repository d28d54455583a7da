//! Signed registration transactions against the naming registries

use crate::context::RegistryContext;
use crate::resolver::parse_domain;
use fedns_api::{PendingAssetResult, RegistryRole, RegistrySpec};
use fedns_core::codec;
use fedns_core::names::{
    ACCOUNT_MAP, ASSET_MODULE, REGISTER_ASSET_CALL, REGISTER_DOMAIN_CALL, REGISTER_TLD_CALL,
    ROOT_MODULE, SYSTEM_MODULE, TLD_MODULE,
};
use fedns_core::transport::{BlockHash, TxWatch};
use fedns_core::{
    ConnectionHandle, CoreError, RegistrationStage, Result, Scope, TransportError, TxSigner,
    TxStatus,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Nonce a transaction was signed with and the block it landed in
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Inclusion {
    pub nonce: u32,
    pub block: u64,
}

/// One call to sign and submit
struct Submission<'a> {
    module: &'static str,
    name: &'static str,
    args: Vec<Vec<u8>>,
    nonce_override: u32,
    /// Channel and label to report the inclusion block on
    report: Option<(&'a mpsc::Sender<PendingAssetResult>, &'a str)>,
}

/// AssetRegistrar signs registration calls, waits for their inclusion and
/// reports the block each one landed in.
///
/// Asset registrations and top-level registrations go to the root registry;
/// domain registrations go to the second-level registry serving the domain.
pub struct AssetRegistrar {
    ctx: Arc<RegistryContext>,
    signer: Arc<dyn TxSigner>,
}

impl AssetRegistrar {
    pub fn new(ctx: Arc<RegistryContext>, signer: Arc<dyn TxSigner>) -> Self {
        Self { ctx, signer }
    }

    /// Register `asset_label` for `domain` and wait for block inclusion.
    ///
    /// A nonzero `nonce_override` is used as is; otherwise the signer's nonce
    /// is read from the ledger. Emits `(asset_label, block)` on `results`
    /// unless the label is the configured sentinel. Returns the nonce used.
    pub async fn register_asset(
        &self,
        domain: &str,
        asset_label: &str,
        nonce_override: u32,
        results: &mpsc::Sender<PendingAssetResult>,
    ) -> Result<u32> {
        let report = (asset_label != self.ctx.config().sentinel_label)
            .then_some((results, asset_label));
        let outcome = async {
            let root = self.root_spec().await?;
            let submission = Submission {
                module: ASSET_MODULE,
                name: REGISTER_ASSET_CALL,
                args: vec![codec::text(domain), codec::text(asset_label)],
                nonce_override,
                report,
            };
            self.transact(&root, &Scope::Root, submission).await
        }
        .await;

        self.record_outcome(&outcome, || format!("asset {} for {}", asset_label, domain));
        outcome.map(|inclusion| inclusion.nonce)
    }

    /// Point top-level label `tld` at the descriptor served from `spec_url`
    pub async fn register_tld(
        &self,
        tld: &str,
        spec_url: &str,
        nonce_override: u32,
    ) -> Result<Inclusion> {
        let outcome = async {
            let root = self.root_spec().await?;
            let submission = Submission {
                module: ROOT_MODULE,
                name: REGISTER_TLD_CALL,
                args: vec![codec::text(tld), codec::text(spec_url)],
                nonce_override,
                report: None,
            };
            self.transact(&root, &Scope::Root, submission).await
        }
        .await;

        self.record_outcome(&outcome, || format!("top-level {}", tld));
        outcome
    }

    /// Register `domain` in the second-level registry its top-level label maps to.
    ///
    /// The top-level record is read through the root scope, the submission
    /// goes through the second-level registry's own scope.
    pub async fn register_domain(
        &self,
        domain: &str,
        spec_url: &str,
        maintainer: &str,
        nonce_override: u32,
    ) -> Result<Inclusion> {
        let outcome = self
            .register_in_registry(domain, spec_url, maintainer, nonce_override)
            .await;

        self.record_outcome(&outcome, || format!("domain {}", domain));
        outcome
    }

    async fn register_in_registry(
        &self,
        domain: &str,
        spec_url: &str,
        maintainer: &str,
        nonce_override: u32,
    ) -> Result<Inclusion> {
        let (_, top_level) = parse_domain(domain)?;
        let fetch_spec = |e| CoreError::registration(RegistrationStage::FetchSpec, e);

        let record = self
            .ctx
            .registry_record(top_level, true)
            .await
            .map_err(fetch_spec)?;
        let registry = self
            .ctx
            .spec(RegistryRole::SecondLevel, &record.endpoint, false)
            .await
            .map_err(fetch_spec)?;

        let submission = Submission {
            module: TLD_MODULE,
            name: REGISTER_DOMAIN_CALL,
            args: vec![
                codec::text(domain),
                codec::text(spec_url),
                codec::text(maintainer),
            ],
            nonce_override,
            report: None,
        };
        self.transact(&registry, &Scope::Registry(registry.id.clone()), submission)
            .await
    }

    fn record_outcome<T>(&self, outcome: &Result<T>, what: impl FnOnce() -> String) {
        let label = if outcome.is_ok() { "ok" } else { "error" };
        self.ctx
            .metrics()
            .registrations_total
            .with_label_values(&[label])
            .inc();

        if let Err(e) = outcome {
            warn!("Registration of {} failed: {}", what(), e);
        }
    }

    async fn root_spec(&self) -> Result<Arc<RegistrySpec>> {
        self.ctx
            .root_spec()
            .await
            .map_err(|e| CoreError::registration(RegistrationStage::FetchSpec, e))
    }

    /// Check out a connection through `scope`, submit, then release it.
    async fn transact(
        &self,
        spec: &RegistrySpec,
        scope: &Scope,
        submission: Submission<'_>,
    ) -> Result<Inclusion> {
        let handle = self
            .ctx
            .checkout(spec, scope)
            .await
            .map_err(|e| CoreError::registration(RegistrationStage::Connect, e))?;

        let result = self.submit(spec, &handle, submission).await;

        self.ctx
            .pool()
            .release(handle, self.ctx.config().use_cache)
            .await;
        result
    }

    async fn submit(
        &self,
        spec: &RegistrySpec,
        handle: &ConnectionHandle,
        submission: Submission<'_>,
    ) -> Result<Inclusion> {
        use RegistrationStage as Stage;
        let stage = |stage: Stage| move |e: CoreError| CoreError::registration(stage, e);

        let schema = self
            .ctx
            .schemas()
            .get_schema(&spec.id, handle)
            .await
            .map_err(stage(Stage::Schema))?;

        let nonce = if submission.nonce_override != 0 {
            submission.nonce_override
        } else {
            let key = schema
                .storage_key(
                    SYSTEM_MODULE,
                    ACCOUNT_MAP,
                    Some(self.signer.account().as_bytes().to_vec()),
                )
                .map_err(stage(Stage::Nonce))?;
            match handle
                .read_storage(&key)
                .await
                .map_err(|e| stage(Stage::Nonce)(e.into()))?
            {
                Some(info) => codec::decode_account_nonce(&info).map_err(stage(Stage::Nonce))?,
                None => 0,
            }
        };

        let call = schema
            .call(submission.module, submission.name, submission.args)
            .map_err(stage(Stage::Schema))?;
        let call_name = call.qualified_name();

        let context = handle
            .signing_context()
            .await
            .map_err(|e| stage(Stage::Sign)(e.into()))?;
        let tx = self
            .signer
            .sign(call, nonce, &context)
            .map_err(|e| stage(Stage::Sign)(e.into()))?;
        debug!(
            "Submitting {} to {} with nonce {} via {}",
            call_name,
            spec.id,
            nonce,
            handle.uri()
        );

        let mut watch = handle
            .submit_and_watch(tx)
            .await
            .map_err(|e| stage(Stage::Submit)(e.into()))?;

        let hash = wait_for_inclusion(&mut watch)
            .await
            .map_err(|e| stage(Stage::Inclusion)(e.into()))?;
        let block = handle
            .block_number(hash)
            .await
            .map_err(|e| stage(Stage::Inclusion)(e.into()))?;
        info!("{} included in block {} of {}", call_name, block, spec.id);

        if let Some((results, label)) = submission.report {
            results
                .send(PendingAssetResult::new(label, block))
                .await
                .map_err(|_| {
                    stage(Stage::Emit)(CoreError::Internal(
                        "result receiver dropped".to_string(),
                    ))
                })?;
        }

        // unsubscribes from further status updates
        drop(watch);
        Ok(Inclusion { nonce, block })
    }
}

async fn wait_for_inclusion(watch: &mut TxWatch) -> std::result::Result<BlockHash, TransportError> {
    while let Some(status) = watch.recv().await {
        match status {
            TxStatus::InBlock(hash) | TxStatus::Finalized(hash) => return Ok(hash),
            TxStatus::Ready | TxStatus::Broadcast => continue,
            TxStatus::Usurped | TxStatus::Dropped | TxStatus::Invalid => {
                return Err(TransportError::Rpc(format!(
                    "transaction ended as {:?}",
                    status
                )))
            }
        }
    }
    Err(TransportError::SubscriptionClosed)
}
