//! Live relay of asset registration events from the root registry

use crate::context::RegistryContext;
use fedns_api::{DomainEvent, PendingAssetResult, RegistrySpec};
use fedns_core::names::{EVENTS_MAP, SYSTEM_MODULE};
use fedns_core::{ConnectionHandle, CoreError, Result, Scope};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// EventListener follows the root registry's event storage over a dedicated
/// connection.
///
/// The connection goes to the entry point the root scope currently points
/// at. It is never pooled and the scope is not advanced.
pub struct EventListener {
    ctx: Arc<RegistryContext>,
}

impl EventListener {
    pub fn new(ctx: Arc<RegistryContext>) -> Self {
        Self { ctx }
    }

    /// Relay `AssetRegisteredForDomain` events to `results` until the
    /// subscription ends, the receiver is dropped or `max_events` have been
    /// relayed. Returns how many results were sent.
    ///
    /// With `filter_asset_events` unset events are only logged.
    pub async fn listen(
        &self,
        results: mpsc::Sender<PendingAssetResult>,
        filter_asset_events: bool,
        max_events: Option<usize>,
    ) -> Result<usize> {
        let root = self.ctx.root_spec().await?;
        let index = self
            .ctx
            .rotator()
            .current_index(&Scope::Root, root.entry_point_count())
            .await?;
        let address = root.entry_point(index).ok_or_else(|| {
            CoreError::Configuration(format!("registry {} has no entry point {}", root.id, index))
        })?;

        let handle = self.ctx.pool().open(address).await?;
        info!("Listening for events on {}", handle.uri());

        let relayed = self
            .relay(&root, &handle, &results, filter_asset_events, max_events)
            .await;

        handle.close().await;
        relayed
    }

    async fn relay(
        &self,
        root: &RegistrySpec,
        handle: &ConnectionHandle,
        results: &mpsc::Sender<PendingAssetResult>,
        filter_asset_events: bool,
        max_events: Option<usize>,
    ) -> Result<usize> {
        let schema = self.ctx.schemas().get_schema(&root.id, handle).await?;
        let key = schema.storage_key(SYSTEM_MODULE, EVENTS_MAP, None)?;
        let mut subscription = handle.subscribe_storage(vec![key]).await?;

        let mut relayed = 0;
        if max_events == Some(0) {
            return Ok(relayed);
        }

        loop {
            let change = tokio::select! {
                change = subscription.recv() => change,
                _ = results.closed() => {
                    debug!("Result receiver dropped, stopping event relay");
                    return Ok(relayed);
                }
            };

            let Some(change) = change else {
                info!("Event subscription on {} ended", handle.uri());
                return Ok(relayed);
            };

            let events = match handle.decode_events(&schema, &change.data) {
                Ok(events) => events,
                Err(e) => {
                    warn!("Skipping undecodable event record: {}", e);
                    continue;
                }
            };

            for event in events {
                info!("Received event {}", event.name());
                if !filter_asset_events {
                    continue;
                }
                let Some(result) = self.asset_result(event) else {
                    continue;
                };

                if results.send(result).await.is_err() {
                    return Ok(relayed);
                }
                relayed += 1;
                self.ctx.metrics().events_relayed_total.inc();

                if max_events.is_some_and(|max| relayed >= max) {
                    return Ok(relayed);
                }
            }
        }
    }

    fn asset_result(&self, event: DomainEvent) -> Option<PendingAssetResult> {
        let DomainEvent::AssetRegisteredForDomain {
            asset_label, block, ..
        } = event
        else {
            return None;
        };

        let config = self.ctx.config();
        if asset_label == config.sentinel_label {
            return None;
        }
        let label = asset_label
            .strip_prefix(config.asset_prefix.as_str())
            .unwrap_or(&asset_label);
        Some(PendingAssetResult::new(label, block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ClientConfig;
    use crate::registrar::AssetRegistrar;
    use fedns_api::AccountId;
    use fedns_core::memory::{root_schema, DevSigner, MemoryFederation, MemoryRegistry};
    use std::time::Duration;
    use tokio::task::JoinHandle;

    const ROOT_URL: &str = "http://json_server:3000/json/rootSpec.json";

    fn setup(use_cache: bool) -> (MemoryFederation, Arc<MemoryRegistry>, Arc<RegistryContext>) {
        let federation = MemoryFederation::new();
        let root = federation.add_registry(
            ROOT_URL,
            RegistrySpec::new(
                "root",
                vec![
                    "/ip4/10.0.0.1/tcp/9944/p2p/a".to_string(),
                    "/ip4/10.0.0.2/tcp/9944/p2p/b".to_string(),
                ],
            ),
            root_schema(),
        );
        let config = ClientConfig {
            root_spec_url: ROOT_URL.to_string(),
            use_cache,
            ..ClientConfig::default()
        };
        let ctx = RegistryContext::new(
            config,
            Arc::new(federation.clone()),
            Arc::new(federation.clone()),
        )
        .expect("context");
        (federation, root, Arc::new(ctx))
    }

    fn spawn_listener(
        ctx: &Arc<RegistryContext>,
        results: mpsc::Sender<PendingAssetResult>,
        filter: bool,
        max_events: Option<usize>,
    ) -> JoinHandle<Result<usize>> {
        let listener = EventListener::new(ctx.clone());
        tokio::spawn(async move { listener.listen(results, filter, max_events).await })
    }

    async fn wait_for_subscriber(registry: &MemoryRegistry) {
        for _ in 0..200 {
            if registry.subscriber_count() > 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("listener never subscribed");
    }

    fn registered(label: &str, block: u64) -> DomainEvent {
        DomainEvent::AssetRegisteredForDomain {
            asset_label: label.to_string(),
            domain: "example.com".to_string(),
            block,
        }
    }

    #[tokio::test]
    async fn test_relays_asset_events_without_prefix() {
        let (_federation, root, ctx) = setup(false);
        let (tx, mut rx) = mpsc::channel(8);
        let task = spawn_listener(&ctx, tx, true, Some(2));
        wait_for_subscriber(&root).await;

        root.emit_events(&[
            DomainEvent::DomainValidationRequested {
                requester: AccountId([2; 32]),
                domain: "example.com".to_string(),
                timestamp: "1700000000".to_string(),
            },
            registered("asset-1", 3),
            registered("asset3", 4),
        ]);
        root.emit_events(&[DomainEvent::ExpiredRequestsRemoved, registered("asset4", 5)]);

        assert_eq!(rx.recv().await, Some(PendingAssetResult::new("3", 4)));
        assert_eq!(rx.recv().await, Some(PendingAssetResult::new("4", 5)));
        assert_eq!(task.await.expect("listener panicked").unwrap(), 2);
    }

    #[tokio::test]
    async fn test_malformed_record_is_skipped() {
        let (_federation, root, ctx) = setup(false);
        let (tx, mut rx) = mpsc::channel(8);
        let task = spawn_listener(&ctx, tx, true, Some(1));
        wait_for_subscriber(&root).await;

        root.emit_raw(b"\x00\x01 not an event record".to_vec());
        root.emit_events(&[registered("asset9", 12)]);

        assert_eq!(rx.recv().await, Some(PendingAssetResult::new("9", 12)));
        assert_eq!(task.await.expect("listener panicked").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unfiltered_listener_only_logs() {
        let (_federation, root, ctx) = setup(false);
        let (tx, mut rx) = mpsc::channel(8);
        let task = spawn_listener(&ctx, tx, false, None);
        wait_for_subscriber(&root).await;

        root.emit_events(&[registered("asset0", 1)]);
        let waited = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(waited.is_err());

        // dropping the receiver stops the relay
        drop(rx);
        assert_eq!(task.await.expect("listener panicked").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dedicated_connection_leaves_rotation_alone() {
        let (federation, root, ctx) = setup(true);
        let (tx, mut rx) = mpsc::channel(8);
        let task = spawn_listener(&ctx, tx, true, Some(1));
        wait_for_subscriber(&root).await;

        root.emit_events(&[registered("asset2", 8)]);
        assert!(rx.recv().await.is_some());
        task.await.expect("listener panicked").unwrap();

        assert_eq!(ctx.rotator().current_index(&Scope::Root, 2).await.unwrap(), 0);
        assert!(ctx.pool().is_empty().await);
        let stats = federation.stats();
        assert_eq!(stats.connects, 1);
        assert_eq!(stats.closes, 1);
    }

    #[tokio::test]
    async fn test_relays_registrations_submitted_by_registrar() {
        let (_federation, root, ctx) = setup(true);
        let (events_tx, mut events_rx) = mpsc::channel(8);
        let task = spawn_listener(&ctx, events_tx, true, Some(2));
        wait_for_subscriber(&root).await;

        let registrar = AssetRegistrar::new(ctx.clone(), Arc::new(DevSigner::new("//Bob")));
        let (blocks_tx, mut blocks_rx) = mpsc::channel(8);
        for label in ["asset-1", "asset0", "asset1"] {
            registrar
                .register_asset("example.com", label, 0, &blocks_tx)
                .await
                .unwrap();
        }

        assert_eq!(blocks_rx.recv().await, Some(PendingAssetResult::new("asset0", 2)));
        assert_eq!(events_rx.recv().await, Some(PendingAssetResult::new("0", 2)));
        assert_eq!(events_rx.recv().await, Some(PendingAssetResult::new("1", 3)));
        assert_eq!(task.await.expect("listener panicked").unwrap(), 2);

        let text = ctx.metrics().gather().unwrap();
        assert!(text.contains("fedns_events_relayed_total 2"));
    }
}
