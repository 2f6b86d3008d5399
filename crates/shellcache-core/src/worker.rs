//! Lifecycle event dispatch.
//!
//! A `Worker` owns everything one deployment needs (storage, network,
//! client signals, manifest) and routes each `LifecycleEvent` to its
//! handler. Message payloads are matched by `Message::parse`, which has no
//! dependency on the host so it can be tested on its own.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::CacheResult;
use crate::install::install;
use crate::intercept::{Intercepted, Interceptor};
use crate::manifest::Deployment;
use crate::network::Fetcher;
use crate::origin::Origin;
use crate::prefetch::download_offline;
use crate::reconcile::{ActivationOutcome, ActivationState, Reconciler};
use crate::request::Request;
use crate::storage::{CacheStorage, RegionNames};

/// Outbound signals to the pages the worker controls.
#[async_trait]
pub trait ClientController: Send + Sync {
    /// Take control of open pages so the new cache serves them immediately.
    async fn claim(&self) -> CacheResult<()>;

    /// Activate this worker without waiting for old pages to close.
    async fn skip_waiting(&self) -> CacheResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Install,
    Activate,
    Fetch(Request),
    Message(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    SkipWaiting,
    DownloadOffline,
}

impl Message {
    pub fn parse(payload: &str) -> Option<Self> {
        match payload {
            "skipWaiting" => Some(Message::SkipWaiting),
            "downloadOffline" => Some(Message::DownloadOffline),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum EventOutcome {
    Installed,
    Activated(ActivationOutcome),
    Responded(Intercepted),
    /// The request is not ours; the platform should handle it.
    Declined,
    SkipWaiting,
    Prefetched(Vec<String>),
    /// Unrecognized message payload.
    Ignored,
}

pub struct Worker {
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    clients: Arc<dyn ClientController>,
    deployment: Arc<Deployment>,
    origin: Origin,
    regions: RegionNames,
    state: RwLock<ActivationState>,
}

impl Worker {
    pub fn new(
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        clients: Arc<dyn ClientController>,
        deployment: Arc<Deployment>,
        origin: Origin,
        regions: RegionNames,
    ) -> CacheResult<Self> {
        regions.validate()?;
        Ok(Self {
            storage,
            fetcher,
            clients,
            deployment,
            origin,
            regions,
            state: RwLock::new(ActivationState::NoManifest),
        })
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn regions(&self) -> &RegionNames {
        &self.regions
    }

    pub fn deployment(&self) -> &Deployment {
        &self.deployment
    }

    /// State as last observed by this worker. A new worker starts at
    /// `NoManifest` until `refresh_state` or an activation updates it.
    pub async fn state(&self) -> ActivationState {
        *self.state.read().await
    }

    /// Re-derive the activation state from what is in storage.
    pub async fn refresh_state(&self) -> CacheResult<ActivationState> {
        let probed = self.reconciler().state(self.storage.as_ref()).await?;
        *self.state.write().await = probed;
        Ok(probed)
    }

    fn reconciler(&self) -> Reconciler<'_> {
        Reconciler::new(self.deployment.resources(), &self.regions)
    }

    /// Route an event to its handler. Each variant has exactly one.
    pub async fn dispatch(&self, event: LifecycleEvent) -> CacheResult<EventOutcome> {
        match event {
            LifecycleEvent::Install => self.on_install().await,
            LifecycleEvent::Activate => Ok(self.on_activate().await),
            LifecycleEvent::Fetch(request) => self.on_fetch(&request).await,
            LifecycleEvent::Message(payload) => self.on_message(&payload).await,
        }
    }

    async fn on_install(&self) -> CacheResult<EventOutcome> {
        self.signal_skip_waiting().await;
        install(
            self.storage.as_ref(),
            &self.regions,
            &self.origin,
            self.deployment.shell(),
            self.fetcher.as_ref(),
        )
        .await?;
        Ok(EventOutcome::Installed)
    }

    async fn on_activate(&self) -> EventOutcome {
        *self.state.write().await = ActivationState::Reconciling;
        let outcome = self
            .reconciler()
            .activate(self.storage.as_ref(), &self.origin)
            .await;
        *self.state.write().await = outcome.state();

        if let ActivationOutcome::Active(_) = outcome {
            if let Err(e) = self.clients.claim().await {
                warn!(error = %e, "Failed to claim clients");
            }
        }
        EventOutcome::Activated(outcome)
    }

    async fn on_fetch(&self, request: &Request) -> CacheResult<EventOutcome> {
        let interceptor = Interceptor {
            storage: self.storage.as_ref(),
            regions: &self.regions,
            origin: &self.origin,
            manifest: self.deployment.resources(),
            fetcher: self.fetcher.as_ref(),
        };
        Ok(match interceptor.handle(request).await? {
            Some(intercepted) => EventOutcome::Responded(intercepted),
            None => EventOutcome::Declined,
        })
    }

    async fn on_message(&self, payload: &str) -> CacheResult<EventOutcome> {
        match Message::parse(payload) {
            Some(Message::SkipWaiting) => {
                self.signal_skip_waiting().await;
                Ok(EventOutcome::SkipWaiting)
            }
            Some(Message::DownloadOffline) => {
                let fetched = download_offline(
                    self.storage.as_ref(),
                    &self.regions,
                    &self.origin,
                    self.deployment.resources(),
                    self.fetcher.as_ref(),
                )
                .await?;
                Ok(EventOutcome::Prefetched(fetched))
            }
            None => {
                info!(payload, "Ignoring unrecognized message");
                Ok(EventOutcome::Ignored)
            }
        }
    }

    async fn signal_skip_waiting(&self) {
        if let Err(e) = self.clients.skip_waiting().await {
            warn!(error = %e, "Failed to skip waiting");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_parse() {
        assert_eq!(Message::parse("skipWaiting"), Some(Message::SkipWaiting));
        assert_eq!(Message::parse("downloadOffline"), Some(Message::DownloadOffline));
        assert_eq!(Message::parse("SkipWaiting"), None);
        assert_eq!(Message::parse(""), None);
        assert_eq!(Message::parse("refresh"), None);
    }
}
