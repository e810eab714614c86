// Beacon Catalog - cached token handling and the sorted list of known
// beacon identities, refreshed on demand from the catalog service

use crate::{Beacon, BeaconError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info, warn};

/// Remote service supplying the authentication token and beacon metadata
#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Check whether a previously issued token is still accepted
    async fn is_token_valid(&self, token: &str) -> bool;

    /// Request a fresh authentication token
    async fn get_token(&self) -> Result<String>;

    /// Fetch the raw beacon list
    async fn get_beacon_items(&self, token: &str) -> Result<Vec<Beacon>>;
}

type TokenOutcome = Option<Result<String>>;

/// In-memory catalog of known beacons, kept sorted by name.
///
/// The catalog is replaced wholesale on refresh; readers never observe a
/// partially updated list. Retry policy on fetch failure belongs to the
/// caller, not here.
pub struct BeaconCatalog {
    service: Arc<dyn CatalogService>,
    beacons: Arc<RwLock<Vec<Beacon>>>,
    cached_token: Arc<RwLock<Option<String>>>,
    // At most one token request in flight; later callers attach to it
    token_request: Arc<Mutex<Option<watch::Receiver<TokenOutcome>>>>,
}

impl BeaconCatalog {
    pub fn new(service: Arc<dyn CatalogService>) -> Self {
        Self {
            service,
            beacons: Arc::new(RwLock::new(Vec::new())),
            cached_token: Arc::new(RwLock::new(None)),
            token_request: Arc::new(Mutex::new(None)),
        }
    }

    /// Return a valid token, requesting a new one only when the cached
    /// token is missing or rejected by the service.
    ///
    /// Overlapping callers share a single underlying request and all
    /// observe the same outcome.
    pub async fn ensure_token(&self) -> Result<String> {
        if let Some(token) = self.cached_token.read().await.clone() {
            if self.service.is_token_valid(&token).await {
                debug!("cached token still valid");
                return Ok(token);
            }
            debug!("cached token rejected, requesting a new one");
        }

        let mut rx = {
            let mut pending = self.token_request.lock().await;
            if let Some(rx) = pending.as_ref() {
                debug!("token request already in flight, attaching");
                rx.clone()
            } else {
                let (tx, rx) = watch::channel(None);
                *pending = Some(rx.clone());

                let service = Arc::clone(&self.service);
                let cached = Arc::clone(&self.cached_token);
                let slot = Arc::clone(&self.token_request);
                tokio::spawn(async move {
                    let outcome = service.get_token().await;
                    match &outcome {
                        Ok(token) => {
                            *cached.write().await = Some(token.clone());
                            info!("authentication token acquired");
                        }
                        Err(err) => warn!(error = %err, "token request failed"),
                    }
                    slot.lock().await.take();
                    let _ = tx.send(Some(outcome));
                });
                rx
            }
        };

        loop {
            let outcome = rx.borrow().clone();
            if let Some(result) = outcome {
                return result;
            }
            if rx.changed().await.is_err() {
                return Err(BeaconError::Auth("token request was abandoned".to_string()));
            }
        }
    }

    /// Fetch the beacon list, sort it by name, and swap it in atomically
    pub async fn refresh(&self, token: &str) -> Result<Vec<Beacon>> {
        let mut items = self.service.get_beacon_items(token).await?;
        items.sort_by(|a, b| a.name.cmp(&b.name));

        info!(count = items.len(), "beacon catalog refreshed");
        *self.beacons.write().await = items.clone();
        Ok(items)
    }

    /// Current catalog snapshot
    pub async fn beacons(&self) -> Vec<Beacon> {
        self.beacons.read().await.clone()
    }

    /// Whether a refresh has populated the catalog
    pub async fn is_loaded(&self) -> bool {
        !self.beacons.read().await.is_empty()
    }
}
