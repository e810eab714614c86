// Region sensing abstraction - the OS capability that monitors a beacon
// region and reports containment state and ranging measurements

use crate::{AuthorizationStatus, BeaconDetection, BeaconRegion, RegionState};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Command surface of the host region-sensing capability.
///
/// Commands are fire-and-forget; outcomes arrive asynchronously as
/// [`SensingEvent`]s through the event bus.
#[async_trait]
pub trait RegionSensingPort: Send + Sync {
    /// Register the region for low-power containment monitoring
    async fn start_monitoring(&self, region: &BeaconRegion);

    /// Deregister the region from containment monitoring
    async fn stop_monitoring(&self, region: &BeaconRegion);

    /// Begin active proximity measurement within the region
    async fn start_ranging(&self, region: &BeaconRegion);

    /// Stop active proximity measurement
    async fn stop_ranging(&self, region: &BeaconRegion);

    /// Ask for an immediate containment state determination.
    /// The answer comes back as a `StateDetermined` event.
    async fn request_state(&self, region: &BeaconRegion);

    /// Prompt the host for location authorization.
    /// The outcome comes back as an `AuthorizationChanged` event.
    async fn request_authorization(&self);

    /// Number of regions currently registered with the sensing service
    async fn monitored_region_count(&self) -> usize;
}

/// Everything the sensing subsystem can tell us, as one tagged event
/// consumed by a single dispatch path.
#[derive(Debug, Clone)]
pub enum SensingEvent {
    /// Containment state determined, from an explicit query or an
    /// unsolicited update
    StateDetermined {
        region_identifier: String,
        state: RegionState,
    },
    /// Explicit exit callback; the platform delivers this on a separate
    /// channel from state-query results
    RegionExited { region_identifier: String },
    /// A ranging pass completed. An empty detection list means no
    /// matching beacon is currently received.
    RangingMeasurement {
        region_identifier: String,
        detections: Vec<BeaconDetection>,
    },
    /// Ranging failed for the region
    RangingError {
        region_identifier: String,
        message: String,
    },
    /// Host authorization status changed
    AuthorizationChanged { status: AuthorizationStatus },
}

/// Observer notified for every sensing event
#[async_trait]
pub trait SensingObserver: Send + Sync {
    async fn on_sensing_event(&self, event: SensingEvent);
}

/// Handle returned by [`SensingEventBus::subscribe`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Fan-out point between the sensing backend and its consumers.
///
/// Observers are notified sequentially in registration order on the
/// dispatching task, so transitions driven by one event complete before
/// the next observer sees it.
pub struct SensingEventBus {
    observers: RwLock<Vec<(ObserverId, Arc<dyn SensingObserver>)>>,
    next_id: AtomicU64,
}

impl SensingEventBus {
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Register an observer; returns a handle for later removal
    pub async fn subscribe(&self, observer: Arc<dyn SensingObserver>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.write().await.push((id, observer));
        debug!(observer_id = id.0, "sensing observer subscribed");
        id
    }

    /// Remove a previously registered observer. Unknown handles are ignored.
    pub async fn unsubscribe(&self, id: ObserverId) {
        self.observers.write().await.retain(|(oid, _)| *oid != id);
        debug!(observer_id = id.0, "sensing observer unsubscribed");
    }

    /// Deliver an event to every observer in registration order
    pub async fn dispatch(&self, event: SensingEvent) {
        let observers: Vec<Arc<dyn SensingObserver>> = {
            let guard = self.observers.read().await;
            guard.iter().map(|(_, obs)| Arc::clone(obs)).collect()
        };
        for observer in observers {
            observer.on_sensing_event(event.clone()).await;
        }
    }

    pub async fn observer_count(&self) -> usize {
        self.observers.read().await.len()
    }
}

impl Default for SensingEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingObserver {
        label: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl SensingObserver for RecordingObserver {
        async fn on_sensing_event(&self, _event: SensingEvent) {
            self.log.lock().unwrap().push(self.label);
        }
    }

    fn exit_event() -> SensingEvent {
        SensingEvent::RegionExited {
            region_identifier: "test-region".to_string(),
        }
    }

    #[tokio::test]
    async fn test_dispatch_in_registration_order() {
        let bus = SensingEventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe(Arc::new(RecordingObserver {
            label: "first",
            log: Arc::clone(&log),
        }))
        .await;
        bus.subscribe(Arc::new(RecordingObserver {
            label: "second",
            log: Arc::clone(&log),
        }))
        .await;

        bus.dispatch(exit_event()).await;

        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let bus = SensingEventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let id = bus
            .subscribe(Arc::new(RecordingObserver {
                label: "observer",
                log: Arc::clone(&log),
            }))
            .await;

        bus.dispatch(exit_event()).await;
        bus.unsubscribe(id).await;
        bus.dispatch(exit_event()).await;

        assert_eq!(log.lock().unwrap().len(), 1);
        assert_eq!(bus.observer_count().await, 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_unknown_handle_is_noop() {
        let bus = SensingEventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe(Arc::new(RecordingObserver {
            label: "observer",
            log: Arc::clone(&log),
        }))
        .await;
        let stale = ObserverId(999);
        bus.unsubscribe(stale).await;

        assert_eq!(bus.observer_count().await, 1);
    }
}
