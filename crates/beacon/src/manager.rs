// Beacon Manager - wires sensing events to the state machine and alert
// gate, and exposes the public start/stop API to the hosting application

use crate::{
    AlertGate, AlertPresenter, AuthorizationStatus, Beacon, BeaconCatalog, BeaconError,
    CatalogService, ErrorSink, ProximityConfig, ProximitySessionStateMachine,
    RegionSensingPort, Result, SensingEvent, SensingObserver, SessionEvent,
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// Invoked exactly once, when the host reports a definitive
/// authorization outcome
pub type AuthorizationCompletion = Box<dyn FnOnce(AuthorizationStatus) + Send + 'static>;

/// Single owner of the proximity core for the process.
///
/// Constructed once by the hosting application with its collaborators
/// injected; there is no ambient shared instance.
pub struct BeaconManager {
    config: ProximityConfig,
    sensing: Arc<dyn RegionSensingPort>,
    catalog: BeaconCatalog,
    state_machine: ProximitySessionStateMachine,
    alert_gate: AlertGate,
    presenter: Arc<dyn AlertPresenter>,
    errors: Arc<dyn ErrorSink>,
    authorization: RwLock<AuthorizationStatus>,
    authorization_completion: Mutex<Option<AuthorizationCompletion>>,
}

impl BeaconManager {
    pub fn new(
        config: ProximityConfig,
        sensing: Arc<dyn RegionSensingPort>,
        catalog_service: Arc<dyn CatalogService>,
        presenter: Arc<dyn AlertPresenter>,
        errors: Arc<dyn ErrorSink>,
    ) -> Self {
        let state_machine = ProximitySessionStateMachine::new(
            Arc::clone(&sensing),
            config.region.clone(),
            config.max_monitored_regions,
            config.unknown_state_retry_delay,
        );
        Self {
            config,
            sensing,
            catalog: BeaconCatalog::new(catalog_service),
            state_machine,
            alert_gate: AlertGate::new(),
            presenter,
            errors,
            authorization: RwLock::new(AuthorizationStatus::NotDetermined),
            authorization_completion: Mutex::new(None),
        }
    }

    /// Load the beacon catalog if needed, then begin monitoring the
    /// target region.
    ///
    /// Every failure is forwarded once to the error sink and returned;
    /// ranging is not started and the caller may retry.
    pub async fn start_ranging_beacons(&self) -> Result<()> {
        info!("start ranging beacons requested");

        if !self.catalog.is_loaded().await {
            let token = match self.catalog.ensure_token().await {
                Ok(token) => token,
                Err(err) => return Err(self.report(err)),
            };
            if let Err(err) = self.catalog.refresh(&token).await {
                return Err(self.report(err));
            }
        }

        self.state_machine.start().await.map_err(|err| self.report(err))
    }

    /// Stop monitoring and ranging. Always succeeds; safe to call when
    /// nothing is running.
    pub async fn stop_ranging_beacons(&self) {
        info!("stop ranging beacons requested");
        if let Some(SessionEvent::Ended) = self.state_machine.stop().await {
            self.alert_gate.on_session_ended().await;
        }
    }

    /// Forward an authorization request to the sensing port. The
    /// completion fires once, on the first definitive status change.
    pub async fn request_authorization(&self, completion: AuthorizationCompletion) {
        *self.authorization_completion.lock().await = Some(completion);
        self.sensing.request_authorization().await;
    }

    pub async fn is_ranging_active(&self) -> bool {
        self.state_machine.is_ranging().await
    }

    pub async fn current_authorization_status(&self) -> AuthorizationStatus {
        *self.authorization.read().await
    }

    /// Catalog snapshot for display, sorted by beacon name
    pub async fn beacons(&self) -> Vec<Beacon> {
        self.catalog.beacons().await
    }

    fn is_target(&self, region_identifier: &str) -> bool {
        region_identifier == self.config.region.identifier
    }

    fn report(&self, err: BeaconError) -> BeaconError {
        self.errors.show_error(&err);
        err
    }

    async fn route_session_event(&self, event: Option<SessionEvent>) {
        match event {
            Some(SessionEvent::Started) => self.alert_gate.on_session_started().await,
            Some(SessionEvent::Ended) => self.alert_gate.on_session_ended().await,
            None => {}
        }
    }
}

#[async_trait]
impl SensingObserver for BeaconManager {
    async fn on_sensing_event(&self, event: SensingEvent) {
        match event {
            SensingEvent::StateDetermined {
                region_identifier,
                state,
            } => {
                if !self.is_target(&region_identifier) {
                    debug!(region = %region_identifier, "state callback for an unrelated region");
                    return;
                }
                let session_event = self.state_machine.on_region_state(state).await;
                self.route_session_event(session_event).await;
            }
            SensingEvent::RegionExited { region_identifier } => {
                let session_event = self.state_machine.on_region_exited(&region_identifier).await;
                self.route_session_event(session_event).await;
            }
            SensingEvent::RangingMeasurement {
                region_identifier,
                detections,
            } => {
                if !self.is_target(&region_identifier) {
                    return;
                }
                if let Some(alert) = self.alert_gate.consider(&region_identifier, &detections).await
                {
                    self.presenter.enqueue(alert);
                }
            }
            SensingEvent::RangingError {
                region_identifier,
                message,
            } => {
                self.state_machine
                    .on_ranging_error(&region_identifier, &message)
                    .await;
                self.errors.show_error(&BeaconError::Ranging {
                    region_identifier,
                    message,
                });
            }
            SensingEvent::AuthorizationChanged { status } => {
                info!(status = ?status, "authorization status changed");
                *self.authorization.write().await = status;
                if status.is_definitive() {
                    if let Some(completion) = self.authorization_completion.lock().await.take() {
                        completion(status);
                    }
                }
            }
        }
    }
}
