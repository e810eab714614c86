use async_trait::async_trait;
use beacon::{
    AlertPresenter, AlertRequest, AuthorizationStatus, Beacon, BeaconDetection, BeaconError,
    BeaconManager, BeaconRegion, CatalogService, ErrorSink, Proximity, ProximityConfig,
    RegionSensingPort, RegionState, Result, SensingEvent, SensingEventBus, SensingObserver,
};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

struct QuietPort;

#[async_trait]
impl RegionSensingPort for QuietPort {
    async fn start_monitoring(&self, _region: &BeaconRegion) {}
    async fn stop_monitoring(&self, _region: &BeaconRegion) {}
    async fn start_ranging(&self, _region: &BeaconRegion) {}
    async fn stop_ranging(&self, _region: &BeaconRegion) {}
    async fn request_state(&self, _region: &BeaconRegion) {}
    async fn request_authorization(&self) {}
    async fn monitored_region_count(&self) -> usize {
        0
    }
}

struct StubCatalogService;

#[async_trait]
impl CatalogService for StubCatalogService {
    async fn is_token_valid(&self, _token: &str) -> bool {
        false
    }

    async fn get_token(&self) -> Result<String> {
        Ok("token".to_string())
    }

    async fn get_beacon_items(&self, _token: &str) -> Result<Vec<Beacon>> {
        Ok(vec![Beacon {
            name: "lobby".to_string(),
            region: BeaconRegion::new(Uuid::new_v4(), "lobby"),
            display_label: "Lobby".to_string(),
        }])
    }
}

struct CollectingPresenter {
    alerts: Mutex<Vec<AlertRequest>>,
}

impl AlertPresenter for CollectingPresenter {
    fn enqueue(&self, alert: AlertRequest) {
        self.alerts.lock().unwrap().push(alert);
    }
}

struct PanicOnErrorSink;

impl ErrorSink for PanicOnErrorSink {
    fn show_error(&self, error: &BeaconError) {
        panic!("unexpected error surfaced: {}", error);
    }
}

const TARGET: &str = "hitec-beacons";

async fn harness() -> (Arc<BeaconManager>, SensingEventBus, Arc<CollectingPresenter>) {
    let presenter = Arc::new(CollectingPresenter {
        alerts: Mutex::new(Vec::new()),
    });
    let manager = Arc::new(BeaconManager::new(
        ProximityConfig::new(BeaconRegion::new(Uuid::new_v4(), TARGET)),
        Arc::new(QuietPort),
        Arc::new(StubCatalogService),
        Arc::clone(&presenter) as Arc<dyn AlertPresenter>,
        Arc::new(PanicOnErrorSink),
    ));
    let bus = SensingEventBus::new();
    bus.subscribe(Arc::clone(&manager) as Arc<dyn SensingObserver>)
        .await;
    (manager, bus, presenter)
}

fn inside() -> SensingEvent {
    SensingEvent::StateDetermined {
        region_identifier: TARGET.to_string(),
        state: RegionState::Inside,
    }
}

fn outside() -> SensingEvent {
    SensingEvent::StateDetermined {
        region_identifier: TARGET.to_string(),
        state: RegionState::Outside,
    }
}

fn measurement(detections: Vec<BeaconDetection>) -> SensingEvent {
    SensingEvent::RangingMeasurement {
        region_identifier: TARGET.to_string(),
        detections,
    }
}

fn near_beacon() -> BeaconDetection {
    BeaconDetection {
        proximity: Proximity::Near,
        rssi: Some(-61),
        accuracy_m: Some(1.2),
    }
}

#[tokio::test]
async fn test_one_alert_per_session_across_sessions() {
    let (manager, bus, presenter) = harness().await;
    manager.start_ranging_beacons().await.unwrap();

    // First session: two detections, one alert
    bus.dispatch(inside()).await;
    bus.dispatch(measurement(vec![near_beacon()])).await;
    bus.dispatch(measurement(vec![near_beacon()])).await;
    bus.dispatch(outside()).await;

    // Second session: one detection, one more alert
    bus.dispatch(inside()).await;
    bus.dispatch(measurement(vec![near_beacon()])).await;

    assert_eq!(presenter.alerts.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_empty_measurement_does_not_alert_or_end_session() {
    let (manager, bus, presenter) = harness().await;
    manager.start_ranging_beacons().await.unwrap();

    bus.dispatch(inside()).await;
    bus.dispatch(measurement(Vec::new())).await;
    assert!(presenter.alerts.lock().unwrap().is_empty());
    assert!(manager.is_ranging_active().await, "momentary absence is not a session end");

    bus.dispatch(measurement(vec![near_beacon()])).await;
    assert_eq!(presenter.alerts.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_measurements_for_foreign_regions_never_alert() {
    let (manager, bus, presenter) = harness().await;
    manager.start_ranging_beacons().await.unwrap();
    bus.dispatch(inside()).await;

    bus.dispatch(SensingEvent::RangingMeasurement {
        region_identifier: "marketing-geofence".to_string(),
        detections: vec![near_beacon()],
    })
    .await;

    assert!(presenter.alerts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_stop_ends_session_and_new_session_rearms() {
    let (manager, bus, presenter) = harness().await;
    manager.start_ranging_beacons().await.unwrap();

    bus.dispatch(inside()).await;
    bus.dispatch(measurement(vec![near_beacon()])).await;
    manager.stop_ranging_beacons().await;

    manager.start_ranging_beacons().await.unwrap();
    bus.dispatch(inside()).await;
    bus.dispatch(measurement(vec![near_beacon()])).await;

    assert_eq!(presenter.alerts.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_authorization_completion_fires_once_on_definitive_status() {
    let (manager, bus, _presenter) = harness().await;

    let outcomes: Arc<Mutex<Vec<AuthorizationStatus>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&outcomes);
    manager
        .request_authorization(Box::new(move |status| {
            sink.lock().unwrap().push(status);
        }))
        .await;

    assert_eq!(
        manager.current_authorization_status().await,
        AuthorizationStatus::NotDetermined
    );

    // Transient status must not fire the completion
    bus.dispatch(SensingEvent::AuthorizationChanged {
        status: AuthorizationStatus::NotDetermined,
    })
    .await;
    assert!(outcomes.lock().unwrap().is_empty());

    bus.dispatch(SensingEvent::AuthorizationChanged {
        status: AuthorizationStatus::AuthorizedAlways,
    })
    .await;
    bus.dispatch(SensingEvent::AuthorizationChanged {
        status: AuthorizationStatus::Denied,
    })
    .await;

    assert_eq!(
        *outcomes.lock().unwrap(),
        vec![AuthorizationStatus::AuthorizedAlways],
        "completion fires exactly once"
    );
    assert_eq!(
        manager.current_authorization_status().await,
        AuthorizationStatus::Denied
    );
}
