// Alert Gate - idempotence layer guaranteeing at most one user alert
// per continuous in-range session

use crate::BeaconDetection;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// A request to show a user-visible alert for a detected beacon
#[derive(Debug, Clone)]
pub struct AlertRequest {
    pub region_identifier: String,
    pub detection: BeaconDetection,
    pub requested_at: DateTime<Utc>,
}

/// Serializes and displays user alerts on its own schedule.
/// Enqueueing is fire-and-forget; the core never waits on dismissal.
pub trait AlertPresenter: Send + Sync {
    fn enqueue(&self, alert: AlertRequest);
}

struct GateState {
    armed: bool,
    nearest: Option<BeaconDetection>,
}

/// Arms on session start, produces at most one alert request, and stays
/// disarmed until the next session begins.
pub struct AlertGate {
    state: Mutex<GateState>,
}

impl AlertGate {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState {
                armed: false,
                nearest: None,
            }),
        }
    }

    pub async fn on_session_started(&self) {
        let mut state = self.state.lock().await;
        state.armed = true;
        debug!("alert gate armed for new session");
    }

    pub async fn on_session_ended(&self) {
        let mut state = self.state.lock().await;
        state.armed = false;
        state.nearest = None;
        debug!("alert gate disarmed, session ended");
    }

    /// Evaluate a ranging measurement.
    ///
    /// An empty measurement is transient loss within a continuing
    /// session: it never alerts and never disarms. A non-empty
    /// measurement alerts once per session, then disarms the gate.
    pub async fn consider(
        &self,
        region_identifier: &str,
        detections: &[BeaconDetection],
    ) -> Option<AlertRequest> {
        let mut state = self.state.lock().await;

        let nearest = detections
            .iter()
            .max_by_key(|detection| detection.proximity)
            .cloned()?;
        state.nearest = Some(nearest.clone());

        if !state.armed {
            return None;
        }
        state.armed = false;

        info!(
            region = region_identifier,
            proximity = %nearest.proximity,
            "beacon detected, raising alert"
        );
        Some(AlertRequest {
            region_identifier: region_identifier.to_string(),
            detection: nearest,
            requested_at: Utc::now(),
        })
    }

    /// Most recently detected beacon in the current session, if any
    pub async fn nearest_beacon(&self) -> Option<BeaconDetection> {
        self.state.lock().await.nearest.clone()
    }
}

impl Default for AlertGate {
    fn default() -> Self {
        Self::new()
    }
}
