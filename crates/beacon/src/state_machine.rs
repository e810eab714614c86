// Proximity session state machine - owns the "should I be ranging"
// decision for the single target region.
//
// All transitions go through one mutex so region-state callbacks, exit
// callbacks, and the unknown-state retry cannot interleave. An epoch
// counter advances on every start()/stop(); any deferred retry whose
// captured epoch no longer matches is a no-op.

use crate::{
    BeaconError, BeaconRegion, RangingSession, RegionSensingPort, RegionState, Result,
    SessionEvent,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Lifecycle phase of the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachinePhase {
    Idle,
    Monitoring,
    Ranging,
}

struct MachineState {
    phase: MachinePhase,
    region_state: RegionState,
    epoch: u64,
    session: Option<RangingSession>,
    retry_task: Option<tokio::task::JoinHandle<()>>,
}

pub struct ProximitySessionStateMachine {
    sensing: Arc<dyn RegionSensingPort>,
    region: BeaconRegion,
    max_monitored_regions: usize,
    unknown_state_retry_delay: Duration,
    state: Arc<Mutex<MachineState>>,
}

impl ProximitySessionStateMachine {
    pub fn new(
        sensing: Arc<dyn RegionSensingPort>,
        region: BeaconRegion,
        max_monitored_regions: usize,
        unknown_state_retry_delay: Duration,
    ) -> Self {
        Self {
            sensing,
            region,
            max_monitored_regions,
            unknown_state_retry_delay,
            state: Arc::new(Mutex::new(MachineState {
                phase: MachinePhase::Idle,
                region_state: RegionState::Unknown,
                epoch: 0,
                session: None,
                retry_task: None,
            })),
        }
    }

    /// Register the target region for monitoring and query its state.
    ///
    /// Fails without registering anything when the sensing service is
    /// already at its monitored-region ceiling (one slot stays reserved
    /// for system use).
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.lock().await;

        if state.phase != MachinePhase::Idle {
            debug!("start requested while already monitoring");
            return Ok(());
        }

        let monitored = self.sensing.monitored_region_count().await;
        if monitored >= self.max_monitored_regions - 1 {
            warn!(
                monitored,
                limit = self.max_monitored_regions,
                "monitored region ceiling reached, refusing to register"
            );
            return Err(BeaconError::TooManyMonitoredRegions {
                limit: self.max_monitored_regions,
            });
        }

        state.epoch += 1;
        state.phase = MachinePhase::Monitoring;
        state.region_state = RegionState::Unknown;

        self.sensing.start_monitoring(&self.region).await;
        self.sensing.request_state(&self.region).await;

        info!(region = %self.region.identifier, "started monitoring beacon region");
        Ok(())
    }

    /// Deregister ranging and monitoring and return to Idle.
    ///
    /// Idempotent; also cancels any pending unknown-state retry. Returns
    /// `Ended` when an open session was closed so the caller can disarm
    /// its alert gate.
    pub async fn stop(&self) -> Option<SessionEvent> {
        let mut state = self.state.lock().await;

        state.epoch += 1;
        if let Some(task) = state.retry_task.take() {
            task.abort();
        }

        let closing = state.session.take().map(|session| {
            info!(session_id = %session.session_id, "closing ranging session on stop");
            SessionEvent::Ended
        });

        if state.phase == MachinePhase::Idle {
            debug!("stop on an idle machine");
        } else {
            info!(region = %self.region.identifier, "stopped monitoring beacon region");
        }
        state.phase = MachinePhase::Idle;
        state.region_state = RegionState::Unknown;

        self.sensing.stop_ranging(&self.region).await;
        self.sensing.stop_monitoring(&self.region).await;

        closing
    }

    /// Core transition: a containment state was determined for the
    /// target region, either from an explicit query or an unsolicited
    /// update.
    pub async fn on_region_state(&self, region_state: RegionState) -> Option<SessionEvent> {
        let mut state = self.state.lock().await;

        if state.phase == MachinePhase::Idle {
            debug!(state = %region_state, "ignoring region state while idle");
            return None;
        }

        match region_state {
            RegionState::Inside => {
                state.region_state = RegionState::Inside;
                if state.phase != MachinePhase::Ranging {
                    let session = RangingSession::new(&self.region.identifier, state.epoch);
                    info!(
                        session_id = %session.session_id,
                        "inside beacon region, starting ranging"
                    );
                    state.session = Some(session);
                    state.phase = MachinePhase::Ranging;
                    self.sensing.start_ranging(&self.region).await;
                    return Some(SessionEvent::Started);
                }
                None
            }
            RegionState::Outside => {
                state.region_state = RegionState::Outside;
                if state.phase == MachinePhase::Ranging {
                    info!("outside beacon region, stopping ranging");
                    state.phase = MachinePhase::Monitoring;
                    state.session = None;
                    self.sensing.stop_ranging(&self.region).await;
                    return Some(SessionEvent::Ended);
                }
                None
            }
            RegionState::Unknown => {
                // Transient sensor ambiguity: re-query after a delay
                // instead of flapping ranging on or off.
                self.schedule_state_retry(&mut state);
                None
            }
        }
    }

    /// Explicit exit callback from the sensing port. Exits for other
    /// regions are ignored.
    pub async fn on_region_exited(&self, region_identifier: &str) -> Option<SessionEvent> {
        if region_identifier != self.region.identifier {
            debug!(region = region_identifier, "exit callback for an unrelated region");
            return None;
        }
        self.on_region_state(RegionState::Outside).await
    }

    /// Ranging failure. Measurement failure is distinct from absence,
    /// so the session and ranging status are left untouched.
    pub async fn on_ranging_error(&self, region_identifier: &str, message: &str) {
        warn!(
            region = region_identifier,
            error = message,
            "beacon ranging failed"
        );
    }

    pub async fn is_ranging(&self) -> bool {
        self.state.lock().await.phase == MachinePhase::Ranging
    }

    pub async fn phase(&self) -> MachinePhase {
        self.state.lock().await.phase
    }

    pub async fn region_state(&self) -> RegionState {
        self.state.lock().await.region_state
    }

    pub async fn current_session(&self) -> Option<RangingSession> {
        self.state.lock().await.session.clone()
    }

    fn schedule_state_retry(&self, state: &mut MachineState) {
        let captured_epoch = state.epoch;
        let delay = self.unknown_state_retry_delay;
        let sensing = Arc::clone(&self.sensing);
        let region = self.region.clone();
        let shared = Arc::clone(&self.state);

        debug!(
            delay_ms = delay.as_millis() as u64,
            "region state unknown, scheduling re-query"
        );

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let guard = shared.lock().await;
            if guard.epoch != captured_epoch {
                debug!("discarding stale region state re-query");
                return;
            }
            sensing.request_state(&region).await;
        });

        if let Some(previous) = state.retry_task.replace(task) {
            // A newer Unknown supersedes the pending re-query
            previous.abort();
        }
    }
}
