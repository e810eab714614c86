use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Default ceiling on concurrently monitored regions (platform limit)
pub const DEFAULT_MAX_MONITORED_REGIONS: usize = 20;

/// Default delay before re-querying an unknown region state
pub const DEFAULT_UNKNOWN_STATE_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Descriptor for a beacon-identified region the sensing service can watch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeaconRegion {
    pub proximity_uuid: Uuid,
    pub major: Option<u16>,
    pub minor: Option<u16>,
    /// Regions are matched by identifier when routing sensing callbacks
    pub identifier: String,
}

impl BeaconRegion {
    pub fn new(proximity_uuid: Uuid, identifier: impl Into<String>) -> Self {
        Self {
            proximity_uuid,
            major: None,
            minor: None,
            identifier: identifier.into(),
        }
    }

    pub fn with_major_minor(mut self, major: u16, minor: u16) -> Self {
        self.major = Some(major);
        self.minor = Some(minor);
        self
    }
}

/// A known beacon identity from the catalog. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Beacon {
    pub name: String,
    pub region: BeaconRegion,
    pub display_label: String,
}

/// Last known containment state for a monitored region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionState {
    Unknown,
    Inside,
    Outside,
}

impl std::fmt::Display for RegionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegionState::Unknown => write!(f, "Unknown"),
            RegionState::Inside => write!(f, "Inside"),
            RegionState::Outside => write!(f, "Outside"),
        }
    }
}

/// Coarse distance bucket attached to a detection.
///
/// Ordered from least to most certain proximity; consumed by the
/// presentation layer only. The core treats any non-empty measurement
/// as a detection regardless of tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Proximity {
    Unknown,
    Far,
    Near,
    Immediate,
}

impl std::fmt::Display for Proximity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Proximity::Unknown => write!(f, "Unknown"),
            Proximity::Far => write!(f, "Far"),
            Proximity::Near => write!(f, "Near"),
            Proximity::Immediate => write!(f, "Immediate"),
        }
    }
}

/// One ranged beacon within a measurement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeaconDetection {
    pub proximity: Proximity,
    pub rssi: Option<i16>,
    pub accuracy_m: Option<f64>,
}

/// Active ranging interval within the target region
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangingSession {
    pub session_id: Uuid,
    pub region_identifier: String,
    pub started_at: DateTime<Utc>,
    /// Machine epoch the session was opened under
    pub epoch: u64,
}

impl RangingSession {
    pub fn new(region_identifier: impl Into<String>, epoch: u64) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            region_identifier: region_identifier.into(),
            started_at: Utc::now(),
            epoch,
        }
    }
}

/// Host authorization for region sensing.
/// `NotDetermined` is the only transient value; completions waiting on
/// an authorization outcome fire on the first definitive status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorizationStatus {
    NotDetermined,
    Restricted,
    Denied,
    AuthorizedAlways,
    AuthorizedWhenInUse,
}

impl AuthorizationStatus {
    pub fn is_definitive(self) -> bool {
        self != AuthorizationStatus::NotDetermined
    }
}

/// Session boundary events emitted by the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Started,
    Ended,
}

/// Construction-time configuration for the proximity core
#[derive(Debug, Clone)]
pub struct ProximityConfig {
    /// The single target region to monitor and range
    pub region: BeaconRegion,
    /// Mirrors the platform ceiling; one slot stays reserved for system use
    pub max_monitored_regions: usize,
    /// Delay before re-querying after an Unknown state callback
    pub unknown_state_retry_delay: Duration,
}

impl ProximityConfig {
    pub fn new(region: BeaconRegion) -> Self {
        Self {
            region,
            max_monitored_regions: DEFAULT_MAX_MONITORED_REGIONS,
            unknown_state_retry_delay: DEFAULT_UNKNOWN_STATE_RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.unknown_state_retry_delay = delay;
        self
    }

    pub fn with_max_monitored_regions(mut self, max: usize) -> Self {
        self.max_monitored_regions = max;
        self
    }
}
