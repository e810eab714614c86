pub mod alert;
pub mod catalog;
pub mod error;
pub mod manager;
pub mod sensing;
pub mod state_machine;
pub mod types;

pub use alert::{AlertGate, AlertPresenter, AlertRequest};
pub use catalog::{BeaconCatalog, CatalogService};
pub use error::{BeaconError, ErrorSink, Result};
pub use manager::{AuthorizationCompletion, BeaconManager};
pub use sensing::{ObserverId, RegionSensingPort, SensingEvent, SensingEventBus, SensingObserver};
pub use state_machine::{MachinePhase, ProximitySessionStateMachine};
pub use types::*;
