use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum BeaconError {
    #[error("cannot monitor more than {limit} regions at a time")]
    TooManyMonitoredRegions { limit: usize },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Beacon catalog fetch failed: {0}")]
    Catalog(String),

    #[error("Ranging failed for region '{region_identifier}': {message}")]
    Ranging {
        region_identifier: String,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, BeaconError>;

impl BeaconError {
    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            BeaconError::TooManyMonitoredRegions { limit } => {
                format!(
                    "Beacon detection could not start because the device is already watching {} regions. Please stop another region watch and try again.",
                    limit
                )
            }
            BeaconError::Auth(reason) => {
                format!("Could not sign in to the beacon service: {}. Please try again.", reason)
            }
            BeaconError::Catalog(reason) => {
                format!("Could not load the beacon list: {}. Please check your connection and try again.", reason)
            }
            BeaconError::Ranging { message, .. } => {
                format!("Beacon detection hit a problem: {}. Detection will continue automatically.", message)
            }
        }
    }
}

/// Single reporting surface for errors leaving the core.
/// The hosting application decides how (and whether) to present them.
pub trait ErrorSink: Send + Sync {
    fn show_error(&self, error: &BeaconError);
}
