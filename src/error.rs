use thiserror::Error;
use uuid::Uuid;

use crate::types::RadioState;

/// Errors that can occur when discovering, connecting to, or reading a scale
#[derive(Error, Debug)]
pub enum ScaleError {
    /// Bluetooth Low Energy backend errors
    #[error("BLE error: {0}")]
    Ble(#[from] btleplug::Error),

    /// The radio can never become ready without external remediation
    #[error("Bluetooth radio unavailable: {state}")]
    RadioUnavailable {
        /// Radio state that prevented readiness
        state: RadioState,
    },

    /// Another discovery operation is already running on this manager
    #[error("A scale scan is already in progress")]
    ScanAlreadyInProgress,

    /// The scan ended without any scale being connected
    #[error("No scale found")]
    NoScaleFound,

    /// The operation was cancelled by the caller
    #[error("Operation cancelled")]
    Cancelled,

    /// Link establishment with a candidate peer failed
    #[error("Failed to connect to scale: {0}")]
    ConnectionFailed(String),

    /// Operation timeout
    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Scale disconnected
    #[error("Scale disconnected")]
    Disconnected,

    /// A required GATT characteristic is missing on the peer
    #[error("Characteristic {characteristic} of service {service} not found")]
    CharacteristicNotFound {
        /// Service the characteristic was expected in
        service: Uuid,
        /// Missing characteristic
        characteristic: Uuid,
    },

    /// The radio does not know the requested peer
    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    /// Health store errors
    #[error("Health store error: {0}")]
    HealthStore(String),

    /// Other errors
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for scale operations
pub type Result<T> = std::result::Result<T, ScaleError>;

impl ScaleError {
    /// Check if this error indicates a connection issue
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Ble(_)
                | Self::ConnectionFailed(_)
                | Self::Disconnected
                | Self::PeerNotFound(_)
                | Self::CharacteristicNotFound { .. }
        )
    }

    /// Check if this error is a discovery-level outcome the caller may retry
    #[must_use]
    pub const fn is_discovery_error(&self) -> bool {
        matches!(self, Self::ScanAlreadyInProgress | Self::NoScaleFound)
    }

    /// Check if this error is recoverable by simply retrying
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::ScanAlreadyInProgress
                | Self::NoScaleFound
                | Self::Cancelled
                | Self::ConnectionFailed(_)
        )
    }

    /// Check if this error needs the user to fix something (permission, hardware)
    #[must_use]
    pub const fn requires_remediation(&self) -> bool {
        matches!(self, Self::RadioUnavailable { .. })
    }
}
