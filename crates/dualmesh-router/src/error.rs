//! Error types for reply routing

use dualmesh_core::NetworkSource;
use dualmesh_link::ConnectionState;
use thiserror::Error;

/// Why a reply could not be routed
///
/// Surfaced to the command layer so it can tell the user instead of
/// failing silently.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    /// The link for the sender's network is not connected
    #[error("Network {network} unavailable (link is {state})")]
    NetworkUnavailable {
        /// Network the reply had to go out on
        network: NetworkSource,
        /// Link state at the time of the attempt
        state: ConnectionState,
    },

    /// No link is configured for the network
    #[error("No link configured for {0}")]
    NoLink(NetworkSource),

    /// Our own node id on the network is unknown, so echoes of the reply
    /// could not be recognized
    #[error("No own node id configured for {0}")]
    NoOwnId(NetworkSource),

    /// The link accepted the message but the write failed
    #[error("Send failed on {network}: {reason}")]
    SendFailed {
        /// Network the send was attempted on
        network: NetworkSource,
        /// Failure reason from the link
        reason: String,
    },
}

impl RoutingError {
    /// Get an error code for logging/metrics
    pub fn error_code(&self) -> &'static str {
        match self {
            RoutingError::NetworkUnavailable { .. } => "NETWORK_UNAVAILABLE",
            RoutingError::NoLink(_) => "NO_LINK",
            RoutingError::NoOwnId(_) => "NO_OWN_ID",
            RoutingError::SendFailed { .. } => "SEND_FAILED",
        }
    }

    /// Whether retrying later may succeed
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            RoutingError::NetworkUnavailable { .. } | RoutingError::SendFailed { .. }
        )
    }

    /// Network the failed reply was meant for
    pub fn network(&self) -> NetworkSource {
        match self {
            RoutingError::NetworkUnavailable { network, .. }
            | RoutingError::SendFailed { network, .. } => *network,
            RoutingError::NoLink(network) | RoutingError::NoOwnId(network) => *network,
        }
    }
}

/// Result type alias for routing operations
pub type Result<T> = std::result::Result<T, RoutingError>;
