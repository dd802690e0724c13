//! Connectivity snapshot delivered by the connectivity monitor

use serde::{Deserialize, Serialize};

/// Mobile network generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellularGeneration {
    /// GPRS / EDGE
    G2,
    /// UMTS / CDMA / EVDO
    G3,
    /// LTE / HSPA+ / eHRPD
    G4,
    G5,
    Unknown,
}

/// Link type of the active network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    Wifi,
    Wimax,
    Ethernet,
    Cellular(CellularGeneration),
    Other,
}

impl ConnectionType {
    /// Whether traffic on this link is typically unmetered
    pub fn is_unmetered(self) -> bool {
        matches!(self, Self::Wifi | Self::Wimax | Self::Ethernet)
    }
}

/// Link state of the active network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkState {
    Connected,
    Connecting,
    Disconnected,
}

/// Active network description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub connection: ConnectionType,
    pub state: NetworkState,
}

impl NetworkInfo {
    pub fn new(connection: ConnectionType, state: NetworkState) -> Self {
        Self { connection, state }
    }

    /// Connected Wi-Fi
    pub fn wifi() -> Self {
        Self::new(ConnectionType::Wifi, NetworkState::Connected)
    }

    /// Connected cellular link of the given generation
    pub fn cellular(generation: CellularGeneration) -> Self {
        Self::new(ConnectionType::Cellular(generation), NetworkState::Connected)
    }

    /// Known network that is currently down
    pub fn disconnected() -> Self {
        Self::new(ConnectionType::Other, NetworkState::Disconnected)
    }

    pub fn is_connected(&self) -> bool {
        self.state == NetworkState::Connected
    }

    pub fn is_connected_or_connecting(&self) -> bool {
        matches!(self.state, NetworkState::Connected | NetworkState::Connecting)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_predicates() {
        assert!(NetworkInfo::wifi().is_connected());

        let connecting = NetworkInfo::new(ConnectionType::Wifi, NetworkState::Connecting);
        assert!(!connecting.is_connected());
        assert!(connecting.is_connected_or_connecting());

        assert!(!NetworkInfo::disconnected().is_connected_or_connecting());
    }

    #[test]
    fn test_unmetered_links() {
        assert!(ConnectionType::Wifi.is_unmetered());
        assert!(ConnectionType::Ethernet.is_unmetered());
        assert!(!ConnectionType::Cellular(CellularGeneration::G4).is_unmetered());
    }
}
