//! Connectivity-driven thread counts

use contracts::{CellularGeneration, ConnectionType, NetworkInfo, PoolConfig};

/// Target thread count for the given connectivity.
///
/// No snapshot or a link that is neither connected nor connecting maps to
/// `offline_threads`.
pub fn thread_count_for(config: &PoolConfig, info: Option<&NetworkInfo>) -> usize {
    let Some(info) = info.filter(|i| i.is_connected_or_connecting()) else {
        return config.offline_threads;
    };

    match info.connection {
        ConnectionType::Wifi | ConnectionType::Wimax | ConnectionType::Ethernet => {
            config.unmetered_threads
        }
        ConnectionType::Cellular(generation) => match generation {
            CellularGeneration::G4 | CellularGeneration::G5 => config.cellular_fast_threads,
            CellularGeneration::G3 => config.cellular_moderate_threads,
            CellularGeneration::G2 => config.cellular_slow_threads,
            CellularGeneration::Unknown => config.default_threads,
        },
        ConnectionType::Other => config.default_threads,
    }
}
