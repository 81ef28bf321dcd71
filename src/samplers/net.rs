use anyhow::{anyhow, Result};
use sysinfo::Networks;

use super::TrafficSampler;

/// Reads cumulative rx/tx byte counters for one interface through sysinfo.
pub struct NetSampler {
    networks: Networks,
    interface: String,
}

impl NetSampler {
    pub fn new(interface: String) -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
            interface,
        }
    }

    /// Picks the non-loopback interface with the most accumulated traffic.
    /// Used when the user does not name an interface explicitly.
    pub fn busiest_interface() -> Option<String> {
        let networks = Networks::new_with_refreshed_list();
        networks
            .iter()
            .filter(|(name, _)| !name.starts_with("lo"))
            .max_by_key(|(_, data)| data.total_received() + data.total_transmitted())
            .map(|(name, _)| name.to_owned())
    }
}

impl TrafficSampler for NetSampler {
    fn counters(&mut self) -> Result<(u64, u64)> {
        self.networks.refresh(true);
        let (_, data) = self
            .networks
            .iter()
            .find(|(name, _)| *name == &self.interface)
            .ok_or_else(|| anyhow!("interface {:?} not found", self.interface))?;
        Ok((data.total_received(), data.total_transmitted()))
    }
}
