//! Allocates IPv4 addresses on the private bridge network.
//!
//! Stateless by design (`spec.md` §4.1): instead of tracking a bitmap in
//! memory, every `allocate` call asks the container runtime which IPs are
//! currently live on the bridge and picks the lowest free address in the
//! configured sub-range. A mutex still serializes allocation so two
//! concurrent creates can't observe the same "free" address and race.

use tokio::sync::Mutex;

use crate::container_runtime::ContainerRuntime;
use crate::error::EngineError;

pub struct IpPool {
    /// First three octets of the subnet, e.g. `10.100.0` for `10.100.0.0/16`.
    prefix: String,
    range_start: u8,
    range_end: u8,
    network_name: String,
    lock: Mutex<()>,
}

impl IpPool {
    pub fn new(subnet_cidr: &str, range_start: u8, range_end: u8, network_name: String) -> Self {
        let prefix = subnet_prefix(subnet_cidr);
        Self {
            prefix,
            range_start,
            range_end,
            network_name,
            lock: Mutex::new(()),
        }
    }

    pub async fn allocate(&self, runtime: &dyn ContainerRuntime) -> Result<String, EngineError> {
        let _guard = self.lock.lock().await;
        let live = runtime
            .list_network_ips(&self.network_name)
            .await
            .map_err(EngineError::RuntimeFault)?;

        for octet in self.range_start..=self.range_end {
            let candidate = format!("{}.{}", self.prefix, octet);
            if !live.iter().any(|ip| ip == &candidate) {
                return Ok(candidate);
            }
        }
        Err(EngineError::IpExhausted)
    }

    /// The runtime reclaims the address when the container is destroyed;
    /// nothing to do here.
    pub fn release(&self, _ip: &str) {}
}

fn subnet_prefix(cidr: &str) -> String {
    let without_mask = cidr.split('/').next().unwrap_or(cidr);
    let octets: Vec<&str> = without_mask.split('.').collect();
    octets.get(..3).map(|o| o.join(".")).unwrap_or_else(|| without_mask.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_strips_mask_and_last_octet() {
        assert_eq!(subnet_prefix("10.100.0.0/16"), "10.100.0");
    }

    #[tokio::test]
    async fn allocate_skips_live_addresses() {
        use crate::container_runtime::FakeContainerRuntime;

        let fake = FakeContainerRuntime::new();
        fake.seed_network_ip("sandman_worknet", "10.100.0.100");
        let pool = IpPool::new("10.100.0.0/16", 100, 102, "sandman_worknet".to_string());

        let ip = pool.allocate(&fake).await.unwrap();
        assert_eq!(ip, "10.100.0.101");
    }

    #[tokio::test]
    async fn allocate_exhausted_when_range_full() {
        use crate::container_runtime::FakeContainerRuntime;

        let fake = FakeContainerRuntime::new();
        fake.seed_network_ip("sandman_worknet", "10.100.0.100");
        let pool = IpPool::new("10.100.0.0/16", 100, 100, "sandman_worknet".to_string());

        let err = pool.allocate(&fake).await.unwrap_err();
        assert!(matches!(err, EngineError::IpExhausted));
    }
}
