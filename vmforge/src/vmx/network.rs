//! Network connection classification for the descriptor.

use crate::driver::NetworkMapper;

/// Custom connection type: the device field names the network directly.
pub const CUSTOM_CONNECTION: &str = "custom";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSelection {
    /// `ethernet0.connectionType`
    pub connection_type: String,
    /// `ethernet0.vnet`; empty lets the hypervisor pick among matching devices.
    pub device: String,
    /// Name used later to discover the guest's address.
    pub logical_name: String,
}

/// Classify `network` using the driver's name-to-device mapping if it has one.
///
/// A name that maps to at least one device is used as the connection type
/// with no explicit device. Anything else becomes a custom connection bound
/// to the name verbatim.
pub fn resolve_network(network: &str, mapper: Option<&dyn NetworkMapper>) -> NetworkSelection {
    let resolved = match mapper {
        Some(mapper) => match mapper.name_into_devices(network) {
            Ok(devices) if !devices.is_empty() => {
                tracing::debug!(network, ?devices, "Network name resolved to devices");
                true
            }
            Ok(_) => {
                tracing::debug!(network, "Network name maps to no devices");
                false
            }
            Err(e) => {
                tracing::debug!(network, error = %e, "Network name lookup failed");
                false
            }
        },
        None => false,
    };

    if resolved {
        NetworkSelection {
            connection_type: network.to_string(),
            device: String::new(),
            logical_name: network.to_string(),
        }
    } else {
        NetworkSelection {
            connection_type: CUSTOM_CONNECTION.to_string(),
            device: network.to_string(),
            logical_name: network.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmforge_shared::errors::{VmforgeError, VmforgeResult};

    struct Mapper(Option<Vec<String>>);

    impl NetworkMapper for Mapper {
        fn name_into_devices(&self, _name: &str) -> VmforgeResult<Vec<String>> {
            self.0
                .clone()
                .ok_or_else(|| VmforgeError::Network("netmap.conf missing".into()))
        }
    }

    #[test]
    fn test_resolved_name_leaves_device_blank() {
        let mapper = Mapper(Some(vec!["vmnet8".into()]));
        let sel = resolve_network("nat", Some(&mapper));
        assert_eq!(sel.connection_type, "nat");
        assert_eq!(sel.device, "");
        assert_eq!(sel.logical_name, "nat");
    }

    #[test]
    fn test_lookup_failure_is_custom() {
        let mapper = Mapper(None);
        let sel = resolve_network("vmnet3", Some(&mapper));
        assert_eq!(sel.connection_type, CUSTOM_CONNECTION);
        assert_eq!(sel.device, "vmnet3");
    }

    #[test]
    fn test_empty_mapping_is_custom() {
        let mapper = Mapper(Some(Vec::new()));
        let sel = resolve_network("hostonly", Some(&mapper));
        assert_eq!(sel.connection_type, CUSTOM_CONNECTION);
        assert_eq!(sel.device, "hostonly");
    }

    #[test]
    fn test_no_mapper_is_custom() {
        let sel = resolve_network("bridged", None);
        assert_eq!(sel.connection_type, CUSTOM_CONNECTION);
        assert_eq!(sel.device, "bridged");
        assert_eq!(sel.logical_name, "bridged");
    }
}
