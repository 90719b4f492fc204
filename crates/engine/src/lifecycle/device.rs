//! Managed device operational lifecycle and device commands.

use crate::command::CommandSpec;
use crate::graph::{GraphError, StateGraph};
use crate::lifecycle::EntityKind;

lifecycle_states! {
    /// Operational status of a managed device.
    DeviceStatus: EntityKind::ManagedDevice => {
        Offline => "OFFLINE",
        Online => "ONLINE",
        Error => "ERROR",
        Maintenance => "MAINTENANCE",
        /// Decommissioned. Kept in the store so its history stays queryable.
        Deleted => "DELETED",
    }
}

/// Restart the device. Requires an online device.
pub const REBOOT: &str = "reboot";

/// Push a firmware image. Takes an optional [`FIRMWARE_VERSION_PARAM`]; when
/// absent the dispatcher picks the latest image for the device model.
pub const PUSH_FIRMWARE: &str = "push_firmware";

pub const FIRMWARE_VERSION_PARAM: &str = "version";

/// New devices are registered OFFLINE. A faulted device has to be taken
/// offline or into maintenance before it can come back online. An online
/// device cannot be deleted.
pub fn device_graph() -> Result<StateGraph<DeviceStatus>, GraphError> {
    use DeviceStatus::*;

    StateGraph::builder(Offline)
        .transitions(Offline, &[Online, Maintenance, Deleted])
        .transitions(Online, &[Offline, Error, Maintenance])
        .transitions(Error, &[Offline, Maintenance, Deleted])
        .transitions(Maintenance, &[Online, Offline, Deleted])
        .terminal(Deleted)
        .build()
}

pub fn device_commands() -> Vec<CommandSpec<DeviceStatus>> {
    vec![
        CommandSpec::new(REBOOT, &[DeviceStatus::Online]),
        CommandSpec::new(PUSH_FIRMWARE, &[DeviceStatus::Online]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use DeviceStatus::*;

    #[test]
    fn faulted_device_cannot_go_straight_online() {
        let graph = device_graph().unwrap();
        assert!(!graph.can_transition(Error, Online).unwrap());
        assert!(graph.can_transition(Error, Maintenance).unwrap());
        assert!(graph.can_transition(Maintenance, Online).unwrap());
    }

    #[test]
    fn online_devices_cannot_be_deleted() {
        let graph = device_graph().unwrap();
        assert_eq!(graph.initial(), Offline);
        assert!(!graph.can_transition(Online, Deleted).unwrap());
        for from in [Offline, Error, Maintenance] {
            assert!(graph.can_transition(from, Deleted).unwrap(), "{from}");
        }
        assert_eq!(graph.terminal_states(), vec![Deleted]);
    }

    #[test]
    fn commands_require_online() {
        let commands = device_commands();
        assert_eq!(commands.len(), 2);
        for spec in &commands {
            assert!(spec.permits(Online));
            assert!(!spec.permits(Maintenance), "{}", spec.name);
            assert!(!spec.permits(Deleted), "{}", spec.name);
        }
    }
}
