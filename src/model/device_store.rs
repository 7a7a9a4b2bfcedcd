use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::{AttributeKey, Capability, ComponentId, DeviceId, StateSnapshot};

/// Device lifecycle as seen by the translator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    #[default]
    Unknown,
    /// Confirmed by the last sync.
    Synced,
    /// Known, but the last attempt to refresh it failed.
    Stale,
    Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceHealth {
    #[default]
    Unknown,
    Online,
    Offline,
}

pub enum DeviceUpdate<'a> {
    Added(&'a DeviceId),
    Updated {
        device: &'a DeviceId,
        from: DeviceStatus,
        to: DeviceStatus,
        capabilities_changed: bool,
    },
    NoChange,
}

#[allow(clippy::large_enum_variant)]
pub enum DeviceRemove {
    Removed(Device),
    NotFound,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Device {
    pub id: DeviceId,
    pub label: String,
    pub status: DeviceStatus,
    pub health: DeviceHealth,
    pub components: BTreeMap<ComponentId, BTreeSet<Capability>>,
    pub snapshot: StateSnapshot,
    pub last_synced: Option<DateTime<Utc>>,
}

impl Device {
    pub fn new(id: impl Into<DeviceId>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            status: DeviceStatus::Unknown,
            health: DeviceHealth::Unknown,
            components: BTreeMap::new(),
            snapshot: StateSnapshot::new(),
            last_synced: None,
        }
    }

    pub fn with_component(
        mut self,
        component: impl Into<ComponentId>,
        capabilities: impl IntoIterator<Item = Capability>,
    ) -> Self {
        self.components
            .entry(component.into())
            .or_default()
            .extend(capabilities);
        self
    }

    pub fn with_capabilities(self, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        self.with_component(ComponentId::main(), capabilities)
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.id
    }

    pub fn capabilities(&self, component: &ComponentId) -> Option<&BTreeSet<Capability>> {
        self.components.get(component)
    }

    pub fn has_capability(&self, component: &ComponentId, capability: Capability) -> bool {
        self.components
            .get(component)
            .is_some_and(|caps| caps.contains(&capability))
    }

    /// True if `key` names an attribute of a capability this device
    /// advertises on that component.
    pub fn advertises(&self, key: &AttributeKey) -> bool {
        self.has_capability(&key.component, key.capability)
            && key.capability.attribute(&key.attribute).is_some()
    }

    /// Whether entities of this device should be shown as available.
    pub fn is_available(&self) -> bool {
        matches!(self.status, DeviceStatus::Unknown | DeviceStatus::Synced)
            && self.health != DeviceHealth::Offline
    }
}
