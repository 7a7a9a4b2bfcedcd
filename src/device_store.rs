use chrono::Utc;
use std::collections::{btree_map, BTreeMap};

use crate::{
    AttributeEntry, AttributeKey, AttributeValue, Device, DeviceHealth, DeviceId, DeviceRemove,
    DeviceStatus, DeviceUpdate,
};

/// All devices of one account, keyed by device id.
#[derive(Default, Clone, Debug)]
pub struct DeviceStore(BTreeMap<DeviceId, Device>);

impl DeviceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly listed device or refresh a known one.
    ///
    /// For known devices the label and advertised components are replaced and
    /// snapshot entries of capabilities that are no longer advertised are
    /// dropped, the remaining snapshot is kept. Either way the device ends up
    /// `Synced`.
    pub fn upsert<'a>(&mut self, listed: &'a Device) -> DeviceUpdate<'a> {
        let now = Utc::now();
        match self.0.get_mut(&listed.id) {
            Some(device) => {
                let from = device.status;
                let capabilities_changed = device.components != listed.components;
                device.label.clone_from(&listed.label);
                device.last_synced = Some(now);
                device.status = DeviceStatus::Synced;
                if capabilities_changed {
                    device.components = listed.components.clone();
                    let components = &device.components;
                    let dropped = device.snapshot.retain_keys(|key| {
                        components
                            .get(&key.component)
                            .is_some_and(|caps| caps.contains(&key.capability))
                    });
                    if dropped > 0 {
                        log::debug!(
                            "[{}] dropped {} snapshot entries of removed capabilities",
                            listed.id,
                            dropped
                        );
                    }
                }
                if from != DeviceStatus::Synced || capabilities_changed {
                    DeviceUpdate::Updated {
                        device: &listed.id,
                        from,
                        to: DeviceStatus::Synced,
                        capabilities_changed,
                    }
                } else {
                    DeviceUpdate::NoChange
                }
            }
            None => {
                let mut device = listed.clone();
                device.status = DeviceStatus::Synced;
                device.last_synced = Some(now);
                self.0.insert(listed.id.clone(), device);
                DeviceUpdate::Added(&listed.id)
            }
        }
    }

    /// Returns the previous status if it changed.
    pub fn set_status(&mut self, id: &DeviceId, status: DeviceStatus) -> Option<DeviceStatus> {
        let device = self.0.get_mut(id)?;
        if device.status == status {
            return None;
        }
        Some(std::mem::replace(&mut device.status, status))
    }

    /// Returns the previous health if it changed.
    pub fn set_health(&mut self, id: &DeviceId, health: DeviceHealth) -> Option<DeviceHealth> {
        let device = self.0.get_mut(id)?;
        if device.health == health {
            return None;
        }
        Some(std::mem::replace(&mut device.health, health))
    }

    /// Mark every device as stale, returning the ids and previous status of
    /// devices that actually changed.
    pub fn mark_all_stale(&mut self) -> Vec<(DeviceId, DeviceStatus)> {
        self.0
            .values_mut()
            .filter(|device| device.status != DeviceStatus::Stale)
            .map(|device| {
                let from = std::mem::replace(&mut device.status, DeviceStatus::Stale);
                (device.id.clone(), from)
            })
            .collect()
    }

    pub fn remove_device(&mut self, id: &DeviceId) -> DeviceRemove {
        match self.0.remove(id) {
            Some(mut device) => {
                device.status = DeviceStatus::Removed;
                DeviceRemove::Removed(device)
            }
            None => DeviceRemove::NotFound,
        }
    }

    pub fn get_device(&self, id: &DeviceId) -> Option<&Device> {
        self.0.get(id)
    }

    pub fn get_device_mut(&mut self, id: &DeviceId) -> Option<&mut Device> {
        self.0.get_mut(id)
    }

    pub fn get_entry(&self, id: &DeviceId, key: &AttributeKey) -> Option<&AttributeEntry> {
        self.get_device(id)
            .and_then(|device| device.snapshot.get_entry(key))
    }

    pub fn get_value(&self, id: &DeviceId, key: &AttributeKey) -> Option<&AttributeValue> {
        self.get_device(id).and_then(|device| device.snapshot.value(key))
    }

    pub fn contains_device(&self, id: &DeviceId) -> bool {
        self.0.contains_key(id)
    }

    pub fn device_status(&self, id: &DeviceId) -> Option<DeviceStatus> {
        self.get_device(id).map(|device| device.status)
    }

    pub fn device_ids(&self) -> btree_map::Keys<'_, DeviceId, Device> {
        self.0.keys()
    }

    pub fn iter(&self) -> btree_map::Values<'_, DeviceId, Device> {
        self.0.values()
    }

    pub fn clear(&mut self) {
        log::debug!("Clearing all devices!");
        self.0.clear();
    }

    pub fn count(&self) -> usize {
        self.0.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Capability, ComponentId};

    #[test]
    fn test_upsert_adds_then_reports_no_change() {
        let mut store = DeviceStore::new();
        let listed = Device::new("d1", "Lamp").with_capabilities([Capability::Switch]);
        assert!(matches!(store.upsert(&listed), DeviceUpdate::Added(_)));
        assert_eq!(store.device_status(&listed.id), Some(DeviceStatus::Synced));
        assert!(matches!(store.upsert(&listed), DeviceUpdate::NoChange));
    }

    #[test]
    fn test_upsert_prunes_snapshot_of_dropped_capabilities() {
        let mut store = DeviceStore::new();
        let listed = Device::new("d1", "Lamp")
            .with_capabilities([Capability::Switch, Capability::SwitchLevel]);
        store.upsert(&listed);
        let level = AttributeKey::main(Capability::SwitchLevel, "level");
        let switch = AttributeKey::main(Capability::Switch, "switch");
        let device = store.get_device_mut(&listed.id).unwrap();
        device.snapshot.store_value(&level, 40i64.into(), None);
        device.snapshot.store_value(&switch, "on".into(), None);

        let relisted = Device::new("d1", "Lamp").with_capabilities([Capability::Switch]);
        match store.upsert(&relisted) {
            DeviceUpdate::Updated {
                capabilities_changed,
                ..
            } => assert!(capabilities_changed),
            _ => panic!("expected update"),
        }
        assert!(store.get_value(&relisted.id, &level).is_none());
        assert_eq!(store.get_value(&relisted.id, &switch), Some(&"on".into()));
        assert!(store
            .get_device(&relisted.id)
            .unwrap()
            .has_capability(&ComponentId::main(), Capability::Switch));
    }

    #[test]
    fn test_stale_devices_resync() {
        let mut store = DeviceStore::new();
        let listed = Device::new("d1", "Lamp").with_capabilities([Capability::Switch]);
        store.upsert(&listed);
        assert_eq!(store.mark_all_stale().len(), 1);
        assert!(store.mark_all_stale().is_empty());
        assert!(matches!(
            store.upsert(&listed),
            DeviceUpdate::Updated {
                from: DeviceStatus::Stale,
                to: DeviceStatus::Synced,
                capabilities_changed: false,
                ..
            }
        ));
    }

    #[test]
    fn test_remove_marks_removed() {
        let mut store = DeviceStore::new();
        store.upsert(&Device::new("d1", "Lamp"));
        match store.remove_device(&"d1".into()) {
            DeviceRemove::Removed(device) => assert_eq!(device.status, DeviceStatus::Removed),
            DeviceRemove::NotFound => panic!("device should exist"),
        }
        assert!(matches!(
            store.remove_device(&"d1".into()),
            DeviceRemove::NotFound
        ));
    }
}
