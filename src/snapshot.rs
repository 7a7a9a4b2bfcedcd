use chrono::Utc;
use std::{
    collections::BTreeMap,
    ops::{Deref, DerefMut},
};

use crate::{AttributeEntry, AttributeKey, AttributeValue, ValueUpdate};

/// Last known attribute values of one device.
///
/// Only the owning translator mutates a snapshot. Authoritative values arrive
/// through `store_value`; commands may only place an optimistic `target`.
#[derive(Default, Clone, Debug, PartialEq)]
pub struct StateSnapshot(BTreeMap<AttributeKey, AttributeEntry>);

impl Deref for StateSnapshot {
    type Target = BTreeMap<AttributeKey, AttributeEntry>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for StateSnapshot {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl StateSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.0.len()
    }

    /// Store an authoritative value. Any pending optimistic target for the key
    /// is dropped: the cloud has spoken.
    pub fn store_value(
        &mut self,
        key: &AttributeKey,
        value: AttributeValue,
        unit: Option<String>,
    ) -> ValueUpdate<AttributeValue> {
        let now = Utc::now();
        let entry = self.0.entry(key.clone()).or_default();
        entry.last_received = Some(now);
        entry.target = None;
        if unit.is_some() {
            entry.unit = unit;
        }
        if entry.value.as_ref() != Some(&value) {
            let old = entry.value.replace(value.clone());
            entry.last_changed = Some(now);
            ValueUpdate::Changed { old, new: value }
        } else {
            ValueUpdate::Equal
        }
    }

    /// Record the value a successfully issued command is expected to produce.
    pub fn store_target(
        &mut self,
        key: &AttributeKey,
        target: AttributeValue,
    ) -> ValueUpdate<AttributeValue> {
        let entry = self.0.entry(key.clone()).or_default();
        if entry.target.as_ref() != Some(&target) {
            let old = entry.target.replace(target.clone());
            ValueUpdate::Changed { old, new: target }
        } else {
            ValueUpdate::Equal
        }
    }

    pub fn get_entry(&self, key: &AttributeKey) -> Option<&AttributeEntry> {
        self.0.get(key)
    }

    pub fn value(&self, key: &AttributeKey) -> Option<&AttributeValue> {
        self.0.get(key).and_then(|entry| entry.value.as_ref())
    }

    /// Value including a pending optimistic target.
    pub fn effective(&self, key: &AttributeKey) -> Option<&AttributeValue> {
        self.0.get(key).and_then(|entry| entry.effective())
    }

    /// Drop every entry whose key no longer passes `keep`. Used when a device
    /// stops advertising a capability or component.
    pub fn retain_keys(&mut self, mut keep: impl FnMut(&AttributeKey) -> bool) -> usize {
        let before = self.0.len();
        self.0.retain(|key, _| keep(key));
        before - self.0.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Capability;

    #[test]
    fn test_store_value_reports_changes() {
        let mut snapshot = StateSnapshot::new();
        let key = AttributeKey::main(Capability::Switch, "switch");
        assert!(matches!(
            snapshot.store_value(&key, "on".into(), None),
            ValueUpdate::Changed { old: None, .. }
        ));
        assert!(matches!(
            snapshot.store_value(&key, "on".into(), None),
            ValueUpdate::Equal
        ));
        let entry = snapshot.get_entry(&key).unwrap();
        assert!(entry.last_received >= entry.last_changed);
    }

    #[test]
    fn test_authoritative_value_clears_target() {
        let mut snapshot = StateSnapshot::new();
        let key = AttributeKey::main(Capability::Switch, "switch");
        snapshot.store_value(&key, "off".into(), None);
        snapshot.store_target(&key, "on".into());
        assert_eq!(snapshot.value(&key), Some(&"off".into()));
        assert_eq!(snapshot.effective(&key), Some(&"on".into()));

        // the device reports it stayed off
        snapshot.store_value(&key, "off".into(), None);
        assert_eq!(snapshot.effective(&key), Some(&"off".into()));
        assert!(snapshot.get_entry(&key).unwrap().target.is_none());
    }

    #[test]
    fn test_unit_is_kept_when_not_reported() {
        let mut snapshot = StateSnapshot::new();
        let key = AttributeKey::main(Capability::TemperatureMeasurement, "temperature");
        snapshot.store_value(&key, 21.0f64.into(), Some("C".to_owned()));
        snapshot.store_value(&key, 21.5f64.into(), None);
        assert_eq!(snapshot.get_entry(&key).unwrap().unit.as_deref(), Some("C"));
    }
}
