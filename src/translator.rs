use std::collections::{BTreeMap, BTreeSet};

use crate::{
    command, entity_mapping, map_to_entities, AttributeKey, AttributeEvent, Capability,
    CommandRequest, CompiledDeviceFilter, Device, DeviceDescription, DeviceEvent, DeviceId,
    DeviceRemove, DeviceStatus, DeviceStatusPayload, DeviceStore, DeviceUpdate, Entity, FanState,
    PreparedCommand, Session, SmartThingsApi, SmartThingsError, SmartThingsResult, StateSnapshot,
    TranslatorAction, TranslatorConfig, ValueUpdate,
};

/// Device list and per-device status as fetched for one sync.
#[derive(Debug, Default)]
pub struct AccountSnapshot {
    pub devices: Vec<FetchedDevice>,
}

#[derive(Debug)]
pub struct FetchedDevice {
    pub description: DeviceDescription,
    /// A failed status fetch leaves the device stale without failing the sync.
    pub status: SmartThingsResult<DeviceStatusPayload>,
}

/// Outcome of a sync or refresh.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub actions: Vec<TranslatorAction>,
    /// Devices whose status was refreshed successfully.
    pub synced: Vec<DeviceId>,
    /// Per-item problems that did not fail the operation.
    pub skipped: Vec<SmartThingsError>,
    /// Set if the operation as a whole failed.
    pub error: Option<SmartThingsError>,
}

impl SyncReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> SmartThingsResult<Vec<TranslatorAction>> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.actions),
        }
    }
}

/// Fetch everything a sync needs. Only listing failures and terminal errors
/// fail the whole fetch; a failed status call is kept with its device.
pub async fn fetch_account<A: SmartThingsApi>(
    api: &A,
    session: &Session,
    filter: &CompiledDeviceFilter,
) -> SmartThingsResult<AccountSnapshot> {
    let descriptions = api.list_devices(session).await?;
    log::debug!(
        "[{}] listed {} devices",
        session.account(),
        descriptions.len()
    );
    let mut devices = Vec::with_capacity(descriptions.len());
    for description in descriptions {
        let (device, _) = description.to_device();
        if !filter.accepts(&device) {
            log::trace!("[{}] excluded by device filter", description.device_id);
            continue;
        }
        let status = api.device_status(session, &description.device_id).await;
        match &status {
            Err(err) if err.is_terminal() => return Err(err.clone()),
            Err(err) => log::warn!(
                "[{}] failed to fetch device status: {}",
                description.device_id,
                err
            ),
            Ok(_) => {}
        }
        devices.push(FetchedDevice {
            description,
            status,
        });
    }
    Ok(AccountSnapshot { devices })
}

/// Translates one SmartThings account into host entities.
///
/// The translator is the single owner of the device store and the registered
/// entity set; all mutation goes through `&mut self`. Every mutating operation
/// returns the actions the host registry has to apply.
#[derive(Debug, Default)]
pub struct CapabilityTranslator {
    devices: DeviceStore,
    entities: BTreeMap<DeviceId, Vec<Entity>>,
    filter: CompiledDeviceFilter,
}

impl CapabilityTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &TranslatorConfig) -> SmartThingsResult<Self> {
        Ok(Self::new().with_filter(config.devices.compile()?))
    }

    pub fn with_filter(mut self, filter: CompiledDeviceFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn filter(&self) -> &CompiledDeviceFilter {
        &self.filter
    }

    pub fn devices(&self) -> &DeviceStore {
        &self.devices
    }

    pub fn device(&self, device_id: &DeviceId) -> Option<&Device> {
        self.devices.get_device(device_id)
    }

    pub fn snapshot(&self, device_id: &DeviceId) -> Option<&StateSnapshot> {
        self.device(device_id).map(|device| &device.snapshot)
    }

    /// Registered entities of all devices, ordered by device and unique id.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values().flatten()
    }

    pub fn device_entities(&self, device_id: &DeviceId) -> &[Entity] {
        self.entities
            .get(device_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn entity(&self, unique_id: &str) -> Option<&Entity> {
        self.entities().find(|entity| entity.unique_id == unique_id)
    }

    /// Speed and preset mode of a registered fan entity.
    pub fn fan_state(&self, unique_id: &str) -> Option<FanState> {
        let entity = self.entity(unique_id)?;
        entity_mapping::fan_state(self.device(&entity.device_id)?, entity)
    }

    /// Project a known device onto entities without registering them.
    pub fn map_to_entities(&self, device_id: &DeviceId) -> Option<Vec<Entity>> {
        self.device(device_id).map(map_to_entities)
    }

    /// Reconcile the device store with the cloud.
    ///
    /// Waits for a sync already running on the same session to finish first.
    pub async fn sync_devices<A: SmartThingsApi>(
        &mut self,
        api: &A,
        session: &Session,
    ) -> SyncReport {
        let fetched = match session.begin_sync().await {
            Ok(_guard) => fetch_account(api, session, &self.filter).await,
            Err(err) => Err(err),
        };
        self.apply_sync(fetched)
    }

    /// Apply the result of `fetch_account`.
    ///
    /// On failure every known device turns stale (its entities unavailable)
    /// and nothing is removed. On success devices missing from the listing
    /// are removed.
    pub fn apply_sync(&mut self, fetched: SmartThingsResult<AccountSnapshot>) -> SyncReport {
        let mut report = SyncReport::default();
        let account = match fetched {
            Ok(account) => account,
            Err(err) => {
                log::warn!("Device sync failed: {}", err);
                for (device, from) in self.devices.mark_all_stale() {
                    report.actions.push(TranslatorAction::DeviceStatusChanged {
                        device: device.clone(),
                        from,
                        to: DeviceStatus::Stale,
                    });
                    self.refresh_entities(&device, &mut report.actions);
                }
                if let SmartThingsError::Auth(reason) = &err {
                    report
                        .actions
                        .push(TranslatorAction::AuthenticationFailed(reason.clone()));
                }
                report.actions.push(TranslatorAction::SyncFailed {
                    reason: err.to_string(),
                    retryable: err.is_retryable(),
                });
                report.error = Some(err);
                return report;
            }
        };

        let mut listed = BTreeSet::new();
        for FetchedDevice {
            description,
            status,
        } in account.devices
        {
            let (device, skipped) = description.to_device();
            report.skipped.extend(skipped);
            if !self.filter.accepts(&device) {
                continue;
            }
            let id = device.id.clone();
            listed.insert(id.clone());

            let before = self.devices.device_status(&id);
            match self.devices.upsert(&device) {
                DeviceUpdate::Added(id) => {
                    report.actions.push(TranslatorAction::DeviceAdded(id.clone()));
                }
                DeviceUpdate::Updated {
                    device,
                    capabilities_changed: true,
                    ..
                } => {
                    log::debug!("[{}] advertised capabilities changed", device);
                }
                _ => {}
            }
            match status {
                Ok(payload) => {
                    self.merge_status(&id, &payload, &mut report);
                    report.synced.push(id.clone());
                }
                Err(err) => {
                    self.devices.set_status(&id, DeviceStatus::Stale);
                    report.skipped.push(err);
                }
            }
            if let (Some(from), Some(to)) = (before, self.devices.device_status(&id)) {
                if from != to {
                    report
                        .actions
                        .push(TranslatorAction::DeviceStatusChanged { device: id.clone(), from, to });
                }
            }
            self.refresh_entities(&id, &mut report.actions);
        }

        let gone = self
            .devices
            .device_ids()
            .filter(|id| !listed.contains(*id))
            .cloned()
            .collect::<Vec<_>>();
        for id in gone {
            self.remove_device(&id, &mut report.actions);
        }

        report.actions.push(TranslatorAction::SyncCompleted {
            devices: self.devices.count(),
        });
        log::debug!(
            "Sync completed: {} devices, {} skipped items",
            self.devices.count(),
            report.skipped.len()
        );
        report
    }

    /// Re-read the status of a single known device.
    pub async fn refresh_device<A: SmartThingsApi>(
        &mut self,
        api: &A,
        session: &Session,
        device_id: &DeviceId,
    ) -> SyncReport {
        let status = if self.devices.contains_device(device_id) {
            api.device_status(session, device_id).await
        } else {
            Err(SmartThingsError::UnknownDevice(device_id.clone()))
        };
        self.apply_refresh(device_id, status)
    }

    pub fn apply_refresh(
        &mut self,
        device_id: &DeviceId,
        status: SmartThingsResult<DeviceStatusPayload>,
    ) -> SyncReport {
        let mut report = SyncReport::default();
        if !self.devices.contains_device(device_id) {
            report.error = Some(SmartThingsError::UnknownDevice(device_id.clone()));
            return report;
        }
        let to = match status {
            Ok(payload) => {
                self.merge_status(device_id, &payload, &mut report);
                report.synced.push(device_id.clone());
                DeviceStatus::Synced
            }
            Err(err) => {
                log::warn!("[{}] refresh failed: {}", device_id, err);
                if let SmartThingsError::Auth(reason) = &err {
                    report
                        .actions
                        .push(TranslatorAction::AuthenticationFailed(reason.clone()));
                }
                report.error = Some(err);
                DeviceStatus::Stale
            }
        };
        if let Some(from) = self.devices.set_status(device_id, to) {
            report.actions.push(TranslatorAction::DeviceStatusChanged {
                device: device_id.clone(),
                from,
                to,
            });
        }
        self.refresh_entities(device_id, &mut report.actions);
        report
    }

    /// Apply one pushed event.
    ///
    /// Events for unknown devices, capabilities or attributes are ignored. A
    /// value that does not fit the attribute's type fails with
    /// `MalformedEvent` and leaves the snapshot untouched.
    pub fn apply_event(&mut self, event: &DeviceEvent) -> SmartThingsResult<Vec<TranslatorAction>> {
        let mut actions = Vec::new();
        match event {
            DeviceEvent::Attribute(event) => self.apply_attribute_event(event, &mut actions)?,
            DeviceEvent::Health { device_id, health } => {
                if let Some(from) = self.devices.set_health(device_id, *health) {
                    actions.push(TranslatorAction::DeviceHealthChanged {
                        device: device_id.clone(),
                        from,
                        to: *health,
                    });
                    self.refresh_entities(device_id, &mut actions);
                }
            }
            DeviceEvent::Deleted { device_id } => self.remove_device(device_id, &mut actions),
            DeviceEvent::Changed { device_id } => {
                log::debug!("[{}] changed, waiting for the next sync", device_id);
            }
        }
        Ok(actions)
    }

    fn apply_attribute_event(
        &mut self,
        event: &AttributeEvent,
        actions: &mut Vec<TranslatorAction>,
    ) -> SmartThingsResult<()> {
        let Some(device) = self.devices.get_device_mut(&event.device_id) else {
            log::debug!("Ignoring event for unknown device [{}]", event.device_id);
            return Ok(());
        };
        let Some(capability) = Capability::from_id(&event.capability) else {
            log::trace!(
                "[{}] ignoring event of unknown capability {}",
                event.device_id,
                event.capability
            );
            return Ok(());
        };
        let key = AttributeKey::new(
            event.component_id.clone(),
            capability,
            event.attribute.as_str(),
        );
        let Some(schema) = capability
            .attribute(&event.attribute)
            .filter(|_| device.advertises(&key))
        else {
            log::debug!("[{}] ignoring event for unadvertised {}", event.device_id, key);
            return Ok(());
        };
        let value = schema.value_type.parse(&event.value).map_err(|reason| {
            SmartThingsError::MalformedEvent {
                device: event.device_id.clone(),
                capability,
                attribute: event.attribute.clone(),
                reason,
            }
        })?;
        if let ValueUpdate::Changed { old, new } =
            device.snapshot.store_value(&key, value, event.unit.clone())
        {
            actions.push(TranslatorAction::AttributeChanged {
                device: event.device_id.clone(),
                key,
                from: old,
                to: new,
            });
        }
        self.refresh_entities(&event.device_id, actions);
        Ok(())
    }

    /// Validate a command for `entity` without sending it.
    pub fn prepare_command(
        &self,
        entity: &Entity,
        request: &CommandRequest,
    ) -> SmartThingsResult<PreparedCommand> {
        let device = self
            .devices
            .get_device(&entity.device_id)
            .ok_or_else(|| SmartThingsError::UnknownDevice(entity.device_id.clone()))?;
        let prepared = command::prepare_command(entity, request)?;
        if !device.has_capability(&prepared.command.component, prepared.command.capability) {
            return Err(SmartThingsError::Validation(format!(
                "device [{}] no longer advertises {} on {}",
                device.id, prepared.command.capability, prepared.command.component
            )));
        }
        Ok(prepared)
    }

    /// Record the optimistic effect of a command the cloud accepted.
    pub fn complete_command(&mut self, prepared: &PreparedCommand) -> Vec<TranslatorAction> {
        let mut actions = Vec::new();
        let Some((key, target)) = &prepared.effect else {
            return actions;
        };
        let Some(device) = self.devices.get_device_mut(&prepared.device_id) else {
            return actions;
        };
        // a sync may have dropped the capability while the command was in flight
        if !device.advertises(key) {
            log::debug!(
                "[{}] dropping target for unadvertised {}",
                prepared.device_id,
                key
            );
            return actions;
        }
        if let ValueUpdate::Changed { new, .. } = device.snapshot.store_target(key, target.clone())
        {
            actions.push(TranslatorAction::AttributeTargetChanged {
                device: prepared.device_id.clone(),
                key: key.clone(),
                target: new,
            });
            self.refresh_entities(&prepared.device_id, &mut actions);
        }
        actions
    }

    /// Validate, send and optimistically apply a command.
    ///
    /// Validation failures never reach the network.
    pub async fn issue_command<A: SmartThingsApi>(
        &mut self,
        api: &A,
        session: &Session,
        entity: &Entity,
        request: &CommandRequest,
    ) -> SmartThingsResult<Vec<TranslatorAction>> {
        let prepared = self.prepare_command(entity, request)?;
        api.execute_command(session, &prepared.device_id, &prepared.command)
            .await?;
        Ok(self.complete_command(&prepared))
    }

    /// Forget all devices, e.g. when the account is unlinked.
    pub fn clear(&mut self) -> Vec<TranslatorAction> {
        let mut actions = Vec::new();
        let ids = self.devices.device_ids().cloned().collect::<Vec<_>>();
        for id in ids {
            self.remove_device(&id, &mut actions);
        }
        actions
    }

    fn merge_status(
        &mut self,
        device_id: &DeviceId,
        payload: &DeviceStatusPayload,
        report: &mut SyncReport,
    ) {
        let Some(device) = self.devices.get_device_mut(device_id) else {
            return;
        };
        for (component, capabilities) in &payload.components {
            for (capability_id, attributes) in capabilities {
                let Some(capability) = Capability::from_id(capability_id) else {
                    continue;
                };
                if !device.has_capability(component, capability) {
                    continue;
                }
                for (attribute, state) in attributes {
                    let Some(schema) = capability.attribute(attribute) else {
                        continue;
                    };
                    if state.value.is_null() {
                        continue;
                    }
                    match schema.value_type.parse(&state.value) {
                        Ok(value) => {
                            let key =
                                AttributeKey::new(component.clone(), capability, attribute.as_str());
                            if let ValueUpdate::Changed { old, new } =
                                device.snapshot.store_value(&key, value, state.unit.clone())
                            {
                                report.actions.push(TranslatorAction::AttributeChanged {
                                    device: device_id.clone(),
                                    key,
                                    from: old,
                                    to: new,
                                });
                            }
                        }
                        Err(reason) => {
                            log::warn!(
                                "[{}] skipping {}/{}.{}: {}",
                                device_id,
                                component,
                                capability_id,
                                attribute,
                                reason
                            );
                            report.skipped.push(SmartThingsError::schema(
                                capability_id.as_str(),
                                format!("{}.{}: {}", component, attribute, reason),
                            ));
                        }
                    }
                }
            }
        }
    }

    fn remove_device(&mut self, device_id: &DeviceId, actions: &mut Vec<TranslatorAction>) {
        if let DeviceRemove::Removed(device) = self.devices.remove_device(device_id) {
            log::debug!("[{}] removed", device_id);
            self.refresh_entities(device_id, actions);
            actions.push(TranslatorAction::DeviceRemoved(device));
        }
    }

    /// Re-project a device and diff the result against its registered entities.
    fn refresh_entities(&mut self, device_id: &DeviceId, actions: &mut Vec<TranslatorAction>) {
        let current = self
            .devices
            .get_device(device_id)
            .map(map_to_entities)
            .unwrap_or_default();
        let mut previous = self
            .entities
            .remove(device_id)
            .unwrap_or_default()
            .into_iter()
            .map(|entity| (entity.unique_id.clone(), entity))
            .collect::<BTreeMap<_, _>>();

        for entity in &current {
            match previous.remove(&entity.unique_id) {
                None => actions.push(TranslatorAction::EntityAdded(entity.clone())),
                Some(old) if !old.same_definition(entity) => {
                    actions.push(TranslatorAction::EntityUpdated(entity.clone()))
                }
                Some(old) if old.state != entity.state => {
                    actions.push(TranslatorAction::EntityStateChanged {
                        unique_id: entity.unique_id.clone(),
                        state: entity.state.clone(),
                    })
                }
                Some(_) => {}
            }
        }
        for unique_id in previous.into_keys() {
            actions.push(TranslatorAction::EntityRemoved {
                device: device_id.clone(),
                unique_id,
            });
        }
        if !current.is_empty() {
            self.entities.insert(device_id.clone(), current);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AttributeValue, DeviceHealth, EntityState};

    fn synced(translator: &mut CapabilityTranslator) {
        let report = translator.apply_sync(Ok(AccountSnapshot {
            devices: vec![FetchedDevice {
                description: DeviceDescription::new("d1", "Plug").component("main", ["switch"]),
                status: Ok(DeviceStatusPayload::new().with_value("main", "switch", "switch", "off")),
            }],
        }));
        assert!(report.is_ok());
    }

    #[test]
    fn test_malformed_event_keeps_snapshot() {
        let mut translator = CapabilityTranslator::new();
        synced(&mut translator);
        let key = AttributeKey::main(Capability::Switch, "switch");
        let before = translator.snapshot(&"d1".into()).unwrap().clone();

        let err = translator
            .apply_event(&AttributeEvent::new("d1", "switch", "switch", 42).into())
            .unwrap_err();
        assert!(matches!(err, SmartThingsError::MalformedEvent { .. }));
        assert_eq!(translator.snapshot(&"d1".into()), Some(&before));
        assert_eq!(
            translator.snapshot(&"d1".into()).unwrap().value(&key),
            Some(&AttributeValue::from("off"))
        );
    }

    #[test]
    fn test_offline_health_makes_entities_unavailable() {
        let mut translator = CapabilityTranslator::new();
        synced(&mut translator);
        let actions = translator
            .apply_event(&DeviceEvent::Health {
                device_id: "d1".into(),
                health: DeviceHealth::Offline,
            })
            .unwrap();
        assert!(actions.contains(&TranslatorAction::EntityStateChanged {
            unique_id: "d1.main.switch".to_owned(),
            state: EntityState::Unavailable
        }));
    }

    #[test]
    fn test_changed_event_is_a_noop() {
        let mut translator = CapabilityTranslator::new();
        synced(&mut translator);
        let actions = translator
            .apply_event(&DeviceEvent::Changed {
                device_id: "d1".into(),
            })
            .unwrap();
        assert!(actions.is_empty());
    }
}
