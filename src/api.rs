use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::{collections::BTreeMap, future::Future, sync::Arc, time::Duration};

use crate::{
    Capability, ComponentId, Device, DeviceCommand, DeviceId, Session, SmartThingsError,
    SmartThingsResult,
};

/// Remote calls the translator needs from the SmartThings cloud.
///
/// Implementations must honour the session: use its token, fail with
/// `SessionClosed` once it is closed, and bound every call with a timeout.
pub trait SmartThingsApi: Send + Sync + 'static {
    /// All devices visible to the session (restricted to its location, if any).
    fn list_devices(
        &self,
        session: &Session,
    ) -> impl Future<Output = SmartThingsResult<Vec<DeviceDescription>>> + Send;

    fn device_status(
        &self,
        session: &Session,
        device_id: &DeviceId,
    ) -> impl Future<Output = SmartThingsResult<DeviceStatusPayload>> + Send;

    fn execute_command(
        &self,
        session: &Session,
        device_id: &DeviceId,
        command: &DeviceCommand,
    ) -> impl Future<Output = SmartThingsResult<()>> + Send;
}

/// Bounds every call of the wrapped api with `timeout`. An elapsed call fails
/// with `TransientNetwork`.
#[derive(Debug)]
pub struct TimeoutApi<A> {
    inner: Arc<A>,
    timeout: Duration,
}

impl<A> TimeoutApi<A> {
    pub fn new(inner: Arc<A>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn inner(&self) -> &Arc<A> {
        &self.inner
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl<A> Clone for TimeoutApi<A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            timeout: self.timeout,
        }
    }
}

impl<A: SmartThingsApi> SmartThingsApi for TimeoutApi<A> {
    async fn list_devices(&self, session: &Session) -> SmartThingsResult<Vec<DeviceDescription>> {
        tokio::time::timeout(self.timeout, self.inner.list_devices(session)).await?
    }

    async fn device_status(
        &self,
        session: &Session,
        device_id: &DeviceId,
    ) -> SmartThingsResult<DeviceStatusPayload> {
        tokio::time::timeout(self.timeout, self.inner.device_status(session, device_id)).await?
    }

    async fn execute_command(
        &self,
        session: &Session,
        device_id: &DeviceId,
        command: &DeviceCommand,
    ) -> SmartThingsResult<()> {
        tokio::time::timeout(
            self.timeout,
            self.inner.execute_command(session, device_id, command),
        )
        .await?
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescription {
    pub device_id: DeviceId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub location_id: Option<String>,
    #[serde(default)]
    pub components: Vec<ComponentDescription>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDescription {
    pub id: ComponentId,
    #[serde(default)]
    pub capabilities: Vec<CapabilityReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityReference {
    pub id: String,
    #[serde(default = "default_version")]
    pub version: u32,
}

fn default_version() -> u32 {
    1
}

impl DeviceDescription {
    pub fn new(device_id: impl Into<DeviceId>, label: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            name: None,
            label: Some(label.into()),
            location_id: None,
            components: Vec::new(),
        }
    }

    /// Add a component advertising `capabilities` at version 1.
    pub fn component<'a>(
        mut self,
        id: impl Into<ComponentId>,
        capabilities: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        self.components.push(ComponentDescription {
            id: id.into(),
            capabilities: capabilities
                .into_iter()
                .map(|id| CapabilityReference {
                    id: id.to_owned(),
                    version: default_version(),
                })
                .collect(),
        });
        self
    }

    /// Convert into a `Device`, resolving capability references.
    ///
    /// References that do not resolve to a known schema are skipped and
    /// returned as `Schema` errors; they never fail the whole device.
    pub fn to_device(&self) -> (Device, Vec<SmartThingsError>) {
        let label = self
            .label
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or_default();
        let mut device = Device::new(self.device_id.clone(), label);
        let mut skipped = Vec::new();
        for component in &self.components {
            let capabilities = component
                .capabilities
                .iter()
                .filter_map(|reference| {
                    match Capability::resolve(&reference.id, reference.version) {
                        Ok(capability) => Some(capability),
                        Err(err) => {
                            log::debug!(
                                "[{}] skipping capability on component {}: {}",
                                self.device_id,
                                component.id,
                                err
                            );
                            skipped.push(err);
                            None
                        }
                    }
                })
                .collect::<Vec<_>>();
            device = device.with_component(component.id.clone(), capabilities);
        }
        (device, skipped)
    }
}

/// `GET /devices/{id}/status` body: component -> capability -> attribute.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatusPayload {
    #[serde(default)]
    pub components: BTreeMap<ComponentId, BTreeMap<String, BTreeMap<String, AttributeState>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeState {
    #[serde(default)]
    pub value: JsonValue,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl DeviceStatusPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(
        mut self,
        component: impl Into<ComponentId>,
        capability: &str,
        attribute: &str,
        value: impl Into<JsonValue>,
    ) -> Self {
        self.components
            .entry(component.into())
            .or_default()
            .entry(capability.to_owned())
            .or_default()
            .insert(
                attribute.to_owned(),
                AttributeState {
                    value: value.into(),
                    ..Default::default()
                },
            );
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_description_skips_unknown_capabilities() {
        let description: DeviceDescription = serde_json::from_value(json!({
            "deviceId": "d1",
            "name": "Plug",
            "components": [{
                "id": "main",
                "capabilities": [
                    { "id": "switch", "version": 1 },
                    { "id": "custom.firmwareUpdate", "version": 1 },
                    { "id": "powerMeter", "version": 2 }
                ]
            }]
        }))
        .unwrap();
        let (device, skipped) = description.to_device();
        assert_eq!(device.label, "Plug");
        assert_eq!(
            device.capabilities(&ComponentId::main()).unwrap().len(),
            1
        );
        assert_eq!(skipped.len(), 2);
        assert!(skipped
            .iter()
            .all(|err| matches!(err, SmartThingsError::Schema { .. })));
    }

    #[test]
    fn test_status_payload_shape() {
        let payload: DeviceStatusPayload = serde_json::from_value(json!({
            "components": {
                "main": {
                    "switch": { "switch": { "value": "on", "timestamp": "2024-05-01T10:00:00.000Z" } },
                    "temperatureMeasurement": { "temperature": { "value": 21.5, "unit": "C" } }
                }
            }
        }))
        .unwrap();
        let main = &payload.components[&ComponentId::main()];
        assert_eq!(main["switch"]["switch"].value, json!("on"));
        assert!(main["switch"]["switch"].timestamp.is_some());
        assert_eq!(
            main["temperatureMeasurement"]["temperature"].unit.as_deref(),
            Some("C")
        );
    }
}
