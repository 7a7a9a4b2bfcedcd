use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::{ComponentId, DeviceHealth, DeviceId, SmartThingsError};

/// A single attribute change as pushed by SmartThings.
///
/// The capability is kept as the raw id so that events for capabilities this
/// crate does not know can be ignored instead of failing to parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeEvent {
    pub device_id: DeviceId,
    #[serde(default)]
    pub component_id: ComponentId,
    pub capability: String,
    pub attribute: String,
    pub value: JsonValue,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub state_change: Option<bool>,
}

impl AttributeEvent {
    pub fn new(
        device_id: impl Into<DeviceId>,
        capability: impl Into<String>,
        attribute: impl Into<String>,
        value: impl Into<JsonValue>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            component_id: ComponentId::main(),
            capability: capability.into(),
            attribute: attribute.into(),
            value: value.into(),
            unit: None,
            state_change: None,
        }
    }

    pub fn component(mut self, component: impl Into<ComponentId>) -> Self {
        self.component_id = component.into();
        self
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    Attribute(AttributeEvent),
    Health {
        device_id: DeviceId,
        health: DeviceHealth,
    },
    /// The device was deleted from the account.
    Deleted { device_id: DeviceId },
    /// The device was created, updated or moved; its definition must be resynced.
    Changed { device_id: DeviceId },
}

impl DeviceEvent {
    pub fn device_id(&self) -> &DeviceId {
        match self {
            DeviceEvent::Attribute(event) => &event.device_id,
            DeviceEvent::Health { device_id, .. }
            | DeviceEvent::Deleted { device_id }
            | DeviceEvent::Changed { device_id } => device_id,
        }
    }

    /// Parse a SmartThings event envelope. Event types that carry no device
    /// information (mode changes, scene executions, ...) yield `None`.
    pub fn parse(payload: &[u8]) -> Result<Option<Self>, SmartThingsError> {
        let event = match serde_json::from_slice::<WireEvent>(payload)? {
            WireEvent::DeviceEvent { event } => DeviceEvent::Attribute(event),
            WireEvent::DeviceHealthEvent { event } => DeviceEvent::Health {
                device_id: event.device_id,
                health: event.status,
            },
            WireEvent::DeviceLifecycleEvent { event } => match event.lifecycle.as_str() {
                "DELETE" => DeviceEvent::Deleted {
                    device_id: event.device_id,
                },
                _ => DeviceEvent::Changed {
                    device_id: event.device_id,
                },
            },
            WireEvent::Other => return Ok(None),
        };
        Ok(Some(event))
    }
}

impl From<AttributeEvent> for DeviceEvent {
    fn from(event: AttributeEvent) -> Self {
        DeviceEvent::Attribute(event)
    }
}

#[derive(Deserialize)]
#[serde(tag = "eventType", rename_all = "SCREAMING_SNAKE_CASE")]
enum WireEvent {
    DeviceEvent {
        #[serde(rename = "deviceEvent")]
        event: AttributeEvent,
    },
    DeviceHealthEvent {
        #[serde(rename = "deviceHealthEvent")]
        event: HealthEvent,
    },
    DeviceLifecycleEvent {
        #[serde(rename = "deviceLifecycleEvent")]
        event: LifecycleEvent,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HealthEvent {
    device_id: DeviceId,
    status: DeviceHealth,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LifecycleEvent {
    device_id: DeviceId,
    lifecycle: String,
}
