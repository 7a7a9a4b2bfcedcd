use serde::Serialize;
use std::{collections::BTreeSet, fmt};

use crate::{AttributeKey, AttributeValue, Capability, CapabilityRole, ComponentId, DeviceId};

/// Host framework entity platforms the translator can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityPlatform {
    Sensor,
    BinarySensor,
    Switch,
    Light,
    Fan,
    Lock,
    Climate,
    Cover,
    Valve,
}

impl EntityPlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityPlatform::Sensor => "sensor",
            EntityPlatform::BinarySensor => "binary_sensor",
            EntityPlatform::Switch => "switch",
            EntityPlatform::Light => "light",
            EntityPlatform::Fan => "fan",
            EntityPlatform::Lock => "lock",
            EntityPlatform::Climate => "climate",
            EntityPlatform::Cover => "cover",
            EntityPlatform::Valve => "valve",
        }
    }
}

impl fmt::Display for EntityPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityFeature {
    TurnOn,
    TurnOff,
    SetSpeed,
    PresetMode,
    Brightness,
    Color,
    ColorTemperature,
    Open,
    Close,
    Pause,
    SetPosition,
    HvacMode,
    TargetTemperature,
    TargetTemperatureRange,
    FanMode,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityState {
    /// No value has been reported yet.
    Unknown,
    /// The device is stale, removed or offline.
    Unavailable,
    Value(AttributeValue),
}

impl EntityState {
    pub fn value(&self) -> Option<&AttributeValue> {
        match self {
            EntityState::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, EntityState::Unavailable)
    }
}

/// Secondary state of a fan entity, next to its on/off primary state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FanState {
    /// Speed as a percentage of the `fanSpeed` range, 0 when stopped.
    pub percentage: Option<u8>,
    pub preset_mode: Option<String>,
    pub preset_modes: Vec<String>,
}

/// Host visible projection of one or more capabilities of a device component.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    pub unique_id: String,
    pub device_id: DeviceId,
    pub component: ComponentId,
    pub platform: EntityPlatform,
    pub name: String,
    /// Capabilities backing this entity; commands are resolved against them in order.
    pub capabilities: Vec<Capability>,
    pub features: BTreeSet<EntityFeature>,
    /// Attribute that determines the entity state.
    pub primary: Option<AttributeKey>,
    pub device_class: Option<String>,
    pub unit: Option<String>,
    pub state: EntityState,
}

impl Entity {
    pub fn supports(&self, feature: EntityFeature) -> bool {
        self.features.contains(&feature)
    }

    /// Interprets the state as on/off where the platform has such a notion.
    pub fn is_on(&self) -> Option<bool> {
        let value = self.state.value()?.as_str()?;
        match self.platform {
            EntityPlatform::Switch | EntityPlatform::Light | EntityPlatform::Fan => {
                Some(value == "on")
            }
            EntityPlatform::Lock => Some(value == "locked"),
            EntityPlatform::Valve => Some(value == "open"),
            EntityPlatform::Cover => Some(matches!(value, "open" | "partially open")),
            EntityPlatform::BinarySensor => match self.primary.as_ref()?.capability.role() {
                CapabilityRole::BinarySensor { on, .. } => Some(on.contains(&value)),
                _ => None,
            },
            EntityPlatform::Sensor | EntityPlatform::Climate => None,
        }
    }

    /// Same entity definition, ignoring the current state.
    pub fn same_definition(&self, other: &Entity) -> bool {
        self.unique_id == other.unique_id
            && self.platform == other.platform
            && self.name == other.name
            && self.capabilities == other.capabilities
            && self.features == other.features
            && self.primary == other.primary
            && self.device_class == other.device_class
            && self.unit == other.unit
    }
}
