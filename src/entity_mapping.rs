use std::collections::BTreeSet;

use crate::{
    AttributeKey, Capability, CapabilityRole, ComponentId, Device, Entity, EntityFeature,
    EntityPlatform, EntityState, FanState, ValueType,
};

/// Speeds reported by `fanSpeed`, excluding off.
pub const FAN_SPEED_RANGE: (i64, i64) = (1, 3);

/// Capabilities a composite platform takes for itself on one component.
struct Claim {
    capabilities: Vec<Capability>,
    features: BTreeSet<EntityFeature>,
    primary: Option<(Capability, &'static str)>,
    device_class: Option<&'static str>,
}

impl Claim {
    fn new(primary: Option<(Capability, &'static str)>) -> Self {
        Self {
            capabilities: Vec::new(),
            features: BTreeSet::new(),
            primary,
            device_class: None,
        }
    }

    fn take(mut self, available: &BTreeSet<Capability>, capability: Capability) -> Self {
        if available.contains(&capability) {
            self.capabilities.push(capability);
        }
        self
    }

    fn feature(mut self, feature: EntityFeature) -> Self {
        self.features.insert(feature);
        self
    }

    fn feature_if(self, condition: bool, feature: EntityFeature) -> Self {
        if condition {
            self.feature(feature)
        } else {
            self
        }
    }
}

struct CompositeStrategy {
    platform: EntityPlatform,
    claim: fn(&ComponentId, &BTreeSet<Capability>) -> Option<Claim>,
}

/// Composite platforms in claim order. Earlier platforms take precedence over
/// capabilities they share with later ones.
const COMPOSITE_STRATEGIES: &[CompositeStrategy] = &[
    CompositeStrategy {
        platform: EntityPlatform::Climate,
        claim: claim_climate,
    },
    CompositeStrategy {
        platform: EntityPlatform::Fan,
        claim: claim_fan,
    },
    CompositeStrategy {
        platform: EntityPlatform::Light,
        claim: claim_light,
    },
    CompositeStrategy {
        platform: EntityPlatform::Lock,
        claim: claim_lock,
    },
    CompositeStrategy {
        platform: EntityPlatform::Cover,
        claim: claim_cover,
    },
    CompositeStrategy {
        platform: EntityPlatform::Valve,
        claim: claim_valve,
    },
    CompositeStrategy {
        platform: EntityPlatform::Switch,
        claim: claim_switch,
    },
];

fn claim_climate(_: &ComponentId, caps: &BTreeSet<Capability>) -> Option<Claim> {
    use Capability::*;
    let primary = if caps.contains(&ThermostatMode) {
        (ThermostatMode, "thermostatMode")
    } else if caps.contains(&AirConditionerMode) {
        (AirConditionerMode, "airConditionerMode")
    } else {
        return None;
    };
    let heating = caps.contains(&ThermostatHeatingSetpoint);
    let cooling = caps.contains(&ThermostatCoolingSetpoint);
    let ac = caps.contains(&AirConditionerMode);
    let ac_fan = ac && caps.contains(&AirConditionerFanMode);

    let mut claim = Claim::new(Some(primary))
        .take(caps, ThermostatMode)
        .take(caps, AirConditionerMode)
        .take(caps, ThermostatHeatingSetpoint)
        .take(caps, ThermostatCoolingSetpoint)
        .take(caps, ThermostatOperatingState)
        .take(caps, ThermostatFanMode)
        .take(caps, TemperatureMeasurement)
        .feature(EntityFeature::HvacMode)
        .feature_if(heating || cooling, EntityFeature::TargetTemperature)
        .feature_if(heating && cooling, EntityFeature::TargetTemperatureRange)
        .feature_if(
            ac_fan || caps.contains(&ThermostatFanMode),
            EntityFeature::FanMode,
        );
    if ac_fan {
        claim = claim.take(caps, AirConditionerFanMode);
    }
    Some(claim)
}

fn claim_fan(component: &ComponentId, caps: &BTreeSet<Capability>) -> Option<Claim> {
    use Capability::*;
    if !caps.contains(&Switch) {
        return None;
    }
    let speed = caps.contains(&FanSpeed);
    let preset = caps.contains(&AirConditionerFanMode);
    // a component called "fan" is a fan even without speed control
    if !speed && !preset && component.as_str() != "fan" {
        return None;
    }
    Some(
        Claim::new(Some((Switch, "switch")))
            .take(caps, Switch)
            .take(caps, FanSpeed)
            .take(caps, AirConditionerFanMode)
            .feature(EntityFeature::TurnOn)
            .feature(EntityFeature::TurnOff)
            .feature_if(speed, EntityFeature::SetSpeed)
            .feature_if(preset, EntityFeature::PresetMode),
    )
}

fn claim_light(_: &ComponentId, caps: &BTreeSet<Capability>) -> Option<Claim> {
    use Capability::*;
    let level = caps.contains(&SwitchLevel);
    let color = caps.contains(&ColorControl);
    let temperature = caps.contains(&ColorTemperature);
    if !caps.contains(&Switch) || !(level || color || temperature) {
        return None;
    }
    Some(
        Claim::new(Some((Switch, "switch")))
            .take(caps, Switch)
            .take(caps, SwitchLevel)
            .take(caps, ColorControl)
            .take(caps, ColorTemperature)
            .feature(EntityFeature::TurnOn)
            .feature(EntityFeature::TurnOff)
            .feature_if(level, EntityFeature::Brightness)
            .feature_if(color, EntityFeature::Color)
            .feature_if(temperature, EntityFeature::ColorTemperature),
    )
}

fn claim_lock(_: &ComponentId, caps: &BTreeSet<Capability>) -> Option<Claim> {
    caps.contains(&Capability::Lock)
        .then(|| Claim::new(Some((Capability::Lock, "lock"))).take(caps, Capability::Lock))
}

fn claim_cover(_: &ComponentId, caps: &BTreeSet<Capability>) -> Option<Claim> {
    use Capability::*;
    let (primary, device_class) = if caps.contains(&WindowShade) {
        ((WindowShade, "windowShade"), "shade")
    } else if caps.contains(&GarageDoorControl) {
        ((GarageDoorControl, "door"), "garage")
    } else if caps.contains(&DoorControl) {
        ((DoorControl, "door"), "door")
    } else {
        return None;
    };
    let mut claim = Claim::new(Some(primary))
        .take(caps, WindowShade)
        .take(caps, WindowShadeLevel)
        .take(caps, GarageDoorControl)
        .take(caps, DoorControl)
        .feature(EntityFeature::Open)
        .feature(EntityFeature::Close)
        .feature_if(caps.contains(&WindowShade), EntityFeature::Pause)
        .feature_if(caps.contains(&WindowShadeLevel), EntityFeature::SetPosition);
    claim.device_class = Some(device_class);
    Some(claim)
}

fn claim_valve(_: &ComponentId, caps: &BTreeSet<Capability>) -> Option<Claim> {
    caps.contains(&Capability::Valve).then(|| {
        Claim::new(Some((Capability::Valve, "valve")))
            .take(caps, Capability::Valve)
            .feature(EntityFeature::Open)
            .feature(EntityFeature::Close)
    })
}

fn claim_switch(_: &ComponentId, caps: &BTreeSet<Capability>) -> Option<Claim> {
    caps.contains(&Capability::Switch).then(|| {
        Claim::new(Some((Capability::Switch, "switch")))
            .take(caps, Capability::Switch)
            .feature(EntityFeature::TurnOn)
            .feature(EntityFeature::TurnOff)
    })
}

/// Project a device onto host entities.
///
/// Pure and deterministic: the result depends only on `device` and is sorted
/// by `unique_id`. Capabilities without an entity type produce nothing.
pub fn map_to_entities(device: &Device) -> Vec<Entity> {
    let mut entities = Vec::new();

    for (component, capabilities) in &device.components {
        let mut remaining = capabilities.clone();
        let base_name = base_name(device, component);

        for strategy in COMPOSITE_STRATEGIES {
            let Some(claim) = (strategy.claim)(component, &remaining) else {
                continue;
            };
            for capability in &claim.capabilities {
                remaining.remove(capability);
            }
            let primary = claim
                .primary
                .map(|(cap, attr)| AttributeKey::new(component.clone(), cap, attr));
            let mut entity = Entity {
                unique_id: format!("{}.{}.{}", device.id, component, strategy.platform),
                device_id: device.id.clone(),
                component: component.clone(),
                platform: strategy.platform,
                name: base_name.clone(),
                capabilities: claim.capabilities,
                features: claim.features,
                primary,
                device_class: claim.device_class.map(str::to_owned),
                unit: None,
                state: EntityState::Unknown,
            };
            entity.state = entity_state(device, &entity);
            entities.push(entity);
        }

        for capability in remaining {
            match capability.role() {
                CapabilityRole::BinarySensor { device_class, .. } => {
                    let Some(attribute) = capability.schema().attributes.first() else {
                        continue;
                    };
                    let mut entity = Entity {
                        unique_id: format!("{}.{}.{}", device.id, component, capability),
                        device_id: device.id.clone(),
                        component: component.clone(),
                        platform: EntityPlatform::BinarySensor,
                        name: format!("{} {}", base_name, title_case(capability.id())),
                        capabilities: vec![capability],
                        features: BTreeSet::new(),
                        primary: Some(AttributeKey::new(
                            component.clone(),
                            capability,
                            attribute.name,
                        )),
                        device_class: Some(device_class.to_owned()),
                        unit: None,
                        state: EntityState::Unknown,
                    };
                    entity.state = entity_state(device, &entity);
                    entities.push(entity);
                }
                CapabilityRole::Sensor => {
                    for attribute in capability.schema().attributes {
                        if matches!(attribute.value_type, ValueType::Json) {
                            continue;
                        }
                        let key = AttributeKey::new(component.clone(), capability, attribute.name);
                        let unit = device
                            .snapshot
                            .get_entry(&key)
                            .and_then(|entry| entry.unit.clone())
                            .or_else(|| attribute.unit.map(str::to_owned));
                        let mut entity = Entity {
                            unique_id: format!(
                                "{}.{}.{}.{}",
                                device.id, component, capability, attribute.name
                            ),
                            device_id: device.id.clone(),
                            component: component.clone(),
                            platform: EntityPlatform::Sensor,
                            name: format!("{} {}", base_name, title_case(attribute.name)),
                            capabilities: vec![capability],
                            features: BTreeSet::new(),
                            primary: Some(key),
                            device_class: attribute.device_class.map(str::to_owned),
                            unit,
                            state: EntityState::Unknown,
                        };
                        entity.state = entity_state(device, &entity);
                        entities.push(entity);
                    }
                }
                CapabilityRole::None => {
                    log::trace!(
                        "[{}] no entity type for capability {} on {}",
                        device.id,
                        capability,
                        component
                    );
                }
            }
        }
    }

    entities.sort_by(|a, b| a.unique_id.cmp(&b.unique_id));
    entities
}

/// Current state of `entity` as derived from the device snapshot.
pub fn entity_state(device: &Device, entity: &Entity) -> EntityState {
    if !device.is_available() {
        return EntityState::Unavailable;
    }
    entity
        .primary
        .as_ref()
        .and_then(|key| device.snapshot.effective(key))
        .map(|value| EntityState::Value(value.clone()))
        .unwrap_or(EntityState::Unknown)
}

/// Speed and preset mode of a fan entity, `None` for other platforms.
pub fn fan_state(device: &Device, entity: &Entity) -> Option<FanState> {
    if entity.platform != EntityPlatform::Fan {
        return None;
    }
    let value = |capability: Capability, attribute: &str| {
        if !entity.capabilities.contains(&capability) {
            return None;
        }
        device
            .snapshot
            .effective(&AttributeKey::new(entity.component.clone(), capability, attribute))
    };
    let percentage = value(Capability::FanSpeed, "fanSpeed")
        .and_then(|speed| speed.as_i64())
        .map(fan_speed_to_percentage);
    let preset_mode = value(Capability::AirConditionerFanMode, "fanMode")
        .and_then(|mode| mode.as_str())
        .map(str::to_owned);
    let preset_modes = value(Capability::AirConditionerFanMode, "supportedAcFanModes")
        .map(|modes| {
            modes
                .to_json()
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|mode| mode.as_str().map(str::to_owned))
                .collect()
        })
        .unwrap_or_default();
    Some(FanState {
        percentage,
        preset_mode,
        preset_modes,
    })
}

/// Convert a `fanSpeed` value into a percentage of the speed range.
pub fn fan_speed_to_percentage(speed: i64) -> u8 {
    let (low, high) = FAN_SPEED_RANGE;
    let states = high - low + 1;
    let offset = speed.clamp(low - 1, high) - (low - 1);
    ((offset * 100) / states) as u8
}

/// Convert a percentage into a `fanSpeed` value; 0 means off.
pub fn percentage_to_fan_speed(percentage: u8) -> i64 {
    let (low, high) = FAN_SPEED_RANGE;
    let states = (high - low + 1) as f64;
    let percentage = percentage.min(100) as f64;
    ((states * percentage / 100.0).ceil() as i64 + (low - 1)).min(high)
}

fn base_name(device: &Device, component: &ComponentId) -> String {
    let label = if device.label.is_empty() {
        device.id.as_str()
    } else {
        device.label.as_str()
    };
    if component.is_main() {
        label.to_owned()
    } else {
        format!("{} {}", label, title_case(component.as_str()))
    }
}

/// `carbonDioxide` -> `Carbon Dioxide`
fn title_case(id: &str) -> String {
    let mut out = String::with_capacity(id.len() + 4);
    for (i, c) in id.chars().enumerate() {
        if i == 0 {
            out.extend(c.to_uppercase());
        } else if c.is_uppercase() {
            out.push(' ');
            out.push(c);
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("carbonDioxide"), "Carbon Dioxide");
        assert_eq!(title_case("battery"), "Battery");
        assert_eq!(title_case("fan"), "Fan");
    }

    #[test]
    fn test_fan_speed_percentages() {
        assert_eq!(fan_speed_to_percentage(0), 0);
        assert_eq!(fan_speed_to_percentage(1), 33);
        assert_eq!(fan_speed_to_percentage(2), 66);
        assert_eq!(fan_speed_to_percentage(3), 100);
        assert_eq!(percentage_to_fan_speed(0), 0);
        assert_eq!(percentage_to_fan_speed(1), 1);
        assert_eq!(percentage_to_fan_speed(33), 1);
        assert_eq!(percentage_to_fan_speed(50), 2);
        assert_eq!(percentage_to_fan_speed(100), 3);
    }
}
