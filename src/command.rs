use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::{
    entity_mapping::percentage_to_fan_speed, AttributeKey, AttributeValue, Capability,
    CommandEffect, CommandSchema, ComponentId, DeviceId, Entity, SmartThingsError,
};

/// A command as requested by the host for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    /// Restrict resolution to one capability of the entity.
    #[serde(default)]
    pub capability: Option<Capability>,
    pub command: String,
    #[serde(default)]
    pub arguments: Vec<JsonValue>,
}

impl CommandRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            capability: None,
            command: command.into(),
            arguments: Vec::new(),
        }
    }

    pub fn capability(mut self, capability: Capability) -> Self {
        self.capability = Some(capability);
        self
    }

    pub fn arg(mut self, value: impl Into<JsonValue>) -> Self {
        self.arguments.push(value.into());
        self
    }

    /// Set a fan to a percentage of its speed range; 0 turns it off.
    pub fn fan_percentage(percentage: u8) -> Self {
        match percentage_to_fan_speed(percentage) {
            0 => Self::new("off").capability(Capability::Switch),
            speed => Self::new("setFanSpeed")
                .capability(Capability::FanSpeed)
                .arg(speed),
        }
    }
}

/// Command payload in the shape the SmartThings commands endpoint expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCommand {
    pub component: ComponentId,
    pub capability: Capability,
    pub command: String,
    pub arguments: Vec<JsonValue>,
}

/// A validated command, ready to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedCommand {
    pub device_id: DeviceId,
    pub command: DeviceCommand,
    /// Optimistic state change to record once the cloud accepted the command.
    pub effect: Option<(AttributeKey, AttributeValue)>,
}

/// Validate `request` against the command schemas of the entity's
/// capabilities. Pure: nothing is sent and no state is touched.
pub fn prepare_command(
    entity: &Entity,
    request: &CommandRequest,
) -> Result<PreparedCommand, SmartThingsError> {
    let (capability, schema) = resolve_command(entity, request)?;

    let required = schema.arguments.iter().filter(|a| !a.optional).count();
    if request.arguments.len() < required || request.arguments.len() > schema.arguments.len() {
        return Err(SmartThingsError::Validation(format!(
            "{}.{} expects {}..={} arguments, got {}",
            capability,
            schema.name,
            required,
            schema.arguments.len(),
            request.arguments.len()
        )));
    }

    let validated = schema
        .arguments
        .iter()
        .zip(&request.arguments)
        .map(|(arg_schema, value)| {
            arg_schema.value_type.validate(value).map_err(|reason| {
                SmartThingsError::Validation(format!(
                    "{}.{} argument [{}]: {}",
                    capability, schema.name, arg_schema.name, reason
                ))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let effect = schema.effect.and_then(|effect| {
        let (attribute, value) = match effect {
            CommandEffect::Set(attribute, value) => (attribute, AttributeValue::from(value)),
            CommandEffect::FromArgument(attribute, idx) => (attribute, validated.get(idx)?.clone()),
        };
        Some((
            AttributeKey::new(entity.component.clone(), capability, attribute),
            value,
        ))
    });

    Ok(PreparedCommand {
        device_id: entity.device_id.clone(),
        command: DeviceCommand {
            component: entity.component.clone(),
            capability,
            command: schema.name.to_owned(),
            arguments: request.arguments.clone(),
        },
        effect,
    })
}

fn resolve_command(
    entity: &Entity,
    request: &CommandRequest,
) -> Result<(Capability, &'static CommandSchema), SmartThingsError> {
    if let Some(capability) = request.capability {
        if !entity.capabilities.contains(&capability) {
            return Err(SmartThingsError::Validation(format!(
                "entity [{}] has no capability {}",
                entity.unique_id, capability
            )));
        }
        return capability
            .command(&request.command)
            .map(|schema| (capability, schema))
            .ok_or_else(|| {
                SmartThingsError::Validation(format!(
                    "{} has no command {}",
                    capability, request.command
                ))
            });
    }
    entity
        .capabilities
        .iter()
        .find_map(|capability| {
            capability
                .command(&request.command)
                .map(|schema| (*capability, schema))
        })
        .ok_or_else(|| {
            SmartThingsError::Validation(format!(
                "command {} is not supported by entity [{}]",
                request.command, entity.unique_id
            ))
        })
}
