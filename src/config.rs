use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{Capability, Device, SmartThingsError, SmartThingsResult};

pub const DEFAULT_API_BASE_URL: &str = "https://api.smartthings.com/v1";

/// Translator settings as read from the host configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct TranslatorConfig {
    pub api_base_url: String,
    /// Interval between full device syncs.
    pub refresh_interval_secs: u64,
    /// Upper bound for every single remote call.
    pub request_timeout_secs: u64,
    pub retry_initial_delay_ms: u64,
    pub retry_max_delay_secs: u64,
    /// Capacity of the worker's inbound and outbound channels.
    pub channel_size: usize,
    pub devices: DeviceFilter,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_owned(),
            refresh_interval_secs: 300,
            request_timeout_secs: 10,
            retry_initial_delay_ms: 1_000,
            retry_max_delay_secs: 300,
            channel_size: 256,
            devices: DeviceFilter::default(),
        }
    }
}

impl TranslatorConfig {
    pub fn from_json(json: &str) -> SmartThingsResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SmartThingsResult<()> {
        if self.request_timeout_secs == 0 {
            return Err(SmartThingsError::Config(
                "request_timeout_secs must be greater than 0".to_owned(),
            ));
        }
        if self.refresh_interval_secs < self.request_timeout_secs {
            return Err(SmartThingsError::Config(format!(
                "refresh_interval_secs ({}) must not be shorter than request_timeout_secs ({})",
                self.refresh_interval_secs, self.request_timeout_secs
            )));
        }
        if self.channel_size == 0 {
            return Err(SmartThingsError::Config(
                "channel_size must be greater than 0".to_owned(),
            ));
        }
        if self.retry_initial_delay_ms > self.retry_max_delay_secs.saturating_mul(1000) {
            return Err(SmartThingsError::Config(
                "retry_initial_delay_ms exceeds retry_max_delay_secs".to_owned(),
            ));
        }
        self.devices.compile()?;
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_initial_delay(&self) -> Duration {
        Duration::from_millis(self.retry_initial_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_secs(self.retry_max_delay_secs)
    }
}

/// JSON schema of `TranslatorConfig`, for host configuration UIs.
pub fn config_schema() -> schemars::Schema {
    schemars::schema_for!(TranslatorConfig)
}

/// Selects which devices of the account are translated.
///
/// A device is translated if it matches any `include` rule (or `include` is
/// empty) and no `exclude` rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceFilter {
    pub include: Vec<DeviceMatcher>,
    pub exclude: Vec<DeviceMatcher>,
}

/// All given fields must match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceMatcher {
    /// Exact device id.
    pub id: Option<String>,
    /// Regular expression matched against the device label.
    pub label: Option<String>,
    /// Capability id the device must advertise on any component.
    pub capability: Option<String>,
}

impl DeviceFilter {
    pub fn compile(&self) -> SmartThingsResult<CompiledDeviceFilter> {
        let compile_all = |matchers: &[DeviceMatcher]| {
            matchers
                .iter()
                .map(DeviceMatcher::compile)
                .collect::<SmartThingsResult<Vec<_>>>()
        };
        Ok(CompiledDeviceFilter {
            include: compile_all(&self.include)?,
            exclude: compile_all(&self.exclude)?,
        })
    }
}

impl DeviceMatcher {
    fn compile(&self) -> SmartThingsResult<CompiledMatcher> {
        let label = self
            .label
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|err| SmartThingsError::Config(format!("invalid label pattern: {}", err)))?;
        let capability = self
            .capability
            .as_deref()
            .map(|id| {
                Capability::from_id(id).ok_or_else(|| {
                    SmartThingsError::Config(format!("unknown capability in filter: {}", id))
                })
            })
            .transpose()?;
        Ok(CompiledMatcher {
            id: self.id.clone(),
            label,
            capability,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompiledDeviceFilter {
    include: Vec<CompiledMatcher>,
    exclude: Vec<CompiledMatcher>,
}

#[derive(Debug, Clone)]
struct CompiledMatcher {
    id: Option<String>,
    label: Option<Regex>,
    capability: Option<Capability>,
}

impl CompiledMatcher {
    fn matches(&self, device: &Device) -> bool {
        self.id.as_ref().is_none_or(|id| device.id.as_str() == id)
            && self
                .label
                .as_ref()
                .is_none_or(|label| label.is_match(&device.label))
            && self.capability.is_none_or(|capability| {
                device
                    .components
                    .values()
                    .any(|caps| caps.contains(&capability))
            })
    }
}

impl CompiledDeviceFilter {
    pub fn accepts(&self, device: &Device) -> bool {
        (self.include.is_empty() || self.include.iter().any(|m| m.matches(device)))
            && !self.exclude.iter().any(|m| m.matches(device))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(TranslatorConfig::default().validate().is_ok());
        let config = TranslatorConfig::from_json(r#"{"refresh_interval_secs": 60}"#).unwrap();
        assert_eq!(config.refresh_interval(), Duration::from_secs(60));
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
    }

    #[test]
    fn test_invalid_config() {
        assert!(TranslatorConfig::from_json(r#"{"request_timeout_secs": 0}"#).is_err());
        assert!(TranslatorConfig::from_json(r#"{"unknown": 1}"#).is_err());
        let config = TranslatorConfig {
            devices: DeviceFilter {
                include: vec![DeviceMatcher {
                    label: Some("([".to_owned()),
                    ..Default::default()
                }],
                exclude: vec![],
            },
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SmartThingsError::Config(_))
        ));
    }

    #[test]
    fn test_filter() {
        let filter = DeviceFilter {
            include: vec![DeviceMatcher {
                label: Some("^Kitchen".to_owned()),
                ..Default::default()
            }],
            exclude: vec![DeviceMatcher {
                capability: Some("lock".to_owned()),
                ..Default::default()
            }],
        }
        .compile()
        .unwrap();
        let lamp = Device::new("d1", "Kitchen Lamp").with_capabilities([Capability::Switch]);
        let lock = Device::new("d2", "Kitchen Door").with_capabilities([Capability::Lock]);
        let other = Device::new("d3", "Hall Lamp").with_capabilities([Capability::Switch]);
        assert!(filter.accepts(&lamp));
        assert!(!filter.accepts(&lock));
        assert!(!filter.accepts(&other));
        assert!(CompiledDeviceFilter::default().accepts(&other));
    }

    #[test]
    fn test_schema_lists_fields() {
        let schema = serde_json::to_value(config_schema()).unwrap();
        assert!(schema["properties"]["refresh_interval_secs"].is_object());
        assert!(schema["properties"]["devices"].is_object());
    }
}
