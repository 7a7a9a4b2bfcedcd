#[cfg(test)]
mod tests {
    use hc_smartthings::*;
    use std::time::Duration;

    #[test]
    fn test_yaml_config() {
        let yaml = r#"
refresh_interval_secs: 120
request_timeout_secs: 5
devices:
  include:
    - label: "^(Kitchen|Hall)"
  exclude:
    - id: "abc-123"
    - capability: lock
"#;
        let config: TranslatorConfig = serde_yml::from_str(yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.refresh_interval(), Duration::from_secs(120));
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.channel_size, TranslatorConfig::default().channel_size);
        assert_eq!(config.devices.include.len(), 1);
        assert_eq!(config.devices.exclude[0].id.as_deref(), Some("abc-123"));

        let filter = config.devices.compile().unwrap();
        let hall = Device::new("d1", "Hall Light").with_capabilities([Capability::Switch]);
        let excluded = Device::new("abc-123", "Kitchen Plug").with_capabilities([Capability::Switch]);
        let lock = Device::new("d3", "Kitchen Door").with_capabilities([Capability::Lock]);
        assert!(filter.accepts(&hall));
        assert!(!filter.accepts(&excluded));
        assert!(!filter.accepts(&lock));
    }

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config: TranslatorConfig = serde_yml::from_str("{}").unwrap();
        assert_eq!(config, TranslatorConfig::default());
        assert_eq!(config.api_base_url, "https://api.smartthings.com/v1");
    }

    #[test]
    fn test_invalid_yaml_config() {
        let config: TranslatorConfig = serde_yml::from_str(
            r#"
devices:
  exclude:
    - capability: teleporter
"#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(SmartThingsError::Config(_))
        ));
        assert!(serde_yml::from_str::<TranslatorConfig>("refresh_interval: 10").is_err());
        let config: TranslatorConfig =
            serde_yml::from_str("refresh_interval_secs: 1\nrequest_timeout_secs: 5").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_schema() {
        let schema = serde_json::to_value(config_schema()).unwrap();
        let properties = schema["properties"].as_object().unwrap();
        for field in [
            "api_base_url",
            "refresh_interval_secs",
            "request_timeout_secs",
            "channel_size",
            "devices",
        ] {
            assert!(properties.contains_key(field), "missing {}", field);
        }
    }
}
