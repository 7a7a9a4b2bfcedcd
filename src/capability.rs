use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

use crate::{SmartThingsError, ValueType};

/// Only schema version of the standard capabilities this crate knows.
pub const SUPPORTED_CAPABILITY_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttributeSchema {
    pub name: &'static str,
    pub value_type: ValueType,
    pub unit: Option<&'static str>,
    pub device_class: Option<&'static str>,
}

impl AttributeSchema {
    const fn new(name: &'static str, value_type: ValueType) -> Self {
        Self {
            name,
            value_type,
            unit: None,
            device_class: None,
        }
    }

    const fn unit(mut self, unit: &'static str) -> Self {
        self.unit = Some(unit);
        self
    }

    const fn class(mut self, device_class: &'static str) -> Self {
        self.device_class = Some(device_class);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArgumentSchema {
    pub name: &'static str,
    pub value_type: ValueType,
    pub optional: bool,
}

impl ArgumentSchema {
    const fn required(name: &'static str, value_type: ValueType) -> Self {
        Self {
            name,
            value_type,
            optional: false,
        }
    }

    const fn optional(name: &'static str, value_type: ValueType) -> Self {
        Self {
            name,
            value_type,
            optional: true,
        }
    }
}

/// Attribute change a command is expected to cause once accepted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandEffect {
    /// Set `attribute` to a fixed value.
    Set(&'static str, &'static str),
    /// Set `attribute` to the value of the argument at the given position.
    FromArgument(&'static str, usize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandSchema {
    pub name: &'static str,
    pub arguments: &'static [ArgumentSchema],
    pub effect: Option<CommandEffect>,
}

impl CommandSchema {
    const fn new(name: &'static str, arguments: &'static [ArgumentSchema]) -> Self {
        Self {
            name,
            arguments,
            effect: None,
        }
    }

    const fn sets(mut self, attribute: &'static str, value: &'static str) -> Self {
        self.effect = Some(CommandEffect::Set(attribute, value));
        self
    }

    const fn sets_from(mut self, attribute: &'static str, argument: usize) -> Self {
        self.effect = Some(CommandEffect::FromArgument(attribute, argument));
        self
    }
}

#[derive(Debug, PartialEq)]
pub struct CapabilitySchema {
    pub attributes: &'static [AttributeSchema],
    pub commands: &'static [CommandSchema],
}

/// How a capability is exposed when no composite platform claimed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityRole {
    /// A single on/off sensor; `on` lists the values that count as active.
    BinarySensor {
        on: &'static [&'static str],
        device_class: &'static str,
    },
    /// One sensor per scalar attribute.
    Sensor,
    /// No host entity exists for this capability.
    None,
}

macro_rules! capabilities {
    ($($variant:ident => $id:literal, $schema:ident;)*) => {
        /// Standard SmartThings capabilities known to the translator.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum Capability {
            $($variant,)*
        }

        impl Capability {
            pub const ALL: &'static [Capability] = &[$(Capability::$variant,)*];

            /// The SmartThings capability id, e.g. `switchLevel`.
            pub fn id(&self) -> &'static str {
                match self {
                    $(Capability::$variant => $id,)*
                }
            }

            pub fn from_id(id: &str) -> Option<Self> {
                match id {
                    $($id => Some(Capability::$variant),)*
                    _ => None,
                }
            }

            pub fn schema(&self) -> &'static CapabilitySchema {
                match self {
                    $(Capability::$variant => &$schema,)*
                }
            }
        }
    };
}

capabilities! {
    Switch => "switch", SWITCH;
    SwitchLevel => "switchLevel", SWITCH_LEVEL;
    ColorControl => "colorControl", COLOR_CONTROL;
    ColorTemperature => "colorTemperature", COLOR_TEMPERATURE;
    Lock => "lock", LOCK;
    TemperatureMeasurement => "temperatureMeasurement", TEMPERATURE_MEASUREMENT;
    RelativeHumidityMeasurement => "relativeHumidityMeasurement", RELATIVE_HUMIDITY_MEASUREMENT;
    IlluminanceMeasurement => "illuminanceMeasurement", ILLUMINANCE_MEASUREMENT;
    CarbonDioxideMeasurement => "carbonDioxideMeasurement", CARBON_DIOXIDE_MEASUREMENT;
    PowerMeter => "powerMeter", POWER_METER;
    EnergyMeter => "energyMeter", ENERGY_METER;
    VoltageMeasurement => "voltageMeasurement", VOLTAGE_MEASUREMENT;
    Battery => "battery", BATTERY;
    MotionSensor => "motionSensor", MOTION_SENSOR;
    ContactSensor => "contactSensor", CONTACT_SENSOR;
    PresenceSensor => "presenceSensor", PRESENCE_SENSOR;
    WaterSensor => "waterSensor", WATER_SENSOR;
    SmokeDetector => "smokeDetector", SMOKE_DETECTOR;
    CarbonMonoxideDetector => "carbonMonoxideDetector", CARBON_MONOXIDE_DETECTOR;
    AccelerationSensor => "accelerationSensor", ACCELERATION_SENSOR;
    TamperAlert => "tamperAlert", TAMPER_ALERT;
    Button => "button", BUTTON;
    ThermostatMode => "thermostatMode", THERMOSTAT_MODE;
    ThermostatHeatingSetpoint => "thermostatHeatingSetpoint", THERMOSTAT_HEATING_SETPOINT;
    ThermostatCoolingSetpoint => "thermostatCoolingSetpoint", THERMOSTAT_COOLING_SETPOINT;
    ThermostatOperatingState => "thermostatOperatingState", THERMOSTAT_OPERATING_STATE;
    ThermostatFanMode => "thermostatFanMode", THERMOSTAT_FAN_MODE;
    AirConditionerMode => "airConditionerMode", AIR_CONDITIONER_MODE;
    AirConditionerFanMode => "airConditionerFanMode", AIR_CONDITIONER_FAN_MODE;
    FanSpeed => "fanSpeed", FAN_SPEED;
    WindowShade => "windowShade", WINDOW_SHADE;
    WindowShadeLevel => "windowShadeLevel", WINDOW_SHADE_LEVEL;
    DoorControl => "doorControl", DOOR_CONTROL;
    GarageDoorControl => "garageDoorControl", GARAGE_DOOR_CONTROL;
    Valve => "valve", VALVE;
    Refresh => "refresh", REFRESH;
    HealthCheck => "healthCheck", HEALTH_CHECK;
    Configuration => "configuration", CONFIGURATION;
}

impl Capability {
    /// Resolve a capability reference as advertised by a device.
    ///
    /// Unknown ids (custom or vendor namespaced capabilities) and unknown
    /// schema versions are reported as `Schema` errors so the caller can skip
    /// the capability.
    pub fn resolve(id: &str, version: u32) -> Result<Self, SmartThingsError> {
        let capability = Capability::from_id(id)
            .ok_or_else(|| SmartThingsError::schema(id, "unknown capability"))?;
        if version != SUPPORTED_CAPABILITY_VERSION {
            return Err(SmartThingsError::schema(
                id,
                format!("unsupported schema version {}", version),
            ));
        }
        Ok(capability)
    }

    pub fn attribute(&self, name: &str) -> Option<&'static AttributeSchema> {
        self.schema().attributes.iter().find(|a| a.name == name)
    }

    pub fn command(&self, name: &str) -> Option<&'static CommandSchema> {
        self.schema().commands.iter().find(|c| c.name == name)
    }

    pub fn role(&self) -> CapabilityRole {
        use Capability::*;
        let binary = |on: &'static [&'static str], device_class: &'static str| {
            CapabilityRole::BinarySensor { on, device_class }
        };
        match self {
            MotionSensor => binary(&["active"], "motion"),
            ContactSensor => binary(&["open"], "door"),
            PresenceSensor => binary(&["present"], "presence"),
            WaterSensor => binary(&["wet"], "moisture"),
            SmokeDetector => binary(&["detected"], "smoke"),
            CarbonMonoxideDetector => binary(&["detected"], "carbon_monoxide"),
            AccelerationSensor => binary(&["active"], "moving"),
            TamperAlert => binary(&["detected"], "tamper"),
            Refresh | HealthCheck | Configuration => CapabilityRole::None,
            _ => CapabilityRole::Sensor,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Capability {
    type Err = SmartThingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::from_id(s).ok_or_else(|| SmartThingsError::schema(s, "unknown capability"))
    }
}

impl Serialize for Capability {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.id())
    }
}

impl<'de> Deserialize<'de> for Capability {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Capability::from_id(&s)
            .ok_or_else(|| de::Error::custom(format!("Unknown capability: {}", s)))
    }
}

const SETPOINT: ValueType = ValueType::Number {
    min: Some(-460.0),
    max: Some(10000.0),
};
const THERMOSTAT_MODES: &[&str] = &["auto", "cool", "eco", "rush hour", "emergency heat", "heat", "off"];
const THERMOSTAT_FAN_MODES: &[&str] = &["auto", "circulate", "followschedule", "on"];
const DOOR_STATES: &[&str] = &["closed", "closing", "open", "opening", "unknown"];
const DETECTOR_STATES: &[&str] = &["clear", "detected", "tested"];

static SWITCH: CapabilitySchema = CapabilitySchema {
    attributes: &[AttributeSchema::new("switch", ValueType::Enum(&["on", "off"]))],
    commands: &[
        CommandSchema::new("on", &[]).sets("switch", "on"),
        CommandSchema::new("off", &[]).sets("switch", "off"),
    ],
};

static SWITCH_LEVEL: CapabilitySchema = CapabilitySchema {
    attributes: &[AttributeSchema::new("level", ValueType::PERCENT).unit("%")],
    commands: &[CommandSchema::new(
        "setLevel",
        &[
            ArgumentSchema::required("level", ValueType::PERCENT),
            ArgumentSchema::optional("rate", ValueType::Integer { min: Some(0), max: None }),
        ],
    )
    .sets_from("level", 0)],
};

static COLOR_CONTROL: CapabilitySchema = CapabilitySchema {
    attributes: &[
        AttributeSchema::new("hue", ValueType::Number { min: Some(0.0), max: Some(100.0) }).unit("%"),
        AttributeSchema::new("saturation", ValueType::Number { min: Some(0.0), max: Some(100.0) })
            .unit("%"),
        AttributeSchema::new("color", ValueType::String),
    ],
    commands: &[
        CommandSchema::new(
            "setHue",
            &[ArgumentSchema::required("hue", ValueType::Number { min: Some(0.0), max: Some(100.0) })],
        )
        .sets_from("hue", 0),
        CommandSchema::new(
            "setSaturation",
            &[ArgumentSchema::required(
                "saturation",
                ValueType::Number { min: Some(0.0), max: Some(100.0) },
            )],
        )
        .sets_from("saturation", 0),
        CommandSchema::new("setColor", &[ArgumentSchema::required("color", ValueType::Json)]),
    ],
};

static COLOR_TEMPERATURE: CapabilitySchema = CapabilitySchema {
    attributes: &[AttributeSchema::new(
        "colorTemperature",
        ValueType::Integer { min: Some(1), max: Some(30000) },
    )
    .unit("K")],
    commands: &[CommandSchema::new(
        "setColorTemperature",
        &[ArgumentSchema::required(
            "temperature",
            ValueType::Integer { min: Some(1), max: Some(30000) },
        )],
    )
    .sets_from("colorTemperature", 0)],
};

static LOCK: CapabilitySchema = CapabilitySchema {
    attributes: &[AttributeSchema::new(
        "lock",
        ValueType::Enum(&["locked", "unknown", "unlocked", "unlocked with timeout"]),
    )],
    commands: &[
        CommandSchema::new("lock", &[]).sets("lock", "locked"),
        CommandSchema::new("unlock", &[]).sets("lock", "unlocked"),
    ],
};

static TEMPERATURE_MEASUREMENT: CapabilitySchema = CapabilitySchema {
    attributes: &[AttributeSchema::new("temperature", SETPOINT).class("temperature")],
    commands: &[],
};

static RELATIVE_HUMIDITY_MEASUREMENT: CapabilitySchema = CapabilitySchema {
    attributes: &[AttributeSchema::new("humidity", ValueType::Number { min: Some(0.0), max: Some(100.0) })
        .unit("%")
        .class("humidity")],
    commands: &[],
};

static ILLUMINANCE_MEASUREMENT: CapabilitySchema = CapabilitySchema {
    attributes: &[AttributeSchema::new("illuminance", ValueType::NUMBER)
        .unit("lx")
        .class("illuminance")],
    commands: &[],
};

static CARBON_DIOXIDE_MEASUREMENT: CapabilitySchema = CapabilitySchema {
    attributes: &[AttributeSchema::new("carbonDioxide", ValueType::NUMBER)
        .unit("ppm")
        .class("carbon_dioxide")],
    commands: &[],
};

static POWER_METER: CapabilitySchema = CapabilitySchema {
    attributes: &[AttributeSchema::new("power", ValueType::NUMBER).unit("W").class("power")],
    commands: &[],
};

static ENERGY_METER: CapabilitySchema = CapabilitySchema {
    attributes: &[AttributeSchema::new("energy", ValueType::NUMBER).unit("kWh").class("energy")],
    commands: &[],
};

static VOLTAGE_MEASUREMENT: CapabilitySchema = CapabilitySchema {
    attributes: &[AttributeSchema::new("voltage", ValueType::NUMBER).unit("V").class("voltage")],
    commands: &[],
};

static BATTERY: CapabilitySchema = CapabilitySchema {
    attributes: &[AttributeSchema::new("battery", ValueType::PERCENT)
        .unit("%")
        .class("battery")],
    commands: &[],
};

static MOTION_SENSOR: CapabilitySchema = CapabilitySchema {
    attributes: &[AttributeSchema::new("motion", ValueType::Enum(&["active", "inactive"]))],
    commands: &[],
};

static CONTACT_SENSOR: CapabilitySchema = CapabilitySchema {
    attributes: &[AttributeSchema::new("contact", ValueType::Enum(&["closed", "open"]))],
    commands: &[],
};

static PRESENCE_SENSOR: CapabilitySchema = CapabilitySchema {
    attributes: &[AttributeSchema::new("presence", ValueType::Enum(&["present", "not present"]))],
    commands: &[],
};

static WATER_SENSOR: CapabilitySchema = CapabilitySchema {
    attributes: &[AttributeSchema::new("water", ValueType::Enum(&["dry", "wet"]))],
    commands: &[],
};

static SMOKE_DETECTOR: CapabilitySchema = CapabilitySchema {
    attributes: &[AttributeSchema::new("smoke", ValueType::Enum(DETECTOR_STATES))],
    commands: &[],
};

static CARBON_MONOXIDE_DETECTOR: CapabilitySchema = CapabilitySchema {
    attributes: &[AttributeSchema::new("carbonMonoxide", ValueType::Enum(DETECTOR_STATES))],
    commands: &[],
};

static ACCELERATION_SENSOR: CapabilitySchema = CapabilitySchema {
    attributes: &[AttributeSchema::new("acceleration", ValueType::Enum(&["active", "inactive"]))],
    commands: &[],
};

static TAMPER_ALERT: CapabilitySchema = CapabilitySchema {
    attributes: &[AttributeSchema::new("tamper", ValueType::Enum(&["clear", "detected"]))],
    commands: &[],
};

static BUTTON: CapabilitySchema = CapabilitySchema {
    attributes: &[
        AttributeSchema::new(
            "button",
            ValueType::Enum(&[
                "pushed", "held", "double", "pushed_2x", "pushed_3x", "down", "down_hold", "up",
                "up_hold",
            ]),
        ),
        AttributeSchema::new("numberOfButtons", ValueType::Integer { min: Some(0), max: None }),
        AttributeSchema::new("supportedButtonValues", ValueType::Json),
    ],
    commands: &[],
};

static THERMOSTAT_MODE: CapabilitySchema = CapabilitySchema {
    attributes: &[
        AttributeSchema::new("thermostatMode", ValueType::Enum(THERMOSTAT_MODES)),
        AttributeSchema::new("supportedThermostatModes", ValueType::Json),
    ],
    commands: &[
        CommandSchema::new(
            "setThermostatMode",
            &[ArgumentSchema::required("mode", ValueType::Enum(THERMOSTAT_MODES))],
        )
        .sets_from("thermostatMode", 0),
        CommandSchema::new("auto", &[]).sets("thermostatMode", "auto"),
        CommandSchema::new("cool", &[]).sets("thermostatMode", "cool"),
        CommandSchema::new("heat", &[]).sets("thermostatMode", "heat"),
        CommandSchema::new("off", &[]).sets("thermostatMode", "off"),
    ],
};

static THERMOSTAT_HEATING_SETPOINT: CapabilitySchema = CapabilitySchema {
    attributes: &[AttributeSchema::new("heatingSetpoint", SETPOINT)],
    commands: &[CommandSchema::new(
        "setHeatingSetpoint",
        &[ArgumentSchema::required("setpoint", SETPOINT)],
    )
    .sets_from("heatingSetpoint", 0)],
};

static THERMOSTAT_COOLING_SETPOINT: CapabilitySchema = CapabilitySchema {
    attributes: &[AttributeSchema::new("coolingSetpoint", SETPOINT)],
    commands: &[CommandSchema::new(
        "setCoolingSetpoint",
        &[ArgumentSchema::required("setpoint", SETPOINT)],
    )
    .sets_from("coolingSetpoint", 0)],
};

static THERMOSTAT_OPERATING_STATE: CapabilitySchema = CapabilitySchema {
    attributes: &[AttributeSchema::new(
        "thermostatOperatingState",
        ValueType::Enum(&[
            "cooling",
            "fan only",
            "heating",
            "idle",
            "pending cool",
            "pending heat",
            "vent economizer",
        ]),
    )],
    commands: &[],
};

static THERMOSTAT_FAN_MODE: CapabilitySchema = CapabilitySchema {
    attributes: &[
        AttributeSchema::new("thermostatFanMode", ValueType::Enum(THERMOSTAT_FAN_MODES)),
        AttributeSchema::new("supportedThermostatFanModes", ValueType::Json),
    ],
    commands: &[CommandSchema::new(
        "setThermostatFanMode",
        &[ArgumentSchema::required("mode", ValueType::Enum(THERMOSTAT_FAN_MODES))],
    )
    .sets_from("thermostatFanMode", 0)],
};

static AIR_CONDITIONER_MODE: CapabilitySchema = CapabilitySchema {
    attributes: &[
        AttributeSchema::new("airConditionerMode", ValueType::String),
        AttributeSchema::new("supportedAcModes", ValueType::Json),
    ],
    commands: &[CommandSchema::new(
        "setAirConditionerMode",
        &[ArgumentSchema::required("mode", ValueType::String)],
    )
    .sets_from("airConditionerMode", 0)],
};

static AIR_CONDITIONER_FAN_MODE: CapabilitySchema = CapabilitySchema {
    attributes: &[
        AttributeSchema::new("fanMode", ValueType::String),
        AttributeSchema::new("supportedAcFanModes", ValueType::Json),
    ],
    commands: &[CommandSchema::new(
        "setFanMode",
        &[ArgumentSchema::required("fanMode", ValueType::String)],
    )
    .sets_from("fanMode", 0)],
};

static FAN_SPEED: CapabilitySchema = CapabilitySchema {
    attributes: &[AttributeSchema::new("fanSpeed", ValueType::Integer { min: Some(0), max: None })],
    commands: &[CommandSchema::new(
        "setFanSpeed",
        &[ArgumentSchema::required("speed", ValueType::Integer { min: Some(0), max: None })],
    )
    .sets_from("fanSpeed", 0)],
};

static WINDOW_SHADE: CapabilitySchema = CapabilitySchema {
    attributes: &[
        AttributeSchema::new(
            "windowShade",
            ValueType::Enum(&[
                "closed",
                "closing",
                "open",
                "opening",
                "partially open",
                "paused",
                "unknown",
            ]),
        ),
        AttributeSchema::new("supportedWindowShadeCommands", ValueType::Json),
    ],
    commands: &[
        CommandSchema::new("open", &[]),
        CommandSchema::new("close", &[]),
        CommandSchema::new("pause", &[]),
    ],
};

static WINDOW_SHADE_LEVEL: CapabilitySchema = CapabilitySchema {
    attributes: &[AttributeSchema::new("shadeLevel", ValueType::PERCENT).unit("%")],
    commands: &[CommandSchema::new(
        "setShadeLevel",
        &[ArgumentSchema::required("shadeLevel", ValueType::PERCENT)],
    )
    .sets_from("shadeLevel", 0)],
};

static DOOR_CONTROL: CapabilitySchema = CapabilitySchema {
    attributes: &[AttributeSchema::new("door", ValueType::Enum(DOOR_STATES))],
    commands: &[CommandSchema::new("open", &[]), CommandSchema::new("close", &[])],
};

static GARAGE_DOOR_CONTROL: CapabilitySchema = CapabilitySchema {
    attributes: &[AttributeSchema::new("door", ValueType::Enum(DOOR_STATES))],
    commands: &[CommandSchema::new("open", &[]), CommandSchema::new("close", &[])],
};

static VALVE: CapabilitySchema = CapabilitySchema {
    attributes: &[AttributeSchema::new("valve", ValueType::Enum(&["closed", "open"]))],
    commands: &[
        CommandSchema::new("open", &[]).sets("valve", "open"),
        CommandSchema::new("close", &[]).sets("valve", "closed"),
    ],
};

static REFRESH: CapabilitySchema = CapabilitySchema {
    attributes: &[],
    commands: &[CommandSchema::new("refresh", &[])],
};

static HEALTH_CHECK: CapabilitySchema = CapabilitySchema {
    attributes: &[
        AttributeSchema::new("checkInterval", ValueType::Integer { min: Some(0), max: None }).unit("s"),
        AttributeSchema::new("healthStatus", ValueType::Enum(&["online", "offline", "unhealthy"])),
    ],
    commands: &[CommandSchema::new("ping", &[])],
};

static CONFIGURATION: CapabilitySchema = CapabilitySchema {
    attributes: &[],
    commands: &[CommandSchema::new("configure", &[])],
};
