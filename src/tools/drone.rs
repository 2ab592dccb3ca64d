//! 无人机配置动作：封闭的 tagged union，每个变体携带自己的强类型参数
//!
//! 核心只负责校验并返回 DroneAction，真正修改配置的是调用方（`DroneConfiguration::apply`）。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::tools::schema::{FieldKind, FieldSpec, ToolSchema, ValidationError};

macro_rules! choice_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $label)] $variant,)+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }

            pub fn labels() -> Vec<&'static str> {
                Self::ALL.iter().map(|v| v.as_str()).collect()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

choice_enum!(
    /// 机型
    DroneType {
        FixedWing => "Fixed-wing",
        RotaryWing => "Rotary-wing",
    }
);

choice_enum!(
    MissionPurpose {
        Surveillance => "Surveillance",
        Photography => "Photography",
        Delivery => "Delivery",
        Mapping => "Mapping",
        Other => "Other",
    }
);

choice_enum!(
    Motor {
        LeopardLc3542 => "Leopard LC3542 1250KV",
        SunnyskyX2814 => "Sunnysky X2814 1000KV",
    }
);

choice_enum!(
    FlightController {
        CuavX7Pro => "CUAV X7 Pro",
        MatekH743Wing => "Matek H743-WING",
    }
);

pub const PROPELLER_SCALE_MIN: f64 = 0.5;
pub const PROPELLER_SCALE_MAX: f64 = 2.5;
pub const WING_SPAN_MIN: f64 = 2.0;
pub const WING_SPAN_MAX: f64 = 5.0;
pub const PAYLOAD_KG_MAX: f64 = 25.0;
pub const FLIGHT_TIME_MIN_MAX: f64 = 600.0;
pub const MAX_RANGE_KM_MAX: f64 = 500.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SetDroneTypeArgs {
    #[serde(rename = "type")]
    pub drone_type: DroneType,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPropellerSizeArgs {
    pub propeller_scale: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetWingSpanArgs {
    pub wing_span: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SetMissionPurposeArgs {
    pub purpose: MissionPurpose,
}

/// 任务需求：载荷（kg）、续航（分钟）、航程（km）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetMissionRequirementsArgs {
    pub payload_kg: f64,
    pub flight_time_min: f64,
    pub max_range_km: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SelectMotorArgs {
    pub model: Motor,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SelectFlightControllerArgs {
    pub model: FlightController,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResetConfigurationArgs {}

/// 已校验的配置动作；序列化为 `{"name": ..., "args": {...}}`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "args")]
pub enum DroneAction {
    #[serde(rename = "setDroneType")]
    SetDroneType(SetDroneTypeArgs),
    #[serde(rename = "setPropellerSize")]
    SetPropellerSize(SetPropellerSizeArgs),
    #[serde(rename = "setWingSpan")]
    SetWingSpan(SetWingSpanArgs),
    #[serde(rename = "setMissionPurpose")]
    SetMissionPurpose(SetMissionPurposeArgs),
    #[serde(rename = "setMissionRequirements")]
    SetMissionRequirements(SetMissionRequirementsArgs),
    #[serde(rename = "selectMotor")]
    SelectMotor(SelectMotorArgs),
    #[serde(rename = "selectFlightController")]
    SelectFlightController(SelectFlightControllerArgs),
    #[serde(rename = "resetConfiguration")]
    ResetConfiguration(ResetConfigurationArgs),
}

impl DroneAction {
    pub const NAMES: &'static [&'static str] = &[
        "setDroneType",
        "setPropellerSize",
        "setWingSpan",
        "setMissionPurpose",
        "setMissionRequirements",
        "selectMotor",
        "selectFlightController",
        "resetConfiguration",
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DroneAction::SetDroneType(_) => "setDroneType",
            DroneAction::SetPropellerSize(_) => "setPropellerSize",
            DroneAction::SetWingSpan(_) => "setWingSpan",
            DroneAction::SetMissionPurpose(_) => "setMissionPurpose",
            DroneAction::SetMissionRequirements(_) => "setMissionRequirements",
            DroneAction::SelectMotor(_) => "selectMotor",
            DroneAction::SelectFlightController(_) => "selectFlightController",
            DroneAction::ResetConfiguration(_) => "resetConfiguration",
        }
    }

    /// 由已通过 schema 校验的参数构造
    pub fn from_validated(name: &str, args: Map<String, Value>) -> Result<Self, ValidationError> {
        if !Self::NAMES.contains(&name) {
            return Err(ValidationError::UnknownTool(name.to_string()));
        }
        serde_json::from_value(serde_json::json!({ "name": name, "args": Value::Object(args) })).map_err(|e| {
            ValidationError::Malformed {
                tool: name.to_string(),
                reason: e.to_string(),
            }
        })
    }

    /// 参数对象（wire 格式）
    pub fn args(&self) -> Value {
        serde_json::to_value(self)
            .ok()
            .and_then(|mut v| v.get_mut("args").map(Value::take))
            .unwrap_or_else(|| Value::Object(Map::new()))
    }

    /// 由参数直接生成的确认消息，无需再调用模型
    pub fn confirmation(&self) -> String {
        match self {
            DroneAction::SetDroneType(a) => format!("Switched the drone model to {}.", a.drone_type),
            DroneAction::SetPropellerSize(a) => format!("Propeller scale set to {}.", a.propeller_scale),
            DroneAction::SetWingSpan(a) => format!("Wingspan set to {} m.", a.wing_span),
            DroneAction::SetMissionPurpose(a) => format!("Mission purpose set to {}.", a.purpose),
            DroneAction::SetMissionRequirements(a) => format!(
                "Mission requirements set: {} kg payload, {} min flight time, {} km range.",
                a.payload_kg, a.flight_time_min, a.max_range_km
            ),
            DroneAction::SelectMotor(a) => format!("Motor {} selected.", a.model),
            DroneAction::SelectFlightController(a) => format!("Flight controller {} selected.", a.model),
            DroneAction::ResetConfiguration(_) => "Configuration reset to defaults.".to_string(),
        }
    }

    /// 全部配置工具的声明
    pub fn catalog() -> Vec<ToolSchema> {
        vec![
            ToolSchema::new(
                "setDroneType",
                "Changes the drone model shown in the 3D view. Use this only when the user explicitly asks to switch between 'Fixed-wing' and 'Rotary-wing' models.",
            )
            .field(
                FieldSpec::new("type", FieldKind::String, "The type of drone to display")
                    .enumeration(DroneType::labels()),
            ),
            ToolSchema::new(
                "setPropellerSize",
                "Sets a new scale for the propellers on the currently displayed drone. Use this only for direct requests to make propellers bigger, smaller, or a specific size.",
            )
            .field(
                FieldSpec::new(
                    "propellerScale",
                    FieldKind::Number,
                    "The new scale for the propellers. 1 is default, 2 is double size.",
                )
                .range(PROPELLER_SCALE_MIN, PROPELLER_SCALE_MAX),
            ),
            ToolSchema::new(
                "setWingSpan",
                "Sets the exact wingspan for the fixed-wing drone model, specified in meters. Use this only when the user gives a specific instruction to change the wing size or span.",
            )
            .field(
                FieldSpec::new("wingSpan", FieldKind::Number, "The new wingspan for the fixed-wing drone, in meters.")
                    .range(WING_SPAN_MIN, WING_SPAN_MAX),
            ),
            ToolSchema::new(
                "setMissionPurpose",
                "Sets the mission the drone is being configured for. Use this only when the user states what the drone will be used for.",
            )
            .field(
                FieldSpec::new("purpose", FieldKind::String, "The mission purpose")
                    .enumeration(MissionPurpose::labels()),
            ),
            ToolSchema::new(
                "setMissionRequirements",
                "Sets the mission requirements the drone must meet. Use this only when the user gives payload, flight time and range figures.",
            )
            .field(
                FieldSpec::new("payloadKg", FieldKind::Number, "Payload to carry, in kilograms.")
                    .range(0.0, PAYLOAD_KG_MAX),
            )
            .field(
                FieldSpec::new("flightTimeMin", FieldKind::Number, "Required flight time, in minutes.")
                    .range(0.0, FLIGHT_TIME_MIN_MAX),
            )
            .field(
                FieldSpec::new("maxRangeKm", FieldKind::Number, "Required maximum range, in kilometers.")
                    .range(0.0, MAX_RANGE_KM_MAX),
            ),
            ToolSchema::new(
                "selectMotor",
                "Selects the motor model. Use this only when the user names one of the supported motors.",
            )
            .field(FieldSpec::new("model", FieldKind::String, "The motor model").enumeration(Motor::labels())),
            ToolSchema::new(
                "selectFlightController",
                "Selects the flight controller. Use this only when the user names one of the supported flight controllers.",
            )
            .field(
                FieldSpec::new("model", FieldKind::String, "The flight controller model")
                    .enumeration(FlightController::labels()),
            ),
            ToolSchema::new(
                "resetConfiguration",
                "Resets every drone parameter to its default. Use this only when the user explicitly asks to start over or reset.",
            ),
        ]
    }
}

/// 调用方持有的无人机配置状态
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DroneConfiguration {
    pub drone_type: DroneType,
    pub propeller_scale: f64,
    pub wing_span: f64,
    pub mission_purpose: Option<MissionPurpose>,
    pub mission_requirements: Option<SetMissionRequirementsArgs>,
    pub motor: Option<Motor>,
    pub flight_controller: Option<FlightController>,
}

impl Default for DroneConfiguration {
    fn default() -> Self {
        Self {
            drone_type: DroneType::FixedWing,
            propeller_scale: 1.0,
            wing_span: WING_SPAN_MIN,
            mission_purpose: None,
            mission_requirements: None,
            motor: None,
            flight_controller: None,
        }
    }
}

impl DroneConfiguration {
    pub fn apply(&mut self, action: &DroneAction) {
        match action {
            DroneAction::SetDroneType(a) => self.drone_type = a.drone_type,
            DroneAction::SetPropellerSize(a) => self.propeller_scale = a.propeller_scale,
            DroneAction::SetWingSpan(a) => self.wing_span = a.wing_span,
            DroneAction::SetMissionPurpose(a) => self.mission_purpose = Some(a.purpose),
            DroneAction::SetMissionRequirements(a) => self.mission_requirements = Some(a.clone()),
            DroneAction::SelectMotor(a) => self.motor = Some(a.model),
            DroneAction::SelectFlightController(a) => self.flight_controller = Some(a.model),
            DroneAction::ResetConfiguration(_) => *self = Self::default(),
        }
    }
}
