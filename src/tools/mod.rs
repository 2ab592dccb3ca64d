//! 工具层：参数 schema、注册表、无人机动作与调度器

pub mod dispatcher;
pub mod drone;
pub mod registry;
pub mod schema;

pub use dispatcher::{ToolCall, ToolDispatcher, ToolResult, ValidatedCall};
pub use drone::{DroneAction, DroneConfiguration, DroneType, FlightController, MissionPurpose, Motor};
pub use registry::{retrieve_schema, RegistryError, ToolRegistry, RETRIEVE_TOOL};
pub use schema::{FieldKind, FieldSpec, ToolSchema, ValidationError};
