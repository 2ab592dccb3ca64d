//! 工具调度器
//!
//! dispatch 只做认证：名称存在 → 参数通过 schema 校验 → 构造强类型 DroneAction。
//! 不执行任何实际效果；每次调度输出一条结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};

use crate::tools::drone::DroneAction;
use crate::tools::registry::ToolRegistry;
use crate::tools::schema::ValidationError;

/// 模型提议的一次调用
#[derive(Clone, Debug, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub raw_args: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, raw_args: Value) -> Self {
        Self {
            name: name.into(),
            raw_args,
        }
    }
}

/// 校验通过的调用：强类型动作 + 规范化后的参数
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedCall {
    pub action: DroneAction,
    pub args: Map<String, Value>,
}

pub type ToolResult = Result<ValidatedCall, ValidationError>;

pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn dispatch(&self, call: &ToolCall) -> ToolResult {
        let start = Instant::now();
        let result = self.certify(call);

        let outcome = match &result {
            Ok(_) => "ok",
            Err(ValidationError::UnknownTool(_)) => "unknown_tool",
            Err(_) => "invalid_args",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": call.name,
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_us": start.elapsed().as_micros() as u64,
            "args_preview": args_preview(&call.raw_args),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        result
    }

    fn certify(&self, call: &ToolCall) -> ToolResult {
        let schema = self
            .registry
            .get(&call.name)
            .ok_or_else(|| ValidationError::UnknownTool(call.name.clone()))?;
        let args = schema.validate(&call.raw_args)?;
        let action = DroneAction::from_validated(&call.name, args.clone())?;
        Ok(ValidatedCall { action, args })
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::drone::{DroneType, SetDroneTypeArgs};
    use crate::tools::registry::RETRIEVE_TOOL;
    use serde_json::json;

    fn dispatcher() -> ToolDispatcher {
        ToolDispatcher::new(Arc::new(ToolRegistry::with_drone_catalog()))
    }

    #[test]
    fn test_dispatch_valid_call() {
        let result = dispatcher()
            .dispatch(&ToolCall::new("setDroneType", json!({"type": "Rotary-wing"})))
            .unwrap();
        assert_eq!(
            result.action,
            DroneAction::SetDroneType(SetDroneTypeArgs {
                drone_type: DroneType::RotaryWing
            })
        );
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let d = dispatcher();
        for scale in [0.5, 2.5] {
            let ok = d
                .dispatch(&ToolCall::new("setPropellerSize", json!({"propellerScale": scale})))
                .unwrap();
            assert_eq!(ok.args["propellerScale"], json!(scale));
        }
        let err = d
            .dispatch(&ToolCall::new("setPropellerSize", json!({"propellerScale": 3.0})))
            .unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRange { ref field, .. } if field == "propellerScale"));
    }

    #[test]
    fn test_unknown_and_reserved_names_fail() {
        let d = dispatcher();
        assert_eq!(
            d.dispatch(&ToolCall::new("fly", json!({}))),
            Err(ValidationError::UnknownTool("fly".into()))
        );
        // retrieve 由路由器处理，调度器不认证
        assert!(d.dispatch(&ToolCall::new(RETRIEVE_TOOL, json!({"query": "x"}))).is_err());
    }

    #[test]
    fn test_args_preview_truncates() {
        let long = json!({"text": "x".repeat(500)});
        assert!(args_preview(&long).ends_with("..."));
        assert_eq!(args_preview(&json!({})), "{}");
    }
}
