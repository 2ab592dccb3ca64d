//! 工具注册表
//!
//! 按名称保存 ToolSchema，启动时加载、之后只读。`retrieve` 是保留名：它由路由器处理，
//! 不能作为配置工具注册，但始终出现在下发给模型的工具列表中。

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;

use crate::llm::ToolDefinition;
use crate::tools::drone::DroneAction;
use crate::tools::schema::{FieldKind, FieldSpec, ToolSchema};

/// 保留的检索工具名
pub const RETRIEVE_TOOL: &str = "retrieve";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Tool `{0}` is already registered")]
    Duplicate(String),

    #[error("Tool name `{0}` is reserved")]
    Reserved(String),
}

/// 工具注册表：name -> schema，保留注册顺序用于下发
pub struct ToolRegistry {
    tools: HashMap<String, ToolSchema>,
    order: Vec<String>,
    retrieve: ToolSchema,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
            retrieve: retrieve_schema(),
        }
    }
}

/// 检索工具：参数只有 query
pub fn retrieve_schema() -> ToolSchema {
    ToolSchema::new(
        RETRIEVE_TOOL,
        "Retrieve information related to a query. You are to use this if the query is NOT a command. \
         This is for answering user queries using the official documentation. \
         Unless you need to ask the user a clarifying question, use this to answer queries.",
    )
    .field(FieldSpec::new("query", FieldKind::String, "The search query"))
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置全部无人机配置工具
    pub fn with_drone_catalog() -> Self {
        let mut registry = Self::new();
        for schema in DroneAction::catalog() {
            let registered = registry.register(schema);
            debug_assert!(registered.is_ok(), "drone catalog: {registered:?}");
        }
        registry
    }

    pub fn register(&mut self, schema: ToolSchema) -> Result<(), RegistryError> {
        if schema.name == RETRIEVE_TOOL {
            return Err(RegistryError::Reserved(schema.name));
        }
        if self.tools.contains_key(&schema.name) {
            return Err(RegistryError::Duplicate(schema.name));
        }
        self.order.push(schema.name.clone());
        self.tools.insert(schema.name.clone(), schema);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ToolSchema> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn retrieve_schema(&self) -> &ToolSchema {
        &self.retrieve
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.order.clone()
    }

    /// 下发给模型的工具定义：配置工具（注册顺序）+ retrieve
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .chain(std::iter::once(&self.retrieve))
            .map(ToolSchema::definition)
            .collect()
    }

    /// 全部工具定义的 JSON，便于调试与文档
    pub fn to_schema_json(&self) -> String {
        let tools: Vec<Value> = self
            .definitions()
            .into_iter()
            .map(|d| serde_json::json!({"name": d.name, "description": d.description, "parameters": d.parameters}))
            .collect();
        serde_json::to_string_pretty(&tools).unwrap_or_else(|_| "[]".to_string())
    }
}
