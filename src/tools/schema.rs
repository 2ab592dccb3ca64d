//! 工具参数 Schema 与校验
//!
//! 每个工具声明一组带约束的字段（类型 / 枚举 / 闭区间），`validate` 按固定顺序检查：
//! 必填 → 类型 → 枚举 → 数值范围，遇到第一个违规即返回，错误信息指明字段与约束。
//! `json_schema` 用 schemars 的 Schema 模型生成下发给模型的 JSON Schema。

use schemars::schema::{InstanceType, Schema, SchemaObject};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::llm::ToolDefinition;

/// 参数校验错误；作为助手消息返回给用户，不改变任何状态
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Unknown tool `{0}`")]
    UnknownTool(String),

    #[error("Arguments for `{tool}` must be a JSON object")]
    NotAnObject { tool: String },

    #[error("Missing required field `{field}`")]
    MissingField { field: String },

    #[error("Field `{field}` must be {expected}, got {found}")]
    WrongType {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Field `{field}` must be one of [{}], got \"{value}\"", .allowed.join(", "))]
    NotInEnum {
        field: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("Field `{field}` must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Arguments for `{tool}` could not be decoded: {reason}")]
    Malformed { tool: String, reason: String },
}

/// 字段类型
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Integer,
    Boolean,
}

impl FieldKind {
    fn label(&self) -> &'static str {
        match self {
            FieldKind::String => "a string",
            FieldKind::Number => "a number",
            FieldKind::Integer => "an integer",
            FieldKind::Boolean => "a boolean",
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Boolean => value.is_boolean(),
        }
    }

    fn instance_type(&self) -> InstanceType {
        match self {
            FieldKind::String => InstanceType::String,
            FieldKind::Number => InstanceType::Number,
            FieldKind::Integer => InstanceType::Integer,
            FieldKind::Boolean => InstanceType::Boolean,
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// 单个字段的声明
#[derive(Clone, Debug, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub description: String,
    pub required: bool,
    pub allowed: Option<Vec<String>>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            required: true,
            allowed: None,
            min: None,
            max: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// 字符串枚举
    pub fn enumeration<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// 闭区间 [min, max]
    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    fn schema(&self) -> Schema {
        let mut obj = SchemaObject {
            instance_type: Some(self.kind.instance_type().into()),
            ..Default::default()
        };
        obj.metadata().description = Some(self.description.clone());
        if let Some(allowed) = &self.allowed {
            obj.enum_values = Some(allowed.iter().cloned().map(Value::String).collect());
        }
        if self.min.is_some() || self.max.is_some() {
            let number = obj.number();
            number.minimum = self.min;
            number.maximum = self.max;
        }
        Schema::Object(obj)
    }
}

/// 工具声明：名称唯一，加载后不可变
#[derive(Clone, Debug, PartialEq)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub fields: Vec<FieldSpec>,
}

impl ToolSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    /// 校验参数，返回只含已声明字段的参数对象；`null` 视为空对象
    pub fn validate(&self, args: &Value) -> Result<Map<String, Value>, ValidationError> {
        let empty = Map::new();
        let obj = match args {
            Value::Object(map) => map,
            Value::Null => &empty,
            _ => {
                return Err(ValidationError::NotAnObject {
                    tool: self.name.clone(),
                })
            }
        };

        for field in self.fields.iter().filter(|f| f.required) {
            if obj.get(&field.name).map_or(true, Value::is_null) {
                return Err(ValidationError::MissingField {
                    field: field.name.clone(),
                });
            }
        }

        let present: Vec<(&FieldSpec, &Value)> = self
            .fields
            .iter()
            .filter_map(|f| obj.get(&f.name).filter(|v| !v.is_null()).map(|v| (f, v)))
            .collect();

        for (field, value) in &present {
            if !field.kind.matches(value) {
                return Err(ValidationError::WrongType {
                    field: field.name.clone(),
                    expected: field.kind.label(),
                    found: json_type_name(value),
                });
            }
        }

        for (field, value) in &present {
            if let (Some(allowed), Some(s)) = (&field.allowed, value.as_str()) {
                if !allowed.iter().any(|a| a == s) {
                    return Err(ValidationError::NotInEnum {
                        field: field.name.clone(),
                        value: s.to_string(),
                        allowed: allowed.clone(),
                    });
                }
            }
        }

        for (field, value) in &present {
            if let Some(n) = value.as_f64() {
                let below = field.min.is_some_and(|min| n < min);
                let above = field.max.is_some_and(|max| n > max);
                if below || above {
                    return Err(ValidationError::OutOfRange {
                        field: field.name.clone(),
                        value: n,
                        min: field.min.unwrap_or(f64::NEG_INFINITY),
                        max: field.max.unwrap_or(f64::INFINITY),
                    });
                }
            }
        }

        Ok(present
            .into_iter()
            .map(|(f, v)| (f.name.clone(), v.clone()))
            .collect())
    }

    /// 参数 JSON Schema（type=object）
    pub fn json_schema(&self) -> Value {
        let mut root = SchemaObject {
            instance_type: Some(InstanceType::Object.into()),
            ..Default::default()
        };
        let object = root.object();
        for field in &self.fields {
            object.properties.insert(field.name.clone(), field.schema());
            if field.required {
                object.required.insert(field.name.clone());
            }
        }
        serde_json::to_value(&root).unwrap_or_else(|_| serde_json::json!({"type": "object"}))
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.json_schema(),
        }
    }
}
