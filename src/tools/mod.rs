use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{SchemaError, ToolError};

#[derive(Clone, Debug, PartialEq)]
pub enum ToolOutcome {
    Json(Value),
    /// The operation succeeded and has nothing to report.
    Empty,
}

impl ToolOutcome {
    pub fn json<T: Serialize>(value: &T) -> Result<Self, ToolError> {
        serde_json::to_value(value)
            .map(Self::Json)
            .map_err(|err| ToolError::Execution(format!("result not serializable: {err}")))
    }

    pub fn into_value(self) -> Value {
        match self {
            Self::Json(value) => value,
            Self::Empty => Value::Null,
        }
    }
}

type DynDependency = Arc<dyn Any + Send + Sync>;
type ToolHandler = dyn Fn(Value, &DependencyMap) -> BoxFuture<'static, Result<ToolOutcome, ToolError>>
    + Send
    + Sync;

/// Type-keyed values (vendor clients) made available to tool handlers.
#[derive(Clone, Default)]
pub struct DependencyMap {
    typed: HashMap<TypeId, DynDependency>,
}

impl std::fmt::Debug for DependencyMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyMap")
            .field("len", &self.typed.len())
            .finish()
    }
}

impl DependencyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T>(&mut self, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.typed.insert(TypeId::of::<T>(), Arc::new(value));
    }

    pub fn with<T>(mut self, value: T) -> Self
    where
        T: Send + Sync + 'static,
    {
        self.insert(value);
        self
    }

    pub fn get<T>(&self) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        let value = self.typed.get(&TypeId::of::<T>())?.clone();
        Arc::downcast::<T>(value).ok()
    }

    /// Like [`DependencyMap::get`], failing with the dependency's name.
    pub fn require<T>(&self, name: &'static str) -> Result<Arc<T>, ToolError>
    where
        T: Send + Sync + 'static,
    {
        self.get::<T>().ok_or(ToolError::MissingDependency(name))
    }
}

#[derive(Clone)]
pub struct ToolSpec {
    name: String,
    description: String,
    json_schema: Value,
    handler: Arc<ToolHandler>,
}

impl std::fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSpec")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("json_schema", &self.json_schema)
            .finish()
    }
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            json_schema: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": [],
                "additionalProperties": true,
            }),
            handler: Arc::new(|_args, _deps| {
                Box::pin(async {
                    Err(ToolError::Execution(
                        "tool handler not configured".to_string(),
                    ))
                })
            }),
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Result<Self, SchemaError> {
        validate_schema(&schema)?;
        self.json_schema = schema;
        Ok(self)
    }

    pub fn with_handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Value, &DependencyMap) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutcome, ToolError>> + Send + 'static,
    {
        self.handler = Arc::new(move |args, deps| Box::pin(handler(args, deps)));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn json_schema(&self) -> &Value {
        &self.json_schema
    }

    pub async fn execute(
        &self,
        args: Value,
        dependencies: &DependencyMap,
    ) -> Result<ToolOutcome, ToolError> {
        validate_arguments(self.name(), &self.json_schema, &args)?;
        (self.handler)(args, dependencies).await
    }
}

/// Named tools plus the dependencies their handlers draw on.
#[derive(Debug, Clone)]
pub struct Toolbox {
    tools: Vec<ToolSpec>,
    by_name: HashMap<String, usize>,
    dependencies: DependencyMap,
}

impl Toolbox {
    pub fn new(tools: Vec<ToolSpec>, dependencies: DependencyMap) -> Result<Self, ToolError> {
        let mut by_name = HashMap::new();
        for (index, tool) in tools.iter().enumerate() {
            if by_name.insert(tool.name().to_string(), index).is_some() {
                return Err(ToolError::Duplicate(tool.name().to_string()));
            }
        }

        Ok(Self {
            tools,
            by_name,
            dependencies,
        })
    }

    pub fn tools(&self) -> &[ToolSpec] {
        &self.tools
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.by_name.get(name).map(|index| &self.tools[*index])
    }

    pub async fn call(&self, name: &str, args: Value) -> Result<ToolOutcome, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.execute(args, &self.dependencies).await
    }
}

/// Deserializes already schema-checked arguments into a typed struct.
pub(crate) fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|err| ToolError::InvalidArguments {
        tool: tool.to_string(),
        message: err.to_string(),
    })
}

fn validate_schema(schema: &Value) -> Result<(), SchemaError> {
    let schema_obj = schema.as_object().ok_or(SchemaError::SchemaNotObject)?;

    let root_type = schema_obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or(SchemaError::RootTypeMustBeObject)?;

    if root_type != "object" {
        return Err(SchemaError::RootTypeMustBeObject);
    }

    if let Some(required) = schema_obj.get("required") {
        let required_arr = required.as_array().ok_or(SchemaError::InvalidRequired)?;
        for item in required_arr {
            if !item.is_string() {
                return Err(SchemaError::InvalidRequired);
            }
        }
    }

    Ok(())
}

fn validate_arguments(tool_name: &str, schema: &Value, args: &Value) -> Result<(), ToolError> {
    let args_obj = args
        .as_object()
        .ok_or_else(|| ToolError::InvalidArguments {
            tool: tool_name.to_string(),
            message: "arguments must be a JSON object".to_string(),
        })?;

    let schema_obj = schema
        .as_object()
        .ok_or_else(|| ToolError::InvalidArguments {
            tool: tool_name.to_string(),
            message: "tool schema must be a JSON object".to_string(),
        })?;

    if let Some(required) = schema_obj.get("required").and_then(Value::as_array) {
        for field in required {
            let Some(field_name) = field.as_str() else {
                continue;
            };
            if !args_obj.contains_key(field_name) {
                return Err(ToolError::InvalidArguments {
                    tool: tool_name.to_string(),
                    message: format!("missing required field: {field_name}"),
                });
            }
        }
    }

    let properties = schema_obj
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    if schema_obj
        .get("additionalProperties")
        .and_then(Value::as_bool)
        == Some(false)
    {
        for key in args_obj.keys() {
            if !properties.contains_key(key) {
                return Err(ToolError::InvalidArguments {
                    tool: tool_name.to_string(),
                    message: format!("unknown field: {key}"),
                });
            }
        }
    }

    for (key, value) in args_obj {
        if value.is_null() {
            continue;
        }
        if let Some(field_schema) = properties.get(key)
            && let Some(type_name) = field_schema.get("type").and_then(Value::as_str)
            && !value_matches_type(value, type_name)
        {
            return Err(ToolError::InvalidArguments {
                tool: tool_name.to_string(),
                message: format!("field '{key}' must be of type {type_name}"),
            });
        }
    }

    Ok(())
}

fn value_matches_type(value: &Value, type_name: &str) -> bool {
    match type_name {
        "string" => value.is_string(),
        "integer" => value.as_i64().is_some() || value.as_u64().is_some(),
        "number" => value.as_f64().is_some(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn echo_tool(name: &str) -> ToolSpec {
        ToolSpec::new(name, "echo the value")
            .with_schema(json!({
                "type": "object",
                "properties": {"value": {"type": "string"}},
                "required": ["value"],
                "additionalProperties": false
            }))
            .expect("schema valid")
            .with_handler(|args, _deps| async move { Ok(ToolOutcome::Json(args["value"].clone())) })
    }

    #[test]
    fn schema_validation_rejects_non_object_root() {
        let result = ToolSpec::new("bad", "bad").with_schema(json!({"type": "string"}));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn handlers_read_typed_dependencies() {
        let deps = DependencyMap::new().with::<u32>(9);

        let tool = ToolSpec::new("read", "read dep")
            .with_schema(json!({
                "type": "object",
                "properties": {},
                "required": [],
                "additionalProperties": false
            }))
            .expect("schema should be valid")
            .with_handler(|_args, deps| {
                let value = deps.require::<u32>("u32");
                async move { Ok::<_, ToolError>(ToolOutcome::Json(json!(*value?))) }
            });

        let outcome = tool.execute(json!({}), &deps).await.expect("tool executes");
        assert_eq!(outcome, ToolOutcome::Json(json!(9)));

        let err = tool
            .execute(json!({}), &DependencyMap::new())
            .await
            .expect_err("dependency missing");
        assert!(matches!(err, ToolError::MissingDependency("u32")));
    }

    #[tokio::test]
    async fn argument_validation_reports_missing_required() {
        let err = echo_tool("req")
            .execute(json!({}), &DependencyMap::new())
            .await
            .expect_err("should fail");

        let message = err.to_string();
        assert!(message.contains("missing required field"));
    }

    #[tokio::test]
    async fn argument_validation_rejects_wrong_type_and_unknown_fields() {
        let tool = echo_tool("typed");
        let err = tool
            .execute(json!({"value": 3}), &DependencyMap::new())
            .await
            .expect_err("wrong type");
        assert!(err.to_string().contains("must be of type string"));

        let err = tool
            .execute(json!({"value": "x", "extra": 1}), &DependencyMap::new())
            .await
            .expect_err("unknown field");
        assert!(err.to_string().contains("unknown field: extra"));
    }

    #[tokio::test]
    async fn toolbox_dispatches_by_name() {
        let toolbox = Toolbox::new(vec![echo_tool("echo")], DependencyMap::new()).expect("builds");

        let outcome = toolbox
            .call("echo", json!({"value": "hi"}))
            .await
            .expect("call succeeds");
        assert_eq!(outcome.into_value(), json!("hi"));

        let err = toolbox.call("missing", json!({})).await.expect_err("unknown");
        assert!(matches!(err, ToolError::NotFound(name) if name == "missing"));
    }

    #[test]
    fn toolbox_rejects_duplicate_names() {
        let err = Toolbox::new(vec![echo_tool("same"), echo_tool("same")], DependencyMap::new())
            .expect_err("duplicate");
        assert!(matches!(err, ToolError::Duplicate(name) if name == "same"));
    }
}
