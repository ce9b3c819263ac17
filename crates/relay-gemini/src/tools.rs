//! Functions the model may ask the relay to run locally.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use serde_json::{Map, Value, json};
use tracing::debug;

use crate::error::GeminiError;
use crate::schema::ResponseSchema;
use crate::types::{FunctionDeclaration, Schema, Tool};

/// A locally executable function exposed to the model.
pub trait LocalTool: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Argument schema (an OBJECT schema).
    fn parameters(&self) -> Schema;

    /// Run the tool on the arguments the model supplied.
    fn call(&self, args: &Map<String, Value>) -> Result<Value, GeminiError>;

    fn declaration(&self) -> FunctionDeclaration {
        FunctionDeclaration {
            name: self.name().to_owned(),
            description: self.description().to_owned(),
            parameters: self.parameters(),
        }
    }
}

/// `multiply(a, b)`, answering `{"result": a * b}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Multiply;

impl Multiply {
    fn number(args: &Map<String, Value>, key: &str) -> Result<f64, GeminiError> {
        args.get(key)
            .and_then(Value::as_f64)
            .ok_or_else(|| GeminiError::InvalidToolCall {
                name: "multiply".into(),
                message: format!("argument `{key}` must be a number"),
            })
    }
}

impl LocalTool for Multiply {
    fn name(&self) -> &str {
        "multiply"
    }

    fn description(&self) -> &str {
        "Multiplies two numbers"
    }

    fn parameters(&self) -> Schema {
        ResponseSchema::Multiply.schema()
    }

    fn call(&self, args: &Map<String, Value>) -> Result<Value, GeminiError> {
        let a = Self::number(args, "a")?;
        let b = Self::number(args, "b")?;
        // Whole numbers stay whole unless the product overflows i64.
        let ints = args.get("a").and_then(Value::as_i64).zip(args.get("b").and_then(Value::as_i64));
        if let Some(product) = ints.and_then(|(a, b)| a.checked_mul(b)) {
            return Ok(json!({ "result": product }));
        }
        Ok(json!({ "result": a * b }))
    }
}

/// Name-keyed set of [`LocalTool`]s.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn LocalTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, tool: impl LocalTool + 'static) -> Self {
        self.register(Arc::new(tool));
        self
    }

    pub fn register(&mut self, tool: Arc<dyn LocalTool>) {
        debug!(name = tool.name(), "registering local tool");
        self.tools.insert(tool.name().to_owned(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn LocalTool>> {
        self.tools.get(name)
    }

    /// All registered tools as one request `Tool` entry.
    pub fn as_tool(&self) -> Tool {
        Tool {
            function_declarations: self.tools.values().map(|t| t.declaration()).collect(),
        }
    }

    /// Execute the tool named `name`; unknown names are an invalid call.
    pub fn invoke(&self, name: &str, args: &Map<String, Value>) -> Result<Value, GeminiError> {
        let tool = self.get(name).ok_or_else(|| GeminiError::InvalidToolCall {
            name: name.to_owned(),
            message: "no such tool".into(),
        })?;
        tool.call(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn multiply_computes_product() {
        let out = Multiply.call(&args(json!({ "a": 3, "b": 4 }))).unwrap();
        assert_eq!(out, json!({ "result": 12 }));
        assert!(out["result"].is_i64());

        let out = Multiply.call(&args(json!({ "a": 2.5, "b": -2 }))).unwrap();
        assert_eq!(out["result"].as_f64(), Some(-5.0));
    }

    #[test]
    fn multiply_falls_back_to_float_on_overflow() {
        let out = Multiply.call(&args(json!({ "a": i64::MAX, "b": 2 }))).unwrap();
        assert!(out["result"].is_f64());
        assert_eq!(out["result"].as_f64(), Some(i64::MAX as f64 * 2.0));
    }

    #[test]
    fn multiply_rejects_missing_or_non_numeric_arguments() {
        let err = Multiply.call(&args(json!({ "a": 3 }))).unwrap_err();
        assert!(matches!(err, GeminiError::InvalidToolCall { ref message, .. } if message.contains("`b`")));
        assert!(Multiply.call(&args(json!({ "a": "3", "b": 4 }))).is_err());
    }

    #[test]
    fn registry_declares_and_dispatches() {
        let registry = ToolRegistry::new().with(Multiply);
        let tool = registry.as_tool();
        assert_eq!(tool.function_declarations.len(), 1);
        assert_eq!(tool.function_declarations[0].name, "multiply");
        assert_eq!(tool.function_declarations[0].description, "Multiplies two numbers");

        let out = registry.invoke("multiply", &args(json!({ "a": 6, "b": 7 }))).unwrap();
        assert_eq!(out["result"].as_f64(), Some(42.0));
        assert!(registry.invoke("divide", &Map::new()).is_err());
    }
}
