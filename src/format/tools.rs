use serde_json::{Map, Value};

use super::anthropic::{InputSchema, Tool, ToolChoice};
use super::genai::{FunctionCallingMode, FunctionDeclaration, Tool as GenaiTool, ToolConfig};
use super::schema::properties_to_map;
use crate::error::ConvertError;

pub fn convert_tools(tools: &[GenaiTool]) -> Result<Vec<Tool>, ConvertError> {
    let mut converted = Vec::new();
    for tool in tools {
        if tool.code_execution.is_some() {
            return Err(ConvertError::UnsupportedTool("code execution"));
        }
        if tool.google_search.is_some() {
            return Err(ConvertError::UnsupportedTool("google search"));
        }
        converted.extend(
            tool.function_declarations
                .iter()
                .map(convert_function_declaration),
        );
    }
    Ok(converted)
}

/// A typed `parameters` schema wins over `parameters_json_schema`.
/// With neither, the tool takes no arguments.
pub fn convert_function_declaration(decl: &FunctionDeclaration) -> Tool {
    let mut input_schema = InputSchema::default();

    if let Some(params) = &decl.parameters {
        input_schema.properties = properties_to_map(&params.properties);
        if !params.required.is_empty() {
            input_schema.required = Some(params.required.clone());
        }
    } else if let Some(Value::Object(params)) = &decl.parameters_json_schema {
        if let Some(Value::Object(properties)) = params.get("properties") {
            input_schema.properties = properties.clone();
        }
        input_schema.required = extract_required_fields(params);
    }

    Tool {
        name: decl.name.clone(),
        description: (!decl.description.is_empty()).then(|| decl.description.clone()),
        input_schema,
    }
}

/// String entries of a JSON Schema `required` array, if any.
pub fn extract_required_fields(schema: &Map<String, Value>) -> Option<Vec<String>> {
    let required: Vec<String> = schema
        .get("required")?
        .as_array()?
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    (!required.is_empty()).then_some(required)
}

pub fn convert_tool_choice(config: &ToolConfig) -> Result<Option<ToolChoice>, ConvertError> {
    let Some(fcc) = &config.function_calling_config else {
        return Ok(None);
    };

    let allowed = &fcc.allowed_function_names;
    if allowed.len() > 1 {
        return Err(ConvertError::TooManyAllowedFunctions(allowed.len()));
    }

    let choice = match fcc.mode {
        FunctionCallingMode::None => None,
        FunctionCallingMode::Auto => Some(ToolChoice::Auto),
        FunctionCallingMode::Any => match allowed.first() {
            Some(name) => Some(ToolChoice::Tool { name: name.clone() }),
            None => Some(ToolChoice::Any),
        },
        FunctionCallingMode::ModeUnspecified | FunctionCallingMode::Validated => {
            Some(ToolChoice::Auto)
        }
    };
    Ok(choice)
}
