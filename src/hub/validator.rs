//! Schema validation gateway
//!
//! The engine treats validation as a black box: give it a body, get a list
//! of problems back. [`RequiredPropertyValidator`] checks the part of a
//! schema that matters when markers are stripped from a body: required
//! properties must still be present.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use super::model::ContentTypeSchema;
use super::service::{ContentService, HubError};

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Body has no _meta.schema")]
    MissingSchemaId,

    #[error("Could not find content type schema: {0}")]
    SchemaNotFound(String),

    #[error("Content type schema {schema_id} is not valid JSON: {message}")]
    InvalidSchema { schema_id: String, message: String },

    #[error(transparent)]
    Hub(#[from] HubError),
}

/// Validates content bodies against their schema
#[async_trait]
pub trait SchemaValidator: Send + Sync {
    /// Returns the problems found in `body`; empty means valid
    async fn validate(&self, body: &Value) -> Result<Vec<String>, ValidationError>;
}

/// Checks required properties, recursing through `properties`, `items` and `allOf`
#[derive(Debug, Default)]
pub struct RequiredPropertyValidator {
    schemas: HashMap<String, Result<Value, String>>,
}

impl RequiredPropertyValidator {
    pub fn from_schemas(schemas: &[ContentTypeSchema]) -> Self {
        let schemas = schemas
            .iter()
            .map(|s| {
                let parsed = serde_json::from_str(&s.body).map_err(|e| e.to_string());
                (s.schema_id.clone(), parsed)
            })
            .collect();

        Self { schemas }
    }

    /// Builds a validator from every schema registered on a hub
    pub async fn load(service: &dyn ContentService) -> Result<Self, ValidationError> {
        let schemas = service.list_content_type_schemas().await?;
        Ok(Self::from_schemas(&schemas))
    }

    fn check(schema: &Value, value: &Value, pointer: &str, errors: &mut Vec<String>) {
        if let Some(all_of) = schema.get("allOf").and_then(Value::as_array) {
            for sub in all_of {
                Self::check(sub, value, pointer, errors);
            }
        }

        if let (Some(items), Some(elements)) = (schema.get("items"), value.as_array()) {
            for (index, element) in elements.iter().enumerate() {
                Self::check(items, element, &format!("{}/{}", pointer, index), errors);
            }
        }

        let Some(object) = value.as_object() else {
            return;
        };

        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for name in required.iter().filter_map(Value::as_str) {
                if object.get(name).map_or(true, Value::is_null) {
                    errors.push(format!("{}: missing required property '{}'", pointer, name));
                }
            }
        }

        if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
            for (name, sub) in properties {
                if let Some(child) = object.get(name) {
                    Self::check(sub, child, &format!("{}/{}", pointer, name), errors);
                }
            }
        }
    }
}

#[async_trait]
impl SchemaValidator for RequiredPropertyValidator {
    async fn validate(&self, body: &Value) -> Result<Vec<String>, ValidationError> {
        let schema_id = body
            .pointer("/_meta/schema")
            .and_then(Value::as_str)
            .ok_or(ValidationError::MissingSchemaId)?;

        let schema = match self.schemas.get(schema_id) {
            Some(Ok(schema)) => schema,
            Some(Err(message)) => {
                return Err(ValidationError::InvalidSchema {
                    schema_id: schema_id.to_string(),
                    message: message.clone(),
                })
            }
            None => return Err(ValidationError::SchemaNotFound(schema_id.to_string())),
        };

        let mut errors = Vec::new();
        Self::check(schema, body, "", &mut errors);
        Ok(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validator() -> RequiredPropertyValidator {
        let schema = json!({
            "allOf": [{ "required": ["_meta"] }],
            "required": ["hero"],
            "properties": {
                "hero": { "required": ["id"] },
                "slides": { "items": { "required": ["title"] } }
            }
        });

        RequiredPropertyValidator::from_schemas(&[ContentTypeSchema {
            id: "s1".to_string(),
            schema_id: "https://example.com/page".to_string(),
            body: schema.to_string(),
        }])
    }

    #[tokio::test]
    async fn valid_body() {
        let body = json!({
            "_meta": { "schema": "https://example.com/page" },
            "hero": { "id": "x" },
            "slides": [{ "title": "a" }]
        });

        assert!(validator().validate(&body).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reports_missing_nested_properties() {
        let body = json!({
            "_meta": { "schema": "https://example.com/page" },
            "slides": [{ "title": "a" }, { "title": null }]
        });

        let errors = validator().validate(&body).await.unwrap();
        assert_eq!(
            errors,
            vec![
                ": missing required property 'hero'".to_string(),
                "/slides/1: missing required property 'title'".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn unknown_schema_is_an_error() {
        let body = json!({ "_meta": { "schema": "https://example.com/other" } });
        assert!(matches!(
            validator().validate(&body).await,
            Err(ValidationError::SchemaNotFound(_))
        ));
        assert!(matches!(
            validator().validate(&json!({})).await,
            Err(ValidationError::MissingSchemaId)
        ));
    }
}
