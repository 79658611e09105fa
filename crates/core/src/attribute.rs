use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::error::SchemaError;
use crate::value::{AttributeType, Item, Value};

/// A pure predicate over an attribute value.
///
/// Validators may run several times for the same value (default filling,
/// re-validation after a re-fetch), so they must not have side effects.
pub type Validator = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Where an attribute's default value comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    /// A fixed value.
    Static(Value),
    /// A fresh random v4 UUID each time the default is applied.
    NewUuid,
    /// The current UTC time each time the default is applied.
    Now,
}

impl DefaultValue {
    /// Produces the value to insert for an absent attribute.
    pub fn produce(&self, attribute_type: AttributeType) -> Value {
        match self {
            DefaultValue::Static(value) => value.clone(),
            DefaultValue::NewUuid => match attribute_type {
                AttributeType::String => Value::String(Uuid::new_v4().to_string()),
                _ => Value::Uuid(Uuid::new_v4()),
            },
            DefaultValue::Now => match attribute_type {
                AttributeType::String => {
                    Value::String(Utc::now().format("%Y-%m-%d %H:%M:%S").to_string())
                }
                _ => Value::DateTime(Utc::now()),
            },
        }
    }

    fn is_compatible_with(&self, attribute_type: AttributeType) -> bool {
        match self {
            DefaultValue::Static(value) => value.attribute_type() == attribute_type,
            DefaultValue::NewUuid => {
                matches!(attribute_type, AttributeType::Uuid | AttributeType::String)
            }
            DefaultValue::Now => {
                matches!(
                    attribute_type,
                    AttributeType::DateTime | AttributeType::String
                )
            }
        }
    }

    fn describe(&self) -> serde_json::Value {
        match self {
            DefaultValue::Static(value) => serde_json::to_value(value).unwrap_or_default(),
            DefaultValue::NewUuid => serde_json::Value::String("<new uuid>".to_string()),
            DefaultValue::Now => serde_json::Value::String("<now>".to_string()),
        }
    }
}

/// Describes one schema field.
///
/// Built with chained setters and checked when it is registered on a
/// [`Schema`](crate::Schema):
///
/// ```
/// use dynabridge_core::{AttributeDefinition, AttributeType};
///
/// let email = AttributeDefinition::new("Email", AttributeType::String)
///     .default_value("admin+missing@example.com")
///     .validator(|v| v.as_str().is_some_and(|s| s.contains('@')));
/// assert!(!email.is_required());
/// ```
#[derive(Clone)]
pub struct AttributeDefinition {
    name: String,
    attribute_type: AttributeType,
    default: Option<DefaultValue>,
    required: bool,
    immutable: bool,
    validator: Option<Validator>,
}

impl AttributeDefinition {
    /// Creates an optional, mutable attribute with no default.
    pub fn new(name: impl Into<String>, attribute_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attribute_type,
            default: None,
            required: false,
            immutable: false,
            validator: None,
        }
    }

    /// Creates an attribute from a textual type tag such as `"str"` or `"uuid"`.
    pub fn with_type_tag(name: impl Into<String>, tag: &str) -> Result<Self, SchemaError> {
        Ok(Self::new(name, tag.parse()?))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }

    /// Sets a fixed default value.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Static(value.into()));
        self
    }

    /// Fills the attribute with a freshly generated UUID when absent.
    pub fn default_uuid(mut self) -> Self {
        self.default = Some(DefaultValue::NewUuid);
        self
    }

    /// Fills the attribute with the current time when absent.
    pub fn default_now(mut self) -> Self {
        self.default = Some(DefaultValue::Now);
        self
    }

    pub fn validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attribute_type(&self) -> AttributeType {
        self.attribute_type
    }

    pub fn default(&self) -> Option<&DefaultValue> {
        self.default.as_ref()
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_immutable(&self) -> bool {
        self.immutable
    }

    pub fn has_validator(&self) -> bool {
        self.validator.is_some()
    }

    /// Checks that the declared default can produce a value of the declared type.
    pub fn check_definition(&self) -> Result<(), SchemaError> {
        match &self.default {
            Some(default) if !default.is_compatible_with(self.attribute_type) => {
                let found = match default {
                    DefaultValue::Static(value) => value.attribute_type(),
                    DefaultValue::NewUuid => AttributeType::Uuid,
                    DefaultValue::Now => AttributeType::DateTime,
                };
                Err(SchemaError::TypeMismatch {
                    name: self.name.clone(),
                    expected: self.attribute_type,
                    found,
                })
            }
            _ => Ok(()),
        }
    }

    /// Inserts the default into `item` when the attribute is absent.
    pub fn apply_default(&self, item: &mut Item) {
        if item.contains_key(&self.name) {
            return;
        }
        if let Some(default) = &self.default {
            item.insert(self.name.clone(), default.produce(self.attribute_type));
        }
    }

    /// Validates a (possibly absent) value for this attribute.
    ///
    /// No coercion is performed: an `int` is never accepted for a `float`
    /// attribute, to avoid silent precision changes.
    pub fn validate(&self, value: Option<&Value>) -> Result<Option<Value>, SchemaError> {
        let Some(value) = value else {
            if self.required {
                return Err(SchemaError::RequiredMissing(self.name.clone()));
            }
            return Ok(None);
        };

        if value.attribute_type() != self.attribute_type {
            return Err(SchemaError::TypeMismatch {
                name: self.name.clone(),
                expected: self.attribute_type,
                found: value.attribute_type(),
            });
        }

        if let Some(validator) = &self.validator {
            if !validator(value) {
                return Err(SchemaError::ValidatorRejected(self.name.clone()));
            }
        }

        Ok(Some(value.clone()))
    }

    /// Rejects a change to an immutable attribute that has already been persisted.
    pub fn check_immutability(
        &self,
        previous: Option<&Value>,
        new: Option<&Value>,
    ) -> Result<(), SchemaError> {
        match previous {
            Some(previous) if self.immutable && Some(previous) != new => {
                Err(SchemaError::ImmutableViolation(self.name.clone()))
            }
            _ => Ok(()),
        }
    }

    /// Returns a serializable description of this attribute.
    pub fn info(&self) -> AttributeInfo {
        AttributeInfo {
            name: self.name.clone(),
            attribute_type: self.attribute_type,
            default: self.default.as_ref().map(DefaultValue::describe),
            required: self.required,
            immutable: self.immutable,
            validator: self.validator.is_some(),
        }
    }
}

impl fmt::Debug for AttributeDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeDefinition")
            .field("name", &self.name)
            .field("attribute_type", &self.attribute_type)
            .field("default", &self.default)
            .field("required", &self.required)
            .field("immutable", &self.immutable)
            .field("validator", &self.validator.is_some())
            .finish()
    }
}

/// Serializable summary of an [`AttributeDefinition`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub attribute_type: AttributeType,
    pub default: Option<serde_json::Value>,
    pub required: bool,
    pub immutable: bool,
    pub validator: bool,
}
