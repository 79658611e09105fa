use std::collections::HashMap;

use serde::Serialize;

use crate::attribute::{AttributeDefinition, AttributeInfo};
use crate::error::SchemaError;
use crate::value::Item;

/// An ordered set of attribute definitions, unique by name.
///
/// Declaration order only matters for deterministic error reporting: when
/// several attributes are invalid, the first one declared is reported.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    attributes: Vec<AttributeDefinition>,
    index: HashMap<String, usize>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers definitions, appending them in the given order.
    ///
    /// Registration is atomic: if any definition is rejected, nothing is added.
    pub fn add_attributes(
        mut self,
        definitions: impl IntoIterator<Item = AttributeDefinition>,
    ) -> Result<Self, SchemaError> {
        let definitions: Vec<_> = definitions.into_iter().collect();
        let mut seen: Vec<&str> = Vec::with_capacity(definitions.len());

        for definition in &definitions {
            let name = definition.name();
            if self.index.contains_key(name) || seen.contains(&name) {
                return Err(SchemaError::DuplicateAttribute(name.to_string()));
            }
            definition.check_definition()?;
            seen.push(name);
        }

        for definition in definitions {
            self.index
                .insert(definition.name().to_string(), self.attributes.len());
            self.attributes.push(definition);
        }
        Ok(self)
    }

    /// Returns a copy of `item` with defaults applied to absent attributes.
    ///
    /// Idempotent: filling an already filled item changes nothing.
    pub fn fill_defaults(&self, item: &Item) -> Item {
        let mut filled = item.clone();
        for definition in &self.attributes {
            definition.apply_default(&mut filled);
        }
        filled
    }

    /// Fills defaults and validates every attribute, returning the filled item.
    ///
    /// Declared attributes are checked in declaration order, then any
    /// undeclared key is rejected. The first failure is returned.
    pub fn validate(&self, item: &Item) -> Result<Item, SchemaError> {
        let filled = self.fill_defaults(item);

        for definition in &self.attributes {
            definition.validate(filled.get(definition.name()))?;
        }

        if let Some(unknown) = filled.keys().find(|name| !self.index.contains_key(*name)) {
            return Err(SchemaError::UnknownAttribute(unknown.clone()));
        }

        Ok(filled)
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDefinition> {
        self.index.get(name).map(|&i| &self.attributes[i])
    }

    pub fn attributes(&self) -> &[AttributeDefinition] {
        &self.attributes
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Returns a serializable description of every attribute.
    pub fn describe(&self) -> SchemaInfo {
        SchemaInfo {
            attributes: self.attributes.iter().map(AttributeDefinition::info).collect(),
        }
    }
}

/// Serializable summary of a [`Schema`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaInfo {
    pub attributes: Vec<AttributeInfo>,
}
