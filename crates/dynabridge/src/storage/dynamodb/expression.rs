//! Rendering of conditions and updates as DynamoDB expressions.
//!
//! Attribute names are always bound through `#n` placeholders, so reserved
//! words (`Name`, `Status`, ...) never need special handling.

use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;
use dynabridge_core::{Condition, ItemKey, UpdateSpec, Value};

use super::conversions::value_to_attribute;

/// Collects placeholder bindings while rendering expressions.
#[derive(Debug, Default)]
pub struct ExpressionBuilder {
    names: HashMap<String, String>,
    values: HashMap<String, AttributeValue>,
}

/// Placeholder bindings for a request, `None` when empty.
pub type ExpressionParts = (
    Option<HashMap<String, String>>,
    Option<HashMap<String, AttributeValue>>,
);

impl ExpressionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the placeholder for an attribute name, reusing existing bindings.
    fn name(&mut self, name: &str) -> String {
        if let Some((placeholder, _)) = self.names.iter().find(|(_, n)| n.as_str() == name) {
            return placeholder.clone();
        }
        let placeholder = format!("#n{}", self.names.len());
        self.names.insert(placeholder.clone(), name.to_string());
        placeholder
    }

    fn value(&mut self, value: &Value) -> String {
        let placeholder = format!(":v{}", self.values.len());
        self.values
            .insert(placeholder.clone(), value_to_attribute(value));
        placeholder
    }

    /// Renders a condition expression.
    pub fn condition(&mut self, condition: &Condition) -> String {
        match condition {
            Condition::Eq(name, value) => self.comparison(name, "=", value),
            Condition::Ne(name, value) => self.comparison(name, "<>", value),
            Condition::Lt(name, value) => self.comparison(name, "<", value),
            Condition::Le(name, value) => self.comparison(name, "<=", value),
            Condition::Gt(name, value) => self.comparison(name, ">", value),
            Condition::Ge(name, value) => self.comparison(name, ">=", value),
            Condition::Exists(name) => format!("attribute_exists({})", self.name(name)),
            Condition::NotExists(name) => format!("attribute_not_exists({})", self.name(name)),
            Condition::And(conditions) => self.join(conditions, " AND "),
            Condition::Or(conditions) => self.join(conditions, " OR "),
        }
    }

    fn comparison(&mut self, name: &str, op: &str, value: &Value) -> String {
        let name = self.name(name);
        let value = self.value(value);
        format!("{} {} {}", name, op, value)
    }

    fn join(&mut self, conditions: &[Condition], separator: &str) -> String {
        let parts: Vec<String> = conditions.iter().map(|c| self.condition(c)).collect();
        format!("({})", parts.join(separator))
    }

    /// Renders an update expression, skipping key attributes (which DynamoDB
    /// does not allow in updates). Returns `None` for an empty update.
    pub fn update(&mut self, key: &ItemKey, update: &UpdateSpec) -> Option<String> {
        let set: Vec<String> = update
            .set
            .iter()
            .filter(|(name, _)| !key.contains(name))
            .map(|(name, value)| {
                let name = self.name(name);
                let value = self.value(value);
                format!("{} = {}", name, value)
            })
            .collect();
        let remove: Vec<String> = update
            .remove
            .iter()
            .filter(|name| !key.contains(name))
            .map(|name| self.name(name))
            .collect();

        let mut clauses = Vec::new();
        if !set.is_empty() {
            clauses.push(format!("SET {}", set.join(", ")));
        }
        if !remove.is_empty() {
            clauses.push(format!("REMOVE {}", remove.join(", ")));
        }
        (!clauses.is_empty()).then(|| clauses.join(" "))
    }

    /// Consumes the builder, returning the placeholder maps.
    pub fn into_parts(self) -> ExpressionParts {
        let names = (!self.names.is_empty()).then_some(self.names);
        let values = (!self.values.is_empty()).then_some(self.values);
        (names, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_condition() {
        let mut builder = ExpressionBuilder::new();

        let expression = builder.condition(&Condition::eq("lockVersion", 3));
        let (names, values) = builder.into_parts();

        assert_eq!(expression, "#n0 = :v0");
        assert_eq!(names.unwrap()["#n0"], "lockVersion");
        assert_eq!(values.unwrap()[":v0"], AttributeValue::N("3".to_string()));
    }

    #[test]
    fn test_nested_condition_reuses_names() {
        let mut builder = ExpressionBuilder::new();
        let condition = Condition::exists("UserId").and(
            Condition::not_exists("jobLock").or(Condition::lt("jobLockExpiresAt", 1_000)),
        );

        let expression = builder.condition(&condition);

        assert_eq!(
            expression,
            "(attribute_exists(#n0) AND (attribute_not_exists(#n1) OR #n2 < :v0))"
        );

        let mut builder = ExpressionBuilder::new();
        let expression =
            builder.condition(&Condition::eq("Status", "A").or(Condition::eq("Status", "B")));
        assert_eq!(expression, "(#n0 = :v0 OR #n0 = :v1)");
        let (names, _) = builder.into_parts();
        assert_eq!(names.unwrap().len(), 1);
    }

    #[test]
    fn test_update_expression_skips_key() {
        let mut builder = ExpressionBuilder::new();
        let key = ItemKey::new("UserId", "u1");
        let update = UpdateSpec::new()
            .set("UserId", "u1")
            .set("Name", "Jane")
            .remove("jobLock");

        let expression = builder.update(&key, &update);

        assert_eq!(expression.as_deref(), Some("SET #n0 = :v0 REMOVE #n1"));
        let (names, _) = builder.into_parts();
        let names = names.unwrap();
        assert_eq!(names["#n0"], "Name");
        assert_eq!(names["#n1"], "jobLock");
    }

    #[test]
    fn test_empty_update() {
        let mut builder = ExpressionBuilder::new();
        let key = ItemKey::new("UserId", "u1");

        assert_eq!(builder.update(&key, &UpdateSpec::new()), None);
        assert_eq!(builder.into_parts(), (None, None));
    }
}
