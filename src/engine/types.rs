use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ApsisError;

/// Allow or deny. Deny beats allow in every aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Effect::Allow => "allow",
            Effect::Deny => "deny",
        }
    }
}

impl FromStr for Effect {
    type Err = ApsisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(Effect::Allow),
            "deny" => Ok(Effect::Deny),
            other => Err(ApsisError::InvalidParameter(format!("effect: {other}"))),
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attribute value types the evaluators understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    String,
    Number,
    Boolean,
    Float,
    Datetime,
    Array,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Number => "number",
            DataType::Boolean => "boolean",
            DataType::Float => "float",
            DataType::Datetime => "datetime",
            DataType::Array => "array",
        }
    }
}

impl FromStr for DataType {
    type Err = ApsisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(DataType::String),
            "number" => Ok(DataType::Number),
            "boolean" => Ok(DataType::Boolean),
            "float" => Ok(DataType::Float),
            "datetime" => Ok(DataType::Datetime),
            "array" => Ok(DataType::Array),
            other => Err(ApsisError::UnknownDataType(other.to_string())),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which attribute bag a definition draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Subject,
    Resource,
    Environment,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Subject => "subject",
            EntityType::Resource => "resource",
            EntityType::Environment => "environment",
        }
    }
}

impl FromStr for EntityType {
    type Err = ApsisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "subject" => Ok(EntityType::Subject),
            "resource" => Ok(EntityType::Resource),
            "environment" => Ok(EntityType::Environment),
            other => Err(ApsisError::InvalidParameter(format!("entity type: {other}"))),
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison and boolean operators a rule node may carry, in wire form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "NOT IN")]
    NotIn,
    #[serde(rename = "ANY")]
    Any,
    #[serde(rename = "ALL")]
    All,
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
    #[serde(rename = "NOT")]
    Not,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::Any => "ANY",
            Operator::All => "ALL",
            Operator::And => "AND",
            Operator::Or => "OR",
            Operator::Not => "NOT",
        }
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, Operator::And | Operator::Or | Operator::Not)
    }
}

impl FromStr for Operator {
    type Err = ApsisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "=" => Ok(Operator::Eq),
            "!=" => Ok(Operator::Ne),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Le),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Ge),
            "IN" => Ok(Operator::In),
            "NOT IN" => Ok(Operator::NotIn),
            "ANY" => Ok(Operator::Any),
            "ALL" => Ok(Operator::All),
            "AND" => Ok(Operator::And),
            "OR" => Ok(Operator::Or),
            "NOT" => Ok(Operator::Not),
            other => Err(ApsisError::InvalidParameter(format!("operator: {other}"))),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authoritative attribute definition as the engine sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDef {
    pub id: i64,
    pub name: String,
    pub data_type: DataType,
    pub entity_type: EntityType,
}

/// The three attribute bags a rule tree evaluates against, keyed by
/// attribute definition id.
#[derive(Debug, Clone, Default)]
pub struct AttributeBags {
    pub subject: HashMap<i64, String>,
    pub resource: HashMap<i64, String>,
    pub environment: HashMap<i64, String>,
}

impl AttributeBags {
    pub fn lookup(&self, entity_type: EntityType, attr_def_id: i64) -> Option<&String> {
        match entity_type {
            EntityType::Subject => self.subject.get(&attr_def_id),
            EntityType::Resource => self.resource.get(&attr_def_id),
            EntityType::Environment => self.environment.get(&attr_def_id),
        }
    }

    pub fn insert(&mut self, entity_type: EntityType, attr_def_id: i64, value: String) {
        match entity_type {
            EntityType::Subject => self.subject.insert(attr_def_id, value),
            EntityType::Resource => self.resource.insert(attr_def_id, value),
            EntityType::Environment => self.environment.insert(attr_def_id, value),
        };
    }
}

/// One entry of a user's effective-permission snapshot (C3 output).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectivePermission {
    pub permission_id: i64,
    pub resource_type: String,
    pub resource_key: String,
    pub action: String,
    pub effect: Effect,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effect_roundtrip() {
        assert_eq!("allow".parse::<Effect>().unwrap(), Effect::Allow);
        assert_eq!(Effect::Deny.as_str(), "deny");
        assert!("maybe".parse::<Effect>().is_err());
    }

    #[test]
    fn operator_wire_forms() {
        for op in [
            Operator::Eq,
            Operator::Ne,
            Operator::Lt,
            Operator::Le,
            Operator::Gt,
            Operator::Ge,
            Operator::In,
            Operator::NotIn,
            Operator::Any,
            Operator::All,
            Operator::And,
            Operator::Or,
            Operator::Not,
        ] {
            assert_eq!(op.as_str().parse::<Operator>().unwrap(), op);
        }
    }

    #[test]
    fn bags_route_by_entity_type() {
        let mut bags = AttributeBags::default();
        bags.insert(EntityType::Subject, 1, "a".into());
        bags.insert(EntityType::Environment, 1, "b".into());
        assert_eq!(bags.lookup(EntityType::Subject, 1).unwrap(), "a");
        assert_eq!(bags.lookup(EntityType::Environment, 1).unwrap(), "b");
        assert!(bags.lookup(EntityType::Resource, 1).is_none());
    }
}
