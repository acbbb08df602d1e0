//! Rule-tree executor.
//!
//! The persisted form stores each rule as a row with left_id/right_id; the
//! in-memory form is an arena (`Vec<RuleNode>` with index links) hydrated
//! from the flat row list. Evaluation is pure: it walks the roots, resolves
//! leaves against the attribute bags, and combines with AND/OR/NOT. A leaf
//! whose comparison cannot run evaluates to false.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use super::evaluators;
use super::types::{AttributeBags, AttributeDef, DataType, EntityType, Operator};
use crate::entities::policy_rule;
use crate::errors::ApsisError;

#[derive(Debug, Clone)]
pub struct RuleNode {
    pub id: i64,
    pub attr_def_id: i64,
    pub value: String,
    pub operator: Operator,
    pub left: Option<usize>,
    pub right: Option<usize>,
    /// Filled by [`RuleTree::decorate`] with the authoritative definition.
    pub data_type: Option<DataType>,
    pub entity_type: Option<EntityType>,
}

impl RuleNode {
    fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RuleTree {
    nodes: Vec<RuleNode>,
    roots: Vec<usize>,
}

impl RuleTree {
    /// Materializes the tree from a policy's flat rule rows.
    ///
    /// The child set is the union of all non-zero left_id/right_id; roots are
    /// the rules referenced by no other rule. Dangling references and cycles
    /// are rejected.
    pub fn hydrate(rows: &[policy_rule::Model]) -> Result<Self, ApsisError> {
        let by_id: HashMap<i64, &policy_rule::Model> =
            rows.iter().map(|row| (row.id, row)).collect();

        let mut child_ids = HashSet::new();
        for row in rows {
            if row.left_id != 0 {
                child_ids.insert(row.left_id);
            }
            if row.right_id != 0 {
                child_ids.insert(row.right_id);
            }
        }

        let mut tree = RuleTree::default();
        let mut path = HashSet::new();
        for row in rows {
            if !child_ids.contains(&row.id) {
                let idx = tree.add_node(row.id, &by_id, &mut path)?;
                tree.roots.push(idx);
            }
        }
        // Every rule a child of another rule means the forest is one big cycle.
        if tree.roots.is_empty() && !rows.is_empty() {
            return Err(ApsisError::InvalidParameter("rule forest has no roots".to_string()));
        }
        Ok(tree)
    }

    fn add_node(
        &mut self,
        id: i64,
        by_id: &HashMap<i64, &policy_rule::Model>,
        path: &mut HashSet<i64>,
    ) -> Result<usize, ApsisError> {
        let row = by_id
            .get(&id)
            .ok_or_else(|| ApsisError::InvalidParameter(format!("rule {id} not found in policy")))?;
        if !path.insert(id) {
            return Err(ApsisError::InvalidParameter(format!("rule cycle through {id}")));
        }

        let left = if row.left_id != 0 {
            Some(self.add_node(row.left_id, by_id, path)?)
        } else {
            None
        };
        let right = if row.right_id != 0 {
            Some(self.add_node(row.right_id, by_id, path)?)
        } else {
            None
        };
        path.remove(&id);

        self.nodes.push(RuleNode {
            id: row.id,
            attr_def_id: row.attr_def_id,
            value: row.value.clone(),
            operator: Operator::from_str(&row.operator)?,
            left,
            right,
            data_type: None,
            entity_type: None,
        });
        Ok(self.nodes.len() - 1)
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Stamps every leaf with the authoritative attribute definition.
    /// A leaf referencing an unknown definition is an error: the policy
    /// cannot be evaluated meaningfully without it.
    pub fn decorate(&mut self, defs: &HashMap<i64, AttributeDef>) -> Result<(), ApsisError> {
        for node in &mut self.nodes {
            if node.operator.is_boolean() {
                continue;
            }
            let def = defs
                .get(&node.attr_def_id)
                .ok_or_else(|| ApsisError::AttributeNotFound(node.attr_def_id.to_string()))?;
            node.data_type = Some(def.data_type);
            node.entity_type = Some(def.entity_type);
        }
        Ok(())
    }

    /// Evaluates all roots, combined by AND. Mutates nothing.
    pub fn evaluate(&self, bags: &AttributeBags) -> bool {
        self.roots.iter().all(|&root| self.eval_node(root, bags))
    }

    fn eval_node(&self, idx: usize, bags: &AttributeBags) -> bool {
        let node = &self.nodes[idx];
        if node.is_leaf() {
            return self.eval_leaf(node, bags);
        }
        // A null child short-circuits to true, so a one-sided AND is an
        // identity over the present side.
        let left = node.left.map(|i| self.eval_node(i, bags)).unwrap_or(true);
        let right = node.right.map(|i| self.eval_node(i, bags)).unwrap_or(true);
        match node.operator {
            Operator::And => left && right,
            Operator::Or => {
                // With one side absent, OR degrades to the present side.
                match (node.left, node.right) {
                    (Some(_), Some(_)) => left || right,
                    (Some(_), None) => left,
                    (None, Some(_)) => right,
                    (None, None) => true,
                }
            }
            Operator::Not => !right,
            // A comparison operator on an internal node is malformed.
            _ => false,
        }
    }

    fn eval_leaf(&self, node: &RuleNode, bags: &AttributeBags) -> bool {
        let (Some(data_type), Some(entity_type)) = (node.data_type, node.entity_type) else {
            return false;
        };
        let Some(actual) = bags.lookup(entity_type, node.attr_def_id) else {
            return false;
        };
        evaluators::evaluate(data_type, &node.value, actual, node.operator).unwrap_or(false)
    }
}
