// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Table-mapping rule set attached to a replication task.
//!
//! The document is the JSON rule list the replication service understands:
//! a `selection` rule naming one (schema, table) pair and, when the full load
//! is range-partitioned, a `table-settings` rule carrying a `parallel-load`
//! block with the [`SplitPlan`] boundaries.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::splits::SplitPlan;

/// Ordered rule set of one replication task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMapping {
    /// Mapping rules in evaluation order.
    pub rules: Vec<MappingRule>,
}

/// One mapping rule, discriminated by `rule-type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule-type", rename_all = "kebab-case")]
pub enum MappingRule {
    /// Includes a table in the task.
    Selection(SelectionRule),
    /// Per-table load settings.
    TableSettings(TableSettingsRule),
}

/// Schema and table a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ObjectLocator {
    /// Source schema.
    pub schema_name: String,
    /// Source table.
    pub table_name: String,
}

/// `selection` rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SelectionRule {
    pub rule_id: String,
    pub rule_name: String,
    pub object_locator: ObjectLocator,
    pub rule_action: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<SourceFilter>,
}

/// Row filter on a selection rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SourceFilter {
    pub filter_type: String,
    pub column_name: String,
    pub filter_conditions: Vec<FilterCondition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FilterCondition {
    pub filter_operator: String,
    pub value: String,
}

/// `table-settings` rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TableSettingsRule {
    pub rule_id: String,
    pub rule_name: String,
    pub object_locator: ObjectLocator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_load: Option<ParallelLoad>,
}

/// Range-partitioned parallel load.
///
/// Each boundary is a single-element list since only one partition column is
/// ever used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelLoad {
    #[serde(rename = "type")]
    pub load_type: String,
    pub columns: Vec<String>,
    pub boundaries: Vec<Vec<String>>,
}

impl TableMapping {
    /// Single selection rule including `schema.table`.
    pub fn single_table(schema_name: &str, table_name: &str) -> Self {
        Self {
            rules: vec![MappingRule::Selection(SelectionRule {
                rule_id: "1".to_string(),
                rule_name: "1".to_string(),
                object_locator: locator(schema_name, table_name),
                rule_action: "include".to_string(),
                filters: Vec::new(),
            })],
        }
    }

    /// Selection rule filtered to non-negative partition values plus a
    /// `parallel-load` rule with the plan's ranges.
    pub fn partitioned(schema_name: &str, table_name: &str, plan: &SplitPlan) -> Self {
        let column = plan.partition_column.clone();
        Self {
            rules: vec![
                MappingRule::Selection(SelectionRule {
                    rule_id: "1".to_string(),
                    rule_name: "1".to_string(),
                    object_locator: locator(schema_name, table_name),
                    rule_action: "include".to_string(),
                    filters: vec![SourceFilter {
                        filter_type: "source".to_string(),
                        column_name: column.clone(),
                        filter_conditions: vec![FilterCondition {
                            filter_operator: "gte".to_string(),
                            value: "0".to_string(),
                        }],
                    }],
                }),
                MappingRule::TableSettings(TableSettingsRule {
                    rule_id: "2".to_string(),
                    rule_name: "2".to_string(),
                    object_locator: locator(schema_name, table_name),
                    parallel_load: Some(ParallelLoad {
                        load_type: "ranges".to_string(),
                        columns: vec![column],
                        boundaries: plan.boundaries.iter().map(|b| vec![b.clone()]).collect(),
                    }),
                }),
            ],
        }
    }

    /// Partitioned when a plan is supplied, single-table otherwise.
    pub fn for_table(schema_name: &str, table_name: &str, plan: Option<&SplitPlan>) -> Self {
        match plan {
            Some(plan) => Self::partitioned(schema_name, table_name, plan),
            None => Self::single_table(schema_name, table_name),
        }
    }

    /// Locator of the first selection rule.
    pub fn object_locator(&self) -> Option<&ObjectLocator> {
        self.rules.iter().find_map(|rule| match rule {
            MappingRule::Selection(s) => Some(&s.object_locator),
            MappingRule::TableSettings(_) => None,
        })
    }

    /// Recover the split plan from a `parallel-load` rule, if any.
    pub fn split_plan(&self) -> Option<SplitPlan> {
        self.rules.iter().find_map(|rule| {
            let MappingRule::TableSettings(settings) = rule else {
                return None;
            };
            let load = settings.parallel_load.as_ref()?;
            let column = load.columns.first()?;
            Some(SplitPlan {
                partition_column: column.clone(),
                boundaries: load
                    .boundaries
                    .iter()
                    .filter_map(|b| b.first().cloned())
                    .collect(),
            })
        })
    }

    /// Serialize to the service's JSON document.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a JSON mapping document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

fn locator(schema_name: &str, table_name: &str) -> ObjectLocator {
    ObjectLocator {
        schema_name: schema_name.to_string(),
        table_name: table_name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_table_document() {
        let mapping = TableMapping::single_table("SALES", "ORDERS");
        let value: serde_json::Value = serde_json::from_str(&mapping.to_json().unwrap()).unwrap();

        assert_eq!(
            value,
            json!({
                "rules": [{
                    "rule-type": "selection",
                    "rule-id": "1",
                    "rule-name": "1",
                    "object-locator": {"schema-name": "SALES", "table-name": "ORDERS"},
                    "rule-action": "include"
                }]
            })
        );
        assert!(mapping.split_plan().is_none());
    }

    #[test]
    fn test_partitioned_round_trip() {
        let plan = SplitPlan::new("ID", ["100", "200", "300"]);
        let mapping = TableMapping::partitioned("SALES", "ORDERS", &plan);

        let parsed = TableMapping::from_json(&mapping.to_json().unwrap()).unwrap();
        let recovered = parsed.split_plan().unwrap();

        assert_eq!(recovered.partition_column, "ID");
        assert_eq!(recovered.boundaries, vec!["100", "200", "300"]);
        assert_eq!(parsed, mapping);
    }

    #[test]
    fn test_partitioned_document_shape() {
        let plan = SplitPlan::new("ID", ["100", "200"]);
        let value: serde_json::Value =
            serde_json::to_value(TableMapping::partitioned("SALES", "ORDERS", &plan)).unwrap();

        let selection = &value["rules"][0];
        assert_eq!(selection["filters"][0]["column-name"], "ID");
        assert_eq!(
            selection["filters"][0]["filter-conditions"][0],
            json!({"filter-operator": "gte", "value": "0"})
        );

        let settings = &value["rules"][1];
        assert_eq!(settings["rule-type"], "table-settings");
        assert_eq!(
            settings["parallel-load"],
            json!({"type": "ranges", "columns": ["ID"], "boundaries": [["100"], ["200"]]})
        );
    }

    #[test]
    fn test_object_locator() {
        let mapping = TableMapping::for_table("HR", "EMPLOYEES", None);
        let locator = mapping.object_locator().unwrap();
        assert_eq!(locator.schema_name, "HR");
        assert_eq!(locator.table_name, "EMPLOYEES");
    }
}
