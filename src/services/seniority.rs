//! Seniority calculator
//!
//! Pure scoring of equipment against a configurable rule tree, plus the
//! strict total order that block partitioning consumes.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_json::{Map, Value};

use crate::{
    error::{AppError, AppResult},
    models::{DistrictEquipmentType, Equipment},
};

const DEFAULT_CLASS: &str = "default";

/// Scoring class of an equipment type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EquipmentClass {
    Default,
    DumpTruck,
}

impl EquipmentClass {
    pub fn for_type(equipment_type: &DistrictEquipmentType) -> Self {
        if equipment_type.is_dump_truck {
            EquipmentClass::DumpTruck
        } else {
            EquipmentClass::Default
        }
    }

    /// Key used in the rule tree
    pub fn key(self) -> &'static str {
        match self {
            EquipmentClass::Default => DEFAULT_CLASS,
            EquipmentClass::DumpTruck => "dump_truck",
        }
    }
}

/// One named rule: a value per class (or per district for adjustments)
type RuleTable = BTreeMap<String, f64>;

/// Parsed seniority scoring rules
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringRules {
    equipment_score: RuleTable,
    max_years_of_service: RuleTable,
    hours_weight: RuleTable,
    owner_years_weight: RuleTable,
    district_adjustment: RuleTable,
}

impl ScoringRules {
    /// Parse the rule tree, rejecting malformed or missing required rules
    pub fn from_value(value: &Value) -> AppResult<Self> {
        let root = value.as_object().ok_or_else(|| {
            AppError::Configuration("seniority_scoring_rules must be an object".to_string())
        })?;

        let equipment_score = rule_table(root, "equipment_score")?.ok_or_else(|| {
            AppError::Configuration("Missing scoring rule: equipment_score".to_string())
        })?;

        Ok(Self {
            equipment_score,
            max_years_of_service: rule_table(root, "max_years_of_service")?.unwrap_or_default(),
            hours_weight: rule_table(root, "hours_weight")?.unwrap_or_default(),
            owner_years_weight: rule_table(root, "owner_years_weight")?.unwrap_or_default(),
            district_adjustment: rule_table(root, "district_adjustment")?.unwrap_or_default(),
        })
    }

    fn class_value(table: &RuleTable, class: EquipmentClass) -> Option<f64> {
        table
            .get(class.key())
            .or_else(|| table.get(DEFAULT_CLASS))
            .copied()
    }

    /// Points per year of service; required for every class in use
    pub fn equipment_score(&self, class: EquipmentClass) -> AppResult<f64> {
        Self::class_value(&self.equipment_score, class).ok_or_else(|| {
            AppError::Configuration(format!(
                "Missing scoring rule: equipment_score.{} (and no equipment_score.default)",
                class.key()
            ))
        })
    }

    /// Score one piece of equipment. Deterministic; rounded to 3 decimals.
    pub fn calculate(
        &self,
        equipment: &Equipment,
        class: EquipmentClass,
        district_id: i32,
    ) -> AppResult<f64> {
        let points_per_year = self.equipment_score(class)?;

        let years = match Self::class_value(&self.max_years_of_service, class) {
            Some(cap) => equipment.years_of_service.min(cap),
            None => equipment.years_of_service,
        };
        let average_hours = (equipment.service_hours_last_year
            + equipment.service_hours_two_years_ago
            + equipment.service_hours_three_years_ago)
            / 3.0;
        let hours_weight = Self::class_value(&self.hours_weight, class).unwrap_or(1.0);
        let owner_weight = Self::class_value(&self.owner_years_weight, class).unwrap_or(0.0);
        let adjustment = self
            .district_adjustment
            .get(&district_id.to_string())
            .copied()
            .unwrap_or(0.0);

        let score = years * points_per_year
            + average_hours * hours_weight
            + equipment.owner_years_registered * owner_weight
            + adjustment;

        Ok((score * 1000.0).round() / 1000.0)
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Read one rule. A bare number is shorthand for `{ "default": n }`.
fn rule_table(root: &Map<String, Value>, name: &str) -> AppResult<Option<RuleTable>> {
    match root.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(entries)) => {
            let mut table = RuleTable::new();
            for (key, value) in entries {
                let number = as_number(value).ok_or_else(|| {
                    AppError::Configuration(format!("Scoring rule {}.{} is not a number", name, key))
                })?;
                table.insert(key.clone(), number);
            }
            Ok(Some(table))
        }
        Some(value) => {
            let number = as_number(value).ok_or_else(|| {
                AppError::Configuration(format!("Scoring rule {} is not a number", name))
            })?;
            Ok(Some(RuleTable::from([(DEFAULT_CLASS.to_string(), number)])))
        }
    }
}

/// Equipment with its computed score and 1-based rank
#[derive(Debug, Clone, PartialEq)]
pub struct RankedEquipment {
    pub equipment_id: i32,
    pub expected_version: i32,
    pub seniority: f64,
    pub received_date: Option<NaiveDate>,
    pub rank: i32,
}

/// Seniority order: score descending, registration date ascending (unknown
/// last), id ascending.
pub fn compare_seniority(
    a: (f64, Option<NaiveDate>, i32),
    b: (f64, Option<NaiveDate>, i32),
) -> Ordering {
    b.0.total_cmp(&a.0)
        .then_with(|| match (a.1, b.1) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.2.cmp(&b.2))
}

/// Score and rank a set of equipment into a strict total order
pub fn rank(
    equipment: &[Equipment],
    class: EquipmentClass,
    district_id: i32,
    rules: &ScoringRules,
) -> AppResult<Vec<RankedEquipment>> {
    let mut ranked = equipment
        .iter()
        .map(|e| {
            Ok(RankedEquipment {
                equipment_id: e.id,
                expected_version: e.version,
                seniority: rules.calculate(e, class, district_id)?,
                received_date: e.received_date,
                rank: 0,
            })
        })
        .collect::<AppResult<Vec<_>>>()?;

    ranked.sort_by(|a, b| {
        compare_seniority(
            (a.seniority, a.received_date, a.equipment_id),
            (b.seniority, b.received_date, b.equipment_id),
        )
    });
    for (index, item) in ranked.iter_mut().enumerate() {
        item.rank = index as i32 + 1;
    }
    Ok(ranked)
}
