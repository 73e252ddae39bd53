use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentType {
    /// Add a fixed amount to the current price.
    Amount,
    /// Add a percentage of the current price.
    Percentage,
    /// Move the price to a fixed target.
    Fixed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    /// Inclusive range `operand1..=operand2`.
    #[serde(rename = "<>")]
    Between,
    /// Strictly outside `operand1..=operand2`.
    #[serde(rename = "><")]
    Outside,
}

impl Operator {
    #[must_use]
    pub fn evaluate(self, value: Decimal, operand1: Decimal, operand2: Option<Decimal>) -> bool {
        match self {
            Operator::Eq => value == operand1,
            Operator::Ne => value != operand1,
            Operator::Gt => value > operand1,
            Operator::Ge => value >= operand1,
            Operator::Lt => value < operand1,
            Operator::Le => value <= operand1,
            // A range with no upper bound never matches.
            Operator::Between => operand2.is_some_and(|hi| value >= operand1 && value <= hi),
            Operator::Outside => operand2.is_some_and(|hi| value < operand1 || value > hi),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCondition {
    /// Name of the evaluated field. Only the current price is supported.
    #[serde(default = "default_condition_field")]
    pub field: String,
    pub operator: Operator,
    pub operand1: Decimal,
    #[serde(default)]
    pub operand2: Option<Decimal>,
}

fn default_condition_field() -> String {
    "price".to_string()
}

impl RuleCondition {
    #[must_use]
    pub fn holds(&self, current_price: Decimal) -> bool {
        self.operator
            .evaluate(current_price, self.operand1, self.operand2)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingRule {
    pub service_name: String,
    /// Service type ids the rule applies to.
    pub services: Vec<i64>,
    pub adjustment_type: AdjustmentType,
    pub adjustment: Decimal,
    #[serde(default)]
    pub conditions: Vec<RuleCondition>,
}

impl PricingRule {
    #[must_use]
    pub fn applies_to(&self, service_type_id: i64) -> bool {
        self.services.contains(&service_type_id)
    }

    /// Adjustment this rule yields for `current_price`; zero when a condition
    /// does not hold.
    #[must_use]
    pub fn adjustment_for(&self, current_price: Decimal) -> Decimal {
        if !self.conditions.iter().all(|c| c.holds(current_price)) {
            return Decimal::ZERO;
        }

        match self.adjustment_type {
            AdjustmentType::Amount => self.adjustment,
            AdjustmentType::Percentage => (current_price * self.adjustment / Decimal::ONE_HUNDRED)
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
            AdjustmentType::Fixed => self.adjustment - current_price,
            AdjustmentType::Unknown => Decimal::ZERO,
        }
    }
}

/// Evaluate `rules` in order for a service; the last rule covering the service
/// type wins. Returns `None` when no rule covers it.
#[must_use]
pub fn apply_rules(
    rules: &[PricingRule],
    service_type_id: i64,
    current_price: Decimal,
) -> Option<Decimal> {
    rules
        .iter()
        .filter(|rule| rule.applies_to(service_type_id))
        .last()
        .map(|rule| rule.adjustment_for(current_price))
}
