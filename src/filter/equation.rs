//! Parser and evaluator for advanced filter equations such as
//! `(1 AND 2) OR 3`.

use crate::error::{TransformError, TransformResult};
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

/// Parser for filter equations.
#[derive(Parser)]
#[grammar = "filter/equation.pest"]
pub struct EquationParser;

/// Parsed equation over item results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Equation {
    /// 1-based index of a filter item
    Item(usize),
    And(Vec<Equation>),
    Or(Vec<Equation>),
}

fn invalid(message: String) -> TransformError {
    TransformError::Configuration(format!("Invalid filter equation: {}", message))
}

impl Equation {
    /// Equation combining all `count` items with AND.
    pub fn all(count: usize) -> Self {
        Equation::And((1..=count).map(Equation::Item).collect())
    }

    /// Equation combining all `count` items with OR.
    pub fn any(count: usize) -> Self {
        Equation::Or((1..=count).map(Equation::Item).collect())
    }

    /// Parses `input`, checking every index against `item_count`.
    pub fn parse(input: &str, item_count: usize) -> TransformResult<Self> {
        let mut pairs = EquationParser::parse(Rule::equation, input)
            .map_err(|e| invalid(format!("'{}': {}", input, e)))?;
        let equation = pairs
            .next()
            .and_then(|pair| pair.into_inner().next())
            .ok_or_else(|| invalid(format!("'{}' is empty", input)))?;
        let parsed = Self::build(equation)?;
        parsed.check_indices(item_count)?;
        Ok(parsed)
    }

    fn build(pair: Pair<Rule>) -> TransformResult<Self> {
        match pair.as_rule() {
            Rule::index => {
                let text = pair.as_str();
                text.parse::<usize>()
                    .map(Equation::Item)
                    .map_err(|_| invalid(format!("bad index '{}'", text)))
            }
            Rule::and_expr | Rule::or_expr => {
                let is_and = pair.as_rule() == Rule::and_expr;
                let mut operands = Vec::new();
                for inner in pair.into_inner() {
                    if matches!(inner.as_rule(), Rule::and_op | Rule::or_op) {
                        continue;
                    }
                    operands.push(Self::build(inner)?);
                }
                if operands.len() == 1 {
                    return Ok(operands.remove(0));
                }
                Ok(if is_and {
                    Equation::And(operands)
                } else {
                    Equation::Or(operands)
                })
            }
            other => Err(invalid(format!("unexpected rule {:?}", other))),
        }
    }

    fn check_indices(&self, item_count: usize) -> TransformResult<()> {
        match self {
            Equation::Item(index) if *index == 0 || *index > item_count => Err(invalid(format!(
                "item {} does not exist ({} items defined)",
                index, item_count
            ))),
            Equation::Item(_) => Ok(()),
            Equation::And(operands) | Equation::Or(operands) => operands
                .iter()
                .try_for_each(|operand| operand.check_indices(item_count)),
        }
    }

    /// Evaluates against per-item results, `results[0]` being item 1.
    pub fn evaluate(&self, results: &[bool]) -> bool {
        match self {
            Equation::Item(index) => index
                .checked_sub(1)
                .and_then(|i| results.get(i))
                .copied()
                .unwrap_or(false),
            Equation::And(operands) => operands.iter().all(|o| o.evaluate(results)),
            Equation::Or(operands) => operands.iter().any(|o| o.evaluate(results)),
        }
    }
}
