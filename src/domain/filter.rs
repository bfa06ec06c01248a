//! Attribute filter subset of CQL: comparisons joined by `AND`.
//!
//! `PERSONS > 20000000`, `STATE_NAME = 'Illinois' AND PERSONS >= 1000`.

use std::cmp::Ordering;
use std::str::FromStr;

use crate::domain::entities::{AttributeValue, Feature};
use crate::domain::error::DomainError;

const PARAMETER: &str = "cql_filter";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl ComparisonOp {
    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            ComparisonOp::Eq => ordering == Ordering::Equal,
            ComparisonOp::Ne => ordering != Ordering::Equal,
            ComparisonOp::Lt => ordering == Ordering::Less,
            ComparisonOp::Le => ordering != Ordering::Greater,
            ComparisonOp::Gt => ordering == Ordering::Greater,
            ComparisonOp::Ge => ordering != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub attribute: String,
    pub op: ComparisonOp,
    pub literal: Literal,
}

impl Comparison {
    /// Missing and null attributes never match.
    pub fn matches(&self, feature: &Feature) -> bool {
        let Some(value) = feature.attribute(&self.attribute) else {
            return false;
        };
        let ordering = match (value, &self.literal) {
            (AttributeValue::Null, _) => None,
            (AttributeValue::Integer(value), Literal::Number(literal)) => {
                (*value as f64).partial_cmp(literal)
            }
            (AttributeValue::Float(value), Literal::Number(literal)) => value.partial_cmp(literal),
            (AttributeValue::Text(value), Literal::Number(literal)) => value
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(|value| value.partial_cmp(literal)),
            (value, Literal::Text(literal)) => Some(value.to_string().as_str().cmp(literal.as_str())),
            (_, Literal::Number(_)) => None,
        };
        ordering.is_some_and(|ordering| self.op.accepts(ordering))
    }
}

/// Conjunction of attribute comparisons.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeFilter {
    comparisons: Vec<Comparison>,
}

impl AttributeFilter {
    pub fn comparisons(&self) -> &[Comparison] {
        &self.comparisons
    }

    pub fn matches(&self, feature: &Feature) -> bool {
        self.comparisons
            .iter()
            .all(|comparison| comparison.matches(feature))
    }
}

impl FromStr for AttributeFilter {
    type Err = DomainError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let comparisons = split_conjunction(raw)
            .into_iter()
            .map(parse_comparison)
            .collect::<Result<Vec<_>, _>>()?;
        if comparisons.is_empty() {
            return Err(DomainError::invalid(PARAMETER, "filter is empty"));
        }
        Ok(Self { comparisons })
    }
}

/// Split on ` AND ` outside quoted literals, case-insensitively.
fn split_conjunction(raw: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let bytes = raw.as_bytes();
    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'\'' => quoted = !quoted,
            b' ' if !quoted
                && raw
                    .get(index..index + 5)
                    .is_some_and(|word| word.eq_ignore_ascii_case(" and ")) =>
            {
                parts.push(raw[start..index].trim());
                index += 5;
                start = index;
                continue;
            }
            _ => {}
        }
        index += 1;
    }
    parts.push(raw[start..].trim());
    parts.into_iter().filter(|part| !part.is_empty()).collect()
}

fn parse_comparison(raw: &str) -> Result<Comparison, DomainError> {
    let position = raw
        .find(['=', '<', '>', '!'])
        .ok_or_else(|| DomainError::invalid(PARAMETER, format!("no comparison in `{raw}`")))?;
    let rest = &raw[position..];
    let (op, width) = if rest.starts_with("<=") {
        (ComparisonOp::Le, 2)
    } else if rest.starts_with(">=") {
        (ComparisonOp::Ge, 2)
    } else if rest.starts_with("<>") || rest.starts_with("!=") {
        (ComparisonOp::Ne, 2)
    } else if rest.starts_with('=') {
        (ComparisonOp::Eq, 1)
    } else if rest.starts_with('<') {
        (ComparisonOp::Lt, 1)
    } else if rest.starts_with('>') {
        (ComparisonOp::Gt, 1)
    } else {
        return Err(DomainError::invalid(
            PARAMETER,
            format!("unsupported operator in `{raw}`"),
        ));
    };

    let attribute = raw[..position].trim();
    if attribute.is_empty()
        || !attribute
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
    {
        return Err(DomainError::invalid(
            PARAMETER,
            format!("unsupported attribute expression `{attribute}`"),
        ));
    }

    Ok(Comparison {
        attribute: attribute.to_string(),
        op,
        literal: parse_literal(raw[position + width..].trim())?,
    })
}

fn parse_literal(raw: &str) -> Result<Literal, DomainError> {
    if let Some(text) = raw
        .strip_prefix('\'')
        .and_then(|inner| inner.strip_suffix('\''))
    {
        return Ok(Literal::Text(text.replace("''", "'")));
    }
    raw.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .map(Literal::Number)
        .ok_or_else(|| DomainError::invalid(PARAMETER, format!("unsupported literal `{raw}`")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::point;

    fn state(name: &str, persons: i64) -> Feature {
        Feature::new("states.1", point!(x: -89.5, y: 40.0).into())
            .with_attribute("STATE_NAME", AttributeValue::Text(name.into()))
            .with_attribute("PERSONS", AttributeValue::Integer(persons))
            .with_attribute("NOTE", AttributeValue::Null)
    }

    #[test]
    fn numeric_comparison() {
        let filter: AttributeFilter = "PERSONS>20000000".parse().expect("valid filter");
        assert!(filter.matches(&state("California", 29_760_021)));
        assert!(!filter.matches(&state("Illinois", 11_430_602)));

        let at_least: AttributeFilter = "PERSONS >= 11430602".parse().expect("valid filter");
        assert!(at_least.matches(&state("Illinois", 11_430_602)));
    }

    #[test]
    fn conjunction_with_quoted_text() {
        let filter: AttributeFilter = "STATE_NAME = 'Land and Sea' and PERSONS < 100"
            .parse()
            .expect("valid filter");
        assert_eq!(filter.comparisons().len(), 2);
        assert_eq!(
            filter.comparisons()[0].literal,
            Literal::Text("Land and Sea".into())
        );
        assert!(filter.matches(&state("Land and Sea", 10)));
        assert!(!filter.matches(&state("Land and Sea", 1000)));
        assert!(!filter.matches(&state("Illinois", 10)));
    }

    #[test]
    fn missing_and_null_attributes_do_not_match() {
        let missing: AttributeFilter = "AREA <> 0".parse().expect("valid filter");
        assert!(!missing.matches(&state("Illinois", 1)));
        let null: AttributeFilter = "NOTE = 'x'".parse().expect("valid filter");
        assert!(!null.matches(&state("Illinois", 1)));
    }

    #[test]
    fn unsupported_expressions_are_rejected() {
        for raw in ["", "BBOX(the_geom, 0, 0, 1, 1)", "PERSONS > abc", "a + b = 1"] {
            assert!(raw.parse::<AttributeFilter>().is_err(), "accepted `{raw}`");
        }
    }
}
