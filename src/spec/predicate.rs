//! Row filters attached to updates, deletes, and queries.

use crate::types::{EntityId, Value};

/// Boolean filter over an entity's columns.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `column = value`
    Eq(String, Value),
    /// `column <> value`
    Ne(String, Value),
    /// `column > value`
    Gt(String, Value),
    /// `column >= value`
    Gte(String, Value),
    /// `column < value`
    Lt(String, Value),
    /// `column <= value`
    Lte(String, Value),
    /// `column IN (values)`; false when empty.
    In(String, Vec<Value>),
    /// `column NOT IN (values)`; true when empty.
    NotIn(String, Vec<Value>),
    /// `column IS NULL`
    IsNull(String),
    /// `column IS NOT NULL`
    NotNull(String),
    /// Substring match on text columns.
    Contains(String, String),
    /// String prefix match.
    HasPrefix(String, String),
    /// Every predicate holds; true when empty.
    And(Vec<Predicate>),
    /// Any predicate holds; false when empty.
    Or(Vec<Predicate>),
    /// Negation.
    Not(Box<Predicate>),
}

impl Predicate {
    /// Every column the predicate mentions, in first-seen order.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Eq(c, _)
            | Self::Ne(c, _)
            | Self::Gt(c, _)
            | Self::Gte(c, _)
            | Self::Lt(c, _)
            | Self::Lte(c, _)
            | Self::In(c, _)
            | Self::NotIn(c, _)
            | Self::IsNull(c)
            | Self::NotNull(c)
            | Self::Contains(c, _)
            | Self::HasPrefix(c, _) => {
                if !out.contains(&c.as_str()) {
                    out.push(c);
                }
            }
            Self::And(ps) | Self::Or(ps) => ps.iter().for_each(|p| p.collect_columns(out)),
            Self::Not(p) => p.collect_columns(out),
        }
    }

    /// Conjunction of `preds`; `None` when empty, the sole element when one.
    pub fn all(preds: &[Predicate]) -> Option<Predicate> {
        match preds {
            [] => None,
            [one] => Some(one.clone()),
            many => Some(Self::And(many.to_vec())),
        }
    }
}

/// `column = value`
pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Predicate {
    Predicate::Eq(column.into(), value.into())
}

/// `column <> value`
pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Predicate {
    Predicate::Ne(column.into(), value.into())
}

/// `column > value`
pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Predicate {
    Predicate::Gt(column.into(), value.into())
}

/// `column >= value`
pub fn gte(column: impl Into<String>, value: impl Into<Value>) -> Predicate {
    Predicate::Gte(column.into(), value.into())
}

/// `column < value`
pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Predicate {
    Predicate::Lt(column.into(), value.into())
}

/// `column <= value`
pub fn lte(column: impl Into<String>, value: impl Into<Value>) -> Predicate {
    Predicate::Lte(column.into(), value.into())
}

/// `column` is one of `values`.
pub fn is_in<V: Into<Value>>(column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Predicate {
    Predicate::In(column.into(), values.into_iter().map(Into::into).collect())
}

/// `column` is none of `values`.
pub fn not_in<V: Into<Value>>(
    column: impl Into<String>,
    values: impl IntoIterator<Item = V>,
) -> Predicate {
    Predicate::NotIn(column.into(), values.into_iter().map(Into::into).collect())
}

/// `column` is NULL.
pub fn is_null(column: impl Into<String>) -> Predicate {
    Predicate::IsNull(column.into())
}

/// `column` is not NULL.
pub fn not_null(column: impl Into<String>) -> Predicate {
    Predicate::NotNull(column.into())
}

/// `column` contains `needle`.
pub fn contains(column: impl Into<String>, needle: impl Into<String>) -> Predicate {
    Predicate::Contains(column.into(), needle.into())
}

/// `column` starts with `prefix`.
pub fn has_prefix(column: impl Into<String>, prefix: impl Into<String>) -> Predicate {
    Predicate::HasPrefix(column.into(), prefix.into())
}

/// Every predicate holds.
pub fn and(preds: impl IntoIterator<Item = Predicate>) -> Predicate {
    Predicate::And(preds.into_iter().collect())
}

/// Any predicate holds.
pub fn or(preds: impl IntoIterator<Item = Predicate>) -> Predicate {
    Predicate::Or(preds.into_iter().collect())
}

/// `pred` does not hold.
pub fn not(pred: Predicate) -> Predicate {
    Predicate::Not(Box::new(pred))
}

/// Matches the row whose id column equals `id`.
pub fn id_eq(id_column: &str, id: &EntityId) -> Predicate {
    eq(id_column, id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_are_collected_once() {
        let p = and([
            eq("name", "x"),
            or([is_null("description"), contains("name", "y")]),
            not(gt("createTime", 5i64)),
        ]);
        assert_eq!(p.columns(), vec!["name", "description", "createTime"]);
    }

    #[test]
    fn all_flattens_small_inputs() {
        assert_eq!(Predicate::all(&[]), None);
        assert_eq!(Predicate::all(&[eq("a", 1i64)]), Some(eq("a", 1i64)));
    }
}
