//! Filter expressions over document fields.
//!
//! A [`Filter`] is built explicitly (usually through [`field`]) and can be
//! rendered into the store's SQL dialect with [`Filter::to_sql_query`] or
//! evaluated against a JSON document with [`Filter::matches`]. Evaluation
//! follows the store's rules for missing fields: a comparison against a field
//! the document does not define is *undefined*, `NOT undefined` stays
//! undefined, and only documents whose filter evaluates to `true` match.

use std::cmp::Ordering;
use std::ops::Not;

use serde::Serialize;
use serde_json::Value;

use crate::errors::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Comparison {
    fn sql_operator(self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Ne => "!=",
            Comparison::Lt => "<",
            Comparison::Lte => "<=",
            Comparison::Gt => ">",
            Comparison::Gte => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every document.
    All,
    Compare {
        field: String,
        op: Comparison,
        value: Value,
    },
    In {
        field: String,
        values: Vec<Value>,
    },
    Contains {
        field: String,
        value: String,
    },
    StartsWith {
        field: String,
        prefix: String,
    },
    Exists {
        field: String,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

/// Starts a filter on a dotted field path such as `"address.city"`.
#[must_use]
pub fn field(path: &str) -> FluentFilter {
    FluentFilter {
        field: path.to_string(),
    }
}

pub struct FluentFilter {
    field: String,
}

impl FluentFilter {
    fn compare(self, op: Comparison, value: impl Into<Value>) -> Filter {
        Filter::Compare {
            field: self.field,
            op,
            value: value.into(),
        }
    }

    #[must_use]
    pub fn eq(self, value: impl Into<Value>) -> Filter {
        self.compare(Comparison::Eq, value)
    }

    #[must_use]
    pub fn ne(self, value: impl Into<Value>) -> Filter {
        self.compare(Comparison::Ne, value)
    }

    #[must_use]
    pub fn lt(self, value: impl Into<Value>) -> Filter {
        self.compare(Comparison::Lt, value)
    }

    #[must_use]
    pub fn lte(self, value: impl Into<Value>) -> Filter {
        self.compare(Comparison::Lte, value)
    }

    #[must_use]
    pub fn gt(self, value: impl Into<Value>) -> Filter {
        self.compare(Comparison::Gt, value)
    }

    #[must_use]
    pub fn gte(self, value: impl Into<Value>) -> Filter {
        self.compare(Comparison::Gte, value)
    }

    #[must_use]
    pub fn is_in<V, I>(self, values: I) -> Filter
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Filter::In {
            field: self.field,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn contains(self, value: impl Into<String>) -> Filter {
        Filter::Contains {
            field: self.field,
            value: value.into(),
        }
    }

    #[must_use]
    pub fn starts_with(self, prefix: impl Into<String>) -> Filter {
        Filter::StartsWith {
            field: self.field,
            prefix: prefix.into(),
        }
    }

    #[must_use]
    pub fn exists(self) -> Filter {
        Filter::Exists { field: self.field }
    }
}

/// A parameterized query in the store's SQL dialect.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlQuery {
    pub query: String,
    pub parameters: Vec<SqlParameter>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlParameter {
    pub name: String,
    pub value: Value,
}

impl Filter {
    #[must_use]
    pub fn and(self, other: Filter) -> Filter {
        match self {
            Filter::And(mut parts) => {
                parts.push(other);
                Filter::And(parts)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    #[must_use]
    pub fn or(self, other: Filter) -> Filter {
        match self {
            Filter::Or(mut parts) => {
                parts.push(other);
                Filter::Or(parts)
            }
            first => Filter::Or(vec![first, other]),
        }
    }

    /// # Errors
    ///
    /// Returns `FilterError` if any field path is empty or has an empty segment.
    pub fn validate(&self) -> Result<(), StoreError> {
        match self {
            Filter::All => Ok(()),
            Filter::Compare { field, .. }
            | Filter::In { field, .. }
            | Filter::Contains { field, .. }
            | Filter::StartsWith { field, .. }
            | Filter::Exists { field } => field_segments(field).map(|_| ()),
            Filter::And(parts) | Filter::Or(parts) => parts.iter().try_for_each(Filter::validate),
            Filter::Not(inner) => inner.validate(),
        }
    }

    /// Renders the filter as `SELECT * FROM root r WHERE ...` with positional
    /// parameters `@p0`, `@p1`, ...
    ///
    /// # Errors
    ///
    /// Returns `FilterError` if the filter cannot be expressed, see
    /// [`Filter::validate`].
    pub fn to_sql_query(&self) -> Result<SqlQuery, StoreError> {
        let mut parameters = Vec::new();
        let query = match self {
            Filter::All => "SELECT * FROM root r".to_string(),
            filter => format!(
                "SELECT * FROM root r WHERE {}",
                render(filter, &mut parameters)?
            ),
        };
        Ok(SqlQuery { query, parameters })
    }

    #[must_use]
    pub fn matches(&self, document: &Value) -> bool {
        self.evaluate(document) == Some(true)
    }

    /// `None` stands for the store's *undefined*.
    fn evaluate(&self, document: &Value) -> Option<bool> {
        match self {
            Filter::All => Some(true),
            Filter::Compare { field, op, value } => compare(*op, lookup(document, field)?, value),
            Filter::In { field, values } => {
                let found = lookup(document, field)?;
                Some(values.iter().any(|v| json_equals(found, v)))
            }
            Filter::Contains { field, value } => lookup(document, field)?
                .as_str()
                .map(|s| s.contains(value.as_str())),
            Filter::StartsWith { field, prefix } => lookup(document, field)?
                .as_str()
                .map(|s| s.starts_with(prefix.as_str())),
            Filter::Exists { field } => Some(lookup(document, field).is_some()),
            Filter::And(parts) => {
                let mut undefined = false;
                for part in parts {
                    match part.evaluate(document) {
                        Some(false) => return Some(false),
                        None => undefined = true,
                        Some(true) => {}
                    }
                }
                if undefined { None } else { Some(true) }
            }
            Filter::Or(parts) => {
                let mut undefined = false;
                for part in parts {
                    match part.evaluate(document) {
                        Some(true) => return Some(true),
                        None => undefined = true,
                        Some(false) => {}
                    }
                }
                if undefined { None } else { Some(false) }
            }
            Filter::Not(inner) => inner.evaluate(document).map(|b| !b),
        }
    }
}

impl Not for Filter {
    type Output = Filter;

    fn not(self) -> Filter {
        Filter::Not(Box::new(self))
    }
}

fn field_segments(path: &str) -> Result<Vec<&str>, StoreError> {
    if path.trim().is_empty() {
        return Err(StoreError::FilterError("empty field path".to_string()));
    }
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(StoreError::FilterError(format!(
            "field path '{path}' has an empty segment"
        )));
    }
    Ok(segments)
}

fn field_expression(path: &str) -> Result<String, StoreError> {
    let mut expr = String::from("r");
    for segment in field_segments(path)? {
        expr.push('[');
        expr.push_str(&serde_json::to_string(segment)?);
        expr.push(']');
    }
    Ok(expr)
}

fn bind(parameters: &mut Vec<SqlParameter>, value: Value) -> String {
    let name = format!("@p{}", parameters.len());
    parameters.push(SqlParameter {
        name: name.clone(),
        value,
    });
    name
}

fn render(filter: &Filter, parameters: &mut Vec<SqlParameter>) -> Result<String, StoreError> {
    Ok(match filter {
        Filter::All => "true".to_string(),
        Filter::Compare { field, op, value } => {
            let lhs = field_expression(field)?;
            let rhs = bind(parameters, value.clone());
            format!("{lhs} {} {rhs}", op.sql_operator())
        }
        Filter::In { field, values } => {
            let lhs = field_expression(field)?;
            let rhs = bind(parameters, Value::Array(values.clone()));
            format!("ARRAY_CONTAINS({rhs}, {lhs})")
        }
        Filter::Contains { field, value } => {
            let lhs = field_expression(field)?;
            let rhs = bind(parameters, Value::String(value.clone()));
            format!("CONTAINS({lhs}, {rhs})")
        }
        Filter::StartsWith { field, prefix } => {
            let lhs = field_expression(field)?;
            let rhs = bind(parameters, Value::String(prefix.clone()));
            format!("STARTSWITH({lhs}, {rhs})")
        }
        Filter::Exists { field } => format!("IS_DEFINED({})", field_expression(field)?),
        Filter::And(parts) => join(parts, " AND ", "true", parameters)?,
        Filter::Or(parts) => join(parts, " OR ", "false", parameters)?,
        Filter::Not(inner) => format!("NOT ({})", render(inner, parameters)?),
    })
}

fn join(
    parts: &[Filter],
    separator: &str,
    empty: &str,
    parameters: &mut Vec<SqlParameter>,
) -> Result<String, StoreError> {
    if parts.is_empty() {
        return Ok(empty.to_string());
    }
    let rendered = parts
        .iter()
        .map(|p| render(p, parameters))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(format!("({})", rendered.join(separator)))
}

fn lookup<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(document, |current, segment| current.as_object()?.get(segment))
}

fn json_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn compare(op: Comparison, left: &Value, right: &Value) -> Option<bool> {
    // Values of different JSON types never compare; the result is undefined.
    let ordering = match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?)?,
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Null, Value::Null)
        | (Value::Array(_), Value::Array(_))
        | (Value::Object(_), Value::Object(_)) => {
            return match op {
                Comparison::Eq => Some(left == right),
                Comparison::Ne => Some(left != right),
                Comparison::Lt | Comparison::Lte | Comparison::Gt | Comparison::Gte => None,
            };
        }
        _ => return None,
    };

    Some(match op {
        Comparison::Eq => ordering == Ordering::Equal,
        Comparison::Ne => ordering != Ordering::Equal,
        Comparison::Lt => ordering == Ordering::Less,
        Comparison::Lte => ordering != Ordering::Greater,
        Comparison::Gt => ordering == Ordering::Greater,
        Comparison::Gte => ordering != Ordering::Less,
    })
}
