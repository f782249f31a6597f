//! Backend-neutral predicate tree.
//!
//! The compiler lowers a filter into a [`Predicate`]; adapters consume it. The
//! in-memory adapter lives here ([`Predicate::evaluate`]), the SQL one in
//! [`crate::sql_compiler`].
//!
//! Field paths are relative to the current scope: the record being filtered,
//! or the element inside a collection quantifier. An empty path is the
//! element itself.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::model::Record;
use crate::value::{compare_to_scalar, equals_scalar, Scalar, Value};

/// Dotted path of declared field names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn new(segments: Vec<String>) -> Self {
        Self(segments)
    }

    /// The scope element itself.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Joins the segments with `sep`.
    pub fn join(&self, sep: &str) -> String {
        self.0.join(sep)
    }
}

impl From<&str> for FieldPath {
    fn from(path: &str) -> Self {
        if path.is_empty() {
            return Self::root();
        }
        Self(path.split('.').map(str::to_string).collect())
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.join("."))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMatch {
    Contains,
    StartsWith,
    EndsWith,
}

/// Left-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Operand {
    pub path: FieldPath,
    /// Compare the lower-cased field value.
    pub fold_case: bool,
}

impl Operand {
    pub fn field(path: impl Into<FieldPath>) -> Self {
        Self {
            path: path.into(),
            fold_case: false,
        }
    }

    pub fn folded(path: impl Into<FieldPath>) -> Self {
        Self {
            path: path.into(),
            fold_case: true,
        }
    }
}

/// Opaque predicate supplied by a custom filter. Only the in-memory adapter
/// can evaluate it.
#[derive(Clone)]
pub struct NativePredicate {
    pub name: String,
    test: Arc<dyn Fn(&Value<'_>) -> bool + Send + Sync>,
}

impl fmt::Debug for NativePredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativePredicate({})", self.name)
    }
}

impl PartialEq for NativePredicate {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.test, &other.test)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        field: Operand,
        op: Comparison,
        value: Scalar,
    },
    In {
        field: Operand,
        values: Vec<Scalar>,
    },
    Text {
        field: Operand,
        op: TextMatch,
        value: String,
    },
    /// At least one element of the sequence at `field` satisfies `predicate`.
    Any {
        field: FieldPath,
        predicate: Box<Predicate>,
    },
    /// Every element of the sequence at `field` satisfies `predicate`.
    All {
        field: FieldPath,
        predicate: Box<Predicate>,
    },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
    Native(NativePredicate),
}

impl Predicate {
    pub fn compare(field: impl Into<FieldPath>, op: Comparison, value: impl Into<Scalar>) -> Self {
        Predicate::Compare {
            field: Operand::field(field),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<FieldPath>, value: impl Into<Scalar>) -> Self {
        Self::compare(field, Comparison::Eq, value)
    }

    pub fn in_list(field: impl Into<FieldPath>, values: Vec<Scalar>) -> Self {
        Predicate::In {
            field: Operand::field(field),
            values,
        }
    }

    pub fn text(field: impl Into<FieldPath>, op: TextMatch, value: impl Into<String>) -> Self {
        Predicate::Text {
            field: Operand::field(field),
            op,
            value: value.into(),
        }
    }

    pub fn any(field: impl Into<FieldPath>, predicate: Predicate) -> Self {
        Predicate::Any {
            field: field.into(),
            predicate: Box::new(predicate),
        }
    }

    pub fn all(field: impl Into<FieldPath>, predicate: Predicate) -> Self {
        Predicate::All {
            field: field.into(),
            predicate: Box::new(predicate),
        }
    }

    pub fn and(self, other: Predicate) -> Self {
        Predicate::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Predicate) -> Self {
        Predicate::Or(Box::new(self), Box::new(other))
    }

    pub fn negate(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    /// Wraps an arbitrary test over the scope value.
    pub fn native<F>(name: impl Into<String>, test: F) -> Self
    where
        F: Fn(&Value<'_>) -> bool + Send + Sync + 'static,
    {
        Predicate::Native(NativePredicate {
            name: name.into(),
            test: Arc::new(test),
        })
    }

    /// Evaluates against a record.
    pub fn matches(&self, record: &dyn Record) -> bool {
        self.evaluate(&Value::Record(record))
    }

    /// Evaluates against a scope value (a record or a collection element).
    pub fn evaluate(&self, subject: &Value<'_>) -> bool {
        match self {
            Predicate::Compare { field, op, value } => match operand(subject, field) {
                Some(v) => compare(&v, *op, value),
                None => false,
            },
            Predicate::In { field, values } => match operand(subject, field) {
                Some(v) => values.iter().any(|s| equals_scalar(&v, s)),
                None => false,
            },
            Predicate::Text { field, op, value } => {
                let Some(v) = operand(subject, field) else {
                    return false;
                };
                let Some(text) = v.as_str() else {
                    return false;
                };
                match op {
                    TextMatch::Contains => text.contains(value.as_str()),
                    TextMatch::StartsWith => text.starts_with(value.as_str()),
                    TextMatch::EndsWith => text.ends_with(value.as_str()),
                }
            }
            Predicate::Any { field, predicate } => match lookup(subject, field) {
                Some(Value::List(items)) => items.iter().any(|item| predicate.evaluate(item)),
                _ => false,
            },
            // A null sequence behaves like an empty one.
            Predicate::All { field, predicate } => match lookup(subject, field) {
                Some(Value::List(items)) => items.iter().all(|item| predicate.evaluate(item)),
                Some(Value::Null) => true,
                _ => false,
            },
            Predicate::And(left, right) => left.evaluate(subject) && right.evaluate(subject),
            Predicate::Or(left, right) => left.evaluate(subject) || right.evaluate(subject),
            Predicate::Not(inner) => !inner.evaluate(subject),
            Predicate::Native(native) => (native.test)(subject),
        }
    }
}

/// Walks `path` from `subject`. A null record on the way yields null.
pub(crate) fn lookup<'v>(subject: &Value<'v>, path: &FieldPath) -> Option<Value<'v>> {
    let mut current = subject.clone();
    for segment in path.segments() {
        current = match current {
            Value::Record(record) => record.field(segment)?,
            Value::Null => return Some(Value::Null),
            _ => return None,
        };
    }
    Some(current)
}

fn operand<'v>(subject: &Value<'v>, operand: &Operand) -> Option<Value<'v>> {
    let value = lookup(subject, &operand.path)?;
    if !operand.fold_case {
        return Some(value);
    }
    Some(match value {
        Value::Str(s) => Value::Str(Cow::Owned(s.to_lowercase())),
        other => other,
    })
}

fn compare(value: &Value<'_>, op: Comparison, constant: &Scalar) -> bool {
    match op {
        Comparison::Eq => equals_scalar(value, constant),
        Comparison::Ne => !equals_scalar(value, constant),
        Comparison::Gt => compare_to_scalar(value, constant) == Some(Ordering::Greater),
        Comparison::Ge => matches!(
            compare_to_scalar(value, constant),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Comparison::Lt => compare_to_scalar(value, constant) == Some(Ordering::Less),
        Comparison::Le => matches!(
            compare_to_scalar(value, constant),
            Some(Ordering::Less | Ordering::Equal)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Line {
        sku: String,
        qty: i32,
    }

    impl Record for Line {
        fn field(&self, name: &str) -> Option<Value<'_>> {
            match name {
                "sku" => Some(Value::from(&self.sku)),
                "qty" => Some(Value::from(self.qty)),
                _ => None,
            }
        }
    }

    struct Order {
        customer: Option<String>,
        lines: Vec<Line>,
        codes: Vec<i32>,
    }

    impl Record for Order {
        fn field(&self, name: &str) -> Option<Value<'_>> {
            match name {
                "customer" => Some(Value::from(self.customer.as_ref())),
                "lines" => Some(Value::records(&self.lines)),
                "codes" => Some(Value::list(&self.codes)),
                _ => None,
            }
        }
    }

    fn order() -> Order {
        Order {
            customer: Some("Acme".into()),
            lines: vec![
                Line {
                    sku: "A-1".into(),
                    qty: 2,
                },
                Line {
                    sku: "B-7".into(),
                    qty: 12,
                },
            ],
            codes: vec![3, 5],
        }
    }

    #[test]
    fn test_comparisons_and_text() {
        let o = order();
        assert!(Predicate::eq("customer", "Acme").matches(&o));
        assert!(!Predicate::eq("customer", "acme").matches(&o));
        assert!(Predicate::Compare {
            field: Operand::folded("customer"),
            op: Comparison::Eq,
            value: Scalar::from("acme"),
        }
        .matches(&o));
        assert!(Predicate::text("customer", TextMatch::StartsWith, "Ac").matches(&o));
        assert!(!Predicate::text("customer", TextMatch::EndsWith, "Ac").matches(&o));
        assert!(!Predicate::eq("missing", 1).matches(&o));
    }

    #[test]
    fn test_null_fields() {
        let mut o = order();
        o.customer = None;
        assert!(Predicate::eq("customer", Scalar::Null).matches(&o));
        assert!(Predicate::compare("customer", Comparison::Ne, "Acme").matches(&o));
        assert!(!Predicate::text("customer", TextMatch::Contains, "A").matches(&o));
    }

    #[test]
    fn test_quantifiers() {
        let o = order();
        let big = Predicate::compare("qty", Comparison::Gt, 10);
        assert!(Predicate::any("lines", big.clone()).matches(&o));
        assert!(!Predicate::all("lines", big).matches(&o));

        let element = Predicate::compare(FieldPath::root(), Comparison::Gt, 1);
        assert!(Predicate::all("codes", element).matches(&o));
        assert!(Predicate::any("codes", Predicate::in_list("", vec![Scalar::Int(5)])).matches(&o));
    }

    #[test]
    fn test_logic_and_native() {
        let o = order();
        let yes = Predicate::eq("customer", "Acme");
        let no = Predicate::eq("customer", "Other");
        assert!(yes.clone().or(no.clone()).matches(&o));
        assert!(!yes.clone().and(no.clone()).matches(&o));
        assert!(no.negate().matches(&o));

        let native = Predicate::native("has_two_lines", |v| {
            v.as_record()
                .and_then(|r| r.field("lines"))
                .map_or(false, |lines| matches!(lines, Value::List(items) if items.len() == 2))
        });
        assert!(native.matches(&o));
        assert_eq!(native.clone(), native);
    }

    #[test]
    fn test_field_path_parsing() {
        assert!(FieldPath::from("").is_root());
        assert_eq!(FieldPath::from("a.b").segments(), ["a".to_string(), "b".to_string()]);
        assert_eq!(FieldPath::from("a.b").join("_"), "a_b");
    }
}
