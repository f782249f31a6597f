//! Order-by parsing and sort plans.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::error::{QueryError, Result};
use crate::mapping::{CustomSortFn, QueryMappingConfig};
use crate::model::{FieldType, ModelDescriptor, Record};
use crate::predicate::{lookup, FieldPath};
use crate::resolver::resolve;
use crate::value::{sort_compare, Value};

/// One entry of an order-by string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderingToken {
    pub property: String,
    pub ascending: bool,
}

/// Splits an order-by string on top-level commas.
///
/// Commas inside single-quoted sections do not split. Each entry is trimmed,
/// a leading `-` selects descending order, and surrounding quotes are
/// stripped with `''` unescaped. Empty entries are skipped.
pub fn parse_order_by(input: &str) -> Vec<OrderingToken> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    for (i, c) in input.char_indices() {
        match c {
            '\'' => quoted = !quoted,
            ',' if !quoted => {
                parts.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);

    parts
        .into_iter()
        .filter_map(|part| {
            let part = part.trim();
            let (ascending, rest) = match part.strip_prefix('-') {
                Some(rest) => (false, rest.trim_start()),
                None => (true, part),
            };
            let property = unquote(rest);
            (!property.is_empty()).then_some(OrderingToken { property, ascending })
        })
        .collect()
}

fn unquote(s: &str) -> String {
    let inner = s
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .unwrap_or(s);
    inner.replace("''", "'")
}

/// Sort key computed by custom code.
#[derive(Clone)]
pub struct ComputedKey {
    pub name: String,
    key: Arc<dyn for<'r> Fn(&'r dyn Record) -> Value<'r> + Send + Sync>,
}

impl fmt::Debug for ComputedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComputedKey({})", self.name)
    }
}

impl PartialEq for ComputedKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.key, &other.key)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SortTarget {
    Field(FieldPath),
    Computed(ComputedKey),
}

impl SortTarget {
    pub fn computed<F>(name: impl Into<String>, key: F) -> Self
    where
        F: for<'r> Fn(&'r dyn Record) -> Value<'r> + Send + Sync + 'static,
    {
        SortTarget::Computed(ComputedKey {
            name: name.into(),
            key: Arc::new(key),
        })
    }

    fn key<'r>(&self, record: &'r dyn Record) -> Value<'r> {
        match self {
            SortTarget::Field(path) => lookup(&Value::Record(record), path).unwrap_or(Value::Null),
            SortTarget::Computed(computed) => (computed.key)(record),
        }
    }
}

impl From<&str> for SortTarget {
    fn from(path: &str) -> Self {
        SortTarget::Field(FieldPath::from(path))
    }
}

impl From<FieldPath> for SortTarget {
    fn from(path: FieldPath) -> Self {
        SortTarget::Field(path)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub target: SortTarget,
    pub ascending: bool,
}

/// Ordered list of sort keys; the first key is the primary ordering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortPlan {
    keys: Vec<SortKey>,
}

impl SortPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discards existing keys and starts a new primary ordering.
    pub fn order_by(mut self, target: impl Into<SortTarget>, ascending: bool) -> Self {
        self.keys.clear();
        self.keys.push(SortKey {
            target: target.into(),
            ascending,
        });
        self
    }

    /// Adds a tie-breaker after the existing keys.
    pub fn then_by(mut self, target: impl Into<SortTarget>, ascending: bool) -> Self {
        self.keys.push(SortKey {
            target: target.into(),
            ascending,
        });
        self
    }

    /// `order_by` when unordered, `then_by` otherwise.
    pub fn by(self, target: impl Into<SortTarget>, ascending: bool) -> Self {
        if self.is_ordered() {
            self.then_by(target, ascending)
        } else {
            self.order_by(target, ascending)
        }
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    pub fn is_ordered(&self) -> bool {
        !self.keys.is_empty()
    }

    pub fn compare(&self, a: &dyn Record, b: &dyn Record) -> Ordering {
        for key in &self.keys {
            let ordering = sort_compare(&key.target.key(a), &key.target.key(b));
            let ordering = if key.ascending { ordering } else { ordering.reverse() };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

/// Offset and limit; non-positive values mean "not applied".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Window {
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

impl Window {
    pub fn new(offset: Option<i64>, limit: Option<i64>) -> Self {
        let positive = |v: Option<i64>| v.filter(|n| *n > 0).and_then(|n| usize::try_from(n).ok());
        Self {
            offset: positive(offset),
            limit: positive(limit),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.offset.is_none() && self.limit.is_none()
    }
}

/// Compiles an order-by string into a [`SortPlan`].
///
/// Built-in keys are applied in the order written. Properties with a custom
/// sort are deferred and run afterwards, in the order written, each receiving
/// the plan built so far.
pub fn compile_ordering(
    order_by: &str,
    model: &ModelDescriptor,
    config: &QueryMappingConfig,
) -> Result<SortPlan> {
    let mut plan = SortPlan::new();
    let mut deferred: Vec<(CustomSortFn, bool)> = Vec::new();

    for token in parse_order_by(order_by) {
        let resolved = match resolve(&token.property, model, config) {
            Some(resolved) if !resolved.sort_ignored => resolved,
            Some(_) => {
                unresolved(&token.property, "ignored for sorting", config)?;
                continue;
            }
            None => {
                unresolved(&token.property, "unknown", config)?;
                continue;
            }
        };

        if let Some(custom) = resolved.custom_sort {
            deferred.push((custom, token.ascending));
            continue;
        }

        if matches!(resolved.field_type, FieldType::List(_) | FieldType::Model(_)) {
            unresolved(&token.property, "not sortable", config)?;
            continue;
        }

        plan = plan.by(resolved.path, token.ascending);
    }

    for (custom, ascending) in deferred {
        let ordered = plan.is_ordered();
        log::debug!("custom sort (ascending={}, ordered={})", ascending, ordered);
        plan = custom(plan, ascending, ordered);
    }

    Ok(plan)
}

fn unresolved(property: &str, why: &str, config: &QueryMappingConfig) -> Result<()> {
    if config.is_strict() {
        return Err(QueryError::UnresolvedOrderingProperty(property.to_string()));
    }
    log::debug!("skipping ordering property '{}': {}", property, why);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::QueryOptions;
    use crate::model::Model;

    struct Person {
        name: &'static str,
        age: Option<i32>,
    }

    impl Record for Person {
        fn field(&self, name: &str) -> Option<Value<'_>> {
            match name {
                "name" => Some(Value::str(self.name)),
                "age" => Some(Value::from(self.age)),
                _ => None,
            }
        }
    }

    impl Model for Person {
        fn descriptor() -> ModelDescriptor {
            ModelDescriptor::of::<Person>("Person")
                .field("name", FieldType::String)
                .field("age", FieldType::Int)
        }
    }

    fn token(property: &str, ascending: bool) -> OrderingToken {
        OrderingToken {
            property: property.to_string(),
            ascending,
        }
    }

    #[test]
    fn test_split_and_direction() {
        assert_eq!(
            parse_order_by(" -age , name ,,"),
            vec![token("age", false), token("name", true)]
        );
        assert_eq!(
            parse_order_by("'a,b',-'it''s'"),
            vec![token("a,b", true), token("it's", false)]
        );
        assert!(parse_order_by("   ").is_empty());
    }

    #[test]
    fn test_compile_builds_keys_in_order() {
        let config = QueryMappingConfig::new();
        let plan = compile_ordering("-age,name", &Person::descriptor(), &config).unwrap();
        assert_eq!(
            plan,
            SortPlan::new().order_by("age", false).then_by("name", true)
        );
    }

    #[test]
    fn test_unknown_property_policy() {
        let lenient = QueryMappingConfig::new();
        let plan = compile_ordering("shoeSize,name", &Person::descriptor(), &lenient).unwrap();
        assert_eq!(plan, SortPlan::new().order_by("name", true));

        let strict = QueryMappingConfig::new().with_options(QueryOptions::strict());
        assert_eq!(
            compile_ordering("shoeSize", &Person::descriptor(), &strict),
            Err(QueryError::UnresolvedOrderingProperty("shoeSize".into()))
        );
    }

    #[test]
    fn test_custom_sorts_run_after_built_in_keys() {
        let config = QueryMappingConfig::new().for_model::<Person>(|m| {
            m.property("name").custom_sort(|plan, ascending, ordered| {
                assert!(ordered);
                plan.then_by(
                    SortTarget::computed("name_len", |r| {
                        let len = r.field("name").and_then(|v| v.as_str().map(str::len));
                        Value::Int(len.unwrap_or(0) as i64)
                    }),
                    ascending,
                )
            });
        });
        let plan = compile_ordering("name,age", &Person::descriptor(), &config).unwrap();
        assert_eq!(plan.keys().len(), 2);
        assert_eq!(plan.keys()[0].target, SortTarget::from("age"));
        assert!(matches!(plan.keys()[1].target, SortTarget::Computed(_)));
    }

    #[test]
    fn test_compare_puts_nulls_last() {
        let a = Person { name: "a", age: None };
        let b = Person { name: "b", age: Some(3) };
        let plan = SortPlan::new().order_by("age", true);
        assert_eq!(plan.compare(&a, &b), Ordering::Greater);
        let plan = SortPlan::new().order_by("age", false);
        assert_eq!(plan.compare(&a, &b), Ordering::Less);
    }

    #[test]
    fn test_window_ignores_non_positive() {
        assert!(Window::new(Some(0), Some(-3)).is_empty());
        assert_eq!(
            Window::new(Some(2), Some(5)),
            Window {
                offset: Some(2),
                limit: Some(5)
            }
        );
    }
}
