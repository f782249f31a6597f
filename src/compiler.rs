//! Lowers a filter syntax tree into a [`Predicate`].
//!
//! ```text
//!   Node::OrElse / AndAlso ──► combine children (a dropped child is skipped)
//!   Node::Collection       ──► resolve sequence ─► compile inner per element ─► Any / All
//!   Node::Filter           ──► resolve property ─► custom filter | typed comparison
//! ```
//!
//! Every node's negation is applied to its own result. A clause whose property
//! is unknown or ignored is an error in strict mode and is dropped otherwise;
//! dropping propagates upwards only as far as the nearest surviving sibling.

use crate::ast::{FilterOperator, Node, Quantifier};
use crate::error::{QueryError, Result};
use crate::mapping::{Converter, CustomFilterFn, QueryMappingConfig};
use crate::model::{FieldType, Model, ModelDescriptor};
use crate::parser::parse_filter;
use crate::predicate::{Comparison, FieldPath, Operand, Predicate, TextMatch};
use crate::resolver::resolve;
use crate::value::{convert_literal, Scalar};

/// What property names are resolved against.
#[derive(Debug, Clone)]
pub enum Scope {
    /// Fields of a model.
    Model(ModelDescriptor),
    /// A scalar collection element; only the empty property names it.
    Element(FieldType),
}

pub struct FilterCompiler<'c> {
    config: &'c QueryMappingConfig,
}

impl<'c> FilterCompiler<'c> {
    pub fn new(config: &'c QueryMappingConfig) -> Self {
        Self { config }
    }

    /// Parses and compiles `filter` for model `M`. `Ok(None)` means no filtering.
    pub fn compile<M: Model>(&self, filter: &str) -> Result<Option<Predicate>> {
        self.compile_for(filter, &self.config.descriptor_of::<M>())
    }

    pub fn compile_for(&self, filter: &str, model: &ModelDescriptor) -> Result<Option<Predicate>> {
        match parse_filter(filter)? {
            Some(node) => self.compile_node(&node, &Scope::Model(model.clone())),
            None => Ok(None),
        }
    }

    pub fn compile_node(&self, node: &Node, scope: &Scope) -> Result<Option<Predicate>> {
        match node {
            Node::AndAlso { left, right, negated } => {
                let left = self.compile_node(left, scope)?;
                let right = self.compile_node(right, scope)?;
                Ok(combine(left, right, Predicate::and).map(|p| negate_if(p, *negated)))
            }
            Node::OrElse { left, right, negated } => {
                let left = self.compile_node(left, scope)?;
                let right = self.compile_node(right, scope)?;
                Ok(combine(left, right, Predicate::or).map(|p| negate_if(p, *negated)))
            }
            Node::Collection {
                property,
                inner,
                quantifier,
                negated,
            } => self.compile_collection(property, inner, *quantifier, *negated, scope),
            Node::Filter {
                property,
                operator,
                values,
                negated,
                case_insensitive,
            } => self.compile_filter(
                property,
                *operator,
                values,
                *negated,
                *case_insensitive,
                scope,
            ),
        }
    }

    fn compile_collection(
        &self,
        property: &str,
        inner: &Node,
        quantifier: Quantifier,
        negated: bool,
        scope: &Scope,
    ) -> Result<Option<Predicate>> {
        let Some(target) = self.target(property, scope)? else {
            return Ok(None);
        };
        let Some(element) = target.field_type.element() else {
            return Err(QueryError::InvalidCollectionTarget(property.to_string()));
        };
        let inner_scope = match element {
            FieldType::Model(descriptor) => Scope::Model(descriptor()),
            scalar => Scope::Element(scalar.clone()),
        };

        let Some(predicate) = self.compile_node(inner, &inner_scope)? else {
            return Ok(None);
        };
        let quantified = match quantifier {
            Quantifier::Any => Predicate::any(target.path, predicate),
            Quantifier::All => Predicate::all(target.path, predicate),
        };
        Ok(Some(negate_if(quantified, negated)))
    }

    fn compile_filter(
        &self,
        property: &str,
        operator: FilterOperator,
        values: &[Option<String>],
        negated: bool,
        case_insensitive: bool,
        scope: &Scope,
    ) -> Result<Option<Predicate>> {
        let Some(target) = self.target(property, scope)? else {
            return Ok(None);
        };

        if let Some(custom) = &target.custom_filter {
            log::debug!(
                "custom filter for '{}' ({} {} value(s))",
                property,
                operator,
                values.len()
            );
            let predicate =
                custom(&target.path, values, operator).map_err(|e| QueryError::Conversion {
                    property: property.to_string(),
                    value: e.value,
                    target: e.target.to_string(),
                    reason: e.reason,
                })?;
            return Ok(Some(negate_if(predicate, negated)));
        }

        let predicate = match &target.field_type {
            FieldType::List(element) if !matches!(**element, FieldType::Model(_)) => {
                let element_filter = Comparator {
                    property,
                    path: FieldPath::root(),
                    ty: element,
                    convert: target.convert.as_ref(),
                    case_insensitive,
                }
                .build(operator, values)?;
                Predicate::any(target.path.clone(), element_filter)
            }
            FieldType::List(_) | FieldType::Model(_) => {
                return Err(QueryError::UnsupportedOperator {
                    property: property.to_string(),
                    operator,
                    reason: format!(
                        "{} values cannot be compared with a literal",
                        target.field_type.name()
                    ),
                })
            }
            ty => Comparator {
                property,
                path: target.path.clone(),
                ty,
                convert: target.convert.as_ref(),
                case_insensitive,
            }
            .build(operator, values)?,
        };

        Ok(Some(negate_if(predicate, negated)))
    }

    /// Resolves `property` in `scope`, applying the unknown-property policy.
    fn target(&self, property: &str, scope: &Scope) -> Result<Option<Target>> {
        let resolved = match scope {
            Scope::Element(ty) if property.is_empty() => {
                return Ok(Some(Target {
                    path: FieldPath::root(),
                    field_type: ty.clone(),
                    convert: None,
                    custom_filter: None,
                }))
            }
            Scope::Element(_) => None,
            Scope::Model(model) => resolve(property, model, self.config),
        };

        match resolved {
            Some(r) if !r.filter_ignored => Ok(Some(Target {
                path: r.path,
                field_type: r.field_type,
                convert: r.convert,
                custom_filter: r.custom_filter,
            })),
            Some(_) => self.dropped(property, "ignored for filtering"),
            None => self.dropped(property, "unknown"),
        }
    }

    fn dropped(&self, property: &str, why: &str) -> Result<Option<Target>> {
        if self.config.is_strict() {
            return Err(QueryError::UnresolvedFilterProperty(property.to_string()));
        }
        log::debug!("dropping filter on '{}': {}", property, why);
        Ok(None)
    }
}

struct Target {
    path: FieldPath,
    field_type: FieldType,
    convert: Option<Converter>,
    custom_filter: Option<CustomFilterFn>,
}

/// Builds the comparison for one scalar field.
struct Comparator<'a> {
    property: &'a str,
    path: FieldPath,
    ty: &'a FieldType,
    convert: Option<&'a Converter>,
    case_insensitive: bool,
}

impl Comparator<'_> {
    fn build(self, operator: FilterOperator, values: &[Option<String>]) -> Result<Predicate> {
        if operator.is_text() && !self.ty.is_text() {
            return Err(QueryError::UnsupportedOperator {
                property: self.property.to_string(),
                operator,
                reason: format!("{} is not a text field", self.ty.name()),
            });
        }
        if operator != FilterOperator::In && values.len() != 1 {
            return Err(QueryError::ValueCount {
                property: self.property.to_string(),
                operator,
                count: values.len(),
            });
        }

        // `*` only affects text fields.
        let fold_case = self.case_insensitive && self.ty.is_text();
        let field = Operand {
            path: self.path.clone(),
            fold_case,
        };

        let comparison = match operator {
            FilterOperator::Equal => Comparison::Eq,
            FilterOperator::NotEqual => Comparison::Ne,
            FilterOperator::GreaterThan => Comparison::Gt,
            FilterOperator::GreaterThanOrEqual => Comparison::Ge,
            FilterOperator::LessThan => Comparison::Lt,
            FilterOperator::LessThanOrEqual => Comparison::Le,
            FilterOperator::In => {
                let values = values
                    .iter()
                    .map(|raw| self.convert(raw, fold_case))
                    .collect::<Result<Vec<_>>>()?;
                return Ok(Predicate::In { field, values });
            }
            FilterOperator::Contains | FilterOperator::StartsWith | FilterOperator::EndsWith => {
                let op = match operator {
                    FilterOperator::Contains => TextMatch::Contains,
                    FilterOperator::StartsWith => TextMatch::StartsWith,
                    _ => TextMatch::EndsWith,
                };
                return match self.convert(&values[0], fold_case)? {
                    Scalar::String(value) => Ok(Predicate::Text { field, op, value }),
                    other => Err(QueryError::Conversion {
                        property: self.property.to_string(),
                        value: other.to_string(),
                        target: "string".to_string(),
                        reason: "text operators need a string pattern".to_string(),
                    }),
                };
            }
        };

        let value = self.convert(&values[0], fold_case)?;
        Ok(Predicate::Compare {
            field,
            op: comparison,
            value,
        })
    }

    fn convert(&self, raw: &Option<String>, fold_case: bool) -> Result<Scalar> {
        let converted = match (raw.as_deref(), self.convert) {
            (Some(raw), Some(convert)) => convert(raw),
            (raw, _) => convert_literal(raw, self.ty),
        };
        let scalar = converted.map_err(|reason| QueryError::Conversion {
            property: self.property.to_string(),
            value: raw.clone().unwrap_or_else(|| "null".to_string()),
            target: self.ty.name(),
            reason,
        })?;
        Ok(if fold_case { scalar.fold_case() } else { scalar })
    }
}

fn negate_if(predicate: Predicate, negated: bool) -> Predicate {
    if negated {
        predicate.negate()
    } else {
        predicate
    }
}

fn combine(
    left: Option<Predicate>,
    right: Option<Predicate>,
    join: fn(Predicate, Predicate) -> Predicate,
) -> Option<Predicate> {
    match (left, right) {
        (Some(l), Some(r)) => Some(join(l, r)),
        (Some(p), None) | (None, Some(p)) => Some(p),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::QueryOptions;
    use crate::model::Record;
    use crate::value::Value;

    struct Item;

    impl Record for Item {
        fn field(&self, _name: &str) -> Option<Value<'_>> {
            None
        }
    }

    impl Model for Item {
        fn descriptor() -> ModelDescriptor {
            ModelDescriptor::of::<Item>("Item")
                .field("price", FieldType::Float)
                .field("name", FieldType::String)
        }
    }

    struct Cart;

    impl Record for Cart {
        fn field(&self, _name: &str) -> Option<Value<'_>> {
            None
        }
    }

    impl Model for Cart {
        fn descriptor() -> ModelDescriptor {
            ModelDescriptor::of::<Cart>("Cart")
                .field("owner", FieldType::String)
                .field("total", FieldType::Int)
                .field("items", FieldType::list(FieldType::model::<Item>()))
                .field("codes", FieldType::list(FieldType::Int))
        }
    }

    fn compile(filter: &str) -> Result<Option<Predicate>> {
        FilterCompiler::new(&QueryMappingConfig::new()).compile::<Cart>(filter)
    }

    fn strict(filter: &str) -> Result<Option<Predicate>> {
        let config = QueryMappingConfig::new().with_options(QueryOptions::strict());
        FilterCompiler::new(&config).compile::<Cart>(filter)
    }

    #[test]
    fn test_blank_filter_compiles_to_nothing() {
        assert_eq!(compile("  "), Ok(None));
    }

    #[test]
    fn test_typed_comparison() {
        assert_eq!(
            compile("total>=30").unwrap(),
            Some(Predicate::compare("total", Comparison::Ge, 30))
        );
        assert_eq!(
            compile("owner|='a','b'").unwrap(),
            Some(Predicate::in_list("owner", vec!["a".into(), "b".into()]))
        );
    }

    #[test]
    fn test_case_insensitive_folds_both_sides() {
        assert_eq!(
            compile("owner==*'JO'").unwrap(),
            Some(Predicate::Compare {
                field: Operand::folded("owner"),
                op: Comparison::Eq,
                value: "jo".into(),
            })
        );
        // No effect on numbers.
        assert_eq!(compile("total==*3").unwrap(), compile("total==3").unwrap());
    }

    #[test]
    fn test_negation_applies_to_own_result() {
        assert_eq!(
            compile("!(total>1|total<0)").unwrap(),
            Some(
                Predicate::compare("total", Comparison::Gt, 1)
                    .or(Predicate::compare("total", Comparison::Lt, 0))
                    .negate()
            )
        );
    }

    #[test]
    fn test_unknown_properties() {
        assert_eq!(
            compile("nope==1&total==2").unwrap(),
            Some(Predicate::eq("total", 2))
        );
        assert_eq!(
            compile("!(nope==1|total==2)").unwrap(),
            Some(Predicate::eq("total", 2).negate())
        );
        assert_eq!(compile("nope==1").unwrap(), None);
        assert_eq!(
            strict("nope==1"),
            Err(QueryError::UnresolvedFilterProperty("nope".into()))
        );
    }

    #[test]
    fn test_collection_filters() {
        assert_eq!(
            compile("items(price>10)").unwrap(),
            Some(Predicate::any(
                "items",
                Predicate::compare("price", Comparison::Gt, 10.0)
            ))
        );
        assert_eq!(
            compile("items*(price>10)").unwrap(),
            Some(Predicate::all(
                "items",
                Predicate::compare("price", Comparison::Gt, 10.0)
            ))
        );
        assert_eq!(
            compile("codes*>1").unwrap(),
            Some(Predicate::all("codes", Predicate::compare("", Comparison::Gt, 1)))
        );
        assert_eq!(
            compile("codes==3").unwrap(),
            Some(Predicate::any("codes", Predicate::eq("", 3)))
        );
        assert_eq!(
            compile("owner(price>1)"),
            Err(QueryError::InvalidCollectionTarget("owner".into()))
        );
        assert_eq!(compile("items(nope>1)").unwrap(), None);
    }

    #[test]
    fn test_operator_and_value_errors() {
        assert!(matches!(
            compile("total-=-'3'"),
            Err(QueryError::UnsupportedOperator { .. })
        ));
        assert!(matches!(
            compile("total==1,2"),
            Err(QueryError::ValueCount { count: 2, .. })
        ));
        assert!(matches!(
            compile("total=='abc'"),
            Err(QueryError::Conversion { .. })
        ));
        assert!(matches!(
            compile("items==1"),
            Err(QueryError::UnsupportedOperator { .. })
        ));
    }

    #[test]
    fn test_custom_filter_negation() {
        let config = QueryMappingConfig::new().for_model::<Cart>(|m| {
            m.property("total").custom_filter(|field, values: &[i64], _op| {
                Predicate::compare(field.clone(), Comparison::Gt, values[0] * 100)
            });
        });
        let compiler = FilterCompiler::new(&config);
        assert_eq!(
            compiler.compile::<Cart>("!total==2").unwrap(),
            Some(Predicate::compare("total", Comparison::Gt, 200).negate())
        );
        assert!(matches!(
            compiler.compile::<Cart>("total==x'"),
            Err(QueryError::Lexical { .. })
        ));
        assert!(matches!(
            compiler.compile::<Cart>("total=='x'"),
            Err(QueryError::Conversion { .. })
        ));
    }
}
