//! Per-model mapping rules and the mapping registry.
//!
//! A [`QueryMappingConfig`] is built once, then shared read-only by every
//! compilation. Deriving a modified configuration clones it first; model
//! mappings are reference counted and copied on write.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use crate::ast::FilterOperator;
use crate::model::{Model, ModelDescriptor};
use crate::ordering::SortPlan;
use crate::predicate::{FieldPath, Predicate};
use crate::value::{FromLiteral, Scalar};

/// Converts a raw literal for an aliased property.
pub type Converter = Arc<dyn Fn(&str) -> Result<Scalar, String> + Send + Sync>;

/// Custom filter hook: `(field, raw values, operator) -> predicate`.
pub type CustomFilterFn = Arc<
    dyn Fn(&FieldPath, &[Option<String>], FilterOperator) -> Result<Predicate, LiteralError>
        + Send
        + Sync,
>;

/// Custom sort hook: `(current ordering, ascending, already ordered) -> new ordering`.
pub type CustomSortFn = Arc<dyn Fn(SortPlan, bool, bool) -> SortPlan + Send + Sync>;

/// A literal that a custom filter could not convert to its value type.
#[derive(Debug, Clone, PartialEq)]
pub struct LiteralError {
    pub value: String,
    pub target: &'static str,
    pub reason: String,
}

/// Query behaviour switches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Raise an error for unresolved or ignored properties instead of dropping the clause.
    #[serde(default)]
    pub strict: bool,
}

impl QueryOptions {
    pub fn strict() -> Self {
        Self { strict: true }
    }
}

#[derive(Clone)]
pub struct PropertyAlias {
    pub target: String,
    pub convert: Option<Converter>,
}

impl fmt::Debug for PropertyAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyAlias")
            .field("target", &self.target)
            .field("convert", &self.convert.is_some())
            .finish()
    }
}

/// Mapping rules of one model type. Keys are stored lower-cased.
#[derive(Clone, Default)]
pub struct ModelMapping {
    descriptor: Option<ModelDescriptor>,
    aliases: HashMap<String, PropertyAlias>,
    ignored_filter: HashSet<String>,
    ignored_sort: HashSet<String>,
    custom_filters: HashMap<String, CustomFilterFn>,
    custom_sorts: HashMap<String, CustomSortFn>,
}

impl ModelMapping {
    pub fn new(descriptor: ModelDescriptor) -> Self {
        Self {
            descriptor: Some(descriptor),
            ..Self::default()
        }
    }

    pub fn descriptor(&self) -> Option<&ModelDescriptor> {
        self.descriptor.as_ref()
    }

    pub fn alias(&self, source: &str) -> Option<&PropertyAlias> {
        self.aliases.get(&source.to_lowercase())
    }

    pub fn filter_is_ignored(&self, property: &str) -> bool {
        self.ignored_filter.contains(&property.to_lowercase())
    }

    pub fn sort_is_ignored(&self, property: &str) -> bool {
        self.ignored_sort.contains(&property.to_lowercase())
    }

    pub fn custom_filter(&self, property: &str) -> Option<&CustomFilterFn> {
        self.custom_filters.get(&property.to_lowercase())
    }

    pub fn custom_sort(&self, property: &str) -> Option<&CustomSortFn> {
        self.custom_sorts.get(&property.to_lowercase())
    }

    pub fn add_alias(&mut self, source: &str, target: &str, convert: Option<Converter>) {
        self.aliases.insert(
            source.to_lowercase(),
            PropertyAlias {
                target: target.to_string(),
                convert,
            },
        );
    }

    pub fn ignore_filter(&mut self, property: &str) {
        self.ignored_filter.insert(property.to_lowercase());
    }

    pub fn ignore_sort(&mut self, property: &str) {
        self.ignored_sort.insert(property.to_lowercase());
    }

    pub fn ignore(&mut self, property: &str) {
        self.ignore_filter(property);
        self.ignore_sort(property);
    }

    pub fn add_custom_filter(&mut self, property: &str, filter: CustomFilterFn) {
        self.custom_filters.insert(property.to_lowercase(), filter);
    }

    pub fn add_custom_sort(&mut self, property: &str, sort: CustomSortFn) {
        self.custom_sorts.insert(property.to_lowercase(), sort);
    }

    fn check_property(&self, property: &str) {
        let Some(descriptor) = &self.descriptor else {
            return;
        };
        let first = property.split('.').next().unwrap_or(property);
        if descriptor.find(first).is_none() {
            log::warn!(
                "mapping rule for '{}' names a field that {} does not declare",
                property,
                descriptor.name
            );
        }
    }
}

impl fmt::Debug for ModelMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelMapping")
            .field("model", &self.descriptor.as_ref().map(|d| d.name))
            .field("aliases", &self.aliases)
            .field("ignored_filter", &self.ignored_filter)
            .field("ignored_sort", &self.ignored_sort)
            .field("custom_filters", &self.custom_filters.keys().collect::<Vec<_>>())
            .field("custom_sorts", &self.custom_sorts.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Registry of model mappings plus query behaviour.
#[derive(Debug, Clone, Default)]
pub struct QueryMappingConfig {
    mappings: HashMap<TypeId, Arc<ModelMapping>>,
    options: QueryOptions,
}

static GLOBAL: OnceLock<QueryMappingConfig> = OnceLock::new();

fn empty_mapping() -> &'static ModelMapping {
    static EMPTY: OnceLock<ModelMapping> = OnceLock::new();
    EMPTY.get_or_init(ModelMapping::default)
}

impl QueryMappingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide default configuration. Empty and lenient unless
    /// [`install_global`](Self::install_global) ran first.
    pub fn global() -> &'static QueryMappingConfig {
        GLOBAL.get_or_init(QueryMappingConfig::default)
    }

    /// Installs the process-wide default. Fails, returning the config, if a
    /// default was already installed or read.
    pub fn install_global(config: QueryMappingConfig) -> Result<(), QueryMappingConfig> {
        GLOBAL.set(config)
    }

    /// Adds or extends the mapping of `M`.
    pub fn for_model<M: Model>(
        mut self,
        configure: impl FnOnce(&mut ModelMappingBuilder<'_>),
    ) -> Self {
        let entry = self
            .mappings
            .entry(TypeId::of::<M>())
            .or_insert_with(|| Arc::new(ModelMapping::new(M::descriptor())));
        let mapping = Arc::make_mut(entry);
        configure(&mut ModelMappingBuilder { mapping });
        self
    }

    /// Removes the mapping of `M`.
    pub fn clear<M: Model>(mut self) -> Self {
        self.mappings.remove(&TypeId::of::<M>());
        self
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    pub fn is_strict(&self) -> bool {
        self.options.strict
    }

    /// The mapping registered for a type, or an empty one.
    pub fn mapping(&self, type_id: TypeId) -> &ModelMapping {
        self.mappings
            .get(&type_id)
            .map(Arc::as_ref)
            .unwrap_or_else(|| empty_mapping())
    }

    pub fn mapping_of<M: Model>(&self) -> &ModelMapping {
        self.mapping(TypeId::of::<M>())
    }

    /// The descriptor of `M`, from the registry when registered.
    pub fn descriptor_of<M: Model>(&self) -> ModelDescriptor {
        self.mapping_of::<M>()
            .descriptor()
            .cloned()
            .unwrap_or_else(M::descriptor)
    }
}

/// Configures the mapping of one model.
pub struct ModelMappingBuilder<'m> {
    mapping: &'m mut ModelMapping,
}

impl ModelMappingBuilder<'_> {
    /// Starts rules for a target property (a field name or dotted path).
    pub fn property(&mut self, name: &str) -> PropertyMappingBuilder<'_> {
        self.mapping.check_property(name);
        PropertyMappingBuilder {
            mapping: self.mapping,
            property: name.to_string(),
        }
    }
}

/// Rules for one target property.
pub struct PropertyMappingBuilder<'m> {
    mapping: &'m mut ModelMapping,
    property: String,
}

impl PropertyMappingBuilder<'_> {
    /// Accepts `source` (case-insensitive) as a name for this property.
    pub fn map_from(self, source: &str) -> Self {
        self.mapping.add_alias(source, &self.property, None);
        self
    }

    /// Like [`map_from`](Self::map_from), converting literals with `convert`.
    pub fn map_from_with<V, E, F>(self, source: &str, convert: F) -> Self
    where
        V: Into<Scalar>,
        E: fmt::Display,
        F: Fn(&str) -> Result<V, E> + Send + Sync + 'static,
    {
        let converter: Converter =
            Arc::new(move |raw| convert(raw).map(Into::into).map_err(|e| e.to_string()));
        self.mapping.add_alias(source, &self.property, Some(converter));
        self
    }

    /// Replaces the default filter logic of this property.
    ///
    /// The delegate receives the property's field path, the filter values
    /// converted to `V`, and the operator as written.
    pub fn custom_filter<V, F>(self, filter: F) -> Self
    where
        V: FromLiteral + 'static,
        F: Fn(&FieldPath, &[V], FilterOperator) -> Predicate + Send + Sync + 'static,
    {
        let hook: CustomFilterFn = Arc::new(move |field, raw, operator| {
            let values = raw
                .iter()
                .map(|r| {
                    V::from_literal(r.as_deref()).map_err(|reason| LiteralError {
                        value: r.clone().unwrap_or_else(|| "null".to_string()),
                        target: V::type_name(),
                        reason,
                    })
                })
                .collect::<Result<Vec<V>, LiteralError>>()?;
            Ok(filter(field, &values, operator))
        });
        self.mapping.add_custom_filter(&self.property, hook);
        self
    }

    /// Replaces the default ordering of this property.
    pub fn custom_sort<F>(self, sort: F) -> Self
    where
        F: Fn(SortPlan, bool, bool) -> SortPlan + Send + Sync + 'static,
    {
        self.mapping.add_custom_sort(&self.property, Arc::new(sort));
        self
    }

    pub fn ignore_filter(self) -> Self {
        self.mapping.ignore_filter(&self.property);
        self
    }

    pub fn ignore_sort(self) -> Self {
        self.mapping.ignore_sort(&self.property);
        self
    }

    pub fn ignore(self) {
        self.mapping.ignore(&self.property);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldType, Record};
    use crate::value::Value;

    struct Account;

    impl Record for Account {
        fn field(&self, _name: &str) -> Option<Value<'_>> {
            None
        }
    }

    impl Model for Account {
        fn descriptor() -> ModelDescriptor {
            ModelDescriptor::of::<Account>("Account")
                .field("name", FieldType::String)
                .field("secret", FieldType::String)
        }
    }

    #[test]
    fn test_builder_registers_rules() {
        let config = QueryMappingConfig::new().for_model::<Account>(|m| {
            m.property("name").map_from("Login");
            m.property("secret").ignore();
        });

        let mapping = config.mapping_of::<Account>();
        assert_eq!(mapping.alias("login").map(|a| a.target.as_str()), Some("name"));
        assert!(mapping.filter_is_ignored("SECRET"));
        assert!(mapping.sort_is_ignored("secret"));
        assert!(!mapping.filter_is_ignored("name"));
    }

    #[test]
    fn test_clone_is_independent() {
        let base = QueryMappingConfig::new().for_model::<Account>(|m| {
            m.property("name").map_from("login");
        });
        let derived = base.clone().for_model::<Account>(|m| {
            m.property("secret").ignore_filter();
        });

        assert!(derived.mapping_of::<Account>().filter_is_ignored("secret"));
        assert!(!base.mapping_of::<Account>().filter_is_ignored("secret"));
        assert!(base.mapping_of::<Account>().alias("login").is_some());
    }

    #[test]
    fn test_clear_and_defaults() {
        let config = QueryMappingConfig::new()
            .for_model::<Account>(|m| {
                m.property("secret").ignore();
            })
            .clear::<Account>();
        assert!(!config.mapping_of::<Account>().filter_is_ignored("secret"));
        assert!(!config.is_strict());
        assert!(config.with_options(QueryOptions::strict()).is_strict());
    }

    #[test]
    fn test_alias_converter_maps_errors_to_strings() {
        let config = QueryMappingConfig::new().for_model::<Account>(|m| {
            m.property("name")
                .map_from_with("code", |raw: &str| raw.parse::<i64>().map(|n| format!("user-{n}")));
        });
        let alias = config.mapping_of::<Account>().alias("code").unwrap();
        let convert = alias.convert.as_ref().unwrap();
        assert_eq!(convert("7"), Ok(Scalar::String("user-7".into())));
        assert!(convert("x").is_err());
    }

    #[test]
    fn test_custom_filter_converts_values() {
        let config = QueryMappingConfig::new().for_model::<Account>(|m| {
            m.property("name").custom_filter(|field, values: &[i64], _op| {
                Predicate::eq(field.clone(), values[0])
            });
        });
        let hook = config.mapping_of::<Account>().custom_filter("name").unwrap();
        let field = FieldPath::from("name");

        let ok = hook(&field, &[Some("3".into())], FilterOperator::Equal).unwrap();
        assert_eq!(ok, Predicate::eq(FieldPath::from("name"), 3));

        let err = hook(&field, &[Some("x".into())], FilterOperator::Equal).unwrap_err();
        assert_eq!(err.value, "x");
        assert_eq!(err.target, "i64");
    }
}
