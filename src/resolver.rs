//! Property path resolution.
//!
//! Each dot-separated segment is looked up case-insensitively, first among the
//! aliases of the current model's mapping, then among its declared fields. An
//! alias target may itself be dotted, in which case it descends through
//! declared fields only.

use crate::mapping::{Converter, CustomFilterFn, CustomSortFn, QueryMappingConfig};
use crate::model::{FieldType, ModelDescriptor};
use crate::predicate::FieldPath;

/// A property path bound to a declared field.
#[derive(Clone)]
pub struct ResolvedProperty {
    /// Declared field names from the scope root.
    pub path: FieldPath,
    pub field_type: FieldType,
    /// Literal converter of the alias used for the last segment.
    pub convert: Option<Converter>,
    pub filter_ignored: bool,
    pub sort_ignored: bool,
    pub custom_filter: Option<CustomFilterFn>,
    pub custom_sort: Option<CustomSortFn>,
}

impl std::fmt::Debug for ResolvedProperty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedProperty")
            .field("path", &self.path)
            .field("field_type", &self.field_type)
            .field("filter_ignored", &self.filter_ignored)
            .field("sort_ignored", &self.sort_ignored)
            .field("custom_filter", &self.custom_filter.is_some())
            .field("custom_sort", &self.custom_sort.is_some())
            .finish()
    }
}

/// Resolves `path` against `model`. Returns `None` when any segment is unknown
/// or the path tries to descend into a scalar or a sequence.
pub fn resolve(
    path: &str,
    model: &ModelDescriptor,
    config: &QueryMappingConfig,
) -> Option<ResolvedProperty> {
    if path.is_empty() {
        return None;
    }

    let mut owner = model.clone();
    let mut next: Option<ModelDescriptor> = Some(model.clone());
    let mut names: Vec<String> = Vec::new();
    let mut field_type: Option<FieldType> = None;
    let mut convert = None;

    for segment in path.split('.') {
        let descriptor = next.take()?;
        let mapping = config.mapping(descriptor.type_id);
        let (targets, alias_convert) = match mapping.alias(segment) {
            Some(alias) => (alias.target.clone(), alias.convert.clone()),
            None => (segment.to_string(), None),
        };
        convert = alias_convert;

        let mut current = Some(descriptor);
        for target in targets.split('.') {
            let descriptor = current.take()?;
            let field = descriptor.find(target)?;
            names.push(field.name.to_string());
            field_type = Some(field.ty.clone());
            current = match &field.ty {
                FieldType::Model(nested) => Some(nested()),
                _ => None,
            };
            owner = descriptor;
        }
        next = current;
    }

    let field_type = field_type?;
    let path = FieldPath::new(names);
    let root_mapping = config.mapping(model.type_id);
    let owner_mapping = config.mapping(owner.type_id);
    let full = path.join(".");
    let last = path.segments().last().map(String::as_str).unwrap_or_default();

    Some(ResolvedProperty {
        filter_ignored: root_mapping.filter_is_ignored(&full)
            || owner_mapping.filter_is_ignored(last),
        sort_ignored: root_mapping.sort_is_ignored(&full) || owner_mapping.sort_is_ignored(last),
        custom_filter: root_mapping
            .custom_filter(&full)
            .or_else(|| owner_mapping.custom_filter(last))
            .cloned(),
        custom_sort: root_mapping
            .custom_sort(&full)
            .or_else(|| owner_mapping.custom_sort(last))
            .cloned(),
        path,
        field_type,
        convert,
    })
}
