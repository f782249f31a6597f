//! Query entry points.
//!
//! A filter / order-by / offset / limit tuple is compiled into a
//! [`QueryPlan`], which any [`Queryable`] source can run. `Vec<T>` is the
//! in-memory source; [`crate::sql_compiler`] renders the same plan to SQL.

use serde::{Deserialize, Serialize};

use crate::compiler::FilterCompiler;
use crate::error::Result;
use crate::mapping::QueryMappingConfig;
use crate::model::Model;
use crate::ordering::{compile_ordering, SortPlan, Window};
use crate::predicate::Predicate;

/// Query parameters as received from a client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryModel {
    pub filter: String,
    pub order_by: String,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

impl QueryModel {
    pub fn new(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            ..Self::default()
        }
    }

    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = order_by.into();
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A sequence of records that can be filtered, ordered and paged.
pub trait Queryable: Sized {
    type Item: Model;

    fn filter(self, predicate: &Predicate) -> Self;
    fn order(self, plan: &SortPlan) -> Self;
    fn skip(self, count: usize) -> Self;
    fn take(self, count: usize) -> Self;
    fn count(&self) -> usize;
}

impl<T: Model> Queryable for Vec<T> {
    type Item = T;

    fn filter(mut self, predicate: &Predicate) -> Self {
        self.retain(|record| predicate.matches(record));
        self
    }

    /// Stable: records with equal keys keep their relative order.
    fn order(mut self, plan: &SortPlan) -> Self {
        if plan.is_ordered() {
            self.sort_by(|a, b| plan.compare(a, b));
        }
        self
    }

    fn skip(mut self, count: usize) -> Self {
        self.drain(..count.min(self.len()));
        self
    }

    fn take(mut self, count: usize) -> Self {
        self.truncate(count);
        self
    }

    fn count(&self) -> usize {
        self.len()
    }
}

/// Compiled form of a [`QueryModel`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPlan {
    pub filter: Option<Predicate>,
    pub ordering: SortPlan,
    pub window: Window,
}

impl QueryPlan {
    /// Compiles every part before anything is applied, so a failing order-by
    /// never leaves a half-applied query behind.
    pub fn compile<M: Model>(query: &QueryModel, config: &QueryMappingConfig) -> Result<Self> {
        let model = config.descriptor_of::<M>();
        let filter = FilterCompiler::new(config).compile_for(&query.filter, &model)?;
        let ordering = compile_ordering(&query.order_by, &model, config)?;
        log::trace!("compiled query {:?}: filter={:?} ordering={:?}", query, filter, ordering);
        Ok(Self {
            filter,
            ordering,
            window: Window::new(query.offset, query.limit),
        })
    }

    pub fn apply<Q: Queryable>(&self, source: Q) -> Q {
        self.apply_ordering_and_paging(self.apply_filter(source))
    }

    pub fn apply_filter<Q: Queryable>(&self, source: Q) -> Q {
        match &self.filter {
            Some(predicate) => source.filter(predicate),
            None => source,
        }
    }

    pub fn apply_ordering_and_paging<Q: Queryable>(&self, source: Q) -> Q {
        let mut source = source.order(&self.ordering);
        if let Some(offset) = self.window.offset {
            source = source.skip(offset);
        }
        if let Some(limit) = self.window.limit {
            source = source.take(limit);
        }
        source
    }
}

/// Compiles `filter` for the source's record type.
pub fn compile<M: Model>(filter: &str, config: &QueryMappingConfig) -> Result<Option<Predicate>> {
    FilterCompiler::new(config).compile::<M>(filter)
}

/// Filters, orders and pages `source` in one go.
pub fn apply<Q: Queryable>(
    source: Q,
    filter: &str,
    order_by: &str,
    offset: Option<i64>,
    limit: Option<i64>,
    config: &QueryMappingConfig,
) -> Result<Q> {
    let query = QueryModel {
        filter: filter.to_string(),
        order_by: order_by.to_string(),
        offset,
        limit,
    };
    apply_query(source, &query, true, config)
}

pub fn apply_filter<Q: Queryable>(
    source: Q,
    filter: &str,
    config: &QueryMappingConfig,
) -> Result<Q> {
    let query = QueryModel::new(filter);
    apply_query(source, &query, false, config)
}

pub fn apply_ordering_and_paging<Q: Queryable>(
    source: Q,
    order_by: &str,
    offset: Option<i64>,
    limit: Option<i64>,
    config: &QueryMappingConfig,
) -> Result<Q> {
    let plan = QueryPlan {
        filter: None,
        ordering: compile_ordering(order_by, &config.descriptor_of::<Q::Item>(), config)?,
        window: Window::new(offset, limit),
    };
    Ok(plan.apply_ordering_and_paging(source))
}

/// Applies a [`QueryModel`]; ordering and paging only when asked to.
pub fn apply_query<Q: Queryable>(
    source: Q,
    query: &QueryModel,
    ordering_and_paging: bool,
    config: &QueryMappingConfig,
) -> Result<Q> {
    let plan = if ordering_and_paging {
        QueryPlan::compile::<Q::Item>(query, config)?
    } else {
        QueryPlan {
            filter: FilterCompiler::new(config).compile::<Q::Item>(&query.filter)?,
            ..QueryPlan::default()
        }
    };
    Ok(plan.apply(source))
}

/// [`apply_query`] against the process-wide [`QueryMappingConfig::global`].
pub fn apply_query_default<Q: Queryable>(
    source: Q,
    query: &QueryModel,
    ordering_and_paging: bool,
) -> Result<Q> {
    apply_query(source, query, ordering_and_paging, QueryMappingConfig::global())
}
