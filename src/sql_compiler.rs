//! Renders a [`QueryPlan`] to SQL using sea-query.
//!
//! Nested field paths map to `_`-joined column names on the entity table.
//! Collection quantifiers become correlated `EXISTS` subqueries over a child
//! table registered with [`SqlCompiler::with_collection`].

use std::collections::HashMap;

use sea_query::{
    Alias, Asterisk, Expr, Func, Iden, LikeExpr, Order, PostgresQueryBuilder, Query,
    SelectStatement, SimpleExpr, Value,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ordering::{SortPlan, SortTarget};
use crate::predicate::{Comparison, FieldPath, Operand, Predicate, TextMatch};
use crate::query::QueryPlan;
use crate::value::Scalar;

/// Configuration for SQL rewriting.
#[derive(Debug, Clone)]
pub struct OptimizationConfig {
    /// Minimum number of OR-ed equalities on one column before rewriting to IN.
    pub max_or_conditions_for_in: usize,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            max_or_conditions_for_in: 3,
        }
    }
}

/// Table aliases: the queried entity, and one per collection nesting level.
#[derive(Debug, Clone, Copy)]
pub enum TableAlias {
    Root,
    Nested(usize),
}

impl Iden for TableAlias {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        let _ = match self {
            TableAlias::Root => write!(s, "t0"),
            TableAlias::Nested(depth) => write!(s, "t{}", depth),
        };
    }
}

/// Column identifier wrapper
#[derive(Debug, Clone)]
pub struct ColumnName(pub String);

impl Iden for ColumnName {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        let _ = write!(s, "{}", self.0);
    }
}

/// Child table backing a sequence field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionTable {
    pub table: String,
    /// Column referencing the parent's `id`.
    pub foreign_key: String,
    /// Column holding the element for scalar sequences.
    #[serde(default = "default_value_column")]
    pub value_column: String,
}

fn default_value_column() -> String {
    "value".to_string()
}

impl CollectionTable {
    pub fn new(table: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            foreign_key: foreign_key.into(),
            value_column: default_value_column(),
        }
    }

    pub fn value_column(mut self, column: impl Into<String>) -> Self {
        self.value_column = column.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("custom predicate '{0}' has no SQL form")]
    NativePredicate(String),
    #[error("computed sort key '{0}' has no SQL form")]
    ComputedSortKey(String),
    #[error("no table registered for collection '{0}'")]
    UnmappedCollection(String),
    #[error("collection element referenced outside a scalar collection")]
    ElementOutsideCollection,
}

/// Represents an optimization applied during compilation
#[derive(Debug, Clone, PartialEq)]
pub enum Optimization {
    OrToIn { column: String, value_count: usize },
}

/// Result of SQL compilation with optimization information
#[derive(Debug)]
pub struct CompileResult {
    pub sql: String,
    pub count_sql: String,
    pub optimizations: Vec<Optimization>,
}

/// SQL Compiler that converts query plans to SQL
pub struct SqlCompiler {
    config: OptimizationConfig,
    /// Maps entity names to table names for schema resolution
    table_mapping: HashMap<String, String>,
    /// Keyed by dotted path from the entity root.
    collections: HashMap<String, CollectionTable>,
}

/// Where column references of the predicate being rendered point.
#[derive(Clone)]
struct Scope {
    alias: TableAlias,
    depth: usize,
    /// Dotted path of the current collection from the entity root.
    prefix: String,
    /// Element column when inside a scalar collection.
    element: Option<String>,
}

impl Scope {
    fn root() -> Self {
        Self {
            alias: TableAlias::Root,
            depth: 0,
            prefix: String::new(),
            element: None,
        }
    }
}

impl Default for SqlCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlCompiler {
    pub fn new() -> Self {
        Self::with_config(OptimizationConfig::default())
    }

    pub fn with_config(config: OptimizationConfig) -> Self {
        Self {
            config,
            table_mapping: HashMap::new(),
            collections: HashMap::new(),
        }
    }

    /// Set table mapping for entity names
    pub fn set_table_mapping(&mut self, mapping: HashMap<String, String>) {
        self.table_mapping = mapping;
    }

    /// Registers the child table of a sequence field (dotted path from the root).
    pub fn with_collection(mut self, path: &str, table: CollectionTable) -> Self {
        self.collections.insert(path.to_string(), table);
        self
    }

    /// Get the actual table name for an entity
    pub fn get_table_name(&self, entity: &str) -> String {
        self.table_mapping
            .get(entity)
            .cloned()
            .unwrap_or_else(|| entity.to_lowercase())
    }

    /// Compiles the plan into a page query and a matching count query.
    pub fn compile(&self, plan: &QueryPlan, entity: &str) -> Result<CompileResult, CompileError> {
        let mut optimizations = Vec::new();
        let select = self.build_select(plan, entity, &mut optimizations)?;
        let count = self.build_count(plan, entity, &mut Vec::new())?;

        let result = CompileResult {
            sql: select.to_string(PostgresQueryBuilder),
            count_sql: count.to_string(PostgresQueryBuilder),
            optimizations,
        };
        log::debug!("compiled {} query: {}", entity, result.sql);
        Ok(result)
    }

    /// `SELECT *` with filter, ordering, offset and limit.
    pub fn select(&self, plan: &QueryPlan, entity: &str) -> Result<SelectStatement, CompileError> {
        self.build_select(plan, entity, &mut Vec::new())
    }

    /// `SELECT COUNT(*)` with the filter only.
    pub fn count(&self, plan: &QueryPlan, entity: &str) -> Result<SelectStatement, CompileError> {
        self.build_count(plan, entity, &mut Vec::new())
    }

    fn build_select(
        &self,
        plan: &QueryPlan,
        entity: &str,
        optimizations: &mut Vec<Optimization>,
    ) -> Result<SelectStatement, CompileError> {
        let mut select = self.base(plan, entity, optimizations)?;
        select.column(Asterisk);
        self.apply_ordering(&mut select, &plan.ordering)?;
        if let Some(offset) = plan.window.offset {
            select.offset(offset as u64);
        }
        if let Some(limit) = plan.window.limit {
            select.limit(limit as u64);
        }
        Ok(select)
    }

    fn build_count(
        &self,
        plan: &QueryPlan,
        entity: &str,
        optimizations: &mut Vec<Optimization>,
    ) -> Result<SelectStatement, CompileError> {
        let mut select = self.base(plan, entity, optimizations)?;
        select.expr(Func::count(Expr::col(Asterisk)));
        Ok(select)
    }

    fn base(
        &self,
        plan: &QueryPlan,
        entity: &str,
        optimizations: &mut Vec<Optimization>,
    ) -> Result<SelectStatement, CompileError> {
        let mut select = Query::select();
        select.from_as(Alias::new(self.get_table_name(entity)), TableAlias::Root);
        if let Some(predicate) = &plan.filter {
            let condition = self.compile_predicate(predicate, &Scope::root(), optimizations)?;
            select.and_where(condition);
        }
        Ok(select)
    }

    fn apply_ordering(
        &self,
        select: &mut SelectStatement,
        plan: &SortPlan,
    ) -> Result<(), CompileError> {
        for key in plan.keys() {
            let column = match &key.target {
                SortTarget::Field(path) => path.join("_"),
                SortTarget::Computed(computed) => {
                    return Err(CompileError::ComputedSortKey(computed.name.clone()))
                }
            };
            let order = if key.ascending { Order::Asc } else { Order::Desc };
            select.order_by((TableAlias::Root, ColumnName(column)), order);
        }
        Ok(())
    }

    fn compile_predicate(
        &self,
        predicate: &Predicate,
        scope: &Scope,
        optimizations: &mut Vec<Optimization>,
    ) -> Result<SimpleExpr, CompileError> {
        let expr = match predicate {
            Predicate::Compare { field, op, value } => {
                self.compile_comparison(field, *op, value, scope)?
            }
            Predicate::In { field, values } => self.compile_in(field, values, scope)?,
            Predicate::Text { field, op, value } => {
                let pattern = match op {
                    TextMatch::Contains => format!("%{}%", escape_like(value)),
                    TextMatch::StartsWith => format!("{}%", escape_like(value)),
                    TextMatch::EndsWith => format!("%{}", escape_like(value)),
                };
                self.column(field, scope)?.like(LikeExpr::new(pattern).escape('\\'))
            }
            Predicate::Any { field, predicate } => {
                let subquery = self.correlated(field, predicate, scope, optimizations)?;
                Expr::exists(subquery)
            }
            Predicate::All { field, predicate } => {
                let negated = Predicate::Not(predicate.clone());
                let subquery = self.correlated(field, &negated, scope, optimizations)?;
                Expr::exists(subquery).not()
            }
            Predicate::And(left, right) => {
                let left = self.compile_predicate(left, scope, optimizations)?;
                let right = self.compile_predicate(right, scope, optimizations)?;
                left.and(right)
            }
            Predicate::Or(left, right) => {
                let optimized = self.try_optimize_or_to_in(predicate, scope, optimizations)?;
                if let Some(in_expr) = optimized {
                    in_expr
                } else {
                    let left = self.compile_predicate(left, scope, optimizations)?;
                    let right = self.compile_predicate(right, scope, optimizations)?;
                    left.or(right)
                }
            }
            Predicate::Not(inner) => {
                let inner_expr = self.compile_predicate(inner, scope, optimizations)?;
                match **inner {
                    // EXISTS is never unknown.
                    Predicate::Any { .. } | Predicate::All { .. } => inner_expr.not(),
                    // A comparison against NULL is unknown, which plain NOT keeps unknown.
                    // Folding it to FALSE first matches in-memory evaluation.
                    _ => {
                        let known = Func::coalesce([inner_expr, Expr::val(false).into()]);
                        SimpleExpr::from(known).not()
                    }
                }
            }
            Predicate::Native(native) => {
                return Err(CompileError::NativePredicate(native.name.clone()))
            }
        };
        Ok(expr)
    }

    /// `SELECT 1 FROM child WHERE child.fk = parent.id AND <predicate>`
    fn correlated(
        &self,
        field: &FieldPath,
        predicate: &Predicate,
        scope: &Scope,
        optimizations: &mut Vec<Optimization>,
    ) -> Result<SelectStatement, CompileError> {
        let key = if scope.prefix.is_empty() {
            field.join(".")
        } else {
            format!("{}.{}", scope.prefix, field.join("."))
        };
        let table = self
            .collections
            .get(&key)
            .ok_or_else(|| CompileError::UnmappedCollection(key.clone()))?;

        let inner = Scope {
            alias: TableAlias::Nested(scope.depth + 1),
            depth: scope.depth + 1,
            prefix: key.clone(),
            element: Some(table.value_column.clone()),
        };
        let condition = self.compile_predicate(predicate, &inner, optimizations)?;

        let mut subquery = Query::select();
        subquery
            .expr(Expr::val(1))
            .from_as(Alias::new(table.table.as_str()), inner.alias)
            .and_where(
                Expr::col((inner.alias, ColumnName(table.foreign_key.clone())))
                    .equals((scope.alias, ColumnName("id".to_string()))),
            )
            .and_where(condition);
        Ok(subquery)
    }

    fn column(&self, operand: &Operand, scope: &Scope) -> Result<Expr, CompileError> {
        let name = if operand.path.is_root() {
            scope.element.clone().ok_or(CompileError::ElementOutsideCollection)?
        } else {
            operand.path.join("_")
        };
        let col = Expr::col((scope.alias, ColumnName(name)));
        Ok(if operand.fold_case {
            Expr::expr(Func::lower(col))
        } else {
            col
        })
    }

    /// Compile a comparison operation
    fn compile_comparison(
        &self,
        field: &Operand,
        op: Comparison,
        value: &Scalar,
        scope: &Scope,
    ) -> Result<SimpleExpr, CompileError> {
        let col = self.column(field, scope)?;
        if value.is_null() {
            return Ok(match op {
                Comparison::Eq => col.is_null(),
                Comparison::Ne => col.is_not_null(),
                _ => Expr::val(false).into(),
            });
        }

        let val = scalar_to_value(value);
        let expr = match op {
            Comparison::Eq => col.eq(val),
            // Nulls differ from every constant.
            Comparison::Ne => col.clone().ne(val).or(col.is_null()),
            Comparison::Gt => col.gt(val),
            Comparison::Lt => col.lt(val),
            Comparison::Ge => col.gte(val),
            Comparison::Le => col.lte(val),
        };
        Ok(expr)
    }

    fn compile_in(
        &self,
        field: &Operand,
        values: &[Scalar],
        scope: &Scope,
    ) -> Result<SimpleExpr, CompileError> {
        let col = self.column(field, scope)?;
        let (nulls, constants): (Vec<&Scalar>, Vec<&Scalar>) =
            values.iter().partition(|v| v.is_null());
        let constants: Vec<Value> = constants.into_iter().map(scalar_to_value).collect();

        let expr = match (constants.is_empty(), nulls.is_empty()) {
            (true, true) => Expr::val(false).into(),
            (true, false) => col.is_null(),
            (false, true) => col.is_in(constants),
            (false, false) => col.clone().is_in(constants).or(col.is_null()),
        };
        Ok(expr)
    }

    /// Rewrites `a == x | a == y | ...` on one column into `a IN (x, y, ...)`.
    fn try_optimize_or_to_in(
        &self,
        predicate: &Predicate,
        scope: &Scope,
        optimizations: &mut Vec<Optimization>,
    ) -> Result<Option<SimpleExpr>, CompileError> {
        let mut operands = Vec::new();
        let mut values = Vec::new();
        if !collect_equality_values(predicate, &mut operands, &mut values) {
            return Ok(None);
        }
        let Some(first) = operands.first() else {
            return Ok(None);
        };
        if values.len() < self.config.max_or_conditions_for_in
            || operands.iter().any(|o| o != first)
        {
            return Ok(None);
        }

        let first = *first;
        let in_values: Vec<Scalar> = values.into_iter().cloned().collect();
        optimizations.push(Optimization::OrToIn {
            column: first.path.join("_"),
            value_count: in_values.len(),
        });
        self.compile_in(first, &in_values, scope).map(Some)
    }
}

/// Collects the operands and constants of an OR chain of non-null equalities.
/// Returns false if the chain contains anything else.
fn collect_equality_values<'p>(
    predicate: &'p Predicate,
    operands: &mut Vec<&'p Operand>,
    values: &mut Vec<&'p Scalar>,
) -> bool {
    match predicate {
        Predicate::Compare {
            field,
            op: Comparison::Eq,
            value,
        } if !value.is_null() => {
            operands.push(field);
            values.push(value);
            true
        }
        Predicate::Or(left, right) => {
            collect_equality_values(left, operands, values)
                && collect_equality_values(right, operands, values)
        }
        _ => false,
    }
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Convert a constant to a sea-query Value
fn scalar_to_value(scalar: &Scalar) -> Value {
    match scalar {
        Scalar::Null => Value::String(None),
        Scalar::Bool(b) => Value::Bool(Some(*b)),
        Scalar::Int(i) => Value::BigInt(Some(*i)),
        Scalar::Float(x) => Value::Double(Some(*x)),
        Scalar::String(s) => Value::String(Some(Box::new(s.clone()))),
        Scalar::DateTime(d) => Value::String(Some(Box::new(d.to_rfc3339()))),
    }
}
