//! Filter, sort and paging query language for list endpoints.
//!
//! ```text
//! filter   ─► lexer ─► parser ─► Node ─► compiler ─► Predicate ─┬─► Vec<T> (in memory)
//! order by ─► ordering ─────────────────────────► SortPlan ─────┴─► sql_compiler (sea-query)
//! ```

pub mod ast;
pub mod compiler;
pub mod config;
pub mod error;
pub mod lexer;
pub mod mapping;
pub mod model;
pub mod ordering;
pub mod parser;
pub mod predicate;
pub mod query;
pub mod resolver;
pub mod sql_compiler;
pub mod token;
pub mod value;

pub use ast::{FilterOperator, Node, Quantifier};
pub use compiler::FilterCompiler;
pub use error::{QueryError, Result};
pub use mapping::{QueryMappingConfig, QueryOptions};
pub use model::{FieldType, Model, ModelDescriptor, Record};
pub use ordering::{SortPlan, SortTarget, Window};
pub use parser::parse_filter;
pub use predicate::{Comparison, FieldPath, Predicate, TextMatch};
pub use query::{
    apply, apply_filter, apply_ordering_and_paging, apply_query, apply_query_default, compile,
    QueryModel, QueryPlan, Queryable,
};
pub use value::{Scalar, Value};
