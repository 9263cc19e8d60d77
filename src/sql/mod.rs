//! SQL generation.
//!
//! A type-safe builder that renders multi-dialect SQL:
//!
//! - [`query`] - SELECT/CTE builder
//! - [`expr`] - Expression AST and builder DSL
//! - [`token`] - Token types serialized per dialect
//! - [`dialect`] - SQL dialect implementations

pub mod dialect;
pub mod expr;
pub mod query;
pub mod token;

pub use dialect::{Dialect, SqlDialect};
pub use expr::{
    avg, coalesce, col, count, count_distinct, func, lag_offset, lit_float, lit_int, lit_str, max,
    min, nullif, raw_sql, sum, table_col, BinaryOperator, Expr, ExprExt, Literal, SortDir,
    WindowExt, WindowFrame, WindowOrderBy,
};
pub use query::{Cte, Join, JoinType, LimitOffset, OrderByExpr, Query, SelectExpr, TableRef};
pub use token::{Token, TokenStream};
