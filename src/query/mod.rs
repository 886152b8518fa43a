//! Filter expressions and the paged feed that executes them.

pub mod feed;
pub mod filter;

pub use feed::DocumentQuery;
pub use filter::{Comparison, Filter, FluentFilter, SqlParameter, SqlQuery, field};
