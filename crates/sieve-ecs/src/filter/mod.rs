//! Boolean component filters.
//!
//! Build a [`FilterExpr`] with [`has`], [`and_of`], [`or_of`], [`not_of`]
//! or the `&`, `|`, `!` operators, then compile it into a minimized
//! [`CompiledFilter`]. Compilation runs Quine–McCluskey over the filter's
//! own variables and is memoized by [`FilterCache`].

mod cache;
mod compiled;
mod expr;
pub mod qmc;

pub use cache::FilterCache;
pub use compiled::{
    CompiledFilter, DEFAULT_MAX_VARIABLES, MAX_VARIABLES, Product, compile_filter,
};
pub use expr::{FilterExpr, and_of, has, not_of, or_of};
