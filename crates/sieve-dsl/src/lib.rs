//! Filter expression DSL
//!
//! A small string syntax for boolean component filters, so predicates can
//! come from config files, consoles or scripts instead of Rust code.
//!
//! # Syntax
//!
//! ```text
//! Velocity                     // has Velocity
//! !Frozen                      // does not have Frozen
//! Velocity & !Frozen           // both
//! Velocity | Acceleration      // either
//! (Velocity | Acceleration) & !Frozen
//! Velocity, !Frozen            // ',' is an alias for '&'
//! true / false                 // constants
//! ```
//!
//! Names are resolved against a component registry by the caller.
//!
//! # Examples
//!
//! ```
//! use sieve_dsl::{parse_filter, Expr};
//!
//! let expr = parse_filter("Velocity & !Frozen").unwrap();
//! assert_eq!(expr.component_names(), vec!["Velocity", "Frozen"]);
//! assert!(matches!(expr, Expr::And(_)));
//! ```

mod parser;

pub use parser::{Expr, ParseError, parse_filter};
