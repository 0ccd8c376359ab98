//! A Go `text/template` engine over JSON data.
//!
//! [`Template::parse`] compiles source text into a set of named trees and
//! [`Template::execute`] evaluates the top-level tree against a
//! `serde_json::Value`. Diagnostics keep Go's `text/template` wording and
//! positions so callers can match on them.

pub mod ast;
mod error;
mod exec;
mod format;
mod funcs;
pub mod lex;
mod parse;
mod template;
mod value;

pub use error::{ExecError, ParseError, TemplateError};
pub use exec::{ExecOptions, MissingKey, DEFAULT_MAX_DEPTH};
pub use parse::MAX_NESTING;
pub use template::{render, Template};
pub use value::Value;
