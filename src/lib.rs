//! Compile-time generation of type-checked data-access code.
//!
//! A declaration (e.g. a DAO trait) lists operations, each with a SQL template and a signature.
//! A generation pass rewrites the templates' named placeholders into positional markers and
//! resolves, for every parameter and result, the converter between the Rust value and the
//! column value. Everything that cannot be resolved is reported as a compile error on the
//! declaration.

// Modules
pub use querygen_core::{
    builtins, config, converter, diagnostic, factory, optional, placeholders, registry, resolver,
    scope, types,
};
pub use querygen_macros_core::{generate, lower, report};

// Types
pub use querygen_core::{
    Config, Converter, Decode, Diagnostic, DiagnosticKind, Diagnostics, Direction, Encode, Error,
    OptionalFlag, Result, SearchKey, Shape, StoreResolve,
};

// Functions
pub use querygen_core::placeholders::parse;
pub use querygen_macros_core::{expand, load_config};
