//! Core of querygen, the compile-time data-access code generator. Not intended to be used
//! directly.
//!
//! This crate holds everything a generation pass needs that does not depend on `syn`: the
//! placeholder parser, the nullness lattice, the host type table and the scoped converter
//! registries together with the resolver that searches and extends them.

#[macro_use]
pub mod error;

pub mod builtins;
pub mod config;
pub mod converter;
pub mod diagnostic;
pub mod factory;
pub mod optional;
pub mod placeholders;
pub mod registry;
pub mod resolver;
pub mod scope;
pub mod types;

#[doc(inline)]
pub use self::{
    config::Config,
    converter::{Binding, Converter, Decode, Direction, Encode, FieldRoutine, Routine},
    diagnostic::{Diagnostic, DiagnosticKind, Diagnostics},
    error::{Error, Result},
    factory::{NameGen, RecordFactory},
    optional::OptionalFlag,
    placeholders::{Occurrence, ParsedSql},
    registry::{ScopeId, SearchKey, Stores},
    resolver::{ConverterFactory, Resolver, StoreResolve},
    scope::{ScopeComposer, SymbolId, SymbolKind, SymbolTable},
    types::{Field, Shape, TypeId, TypeTable},
};
