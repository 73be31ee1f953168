//! One generation pass over a set of declarations.
//!
//! Each declaration gets its own local converter scope in both directions, chained to the global
//! scopes holding the built-in and configured converters. A declaration's local converters are
//! all registered before any of its operations is looked at, so declaration order within it does
//! not matter. Then each operation's SQL is parsed, and each parameter and result type is lowered
//! and resolved. Problems are collected as diagnostics and never stop the pass.

use std::collections::{HashMap, HashSet};

use querygen_core::converter::{Binding, Converter, Decode, Direction, Encode, Routine};
use querygen_core::diagnostic::{Diagnostic, DiagnosticKind, Diagnostics};
use querygen_core::placeholders::{self, ParsedSql};
use querygen_core::registry::SearchKey;
use querygen_core::resolver::{Resolver, StoreResolve};
use querygen_core::scope::{ScopeComposer, SymbolId, SymbolKind, SymbolTable};
use querygen_core::types::{Field, Shape, TypeId, TypeTable};
use querygen_core::{builtins, Config, NameGen, OptionalFlag, RecordFactory};
use quote::ToTokens;
use syn::{Ident, Type};

use crate::lower::{is_unit, lower_type};
use crate::report::{Report, ReportEntry};

/// Which way a declared converter converts.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConverterDirection {
    Encode,
    Decode,
}

/// A converter declared on a declaration, visible to that declaration only.
#[derive(Clone, Debug)]
pub struct ConverterSpec {
    pub direction: ConverterDirection,
    /// Registered by name if set, otherwise as the default converter for `ty`.
    pub name: Option<String>,
    pub ty: Type,
    pub routine: syn::Path,
    pub nullness: OptionalFlag,
}

/// A record type whose converters may be synthesized field by field.
#[derive(Clone, Debug)]
pub struct RecordSpec {
    pub name: Ident,
    pub supertype: Option<Type>,
    pub fields: Vec<FieldSpec>,
}

#[derive(Clone, Debug)]
pub struct FieldSpec {
    pub name: Ident,
    pub ty: Type,
    pub nullness: OptionalFlag,
}

#[derive(Clone, Debug)]
pub struct ParamSpec {
    pub name: Ident,
    pub ty: Type,
    pub nullness: OptionalFlag,
    /// Name of the encode converter to use instead of the default for `ty`.
    pub converter: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ResultSpec {
    pub ty: Type,
    pub nullness: OptionalFlag,
    /// Name of the decode converter to use instead of the default for `ty`.
    pub converter: Option<String>,
}

#[derive(Clone, Debug)]
pub struct OperationSpec {
    pub name: Ident,
    pub sql: String,
    pub params: Vec<ParamSpec>,
    /// `None` or `()` for operations that return nothing.
    pub result: Option<ResultSpec>,
}

/// A top-level declaration, e.g. a DAO trait.
#[derive(Clone, Debug)]
pub struct DeclSpec {
    /// The `::`-separated module the declaration lives in; empty for the crate root.
    pub module: String,
    pub name: Ident,
    pub converters: Vec<ConverterSpec>,
    pub operations: Vec<OperationSpec>,
}

/// A value resolved through zero or more decompositions down to a converter.
///
/// `chain[0]` is the resolution of the declared type, each following entry resolves the
/// component of the one before it, and only the last entry may hold a converter.
#[derive(Clone, Debug)]
pub struct ResolvedSlot<D: Direction> {
    pub ty: TypeId,
    pub chain: Vec<StoreResolve<D>>,
}

impl<D: Direction> ResolvedSlot<D> {
    /// The converter the value is ultimately converted with.
    pub fn converter(&self) -> Option<&Converter<D>> {
        self.chain.last().and_then(StoreResolve::converter)
    }

    pub fn binding(&self) -> Option<&Binding> {
        self.converter().and_then(Converter::binding)
    }
}

#[derive(Clone, Debug)]
pub struct ResolvedParam {
    pub name: Ident,
    /// `None` if the declared type could not be lowered.
    pub slot: Option<ResolvedSlot<Encode>>,
}

#[derive(Clone, Debug)]
pub struct ResolvedOperation {
    pub name: Ident,
    /// `None` if the operation had no SQL.
    pub sql: Option<ParsedSql>,
    /// For each placeholder occurrence in order, the index of the parameter it binds.
    pub bind_order: Vec<usize>,
    pub params: Vec<ResolvedParam>,
    pub result: Option<ResolvedSlot<Decode>>,
    pub diagnostics: Diagnostics,
}

#[derive(Clone, Debug)]
pub struct ResolvedDecl {
    pub name: Ident,
    pub qualified_name: String,
    pub operations: Vec<ResolvedOperation>,
}

impl ResolvedDecl {
    pub fn is_clean(&self) -> bool {
        self.operations.iter().all(|op| op.diagnostics.is_empty())
    }
}

/// The output of [`Generator::run()`].
#[derive(Debug)]
pub struct Generated {
    pub decls: Vec<ResolvedDecl>,
    pub report: Report,
}

/// Owns the state of one generation pass.
pub struct Generator {
    config: Config,
    types: TypeTable,
    symbols: SymbolTable,
    packages: HashMap<String, SymbolId>,
    encoders: ScopeComposer<Encode>,
    decoders: ScopeComposer<Decode>,
    names: NameGen,
}

impl Generator {
    /// Sets up the global scopes from the built-ins and `config`.
    pub fn new(config: Config) -> crate::Result<Self> {
        let mut types = TypeTable::new();
        let mut encoders = ScopeComposer::new();
        let mut decoders = ScopeComposer::new();

        builtins::register(&mut types, encoders.stores_mut(), decoders.stores_mut())?;
        config.apply_types(&mut types)?;
        config.apply_converters(&mut types, encoders.stores_mut(), decoders.stores_mut())?;

        Ok(Generator {
            config,
            types,
            symbols: SymbolTable::new(),
            packages: HashMap::new(),
            encoders,
            decoders,
            names: NameGen::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    /// Adds a record type so converters for it can be synthesized.
    pub fn define_record(&mut self, record: &RecordSpec) -> syn::Result<TypeId> {
        let id = lower_type(&mut self.types, &ident_type(&record.name))?;

        if let Some(supertype) = &record.supertype {
            let supertype = lower_type(&mut self.types, supertype)?;
            self.types
                .set_supertype(id, supertype)
                .map_err(|e| syn::Error::new_spanned(&record.name, e))?;
        }

        let fields = record
            .fields
            .iter()
            .map(|field| {
                Ok(Field {
                    name: field.name.to_string().into(),
                    ty: lower_type(&mut self.types, &field.ty)?,
                    nullness: field.nullness,
                })
            })
            .collect::<syn::Result<Vec<_>>>()?;

        self.types.set_fields(id, fields);
        Ok(id)
    }

    /// Processes every declaration, in order.
    pub fn run(&mut self, decls: &[DeclSpec]) -> crate::Result<Generated> {
        let mut report = Report::new();
        let mut resolved = Vec::with_capacity(decls.len());

        for decl in decls {
            let symbol = self.declare(decl);
            let qualified_name = self.symbols.qualified_name(symbol);
            let span = decl.name.span();

            for (slot, diagnostics) in self.register_converters(symbol, decl)? {
                report.push(ReportEntry::new(&qualified_name, span, slot, diagnostics));
            }

            let mut operations = Vec::with_capacity(decl.operations.len());
            for op in &decl.operations {
                let method =
                    self.symbols
                        .add(&op.name.to_string(), SymbolKind::Method, Some(symbol));
                let operation = self.process_operation(method, op)?;

                if !operation.diagnostics.is_empty() {
                    report.push(ReportEntry::new(
                        &qualified_name,
                        span,
                        format!("operation `{}`", op.name),
                        operation.diagnostics.clone(),
                    ));
                }

                operations.push(operation);
            }

            tracing::debug!(
                decl = %qualified_name,
                operations = operations.len(),
                "processed declaration"
            );

            resolved.push(ResolvedDecl {
                name: decl.name.clone(),
                qualified_name,
                operations,
            });
        }

        Ok(Generated {
            decls: resolved,
            report,
        })
    }

    fn declare(&mut self, decl: &DeclSpec) -> SymbolId {
        let package = self.package(&decl.module);
        let symbol = self
            .symbols
            .add(&decl.name.to_string(), SymbolKind::Type, package);

        self.encoders.local_for(&self.symbols, symbol);
        self.decoders.local_for(&self.symbols, symbol);

        symbol
    }

    /// The innermost package symbol of `module`, creating the chain on first use.
    fn package(&mut self, module: &str) -> Option<SymbolId> {
        let mut enclosing = None;
        let mut path = String::new();

        for segment in module.split("::").filter(|s| !s.is_empty()) {
            if !path.is_empty() {
                path.push_str("::");
            }
            path.push_str(segment);

            let id = match self.packages.get(&path) {
                Some(&id) => id,
                None => {
                    let id = self.symbols.add(segment, SymbolKind::Package, enclosing);
                    self.packages.insert(path.clone(), id);
                    id
                }
            };

            enclosing = Some(id);
        }

        enclosing
    }

    /// Registers the declaration's own converters, returning the slots that ended up poisoned.
    fn register_converters(
        &mut self,
        symbol: SymbolId,
        decl: &DeclSpec,
    ) -> crate::Result<Vec<(String, Diagnostics)>> {
        let mut problems = Vec::new();

        for spec in &decl.converters {
            let label = match &spec.name {
                Some(name) => format!("converter `{name}`"),
                None => format!("converter for `{}`", spec.ty.to_token_stream()),
            };

            let ty = match lower_type(&mut self.types, &spec.ty) {
                Ok(ty) => ty,
                Err(e) => {
                    problems.push((label, unsupported(&e)));
                    continue;
                }
            };

            let routine = spec.routine.to_token_stream().to_string().replace(' ', "");
            let binding = Binding::new(ty, Routine::path(routine), spec.nullness);
            let name = spec.name.as_deref();

            let poisoned = match spec.direction {
                ConverterDirection::Encode => {
                    let scope = self.encoders.local_for(&self.symbols, symbol);
                    self.encoders
                        .stores_mut()
                        .put(scope, name, ty, Converter::bound(binding), &self.types)?
                        .diagnostics()
                        .cloned()
                }
                ConverterDirection::Decode => {
                    let scope = self.decoders.local_for(&self.symbols, symbol);
                    self.decoders
                        .stores_mut()
                        .put(scope, name, ty, Converter::bound(binding), &self.types)?
                        .diagnostics()
                        .cloned()
                }
            };

            if let Some(diagnostics) = poisoned {
                problems.push((label, diagnostics));
            }
        }

        // a slot poisoned several times is reported once, with its final diagnostics
        let mut seen = HashSet::new();
        problems.reverse();
        problems.retain(|(label, _)| seen.insert(label.clone()));
        problems.reverse();

        Ok(problems)
    }

    fn process_operation(
        &mut self,
        method: SymbolId,
        op: &OperationSpec,
    ) -> crate::Result<ResolvedOperation> {
        let mut diagnostics = Diagnostics::new();

        let (sql, bind_order) = if op.sql.trim().is_empty() {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::EmptySql,
                format!("operation `{}` has no SQL", op.name),
            ));
            (None, Vec::new())
        } else {
            let parsed = placeholders::parse(&op.sql)?;
            let bind_order = check_placeholders(&parsed, &op.params, &mut diagnostics);
            (Some(parsed), bind_order)
        };

        let factory = RecordFactory::new(&self.names);

        let mut params = Vec::with_capacity(op.params.len());
        for param in &op.params {
            let slot = match lower_type(&mut self.types, &param.ty) {
                Ok(ty) => {
                    let mut resolver =
                        self.encoders
                            .resolver_for(&self.symbols, method, &self.types, &factory);
                    let key = SearchKey::new(param.converter.as_deref(), ty);
                    let slot = resolve_slot(&mut resolver, key, param.nullness)?;
                    record_slot(&mut diagnostics, &format!("parameter `{}`", param.name), &slot);
                    Some(slot)
                }
                Err(e) => {
                    diagnostics.merge(&unsupported(&e));
                    None
                }
            };

            params.push(ResolvedParam {
                name: param.name.clone(),
                slot,
            });
        }

        let result = match op.result.as_ref().filter(|result| !is_unit(&result.ty)) {
            Some(result) => match lower_type(&mut self.types, &result.ty) {
                Ok(ty) => {
                    let mut resolver =
                        self.decoders
                            .resolver_for(&self.symbols, method, &self.types, &factory);
                    let key = SearchKey::new(result.converter.as_deref(), ty);
                    let slot = resolve_slot(&mut resolver, key, result.nullness)?;
                    record_slot(&mut diagnostics, "result", &slot);
                    Some(slot)
                }
                Err(e) => {
                    diagnostics.merge(&unsupported(&e));
                    None
                }
            },
            None => None,
        };

        Ok(ResolvedOperation {
            name: op.name.clone(),
            sql,
            bind_order,
            params,
            result,
            diagnostics,
        })
    }
}

/// Resolves `key`, following decompositions down to a converter.
///
/// The converter name applies to the innermost element. An `Option` makes its element
/// `OPTIONAL_TYPE`.
fn resolve_slot<D: Direction>(
    resolver: &mut Resolver<'_, D>,
    mut key: SearchKey,
    mut declared: OptionalFlag,
) -> crate::Result<ResolvedSlot<D>> {
    let ty = key.ty();
    let mut chain = Vec::new();

    loop {
        let resolved = resolver.resolve_with_flag(&key, declared)?;
        let kind = resolved.kind();
        let component = resolved.component();
        chain.push(resolved);

        let Some(component) = component else {
            return Ok(ResolvedSlot { ty, chain });
        };

        if kind == Shape::Optional {
            declared = OptionalFlag::OptionalType;
        }
        key = SearchKey::new(key.name(), component);
    }
}

fn record_slot<D: Direction>(diagnostics: &mut Diagnostics, slot: &str, resolved: &ResolvedSlot<D>) {
    if let Some(found) = resolved.converter().and_then(Converter::diagnostics) {
        diagnostics.extend(
            found
                .iter()
                .map(|d| Diagnostic::new(d.kind, format!("{slot}: {}", d.message))),
        );
    }
}

/// Checks placeholders against parameters and returns, per occurrence, the parameter it binds.
///
/// Anonymous placeholders bind parameters by position and cannot be mixed with named ones.
fn check_placeholders(
    parsed: &ParsedSql,
    params: &[ParamSpec],
    diagnostics: &mut Diagnostics,
) -> Vec<usize> {
    let mut bind_order = Vec::with_capacity(parsed.occurrences().len());
    let names = parsed.names();

    if names.is_empty() {
        for occurrence in parsed.occurrences() {
            if occurrence.index <= params.len() {
                bind_order.push(occurrence.index - 1);
            } else {
                diagnostics.push(Diagnostic::new(
                    DiagnosticKind::UnboundPlaceholder,
                    format!(
                        "placeholder #{} has no parameter, near `{}`",
                        occurrence.index,
                        parsed.context(occurrence)
                    ),
                ));
            }
        }

        for param in params.iter().skip(parsed.occurrences().len()) {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::UnusedParameter,
                format!("parameter `{}` is not bound by any placeholder", param.name),
            ));
        }

        return bind_order;
    }

    for occurrence in parsed.occurrences() {
        if occurrence.is_anonymous() {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::UnboundPlaceholder,
                format!(
                    "anonymous placeholder #{} cannot be mixed with named placeholders, near `{}`",
                    occurrence.index,
                    parsed.context(occurrence)
                ),
            ));
            continue;
        }

        match params.iter().position(|p| p.name == occurrence.name) {
            Some(index) => bind_order.push(index),
            None => diagnostics.push(Diagnostic::new(
                DiagnosticKind::UnboundPlaceholder,
                format!(
                    "placeholder `:{}` matches no parameter, near `{}`",
                    occurrence.name,
                    parsed.context(occurrence)
                ),
            )),
        }
    }

    for param in params {
        if !names.iter().any(|name| param.name == name) {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::UnusedParameter,
                format!("parameter `{}` is not referenced by the SQL", param.name),
            ));
        }
    }

    bind_order
}

fn unsupported(e: &syn::Error) -> Diagnostics {
    Diagnostics::single(DiagnosticKind::UnsupportedType, e.to_string())
}

fn ident_type(ident: &Ident) -> Type {
    syn::parse_quote!(#ident)
}
