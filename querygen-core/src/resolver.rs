//! Converter resolution: registry lookup, on-demand synthesis and cycle detection.

use std::ops::{Deref, DerefMut};

use either::Either;
use indexmap::IndexSet;

use crate::converter::{Binding, Converter, Direction};
use crate::diagnostic::{DiagnosticKind, Diagnostics};
use crate::error::Result;
use crate::optional::OptionalFlag;
use crate::registry::{ScopeId, SearchKey, Stores};
use crate::types::{Shape, TypeId, TypeTable};

/// Synthesizes converters for types nothing was registered for.
///
/// The factory receives the resolver that asked, so synthesis may recursively resolve the
/// converters it is built from; recursion back into a key already being synthesized is caught
/// by the resolver and reported as a [`DiagnosticKind::Cycle`].
pub trait ConverterFactory<D: Direction> {
    fn synthesize(&self, resolver: &mut Resolver<'_, D>, key: &SearchKey) -> Result<Converter<D>>;

    /// Whether `binding` may serve a request for `requested`.
    fn is_compatible(&self, types: &TypeTable, binding: &Binding, requested: TypeId) -> bool {
        D::is_compatible(types, binding.target, requested)
    }
}

/// The outcome of [`Resolver::resolve()`]: either a converter for the whole value, or the
/// component type the caller should decompose the value into.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreResolve<D: Direction> {
    kind: Shape,
    key: SearchKey,
    outcome: Either<Converter<D>, TypeId>,
}

impl<D: Direction> StoreResolve<D> {
    pub fn kind(&self) -> Shape {
        self.kind
    }

    pub fn key(&self) -> &SearchKey {
        &self.key
    }

    pub fn converter(&self) -> Option<&Converter<D>> {
        self.outcome.as_ref().left()
    }

    pub fn component(&self) -> Option<TypeId> {
        self.outcome.as_ref().right().copied()
    }

    /// Diagnostics of the resolved converter, if it failed.
    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        self.converter().and_then(Converter::diagnostics)
    }
}

/// Resolves converters against one scope of a [`Stores`] arena.
pub struct Resolver<'a, D: Direction> {
    stores: &'a mut Stores<D>,
    types: &'a TypeTable,
    factory: &'a dyn ConverterFactory<D>,
    scope: ScopeId,
    in_progress: IndexSet<SearchKey>,
}

impl<'a, D: Direction> Resolver<'a, D> {
    pub fn new(
        stores: &'a mut Stores<D>,
        scope: ScopeId,
        types: &'a TypeTable,
        factory: &'a dyn ConverterFactory<D>,
    ) -> Self {
        Resolver {
            stores,
            types,
            factory,
            scope,
            in_progress: IndexSet::new(),
        }
    }

    pub fn types(&self) -> &'a TypeTable {
        self.types
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    /// Keys whose synthesis is currently on the call stack, outermost first.
    pub fn in_progress(&self) -> impl Iterator<Item = &SearchKey> {
        self.in_progress.iter()
    }

    /// Classifies `key`'s type and resolves a converter or hands back its component.
    pub fn resolve(&mut self, key: &SearchKey) -> Result<StoreResolve<D>> {
        let kind = self.types.shape(key.ty());

        let outcome = match kind {
            Shape::Primitive | Shape::Object => Either::Left(self.search(key)?),
            Shape::Array => {
                let converter = self.search(key)?;

                if converter.is_bound() {
                    Either::Left(converter)
                } else {
                    tracing::trace!(
                        direction = D::NAME,
                        key = %key.display(self.types),
                        "no converter for array as a whole; decomposing"
                    );
                    Either::Right(self.component_of(key)?)
                }
            }
            Shape::Collection | Shape::Optional | Shape::Stream | Shape::Iterable => {
                Either::Right(self.component_of(key)?)
            }
        };

        Ok(StoreResolve {
            kind,
            key: key.clone(),
            outcome,
        })
    }

    /// [`resolve()`][Self::resolve], then checks a resolved converter against the slot's
    /// declared nullness.
    pub fn resolve_with_flag(
        &mut self,
        key: &SearchKey,
        declared: OptionalFlag,
    ) -> Result<StoreResolve<D>> {
        let mut resolved = self.resolve(key)?;

        if let Either::Left(converter) = resolved.outcome {
            resolved.outcome = Either::Left(check_nullness(converter, declared));
        }

        Ok(resolved)
    }

    /// Finds, or synthesizes, the converter for `key`.
    pub fn search(&mut self, key: &SearchKey) -> Result<Converter<D>> {
        let converter = match self.stores.search(self.scope, key, self.types) {
            Some(found) => found,
            None => match key.name() {
                Some(name) => {
                    let missing = Converter::diagnostic(
                        DiagnosticKind::NotFound,
                        format!(
                            "no {} converter named `{name}` is registered for `{}`",
                            D::NAME,
                            self.types.name(key.ty())
                        ),
                    );
                    // every later reference to `name` reports the same miss
                    self.stores
                        .put(self.scope, Some(name), key.ty(), missing, self.types)?
                }
                None => self.synthesize(key)?,
            },
        };

        Ok(self.check_compatible(key, converter))
    }

    /// [`search()`][Self::search], then checks the converter against the declared nullness.
    pub fn search_with_flag(
        &mut self,
        key: &SearchKey,
        declared: OptionalFlag,
    ) -> Result<Converter<D>> {
        let converter = self.search(key)?;
        Ok(check_nullness(converter, declared))
    }

    fn synthesize(&mut self, key: &SearchKey) -> Result<Converter<D>> {
        if self.in_progress.contains(key) {
            let chain = self
                .in_progress
                .iter()
                .chain(Some(key))
                .map(|k| k.display(self.types).to_string())
                .collect::<Vec<_>>()
                .join(" -> ");

            tracing::debug!(direction = D::NAME, %chain, "cyclic converter synthesis");

            return Ok(Converter::diagnostic(
                DiagnosticKind::Cycle,
                format!("cyclic dependency while synthesizing {} converter: {chain}", D::NAME),
            ));
        }

        let factory = self.factory;
        let converter = {
            let mut guard = InProgress::enter(self, key.clone());
            factory.synthesize(&mut guard, key)?
        };

        if !converter.is_bound() {
            // not cached: an independent request later on gets a fresh attempt
            return Ok(converter);
        }

        tracing::debug!(
            direction = D::NAME,
            key = %key.display(self.types),
            "synthesized converter"
        );

        Ok(self.stores.cache(self.scope, key.ty(), converter, self.types))
    }

    fn check_compatible(&self, key: &SearchKey, converter: Converter<D>) -> Converter<D> {
        let incompatible = converter
            .binding()
            .filter(|binding| !self.factory.is_compatible(self.types, binding, key.ty()))
            .map(|binding| binding.target);

        let Some(target) = incompatible else {
            return converter;
        };

        Converter::diagnostic(
            DiagnosticKind::IncompatibleType,
            format!(
                "{} converter for `{}` cannot be used for `{}`",
                D::NAME,
                self.types.name(target),
                self.types.name(key.ty())
            ),
        )
    }

    fn component_of(&self, key: &SearchKey) -> Result<TypeId> {
        self.types.component(key.ty()).ok_or_else(|| {
            err_invariant!(
                "{} type `{}` has no component type",
                self.types.shape(key.ty()),
                self.types.name(key.ty())
            )
        })
    }
}

fn check_nullness<D: Direction>(converter: Converter<D>, declared: OptionalFlag) -> Converter<D> {
    match converter.binding().map(|b| b.nullness) {
        Some(routine) if !D::nullness_ok(declared, routine) => Converter::diagnostic(
            DiagnosticKind::NullnessMismatch,
            D::nullness_message(declared, routine),
        ),
        _ => converter,
    }
}

/// Marks a key as being synthesized for as long as it lives.
///
/// Dereferences to the resolver so the factory can keep resolving through it; the key is
/// removed on drop, whichever way synthesis exits.
struct InProgress<'r, 'a, D: Direction> {
    resolver: &'r mut Resolver<'a, D>,
}

impl<'r, 'a, D: Direction> InProgress<'r, 'a, D> {
    fn enter(resolver: &'r mut Resolver<'a, D>, key: SearchKey) -> Self {
        resolver.in_progress.insert(key);
        InProgress { resolver }
    }
}

impl<'a, D: Direction> Deref for InProgress<'_, 'a, D> {
    type Target = Resolver<'a, D>;

    fn deref(&self) -> &Self::Target {
        self.resolver
    }
}

impl<D: Direction> DerefMut for InProgress<'_, '_, D> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.resolver
    }
}

impl<D: Direction> Drop for InProgress<'_, '_, D> {
    fn drop(&mut self) {
        self.resolver.in_progress.pop();
    }
}
