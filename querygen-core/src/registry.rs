//! Scoped converter registries.
//!
//! All registries of one direction live in a single [`Stores`] arena. Each scope has at most one
//! parent; the root is the global scope and every declaration-local scope is a child of it.
//! Lookups walk from a scope to the root and return the first hit.
//!
//! Converters synthesized on demand are cached apart from registered ones. They are only ever
//! returned for their exact type, and only after no registered converter matched anywhere in
//! the chain, so a cache hit gives the same answer a fresh synthesis would.

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};

use crate::converter::{Converter, Direction};
use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::error::{Error, Result};
use crate::types::{TypeId, TypeTable};

/// A handle to one registry in a [`Stores`] arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

/// What a converter is looked up or registered by.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SearchKey {
    name: Option<Box<str>>,
    ty: TypeId,
}

impl SearchKey {
    /// An empty `name` is treated as unset.
    pub fn new(name: Option<&str>, ty: TypeId) -> Self {
        SearchKey {
            name: name.filter(|n| !n.is_empty()).map(Into::into),
            ty,
        }
    }

    pub fn of_type(ty: TypeId) -> Self {
        SearchKey { name: None, ty }
    }

    pub fn named(name: &str, ty: TypeId) -> Self {
        Self::new(Some(name), ty)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn ty(&self) -> TypeId {
        self.ty
    }

    pub fn display<'a>(&'a self, types: &'a TypeTable) -> DisplayKey<'a> {
        DisplayKey { key: self, types }
    }
}

pub struct DisplayKey<'a> {
    key: &'a SearchKey,
    types: &'a TypeTable,
}

impl Display for DisplayKey<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.key.name {
            Some(name) => write!(f, "`{name}`: {}", self.types.name(self.key.ty)),
            None => write!(f, "{}", self.types.name(self.key.ty)),
        }
    }
}

/// The table slot a converter occupies: its name if it has one, else its type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum Slot {
    Name(Box<str>),
    Type(TypeId),
    Synthesized(TypeId),
}

impl Slot {
    fn new(name: Option<&str>, ty: TypeId) -> Self {
        match name.filter(|n| !n.is_empty()) {
            Some(name) => Slot::Name(name.into()),
            None => Slot::Type(ty),
        }
    }

    fn describe(&self, types: &TypeTable) -> String {
        match self {
            Slot::Name(name) => format!("name `{name}`"),
            Slot::Type(ty) => format!("type `{}`", types.name(*ty)),
            Slot::Synthesized(ty) => format!("synthesized type `{}`", types.name(*ty)),
        }
    }
}

#[derive(Debug)]
struct Scope<D: Direction> {
    name: Box<str>,
    parent: Option<ScopeId>,
    entries: HashMap<Slot, Converter<D>>,
}

/// An arena of parent-linked converter registries for one direction.
#[derive(Debug)]
pub struct Stores<D: Direction> {
    scopes: Vec<Scope<D>>,
}

impl<D: Direction> Default for Stores<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Direction> Stores<D> {
    /// Creates an arena holding only the global scope.
    pub fn new() -> Self {
        Stores {
            scopes: vec![Scope {
                name: "global".into(),
                parent: None,
                entries: HashMap::new(),
            }],
        }
    }

    pub fn global(&self) -> ScopeId {
        ScopeId(0)
    }

    /// Creates an empty scope whose lookups fall through to `parent`.
    pub fn create_child(&mut self, parent: ScopeId, name: &str) -> ScopeId {
        let id = ScopeId(self.scopes.len());
        self.scopes.push(Scope {
            name: name.into(),
            parent: Some(parent),
            entries: HashMap::new(),
        });
        id
    }

    pub fn name(&self, scope: ScopeId) -> &str {
        &self.scopes[scope.0].name
    }

    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes[scope.0].parent
    }

    /// Number of entries registered directly in `scope`.
    pub fn len(&self, scope: ScopeId) -> usize {
        self.scopes[scope.0].entries.len()
    }

    /// `scope` followed by each of its ancestors up to the global scope.
    pub fn chain(&self, scope: ScopeId) -> impl Iterator<Item = ScopeId> + '_ {
        std::iter::successors(Some(scope), move |s| self.parent(*s))
    }

    /// Registers `converter` and returns whatever now occupies its slot.
    ///
    /// Re-registering the same definition is a no-op. Any other collision poisons the slot with
    /// a converter carrying both sides' diagnostics plus a [`DiagnosticKind::DuplicateKey`].
    pub fn put(
        &mut self,
        scope: ScopeId,
        name: Option<&str>,
        ty: TypeId,
        converter: Converter<D>,
        types: &TypeTable,
    ) -> Result<Converter<D>> {
        let slot = Slot::new(name, ty);
        let scope_name = self.scopes[scope.0].name.clone();
        let entries = &mut self.scopes[scope.0].entries;

        let Some(existing) = entries.get(&slot) else {
            tracing::trace!(
                direction = D::NAME,
                scope = &*scope_name,
                slot = %slot.describe(types),
                "registered converter"
            );
            entries.insert(slot, converter.clone());
            return Ok(converter);
        };

        if existing.same_definition(&converter) {
            return Ok(existing.clone());
        }

        let mut diagnostics = existing.diagnostics_or_empty();
        diagnostics.merge(&converter.diagnostics_or_empty());
        diagnostics.push(Diagnostic::new(
            DiagnosticKind::DuplicateKey,
            format!(
                "duplicate {} converter for {} in scope `{scope_name}`",
                D::NAME,
                slot.describe(types)
            ),
        ));

        tracing::warn!(
            direction = D::NAME,
            scope = &*scope_name,
            slot = %slot.describe(types),
            "conflicting converter registration; slot poisoned"
        );

        let poisoned = Converter::failed(diagnostics)?;
        entries.insert(slot, poisoned.clone());
        Ok(poisoned)
    }

    /// Caches a converter synthesized for `ty` and returns whatever is cached for it.
    ///
    /// The first cached converter wins; synthesis is deterministic, so a second one for the
    /// same type is the same conversion.
    pub fn cache(
        &mut self,
        scope: ScopeId,
        ty: TypeId,
        converter: Converter<D>,
        types: &TypeTable,
    ) -> Converter<D> {
        let entry = &mut self.scopes[scope.0];

        tracing::trace!(
            direction = D::NAME,
            scope = &*entry.name,
            ty = types.name(ty),
            "cached synthesized converter"
        );

        entry
            .entries
            .entry(Slot::Synthesized(ty))
            .or_insert(converter)
            .clone()
    }

    /// Registers a bootstrap converter, failing on any collision.
    pub fn put_unique(
        &mut self,
        scope: ScopeId,
        name: Option<&str>,
        ty: TypeId,
        converter: Converter<D>,
        types: &TypeTable,
    ) -> Result<()> {
        let slot = Slot::new(name, ty);
        let entry = &mut self.scopes[scope.0];

        if entry.entries.contains_key(&slot) {
            return Err(Error::DuplicateBuiltin {
                scope: entry.name.to_string(),
                slot: slot.describe(types),
            });
        }

        entry.entries.insert(slot, converter);
        Ok(())
    }

    /// Looks `key` up from `scope` towards the root.
    ///
    /// By name, the first scope holding the name wins. By type, each scope is first searched for
    /// the exact type and then, if [`Direction::SUPERTYPE_FALLBACK`] holds, for each supertype
    /// nearest-first before moving on to the parent scope. Only if nothing registered matches is
    /// the chain searched again for a synthesized converter of the exact type.
    pub fn search(
        &self,
        scope: ScopeId,
        key: &SearchKey,
        types: &TypeTable,
    ) -> Option<Converter<D>> {
        if let Some(name) = key.name() {
            let slot = Slot::Name(name.into());
            return self
                .chain(scope)
                .find_map(|s| self.scopes[s.0].entries.get(&slot))
                .cloned();
        }

        for s in self.chain(scope) {
            let entries = &self.scopes[s.0].entries;

            if D::SUPERTYPE_FALLBACK {
                let found = types
                    .supertypes(key.ty())
                    .find_map(|ty| entries.get(&Slot::Type(ty)));

                if found.is_some() {
                    return found.cloned();
                }
            } else if let Some(found) = entries.get(&Slot::Type(key.ty())) {
                return Some(found.clone());
            }
        }

        let synthesized = Slot::Synthesized(key.ty());
        self.chain(scope)
            .find_map(|s| self.scopes[s.0].entries.get(&synthesized))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::{Binding, Decode, Encode, Routine};
    use crate::optional::OptionalFlag;
    use crate::types::Shape;

    fn bound<D: Direction>(ty: TypeId, path: &str) -> Converter<D> {
        Converter::bound(Binding::new(
            ty,
            Routine::path(path),
            OptionalFlag::Unspecified,
        ))
    }

    #[test]
    fn put_same_definition_is_idempotent() -> Result<()> {
        let mut types = TypeTable::new();
        let i32_ = types.intern("i32", Shape::Primitive);

        let mut stores = Stores::<Encode>::new();
        let global = stores.global();

        stores.put(global, None, i32_, bound(i32_, "rt::i32"), &types)?;
        let effective = stores.put(global, None, i32_, bound(i32_, "rt::i32"), &types)?;

        assert!(effective.is_bound());
        assert_eq!(stores.len(global), 1);

        Ok(())
    }

    #[test]
    fn put_conflict_poisons_slot() -> Result<()> {
        let mut types = TypeTable::new();
        let uuid = types.intern("Uuid", Shape::Object);

        let mut stores = Stores::<Encode>::new();
        let global = stores.global();

        stores.put(global, Some("id"), uuid, bound(uuid, "a::uuid"), &types)?;
        let effective = stores.put(global, Some("id"), uuid, bound(uuid, "b::uuid"), &types)?;

        let diagnostics = effective.diagnostics().expect("slot should be poisoned");
        assert_eq!(diagnostics.count(DiagnosticKind::DuplicateKey), 1);

        let found = stores
            .search(global, &SearchKey::named("id", uuid), &types)
            .expect("poisoned entry is still found");
        assert_eq!(found, effective);

        Ok(())
    }

    #[test]
    fn put_unique_rejects_collisions() {
        let mut types = TypeTable::new();
        let i64_ = types.intern("i64", Shape::Primitive);

        let mut stores = Stores::<Decode>::new();
        let global = stores.global();

        stores
            .put_unique(global, None, i64_, bound(i64_, "rt::i64"), &types)
            .unwrap();

        let err = stores
            .put_unique(global, None, i64_, bound(i64_, "rt::i64"), &types)
            .unwrap_err();

        assert!(matches!(err, Error::DuplicateBuiltin { .. }), "{err}");
    }

    #[test]
    fn names_and_types_do_not_collide() -> Result<()> {
        let mut types = TypeTable::new();
        let string = types.intern("String", Shape::Object);

        let mut stores = Stores::<Encode>::new();
        let global = stores.global();

        stores.put(global, Some("String"), string, bound(string, "a"), &types)?;
        stores.put(global, None, string, bound(string, "b"), &types)?;

        assert_eq!(stores.len(global), 2);

        Ok(())
    }

    #[test]
    fn child_falls_through_to_parent() -> Result<()> {
        let mut types = TypeTable::new();
        let i32_ = types.intern("i32", Shape::Primitive);
        let i64_ = types.intern("i64", Shape::Primitive);

        let mut stores = Stores::<Decode>::new();
        let global = stores.global();
        let child = stores.create_child(global, "UserDao");

        stores.put(global, None, i32_, bound(i32_, "global::i32"), &types)?;
        stores.put(child, None, i64_, bound(i64_, "local::i64"), &types)?;

        assert!(stores.search(child, &SearchKey::of_type(i32_), &types).is_some());
        assert!(stores.search(child, &SearchKey::of_type(i64_), &types).is_some());
        assert!(stores.search(global, &SearchKey::of_type(i64_), &types).is_none());
        assert_eq!(stores.chain(child).collect::<Vec<_>>(), [child, global]);
        assert_eq!(stores.len(global), 1);

        Ok(())
    }

    #[test]
    fn supertype_fallback_is_encode_only() -> Result<()> {
        let mut types = TypeTable::new();
        let animal = types.intern("Animal", Shape::Object);
        let dog = types.intern("Dog", Shape::Object);
        types.set_supertype(dog, animal)?;

        let mut encoders = Stores::<Encode>::new();
        let mut decoders = Stores::<Decode>::new();
        let (eg, dg) = (encoders.global(), decoders.global());

        encoders.put(eg, None, animal, bound(animal, "enc::animal"), &types)?;
        decoders.put(dg, None, animal, bound(animal, "dec::animal"), &types)?;

        let found = encoders.search(eg, &SearchKey::of_type(dog), &types);
        assert_eq!(found.and_then(|c| c.target()), Some(animal));

        assert!(decoders.search(dg, &SearchKey::of_type(dog), &types).is_none());

        Ok(())
    }

    #[test]
    fn synthesized_entries_match_only_their_own_type() -> Result<()> {
        let mut types = TypeTable::new();
        let animal = types.intern("Animal", Shape::Object);
        let dog = types.intern("Dog", Shape::Object);
        types.set_supertype(dog, animal)?;

        let mut stores = Stores::<Encode>::new();
        let global = stores.global();
        let child = stores.create_child(global, "PetDao");

        stores.cache(child, animal, bound(animal, "synth::animal"), &types);
        assert!(stores.search(child, &SearchKey::of_type(dog), &types).is_none());
        assert!(stores.search(child, &SearchKey::of_type(animal), &types).is_some());

        // anything registered, even further out, comes before the cache
        stores.put(global, None, animal, bound(animal, "global::animal"), &types)?;
        let found = stores.search(child, &SearchKey::of_type(animal), &types);
        assert_eq!(
            found.and_then(|c| c.binding().map(|b| b.routine.clone())),
            Some(Routine::path("global::animal"))
        );

        // the first synthesis for a type stays cached
        let kept = stores.cache(child, animal, bound(animal, "synth::other"), &types);
        assert_eq!(kept.binding().map(|b| &b.routine), Some(&Routine::path("synth::animal")));

        Ok(())
    }
}
