//! Declaration symbols and the per-declaration registry scopes built over them.

use std::collections::HashMap;

use crate::converter::Direction;
use crate::registry::{ScopeId, Stores};
use crate::resolver::{ConverterFactory, Resolver};
use crate::types::TypeTable;

/// A handle to a declaration in a [`SymbolTable`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SymbolId(usize);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    /// A module or crate; scope lookup never walks past one.
    Package,
    /// A top-level declaration, e.g. a DAO trait.
    Type,
    Method,
}

#[derive(Clone, Debug)]
pub struct Symbol {
    pub name: Box<str>,
    pub kind: SymbolKind,
    pub enclosing: Option<SymbolId>,
}

/// An arena of declarations linked to the declaration that encloses them.
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &str, kind: SymbolKind, enclosing: Option<SymbolId>) -> SymbolId {
        let id = SymbolId(self.symbols.len());
        self.symbols.push(Symbol {
            name: name.into(),
            kind,
            enclosing,
        });
        id
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0]
    }

    /// `id` followed by each symbol enclosing it, innermost first.
    pub fn enclosing_chain(&self, id: SymbolId) -> impl Iterator<Item = SymbolId> + '_ {
        std::iter::successors(Some(id), move |s| self.get(*s).enclosing)
    }

    /// The `::`-joined names from the outermost enclosing symbol down to `id`.
    pub fn qualified_name(&self, id: SymbolId) -> String {
        let mut names: Vec<&str> = self
            .enclosing_chain(id)
            .map(|s| &*self.get(s).name)
            .collect();
        names.reverse();
        names.join("::")
    }
}

/// Owns the registries of one direction and maps declarations to their local scope.
#[derive(Debug)]
pub struct ScopeComposer<D: Direction> {
    stores: Stores<D>,
    locals: HashMap<SymbolId, ScopeId>,
}

impl<D: Direction> Default for ScopeComposer<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Direction> ScopeComposer<D> {
    pub fn new() -> Self {
        ScopeComposer {
            stores: Stores::new(),
            locals: HashMap::new(),
        }
    }

    pub fn global(&self) -> ScopeId {
        self.stores.global()
    }

    pub fn stores(&self) -> &Stores<D> {
        &self.stores
    }

    pub fn stores_mut(&mut self) -> &mut Stores<D> {
        &mut self.stores
    }

    /// The local scope of `decl`, created as a child of the global scope on first use.
    pub fn local_for(&mut self, symbols: &SymbolTable, decl: SymbolId) -> ScopeId {
        if let Some(&scope) = self.locals.get(&decl) {
            return scope;
        }

        let name = symbols.qualified_name(decl);
        let global = self.stores.global();
        let scope = self.stores.create_child(global, &name);

        tracing::trace!(direction = D::NAME, scope = %name, "created local converter scope");

        self.locals.insert(decl, scope);
        scope
    }

    /// The scope that applies to `symbol`: the innermost enclosing declaration that owns a
    /// local scope, stopping at the first package boundary, else the global scope.
    pub fn scope_for(&self, symbols: &SymbolTable, symbol: SymbolId) -> ScopeId {
        symbols
            .enclosing_chain(symbol)
            .take_while(|s| symbols.get(*s).kind != SymbolKind::Package)
            .find_map(|s| self.locals.get(&s).copied())
            .unwrap_or_else(|| self.stores.global())
    }

    /// A resolver bound to the scope chain that applies to `symbol`.
    pub fn resolver_for<'a>(
        &'a mut self,
        symbols: &SymbolTable,
        symbol: SymbolId,
        types: &'a TypeTable,
        factory: &'a dyn ConverterFactory<D>,
    ) -> Resolver<'a, D> {
        let scope = self.scope_for(symbols, symbol);
        Resolver::new(&mut self.stores, scope, types, factory)
    }
}
