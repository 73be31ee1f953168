//! The table of host types known to one generation pass.
//!
//! Types are interned by canonical name and addressed by [`TypeId`]. Each entry records the
//! [`Shape`] the resolver dispatches on, an optional supertype (walked by the host→wire registry
//! fallback), an optional component type (handed back for structural decomposition) and, for
//! record types, the ordered list of fields a converter may be synthesized from.

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};

use crate::error::Result;
use crate::optional::OptionalFlag;

/// A handle to an entry in a [`TypeTable`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(usize);

/// The structural classification of a type.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[derive(serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Shape {
    Primitive,
    #[default]
    Object,
    /// Convertible as a whole if a converter exists, otherwise decomposed by element.
    Array,
    Collection,
    Optional,
    Stream,
    Iterable,
}

impl Shape {
    /// Shapes which are never converted directly, only decomposed into their component type.
    pub fn is_structural(self) -> bool {
        matches!(
            self,
            Shape::Collection | Shape::Optional | Shape::Stream | Shape::Iterable
        )
    }

    /// Shapes which must carry a component type.
    pub fn has_component(self) -> bool {
        self == Shape::Array || self.is_structural()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Shape::Primitive => "primitive",
            Shape::Object => "object",
            Shape::Array => "array",
            Shape::Collection => "collection",
            Shape::Optional => "optional",
            Shape::Stream => "stream",
            Shape::Iterable => "iterable",
        }
    }
}

impl Display for Shape {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A named field of a record type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    pub name: Box<str>,
    pub ty: TypeId,
    pub nullness: OptionalFlag,
}

#[derive(Clone, Debug)]
pub struct TypeDef {
    name: Box<str>,
    shape: Shape,
    supertype: Option<TypeId>,
    component: Option<TypeId>,
    fields: Vec<Field>,
}

impl TypeDef {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn supertype(&self) -> Option<TypeId> {
        self.supertype
    }

    pub fn component(&self) -> Option<TypeId> {
        self.component
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }
}

#[derive(Clone, Debug, Default)]
pub struct TypeTable {
    defs: Vec<TypeDef>,
    by_name: HashMap<Box<str>, TypeId>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a type with no component. Returns the existing id if `name` is already known.
    pub fn intern(&mut self, name: &str, shape: Shape) -> TypeId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }

        let id = TypeId(self.defs.len());
        self.defs.push(TypeDef {
            name: name.into(),
            shape,
            supertype: None,
            component: None,
            fields: Vec::new(),
        });
        self.by_name.insert(name.into(), id);
        id
    }

    /// Interns a composite type named `ctor<component>` (or `[component]` for an unnamed array).
    pub fn intern_composite(&mut self, ctor: &str, shape: Shape, component: TypeId) -> TypeId {
        let component_name = self.name(component);
        let name = if ctor.is_empty() {
            format!("[{component_name}]")
        } else {
            format!("{ctor}<{component_name}>")
        };

        let id = self.intern(&name, shape);
        self.defs[id.0].component = Some(component);
        id
    }

    pub fn lookup(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: TypeId) -> &TypeDef {
        &self.defs[id.0]
    }

    pub fn name(&self, id: TypeId) -> &str {
        &self.defs[id.0].name
    }

    pub fn shape(&self, id: TypeId) -> Shape {
        self.defs[id.0].shape
    }

    pub fn component(&self, id: TypeId) -> Option<TypeId> {
        self.defs[id.0].component
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Declares `supertype` as the direct supertype of `id`.
    ///
    /// Fails if this would make the supertype chain cyclic.
    pub fn set_supertype(&mut self, id: TypeId, supertype: TypeId) -> Result<()> {
        if self.supertypes(supertype).any(|ancestor| ancestor == id) {
            return Err(err_invariant!(
                "`{}` cannot extend `{}`: cyclic supertype chain",
                self.name(id),
                self.name(supertype)
            ));
        }

        self.defs[id.0].supertype = Some(supertype);
        Ok(())
    }

    /// Declares `component` as the element type of `id`.
    ///
    /// Fails if `id` would end up containing itself.
    pub fn set_component(&mut self, id: TypeId, component: TypeId) -> Result<()> {
        let mut elements = std::iter::successors(Some(component), |c| self.component(*c));

        if elements.any(|element| element == id) {
            return Err(err_invariant!(
                "`{}` cannot contain `{}`: cyclic component chain",
                self.name(id),
                self.name(component)
            ));
        }

        self.defs[id.0].component = Some(component);
        Ok(())
    }

    pub fn set_fields(&mut self, id: TypeId, fields: Vec<Field>) {
        self.defs[id.0].fields = fields;
    }

    /// `id` followed by each of its supertypes, nearest first.
    pub fn supertypes(&self, id: TypeId) -> Supertypes<'_> {
        Supertypes {
            table: self,
            next: Some(id),
        }
    }

    pub fn is_subtype_of(&self, sub: TypeId, sup: TypeId) -> bool {
        self.supertypes(sub).any(|ancestor| ancestor == sup)
    }
}

pub struct Supertypes<'a> {
    table: &'a TypeTable,
    next: Option<TypeId>,
}

impl Iterator for Supertypes<'_> {
    type Item = TypeId;

    fn next(&mut self) -> Option<TypeId> {
        let current = self.next?;
        self.next = self.table.get(current).supertype;
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let mut types = TypeTable::new();

        let a = types.intern("i32", Shape::Primitive);
        let b = types.intern("i32", Shape::Primitive);
        assert_eq!(a, b);
        assert_eq!(types.len(), 1);

        let vec = types.intern_composite("Vec", Shape::Collection, a);
        assert_eq!(types.name(vec), "Vec<i32>");
        assert_eq!(types.component(vec), Some(a));
        assert_eq!(types.intern_composite("Vec", Shape::Collection, a), vec);

        let slice = types.intern_composite("", Shape::Array, a);
        assert_eq!(types.name(slice), "[i32]");
    }

    #[test]
    fn supertype_chain() -> Result<()> {
        let mut types = TypeTable::new();

        let animal = types.intern("Animal", Shape::Object);
        let dog = types.intern("Dog", Shape::Object);
        let puppy = types.intern("Puppy", Shape::Object);

        types.set_supertype(dog, animal)?;
        types.set_supertype(puppy, dog)?;

        assert_eq!(types.supertypes(puppy).collect::<Vec<_>>(), [puppy, dog, animal]);
        assert!(types.is_subtype_of(puppy, animal));
        assert!(types.is_subtype_of(dog, dog));
        assert!(!types.is_subtype_of(animal, dog));

        assert!(types.set_supertype(animal, puppy).is_err());

        Ok(())
    }

    #[test]
    fn component_chain_is_acyclic() -> Result<()> {
        let mut types = TypeTable::new();

        let list = types.intern("List", Shape::Collection);
        let page = types.intern("Page", Shape::Collection);

        types.set_component(list, page)?;
        assert!(types.set_component(page, list).is_err());
        assert!(types.set_component(list, list).is_err());
        assert_eq!(types.component(page), None);

        Ok(())
    }
}
