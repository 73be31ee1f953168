use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::diagnostic::{DiagnosticKind, Diagnostics};
use crate::error::Result;
use crate::optional::{self, OptionalFlag};
use crate::types::{TypeId, TypeTable};

/// The direction a [`Converter`] converts in.
///
/// Implemented by the uninhabited markers [`Encode`] and [`Decode`].
pub trait Direction: 'static + Copy + Debug + Eq + Hash {
    /// `"encode"` or `"decode"`, for messages.
    const NAME: &'static str;

    /// Whether a converter registered for a supertype may serve a request for a subtype.
    const SUPERTYPE_FALLBACK: bool;

    /// The contract of a routine over plain, non-`Option` Rust values.
    const PLAIN_NULLNESS: OptionalFlag;

    /// Whether a routine for `target` may be used for a value of type `requested`.
    fn is_compatible(types: &TypeTable, target: TypeId, requested: TypeId) -> bool;

    /// Whether the `declared` contract of a slot fits the `routine` contract of a converter.
    fn nullness_ok(declared: OptionalFlag, routine: OptionalFlag) -> bool;

    /// The diagnostic reported when [`Direction::nullness_ok`] fails.
    fn nullness_message(declared: OptionalFlag, routine: OptionalFlag) -> String;
}

/// Host value → wire/column value, i.e. binding a parameter.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Encode {}

/// Wire/column value → host value, i.e. reading a result.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Decode {}

impl Direction for Encode {
    const NAME: &'static str = "encode";
    const SUPERTYPE_FALLBACK: bool = true;
    const PLAIN_NULLNESS: OptionalFlag = OptionalFlag::Unspecified;

    // A `Dog` may be handed to a routine that accepts any `Animal`.
    fn is_compatible(types: &TypeTable, target: TypeId, requested: TypeId) -> bool {
        types.is_subtype_of(requested, target)
    }

    fn nullness_ok(declared: OptionalFlag, routine: OptionalFlag) -> bool {
        declared.is_assignable_to(routine)
    }

    fn nullness_message(declared: OptionalFlag, routine: OptionalFlag) -> String {
        format!(
            "parameter nullness not supported: given {declared}, acceptable {}",
            optional::display_set(&OptionalFlag::assignable_sources(routine))
        )
    }
}

impl Direction for Decode {
    const NAME: &'static str = "decode";
    const SUPERTYPE_FALLBACK: bool = false;
    const PLAIN_NULLNESS: OptionalFlag = OptionalFlag::NonNull;

    // A routine that builds a `Dog` may fill a slot declared as `Animal`, never the reverse.
    fn is_compatible(types: &TypeTable, target: TypeId, requested: TypeId) -> bool {
        types.is_subtype_of(target, requested)
    }

    fn nullness_ok(declared: OptionalFlag, routine: OptionalFlag) -> bool {
        routine.is_assignable_to(declared)
    }

    fn nullness_message(declared: OptionalFlag, routine: OptionalFlag) -> String {
        format!(
            "return nullness not supported: given {declared}, acceptable {}",
            optional::display_set(&OptionalFlag::assignable_targets(routine))
        )
    }
}

/// The code a converter runs, opaque to the resolver beyond equality.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Routine {
    /// A path to a conversion function, e.g. `crate::conv::uuid_to_bytes`.
    Path(Arc<str>),
    /// A field-by-field conversion synthesized for a record type.
    Composite(Arc<[FieldRoutine]>),
}

impl Routine {
    pub fn path(path: impl Into<Arc<str>>) -> Self {
        Routine::Path(path.into())
    }
}

/// One field of a [`Routine::Composite`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldRoutine {
    pub field: Box<str>,
    /// Name of the temporary the emitter binds this field to.
    pub temp: Box<str>,
    pub binding: Binding,
}

/// A successfully bound conversion.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Binding {
    /// The host type the routine converts to or from.
    pub target: TypeId,
    pub routine: Routine,
    /// The nullness the routine accepts (encode) or produces (decode).
    pub nullness: OptionalFlag,
}

impl Binding {
    pub fn new(target: TypeId, routine: Routine, nullness: OptionalFlag) -> Self {
        Binding {
            target,
            routine,
            nullness,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum State {
    Bound(Binding),
    Failed(Diagnostics),
}

/// Either a [`Binding`] or the [`Diagnostics`] explaining why none could be made.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Converter<D: Direction> {
    state: State,
    direction: PhantomData<D>,
}

impl<D: Direction> Converter<D> {
    pub fn bound(binding: Binding) -> Self {
        Converter {
            state: State::Bound(binding),
            direction: PhantomData,
        }
    }

    /// A converter carrying `diagnostics`.
    ///
    /// Fails if `diagnostics` is empty, since a converter must carry either a binding or at
    /// least one diagnostic.
    pub fn failed(diagnostics: Diagnostics) -> Result<Self> {
        if diagnostics.is_empty() {
            return Err(err_invariant!(
                "{} converter constructed with neither a binding nor a diagnostic",
                D::NAME
            ));
        }

        Ok(Converter {
            state: State::Failed(diagnostics),
            direction: PhantomData,
        })
    }

    /// A converter carrying a single diagnostic.
    pub fn diagnostic(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Converter {
            state: State::Failed(Diagnostics::single(kind, message)),
            direction: PhantomData,
        }
    }

    pub fn binding(&self) -> Option<&Binding> {
        match &self.state {
            State::Bound(binding) => Some(binding),
            State::Failed(_) => None,
        }
    }

    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        match &self.state {
            State::Bound(_) => None,
            State::Failed(diagnostics) => Some(diagnostics),
        }
    }

    pub fn is_bound(&self) -> bool {
        matches!(self.state, State::Bound(_))
    }

    pub fn target(&self) -> Option<TypeId> {
        self.binding().map(|b| b.target)
    }

    /// Whether `self` and `other` are diagnostic-free and denote the same conversion.
    pub fn same_definition(&self, other: &Self) -> bool {
        match (&self.state, &other.state) {
            (State::Bound(a), State::Bound(b)) => a == b,
            _ => false,
        }
    }

    /// The diagnostics of this converter, or none if it is bound.
    pub(crate) fn diagnostics_or_empty(&self) -> Diagnostics {
        self.diagnostics().cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Shape;

    #[test]
    fn failed_requires_a_diagnostic() {
        assert!(Converter::<Encode>::failed(Diagnostics::new()).is_err());

        let conv =
            Converter::<Encode>::failed(Diagnostics::single(DiagnosticKind::NotFound, "nope"))
                .unwrap();
        assert!(!conv.is_bound());
        assert!(conv.binding().is_none());
        assert_eq!(conv.diagnostics().map(Diagnostics::len), Some(1));
    }

    #[test]
    fn same_definition_compares_bindings() {
        let mut types = TypeTable::new();
        let i32_ = types.intern("i32", Shape::Primitive);

        let a = Converter::<Decode>::bound(Binding::new(
            i32_,
            Routine::path("rt::get_i32"),
            OptionalFlag::Unspecified,
        ));
        let b = a.clone();
        let c = Converter::<Decode>::bound(Binding::new(
            i32_,
            Routine::path("rt::get_i32_checked"),
            OptionalFlag::Unspecified,
        ));
        let d = Converter::<Decode>::diagnostic(DiagnosticKind::NotFound, "x");

        assert!(a.same_definition(&b));
        assert!(!a.same_definition(&c));
        assert!(!d.same_definition(&d.clone()));
    }

    #[test]
    fn compatibility_is_directional() {
        let mut types = TypeTable::new();
        let animal = types.intern("Animal", Shape::Object);
        let dog = types.intern("Dog", Shape::Object);
        types.set_supertype(dog, animal).unwrap();

        assert!(Encode::is_compatible(&types, animal, dog));
        assert!(!Encode::is_compatible(&types, dog, animal));

        assert!(Decode::is_compatible(&types, dog, animal));
        assert!(!Decode::is_compatible(&types, animal, dog));
    }

    #[test]
    fn nullness_messages() {
        use OptionalFlag::*;

        assert!(!Encode::nullness_ok(Nullable, NonNull));
        assert!(Encode::nullness_ok(NonNull, Nullable));
        assert_eq!(
            Encode::nullness_message(Nullable, NonNull),
            "parameter nullness not supported: given NULLABLE, acceptable [NON_NULL]"
        );

        assert!(!Decode::nullness_ok(NonNull, Nullable));
        assert!(Decode::nullness_ok(Nullable, NonNull));
        assert_eq!(
            Decode::nullness_message(NonNull, Nullable),
            "return nullness not supported: given NON_NULL, acceptable [UNSPECIFIED, NULLABLE, OPTIONAL_TYPE]"
        );
    }
}
