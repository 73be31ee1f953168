//! Synthesis of converters for record types.

use std::cell::Cell;

use heck::ToSnakeCase;

use crate::converter::{Binding, Converter, Direction, FieldRoutine, Routine};
use crate::diagnostic::{DiagnosticKind, Diagnostics};
use crate::error::Result;
use crate::optional::OptionalFlag;
use crate::registry::SearchKey;
use crate::resolver::{ConverterFactory, Resolver};
use crate::types::{Field, Shape};

/// Hands out unique temporary variable names for one generation pass.
#[derive(Debug, Default)]
pub struct NameGen {
    next: Cell<u32>,
}

impl NameGen {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh name derived from `hint`, e.g. `userId` → `__user_id_3`.
    pub fn next(&self, hint: &str) -> String {
        let n = self.next.get() + 1;
        self.next.set(n);

        let stem = hint.to_snake_case();
        if stem.is_empty() {
            format!("__tmp_{n}")
        } else {
            format!("__{stem}_{n}")
        }
    }
}

/// Builds converters for record types field by field.
///
/// A record is an [`Shape::Object`] type with at least one field. Each field is resolved through
/// the requesting resolver, so fields of record type are themselves synthesized, and a record
/// that contains itself is reported as a cycle. `Option<T>` fields resolve `T` under the
/// `OPTIONAL_TYPE` contract.
#[derive(Debug)]
pub struct RecordFactory<'n> {
    names: &'n NameGen,
}

impl<'n> RecordFactory<'n> {
    pub fn new(names: &'n NameGen) -> Self {
        RecordFactory { names }
    }

    fn field<D: Direction>(
        &self,
        resolver: &mut Resolver<'_, D>,
        record: &str,
        field: &Field,
    ) -> Result<Converter<D>> {
        let types = resolver.types();

        let (ty, declared) = match types.shape(field.ty) {
            Shape::Optional => match types.component(field.ty) {
                Some(component) => (component, OptionalFlag::OptionalType),
                None => {
                    return Err(err_invariant!(
                        "optional field `{record}.{}` has no component type",
                        field.name
                    ))
                }
            },
            _ => (field.ty, field.nullness),
        };

        let resolved = resolver.resolve_with_flag(&SearchKey::of_type(ty), declared)?;

        Ok(match resolved.converter() {
            Some(converter) => converter.clone(),
            None => Converter::diagnostic(
                DiagnosticKind::NotFound,
                format!(
                    "field `{record}.{}` of {} type `{}` cannot be {}d as a single column",
                    field.name,
                    resolved.kind(),
                    types.name(ty),
                    D::NAME
                ),
            ),
        })
    }
}

impl<D: Direction> ConverterFactory<D> for RecordFactory<'_> {
    fn synthesize(&self, resolver: &mut Resolver<'_, D>, key: &SearchKey) -> Result<Converter<D>> {
        let types = resolver.types();
        let def = types.get(key.ty());

        if def.shape() != Shape::Object || def.fields().is_empty() {
            return Ok(Converter::diagnostic(
                DiagnosticKind::NotFound,
                format!(
                    "no {} converter registered for type `{}`",
                    D::NAME,
                    def.name()
                ),
            ));
        }

        let mut diagnostics = Diagnostics::new();
        let mut routines = Vec::with_capacity(def.fields().len());

        for field in def.fields() {
            let converter = self.field(resolver, def.name(), field)?;

            match converter.binding() {
                Some(binding) => routines.push(FieldRoutine {
                    field: field.name.clone(),
                    temp: self.names.next(&field.name).into(),
                    binding: binding.clone(),
                }),
                None => diagnostics.merge(&converter.diagnostics_or_empty()),
            }
        }

        if !diagnostics.is_empty() {
            return Converter::failed(diagnostics);
        }

        Ok(Converter::bound(Binding::new(
            key.ty(),
            Routine::Composite(routines.into()),
            D::PLAIN_NULLNESS,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins;
    use crate::converter::{Decode, Encode};
    use crate::registry::Stores;
    use crate::types::{TypeId, TypeTable};

    fn field(name: &str, ty: TypeId) -> Field {
        Field {
            name: name.into(),
            ty,
            nullness: OptionalFlag::Unspecified,
        }
    }

    fn setup() -> Result<(TypeTable, Stores<Encode>, Stores<Decode>)> {
        let mut types = TypeTable::new();
        let mut encoders = Stores::new();
        let mut decoders = Stores::new();
        builtins::register(&mut types, &mut encoders, &mut decoders)?;
        Ok((types, encoders, decoders))
    }

    #[test]
    fn name_gen_is_unique_and_snake_cased() {
        let names = NameGen::new();
        assert_eq!(names.next("userId"), "__user_id_1");
        assert_eq!(names.next("userId"), "__user_id_2");
        assert_eq!(names.next(""), "__tmp_3");
    }

    #[test]
    fn synthesizes_records_in_both_directions() -> Result<()> {
        let (mut types, mut encoders, mut decoders) = setup()?;

        let i64_ = types.lookup("i64").expect("builtin");
        let string = types.lookup("String").expect("builtin");
        let nick = types.intern_composite("Option", Shape::Optional, string);
        let user = types.intern("User", Shape::Object);
        types.set_fields(
            user,
            vec![field("id", i64_), field("name", string), field("nickName", nick)],
        );

        let names = NameGen::new();
        let factory = RecordFactory::new(&names);
        let key = SearchKey::of_type(user);

        let global = encoders.global();
        let encoder = Resolver::new(&mut encoders, global, &types, &factory).search(&key)?;
        let global = decoders.global();
        let decoder = Resolver::new(&mut decoders, global, &types, &factory).search(&key)?;

        let Some(Routine::Composite(fields)) = encoder.binding().map(|b| &b.routine) else {
            panic!("expected a composite encoder, got {encoder:?}");
        };
        assert_eq!(
            fields.iter().map(|f| &*f.temp).collect::<Vec<_>>(),
            ["__id_1", "__name_2", "__nick_name_3"]
        );
        assert_eq!(encoder.binding().map(|b| b.nullness), Some(OptionalFlag::Unspecified));

        assert!(decoder.is_bound());
        assert_eq!(decoder.binding().map(|b| b.nullness), Some(OptionalFlag::NonNull));

        // cached in the global scope alongside the built-ins
        assert!(encoders
            .search(encoders.global(), &key, &types)
            .is_some_and(|c| c.is_bound()));

        Ok(())
    }

    #[test]
    fn subtype_records_do_not_reuse_a_cached_supertype() -> Result<()> {
        fn dog_encoder(request_animal_first: bool) -> Result<Converter<Encode>> {
            let (mut types, mut encoders, _) = setup()?;

            let i64_ = types.lookup("i64").expect("builtin");
            let string = types.lookup("String").expect("builtin");
            let animal = types.intern("Animal", Shape::Object);
            let dog = types.intern("Dog", Shape::Object);
            types.set_supertype(dog, animal)?;
            types.set_fields(animal, vec![field("id", i64_)]);
            types.set_fields(dog, vec![field("id", i64_), field("bark", string)]);

            let names = NameGen::new();
            let factory = RecordFactory::new(&names);
            let global = encoders.global();
            let mut resolver = Resolver::new(&mut encoders, global, &types, &factory);

            if request_animal_first {
                assert!(resolver.search(&SearchKey::of_type(animal))?.is_bound());
            }

            let encoder = resolver.search(&SearchKey::of_type(dog))?;
            assert_eq!(encoder.target(), Some(dog));
            Ok(encoder)
        }

        let alone = dog_encoder(false)?;
        let after_animal = dog_encoder(true)?;

        fn field_names(converter: &Converter<Encode>) -> Vec<String> {
            match converter.binding().map(|b| &b.routine) {
                Some(Routine::Composite(fields)) => {
                    fields.iter().map(|f| f.field.to_string()).collect()
                }
                other => panic!("expected a composite encoder, got {other:?}"),
            }
        }

        assert_eq!(field_names(&alone), ["id", "bark"]);
        assert_eq!(field_names(&after_animal), field_names(&alone));

        Ok(())
    }

    #[test]
    fn unconvertible_fields_are_merged() -> Result<()> {
        let (mut types, mut encoders, _) = setup()?;

        let uuid = types.intern("Uuid", Shape::Object);
        let i64_ = types.lookup("i64").expect("builtin");
        let tags = types.intern_composite("Vec", Shape::Collection, i64_);
        let order = types.intern("Order", Shape::Object);
        types.set_fields(order, vec![field("id", uuid), field("tags", tags)]);

        let names = NameGen::new();
        let factory = RecordFactory::new(&names);
        let global = encoders.global();
        let mut resolver = Resolver::new(&mut encoders, global, &types, &factory);

        let converter = resolver.search(&SearchKey::of_type(order))?;
        let diagnostics = converter.diagnostics().expect("Order has no encoder");

        assert_eq!(diagnostics.count(DiagnosticKind::NotFound), 2);
        assert_eq!(
            diagnostics.iter().map(|d| d.message.as_str()).collect::<Vec<_>>(),
            [
                "no encode converter registered for type `Uuid`",
                "field `Order.tags` of collection type `Vec<i64>` cannot be encoded as a single column",
            ]
        );

        Ok(())
    }

    #[test]
    fn mutual_recursion_is_a_cycle_and_retries_cleanly() -> Result<()> {
        let (mut types, _, mut decoders) = setup()?;

        let i32_ = types.lookup("i32").expect("builtin");
        let parent = types.intern("Parent", Shape::Object);
        let child = types.intern("Child", Shape::Object);
        let opt_parent = types.intern_composite("Option", Shape::Optional, parent);
        let leaf = types.intern("Leaf", Shape::Object);

        types.set_fields(parent, vec![field("child", child)]);
        types.set_fields(child, vec![field("id", i32_), field("parent", opt_parent)]);
        types.set_fields(leaf, vec![field("id", i32_)]);

        let names = NameGen::new();
        let factory = RecordFactory::new(&names);
        let global = decoders.global();
        let mut resolver = Resolver::new(&mut decoders, global, &types, &factory);

        let converter = resolver.search(&SearchKey::of_type(parent))?;
        let diagnostics = converter.diagnostics().expect("Parent is cyclic");
        assert_eq!(diagnostics.count(DiagnosticKind::Cycle), 1);
        assert!(diagnostics
            .iter()
            .any(|d| d.message.ends_with("Parent -> Child -> Parent")));
        assert_eq!(resolver.in_progress().count(), 0);

        // unrelated records are unaffected by the failed attempt
        assert!(resolver.search(&SearchKey::of_type(leaf))?.is_bound());

        // and `Child` was not cached as a failure while `Parent` was in progress
        let child_again = resolver.search(&SearchKey::of_type(child))?;
        assert!(child_again
            .diagnostics()
            .is_some_and(|d| d.iter().any(|d| d.message.ends_with("Child -> Parent -> Child"))));

        Ok(())
    }
}
