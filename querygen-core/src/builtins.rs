//! The converters every pass starts with.

use crate::converter::{Binding, Converter, Decode, Direction, Encode, Routine};
use crate::error::Result;
use crate::registry::Stores;
use crate::types::{Shape, TypeTable};

/// Path prefix of the runtime helpers that bind a parameter.
pub const BIND_PREFIX: &str = "::querygen_rt::bind";

/// Path prefix of the runtime helpers that read a column.
pub const GET_PREFIX: &str = "::querygen_rt::get";

struct Builtin {
    ty: &'static str,
    shape: Shape,
    /// The routine name under the runtime prefixes.
    routine: &'static str,
    component: Option<&'static str>,
}

const fn primitive(ty: &'static str) -> Builtin {
    Builtin {
        ty,
        shape: Shape::Primitive,
        routine: ty,
        component: None,
    }
}

const BUILTINS: &[Builtin] = &[
    primitive("bool"),
    primitive("char"),
    primitive("i8"),
    primitive("i16"),
    primitive("i32"),
    primitive("i64"),
    primitive("i128"),
    primitive("isize"),
    primitive("u8"),
    primitive("u16"),
    primitive("u32"),
    primitive("u64"),
    primitive("u128"),
    primitive("usize"),
    primitive("f32"),
    primitive("f64"),
    Builtin {
        ty: "String",
        shape: Shape::Object,
        routine: "string",
        component: None,
    },
    Builtin {
        ty: "Vec<u8>",
        shape: Shape::Array,
        routine: "bytes",
        component: Some("u8"),
    },
    // `&[u8]` and `[u8; N]`
    Builtin {
        ty: "[u8]",
        shape: Shape::Array,
        routine: "bytes",
        component: Some("u8"),
    },
];

/// Interns the built-in types and registers their converters in both global scopes.
///
/// Encoders accept any declared nullness; decoders produce non-null values, since a plain Rust
/// value can never hold `NULL`.
///
/// Fails if a built-in slot was already occupied, e.g. when called twice on the same stores.
pub fn register(
    types: &mut TypeTable,
    encoders: &mut Stores<Encode>,
    decoders: &mut Stores<Decode>,
) -> Result<()> {
    for builtin in BUILTINS {
        let ty = match builtin.component {
            Some(component) => {
                let component = types.intern(component, Shape::Primitive);
                let ty = types.intern(builtin.ty, builtin.shape);
                types.set_component(ty, component)?;
                ty
            }
            None => types.intern(builtin.ty, builtin.shape),
        };

        let encoder = Converter::bound(Binding::new(
            ty,
            Routine::path(format!("{BIND_PREFIX}::{}", builtin.routine)),
            Encode::PLAIN_NULLNESS,
        ));
        let decoder = Converter::bound(Binding::new(
            ty,
            Routine::path(format!("{GET_PREFIX}::{}", builtin.routine)),
            Decode::PLAIN_NULLNESS,
        ));

        let global = encoders.global();
        encoders.put_unique(global, None, ty, encoder, types)?;

        let global = decoders.global();
        decoders.put_unique(global, None, ty, decoder, types)?;
    }

    tracing::debug!(count = BUILTINS.len(), "registered built-in converters");

    Ok(())
}
