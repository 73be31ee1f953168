//! Lowering of `syn` types into the type table.
//!
//! Types are named by their last path segment, so `crate::model::User` and `User` are the same
//! entry. References and the `Box`/`Arc`/`Rc` wrappers are transparent; `str` is `String`.

use querygen_core::types::{Shape, TypeId, TypeTable};
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{
    AngleBracketedGenericArguments, GenericArgument, PathArguments, Type, TypeParamBound,
    TypePath,
};

const PRIMITIVES: &[&str] = &[
    "bool", "char", "i8", "i16", "i32", "i64", "i128", "isize", "u8", "u16", "u32", "u64", "u128",
    "usize", "f32", "f64",
];

const TRANSPARENT: &[&str] = &["Box", "Arc", "Rc"];

const COLLECTIONS: &[&str] = &["Vec", "VecDeque", "HashSet", "BTreeSet", "LinkedList"];

/// Returns the id of `ty`, interning it and everything it is built from.
pub fn lower_type(types: &mut TypeTable, ty: &Type) -> syn::Result<TypeId> {
    match ty {
        Type::Paren(paren) => lower_type(types, &paren.elem),
        Type::Group(group) => lower_type(types, &group.elem),
        Type::Reference(reference) => lower_type(types, &reference.elem),
        Type::Slice(slice) => {
            let elem = lower_type(types, &slice.elem)?;
            Ok(types.intern_composite("", Shape::Array, elem))
        }
        Type::Array(array) => {
            let elem = lower_type(types, &array.elem)?;
            Ok(types.intern_composite("", Shape::Array, elem))
        }
        Type::Path(path) => lower_path(types, path),
        Type::ImplTrait(impl_trait) => lower_bounds(types, ty, &impl_trait.bounds),
        _ => Err(syn::Error::new_spanned(ty, "unsupported type")),
    }
}

/// Whether `ty` is the unit type `()`.
pub fn is_unit(ty: &Type) -> bool {
    match ty {
        Type::Tuple(tuple) => tuple.elems.is_empty(),
        Type::Paren(paren) => is_unit(&paren.elem),
        Type::Group(group) => is_unit(&group.elem),
        _ => false,
    }
}

fn lower_path(types: &mut TypeTable, ty: &TypePath) -> syn::Result<TypeId> {
    if ty.qself.is_some() {
        return Err(syn::Error::new_spanned(ty, "qualified paths are not supported"));
    }

    let segment = ty
        .path
        .segments
        .last()
        .ok_or_else(|| syn::Error::new_spanned(ty, "empty type path"))?;
    let ident = segment.ident.to_string();

    let args = match &segment.arguments {
        PathArguments::None => return Ok(lower_name(types, &ident)),
        PathArguments::AngleBracketed(args) => type_args(args)?,
        PathArguments::Parenthesized(_) => {
            return Err(syn::Error::new_spanned(ty, "function types are not supported"))
        }
    };

    match (ident.as_str(), args.as_slice()) {
        ("Option", [inner]) => {
            let inner = lower_type(types, inner)?;
            Ok(types.intern_composite("Option", Shape::Optional, inner))
        }
        (wrapper, [inner]) if TRANSPARENT.contains(&wrapper) => lower_type(types, inner),
        ("Vec", [inner]) if is_u8(inner) => {
            let inner = lower_type(types, inner)?;
            Ok(types.intern_composite("Vec", Shape::Array, inner))
        }
        (collection, [inner]) if COLLECTIONS.contains(&collection) => {
            let inner = lower_type(types, inner)?;
            Ok(types.intern_composite(collection, Shape::Collection, inner))
        }
        (_, []) => Ok(lower_name(types, &ident)),
        (_, args) => {
            // user generics are opaque objects named after their arguments
            let names = args
                .iter()
                .map(|arg| lower_type(types, arg).map(|id| types.name(id).to_string()))
                .collect::<syn::Result<Vec<_>>>()?;

            Ok(types.intern(&format!("{ident}<{}>", names.join(", ")), Shape::Object))
        }
    }
}

fn lower_name(types: &mut TypeTable, ident: &str) -> TypeId {
    match ident {
        "str" | "String" => types.intern("String", Shape::Object),
        _ if types.lookup(ident).is_some() => types.intern(ident, Shape::Object),
        _ if PRIMITIVES.contains(&ident) => types.intern(ident, Shape::Primitive),
        _ => types.intern(ident, Shape::Object),
    }
}

/// `impl Iterator<Item = T>` and `impl Stream<Item = T>`.
fn lower_bounds(
    types: &mut TypeTable,
    ty: &Type,
    bounds: &Punctuated<TypeParamBound, syn::token::Plus>,
) -> syn::Result<TypeId> {
    for bound in bounds {
        let TypeParamBound::Trait(bound) = bound else {
            continue;
        };
        let Some(segment) = bound.path.segments.last() else {
            continue;
        };

        let (ctor, shape) = match segment.ident.to_string().as_str() {
            "Iterator" | "IntoIterator" => ("Iterator", Shape::Iterable),
            "Stream" => ("Stream", Shape::Stream),
            _ => continue,
        };

        let PathArguments::AngleBracketed(args) = &segment.arguments else {
            continue;
        };

        let item = args.args.iter().find_map(|arg| match arg {
            GenericArgument::AssocType(assoc) if assoc.ident == "Item" => Some(&assoc.ty),
            _ => None,
        });

        if let Some(item) = item {
            let item = lower_type(types, item)?;
            return Ok(types.intern_composite(ctor, shape, item));
        }
    }

    Err(syn::Error::new(
        ty.span(),
        "expected `impl Iterator<Item = T>` or `impl Stream<Item = T>`",
    ))
}

fn type_args(args: &AngleBracketedGenericArguments) -> syn::Result<Vec<&Type>> {
    args.args
        .iter()
        .filter_map(|arg| match arg {
            GenericArgument::Type(ty) => Some(Ok(ty)),
            GenericArgument::Lifetime(_) => None,
            other => Some(Err(syn::Error::new_spanned(
                other,
                "only type and lifetime arguments are supported",
            ))),
        })
        .collect()
}

fn is_u8(ty: &Type) -> bool {
    matches!(ty, Type::Path(path) if path.qself.is_none() && path.path.is_ident("u8"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    fn lower(types: &mut TypeTable, ty: Type) -> String {
        let id = lower_type(types, &ty).unwrap();
        format!("{} ({})", types.name(id), types.shape(id))
    }

    #[test]
    fn lowers_common_forms() {
        let mut types = TypeTable::new();

        assert_eq!(lower(&mut types, parse_quote!(i64)), "i64 (primitive)");
        assert_eq!(lower(&mut types, parse_quote!(&'a str)), "String (object)");
        assert_eq!(lower(&mut types, parse_quote!(crate::model::User)), "User (object)");
        assert_eq!(lower(&mut types, parse_quote!(Option<Box<User>>)), "Option<User> (optional)");
        assert_eq!(lower(&mut types, parse_quote!(Vec<u8>)), "Vec<u8> (array)");
        assert_eq!(lower(&mut types, parse_quote!(&[u8])), "[u8] (array)");
        assert_eq!(lower(&mut types, parse_quote!(Vec<i32>)), "Vec<i32> (collection)");
        assert_eq!(
            lower(&mut types, parse_quote!(impl Iterator<Item = User>)),
            "Iterator<User> (iterable)"
        );
        assert_eq!(
            lower(&mut types, parse_quote!(impl futures::Stream<Item = i32> + Send)),
            "Stream<i32> (stream)"
        );
        assert_eq!(
            lower(&mut types, parse_quote!(HashMap<String, i32>)),
            "HashMap<String, i32> (object)"
        );
    }

    #[test]
    fn keeps_existing_entries() {
        let mut types = TypeTable::new();
        let animal = types.intern("Animal", Shape::Primitive);

        assert_eq!(lower_type(&mut types, &parse_quote!(Animal)).unwrap(), animal);
        assert_eq!(types.shape(animal), Shape::Primitive);
    }

    #[test]
    fn rejects_unsupported_forms() {
        let mut types = TypeTable::new();

        for ty in [
            parse_quote!((i32, i64)),
            parse_quote!(fn(i32) -> i64),
            parse_quote!(<T as Trait>::Assoc),
            parse_quote!(impl Send),
        ] {
            assert!(lower_type(&mut types, &ty).is_err());
        }

        assert!(is_unit(&parse_quote!(())));
        assert!(!is_unit(&parse_quote!(i32)));
    }
}
