//! `querygen.toml` config.
//!
//! ```toml
//! # Keep generating code for declarations that resolved cleanly
//! # even if others reported problems.
//! fail-on-diagnostics = false
//!
//! [types.Animal]
//! shape = "object"
//!
//! [types.Dog]
//! supertype = "Animal"
//! fields = [
//!     { name = "id", type = "i64", nullness = "non-null" },
//!     { name = "nickname", type = "String", optional = true },
//! ]
//!
//! [converters.encode.uuid]
//! type = "Uuid"
//! routine = "crate::conv::uuid_to_bytes"
//! nullness = "non-null"
//!
//! [converters.decode.uuid]
//! type = "Uuid"
//! routine = "crate::conv::uuid_from_bytes"
//! default = true
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use crate::converter::{Binding, Converter, Decode, Direction, Encode, Routine};
use crate::error::{Error, Result};
use crate::optional::OptionalFlag;
use crate::registry::Stores;
use crate::types::{Field, Shape, TypeId, TypeTable};

/// The file name looked for next to the consuming crate's `Cargo.toml`.
pub const FILE_NAME: &str = "querygen.toml";

/// Environment variable overriding the path of the config file.
pub const PATH_VAR: &str = "QUERYGEN_CONFIG";

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    /// Whether any diagnostic fails the build (default `true`).
    pub fail_on_diagnostics: bool,

    /// Extra host types, keyed by canonical name.
    pub types: BTreeMap<String, TypeConfig>,

    /// Named converters registered in the global scope.
    pub converters: ConvertersConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            fail_on_diagnostics: true,
            types: BTreeMap::new(),
            converters: ConvertersConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TypeConfig {
    pub shape: Shape,
    pub supertype: Option<String>,
    /// Element type; required for every shape but `primitive` and `object`.
    pub component: Option<String>,
    /// Record fields, in declaration order.
    pub fields: Vec<FieldConfig>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FieldConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub nullness: OptionalFlag,
    /// The field is an `Option` of `type`.
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct ConvertersConfig {
    pub encode: BTreeMap<String, ConverterConfig>,
    pub decode: BTreeMap<String, ConverterConfig>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConverterConfig {
    /// Host type the routine converts to or from. Unknown names are added as object types.
    #[serde(rename = "type")]
    pub ty: String,
    /// Path of the conversion function.
    pub routine: String,
    #[serde(default)]
    pub nullness: OptionalFlag,
    /// Also register the converter for its type, not just its name.
    #[serde(default)]
    pub default: bool,
}

impl Config {
    /// Reads and parses the config file at `path`.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;

        let config = toml::from_str(&text).map_err(|e| Error::ConfigParse {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;

        tracing::debug!(path = %path.display(), "loaded config");

        Ok(config)
    }

    /// Loads [`FILE_NAME`] from `dir`, or the defaults if there is none.
    pub fn from_dir_or_default(dir: &Path) -> Result<Self> {
        let path = dir.join(FILE_NAME);

        if !path.is_file() {
            tracing::trace!(path = %path.display(), "no config file; using defaults");
            return Ok(Self::default());
        }

        Self::from_path(&path)
    }

    /// Adds the configured types to `types`.
    ///
    /// Every configured type is interned before any relation is set, so entries may refer to each
    /// other in any order. Relations must name a type that is configured or already known. An
    /// already known type may be configured again only with its existing shape.
    pub fn apply_types(&self, types: &mut TypeTable) -> Result<()> {
        let ids = self
            .types
            .iter()
            .map(|(name, config)| {
                if let Some(existing) = types.lookup(name) {
                    let shape = types.shape(existing);
                    if shape != config.shape {
                        return Err(Error::InvalidConfig {
                            name: name.clone(),
                            message: format!(
                                "already known with shape `{shape}`, cannot be configured as `{}`",
                                config.shape
                            ),
                        });
                    }
                }

                Ok((types.intern(name, config.shape), name, config))
            })
            .collect::<Result<Vec<_>>>()?;

        for (id, name, config) in ids {
            match (config.shape.has_component(), &config.component) {
                (true, None) => {
                    return Err(Error::InvalidConfig {
                        name: name.clone(),
                        message: format!("{} types require a `component`", config.shape),
                    })
                }
                (false, Some(_)) => {
                    return Err(Error::InvalidConfig {
                        name: name.clone(),
                        message: format!("{} types cannot have a `component`", config.shape),
                    })
                }
                _ => (),
            }

            if let Some(component) = &config.component {
                let component = lookup(types, component)?;
                types.set_component(id, component)?;
            }

            if let Some(supertype) = &config.supertype {
                let supertype = lookup(types, supertype)?;
                types.set_supertype(id, supertype)?;
            }

            if !config.fields.is_empty() {
                let fields = config
                    .fields
                    .iter()
                    .map(|field| {
                        let mut ty = lookup(types, &field.ty)?;
                        if field.optional {
                            ty = types.intern_composite("Option", Shape::Optional, ty);
                        }

                        Ok(Field {
                            name: field.name.as_str().into(),
                            ty,
                            nullness: field.nullness,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;

                types.set_fields(id, fields);
            }
        }

        Ok(())
    }

    /// Registers the configured converters in the global scopes.
    pub fn apply_converters(
        &self,
        types: &mut TypeTable,
        encoders: &mut Stores<Encode>,
        decoders: &mut Stores<Decode>,
    ) -> Result<()> {
        register(&self.converters.encode, types, encoders)?;
        register(&self.converters.decode, types, decoders)
    }
}

fn lookup(types: &TypeTable, name: &str) -> Result<TypeId> {
    types
        .lookup(name)
        .ok_or_else(|| Error::UnknownType(name.to_string()))
}

fn register<D: Direction>(
    converters: &BTreeMap<String, ConverterConfig>,
    types: &mut TypeTable,
    stores: &mut Stores<D>,
) -> Result<()> {
    let global = stores.global();

    for (name, config) in converters {
        let ty = match types.lookup(&config.ty) {
            Some(ty) => ty,
            None => types.intern(&config.ty, Shape::Object),
        };

        let converter = Converter::bound(Binding::new(
            ty,
            Routine::path(config.routine.as_str()),
            config.nullness,
        ));

        stores.put(global, Some(name), ty, converter.clone(), types)?;

        if config.default {
            stores.put(global, None, ty, converter, types)?;
        }
    }

    Ok(())
}
