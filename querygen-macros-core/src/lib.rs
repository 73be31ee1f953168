//! Support crate for querygen's code generation.
//!
//! ### Note: Semver Exempt API
//! The API of this crate is not meant for general use and does *not* follow Semantic Versioning.
//! The only crate that follows Semantic Versioning in the project is the `querygen` crate itself.

use std::path::{Path, PathBuf};

use proc_macro2::TokenStream;
use querygen_core::config::{self, Config};

use crate::generate::{DeclSpec, Generated, Generator, RecordSpec};

pub type Error = Box<dyn std::error::Error>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub mod generate;
pub mod lower;
pub mod report;

pub fn env(var: &str) -> Result<String> {
    env_opt(var)?
        .ok_or_else(|| format!("env var {var:?} must be set to generate data-access code").into())
}

pub fn env_opt(var: &str) -> Result<Option<String>> {
    use std::env::VarError;

    match std::env::var(var) {
        Ok(val) => Ok(Some(val)),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => Err(format!("env var {var:?} is not valid UTF-8").into()),
    }
}

pub fn manifest_dir() -> Result<PathBuf> {
    Ok(env("CARGO_MANIFEST_DIR")?.into())
}

/// Loads the file named by `QUERYGEN_CONFIG`, else `querygen.toml` next to the crate's manifest.
pub fn load_config() -> Result<Config> {
    if let Some(path) = env_opt(config::PATH_VAR)? {
        return Ok(Config::from_path(Path::new(&path))?);
    }

    Ok(Config::from_dir_or_default(&manifest_dir()?)?)
}

/// Runs a full pass over `decls`, returning the compile errors to emit, if any.
///
/// With `fail-on-diagnostics = false` problems are only logged.
pub fn expand(config: Config, records: &[RecordSpec], decls: &[DeclSpec]) -> Result<TokenStream> {
    let mut generator = Generator::new(config)?;

    for record in records {
        generator.define_record(record)?;
    }

    let Generated { report, .. } = generator.run(decls)?;

    report.log();

    if generator.config().fail_on_diagnostics {
        Ok(report.to_compile_errors())
    } else {
        Ok(TokenStream::new())
    }
}
