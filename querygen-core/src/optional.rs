//! The nullability contract of a value.

use std::fmt::{self, Display, Formatter};

/// The declared null-handling contract of a parameter, result or conversion routine.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OptionalFlag {
    /// Nothing was declared.
    #[default]
    Unspecified,
    /// The value may be `NULL`.
    Nullable,
    /// The value is never `NULL`.
    NonNull,
    /// The value is wrapped in `Option<T>`.
    OptionalType,
}

impl OptionalFlag {
    pub const ALL: [OptionalFlag; 4] = [
        OptionalFlag::Unspecified,
        OptionalFlag::Nullable,
        OptionalFlag::NonNull,
        OptionalFlag::OptionalType,
    ];

    /// Returns `true` if a value declared with `self` may be passed where `target` is expected.
    ///
    /// Everything satisfies a loose target; only `NonNull` satisfies `NonNull`.
    pub fn is_assignable_to(self, target: OptionalFlag) -> bool {
        match target {
            OptionalFlag::NonNull => self == OptionalFlag::NonNull,
            OptionalFlag::Unspecified | OptionalFlag::Nullable | OptionalFlag::OptionalType => {
                true
            }
        }
    }

    /// Every flag that is assignable to `target`.
    pub fn assignable_sources(target: OptionalFlag) -> Vec<OptionalFlag> {
        Self::ALL
            .into_iter()
            .filter(|source| source.is_assignable_to(target))
            .collect()
    }

    /// Every flag that `source` is assignable to.
    pub fn assignable_targets(source: OptionalFlag) -> Vec<OptionalFlag> {
        Self::ALL
            .into_iter()
            .filter(|target| source.is_assignable_to(*target))
            .collect()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OptionalFlag::Unspecified => "UNSPECIFIED",
            OptionalFlag::Nullable => "NULLABLE",
            OptionalFlag::NonNull => "NON_NULL",
            OptionalFlag::OptionalType => "OPTIONAL_TYPE",
        }
    }
}

impl Display for OptionalFlag {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Formats a set of flags as `[A, B]` for diagnostics.
pub(crate) fn display_set(flags: &[OptionalFlag]) -> String {
    let names: Vec<&str> = flags.iter().map(|f| f.as_str()).collect();
    format!("[{}]", names.join(", "))
}
