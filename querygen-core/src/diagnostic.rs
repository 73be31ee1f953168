use std::fmt::{self, Display, Formatter};
use std::slice;

/// The category of a user-facing problem.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum DiagnosticKind {
    /// A named converter reference did not resolve to anything registered.
    NotFound,
    /// Two conflicting converters were registered under one slot.
    DuplicateKey,
    /// Synthesizing a converter recursively requested itself.
    Cycle,
    /// The resolved converter's target type does not fit the requested type.
    IncompatibleType,
    /// The declared nullness contract is not assignable from/to the converter's contract.
    NullnessMismatch,
    /// An operation was declared without a SQL template.
    EmptySql,
    /// A named placeholder refers to no declared parameter.
    UnboundPlaceholder,
    /// A declared parameter is referenced by no placeholder.
    UnusedParameter,
    /// A declared type cannot be represented by the type table.
    UnsupportedType,
}

impl DiagnosticKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticKind::NotFound => "not-found",
            DiagnosticKind::DuplicateKey => "duplicate-key",
            DiagnosticKind::Cycle => "cycle",
            DiagnosticKind::IncompatibleType => "incompatible-type",
            DiagnosticKind::NullnessMismatch => "nullness-mismatch",
            DiagnosticKind::EmptySql => "empty-sql",
            DiagnosticKind::UnboundPlaceholder => "unbound-placeholder",
            DiagnosticKind::UnusedParameter => "unused-parameter",
            DiagnosticKind::UnsupportedType => "unsupported-type",
        }
    }
}

impl Display for DiagnosticKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A single message describing why a converter could not be bound.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Diagnostic {
            kind,
            message: message.into(),
        }
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// An ordered, mergeable collection of [`Diagnostic`]s.
///
/// Merging concatenates, so recording a conflict never loses either side's messages.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Diagnostics(vec![Diagnostic::new(kind, message)])
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.0.push(diagnostic);
    }

    /// Appends every diagnostic of `other` after the ones already in `self`.
    pub fn merge(&mut self, other: &Diagnostics) {
        self.0.extend_from_slice(&other.0);
    }

    pub fn merged(mut self, other: &Diagnostics) -> Self {
        self.merge(other);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    pub fn contains(&self, kind: DiagnosticKind) -> bool {
        self.0.iter().any(|d| d.kind == kind)
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.0.iter().filter(|d| d.kind == kind).count()
    }
}

impl Display for Diagnostics {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, diagnostic) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            Display::fmt(diagnostic, f)?;
        }
        Ok(())
    }
}

impl From<Diagnostic> for Diagnostics {
    fn from(diagnostic: Diagnostic) -> Self {
        Diagnostics(vec![diagnostic])
    }
}

impl FromIterator<Diagnostic> for Diagnostics {
    fn from_iter<I: IntoIterator<Item = Diagnostic>>(iter: I) -> Self {
        Diagnostics(iter.into_iter().collect())
    }
}

impl Extend<Diagnostic> for Diagnostics {
    fn extend<I: IntoIterator<Item = Diagnostic>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[test]
fn test_merge_keeps_both_sides_in_order() {
    let a = Diagnostics::single(DiagnosticKind::NotFound, "a");
    let b = Diagnostics::single(DiagnosticKind::Cycle, "b");

    let merged = a.clone().merged(&b);

    assert_eq!(merged.len(), 2);
    assert_eq!(merged.iter().map(|d| d.message.as_str()).collect::<Vec<_>>(), ["a", "b"]);
    assert!(merged.contains(DiagnosticKind::NotFound));
    assert!(merged.contains(DiagnosticKind::Cycle));
    assert!(!merged.contains(DiagnosticKind::DuplicateKey));
    assert_eq!(merged.to_string(), "[not-found] a\n[cycle] b");
}
