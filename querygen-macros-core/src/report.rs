//! Aggregated diagnostics of a generation pass, rendered as compile errors.

use std::fmt::{self, Display, Formatter};

use proc_macro2::{Span, TokenStream};
use querygen_core::diagnostic::{DiagnosticKind, Diagnostics};

/// The diagnostics of one slot (an operation or a local converter) of a declaration.
#[derive(Clone, Debug)]
pub struct ReportEntry {
    pub decl: String,
    /// Where errors for the declaration are reported.
    pub span: Span,
    pub slot: String,
    pub diagnostics: Diagnostics,
}

impl ReportEntry {
    pub fn new(decl: &str, span: Span, slot: impl Into<String>, diagnostics: Diagnostics) -> Self {
        ReportEntry {
            decl: decl.to_string(),
            span,
            slot: slot.into(),
            diagnostics,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Report {
    entries: Vec<ReportEntry>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `entry` unless it carries no diagnostics.
    pub fn push(&mut self, entry: ReportEntry) {
        if !entry.diagnostics.is_empty() {
            self.entries.push(entry);
        }
    }

    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every diagnostic of the pass, in report order.
    pub fn diagnostics(&self) -> Diagnostics {
        self.entries
            .iter()
            .flat_map(|entry| entry.diagnostics.iter().cloned())
            .collect()
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.entries
            .iter()
            .map(|entry| entry.diagnostics.count(kind))
            .sum()
    }

    /// Names of the declarations with at least one diagnostic, in report order.
    pub fn offending_decls(&self) -> Vec<&str> {
        let mut decls: Vec<&str> = Vec::new();

        for entry in &self.entries {
            if !decls.contains(&entry.decl.as_str()) {
                decls.push(&entry.decl);
            }
        }

        decls
    }

    /// Emits every entry as a `tracing` warning.
    pub fn log(&self) {
        for entry in &self.entries {
            for diagnostic in &entry.diagnostics {
                tracing::warn!(
                    decl = %entry.decl,
                    slot = %entry.slot,
                    kind = %diagnostic.kind,
                    "{}",
                    diagnostic.message
                );
            }
        }
    }

    /// One `compile_error!` per offending declaration, or nothing if the pass was clean.
    pub fn to_compile_errors(&self) -> TokenStream {
        let mut combined: Option<syn::Error> = None;

        for decl in self.offending_decls() {
            let mut entries = self.entries.iter().filter(|entry| entry.decl == decl).peekable();

            let Some(span) = entries.peek().map(|entry| entry.span) else {
                continue;
            };

            let mut message = format!("querygen: problems in `{decl}`");
            for entry in entries {
                for diagnostic in &entry.diagnostics {
                    message.push_str(&format!("\n  {}: {diagnostic}", entry.slot));
                }
            }

            let error = syn::Error::new(span, message);
            match &mut combined {
                Some(combined) => combined.combine(error),
                None => combined = Some(error),
            }
        }

        combined
            .map(|e| e.to_compile_error())
            .unwrap_or_default()
    }
}

impl Display for Report {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{} {}:", entry.decl, entry.slot)?;
            for diagnostic in &entry.diagnostics {
                write!(f, "\n  {diagnostic}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(decl: &str, slot: &str, kind: DiagnosticKind, message: &str) -> ReportEntry {
        ReportEntry::new(
            decl,
            Span::call_site(),
            slot,
            Diagnostics::single(kind, message),
        )
    }

    #[test]
    fn groups_by_declaration() {
        let mut report = Report::new();
        assert!(report.to_compile_errors().is_empty());

        report.push(entry("app::UserDao", "operation `find`", DiagnosticKind::NotFound, "a"));
        report.push(entry("app::OrderDao", "result", DiagnosticKind::Cycle, "b"));
        report.push(entry("app::UserDao", "operation `save`", DiagnosticKind::EmptySql, "c"));
        report.push(ReportEntry::new(
            "app::Clean",
            Span::call_site(),
            "operation `ok`",
            Diagnostics::new(),
        ));

        assert_eq!(report.entries().len(), 3);
        assert_eq!(report.offending_decls(), ["app::UserDao", "app::OrderDao"]);
        assert_eq!(report.count(DiagnosticKind::NotFound), 1);
        assert_eq!(report.diagnostics().len(), 3);

        let errors = report.to_compile_errors().to_string();
        assert_eq!(errors.matches("compile_error").count(), 2);
        assert!(errors.contains("operation `save`: [empty-sql] c"), "{errors}");

        assert_eq!(
            report.to_string(),
            "app::UserDao operation `find`:\n  [not-found] a\n\
             app::OrderDao result:\n  [cycle] b\n\
             app::UserDao operation `save`:\n  [empty-sql] c"
        );
    }
}
