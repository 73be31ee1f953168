//! Parsing support for named query placeholders.
//!
//! ### Kinds
//!
//! Anonymous: `SELECT * FROM foo WHERE id = ? AND bar = ?`
//! where each `?` is copied through and binds the next argument.
//!
//! Named: `SELECT * FROM foo WHERE id = :id AND bar = :bar`
//! where each `:<ident>` is rewritten to `?` and recorded under its name.
//!
//! Both kinds share one occurrence counter starting at 1, and a name used twice
//! produces two bind positions.
//!
//! ### Potential Pitfalls to Avoid
//! Quoted runs (`'...'` and `"..."`) are copied verbatim so that string literals and
//! quoted identifiers like `'12:30'` or `"a?b"` never produce placeholders. A quote preceded by
//! a backslash does not end the run. A colon that does not start an identifier (`::`, `: `,
//! a trailing `:`) is plain text. A cast like `x::int` is still `:` followed by the
//! placeholder `:int`, so it binds a parameter named `int`.

use std::cmp;

use combine::parser::range::recognize;
use combine::{
    attempt, choice, eof, many, one_of, optional, satisfy, skip_many, skip_many1, token, Parser,
};

use crate::error::{Error, Result};

/// The positional marker every placeholder is rewritten to.
pub const MARKER: char = '?';

/// The number of words (group of characters separated by a space) before and after a given position
/// to give for context. See [`ParsedSql::context()`].
const NUM_CONTEXT_WORDS: usize = 3;

/// A SQL template with its named placeholders rewritten to [`MARKER`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedSql {
    native: String,
    occurrences: Vec<Occurrence>,
}

/// A single placeholder occurrence in a query parsed with [`parse()`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Occurrence {
    /// 1-based bind position, shared by named and anonymous placeholders.
    pub index: usize,
    /// The placeholder name, or `"?"` for an anonymous placeholder.
    pub name: String,
    /// Byte offset of the marker in the native form.
    pub offset: usize,
}

impl Occurrence {
    pub fn is_anonymous(&self) -> bool {
        self.name.len() == 1 && self.name.starts_with(MARKER)
    }
}

impl ParsedSql {
    /// The query with every placeholder replaced by [`MARKER`].
    pub fn native(&self) -> &str {
        &self.native
    }

    /// Every placeholder occurrence, in bind order.
    pub fn occurrences(&self) -> &[Occurrence] {
        &self.occurrences
    }

    /// Distinct placeholder names in the order they first appear; anonymous markers are skipped.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();

        for occurrence in self.occurrences.iter().filter(|o| !o.is_anonymous()) {
            if !names.contains(&occurrence.name.as_str()) {
                names.push(&occurrence.name);
            }
        }

        names
    }

    /// Re-substitutes each marker with `:name`, leaving anonymous markers as they are.
    pub fn to_named(&self) -> String {
        let mut out = String::with_capacity(self.native.len() + self.occurrences.len() * 8);
        let mut last_end = 0;

        for occurrence in &self.occurrences {
            out.push_str(&self.native[last_end..occurrence.offset]);
            last_end = occurrence.offset + MARKER.len_utf8();

            if occurrence.is_anonymous() {
                out.push(MARKER);
            } else {
                out.push(':');
                out.push_str(&occurrence.name);
            }
        }

        out.push_str(&self.native[last_end..]);
        out
    }

    /// A few words of the native form around `occurrence`, for diagnostics.
    pub fn context(&self, occurrence: &Occurrence) -> &str {
        error_context(&self.native, occurrence.offset)
    }
}

#[derive(Debug)]
enum Segment<'a> {
    /// Copied through unchanged.
    Text(&'a str),
    Anonymous,
    Named(&'a str),
}

/// Parse `sql` for placeholders.
///
/// This never fails on well-formed UTF-8; the `Err` case only signals a broken grammar.
pub fn parse(sql: &str) -> Result<ParsedSql> {
    let (segments, _rest) = many::<Vec<_>, _, _>(parse_segment())
        .skip(eof())
        .parse(sql)
        .map_err(|e| Error::Placeholders(e.to_string()))?;

    let mut native = String::with_capacity(sql.len());
    let mut occurrences = Vec::new();

    for segment in segments {
        match segment {
            Segment::Text(text) => native.push_str(text),
            Segment::Anonymous => {
                occurrences.push(Occurrence {
                    index: occurrences.len() + 1,
                    name: MARKER.to_string(),
                    offset: native.len(),
                });
                native.push(MARKER);
            }
            Segment::Named(name) => {
                occurrences.push(Occurrence {
                    index: occurrences.len() + 1,
                    name: name.to_owned(),
                    offset: native.len(),
                });
                native.push(MARKER);
            }
        }
    }

    tracing::trace!(sql, native = %native, count = occurrences.len(), "parsed placeholders");

    Ok(ParsedSql {
        native,
        occurrences,
    })
}

fn parse_segment<'a>() -> impl Parser<&'a str, Output = Segment<'a>> {
    choice((
        // quoted run: `'...'` or `"..."`
        recognize(one_of("'\"".chars()).then(|quote| quoted_run(quote))).map(Segment::Text),
        // named: `:foo`
        attempt(token(':').with(parse_ident())).map(Segment::Named),
        // anonymous: `?`
        token(MARKER).map(|_| Segment::Anonymous),
        recognize(skip_many1(satisfy(|c: char| !is_special(c)))).map(Segment::Text),
        // a colon which doesn't start a placeholder
        recognize(token(':')).map(Segment::Text),
    ))
}

fn parse_ident<'a>() -> impl Parser<&'a str, Output = &'a str> {
    recognize((satisfy(is_ident_start), skip_many(satisfy(is_ident_continue))))
}

/// The body of a quoted run after its opening quote, including the closing quote if present.
fn quoted_run<'a>(quote: char) -> impl Parser<&'a str, Output = ()> {
    (
        skip_many(choice((
            // a backslash protects an immediately following quote
            token('\\').with(optional(token(quote))).map(|_| ()),
            satisfy(move |c: char| c != quote && c != '\\').map(|_| ()),
        ))),
        optional(token(quote)),
    )
        .map(|_| ())
}

fn is_special(c: char) -> bool {
    matches!(c, '\'' | '"' | ':' | MARKER)
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Give context for the error in `s` at `at`
fn error_context(s: &str, at: usize) -> &str {
    // match the _last_ non-whitespace character before one or more spaces
    let edge_trigger_whitespace = || {
        let mut prev = ' ';

        move |c: char| {
            let ret = c.is_whitespace() && !prev.is_whitespace();
            prev = c;
            ret
        }
    };

    // defaults to the beginning of the string
    let start = cmp::max(
        s[..at]
            .rmatch_indices(edge_trigger_whitespace())
            .take(NUM_CONTEXT_WORDS)
            .last()
            .map(|(i, sp)| i + sp.len()),
        // OR the previous newline
        s[..at].rfind('\n'),
    )
    .unwrap_or(0);

    // defaults to the end of string
    let end = cmp::min(
        s[at..]
            .match_indices(edge_trigger_whitespace())
            .take(NUM_CONTEXT_WORDS)
            .last()
            .map_or(s.len(), |(i, _s)| at + i),
        s[at..].find('\n').map_or(s.len(), |i| at + i),
    );

    s[start..end].trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn occ(index: usize, name: &str, offset: usize) -> Occurrence {
        Occurrence {
            index,
            name: name.into(),
            offset,
        }
    }

    #[test]
    fn test_named_and_anonymous() -> Result<()> {
        let parsed = parse("SELECT 1 FROM foo WHERE bar = ? AND baz = :baz")?;

        assert_eq!(parsed.native(), "SELECT 1 FROM foo WHERE bar = ? AND baz = ?");
        assert_eq!(parsed.occurrences(), [occ(1, "?", 30), occ(2, "baz", 42)]);
        assert_eq!(parsed.names(), ["baz"]);

        Ok(())
    }

    #[test]
    fn test_colon_edge_cases() -> Result<()> {
        let parsed = parse("::")?;
        assert_eq!(parsed.native(), "::");
        assert!(parsed.occurrences().is_empty());

        let parsed = parse(":one:")?;
        assert_eq!(parsed.native(), "?:");
        assert_eq!(parsed.occurrences(), [occ(1, "one", 0)]);

        let parsed = parse("::one")?;
        assert_eq!(parsed.native(), ":?");
        assert_eq!(parsed.occurrences(), [occ(1, "one", 1)]);

        let parsed = parse("SELECT x::int, : , :")?;
        assert_eq!(parsed.native(), "SELECT x:?, : , :");
        assert_eq!(parsed.occurrences(), [occ(1, "int", 8)]);

        Ok(())
    }

    #[test]
    fn test_repeated_name() -> Result<()> {
        let parsed = parse(":one :one")?;

        assert_eq!(parsed.native(), "? ?");
        assert_eq!(parsed.occurrences(), [occ(1, "one", 0), occ(2, "one", 2)]);
        assert_eq!(parsed.names(), ["one"]);

        Ok(())
    }

    #[test]
    fn test_quoted_runs() -> Result<()> {
        let sql = r#"SELECT ':no', "a?b", 'it\'s :x' FROM t WHERE id = :id"#;
        let parsed = parse(sql)?;

        assert_eq!(
            parsed.native(),
            r#"SELECT ':no', "a?b", 'it\'s :x' FROM t WHERE id = ?"#
        );
        assert_eq!(parsed.occurrences().len(), 1);
        assert_eq!(parsed.occurrences()[0].name, "id");

        // an escaped quote inside a double-quoted run
        let parsed = parse(r#"SELECT "x\":y" = :y"#)?;
        assert_eq!(parsed.native(), r#"SELECT "x\":y" = ?"#);
        assert_eq!(parsed.occurrences(), [occ(1, "y", 17)]);

        // an unterminated run swallows the rest of the template
        let parsed = parse("SELECT ':a, :b")?;
        assert_eq!(parsed.native(), "SELECT ':a, :b");
        assert!(parsed.occurrences().is_empty());

        Ok(())
    }

    #[test]
    fn test_identifier_chars() -> Result<()> {
        let parsed = parse("VALUES (:first_name, :$ref, :a1, :9)")?;

        assert_eq!(parsed.native(), "VALUES (?, ?, ?, :9)");
        assert_eq!(parsed.names(), ["first_name", "$ref", "a1"]);

        // offsets are byte offsets
        let parsed = parse("SELECT 'é' || :x")?;
        assert_eq!(parsed.occurrences(), [occ(1, "x", 15)]);
        assert_eq!(&parsed.native()[15..16], "?");

        Ok(())
    }

    #[test]
    fn test_round_trip() -> Result<()> {
        let sql = "UPDATE users SET name = :name, age = :age WHERE id = :id OR parent = :id";
        let parsed = parse(sql)?;

        assert_eq!(parsed.occurrences().len(), 4);
        assert_eq!(parsed.to_named(), sql);

        let parsed = parse("SELECT ? FROM t WHERE a = :a")?;
        assert_eq!(parsed.to_named(), "SELECT ? FROM t WHERE a = :a");

        Ok(())
    }

    #[test]
    fn test_error_context() -> Result<()> {
        let parsed = parse("SELECT id FROM users WHERE name = :name AND deleted = false")?;
        let occurrence = &parsed.occurrences()[0];

        assert_eq!(parsed.context(occurrence), "WHERE name = ? AND deleted");

        Ok(())
    }
}
