//! Compiler for the user-typed search expression.
//!
//! A query is a sequence of terms separated by spaces; each term is
//! `[operator] field ':' value` where the operator prefix is `-` (NOT) or
//! `|` (OR) and its absence means AND for every term but the first. Values
//! are bare tokens or double-quoted strings. Bracketed sub-expressions are
//! unsupported by design and rejected outright.
//!
//! Compilation is a single left-to-right pass over a six-state character
//! machine; it is pure and deterministic. Term values are percent-encoded
//! at clause construction so the compiled query can go onto a request URL
//! unchanged.

use miette::Diagnostic;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use thiserror::Error;

/// Percent-encoding set for term values: everything but unreserved
/// characters is escaped.
const TERM_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Errors produced by the query compiler. Always caused by caller input;
/// never retried, surfaced verbatim.
#[derive(Debug, Error, Diagnostic)]
pub enum QueryError {
    #[error("fieldless term at position {position}")]
    #[diagnostic(
        code(opac::query::fieldless_term),
        help(
            "Every search term needs a field prefix, e.g. \"4=term\" written as \
             field:term. Quote values containing spaces: title:\"some words\"."
        )
    )]
    FieldlessTerm { position: usize },

    #[error("bracketed sub-expression at position {position}")]
    #[diagnostic(
        code(opac::query::unsupported_bracket),
        help(
            "Brackets are not supported by the catalogue query language. \
             Rewrite the query as a flat sequence of field:term clauses."
        )
    )]
    UnsupportedBracket { position: usize },

    #[error("query is syntactically incomplete")]
    #[diagnostic(
        code(opac::query::incomplete),
        help(
            "The query ends in the middle of a term: an unterminated quote, \
             a dangling field, or a colon with no value. Complete or remove \
             the last term."
        )
    )]
    IncompleteQuery,
}

/// Boolean connective of a clause to the preceding result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    And,
    Or,
    Not,
}

impl Operator {
    /// The protocol token for this operator in indexed query parameters.
    pub fn url_token(self) -> &'static str {
        match self {
            Operator::And => "*",
            Operator::Or => "%2B",
            Operator::Not => "-",
        }
    }
}

/// One `(operator, field, term)` unit of a compiled query. Immutable once
/// produced; `term` is stored percent-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    /// Zero-based position of the clause in the query.
    pub index: usize,
    /// `None` on the first clause unless an explicit leading `-` was given.
    pub operator: Option<Operator>,
    pub field: String,
    pub term: String,
}

/// An ordered list of boolean-combined clauses, ready to be rendered into
/// the catalogue's indexed URL parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    clauses: Vec<Clause>,
}

/// Compiler state, one variant per character-machine state.
enum State {
    /// Skipping spaces before the first term; a leading `-` is recognized.
    TermStart,
    /// Reading the field name, up to the `:`.
    Field,
    /// Just behind the `:`, before the value.
    AfterColon,
    /// Reading a bare value, up to whitespace or end of input.
    BareValue,
    /// Reading a quoted value, up to the closing quote.
    QuotedValue,
    /// Between terms; `-` and `|` prefixes are recognized here.
    BetweenTerms,
}

impl CompiledQuery {
    /// Compile a user-typed query expression.
    pub fn compile(text: &str) -> Result<Self, QueryError> {
        let mut clauses: Vec<Clause> = Vec::new();
        let mut state = State::TermStart;
        let mut operator: Option<Operator> = None;
        let mut field = String::new();
        let mut term = String::new();

        let mut emit = |operator: &mut Option<Operator>, field: &mut String, term: &mut String, clauses: &mut Vec<Clause>| {
            let op = match clauses.len() {
                0 => operator.take(),
                _ => Some(operator.take().unwrap_or(Operator::And)),
            };
            clauses.push(Clause {
                index: clauses.len(),
                operator: op,
                field: std::mem::take(field),
                term: utf8_percent_encode(term, TERM_ENCODE).to_string(),
            });
            term.clear();
        };

        for (position, ch) in text.char_indices() {
            match state {
                State::TermStart => match ch {
                    ' ' => {}
                    '-' => {
                        operator = Some(Operator::Not);
                        state = State::Field;
                    }
                    '(' => return Err(QueryError::UnsupportedBracket { position }),
                    '"' => return Err(QueryError::FieldlessTerm { position }),
                    _ => {
                        field.push(ch);
                        state = State::Field;
                    }
                },
                State::Field => match ch {
                    ' ' | '"' => return Err(QueryError::FieldlessTerm { position }),
                    '(' => return Err(QueryError::UnsupportedBracket { position }),
                    ':' => state = State::AfterColon,
                    _ => field.push(ch),
                },
                State::AfterColon => match ch {
                    ' ' => {}
                    '"' => state = State::QuotedValue,
                    '(' => return Err(QueryError::UnsupportedBracket { position }),
                    _ => {
                        term.push(ch);
                        state = State::BareValue;
                    }
                },
                State::BareValue => match ch {
                    ' ' => {
                        emit(&mut operator, &mut field, &mut term, &mut clauses);
                        state = State::BetweenTerms;
                    }
                    _ => term.push(ch),
                },
                State::QuotedValue => match ch {
                    '"' => {
                        // An empty quoted value would yield an empty term,
                        // which no catalogue accepts.
                        if term.is_empty() {
                            return Err(QueryError::IncompleteQuery);
                        }
                        emit(&mut operator, &mut field, &mut term, &mut clauses);
                        state = State::BetweenTerms;
                    }
                    _ => term.push(ch),
                },
                State::BetweenTerms => match ch {
                    ' ' => {}
                    '-' => {
                        operator = Some(Operator::Not);
                        state = State::Field;
                    }
                    '|' => {
                        operator = Some(Operator::Or);
                        state = State::Field;
                    }
                    '(' => return Err(QueryError::UnsupportedBracket { position }),
                    '"' => return Err(QueryError::FieldlessTerm { position }),
                    _ => {
                        field.push(ch);
                        state = State::Field;
                    }
                },
            }
        }

        match state {
            State::BareValue => emit(&mut operator, &mut field, &mut term, &mut clauses),
            State::TermStart | State::BetweenTerms => {}
            State::Field | State::AfterColon | State::QuotedValue => {
                return Err(QueryError::IncompleteQuery);
            }
        }

        Ok(CompiledQuery { clauses })
    }

    /// Build a one-clause query without parsing. Used for follow-up lookups
    /// where field and term are already known, e.g. fetching a parent record
    /// by its identifier.
    pub fn single(field: &str, term: &str) -> Self {
        CompiledQuery {
            clauses: vec![Clause {
                index: 0,
                operator: None,
                field: field.to_string(),
                term: utf8_percent_encode(term, TERM_ENCODE).to_string(),
            }],
        }
    }

    /// The compiled clauses, in query order.
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Render the indexed search parameters for the request URL.
    ///
    /// The first clause establishes the base set (`&ACT=SRCHA&IKT=…&TRM=…`,
    /// its operator is not transmitted); every further clause n carries its
    /// operator in numbered parameters (`&ACTn=…&IKTn=…&TRMn=…`).
    pub fn to_url_params(&self) -> String {
        use std::fmt::Write as _;

        let mut url = String::new();
        for clause in &self.clauses {
            if clause.index == 0 {
                let _ = write!(url, "&ACT=SRCHA&IKT={}&TRM={}", clause.field, clause.term);
            } else {
                let n = clause.index;
                let op = clause.operator.unwrap_or(Operator::And).url_token();
                let _ = write!(
                    url,
                    "&ACT{n}={op}&IKT{n}={}&TRM{n}={}",
                    clause.field, clause.term
                );
            }
        }
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_clause_no_operator() {
        let query = CompiledQuery::compile("4=ppn:term").unwrap();
        assert_eq!(query.clauses().len(), 1);
        let clause = &query.clauses()[0];
        assert_eq!(clause.operator, None);
        assert_eq!(clause.field, "4=ppn");
        assert_eq!(clause.term, "term");
    }

    #[test]
    fn quoted_value_preserves_spaces() {
        let query = CompiledQuery::compile("field:\"a b c\"").unwrap();
        assert_eq!(query.clauses().len(), 1);
        // Spaces survive the quotes, then get percent-encoded.
        assert_eq!(query.clauses()[0].term, "a%20b%20c");
    }

    #[test]
    fn leading_minus_is_not() {
        let query = CompiledQuery::compile("-field:term").unwrap();
        assert_eq!(query.clauses()[0].operator, Some(Operator::Not));
    }

    #[test]
    fn second_term_defaults_to_and() {
        let query = CompiledQuery::compile("a:1 b:2").unwrap();
        assert_eq!(query.clauses().len(), 2);
        assert_eq!(query.clauses()[0].operator, None);
        assert_eq!(query.clauses()[1].operator, Some(Operator::And));
        assert_eq!(query.clauses()[1].index, 1);
    }

    #[test]
    fn pipe_prefix_is_or() {
        let query = CompiledQuery::compile("a:1 |b:2 -c:3").unwrap();
        assert_eq!(query.clauses()[1].operator, Some(Operator::Or));
        assert_eq!(query.clauses()[2].operator, Some(Operator::Not));
    }

    #[test]
    fn unterminated_quote_is_incomplete() {
        let err = CompiledQuery::compile("field:\"unterminated").unwrap_err();
        assert!(matches!(err, QueryError::IncompleteQuery));
    }

    #[test]
    fn dangling_field_and_colon_are_incomplete() {
        assert!(matches!(
            CompiledQuery::compile("field").unwrap_err(),
            QueryError::IncompleteQuery
        ));
        assert!(matches!(
            CompiledQuery::compile("field:").unwrap_err(),
            QueryError::IncompleteQuery
        ));
        assert!(matches!(
            CompiledQuery::compile("a:1 -b").unwrap_err(),
            QueryError::IncompleteQuery
        ));
    }

    #[test]
    fn space_before_colon_is_fieldless() {
        let err = CompiledQuery::compile("field term").unwrap_err();
        assert!(matches!(err, QueryError::FieldlessTerm { .. }));
    }

    #[test]
    fn bracket_is_rejected() {
        for text in ["(a:1)", "fie(ld:1", "a:(term", "a:1 (b:2"] {
            let err = CompiledQuery::compile(text).unwrap_err();
            assert!(
                matches!(err, QueryError::UnsupportedBracket { .. }),
                "expected bracket rejection for {text:?}, got {err:?}"
            );
        }
    }

    #[test]
    fn empty_quoted_value_is_incomplete() {
        let err = CompiledQuery::compile("field:\"\"").unwrap_err();
        assert!(matches!(err, QueryError::IncompleteQuery));
    }

    #[test]
    fn blank_input_compiles_to_no_clauses() {
        assert!(CompiledQuery::compile("").unwrap().clauses().is_empty());
        assert!(CompiledQuery::compile("   ").unwrap().clauses().is_empty());
    }

    #[test]
    fn non_ascii_terms_are_encoded() {
        let query = CompiledQuery::compile("tit:müller").unwrap();
        assert_eq!(query.clauses()[0].term, "m%C3%BCller");
    }

    #[test]
    fn compilation_is_deterministic() {
        let a = CompiledQuery::compile("a:1 |b:\"x y\" -c:2").unwrap();
        let b = CompiledQuery::compile("a:1 |b:\"x y\" -c:2").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_url_params(), b.to_url_params());
    }

    #[test]
    fn url_params_index_subsequent_clauses() {
        let query = CompiledQuery::compile("a:1 |b:2").unwrap();
        assert_eq!(
            query.to_url_params(),
            "&ACT=SRCHA&IKT=a&TRM=1&ACT1=%2B&IKT1=b&TRM1=2"
        );
    }

    #[test]
    fn single_builds_one_clause() {
        let query = CompiledQuery::single("12", "476251875");
        assert_eq!(query.to_url_params(), "&ACT=SRCHA&IKT=12&TRM=476251875");
    }
}
