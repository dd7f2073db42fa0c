//! Declarative record-rewriting rules ("beautifiers").
//!
//! A rule targets one `(tag, code)` subfield, guards the rewrite with a
//! list of regex conditions against other subfields, and rewrites the
//! target from a template once every condition is satisfied. Rule sets are
//! per-catalogue configuration, loaded once and read-only afterwards.
//!
//! Rule sets are TOML:
//!
//! ```toml
//! [[rule]]
//! tag = "003@"
//! code = "0"
//! mode = "prepend"
//! template = "{1}-"
//!
//! [[rule.condition]]
//! tag = "002@"
//! code = "0"
//! pattern = "^O(.)"
//! match = "find"
//! ```
//!
//! Condition patterns are compiled here, at load time — a bad pattern is a
//! configuration error and never surfaces during record processing.

pub mod engine;

use std::path::Path;

use miette::Diagnostic;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

pub use engine::apply;

/// Errors from rule loading and rule application.
#[derive(Debug, Error, Diagnostic)]
pub enum BeautifyError {
    #[error("condition pattern {pattern:?} does not compile: {message}")]
    #[diagnostic(
        code(opac::beautify::bad_pattern),
        help(
            "Fix the regular expression in the catalogue's beautifier \
             configuration. Rules are never applied with broken patterns."
        )
    )]
    BadPattern { pattern: String, message: String },

    #[error("subfield code {code:?} is not a single character")]
    #[diagnostic(
        code(opac::beautify::bad_code),
        help("Subfield codes are exactly one character, e.g. \"a\" or \"0\".")
    )]
    BadCode { code: String },

    #[error("template {template:?} references capture group {group} the match does not have")]
    #[diagnostic(
        code(opac::beautify::missing_group),
        help(
            "The {{n}} placeholders must name capture groups of the condition \
             pattern that triggered the rule. Add the group to the pattern or \
             fix the placeholder."
        )
    )]
    MissingGroup { template: String, group: usize },

    #[error("cannot read rule set: {message}")]
    #[diagnostic(
        code(opac::beautify::bad_rule_file),
        help("Check that the rule file exists and is valid TOML.")
    )]
    BadRuleFile { message: String },
}

/// How the target subfield is rewritten once a rule fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteMode {
    /// Set the value to the filled template.
    Replace,
    /// Put the filled template before the existing value.
    Prepend,
    /// Put the filled template after the existing value.
    Append,
    /// Like `Replace`, but entity escapes in the filled template are
    /// decoded first.
    UnescapeXml,
}

/// Whether a condition pattern must cover the whole subfield value or
/// merely occur somewhere in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    Matches,
    Find,
}

/// One guard of a rule: a pattern that some subfield with the given
/// `(tag, code)` must satisfy.
#[derive(Debug, Clone)]
pub struct Condition {
    pub tag: String,
    pub code: char,
    pub pattern: Regex,
    pub match_mode: MatchMode,
}

/// One conditional rewrite, targeting a single `(tag, code)` subfield.
#[derive(Debug, Clone)]
pub struct BeautifyRule {
    pub tag: String,
    pub code: char,
    pub mode: RewriteMode,
    pub template: String,
    pub conditions: Vec<Condition>,
}

/// An ordered, per-catalogue list of rules.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<BeautifyRule>,
}

impl RuleSet {
    /// A rule set that rewrites nothing.
    pub fn empty() -> Self {
        RuleSet::default()
    }

    pub fn new(rules: Vec<BeautifyRule>) -> Self {
        RuleSet { rules }
    }

    /// Load and compile a rule set from its TOML source.
    pub fn from_toml_str(source: &str) -> Result<Self, BeautifyError> {
        let file: RuleSetFile =
            toml::from_str(source).map_err(|e| BeautifyError::BadRuleFile {
                message: e.to_string(),
            })?;
        let rules = file
            .rules
            .into_iter()
            .map(RuleFile::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RuleSet { rules })
    }

    /// Load and compile a rule set from a TOML file on disk.
    pub fn from_toml_file(path: &Path) -> Result<Self, BeautifyError> {
        let source = std::fs::read_to_string(path).map_err(|e| BeautifyError::BadRuleFile {
            message: format!("{}: {e}", path.display()),
        })?;
        Self::from_toml_str(&source)
    }

    /// The rules, in configured order.
    pub fn rules(&self) -> &[BeautifyRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

// ---------------------------------------------------------------------------
// TOML surface
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RuleSetFile {
    #[serde(default, rename = "rule")]
    rules: Vec<RuleFile>,
}

#[derive(Debug, Deserialize)]
struct RuleFile {
    tag: String,
    code: String,
    mode: ModeFile,
    template: String,
    #[serde(default, rename = "condition")]
    conditions: Vec<ConditionFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ModeFile {
    Replace,
    Prepend,
    Append,
    UnescapeXml,
}

#[derive(Debug, Deserialize)]
struct ConditionFile {
    tag: String,
    code: String,
    pattern: String,
    #[serde(default, rename = "match")]
    match_mode: MatchModeFile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum MatchModeFile {
    #[default]
    Matches,
    Find,
}

impl RuleFile {
    fn compile(self) -> Result<BeautifyRule, BeautifyError> {
        let conditions = self
            .conditions
            .into_iter()
            .map(ConditionFile::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(BeautifyRule {
            tag: self.tag,
            code: single_char(&self.code)?,
            mode: match self.mode {
                ModeFile::Replace => RewriteMode::Replace,
                ModeFile::Prepend => RewriteMode::Prepend,
                ModeFile::Append => RewriteMode::Append,
                ModeFile::UnescapeXml => RewriteMode::UnescapeXml,
            },
            template: self.template,
            conditions,
        })
    }
}

impl ConditionFile {
    fn compile(self) -> Result<Condition, BeautifyError> {
        let match_mode = match self.match_mode {
            MatchModeFile::Matches => MatchMode::Matches,
            MatchModeFile::Find => MatchMode::Find,
        };
        // "matches" means the pattern covers the whole value; anchoring at
        // compile time keeps capture group numbering intact and spares the
        // engine a span check on every subfield.
        let source = match match_mode {
            MatchMode::Matches => format!("^(?:{})$", self.pattern),
            MatchMode::Find => self.pattern.clone(),
        };
        let pattern = Regex::new(&source).map_err(|e| BeautifyError::BadPattern {
            pattern: self.pattern.clone(),
            message: e.to_string(),
        })?;
        Ok(Condition {
            tag: self.tag,
            code: single_char(&self.code)?,
            pattern,
            match_mode,
        })
    }
}

fn single_char(code: &str) -> Result<char, BeautifyError> {
    let mut chars = code.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(BeautifyError::BadCode { code: code.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    const RULES: &str = r#"
[[rule]]
tag = "021A"
code = "a"
mode = "replace"
template = "{1}"

[[rule.condition]]
tag = "002@"
code = "0"
pattern = "^A(.*)"
match = "find"

[[rule]]
tag = "009Q"
code = "u"
mode = "unescape-xml"
template = "{@}"

[[rule.condition]]
tag = "009Q"
code = "u"
pattern = "https?://\\S+"
match = "find"
"#;

    #[test]
    fn loads_and_compiles_rules() {
        let rules = RuleSet::from_toml_str(RULES).unwrap();
        assert_eq!(rules.rules().len(), 2);
        let first = &rules.rules()[0];
        assert_eq!(first.tag, "021A");
        assert_eq!(first.code, 'a');
        assert_eq!(first.mode, RewriteMode::Replace);
        assert_eq!(first.conditions.len(), 1);
        assert_eq!(first.conditions[0].match_mode, MatchMode::Find);
        assert_eq!(rules.rules()[1].mode, RewriteMode::UnescapeXml);
    }

    #[test]
    fn match_mode_defaults_to_matches() {
        let rules = RuleSet::from_toml_str(
            r#"
[[rule]]
tag = "021A"
code = "a"
mode = "append"
template = "x"

[[rule.condition]]
tag = "002@"
code = "0"
pattern = "Aa.*"
"#,
        )
        .unwrap();
        assert_eq!(rules.rules()[0].conditions[0].match_mode, MatchMode::Matches);
    }

    #[test]
    fn bad_pattern_fails_at_load_time() {
        let err = RuleSet::from_toml_str(
            r#"
[[rule]]
tag = "021A"
code = "a"
mode = "replace"
template = "x"

[[rule.condition]]
tag = "002@"
code = "0"
pattern = "("
"#,
        )
        .unwrap_err();
        assert!(matches!(err, BeautifyError::BadPattern { .. }));
    }

    #[test]
    fn multi_char_code_is_rejected() {
        let err = RuleSet::from_toml_str(
            r#"
[[rule]]
tag = "021A"
code = "ab"
mode = "replace"
template = "x"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, BeautifyError::BadCode { .. }));
    }

    #[test]
    fn invalid_toml_is_a_rule_file_error() {
        let err = RuleSet::from_toml_str("[[rule]\n").unwrap_err();
        assert!(matches!(err, BeautifyError::BadRuleFile { .. }));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(RULES.as_bytes()).unwrap();
        let rules = RuleSet::from_toml_file(file.path()).unwrap();
        assert_eq!(rules.rules().len(), 2);
    }

    #[test]
    fn missing_file_is_a_rule_file_error() {
        let err = RuleSet::from_toml_file(Path::new("/nonexistent/rules.toml")).unwrap_err();
        assert!(matches!(err, BeautifyError::BadRuleFile { .. }));
    }
}
