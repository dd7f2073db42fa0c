//! Best-effort decoder for the raw per-hit text a catalogue returns.
//!
//! Each logical field line has the shape `TAG[/OCCURRENCE]$CODEvalue$CODEvalue…`.
//! Which token separates field lines is feed-dependent: some catalogues emit
//! a literal markup break between lines, others plain line breaks. The
//! separator is therefore a configuration input ([`FieldSeparator`]), with
//! [`FieldSeparator::detect`] keeping the old presence-based heuristic
//! available as a default.
//!
//! Decoding is total: malformed field lines are skipped, never fatal. A
//! partial record is preferable to a failed retrieval.

use tracing::debug;

use super::{Field, Record, Subfield};

/// The markup break some feeds use between field lines.
const MARKUP_BREAK: &str = "<br />";

/// Envelope markers around the interesting part of a raw hit.
const ENVELOPE_OPEN: &str = "LONGTITLE";
const ENVELOPE_CLOSE: &str = "</LONGTITLE>";

/// How field lines are separated in a catalogue's raw hit text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSeparator {
    /// A literal separator token, e.g. `<br />`.
    Token(String),
    /// Plain line breaks.
    Lines,
}

impl FieldSeparator {
    /// Choose a separator by inspecting the raw text: the markup break when
    /// present, line breaks otherwise.
    pub fn detect(raw: &str) -> Self {
        if raw.contains(MARKUP_BREAK) {
            FieldSeparator::Token(MARKUP_BREAK.to_string())
        } else {
            FieldSeparator::Lines
        }
    }
}

/// Decode one raw hit into a [`Record`].
///
/// When the text carries the `LONGTITLE…</LONGTITLE>` envelope, only the
/// enveloped region is decoded and the opening segment (the envelope tag
/// itself) is skipped.
pub fn decode(raw: &str, separator: &FieldSeparator) -> Record {
    let body = envelope_region(raw);
    let skip_opener = body.starts_with(ENVELOPE_OPEN);

    let segments: Vec<&str> = match separator {
        FieldSeparator::Token(token) => body.split(token.as_str()).collect(),
        FieldSeparator::Lines => body.lines().collect(),
    };

    let mut record = Record::default();
    for segment in segments.into_iter().skip(usize::from(skip_opener)) {
        if let Some(field) = parse_field_line(segment) {
            record.fields.push(field);
        }
    }
    record
}

/// The text between the envelope markers, or the whole input when absent.
fn envelope_region(raw: &str) -> &str {
    match (raw.find(ENVELOPE_OPEN), raw.find(ENVELOPE_CLOSE)) {
        (Some(start), Some(end)) if start < end => &raw[start..end],
        _ => raw,
    }
}

/// Parse one field line into a [`Field`]. Returns `None` for anything
/// malformed: empty line, empty tag, or no decodable subfield.
fn parse_field_line(line: &str) -> Option<Field> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let mut components = line.split('$');
    let head = components.next()?.trim();
    if head.is_empty() {
        debug!(line, "skipping field line without a tag");
        return None;
    }

    let (tag, occurrence) = match head.split_once('/') {
        Some((tag, occurrence)) => (tag.to_string(), Some(occurrence.to_string())),
        None => (head.to_string(), None),
    };

    let mut subfields = Vec::new();
    for component in components {
        let mut chars = component.chars();
        match chars.next() {
            Some(code) => subfields.push(Subfield {
                code,
                value: chars.as_str().to_string(),
            }),
            None => debug!(tag, "skipping empty subfield segment"),
        }
    }

    if subfields.is_empty() {
        debug!(tag, "skipping field line without subfields");
        return None;
    }

    Some(Field { tag, occurrence, subfields })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_single_field_line() {
        let record = decode("200@$0o$aTitle", &FieldSeparator::Lines);
        assert_eq!(record.fields.len(), 1);
        let field = &record.fields[0];
        assert_eq!(field.tag, "200@");
        assert_eq!(field.occurrence, None);
        assert_eq!(
            field.subfields,
            vec![
                Subfield { code: '0', value: "o".into() },
                Subfield { code: 'a', value: "Title".into() },
            ]
        );
    }

    #[test]
    fn decodes_occurrence_suffix() {
        let record = decode("209A/01$aQ 123", &FieldSeparator::Lines);
        assert_eq!(record.fields[0].tag, "209A");
        assert_eq!(record.fields[0].occurrence.as_deref(), Some("01"));
        assert_eq!(record.fields[0].subfields[0].value, "Q 123");
    }

    #[test]
    fn skips_malformed_lines() {
        let raw = "\n$aNo tag\n021A$aGood\n021B\n";
        let record = decode(raw, &FieldSeparator::Lines);
        assert_eq!(record.fields.len(), 1);
        assert_eq!(record.fields[0].tag, "021A");
    }

    #[test]
    fn envelope_and_markup_break_separator() {
        let raw = "junk LONGTITLE NR=\"1\"><br />021A$aTitle<br />003@$0123</LONGTITLE> trailer";
        let separator = FieldSeparator::detect(raw);
        assert_eq!(separator, FieldSeparator::Token(MARKUP_BREAK.to_string()));
        let record = decode(raw, &separator);
        assert_eq!(record.fields.len(), 2);
        assert_eq!(record.field_value("021A", 'a'), Some("Title"));
        assert_eq!(record.field_value("003@", '0'), Some("123"));
    }

    #[test]
    fn envelope_with_line_breaks_skips_opener() {
        let raw = "LONGTITLE NR=\"1\">\n021A$aTitle$dSub\n010@$ager\n</LONGTITLE>";
        let separator = FieldSeparator::detect(raw);
        assert_eq!(separator, FieldSeparator::Lines);
        let record = decode(raw, &separator);
        assert_eq!(record.fields.len(), 2);
        assert_eq!(record.field_value("021A", 'd'), Some("Sub"));
    }

    #[test]
    fn no_envelope_decodes_everything() {
        let raw = "021A$aTitle\n010@$ager";
        let record = decode(raw, &FieldSeparator::Lines);
        assert_eq!(record.fields.len(), 2);
    }

    #[test]
    fn decoding_never_fails() {
        for raw in ["", "$$$$", "garbage without dollar", "LONGTITLE</LONGTITLE>"] {
            let record = decode(raw, &FieldSeparator::detect(raw));
            assert!(record.is_empty(), "expected empty record for {raw:?}");
        }
    }
}
