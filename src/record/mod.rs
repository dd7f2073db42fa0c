//! The three-level record model: a [`Record`] is an ordered list of
//! [`Field`]s, each holding ordered repeatable [`Subfield`]s.
//!
//! Field and subfield order is preserved exactly as the catalogue returned
//! it — the beautifier's "first match wins" semantics depend on it.

pub mod decode;

pub use decode::{decode, FieldSeparator};

/// One subfield of a catalogue field: a single code character and its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subfield {
    pub code: char,
    pub value: String,
}

/// One repeatable field of a decoded record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// The field tag, e.g. `"021A"` or `"200@"`.
    pub tag: String,
    /// Occurrence counter, present when the raw line read `TAG/OCC$...`.
    pub occurrence: Option<String>,
    /// Subfields in arrival order.
    pub subfields: Vec<Subfield>,
}

/// A decoded catalogue record.
///
/// Created fresh per hit by the decoder, mutated in place by the beautifier
/// engine, then handed to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    pub fields: Vec<Field>,
}

impl Record {
    /// Value of the given subfield in the first field carrying `tag`.
    ///
    /// Within that field, the *last* subfield with a matching code wins —
    /// that is how repeated subfields behave in the catalogues this crate
    /// was written against.
    pub fn field_value(&self, tag: &str, code: char) -> Option<&str> {
        let field = self.fields.iter().find(|f| f.tag == tag)?;
        field
            .subfields
            .iter()
            .rev()
            .find(|s| s.code == code)
            .map(|s| s.value.as_str())
    }

    /// All values of the given `(tag, code)` pair, in arrival order, across
    /// every repetition of the field.
    pub fn field_values(&self, tag: &str, code: char) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.tag == tag)
            .flat_map(|f| f.subfields.iter())
            .filter(|s| s.code == code)
            .map(|s| s.value.as_str())
            .collect()
    }

    /// Whether the record holds no fields at all.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Record {
        Record {
            fields: vec![
                Field {
                    tag: "021A".into(),
                    occurrence: None,
                    subfields: vec![
                        Subfield { code: 'a', value: "Title".into() },
                        Subfield { code: 'd', value: "Subtitle".into() },
                    ],
                },
                Field {
                    tag: "010@".into(),
                    occurrence: None,
                    subfields: vec![Subfield { code: 'a', value: "ger".into() }],
                },
                Field {
                    tag: "010@".into(),
                    occurrence: None,
                    subfields: vec![Subfield { code: 'a', value: "lat".into() }],
                },
            ],
        }
    }

    #[test]
    fn field_value_first_field_wins() {
        let record = sample();
        assert_eq!(record.field_value("010@", 'a'), Some("ger"));
    }

    #[test]
    fn field_value_last_subfield_wins() {
        let mut record = sample();
        record.fields[0]
            .subfields
            .push(Subfield { code: 'a', value: "Corrected title".into() });
        assert_eq!(record.field_value("021A", 'a'), Some("Corrected title"));
    }

    #[test]
    fn field_values_collects_repetitions() {
        let record = sample();
        assert_eq!(record.field_values("010@", 'a'), vec!["ger", "lat"]);
    }

    #[test]
    fn missing_field_is_none() {
        let record = sample();
        assert_eq!(record.field_value("003@", '0'), None);
        assert!(record.field_values("003@", '0').is_empty());
    }
}
