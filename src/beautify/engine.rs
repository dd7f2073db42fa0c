//! The rule-application engine.
//!
//! Rules run in configured order. For each rule the engine runs an explicit
//! worklist: every pass scans the record once, in field order, for the first
//! unprocessed target subfield and for subfields satisfying the still-pending
//! conditions; when all conditions are met the target is rewritten and marked
//! handled. A pass rewrites exactly one occurrence, and the loop repeats only
//! while more than one unprocessed occurrence was seen at scan time — so the
//! pass count is bounded by the occurrence count and every repetition of the
//! target field gets its own rewrite.
//!
//! Beautification is additive and corrective, never rejecting: a record with
//! no qualifying subfields is left untouched.

use std::collections::HashSet;

use quick_xml::escape::unescape;
use tracing::{error, warn};

use crate::record::{Field, Record, Subfield};

use super::{BeautifyError, BeautifyRule, Condition, RewriteMode};

/// Apply every rule, in configured order, to the record in place.
pub fn apply(rules: &[BeautifyRule], record: &mut Record) {
    for rule in rules {
        apply_rule(rule, record);
    }
}

/// Capture data of the condition match that triggered a rule.
#[derive(Debug, Clone)]
struct TriggerMatch {
    /// The full match plus every further forward match of the same pattern
    /// (within the value and across later repetitions of the subfield),
    /// concatenated. Feeds the `{@}` placeholder.
    all_matches: String,
    /// The capture groups of the first match. Feed the `{n}` placeholders.
    groups: Vec<Option<String>>,
}

/// What one scan pass over the record found.
struct ScanOutcome {
    /// First unprocessed target subfield, as (field, subfield) indices.
    target: Option<(usize, usize)>,
    /// How many unprocessed target occurrences this scan saw.
    remaining: usize,
    /// Trigger data; `None` for rules without conditions.
    trigger: Option<TriggerMatch>,
}

fn apply_rule(rule: &BeautifyRule, record: &mut Record) {
    let mut handled: HashSet<(usize, usize)> = HashSet::new();

    loop {
        let Some(outcome) = scan(rule, record, &handled) else {
            // A condition stayed pending; further passes would scan the
            // same record and fail the same way.
            return;
        };

        let filled = match fill_template(&rule.template, outcome.trigger.as_ref()) {
            Ok(filled) => filled,
            Err(e) => {
                // Configuration error: logged and skipped for this rule,
                // the rest of the record processing continues.
                error!(tag = %rule.tag, code = %rule.code, %e, "beautifier template misconfigured");
                return;
            }
        };

        match outcome.target {
            Some((field_index, subfield_index)) => {
                let subfield = &mut record.fields[field_index].subfields[subfield_index];
                rewrite(subfield, rule.mode, &filled);
                handled.insert((field_index, subfield_index));
            }
            None => {
                // No target subfield anywhere in the record: create it.
                let mut subfield = Subfield { code: rule.code, value: String::new() };
                rewrite(&mut subfield, rule.mode, &filled);
                record.fields.push(Field {
                    tag: rule.tag.clone(),
                    occurrence: None,
                    subfields: vec![subfield],
                });
                handled.insert((record.fields.len() - 1, 0));
            }
        }

        if outcome.remaining <= 1 {
            return;
        }
    }
}

/// One forward scan: locate the first unprocessed target occurrence and try
/// to satisfy every pending condition with not-yet-processed subfields.
/// Returns `None` when at least one condition stays pending.
fn scan(
    rule: &BeautifyRule,
    record: &Record,
    handled: &HashSet<(usize, usize)>,
) -> Option<ScanOutcome> {
    let mut pending: Vec<usize> = (0..rule.conditions.len()).collect();
    let mut trigger: Option<TriggerMatch> = None;
    let mut target: Option<(usize, usize)> = None;
    let mut remaining = 0usize;

    for (field_index, field) in record.fields.iter().enumerate() {
        for (subfield_index, subfield) in field.subfields.iter().enumerate() {
            if handled.contains(&(field_index, subfield_index)) {
                continue;
            }

            if field.tag == rule.tag && subfield.code == rule.code {
                remaining += 1;
                if target.is_none() {
                    target = Some((field_index, subfield_index));
                }
            }

            pending.retain(|&index| {
                let condition = &rule.conditions[index];
                if condition.tag != field.tag || condition.code != subfield.code {
                    return true;
                }
                match condition_match(condition, record, field_index, subfield_index) {
                    Some(found) => {
                        trigger = Some(found);
                        false
                    }
                    None => true,
                }
            });
        }
    }

    pending.is_empty().then_some(ScanOutcome { target, remaining, trigger })
}

/// Match one condition against one subfield value, collecting the capture
/// groups of the first match and the `{@}` concatenation.
fn condition_match(
    condition: &Condition,
    record: &Record,
    field_index: usize,
    subfield_index: usize,
) -> Option<TriggerMatch> {
    let value = &record.fields[field_index].subfields[subfield_index].value;
    let captures = condition.pattern.captures(value)?;

    let groups = captures
        .iter()
        .map(|group| group.map(|m| m.as_str().to_string()))
        .collect();

    let mut all_matches = String::new();
    for found in condition.pattern.find_iter(value) {
        all_matches.push_str(found.as_str());
    }
    // Multi-valued fields: keep searching forward through later repetitions
    // of the same subfield.
    for (later_field_index, field) in record.fields.iter().enumerate() {
        if field.tag != condition.tag {
            continue;
        }
        for (later_subfield_index, subfield) in field.subfields.iter().enumerate() {
            if (later_field_index, later_subfield_index) <= (field_index, subfield_index)
                || subfield.code != condition.code
            {
                continue;
            }
            for found in condition.pattern.find_iter(&subfield.value) {
                all_matches.push_str(found.as_str());
            }
        }
    }

    Some(TriggerMatch { all_matches, groups })
}

/// Rewrite one subfield value according to the rule's mode.
fn rewrite(subfield: &mut Subfield, mode: RewriteMode, filled: &str) {
    match mode {
        RewriteMode::Replace => subfield.value = filled.to_string(),
        RewriteMode::Prepend => subfield.value = format!("{filled}{}", subfield.value),
        RewriteMode::Append => subfield.value.push_str(filled),
        RewriteMode::UnescapeXml => {
            subfield.value = match unescape(filled) {
                Ok(decoded) => decoded.into_owned(),
                Err(e) => {
                    warn!(%e, "entity decoding failed, keeping template verbatim");
                    filled.to_string()
                }
            };
        }
    }
}

/// Expand `{@}` and `{n}` placeholders. Anything else between braces is kept
/// literally. A `{n}` naming a group the trigger match does not have is a
/// configuration error.
fn fill_template(
    template: &str,
    trigger: Option<&TriggerMatch>,
) -> Result<String, BeautifyError> {
    let mut out = String::new();
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return Ok(out);
        };
        let token = &after[..close];
        if token == "@" {
            if let Some(trigger) = trigger {
                out.push_str(&trigger.all_matches);
            }
        } else if let Ok(group) = token.parse::<usize>() {
            match trigger.and_then(|t| t.groups.get(group)).and_then(|g| g.as_ref()) {
                Some(value) => out.push_str(value),
                None => {
                    return Err(BeautifyError::MissingGroup {
                        template: template.to_string(),
                        group,
                    });
                }
            }
        } else {
            out.push('{');
            out.push_str(token);
            out.push('}');
        }
        rest = &after[close + 1..];
    }

    out.push_str(rest);
    Ok(out)
}
