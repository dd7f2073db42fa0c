//! Event-driven parser for the catalogue's search response.
//!
//! One forward pass over the XML event stream, no random access and no
//! backtracking. The response vocabulary is small: a `RESULT` element whose
//! `error` attribute signals a server-side rejection, `SESSIONVAR` elements
//! named `SID`/`SET`/`COOKIE` carrying the session tokens, a `SET` element
//! whose `hits` attribute carries the hit count, and `SHORTTITLE` elements
//! listing the hits with their catalogue identifiers.
//!
//! The upstream protocol is known to double-escape `&`, quotes and angle
//! brackets; [`normalize_entities`] folds those back to single-escaped form
//! before the parse.

use miette::Diagnostic;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

/// How much of the raw response to keep in error values for diagnosis.
const FRAGMENT_LEN: usize = 160;

/// Errors produced by the response parser. Caused by an unexpected or
/// erroneous catalogue response; never retried automatically.
#[derive(Debug, Error, Diagnostic)]
pub enum ProtocolError {
    #[error("catalogue rejected the search: {flag}")]
    #[diagnostic(
        code(opac::protocol::rejected),
        help(
            "The catalogue flagged the query as illegal on the server side. \
             This usually means an unknown search key for this catalogue. \
             Response fragment: {fragment}"
        )
    )]
    Rejected { flag: String, fragment: String },

    #[error("malformed hit count: {value:?}")]
    #[diagnostic(
        code(opac::protocol::malformed_hit_count),
        help(
            "The result-set element carried no parseable hits attribute. \
             The catalogue response format may have changed."
        )
    )]
    MalformedHitCount { value: String },

    #[error("malformed response: {message}")]
    #[diagnostic(
        code(opac::protocol::malformed_xml),
        help(
            "The response could not be read as XML. Check that the configured \
             address really is a PICA OPAC endpoint. Response fragment: {fragment}"
        )
    )]
    MalformedXml { message: String, fragment: String },
}

/// Session tokens and hit count extracted from one search response.
///
/// Owned by exactly one retrieval session; never shared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub session_id: String,
    pub result_set: String,
    pub cookie: Option<String>,
    pub hit_count: u32,
}

/// One entry of the short-title hit list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortTitle {
    /// The catalogue identifier of the hit (the `PPN` attribute).
    pub id: String,
    pub title: String,
}

/// Everything a search response yields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResponse {
    pub session: SessionState,
    pub hits: Vec<ShortTitle>,
}

/// Which session variable is currently being read.
enum SessionVar {
    Sid,
    Set,
    Cookie,
}

/// Parse one search response body into a [`SearchResponse`].
pub fn parse_response(body: &str) -> Result<SearchResponse, ProtocolError> {
    let body = normalize_entities(body);

    let mut reader = Reader::from_str(&body);
    // Real-world OPAC output is not always well-formed; tag-name pairing is
    // checked loosely so a stray end tag does not kill the whole parse.
    reader.config_mut().check_end_names = false;

    let mut response = SearchResponse::default();
    let mut current_var: Option<SessionVar> = None;
    let mut current_hit: Option<ShortTitle> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref element)) | Ok(Event::Empty(ref element)) => {
                match element.name().as_ref() {
                    b"RESULT" => check_rejection(element, &body)?,
                    b"SESSIONVAR" => {
                        current_var = match attribute(element, "name").as_deref() {
                            Some("SID") => Some(SessionVar::Sid),
                            Some("SET") => Some(SessionVar::Set),
                            Some("COOKIE") => Some(SessionVar::Cookie),
                            _ => None,
                        };
                    }
                    b"SET" => {
                        let value = attribute(element, "hits").unwrap_or_default();
                        response.session.hit_count = value
                            .parse()
                            .map_err(|_| ProtocolError::MalformedHitCount { value })?;
                    }
                    b"SHORTTITLE" => {
                        current_hit = Some(ShortTitle {
                            id: attribute(element, "PPN").unwrap_or_default(),
                            title: String::new(),
                        });
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(ref text)) => {
                let chunk = text
                    .unescape()
                    .map_err(|e| malformed(&e.to_string(), &body))?;
                if let Some(hit) = current_hit.as_mut() {
                    hit.title.push_str(&chunk);
                } else if let Some(var) = &current_var {
                    match var {
                        SessionVar::Sid => response.session.session_id.push_str(&chunk),
                        SessionVar::Set => response.session.result_set.push_str(&chunk),
                        SessionVar::Cookie => {
                            response.session.cookie.get_or_insert_with(String::new).push_str(&chunk);
                        }
                    }
                }
            }
            Ok(Event::End(ref element)) => match element.name().as_ref() {
                b"SESSIONVAR" => current_var = None,
                b"SHORTTITLE" => {
                    if let Some(mut hit) = current_hit.take() {
                        hit.title = hit.title.trim().to_string();
                        response.hits.push(hit);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(malformed(&e.to_string(), &body)),
        }
    }

    Ok(response)
}

/// Fold the protocol's double-escaped entities back to single-escaped form.
pub fn normalize_entities(body: &str) -> String {
    body.replace("&amp;amp;", "&amp;")
        .replace("&amp;quot;", "&quot;")
        .replace("&amp;lt;", "&lt;")
        .replace("&amp;gt;", "&gt;")
}

/// Fail when the result element carries the server-side error flag.
fn check_rejection(element: &BytesStart<'_>, body: &str) -> Result<(), ProtocolError> {
    match attribute(element, "error") {
        Some(flag) => Err(ProtocolError::Rejected {
            flag,
            fragment: fragment(body),
        }),
        None => Ok(()),
    }
}

/// Read one attribute as an owned string, tolerating absence and bad escapes.
fn attribute(element: &BytesStart<'_>, name: &str) -> Option<String> {
    let attr = element.try_get_attribute(name).ok()??;
    attr.unescape_value().ok().map(|v| v.into_owned())
}

fn malformed(message: &str, body: &str) -> ProtocolError {
    ProtocolError::MalformedXml {
        message: message.to_string(),
        fragment: fragment(body),
    }
}

/// The leading slice of the response kept for diagnostics.
fn fragment(body: &str) -> String {
    let mut end = body.len().min(FRAGMENT_LEN);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = r#"<?xml version="1.0"?>
<RESULT>
  <SESSIONVAR name="SID">IP@1234-56</SESSIONVAR>
  <SESSIONVAR name="SET">2</SESSIONVAR>
  <SESSIONVAR name="COOKIE">U998</SESSIONVAR>
  <SET hits="17">
    <SHORTTITLE PPN="476251875">Annalen der Physik</SHORTTITLE>
    <SHORTTITLE PPN="129072897">Zeitschrift f&#252;r Physik</SHORTTITLE>
  </SET>
</RESULT>"#;

    #[test]
    fn parses_session_and_hits() {
        let response = parse_response(RESPONSE).unwrap();
        assert_eq!(response.session.session_id, "IP@1234-56");
        assert_eq!(response.session.result_set, "2");
        assert_eq!(response.session.cookie.as_deref(), Some("U998"));
        assert_eq!(response.session.hit_count, 17);
        assert_eq!(response.hits.len(), 2);
        assert_eq!(response.hits[0].id, "476251875");
        assert_eq!(response.hits[0].title, "Annalen der Physik");
        assert_eq!(response.hits[1].title, "Zeitschrift für Physik");
    }

    #[test]
    fn rejects_server_side_error_flag() {
        let body = r#"<RESULT error="ILLEGAL"><SET hits="0"/></RESULT>"#;
        let err = parse_response(body).unwrap_err();
        match err {
            ProtocolError::Rejected { flag, fragment } => {
                assert_eq!(flag, "ILLEGAL");
                assert!(fragment.contains("RESULT"));
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[test]
    fn missing_hits_attribute_is_malformed() {
        let body = "<RESULT><SET></SET></RESULT>";
        let err = parse_response(body).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedHitCount { .. }));
    }

    #[test]
    fn non_numeric_hits_attribute_is_malformed() {
        let body = r#"<RESULT><SET hits="lots"/></RESULT>"#;
        let err = parse_response(body).unwrap_err();
        match err {
            ProtocolError::MalformedHitCount { value } => assert_eq!(value, "lots"),
            other => panic!("expected MalformedHitCount, got {other:?}"),
        }
    }

    #[test]
    fn double_escaped_entities_are_normalized() {
        let body = r#"<RESULT><SET hits="1"><SHORTTITLE PPN="1">Larsen &amp;amp; Toubro</SHORTTITLE></SET></RESULT>"#;
        let response = parse_response(body).unwrap();
        assert_eq!(response.hits[0].title, "Larsen & Toubro");
    }

    #[test]
    fn empty_response_yields_defaults() {
        let response = parse_response("<RESULT></RESULT>").unwrap();
        assert_eq!(response.session.hit_count, 0);
        assert!(response.hits.is_empty());
        assert!(response.session.cookie.is_none());
    }

    #[test]
    fn unquoted_hits_attribute_is_malformed_hit_count() {
        let err = parse_response("<RESULT><SET hits=17></SET></RESULT>").unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedHitCount { .. }));
    }

    #[test]
    fn unknown_entity_is_malformed_xml() {
        let body = r#"<RESULT><SESSIONVAR name="SID">a &unknown; b</SESSIONVAR></RESULT>"#;
        let err = parse_response(body).unwrap_err();
        match err {
            ProtocolError::MalformedXml { fragment, .. } => {
                assert!(fragment.starts_with("<RESULT>"));
            }
            other => panic!("expected MalformedXml, got {other:?}"),
        }
    }
}
