//! Identity and wire configuration of one remote catalogue.
//!
//! A [`Catalogue`] is plain configuration: where the OPAC lives, which
//! database number to address, which character set to request, and how the
//! raw hit text separates its field lines. It also owns the request-URL
//! assembly, since every URL segment below is part of the catalogue's wire
//! surface and of nothing else.

use crate::record::FieldSeparator;

/// Default request character set. Most PICA installations still speak
/// Latin-1 on the XML interface.
pub const DEFAULT_CHARSET: &str = "iso-8859-1";

const DATABASE_SEGMENT: &str = "/DB=";
const SEARCH_FORMAT_SEGMENT: &str = "/XML=1.0/CHARSET=";
const SHOW_FORMAT_SEGMENT: &str = "/XML=1.0/PRS=PP%7F/CHARSET=";
const SET_SEGMENT: &str = "/SET=";
const SESSION_SEGMENT: &str = "/SID=";
const SEARCH_COMMAND: &str = "/CMD?ACT=SRCHM&";
const SORT_BY_YEAR: &str = "SRT=YOP";
const SHOW_COMMAND: &str = "/SHW?FRST=";

/// One remote catalogue endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalogue {
    /// Display name, not part of any URL.
    pub title: String,
    /// `http` or `https`.
    pub scheme: String,
    pub host: String,
    pub port: u16,
    /// The PICA database number, e.g. `"1"`.
    pub database: String,
    /// Character set requested from the server.
    pub charset: String,
    /// Opaque installation-specific query suffix, appended verbatim to
    /// every request URL. Often empty.
    pub suffix: String,
    /// Field-line separator of this catalogue's raw hit text; `None` means
    /// detect per hit.
    pub separator: Option<FieldSeparator>,
}

impl Catalogue {
    /// A catalogue with the default charset, empty suffix and per-hit
    /// separator detection.
    pub fn new(title: &str, scheme: &str, host: &str, port: u16, database: &str) -> Self {
        Catalogue {
            title: title.to_string(),
            scheme: scheme.to_string(),
            host: host.to_string(),
            port,
            database: database.to_string(),
            charset: DEFAULT_CHARSET.to_string(),
            suffix: String::new(),
            separator: None,
        }
    }

    fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }

    /// The URL of a search request for the given rendered clause parameters.
    ///
    /// Sort order is fixed to year of publishing.
    pub fn search_url(&self, query_params: &str) -> String {
        format!(
            "{}{DATABASE_SEGMENT}{}{SEARCH_FORMAT_SEGMENT}{}{SEARCH_COMMAND}{SORT_BY_YEAR}{}{}",
            self.base_url(),
            self.database,
            self.charset,
            query_params,
            self.suffix
        )
    }

    /// The URL showing one hit of an open result set. `index` is zero-based;
    /// the wire protocol counts from one.
    pub fn show_url(&self, session_id: &str, result_set: &str, index: u32) -> String {
        format!(
            "{}{DATABASE_SEGMENT}{}{SHOW_FORMAT_SEGMENT}{}{SET_SEGMENT}{}{SESSION_SEGMENT}{}{SHOW_COMMAND}{}{}",
            self.base_url(),
            self.database,
            self.charset,
            result_set,
            session_id,
            index + 1,
            self.suffix
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalogue() -> Catalogue {
        Catalogue::new("GVK", "http", "opac.example.org", 8080, "1")
    }

    #[test]
    fn search_url_layout() {
        assert_eq!(
            catalogue().search_url("&ACT=SRCHA&IKT=4&TRM=physik"),
            "http://opac.example.org:8080/DB=1/XML=1.0/CHARSET=iso-8859-1\
             /CMD?ACT=SRCHM&SRT=YOP&ACT=SRCHA&IKT=4&TRM=physik"
        );
    }

    #[test]
    fn show_url_counts_from_one() {
        let url = catalogue().show_url("IP@12-34", "2", 0);
        assert_eq!(
            url,
            "http://opac.example.org:8080/DB=1/XML=1.0/PRS=PP%7F/CHARSET=iso-8859-1\
             /SET=2/SID=IP@12-34/SHW?FRST=1"
        );
    }

    #[test]
    fn suffix_is_appended_verbatim() {
        let mut cat = catalogue();
        cat.suffix = "&COOKIE=U998".to_string();
        assert!(cat.search_url("").ends_with("SRT=YOP&COOKIE=U998"));
        assert!(cat.show_url("s", "1", 4).ends_with("FRST=5&COOKIE=U998"));
    }
}
