//! Stateful, windowed retrieval against one catalogue.
//!
//! A [`RetrievalSession`] owns everything one caller needs: the catalogue
//! configuration, the beautifier rule set, the transport, and at most one
//! cached search. Sessions are never shared; two sessions against the same
//! catalogue are fully independent.
//!
//! The cache key is a [`QuerySignature`] — the rendered query parameters
//! plus every catalogue component that shapes the request URL. Repeating a
//! search with the same signature reuses the open server-side result set
//! without touching the network; any change invalidates the cache.

pub mod transport;

use tracing::debug;

use crate::beautify::{self, RuleSet};
use crate::catalogue::Catalogue;
use crate::error::OpacError;
use crate::protocol::{parse_response, SearchResponse, ShortTitle};
use crate::query::CompiledQuery;
use crate::record::{decode, FieldSeparator, Record};

pub use transport::{HttpTransport, RetrievalError, Transport};

/// Everything that, when changed, must force a fresh search.
#[derive(Debug, Clone, PartialEq, Eq)]
struct QuerySignature {
    query_params: String,
    charset: String,
    host: String,
    port: u16,
    database: String,
    suffix: String,
}

impl QuerySignature {
    fn new(query: &CompiledQuery, catalogue: &Catalogue) -> Self {
        QuerySignature {
            query_params: query.to_url_params(),
            charset: catalogue.charset.clone(),
            host: catalogue.host.clone(),
            port: catalogue.port,
            database: catalogue.database.clone(),
            suffix: catalogue.suffix.clone(),
        }
    }
}

/// One caller's retrieval state against one catalogue.
pub struct RetrievalSession<T: Transport> {
    catalogue: Catalogue,
    rules: RuleSet,
    transport: T,
    cached: Option<(QuerySignature, SearchResponse)>,
}

impl RetrievalSession<HttpTransport> {
    /// A session over the production HTTP transport.
    pub fn new(catalogue: Catalogue, rules: RuleSet) -> Self {
        Self::with_transport(catalogue, rules, HttpTransport)
    }
}

impl<T: Transport> RetrievalSession<T> {
    pub fn with_transport(catalogue: Catalogue, rules: RuleSet, transport: T) -> Self {
        RetrievalSession {
            catalogue,
            rules,
            transport,
            cached: None,
        }
    }

    pub fn catalogue(&self) -> &Catalogue {
        &self.catalogue
    }

    /// Run a search and return the hit count.
    ///
    /// The timeout applies to the single search request. A repeated search
    /// with an unchanged signature answers from the cache without a request.
    pub fn search(&mut self, text: &str, timeout_millis: u64) -> Result<u32, OpacError> {
        let query = CompiledQuery::compile(text)?;
        self.search_compiled(&query, timeout_millis)
    }

    /// [`search`](Self::search) for an already-compiled query.
    pub fn search_compiled(
        &mut self,
        query: &CompiledQuery,
        timeout_millis: u64,
    ) -> Result<u32, OpacError> {
        let signature = QuerySignature::new(query, &self.catalogue);
        if let Some((cached_signature, response)) = &self.cached {
            if *cached_signature == signature {
                debug!(hits = response.session.hit_count, "search answered from cache");
                return Ok(response.session.hit_count);
            }
        }

        let url = self.catalogue.search_url(&signature.query_params);
        let body = self.transport.get(&url, timeout_millis)?;
        let response = parse_response(&body)?;
        debug!(
            catalogue = %self.catalogue.title,
            hits = response.session.hit_count,
            "search opened result set"
        );
        let hits = response.session.hit_count;
        self.cached = Some((signature, response));
        Ok(hits)
    }

    /// The short-title hit list of the current cached search, if any.
    pub fn short_titles(&self) -> &[ShortTitle] {
        match &self.cached {
            Some((_, response)) => &response.hits,
            None => &[],
        }
    }

    /// Retrieve the decoded, beautified records of the window
    /// `[start, end)` of the search's hit list, zero-based.
    ///
    /// `end` is clamped to the hit count; `None` means all remaining hits.
    /// The timeout applies to each request individually, not to the window
    /// as a whole. The first failing request aborts the whole call; no
    /// partial windows are returned.
    pub fn fetch(
        &mut self,
        text: &str,
        start: u32,
        end: Option<u32>,
        timeout_millis: u64,
    ) -> Result<Vec<Record>, OpacError> {
        let query = CompiledQuery::compile(text)?;
        self.fetch_compiled(&query, start, end, timeout_millis)
    }

    /// [`fetch`](Self::fetch) for an already-compiled query.
    pub fn fetch_compiled(
        &mut self,
        query: &CompiledQuery,
        start: u32,
        end: Option<u32>,
        timeout_millis: u64,
    ) -> Result<Vec<Record>, OpacError> {
        let hits = self.search_compiled(query, timeout_millis)?;
        let end = end.unwrap_or(hits).min(hits);

        let (session_id, result_set) = match &self.cached {
            Some((_, response)) => (
                response.session.session_id.clone(),
                response.session.result_set.clone(),
            ),
            None => (String::new(), String::new()),
        };

        let mut records = Vec::new();
        for index in start..end {
            let url = self.catalogue.show_url(&session_id, &result_set, index);
            let body = self.transport.get(&url, timeout_millis)?;
            let separator = match &self.catalogue.separator {
                Some(separator) => separator.clone(),
                None => FieldSeparator::detect(&body),
            };
            let mut record = decode(&body, &separator);
            beautify::apply(self.rules.rules(), &mut record);
            records.push(record);
        }
        Ok(records)
    }

    /// The first `limit` hits of a search.
    pub fn fetch_first(
        &mut self,
        text: &str,
        limit: u32,
        timeout_millis: u64,
    ) -> Result<Vec<Record>, OpacError> {
        self.fetch(text, 0, Some(limit), timeout_millis)
    }
}
