//! # pica-opac
//!
//! A retrieval client for PICA-flavoured library catalogues (OPAC web
//! interfaces): a compiler for a small search-query language, a windowed
//! session-caching retrieval layer, an event-driven response parser, and a
//! declarative "beautifier" rule engine normalizing the records different
//! catalogues return.
//!
//! ## Architecture
//!
//! - **Query compiler** (`query`): `field:term` expressions → indexed URL
//!   search parameters
//! - **Record model** (`record`): `Record`/`Field`/`Subfield` plus the
//!   best-effort raw-hit decoder
//! - **Response parser** (`protocol`): one forward pass over the search
//!   response's XML events
//! - **Beautifier** (`beautify`): TOML-configured conditional rewrites of
//!   decoded records
//! - **Session** (`session`): windowed retrieval with query-signature
//!   caching over a pluggable blocking transport
//!
//! ## Library usage
//!
//! ```no_run
//! use pica_opac::beautify::RuleSet;
//! use pica_opac::catalogue::Catalogue;
//! use pica_opac::session::RetrievalSession;
//!
//! let catalogue = Catalogue::new("GVK", "https", "opac.example.org", 443, "1");
//! let mut session = RetrievalSession::new(catalogue, RuleSet::empty());
//! let hits = session.search("4:physik", 10_000).unwrap();
//! let records = session.fetch_first("4:physik", hits.min(10), 10_000).unwrap();
//! ```

pub mod beautify;
pub mod catalogue;
pub mod error;
pub mod protocol;
pub mod query;
pub mod record;
pub mod session;

pub use error::{OpacError, OpacResult};
