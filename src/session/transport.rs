//! The one seam to the network.
//!
//! Everything the session layer asks of the outside world goes through the
//! [`Transport`] trait: one blocking GET with a per-request timeout,
//! returning the response body as text. [`HttpTransport`] is the `ureq`
//! implementation used in production; tests substitute a scripted mock.

use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

/// Errors from the transport layer. Never retried by this crate.
#[derive(Debug, Error, Diagnostic)]
pub enum RetrievalError {
    #[error("request to {url} failed: {message}")]
    #[diagnostic(
        code(opac::retrieval::transport),
        help(
            "The catalogue could not be reached or answered with an HTTP \
             error. Check the configured scheme, host, port and database."
        )
    )]
    Transport { url: String, message: String },

    #[error("request to {url} timed out after {timeout_millis} ms")]
    #[diagnostic(
        code(opac::retrieval::timeout),
        help(
            "The timeout applies to each request individually. Raise it, or \
             check whether the catalogue is under load."
        )
    )]
    Timeout { url: String, timeout_millis: u64 },
}

/// One blocking HTTP GET. Implementations must honor the timeout per
/// request, not cumulatively.
pub trait Transport {
    fn get(&self, url: &str, timeout_millis: u64) -> Result<String, RetrievalError>;
}

/// The production transport: a blocking `ureq` client, one agent per call
/// so the timeout is exactly the caller's.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpTransport;

impl Transport for HttpTransport {
    fn get(&self, url: &str, timeout_millis: u64) -> Result<String, RetrievalError> {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(timeout_millis))
            .build();

        match agent.get(url).call() {
            Ok(response) => response.into_string().map_err(|e| RetrievalError::Transport {
                url: url.to_string(),
                message: format!("failed to read body: {e}"),
            }),
            Err(ureq::Error::Status(code, _)) => Err(RetrievalError::Transport {
                url: url.to_string(),
                message: format!("HTTP status {code}"),
            }),
            Err(ureq::Error::Transport(transport)) => {
                if is_timeout(&transport) {
                    Err(RetrievalError::Timeout {
                        url: url.to_string(),
                        timeout_millis,
                    })
                } else {
                    Err(RetrievalError::Transport {
                        url: url.to_string(),
                        message: transport.to_string(),
                    })
                }
            }
        }
    }
}

/// Whether a transport failure was the per-request timeout elapsing.
fn is_timeout(transport: &ureq::Transport) -> bool {
    let mut source = std::error::Error::source(transport);
    while let Some(error) = source {
        if let Some(io) = error.downcast_ref::<std::io::Error>() {
            return matches!(
                io.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            );
        }
        source = error.source();
    }
    false
}
