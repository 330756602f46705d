//! HTTP access for package sources
//!
//! - [`HttpTransport`]: the pluggable request sender (default: reqwest)
//! - [`DataClient`]: conditional JSON fetches with retry and a URI-keyed cache
//! - [`HttpHandlerResource`]: both of the above, bound to one source

mod client;
mod handler;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{
    CacheEntry, DataClient, FetchError, FetchFailure, FetchedDocument, Freshness, cache_key,
};
pub use handler::HttpHandlerResource;
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError};
