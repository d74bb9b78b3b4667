//! Client Module
//!
//! The fetch path: request options, the transport seam, request coalescing,
//! and the [`HttpCache`] facade tying them to the cache store.

pub mod coalescer;
mod http_cache;
mod request;
mod transport;

pub use coalescer::{Flight, InFlightQueue, SharedFetch};
pub use http_cache::{HttpCache, HttpCacheBuilder, SharedStore};
pub use request::{FetchOptions, ResponseBody};
pub use transport::{ReqwestTransport, Transport, TransportRequest, TransportResponse};
