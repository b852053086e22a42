// Bluesky: the external post source.
//
// `source` defines what the ingestion cycle needs from any search backend;
// `client` and `search` implement it against the AT Protocol XRPC API.

pub mod client;
pub mod search;
pub mod source;

pub use client::BlueskyClient;
pub use source::{PostSource, SearchQuery, SearchWindow, SourcePost};
