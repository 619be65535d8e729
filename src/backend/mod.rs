//! Clients for the local web backend: session tokens and search endpoints.

pub mod http;
#[cfg(feature = "search")]
pub mod search;
pub mod token;

#[cfg(feature = "search")]
pub use search::{AnswerResponse, SearchApp, SearchClient, SearchResponse};
pub use token::TokenFetcher;
