//! Network access for cache misses and bulk fetches.
//!
//! `Fetcher` is the capability the rest of the crate fetches through;
//! `HttpFetcher` implements it over reqwest. A fetcher reports transport
//! failures as errors and hands back every HTTP status as a response.

pub mod client;

use async_trait::async_trait;

use crate::error::CacheResult;
use crate::request::{Request, Response};

pub use client::HttpFetcher;

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> CacheResult<Response>;
}
