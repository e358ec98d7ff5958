// scoutchat Engine — Tools service
//
// Network side of the three tools. Everything here is model-free: the chat
// dispatcher validates arguments, asks the model for query variants and
// result picks, and calls into this service for the fetches.
//
//   web_search      → search.rs   (DuckDuckGo HTML / Bing, via proxies)
//   read_url        → read.rs     (page → readable text → char window)
//   instant_answer  → instant.rs  (DuckDuckGo instant-answer JSON)

pub mod instant;
pub mod read;
pub mod search;

pub use instant::InstantAnswer;
pub use search::SearchEngine;

use crate::atoms::traits::HttpFetch;
use crate::engine::proxy::ProxyPool;
use std::sync::Arc;
use std::time::Duration;

pub struct ToolsService {
    fetcher: Arc<dyn HttpFetch>,
    proxies: ProxyPool,
    search_timeout: Duration,
    request_timeout: Duration,
}

impl ToolsService {
    pub fn new(
        fetcher: Arc<dyn HttpFetch>,
        proxies: ProxyPool,
        search_timeout: Duration,
        request_timeout: Duration,
    ) -> Self {
        ToolsService { fetcher, proxies, search_timeout, request_timeout }
    }

    pub fn proxies(&self) -> &ProxyPool {
        &self.proxies
    }
}
