//! Search queries and server-issued search handles.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::proxy::ProxyConfig;
use crate::session::SessionTokens;
use crate::Result;

/// A registry search with its parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    /// The search terms.
    pub query: String,
    /// Records per page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Maximum records to collect; 0 means all.
    #[serde(default)]
    pub limit: usize,
}

fn default_page_size() -> u32 {
    100
}

impl SearchQuery {
    /// Creates a query with default paging.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            page_size: default_page_size(),
            limit: 0,
        }
    }

    /// Sets the page size.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Sets the maximum number of records to collect.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// A server-issued handle binding a query to a result set.
///
/// The registry generates the `search_id` as a side effect of the quick-search
/// interaction and keys the result set by it independently of the session;
/// read-only once issued, it is the pagination key for every page and detail
/// lookup that follows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHandle {
    /// Server-issued search identifier.
    pub search_id: String,
    /// Result count the server reported when the search was issued.
    pub total_results: u64,
    /// The originating query terms.
    pub query: String,
}

impl SearchHandle {
    /// Creates a handle from the server's quick-search answer.
    pub fn new(search_id: impl Into<String>, total_results: u64, query: impl Into<String>) -> Self {
        Self {
            search_id: search_id.into(),
            total_results,
            query: query.into(),
        }
    }
}

/// Trait for the privileged search-issuance collaborator.
///
/// Quick search is the one operation that must run inside the interactive
/// session context rather than as a bare request, because the server mints
/// the search identifier as a result of a rendered interaction. Everything
/// downstream (pages, details) goes over the plain fetch layer.
#[async_trait]
pub trait SearchIssuer: Send + Sync {
    /// Issues a search and returns its handle.
    async fn quick_search(
        &self,
        session: &SessionTokens,
        proxy: Option<&ProxyConfig>,
        query: &SearchQuery,
    ) -> Result<SearchHandle>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_query_new() {
        let query = SearchQuery::new("acme corp");
        assert_eq!(query.query, "acme corp");
        assert_eq!(query.page_size, 100);
        assert_eq!(query.limit, 0);
    }

    #[test]
    fn test_search_query_builder_chain() {
        let query = SearchQuery::new("acme corp")
            .with_page_size(25)
            .with_limit(80);
        assert_eq!(query.page_size, 25);
        assert_eq!(query.limit, 80);
    }

    #[test]
    fn test_search_query_deserialization_defaults() {
        let query: SearchQuery = serde_json::from_str(r#"{"query":"acme"}"#).unwrap();
        assert_eq!(query.page_size, 100);
        assert_eq!(query.limit, 0);
    }

    #[test]
    fn test_search_handle_new() {
        let handle = SearchHandle::new("srch-42", 250, "acme corp");
        assert_eq!(handle.search_id, "srch-42");
        assert_eq!(handle.total_results, 250);
        assert_eq!(handle.query, "acme corp");
    }

    #[test]
    fn test_search_handle_serialization() {
        let handle = SearchHandle::new("srch-42", 250, "acme corp");
        let json = serde_json::to_string(&handle).unwrap();
        assert!(json.contains("\"search_id\":\"srch-42\""));
        assert!(json.contains("\"total_results\":250"));
    }
}
