//! Registry records and the query report surface.
//!
//! Records pass through as structured JSON; field-level mapping into a
//! downstream schema is a separate, stateless concern and lives outside this
//! crate.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::RequestError;

/// One raw registry record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    /// Registry-assigned record identifier.
    #[serde(default)]
    pub id: String,
    /// Remaining record fields, passed through untouched.
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl Record {
    /// Creates a record with the given id and no extra fields.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: serde_json::Map::new(),
        }
    }
}

/// One page of search results from the page endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse {
    /// Records on this page.
    #[serde(default)]
    pub records: Vec<Record>,
    /// Server-reported total for the whole result set.
    #[serde(default)]
    pub total_results: u64,
}

/// Metadata about an executed query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchMetadata {
    /// The query terms.
    pub query: String,
    /// Unix epoch milliseconds when execution started.
    pub executed_at_ms: u64,
    /// Server-issued search identifier.
    pub search_id: String,
    /// Server-reported total result count.
    pub total_results: u64,
}

/// Timing figures for an executed query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Performance {
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Average milliseconds per collected record.
    pub avg_per_result_ms: f64,
}

impl Performance {
    /// Computes figures from a duration and a record count.
    pub fn from_duration(duration_ms: u64, result_count: usize) -> Self {
        let avg_per_result_ms = if result_count == 0 {
            0.0
        } else {
            duration_ms as f64 / result_count as f64
        };
        Self {
            duration_ms,
            avg_per_result_ms,
        }
    }
}

/// The full result of one query: metadata, records and timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchReport {
    /// Query metadata.
    pub metadata: SearchMetadata,
    /// Collected records, in page order.
    pub results: Vec<Record>,
    /// Timing figures.
    pub performance: Performance,
}

impl SearchReport {
    /// Builds a report for a query executed over `duration_ms`.
    pub fn new(
        query: impl Into<String>,
        search_id: impl Into<String>,
        total_results: u64,
        results: Vec<Record>,
        executed_at: SystemTime,
        duration_ms: u64,
    ) -> Self {
        let executed_at_ms = executed_at
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        let performance = Performance::from_duration(duration_ms, results.len());
        Self {
            metadata: SearchMetadata {
                query: query.into(),
                executed_at_ms,
                search_id: search_id.into(),
                total_results,
            },
            results,
            performance,
        }
    }
}

/// Outcome of one logical query through the recovery layer.
///
/// Long batch operations never discard progress: a failure after some pages
/// were collected surfaces as `Partial`, carrying both the records gathered
/// so far and the terminal error.
#[derive(Debug)]
pub enum QueryOutcome {
    /// The full result set was collected.
    Complete(SearchReport),
    /// Some records were collected before a terminal failure.
    Partial(SearchReport, RequestError),
    /// Nothing was collected.
    Failed(RequestError),
}

impl QueryOutcome {
    /// Returns the report when any records were produced.
    pub fn report(&self) -> Option<&SearchReport> {
        match self {
            QueryOutcome::Complete(report) | QueryOutcome::Partial(report, _) => Some(report),
            QueryOutcome::Failed(_) => None,
        }
    }

    /// Returns the terminal error, if any.
    pub fn error(&self) -> Option<&RequestError> {
        match self {
            QueryOutcome::Complete(_) => None,
            QueryOutcome::Partial(_, err) | QueryOutcome::Failed(err) => Some(err),
        }
    }

    /// Whether the full result set was collected.
    pub fn is_complete(&self) -> bool {
        matches!(self, QueryOutcome::Complete(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_deserializes_extra_fields() {
        let record: Record =
            serde_json::from_str(r#"{"id":"r1","name":"Acme","status":"active"}"#).unwrap();
        assert_eq!(record.id, "r1");
        assert_eq!(record.fields["name"], "Acme");
        assert_eq!(record.fields["status"], "active");
    }

    #[test]
    fn test_record_missing_id_defaults_empty() {
        let record: Record = serde_json::from_str(r#"{"name":"Acme"}"#).unwrap();
        assert_eq!(record.id, "");
    }

    #[test]
    fn test_page_response_deserialization() {
        let page: PageResponse = serde_json::from_str(
            r#"{"records":[{"id":"r1"},{"id":"r2"}],"totalResults":250}"#,
        )
        .unwrap();
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.total_results, 250);
    }

    #[test]
    fn test_page_response_defaults() {
        let page: PageResponse = serde_json::from_str("{}").unwrap();
        assert!(page.records.is_empty());
        assert_eq!(page.total_results, 0);
    }

    #[test]
    fn test_performance_avg() {
        let perf = Performance::from_duration(1000, 4);
        assert_eq!(perf.duration_ms, 1000);
        assert_eq!(perf.avg_per_result_ms, 250.0);
    }

    #[test]
    fn test_performance_avg_zero_results() {
        let perf = Performance::from_duration(1000, 0);
        assert_eq!(perf.avg_per_result_ms, 0.0);
    }

    #[test]
    fn test_search_report_new() {
        let report = SearchReport::new(
            "acme corp",
            "srch-42",
            250,
            vec![Record::new("r1"), Record::new("r2")],
            SystemTime::now(),
            500,
        );
        assert_eq!(report.metadata.query, "acme corp");
        assert_eq!(report.metadata.search_id, "srch-42");
        assert_eq!(report.metadata.total_results, 250);
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.performance.avg_per_result_ms, 250.0);
        assert!(report.metadata.executed_at_ms > 0);
    }

    #[test]
    fn test_query_outcome_accessors() {
        let report = SearchReport::new("q", "s", 0, vec![], SystemTime::now(), 1);
        let complete = QueryOutcome::Complete(report);
        assert!(complete.is_complete());
        assert!(complete.report().is_some());
        assert!(complete.error().is_none());

        let err = RequestError::from_status(403, "https://registry.example", None);
        let failed = QueryOutcome::Failed(err);
        assert!(!failed.is_complete());
        assert!(failed.report().is_none());
        assert!(failed.error().is_some());
    }

    #[test]
    fn test_query_outcome_partial_keeps_both() {
        let report = SearchReport::new(
            "q",
            "s",
            10,
            vec![Record::new("r1")],
            SystemTime::now(),
            100,
        );
        let err = RequestError::from_status(429, "https://registry.example", Some(5));
        let partial = QueryOutcome::Partial(report, err);
        assert_eq!(partial.report().unwrap().results.len(), 1);
        assert_eq!(partial.error().unwrap().kind, crate::ErrorKind::RateLimited);
    }

    #[test]
    fn test_search_report_serialization() {
        let report = SearchReport::new("q", "s", 1, vec![Record::new("r1")], SystemTime::now(), 10);
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"metadata\""));
        assert!(json.contains("\"performance\""));
        assert!(json.contains("\"duration_ms\":10"));
    }
}
