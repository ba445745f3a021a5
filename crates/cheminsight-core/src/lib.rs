use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

pub mod aggregate;
pub mod config_file;
pub mod fetch;
pub mod pipeline;
pub mod pool;
pub mod query;
pub mod rate_limit;
pub mod sources;
pub mod synonym;

// Re-export for convenience
pub use query::{QueryLimits, SearchExpression, build_expressions};
pub use rate_limit::{AdaptiveLimiter, RateLimiters};
pub use sources::{ArticleSource, SearchPage, SynonymSource};

/// A single search run's input: compounds to expand, shared gene/keyword
/// terms, and the publication-date window.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub compounds: Vec<String>,
    pub genes: Vec<String>,
    pub keywords: Vec<String>,
    pub date_from: u16,
    pub date_to: u16,
}

/// One compound expanded into its search terms, plus the shared clauses.
///
/// `synonyms` excludes the original name, is deduplicated case-insensitively
/// and preserves the upstream popularity ranking.
#[derive(Debug, Clone)]
pub struct CompoundQuery {
    pub original_name: String,
    pub synonyms: Vec<String>,
    pub genes: Vec<String>,
    pub keywords: Vec<String>,
    pub date_from: u16,
    pub date_to: u16,
}

impl CompoundQuery {
    /// Build a validated query. Fails on an empty compound name or an
    /// inverted date range; truncates `synonyms` to `max_synonyms`.
    pub fn new(
        original_name: &str,
        synonyms: Vec<String>,
        genes: Vec<String>,
        keywords: Vec<String>,
        date_from: u16,
        date_to: u16,
        max_synonyms: usize,
    ) -> Result<Self, SearchError> {
        let original_name = original_name.trim().to_string();
        if original_name.is_empty() {
            return Err(SearchError::Validation("empty compound name".into()));
        }
        if date_from > date_to {
            return Err(SearchError::Validation(format!(
                "inverted date range: {date_from} > {date_to}"
            )));
        }
        let mut synonyms = synonyms;
        synonyms.truncate(max_synonyms);
        Ok(Self {
            original_name,
            synonyms,
            genes,
            keywords,
            date_from,
            date_to,
        })
    }

    /// All compound terms in rank order: the original name first, then the
    /// synonyms.
    pub fn terms(&self) -> Vec<String> {
        let mut terms = Vec::with_capacity(1 + self.synonyms.len());
        terms.push(self.original_name.clone());
        terms.extend(self.synonyms.iter().cloned());
        terms
    }
}

/// A normalized article from the bibliographic API.
///
/// `pmid` is the identity key: the same article fetched through different
/// synonym queries merges into one record with the union of `source_terms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub pmid: String,
    pub title: String,
    pub authors: Vec<String>,
    pub journal: String,
    pub year: Option<i32>,
    pub abstract_text: Option<String>,
    pub url: String,
    pub source_terms: BTreeSet<String>,
}

/// Outcome status for one compound's pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompoundStatus {
    Success,
    Partial,
    Failed,
}

/// Result of one compound's pipeline: deduplicated articles plus a status
/// and, for partial/failed outcomes, a human-readable reason.
#[derive(Debug, Clone, Serialize)]
pub struct CompoundOutcome {
    pub compound: String,
    pub synonyms_used: Vec<String>,
    pub status: CompoundStatus,
    pub reason: Option<String>,
    pub articles: Vec<ArticleRecord>,
    /// Expressions that exhausted their retries (other expressions of the
    /// same compound still contributed results).
    pub failed_expressions: Vec<String>,
}

/// The full result set of a run: per-compound outcomes in input order and
/// the combined deduplicated article list across all compounds.
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub compounds: Vec<CompoundOutcome>,
    pub combined: Vec<ArticleRecord>,
}

impl SearchOutcome {
    /// True if at least one compound produced results without failure.
    pub fn any_success(&self) -> bool {
        self.compounds
            .iter()
            .any(|c| c.status != CompoundStatus::Failed)
    }
}

/// Error type for the search pipeline.
///
/// Every variant is scoped to the smallest unit of work (one lookup, one
/// expression, one compound) and never aborts sibling units.
#[derive(Debug, Clone)]
pub enum SearchError {
    /// Compound absent from the synonym database. Non-fatal: callers fall
    /// back to the original name as the sole search term.
    NotFound(String),
    /// Server returned 429 Too Many Requests.
    RateLimited { retry_after: Option<Duration> },
    /// Network failure, timeout or malformed response envelope.
    Retrieval(String),
    /// Malformed input (empty compound name, inverted date range). Fatal
    /// for the single compound's pipeline only.
    Validation(String),
}

impl std::fmt::Display for SearchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchError::NotFound(name) => write!(f, "no database entry for `{}`", name),
            SearchError::RateLimited {
                retry_after: Some(d),
            } => write!(f, "rate limited (429), retry after {:.1}s", d.as_secs_f64()),
            SearchError::RateLimited { retry_after: None } => write!(f, "rate limited (429)"),
            SearchError::Retrieval(msg) => write!(f, "retrieval failed: {}", msg),
            SearchError::Validation(msg) => write!(f, "invalid input: {}", msg),
        }
    }
}

impl std::error::Error for SearchError {}

impl SearchError {
    /// Whether the retry wrapper should attempt this call again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SearchError::RateLimited { .. } | SearchError::Retrieval(_)
        )
    }
}

/// Progress events emitted during a run.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Resolving {
        index: usize,
        total: usize,
        compound: String,
    },
    SynonymsResolved {
        index: usize,
        compound: String,
        synonyms: Vec<String>,
    },
    Fetching {
        index: usize,
        compound: String,
        expression: usize,
        expression_count: usize,
    },
    ExpressionComplete {
        index: usize,
        compound: String,
        expression: usize,
        articles: usize,
        elapsed: Duration,
    },
    Warning {
        index: usize,
        compound: String,
        message: String,
    },
    CompoundComplete {
        index: usize,
        total: usize,
        compound: String,
        status: CompoundStatus,
        articles: usize,
    },
}

/// Configuration for a search run.
#[derive(Clone)]
pub struct Config {
    pub ncbi_api_key: Option<String>,
    pub entrez_email: Option<String>,
    /// Synonyms kept per compound on top of the original name.
    pub max_synonyms: usize,
    /// Article cap per search expression.
    pub max_results_per_query: usize,
    /// Concurrent compound pipelines.
    pub concurrency_limit: usize,
    pub request_timeout_secs: u64,
    /// Backoff schedule in milliseconds; its length bounds the retry count.
    pub retry_backoff_ms: Vec<u64>,
    pub query_limits: QueryLimits,
    pub rate_limiters: Arc<RateLimiters>,
    /// Override the synonym source (tests inject mocks here).
    pub synonym_source: Option<Arc<dyn SynonymSource>>,
    /// Override the article source (tests inject mocks here).
    pub article_source: Option<Arc<dyn ArticleSource>>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("ncbi_api_key", &self.ncbi_api_key.as_ref().map(|_| "***"))
            .field("entrez_email", &self.entrez_email)
            .field("max_synonyms", &self.max_synonyms)
            .field("max_results_per_query", &self.max_results_per_query)
            .field("concurrency_limit", &self.concurrency_limit)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("query_limits", &self.query_limits)
            .field(
                "synonym_source",
                &self.synonym_source.as_ref().map(|s| s.name()),
            )
            .field(
                "article_source",
                &self.article_source.as_ref().map(|s| s.name()),
            )
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ncbi_api_key: None,
            entrez_email: None,
            max_synonyms: 3,
            max_results_per_query: 100,
            concurrency_limit: 4,
            request_timeout_secs: 10,
            retry_backoff_ms: vec![500, 2000, 8000],
            query_limits: QueryLimits::default(),
            rate_limiters: Arc::new(RateLimiters::default()),
            synonym_source: None,
            article_source: None,
        }
    }
}

impl Config {
    /// The retry backoff schedule as durations.
    pub fn backoff_schedule(&self) -> Vec<Duration> {
        self.retry_backoff_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Run a full search: expand each compound, fetch and deduplicate articles,
/// and compute the combined result set.
///
/// Compounds are processed concurrently on a bounded worker pool. Progress
/// events are emitted via the callback. Cancellation stops new outbound
/// requests promptly; partial results are returned.
pub async fn run_search(
    request: SearchRequest,
    config: Config,
    progress: impl Fn(ProgressEvent) + Send + Sync + 'static,
    cancel: CancellationToken,
) -> SearchOutcome {
    pool::run_search(request, config, progress, cancel).await
}
