//! Paginated article retrieval for a single search expression.

use std::collections::HashSet;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::query::SearchExpression;
use crate::rate_limit::{RateLimiters, call_with_retry};
use crate::sources::ArticleSource;
use crate::{ArticleRecord, SearchError};

/// Records requested per API call (the per-call ceiling).
pub const PAGE_SIZE: usize = 100;

/// Fetch up to `max_results` articles for one expression, page by page.
///
/// Every page call goes through the source's rate limiter and the retry
/// schedule; a page failure after retries fails only this expression.
/// Duplicate pmids within the expression are dropped (the upstream sort can
/// repeat records across page boundaries) and each kept record is stamped
/// with the expression's terms. Cancellation stops before the next page and
/// returns what was already collected.
pub async fn fetch_articles(
    source: &dyn ArticleSource,
    expression: &SearchExpression,
    max_results: usize,
    client: &reqwest::Client,
    timeout: Duration,
    limiters: &RateLimiters,
    schedule: &[Duration],
    cancel: &CancellationToken,
) -> Result<Vec<ArticleRecord>, SearchError> {
    let mut articles: Vec<ArticleRecord> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut offset = 0usize;

    while articles.len() < max_results {
        if cancel.is_cancelled() {
            tracing::debug!(expression = %expression.text, "fetch cancelled");
            break;
        }

        let limit = PAGE_SIZE.min(max_results - articles.len());
        let page = call_with_retry(source.name(), limiters, schedule, |_attempt| {
            source.search_page(&expression.text, offset, limit, client, timeout)
        })
        .await?;

        let got = page.records.len();
        for mut record in page.records {
            if articles.len() >= max_results {
                break;
            }
            if seen.insert(record.pmid.clone()) {
                record
                    .source_terms
                    .extend(expression.terms.iter().cloned());
                articles.push(record);
            }
        }

        offset += limit;
        if got == 0 || offset >= page.total {
            break;
        }
    }

    Ok(articles)
}
