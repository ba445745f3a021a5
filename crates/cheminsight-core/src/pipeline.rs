//! Per-compound pipeline: resolve synonyms, build expressions, fetch
//! concurrently, aggregate.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::sources::pubchem::{PubChem, is_cas_number};
use crate::sources::pubmed::PubMed;
use crate::sources::{ArticleSource, SynonymSource};
use crate::{
    ArticleRecord, CompoundOutcome, CompoundQuery, CompoundStatus, Config, ProgressEvent,
    SearchError, SearchRequest, aggregate, fetch, query, rate_limit, synonym,
};

/// Shared immutable context for one run: request-level clauses, config,
/// HTTP client and the upstream sources.
pub struct SearchContext {
    pub genes: Vec<String>,
    pub keywords: Vec<String>,
    pub date_from: u16,
    pub date_to: u16,
    pub config: Config,
    pub client: reqwest::Client,
    pub synonym_source: Arc<dyn SynonymSource>,
    pub article_source: Arc<dyn ArticleSource>,
}

impl SearchContext {
    pub fn new(request: &SearchRequest, config: Config) -> Self {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let synonym_source = config
            .synonym_source
            .clone()
            .unwrap_or_else(|| Arc::new(PubChem::new()));
        let article_source = config.article_source.clone().unwrap_or_else(|| {
            Arc::new(PubMed::new(
                config.ncbi_api_key.clone(),
                config.entrez_email.clone(),
            ))
        });

        Self {
            genes: request.genes.clone(),
            keywords: request.keywords.clone(),
            date_from: request.date_from,
            date_to: request.date_to,
            config,
            client,
            synonym_source,
            article_source,
        }
    }
}

fn failed_outcome(compound: &str, reason: String) -> CompoundOutcome {
    CompoundOutcome {
        compound: compound.to_string(),
        synonyms_used: vec![],
        status: CompoundStatus::Failed,
        reason: Some(reason),
        articles: vec![],
        failed_expressions: vec![],
    }
}

/// Run the full pipeline for one compound.
///
/// Errors never escape: every failure mode is folded into the outcome's
/// status and reason, so sibling compounds are unaffected.
pub async fn process_compound(
    ctx: &SearchContext,
    index: usize,
    total: usize,
    compound: &str,
    progress: &(dyn Fn(ProgressEvent) + Send + Sync),
    cancel: &CancellationToken,
) -> CompoundOutcome {
    let timeout = ctx.config.request_timeout();
    let schedule = ctx.config.backoff_schedule();
    let limiters = &ctx.config.rate_limiters;

    progress(ProgressEvent::Resolving {
        index,
        total,
        compound: compound.to_string(),
    });

    // Reason carried into a Partial status when a non-fatal step degraded.
    let mut degraded: Option<String> = None;

    // Step 0: registry numbers are resolved to a searchable name first
    let name = if is_cas_number(compound) {
        let resolved = rate_limit::call_with_retry(
            ctx.synonym_source.name(),
            limiters,
            &schedule,
            |_attempt| ctx.synonym_source.resolve_name(compound, &ctx.client, timeout),
        )
        .await;
        match resolved {
            Ok(name) => {
                if name != compound {
                    tracing::info!(compound, resolved = %name, "resolved registry number");
                }
                name
            }
            Err(err) => {
                progress(ProgressEvent::Warning {
                    index,
                    compound: compound.to_string(),
                    message: format!("could not resolve registry number: {err}"),
                });
                compound.to_string()
            }
        }
    } else {
        compound.to_string()
    };

    // Step 1: synonym expansion (degrades to the original name on failure)
    let synonyms = match synonym::resolve(
        ctx.synonym_source.as_ref(),
        &name,
        ctx.config.max_synonyms,
        &ctx.client,
        timeout,
        limiters,
        &schedule,
    )
    .await
    {
        Ok(list) => {
            if list.is_empty() {
                progress(ProgressEvent::Warning {
                    index,
                    compound: compound.to_string(),
                    message: format!("no synonyms found for `{name}`; using the original name only"),
                });
            }
            list
        }
        Err(err) => {
            degraded = Some(format!("synonym lookup failed: {err}"));
            progress(ProgressEvent::Warning {
                index,
                compound: compound.to_string(),
                message: format!("synonym lookup failed ({err}); using the original name only"),
            });
            vec![]
        }
    };

    progress(ProgressEvent::SynonymsResolved {
        index,
        compound: compound.to_string(),
        synonyms: synonyms.clone(),
    });

    // Step 2: validated query and its expressions
    let compound_query = match CompoundQuery::new(
        &name,
        synonyms,
        ctx.genes.clone(),
        ctx.keywords.clone(),
        ctx.date_from,
        ctx.date_to,
        ctx.config.max_synonyms,
    ) {
        Ok(q) => q,
        Err(err) => {
            let outcome = failed_outcome(compound, err.to_string());
            progress(ProgressEvent::CompoundComplete {
                index,
                total,
                compound: compound.to_string(),
                status: outcome.status,
                articles: 0,
            });
            return outcome;
        }
    };

    let expressions = query::build_expressions(&compound_query, &ctx.config.query_limits);
    let expression_count = expressions.len();

    // Step 3: fetch every expression concurrently; results land in their
    // partition slot so ordering is independent of completion order
    let mut join_set = JoinSet::new();
    for (i, expression) in expressions.into_iter().enumerate() {
        progress(ProgressEvent::Fetching {
            index,
            compound: compound.to_string(),
            expression: i,
            expression_count,
        });

        let source = Arc::clone(&ctx.article_source);
        let client = ctx.client.clone();
        let limiters = Arc::clone(&ctx.config.rate_limiters);
        let schedule = schedule.clone();
        let cancel = cancel.clone();
        let max_results = ctx.config.max_results_per_query;

        join_set.spawn(async move {
            if cancel.is_cancelled() {
                return (
                    i,
                    expression,
                    Err(SearchError::Retrieval("cancelled".into())),
                    Duration::ZERO,
                );
            }
            let start = Instant::now();
            let result = fetch::fetch_articles(
                source.as_ref(),
                &expression,
                max_results,
                &client,
                timeout,
                &limiters,
                &schedule,
                &cancel,
            )
            .await;
            (i, expression, result, start.elapsed())
        });
    }

    let mut slots: Vec<Option<Vec<ArticleRecord>>> = vec![None; expression_count];
    let mut failures: Vec<(usize, String, SearchError)> = Vec::new();

    while let Some(joined) = join_set.join_next().await {
        let Ok((i, expression, result, elapsed)) = joined else {
            continue;
        };
        match result {
            Ok(articles) => {
                progress(ProgressEvent::ExpressionComplete {
                    index,
                    compound: compound.to_string(),
                    expression: i,
                    articles: articles.len(),
                    elapsed,
                });
                slots[i] = Some(articles);
            }
            Err(err) => {
                tracing::warn!(
                    compound,
                    expression = %expression.text,
                    error = %err,
                    "expression fetch failed"
                );
                failures.push((i, expression.text, err));
            }
        }
    }

    // Step 4: merge partition lists in partition order
    let articles = aggregate::merge(slots.into_iter().flatten());

    failures.sort_by_key(|(i, _, _)| *i);
    let failed_expressions: Vec<String> =
        failures.iter().map(|(_, text, _)| text.clone()).collect();

    let (status, reason) = if expression_count > 0 && failures.len() == expression_count {
        (
            CompoundStatus::Failed,
            Some(format!("all queries failed: {}", failures[0].2)),
        )
    } else if !failures.is_empty() {
        (
            CompoundStatus::Partial,
            Some(format!(
                "{} of {} queries failed: {}",
                failures.len(),
                expression_count,
                failures[0].2
            )),
        )
    } else if let Some(reason) = degraded.take() {
        (CompoundStatus::Partial, Some(reason))
    } else {
        (CompoundStatus::Success, None)
    };

    progress(ProgressEvent::CompoundComplete {
        index,
        total,
        compound: compound.to_string(),
        status,
        articles: articles.len(),
    });

    CompoundOutcome {
        compound: compound.to_string(),
        synonyms_used: compound_query.synonyms,
        status,
        reason,
        articles,
        failed_expressions,
    }
}
