//! Mock sources for testing.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{ArticleSource, SearchPage, SynonymSource};
use crate::{ArticleRecord, SearchError};

/// Build a minimal article record for tests.
pub fn make_article(pmid: &str, title: &str, year: Option<i32>) -> ArticleRecord {
    ArticleRecord {
        pmid: pmid.to_string(),
        title: title.to_string(),
        authors: vec![],
        journal: String::new(),
        year,
        abstract_text: None,
        url: format!("https://pubmed.ncbi.nlm.nih.gov/{}/", pmid),
        source_terms: BTreeSet::new(),
    }
}

/// A scripted synonym source: known compounds map to fixed synonym lists,
/// everything else is NotFound. Counts calls.
#[derive(Default)]
pub struct MockSynonymSource {
    entries: HashMap<String, Vec<String>>,
    call_count: AtomicUsize,
}

impl MockSynonymSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a compound and its ranked synonym list.
    pub fn with_entry(mut self, compound: &str, synonyms: &[&str]) -> Self {
        self.entries.insert(
            compound.trim().to_lowercase(),
            synonyms.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    /// How many times `lookup()` has been called.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

impl SynonymSource for MockSynonymSource {
    fn name(&self) -> &str {
        "MockSynonyms"
    }

    fn lookup<'a>(
        &'a self,
        compound: &'a str,
        _client: &'a reqwest::Client,
        _timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, SearchError>> + Send + 'a>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let result = self
            .entries
            .get(&compound.trim().to_lowercase())
            .cloned()
            .ok_or_else(|| SearchError::NotFound(compound.to_string()));
        Box::pin(async move { result })
    }
}

/// A scripted article source serving a fixed corpus page by page.
///
/// Expressions containing the configured needle always return 429, which
/// exercises the retry/partial-failure paths without any HTTP.
pub struct MockArticleSource {
    corpus: Vec<ArticleRecord>,
    rate_limit_needle: Option<String>,
    error_needle: Option<String>,
    call_count: AtomicUsize,
}

impl MockArticleSource {
    pub fn new(corpus: Vec<ArticleRecord>) -> Self {
        Self {
            corpus,
            rate_limit_needle: None,
            error_needle: None,
            call_count: AtomicUsize::new(0),
        }
    }

    /// Expressions containing `needle` get a 429 on every call.
    pub fn rate_limited_for(mut self, needle: &str) -> Self {
        self.rate_limit_needle = Some(needle.to_string());
        self
    }

    /// Expressions containing `needle` get a retrieval error on every call.
    pub fn failing_for(mut self, needle: &str) -> Self {
        self.error_needle = Some(needle.to_string());
        self
    }

    /// How many times `search_page()` has been called.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

impl ArticleSource for MockArticleSource {
    fn name(&self) -> &str {
        "MockArticles"
    }

    fn search_page<'a>(
        &'a self,
        expression: &'a str,
        offset: usize,
        limit: usize,
        _client: &'a reqwest::Client,
        _timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<SearchPage, SearchError>> + Send + 'a>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        let result = if self
            .rate_limit_needle
            .as_deref()
            .is_some_and(|n| expression.contains(n))
        {
            Err(SearchError::RateLimited {
                retry_after: Some(Duration::from_millis(50)),
            })
        } else if self
            .error_needle
            .as_deref()
            .is_some_and(|n| expression.contains(n))
        {
            Err(SearchError::Retrieval("simulated network failure".into()))
        } else {
            let records = self
                .corpus
                .iter()
                .skip(offset)
                .take(limit)
                .cloned()
                .collect();
            Ok(SearchPage {
                total: self.corpus.len(),
                records,
            })
        };

        Box::pin(async move { result })
    }
}
