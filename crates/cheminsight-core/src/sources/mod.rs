//! Upstream API traits and client implementations.

pub mod mock;
pub mod pubchem;
pub mod pubmed;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::{ArticleRecord, SearchError};

/// One page of results from the bibliographic API.
#[derive(Debug, Clone)]
pub struct SearchPage {
    /// Total hits the API reports for the expression.
    pub total: usize,
    pub records: Vec<ArticleRecord>,
}

/// A chemical database that can expand a compound name into synonyms.
pub trait SynonymSource: Send + Sync {
    /// The canonical name of this source (e.g., "PubChem").
    fn name(&self) -> &str;

    /// Look up the ranked synonym list for a compound.
    ///
    /// Returns `SearchError::NotFound` when the compound has no entry;
    /// ordering follows the upstream popularity ranking.
    fn lookup<'a>(
        &'a self,
        compound: &'a str,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, SearchError>> + Send + 'a>>;

    /// Resolve a registry-number style input (e.g. a CAS number) to a
    /// preferred chemical name. The default passes the input through.
    fn resolve_name<'a>(
        &'a self,
        compound: &'a str,
        _client: &'a reqwest::Client,
        _timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<String, SearchError>> + Send + 'a>> {
        Box::pin(async move { Ok(compound.to_string()) })
    }
}

/// A bibliographic database that can be searched page by page.
pub trait ArticleSource: Send + Sync {
    /// The canonical name of this source (e.g., "PubMed").
    fn name(&self) -> &str;

    /// Fetch one page of results for a boolean search expression.
    fn search_page<'a>(
        &'a self,
        expression: &'a str,
        offset: usize,
        limit: usize,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<SearchPage, SearchError>> + Send + 'a>>;
}
