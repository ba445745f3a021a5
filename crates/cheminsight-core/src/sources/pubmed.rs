//! NCBI E-utilities client: paged esearch plus esummary normalization.

use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use super::{ArticleSource, SearchPage};
use crate::rate_limit::check_rate_limit_response;
use crate::{ArticleRecord, SearchError};

const DEFAULT_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
const TOOL_NAME: &str = "cheminsight";

pub struct PubMed {
    base_url: String,
    api_key: Option<String>,
    email: Option<String>,
}

impl PubMed {
    pub fn new(api_key: Option<String>, email: Option<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            email,
        }
    }

    /// Point the client at a different base URL (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Entrez etiquette parameters appended to every call.
    fn common_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("tool", TOOL_NAME.to_string())];
        if let Some(ref key) = self.api_key {
            params.push(("api_key", key.clone()));
        }
        if let Some(ref email) = self.email {
            params.push(("email", email.clone()));
        }
        params
    }

    async fn get_json(
        &self,
        url: &str,
        params: &[(&str, String)],
        client: &reqwest::Client,
        timeout: Duration,
    ) -> Result<serde_json::Value, SearchError> {
        let resp = client
            .get(url)
            .query(params)
            .header("User-Agent", TOOL_NAME)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| SearchError::Retrieval(e.to_string()))?;

        check_rate_limit_response(&resp)?;
        if !resp.status().is_success() {
            return Err(SearchError::Retrieval(format!("HTTP {}", resp.status())));
        }

        resp.json()
            .await
            .map_err(|e| SearchError::Retrieval(e.to_string()))
    }
}

impl ArticleSource for PubMed {
    fn name(&self) -> &str {
        "PubMed"
    }

    fn search_page<'a>(
        &'a self,
        expression: &'a str,
        offset: usize,
        limit: usize,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<SearchPage, SearchError>> + Send + 'a>> {
        Box::pin(async move {
            // Step 1: esearch for the PMIDs on this page
            let search_url = format!("{}/esearch.fcgi", self.base_url);
            let mut params = vec![
                ("db", "pubmed".to_string()),
                ("term", expression.to_string()),
                ("retmode", "json".to_string()),
                ("retstart", offset.to_string()),
                ("retmax", limit.to_string()),
                ("sort", "relevance".to_string()),
            ];
            params.extend(self.common_params());

            let data = self.get_json(&search_url, &params, client, timeout).await?;
            let (total, id_list) = parse_esearch(&data)
                .ok_or_else(|| SearchError::Retrieval("esearch: missing esearchresult".into()))?;

            if id_list.is_empty() {
                return Ok(SearchPage {
                    total,
                    records: vec![],
                });
            }

            // Step 2: esummary for this page's PMIDs
            let summary_url = format!("{}/esummary.fcgi", self.base_url);
            let mut params = vec![
                ("db", "pubmed".to_string()),
                ("id", id_list.join(",")),
                ("retmode", "json".to_string()),
            ];
            params.extend(self.common_params());

            let data = self
                .get_json(&summary_url, &params, client, timeout)
                .await?;
            let results = &data["result"];

            let mut records = Vec::with_capacity(id_list.len());
            for pmid in &id_list {
                match normalize_summary(pmid, &results[pmid.as_str()]) {
                    Some(record) => records.push(record),
                    None => {
                        tracing::warn!(pmid, "skipping malformed summary record");
                    }
                }
            }

            Ok(SearchPage { total, records })
        })
    }
}

/// Pull the hit count and PMID list out of an esearch payload.
pub fn parse_esearch(data: &serde_json::Value) -> Option<(usize, Vec<String>)> {
    let result = data.get("esearchresult")?;
    // E-utilities encodes the count as a string
    let total = match &result["count"] {
        serde_json::Value::String(s) => s.parse().ok()?,
        serde_json::Value::Number(n) => n.as_u64()? as usize,
        _ => return None,
    };
    let id_list = result["idlist"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();
    Some((total, id_list))
}

/// Normalize one esummary record into an [`ArticleRecord`].
///
/// Total over loosely-structured input: absent year/abstract become `None`,
/// absent journal becomes an empty string. Returns `None` only when the
/// record has no usable title (the caller skips and logs it).
pub fn normalize_summary(pmid: &str, item: &serde_json::Value) -> Option<ArticleRecord> {
    let title = item["title"].as_str()?.trim();
    if title.is_empty() {
        return None;
    }

    let authors = item["authors"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|a| a["name"].as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();

    let journal = item["fulljournalname"]
        .as_str()
        .or_else(|| item["source"].as_str())
        .unwrap_or("")
        .to_string();

    let year = item["pubdate"].as_str().and_then(parse_year);

    let abstract_text = item["abstract"]
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from);

    Some(ArticleRecord {
        pmid: pmid.to_string(),
        title: title.to_string(),
        authors,
        journal,
        year,
        abstract_text,
        url: format!("https://pubmed.ncbi.nlm.nih.gov/{}/", pmid),
        source_terms: BTreeSet::new(),
    })
}

/// Parse the year from a pubdate string like "2019 Mar 12" or "2020 Nov-Dec".
fn parse_year(pubdate: &str) -> Option<i32> {
    static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{4}").unwrap());
    YEAR.find(pubdate).and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn esearch_counts_and_ids() {
        let data = json!({
            "esearchresult": {
                "count": "2837",
                "retstart": "0",
                "idlist": ["31452104", "29462669"]
            }
        });
        let (total, ids) = parse_esearch(&data).unwrap();
        assert_eq!(total, 2837);
        assert_eq!(ids, vec!["31452104", "29462669"]);
    }

    #[test]
    fn esearch_missing_envelope() {
        assert!(parse_esearch(&json!({})).is_none());
    }

    #[test]
    fn esearch_empty_idlist() {
        let data = json!({"esearchresult": {"count": "0", "idlist": []}});
        let (total, ids) = parse_esearch(&data).unwrap();
        assert_eq!(total, 0);
        assert!(ids.is_empty());
    }

    #[test]
    fn normalize_full_record() {
        let item = json!({
            "title": "Caffeine metabolism by CYP1A2.",
            "authors": [{"name": "Gunes A"}, {"name": "Dahl ML"}],
            "fulljournalname": "Pharmacogenomics",
            "pubdate": "2017 Mar 12",
            "abstract": "Caffeine is primarily metabolized by CYP1A2."
        });
        let record = normalize_summary("28123456", &item).unwrap();
        assert_eq!(record.pmid, "28123456");
        assert_eq!(record.title, "Caffeine metabolism by CYP1A2.");
        assert_eq!(record.authors, vec!["Gunes A", "Dahl ML"]);
        assert_eq!(record.journal, "Pharmacogenomics");
        assert_eq!(record.year, Some(2017));
        assert!(record.abstract_text.is_some());
        assert_eq!(record.url, "https://pubmed.ncbi.nlm.nih.gov/28123456/");
    }

    #[test]
    fn normalize_missing_year_and_abstract() {
        let item = json!({
            "title": "An old report",
            "source": "J Obscure Res",
            "pubdate": "n.d."
        });
        let record = normalize_summary("100", &item).unwrap();
        assert_eq!(record.year, None);
        assert_eq!(record.abstract_text, None);
        assert_eq!(record.journal, "J Obscure Res");
        assert!(record.authors.is_empty());
    }

    #[test]
    fn normalize_rejects_missing_title() {
        assert!(normalize_summary("1", &json!({})).is_none());
        assert!(normalize_summary("1", &json!({"title": "  "})).is_none());
    }

    #[test]
    fn year_from_various_pubdates() {
        assert_eq!(parse_year("2019 Mar 12"), Some(2019));
        assert_eq!(parse_year("2020 Nov-Dec"), Some(2020));
        assert_eq!(parse_year("Winter 1998"), Some(1998));
        assert_eq!(parse_year("no date"), None);
    }
}
