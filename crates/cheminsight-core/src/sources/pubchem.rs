//! PubChem PUG-REST client: compound name → CID → synonym list.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use super::SynonymSource;
use crate::SearchError;
use crate::rate_limit::check_rate_limit_response;

const DEFAULT_BASE_URL: &str = "https://pubchem.ncbi.nlm.nih.gov/rest/pug";

/// Whether the input looks like a CAS registry number (e.g. "50-78-2").
pub fn is_cas_number(compound: &str) -> bool {
    static CAS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{2,7}-\d{2}-\d$").unwrap());
    CAS.is_match(compound.trim())
}

/// Extract the first CID from a `/compound/name/{name}/cids/JSON` payload.
pub fn parse_cid(data: &serde_json::Value) -> Option<i64> {
    data["IdentifierList"]["CID"]
        .as_array()
        .and_then(|cids| cids.first())
        .and_then(|v| v.as_i64())
}

/// Extract the synonym list from a `/compound/cid/{cid}/synonyms/JSON`
/// payload, preserving the upstream order.
pub fn parse_synonyms(data: &serde_json::Value) -> Vec<String> {
    data["InformationList"]["Information"]
        .as_array()
        .and_then(|info| info.first())
        .and_then(|entry| entry["Synonym"].as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

/// Extract the IUPAC name from a property-table payload.
pub fn parse_iupac_name(data: &serde_json::Value) -> Option<String> {
    data["PropertyTable"]["Properties"]
        .as_array()
        .and_then(|props| props.first())
        .and_then(|entry| entry["IUPACName"].as_str())
        .map(String::from)
}

pub struct PubChem {
    base_url: String,
}

impl Default for PubChem {
    fn default() -> Self {
        Self::new()
    }
}

impl PubChem {
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the client at a different base URL (tests).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    async fn get_json(
        &self,
        url: &str,
        client: &reqwest::Client,
        timeout: Duration,
    ) -> Result<serde_json::Value, SearchError> {
        let resp = client
            .get(url)
            .header("User-Agent", "cheminsight")
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| SearchError::Retrieval(e.to_string()))?;

        check_rate_limit_response(&resp)?;
        // PUG-REST reports an unknown name as a 404 fault document
        if resp.status().as_u16() == 404 {
            return Err(SearchError::NotFound(url.to_string()));
        }
        if !resp.status().is_success() {
            return Err(SearchError::Retrieval(format!("HTTP {}", resp.status())));
        }

        resp.json()
            .await
            .map_err(|e| SearchError::Retrieval(e.to_string()))
    }

    async fn cid_for_name(
        &self,
        name: &str,
        client: &reqwest::Client,
        timeout: Duration,
    ) -> Result<i64, SearchError> {
        let url = format!(
            "{}/compound/name/{}/cids/JSON",
            self.base_url,
            urlencoding::encode(name)
        );
        let data = self
            .get_json(&url, client, timeout)
            .await
            .map_err(|e| match e {
                SearchError::NotFound(_) => SearchError::NotFound(name.to_string()),
                other => other,
            })?;
        parse_cid(&data).ok_or_else(|| SearchError::NotFound(name.to_string()))
    }
}

impl SynonymSource for PubChem {
    fn name(&self) -> &str {
        "PubChem"
    }

    fn lookup<'a>(
        &'a self,
        compound: &'a str,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, SearchError>> + Send + 'a>> {
        Box::pin(async move {
            let name = compound.trim();

            // Step 1: resolve the name to a CID
            let cid = self.cid_for_name(name, client, timeout).await?;

            // Step 2: retrieve synonyms for the CID
            let url = format!("{}/compound/cid/{}/synonyms/JSON", self.base_url, cid);
            let data = self.get_json(&url, client, timeout).await?;

            Ok(parse_synonyms(&data))
        })
    }

    fn resolve_name<'a>(
        &'a self,
        compound: &'a str,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<String, SearchError>> + Send + 'a>> {
        Box::pin(async move {
            let name = compound.trim();
            if !is_cas_number(name) {
                return Ok(name.to_string());
            }

            let cid = self.cid_for_name(name, client, timeout).await?;
            let url = format!(
                "{}/compound/cid/{}/property/IUPACName/JSON",
                self.base_url, cid
            );
            let data = self.get_json(&url, client, timeout).await?;

            // No IUPAC name on file: keep searching under the raw number
            Ok(parse_iupac_name(&data).unwrap_or_else(|| name.to_string()))
        })
    }
}
