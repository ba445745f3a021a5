//! Synonym resolution: upstream lookup plus local cleanup.

use std::collections::HashSet;
use std::time::Duration;

use crate::SearchError;
use crate::rate_limit::{RateLimiters, call_with_retry};
use crate::sources::SynonymSource;

/// Resolve a compound into up to `max_synonyms` ranked synonyms.
///
/// Upstream popularity ordering is preserved (no local re-ranking); entries
/// are deduplicated case-insensitively and anything equal to the original
/// name is stripped. An unknown compound yields an empty list, never an
/// error — callers then search under the original name alone.
pub async fn resolve(
    source: &dyn SynonymSource,
    compound: &str,
    max_synonyms: usize,
    client: &reqwest::Client,
    timeout: Duration,
    limiters: &RateLimiters,
    schedule: &[Duration],
) -> Result<Vec<String>, SearchError> {
    let compound = compound.trim();

    let raw = match call_with_retry(source.name(), limiters, schedule, |_attempt| {
        source.lookup(compound, client, timeout)
    })
    .await
    {
        Ok(list) => list,
        Err(SearchError::NotFound(_)) => return Ok(vec![]),
        Err(err) => return Err(err),
    };

    Ok(dedup_synonyms(compound, raw, max_synonyms))
}

/// Case-insensitive dedup preserving first occurrence; strips empty entries
/// and entries identical to the original name; caps at `max`.
pub fn dedup_synonyms(original: &str, raw: Vec<String>, max: usize) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    seen.insert(original.trim().to_lowercase());

    let mut out = Vec::new();
    for syn in raw {
        let trimmed = syn.trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.to_lowercase()) {
            out.push(trimmed.to_string());
            if out.len() == max {
                break;
            }
        }
    }
    out
}
