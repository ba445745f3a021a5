//! Boolean search-expression construction.
//!
//! Expression shape follows the upstream query grammar: synonym variants are
//! ORed inside one grouped clause, gene and keyword clauses are ANDed in
//! when non-empty, and the publication-date filter is always appended:
//!
//! `(syn1 OR syn2) AND (gene1 OR gene2) AND (kw1) AND ("Y/01/01"[PDat] : "Y/12/31"[PDat])`

use crate::CompoundQuery;

/// Field tag applied to every term.
const FIELD_TAG: &str = "[Title/Abstract]";

/// Upstream limits an expression must stay within.
#[derive(Debug, Clone)]
pub struct QueryLimits {
    /// Maximum compound terms per expression.
    pub max_terms: usize,
    /// Maximum rendered expression length in bytes.
    pub max_len: usize,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            max_terms: 5,
            max_len: 3500,
        }
    }
}

/// One rendered boolean expression plus the terms it covers.
///
/// `terms` carries the compound terms of this partition and the gene terms,
/// and becomes the `source_terms` provenance of every article it finds.
#[derive(Debug, Clone)]
pub struct SearchExpression {
    pub text: String,
    pub terms: Vec<String>,
}

/// Quote a term when it contains grammar metacharacters, whitespace, or is
/// itself a boolean keyword. Embedded double quotes are dropped (the
/// grammar has no escape for them).
fn quote_term(term: &str) -> String {
    let is_boolean_keyword = matches!(
        term.to_ascii_uppercase().as_str(),
        "AND" | "OR" | "NOT"
    );
    let needs_quoting = is_boolean_keyword
        || term
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '(' | ')' | '[' | ']' | ':' | ','));

    if needs_quoting {
        format!("\"{}\"", term.replace('"', ""))
    } else {
        term.to_string()
    }
}

fn render_term(term: &str) -> String {
    format!("{}{}", quote_term(term), FIELD_TAG)
}

/// An OR-grouped clause over a set of terms.
fn or_clause(terms: &[String]) -> String {
    let rendered: Vec<String> = terms.iter().map(|t| render_term(t)).collect();
    format!("({})", rendered.join(" OR "))
}

fn date_filter(date_from: u16, date_to: u16) -> String {
    format!("(\"{date_from}/01/01\"[PDat] : \"{date_to}/12/31\"[PDat])")
}

/// Render the full expression for one partition of compound terms.
fn compose(compound_terms: &[String], query: &CompoundQuery) -> String {
    let mut text = or_clause(compound_terms);
    if !query.genes.is_empty() {
        text.push_str(" AND ");
        text.push_str(&or_clause(&query.genes));
    }
    if !query.keywords.is_empty() {
        text.push_str(" AND ");
        text.push_str(&or_clause(&query.keywords));
    }
    text.push_str(" AND ");
    text.push_str(&date_filter(query.date_from, query.date_to));
    text
}

/// Build the search expressions for one compound query.
///
/// Compound terms ([original, syn1, …] in rank order) are chunked greedily
/// so each expression stays within `limits`; earlier synonyms land in
/// earlier partitions, with no overlap and no omission. Gene and keyword
/// clauses repeat verbatim in every partition.
pub fn build_expressions(query: &CompoundQuery, limits: &QueryLimits) -> Vec<SearchExpression> {
    let all_terms = query.terms();
    let max_terms = limits.max_terms.max(1);

    let mut partitions: Vec<Vec<String>> = Vec::new();
    let mut current: Vec<String> = Vec::new();

    for term in all_terms {
        if !current.is_empty() {
            let mut candidate = current.clone();
            candidate.push(term.clone());
            if current.len() >= max_terms || compose(&candidate, query).len() > limits.max_len {
                partitions.push(std::mem::take(&mut current));
            }
        }
        current.push(term);
    }
    if !current.is_empty() {
        partitions.push(current);
    }

    partitions
        .into_iter()
        .map(|part| {
            let text = compose(&part, query);
            let mut terms = part;
            terms.extend(query.genes.iter().cloned());
            SearchExpression { text, terms }
        })
        .collect()
}
