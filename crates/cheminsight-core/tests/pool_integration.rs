//! End-to-end tests for [`run_search`] over mock sources.
//!
//! No HTTP requests are made: the synonym and article sources are scripted
//! mocks injected through the Config overrides.

use std::sync::Arc;

use cheminsight_core::sources::mock::{MockArticleSource, MockSynonymSource, make_article};
use cheminsight_core::{
    ArticleRecord, CompoundStatus, Config, SearchRequest, run_search,
};
use tokio_util::sync::CancellationToken;

fn corpus() -> Vec<ArticleRecord> {
    vec![
        make_article("31452104", "Caffeine intake and CYP1A2 variants", Some(2019)),
        make_article("29462669", "CYP1A2 activity after coffee abstention", Some(2018)),
        // Duplicate pmid the fetcher must collapse
        make_article("31452104", "Caffeine intake and CYP1A2 variants", Some(2019)),
    ]
}

fn request(compounds: &[&str]) -> SearchRequest {
    SearchRequest {
        compounds: compounds.iter().map(|s| s.to_string()).collect(),
        genes: vec!["CYP1A2".into()],
        keywords: vec![],
        date_from: 2015,
        date_to: 2020,
    }
}

fn config(articles: MockArticleSource, synonyms: MockSynonymSource) -> Config {
    Config {
        max_synonyms: 2,
        retry_backoff_ms: vec![10, 20],
        article_source: Some(Arc::new(articles)),
        synonym_source: Some(Arc::new(synonyms)),
        ..Config::default()
    }
}

#[tokio::test(start_paused = true)]
async fn end_to_end_single_compound() {
    let synonyms = MockSynonymSource::new().with_entry(
        "caffeine",
        &["Caffeine", "1,3,7-Trimethylxanthine", "Guaranine", "Theine"],
    );
    let config = config(MockArticleSource::new(corpus()), synonyms);

    let outcome = run_search(
        request(&["caffeine"]),
        config,
        |_| {},
        CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome.compounds.len(), 1);
    let compound = &outcome.compounds[0];
    assert_eq!(compound.status, CompoundStatus::Success);
    assert!(compound.reason.is_none());
    // Original name stripped, ranking preserved, capped at max_synonyms
    assert_eq!(
        compound.synonyms_used,
        vec!["1,3,7-Trimethylxanthine", "Guaranine"]
    );
    // Duplicate pmid collapsed
    assert_eq!(compound.articles.len(), 2);

    // Provenance covers the compound terms and the gene clause
    let first = &compound.articles[0];
    assert!(first.source_terms.contains("caffeine"));
    assert!(first.source_terms.contains("1,3,7-Trimethylxanthine"));
    assert!(first.source_terms.contains("CYP1A2"));

    // Combined equals the single compound's deduplicated list
    assert_eq!(outcome.combined.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn unknown_compound_degrades_to_original_name() {
    let config = config(MockArticleSource::new(corpus()), MockSynonymSource::new());

    let outcome = run_search(
        request(&["obscuramide"]),
        config,
        |_| {},
        CancellationToken::new(),
    )
    .await;

    let compound = &outcome.compounds[0];
    // NotFound is not an error: the original name is the sole search term
    assert_eq!(compound.status, CompoundStatus::Success);
    assert!(compound.synonyms_used.is_empty());
    assert_eq!(compound.articles.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn partial_failure_is_scoped_to_one_compound() {
    let synonyms = MockSynonymSource::new()
        .with_entry("caffeine", &["Guaranine"])
        .with_entry("badmium", &["unobtainium"]);
    let articles = MockArticleSource::new(corpus()).rate_limited_for("badmium");
    let config = config(articles, synonyms);

    let outcome = run_search(
        request(&["caffeine", "badmium"]),
        config,
        |_| {},
        CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome.compounds.len(), 2);

    let good = &outcome.compounds[0];
    assert_eq!(good.compound, "caffeine");
    assert_eq!(good.status, CompoundStatus::Success);
    assert_eq!(good.articles.len(), 2);

    let bad = &outcome.compounds[1];
    assert_eq!(bad.compound, "badmium");
    assert_eq!(bad.status, CompoundStatus::Failed);
    assert!(bad.reason.as_deref().unwrap().contains("rate limited"));
    assert_eq!(bad.failed_expressions.len(), 1);
    assert!(bad.articles.is_empty());

    // The failing compound contributes nothing to the combined set
    assert_eq!(outcome.combined.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn combined_dedups_across_compounds() {
    let synonyms = MockSynonymSource::new()
        .with_entry("caffeine", &["Guaranine"])
        .with_entry("theine", &["Caffeine"]);
    let config = config(MockArticleSource::new(corpus()), synonyms);

    let outcome = run_search(
        request(&["caffeine", "theine"]),
        config,
        |_| {},
        CancellationToken::new(),
    )
    .await;

    // Both compounds found the same two articles
    for compound in &outcome.compounds {
        assert_eq!(compound.articles.len(), 2);
    }

    // Combined keeps one record per pmid with the union of source terms
    assert_eq!(outcome.combined.len(), 2);
    let first = &outcome.combined[0];
    assert!(first.source_terms.contains("caffeine"));
    assert!(first.source_terms.contains("theine"));
}

#[tokio::test(start_paused = true)]
async fn empty_compound_name_fails_validation() {
    let config = config(MockArticleSource::new(corpus()), MockSynonymSource::new());

    let outcome = run_search(
        request(&["caffeine", "   "]),
        config,
        |_| {},
        CancellationToken::new(),
    )
    .await;

    let good = &outcome.compounds[0];
    assert_eq!(good.status, CompoundStatus::Success);

    let bad = &outcome.compounds[1];
    assert_eq!(bad.status, CompoundStatus::Failed);
    assert!(bad.reason.as_deref().unwrap().contains("invalid input"));
}

#[tokio::test(start_paused = true)]
async fn inverted_date_range_fails_each_compound() {
    let config = config(MockArticleSource::new(corpus()), MockSynonymSource::new());
    let mut req = request(&["caffeine", "aspirin"]);
    req.date_from = 2020;
    req.date_to = 2015;

    let outcome = run_search(req, config, |_| {}, CancellationToken::new()).await;

    for compound in &outcome.compounds {
        assert_eq!(compound.status, CompoundStatus::Failed);
        assert!(compound.reason.as_deref().unwrap().contains("date range"));
    }
    assert!(outcome.combined.is_empty());
    assert!(!outcome.any_success());
}

#[tokio::test(start_paused = true)]
async fn cancellation_reports_every_compound() {
    let config = config(MockArticleSource::new(corpus()), MockSynonymSource::new());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = run_search(request(&["caffeine", "aspirin"]), config, |_| {}, cancel).await;

    assert_eq!(outcome.compounds.len(), 2);
    for compound in &outcome.compounds {
        assert_eq!(compound.status, CompoundStatus::Failed);
        assert_eq!(compound.reason.as_deref(), Some("search cancelled"));
    }
    assert!(outcome.combined.is_empty());
}

#[tokio::test(start_paused = true)]
async fn progress_events_are_emitted() {
    use std::sync::Mutex;

    let synonyms = MockSynonymSource::new().with_entry("caffeine", &["Guaranine"]);
    let config = config(MockArticleSource::new(corpus()), synonyms);

    let events: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();

    let _ = run_search(
        request(&["caffeine"]),
        config,
        move |event| {
            sink.lock().unwrap().push(format!("{event:?}"));
        },
        CancellationToken::new(),
    )
    .await;

    let events = events.lock().unwrap();
    assert!(events.iter().any(|e| e.starts_with("Resolving")));
    assert!(events.iter().any(|e| e.starts_with("SynonymsResolved")));
    assert!(events.iter().any(|e| e.starts_with("Fetching")));
    assert!(events.iter().any(|e| e.starts_with("CompoundComplete")));
}
