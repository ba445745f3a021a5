//! Merging and deduplication of article lists.

use std::collections::HashMap;

use crate::ArticleRecord;

/// Merge article lists into one deduplicated sequence.
///
/// Ordering is first-seen across the input lists in the order provided
/// (compound order, then synonym-partition order), never arrival order.
/// When a pmid recurs, the first-seen record's fields are retained and its
/// `source_terms` is extended with the duplicate's terms. Idempotent.
pub fn merge<I>(lists: I) -> Vec<ArticleRecord>
where
    I: IntoIterator<Item = Vec<ArticleRecord>>,
{
    let mut merged: Vec<ArticleRecord> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for list in lists {
        for record in list {
            match index.get(&record.pmid) {
                Some(&i) => {
                    merged[i].source_terms.extend(record.source_terms);
                }
                None => {
                    index.insert(record.pmid.clone(), merged.len());
                    merged.push(record);
                }
            }
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::mock::make_article;

    fn with_terms(mut record: ArticleRecord, terms: &[&str]) -> ArticleRecord {
        record.source_terms = terms.iter().map(|t| t.to_string()).collect();
        record
    }

    #[test]
    fn merge_empty() {
        assert!(merge(Vec::<Vec<ArticleRecord>>::new()).is_empty());
    }

    #[test]
    fn duplicate_pmid_unions_source_terms() {
        let a = with_terms(make_article("12345", "Aspirin and platelets", Some(2018)), &["aspirin"]);
        let b = with_terms(make_article("12345", "Aspirin and platelets", Some(2018)), &["ASA"]);

        let merged = merge(vec![vec![a], vec![b]]);
        assert_eq!(merged.len(), 1);
        let terms: Vec<&str> = merged[0].source_terms.iter().map(String::as_str).collect();
        assert_eq!(terms, vec!["ASA", "aspirin"]);
    }

    #[test]
    fn first_seen_fields_are_retained() {
        let first = with_terms(make_article("7", "First title", Some(2019)), &["a"]);
        let mut second = with_terms(make_article("7", "Conflicting title", None), &["b"]);
        second.journal = "Other Journal".into();

        let merged = merge(vec![vec![first], vec![second]]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].title, "First title");
        assert_eq!(merged[0].year, Some(2019));
        assert_eq!(merged[0].journal, "");
    }

    #[test]
    fn ordering_is_first_seen_across_lists() {
        let lists = vec![
            vec![make_article("1", "one", None), make_article("2", "two", None)],
            vec![make_article("2", "two", None), make_article("3", "three", None)],
        ];
        let merged = merge(lists);
        let pmids: Vec<&str> = merged.iter().map(|r| r.pmid.as_str()).collect();
        assert_eq!(pmids, vec!["1", "2", "3"]);
    }

    #[test]
    fn merge_is_idempotent() {
        let lists = vec![
            vec![
                with_terms(make_article("1", "one", Some(2015)), &["x"]),
                with_terms(make_article("2", "two", None), &["y"]),
            ],
            vec![with_terms(make_article("1", "one", Some(2015)), &["z"])],
        ];
        let once = merge(lists);
        let twice = merge(vec![once.clone()]);

        assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(twice.iter()) {
            assert_eq!(a.pmid, b.pmid);
            assert_eq!(a.source_terms, b.source_terms);
        }
    }
}
