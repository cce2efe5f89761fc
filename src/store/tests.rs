// ============================================================================
// Embedding store tests
// ============================================================================

use std::sync::Arc;

use proptest::prelude::*;

use crate::metrics::StoreMetrics;

use super::*;

fn test_store(dimension: usize) -> EmbeddingStore {
    EmbeddingStore::new(
        StoreConfig::default().with_dimension(dimension),
        Arc::new(StoreMetrics::new()),
    )
}

fn meta(pairs: &[(&str, &str)]) -> Metadata {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), MetadataValue::from(*v)))
        .collect()
}

// ----------------------------------------------------------------------------
// Upsert / get / delete
// ----------------------------------------------------------------------------

#[tokio::test]
async fn upsert_then_get_returns_record() {
    let store = test_store(3);
    store
        .upsert(
            Namespace::Content,
            "doc1",
            vec![1.0, 0.0, 0.0],
            meta(&[("content_type", "article")]),
        )
        .await
        .unwrap();

    let record = store.get(Namespace::Content, "doc1").await.unwrap();
    assert_eq!(record.id, "doc1");
    assert_eq!(record.embedding, vec![1.0, 0.0, 0.0]);
    assert_eq!(
        record.metadata.get("content_type").and_then(MetadataValue::as_str),
        Some("article")
    );
}

#[tokio::test]
async fn get_unknown_id_returns_none() {
    let store = test_store(3);
    assert!(store.get(Namespace::Content, "missing").await.is_none());
}

#[tokio::test]
async fn upsert_rejects_wrong_dimension() {
    let store = test_store(3);
    let err = store
        .upsert(Namespace::Content, "doc1", vec![1.0, 0.0], Metadata::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::InvalidDimension { expected: 3, actual: 2 }
    ));
    // The failed upsert must not leave a half-written record behind.
    assert_eq!(store.count(Namespace::Content).await.unwrap(), 0);
}

#[tokio::test]
async fn upsert_rejects_id_with_prefix_delimiter() {
    let store = test_store(3);
    let err = store
        .upsert(Namespace::Content, "bad:id", vec![0.0; 3], Metadata::new())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidId { .. }));
    assert_eq!(store.count(Namespace::Content).await.unwrap(), 0);
    assert!(store.get(Namespace::Content, "bad:id").await.is_none());
}

#[tokio::test]
async fn upsert_same_id_replaces_without_growing() {
    let store = test_store(3);
    store
        .upsert(Namespace::Content, "doc1", vec![1.0, 0.0, 0.0], Metadata::new())
        .await
        .unwrap();
    let first = store.get(Namespace::Content, "doc1").await.unwrap();

    store
        .upsert(
            Namespace::Content,
            "doc1",
            vec![0.0, 1.0, 0.0],
            meta(&[("updated", "yes")]),
        )
        .await
        .unwrap();

    assert_eq!(store.count(Namespace::Content).await.unwrap(), 1);
    let second = store.get(Namespace::Content, "doc1").await.unwrap();
    assert_eq!(second.embedding, vec![0.0, 1.0, 0.0]);
    // An in-place update keeps the original insertion timestamp.
    assert_eq!(second.inserted_at, first.inserted_at);
}

#[tokio::test]
async fn namespaces_are_isolated() {
    let store = test_store(2);
    store
        .upsert(Namespace::Content, "same-id", vec![1.0, 0.0], Metadata::new())
        .await
        .unwrap();
    store
        .upsert(Namespace::User, "same-id", vec![0.0, 1.0], Metadata::new())
        .await
        .unwrap();

    assert_eq!(store.count(Namespace::Content).await.unwrap(), 1);
    assert_eq!(store.count(Namespace::User).await.unwrap(), 1);

    let content = store.get(Namespace::Content, "same-id").await.unwrap();
    let user = store.get(Namespace::User, "same-id").await.unwrap();
    assert_ne!(content.embedding, user.embedding);

    store.delete(Namespace::Content, "same-id").await.unwrap();
    assert!(store.get(Namespace::User, "same-id").await.is_some());
}

#[tokio::test]
async fn delete_is_idempotent() {
    let store = test_store(2);
    store
        .upsert(Namespace::User, "u1", vec![1.0, 1.0], Metadata::new())
        .await
        .unwrap();

    assert!(store.delete(Namespace::User, "u1").await.unwrap());
    assert!(!store.delete(Namespace::User, "u1").await.unwrap());
    assert!(!store.delete(Namespace::User, "never-existed").await.unwrap());
    assert_eq!(store.count(Namespace::User).await.unwrap(), 0);
}

// ----------------------------------------------------------------------------
// Similarity search
// ----------------------------------------------------------------------------

#[tokio::test]
async fn search_returns_nearest_first() {
    let store = test_store(2);
    store
        .upsert(Namespace::Content, "east", vec![1.0, 0.0], Metadata::new())
        .await
        .unwrap();
    store
        .upsert(Namespace::Content, "north", vec![0.0, 1.0], Metadata::new())
        .await
        .unwrap();
    store
        .upsert(Namespace::Content, "northeast", vec![1.0, 1.0], Metadata::new())
        .await
        .unwrap();

    let hits = store
        .similarity_search(Namespace::Content, &[1.0, 0.1], 2, None)
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, "east");
    assert!(hits[0].score >= hits[1].score);
}

#[tokio::test]
async fn search_ties_resolve_to_first_inserted() {
    let store = test_store(2);
    // doc1 and doc2 carry identical embeddings; insertion order decides.
    store
        .upsert(Namespace::Content, "doc1", vec![0.6, 0.8], Metadata::new())
        .await
        .unwrap();
    store
        .upsert(Namespace::Content, "doc2", vec![0.6, 0.8], Metadata::new())
        .await
        .unwrap();

    for _ in 0..5 {
        let hits = store
            .similarity_search(Namespace::Content, &[0.6, 0.8], 1, None)
            .await
            .unwrap();
        assert_eq!(hits[0].id, "doc1");
    }

    // Updating doc1 in place must not demote it behind doc2.
    store
        .upsert(Namespace::Content, "doc1", vec![0.6, 0.8], meta(&[("v", "2")]))
        .await
        .unwrap();
    let hits = store
        .similarity_search(Namespace::Content, &[0.6, 0.8], 2, None)
        .await
        .unwrap();
    assert_eq!(hits[0].id, "doc1");
    assert_eq!(hits[1].id, "doc2");
}

#[tokio::test]
async fn search_k_larger_than_store_returns_everything() {
    let store = test_store(2);
    store
        .upsert(Namespace::Content, "a", vec![1.0, 0.0], Metadata::new())
        .await
        .unwrap();
    store
        .upsert(Namespace::Content, "b", vec![0.0, 1.0], Metadata::new())
        .await
        .unwrap();

    let hits = store
        .similarity_search(Namespace::Content, &[1.0, 0.0], 100, None)
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
}

#[tokio::test]
async fn search_rejects_wrong_dimension_query() {
    let store = test_store(3);
    let err = store
        .similarity_search(Namespace::Content, &[1.0], 5, None)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidDimension { .. }));
}

#[tokio::test]
async fn search_applies_metadata_filter() {
    let store = test_store(2);
    store
        .upsert(
            Namespace::Content,
            "article-1",
            vec![1.0, 0.0],
            meta(&[("content_type", "article")]),
        )
        .await
        .unwrap();
    store
        .upsert(
            Namespace::Content,
            "video-1",
            vec![1.0, 0.0],
            meta(&[("content_type", "video")]),
        )
        .await
        .unwrap();

    let filter = SearchFilter::new().with_field("content_type", "video");
    let hits = store
        .similarity_search(Namespace::Content, &[1.0, 0.0], 10, Some(&filter))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "video-1");
}

#[tokio::test]
async fn search_empty_store_returns_empty() {
    let store = test_store(2);
    let hits = store
        .similarity_search(Namespace::User, &[1.0, 0.0], 5, None)
        .await
        .unwrap();
    assert!(hits.is_empty());
}

// ----------------------------------------------------------------------------
// Count and reconcile
// ----------------------------------------------------------------------------

#[tokio::test]
async fn count_detects_divergence() {
    let store = test_store(2);
    store
        .upsert(Namespace::Content, "doc1", vec![1.0, 0.0], Metadata::new())
        .await
        .unwrap();
    store.remove_metadata_only(Namespace::Content, "doc1").await;

    let err = store.count(Namespace::Content).await.unwrap_err();
    assert!(matches!(err, StoreError::Consistency { .. }));
}

#[tokio::test]
async fn reconcile_removes_orphans_both_ways() {
    let store = test_store(2);
    for id in ["keep", "index-orphan", "meta-orphan"] {
        store
            .upsert(Namespace::Content, id, vec![1.0, 0.0], Metadata::new())
            .await
            .unwrap();
    }
    store.remove_metadata_only(Namespace::Content, "index-orphan").await;
    store.remove_index_only(Namespace::Content, "meta-orphan").await;

    let report = store.reconcile(Namespace::Content).await.unwrap();
    assert_eq!(report.removed_from_index, vec!["index-orphan".to_string()]);
    assert_eq!(report.removed_from_metadata, vec!["meta-orphan".to_string()]);

    // After repair the count path is healthy again.
    assert_eq!(store.count(Namespace::Content).await.unwrap(), 1);
    assert!(store.get(Namespace::Content, "keep").await.is_some());
}

#[tokio::test]
async fn reconcile_clean_store_is_noop() {
    let store = test_store(2);
    store
        .upsert(Namespace::User, "u1", vec![1.0, 0.0], Metadata::new())
        .await
        .unwrap();

    let report = store.reconcile(Namespace::User).await.unwrap();
    assert!(report.is_clean());
    assert_eq!(store.count(Namespace::User).await.unwrap(), 1);
}

// ----------------------------------------------------------------------------
// Snapshot and swap
// ----------------------------------------------------------------------------

#[tokio::test]
async fn snapshot_is_isolated_from_later_writes() {
    let store = test_store(2);
    store
        .upsert(Namespace::Content, "before", vec![1.0, 0.0], Metadata::new())
        .await
        .unwrap();

    let snapshot = store.snapshot().await;

    store
        .upsert(Namespace::Content, "after", vec![0.0, 1.0], Metadata::new())
        .await
        .unwrap();

    assert_eq!(snapshot.metadata.count_in(Namespace::Content), 1);
    assert!(snapshot.metadata.get(Namespace::Content, "after").is_none());
}

#[tokio::test]
async fn swap_replaces_live_state() {
    let store = test_store(2);
    store
        .upsert(Namespace::Content, "old", vec![1.0, 0.0], Metadata::new())
        .await
        .unwrap();
    let snapshot = store.snapshot().await;

    store
        .upsert(Namespace::Content, "newer", vec![0.0, 1.0], Metadata::new())
        .await
        .unwrap();
    store.delete(Namespace::Content, "old").await.unwrap();

    store.swap(snapshot).await.unwrap();

    assert!(store.get(Namespace::Content, "old").await.is_some());
    assert!(store.get(Namespace::Content, "newer").await.is_none());
    assert_eq!(store.count(Namespace::Content).await.unwrap(), 1);
}

#[tokio::test]
async fn swap_rejects_wrong_dimension_snapshot() {
    let donor = test_store(4);
    donor
        .upsert(Namespace::Content, "doc", vec![0.0; 4], Metadata::new())
        .await
        .unwrap();
    let snapshot = donor.snapshot().await;

    let store = test_store(2);
    store
        .upsert(Namespace::Content, "live", vec![1.0, 0.0], Metadata::new())
        .await
        .unwrap();

    let err = store.swap(snapshot).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidDimension { .. }));
    // Live state untouched after the rejected swap.
    assert!(store.get(Namespace::Content, "live").await.is_some());
}

#[tokio::test]
async fn swap_rejects_inconsistent_snapshot() {
    let donor = test_store(2);
    donor
        .upsert(Namespace::Content, "doc", vec![1.0, 0.0], Metadata::new())
        .await
        .unwrap();
    donor.remove_index_only(Namespace::Content, "doc").await;
    let snapshot = donor.snapshot().await;

    let store = test_store(2);
    let err = store.swap(snapshot).await.unwrap_err();
    assert!(matches!(err, StoreError::Consistency { .. }));
}

// ----------------------------------------------------------------------------
// Index serialization
// ----------------------------------------------------------------------------

#[test]
fn index_round_trips_through_bytes() {
    let mut index = VectorIndex::new(3);
    index.insert("a", vec![1.0, 2.0, 3.0]).unwrap();
    index.insert("b", vec![4.0, 5.0, 6.0]).unwrap();
    index.remove("a");
    index.insert("c", vec![7.0, 8.0, 9.0]).unwrap();

    let bytes = index.to_bytes().unwrap();
    let restored = VectorIndex::from_bytes(&bytes).unwrap();

    assert_eq!(restored.len(), 2);
    assert_eq!(restored.get("b"), Some(&[4.0, 5.0, 6.0][..]));
    assert_eq!(restored.get("c"), Some(&[7.0, 8.0, 9.0][..]));
    assert!(!restored.contains("a"));
}

#[test]
fn index_rejects_truncated_bytes() {
    let mut index = VectorIndex::new(3);
    index.insert("a", vec![1.0, 2.0, 3.0]).unwrap();
    let mut bytes = index.to_bytes().unwrap();
    bytes.truncate(bytes.len() / 2);

    assert!(matches!(
        VectorIndex::from_bytes(&bytes),
        Err(StoreError::Serialization { .. })
    ));
}

// ----------------------------------------------------------------------------
// Property tests
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Op {
    Upsert(u8),
    Delete(u8),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..16).prop_map(Op::Upsert),
        (0u8..16).prop_map(Op::Delete),
    ]
}

proptest! {
    // Metadata store and index stay in lockstep under any interleaving of
    // upserts and deletes.
    #[test]
    fn stores_stay_consistent(ops in proptest::collection::vec(op_strategy(), 0..64)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        rt.block_on(async {
            let store = test_store(2);
            for op in ops {
                match op {
                    Op::Upsert(n) => {
                        store
                            .upsert(
                                Namespace::Content,
                                &format!("id-{n}"),
                                vec![n as f32, 1.0],
                                Metadata::new(),
                            )
                            .await
                            .unwrap();
                    }
                    Op::Delete(n) => {
                        store
                            .delete(Namespace::Content, &format!("id-{n}"))
                            .await
                            .unwrap();
                    }
                }
                // `count` fails on any divergence between the two stores.
                store.count(Namespace::Content).await.unwrap();
            }
            let snapshot = store.snapshot().await;
            snapshot.check_consistency().unwrap();
        });
    }

    #[test]
    fn cosine_tops_out_for_identical_vectors(v in proptest::collection::vec(0.1f32..10.0, 4)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        rt.block_on(async {
            let store = test_store(4);
            store
                .upsert(Namespace::Content, "self", v.clone(), Metadata::new())
                .await
                .unwrap();
            let hits = store
                .similarity_search(Namespace::Content, &v, 1, None)
                .await
                .unwrap();
            prop_assert!((hits[0].score - 1.0).abs() < 1e-4);
            Ok(())
        }).unwrap();
    }
}
