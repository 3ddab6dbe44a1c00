//! End-to-end index lifecycle: initialise, add, search, delete.

use crate::support::{DIMENSION, hashing_manager, is_sentinel, retriever_for};
use docket_core::{ChunkId, CollectionId, DocumentId, Result, SourceDocument};
use docket_index::{DeleteScope, IndexState};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn three_paragraphs() -> String {
    let paragraph = ["lease"; 50].join(" ");
    [paragraph.as_str(), paragraph.as_str(), paragraph.as_str()].join("\n\n")
}

fn ten_pages(document: &str) -> SourceDocument {
    SourceDocument::with_pages(
        document,
        None,
        (1..=10).map(|page| format!("Clause {page} of the agreement binds both parties.")),
    )
}

#[tokio::test]
async fn test_first_use_initialises_sentinel_index() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let manager = hashing_manager(temp_dir.path());

    let snapshot = manager.snapshot().await?;
    assert_eq!(manager.state().await, IndexState::Ready);
    assert_eq!(snapshot.vectors().len(), snapshot.catalog().len());
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot.catalog().iter().all(is_sentinel));
    Ok(())
}

#[tokio::test]
async fn test_sentinel_only_search_never_fails() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let manager = Arc::new(hashing_manager(temp_dir.path()));

    let neighbors = manager.search(&[0.5; DIMENSION], 5).await?;
    assert!(neighbors.len() <= 1);

    let passages = retriever_for(Arc::clone(&manager))
        .retrieve("termination for convenience", 5, None)
        .await?;
    assert!(passages.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_nine_hundred_character_document_yields_four_chunks() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let manager = hashing_manager(temp_dir.path());
    let text = three_paragraphs();

    let report = manager
        .add(vec![SourceDocument::new("lease", None, text.clone())])
        .await?;
    assert_eq!(report.chunks_added, 4);

    let snapshot = manager.snapshot().await?;
    let chunks: Vec<_> = snapshot
        .catalog()
        .iter()
        .filter(|record| !record.is_sentinel)
        .collect();
    assert_eq!(chunks.len(), 4);
    for (index, chunk) in chunks.iter().enumerate() {
        assert!(chunk.text.chars().count() <= 300);
        assert_eq!(chunk.chunk_index as usize, index);
        assert_eq!(chunk.total_chunks, 4);
        assert_eq!(&text[chunk.offset..chunk.offset + chunk.text.len()], chunk.text);
    }
    for pair in chunks.windows(2) {
        let previous_end = pair[0].offset + pair[0].text.len();
        assert!(pair[1].offset < previous_end);
    }
    Ok(())
}

#[tokio::test]
async fn test_k_larger_than_index_returns_all_real_chunks() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let manager = Arc::new(hashing_manager(temp_dir.path()));
    manager
        .add(vec![SourceDocument::with_pages(
            "lease",
            None,
            ["The rent is due monthly.", "The deposit is refundable."],
        )])
        .await?;

    let passages = retriever_for(Arc::clone(&manager))
        .retrieve("rent deposit", 5, None)
        .await?;
    assert_eq!(passages.len(), 2);
    assert!(passages.windows(2).all(|pair| pair[0].score >= pair[1].score));
    Ok(())
}

#[tokio::test]
async fn test_delete_document_restores_previous_length() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let manager = hashing_manager(temp_dir.path());
    let before = manager.snapshot().await?.len();

    let report = manager.add(vec![ten_pages("contract-a")]).await?;
    assert_eq!(report.chunks_added, 10);
    assert_eq!(manager.len().await, before + 10);

    let removed = manager
        .delete(DeleteScope::Document(DocumentId::from("contract-a")))
        .await?;
    assert_eq!(removed, 10);

    let snapshot = manager.snapshot().await?;
    assert_eq!(snapshot.len(), before);
    assert_eq!(snapshot.vectors().len(), snapshot.catalog().len());
    assert!(snapshot
        .catalog()
        .filter(|record| record.source_document_id.as_str() == "contract-a")
        .is_empty());
    Ok(())
}

#[tokio::test]
async fn test_delete_keeps_other_documents_searchable() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let manager = Arc::new(hashing_manager(temp_dir.path()));
    manager
        .add(vec![
            SourceDocument::new("nda", None, "Confidential information must not be disclosed."),
            SourceDocument::new("lease", None, "Rent is payable on the first of each month."),
        ])
        .await?;
    manager
        .delete(DeleteScope::Document(DocumentId::from("nda")))
        .await?;

    let passages = retriever_for(Arc::clone(&manager))
        .retrieve("confidential rent", 5, None)
        .await?;
    assert_eq!(passages.len(), 1);
    assert_eq!(passages[0].source_document_id.as_str(), "lease");
    Ok(())
}

#[tokio::test]
async fn test_collection_scoped_retrieval_and_delete() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let manager = Arc::new(hashing_manager(temp_dir.path()));
    let tenant_a = CollectionId::from("tenant-a");
    let tenant_b = CollectionId::from("tenant-b");
    manager
        .add(vec![
            SourceDocument::new("a-lease", Some(tenant_a.clone()), "Rent is due monthly."),
            SourceDocument::new("b-lease", Some(tenant_b.clone()), "Rent is due weekly."),
        ])
        .await?;

    let retriever = retriever_for(Arc::clone(&manager));
    let scoped = retriever.retrieve("rent due", 5, Some(&tenant_b)).await?;
    assert_eq!(scoped.len(), 1);
    assert_eq!(scoped[0].collection_id.as_ref(), Some(&tenant_b));

    assert_eq!(manager.delete(DeleteScope::Collection(tenant_b.clone())).await?, 1);
    assert!(retriever.retrieve("rent due", 5, Some(&tenant_b)).await?.is_empty());
    assert_eq!(retriever.retrieve("rent due", 5, None).await?.len(), 1);

    let stats = manager.stats().await?;
    assert_eq!(stats.total_chunks, 1);
    assert!(stats.collections.contains_key("tenant-a"));
    assert!(!stats.collections.contains_key("tenant-b"));
    Ok(())
}

#[tokio::test]
async fn test_chunk_ids_are_never_reused() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let manager = hashing_manager(temp_dir.path());

    let first = manager
        .add(vec![SourceDocument::new("nda", None, "Mutual non-disclosure.")])
        .await?;
    manager
        .delete(DeleteScope::Document(DocumentId::from("nda")))
        .await?;
    let second = manager
        .add(vec![SourceDocument::new("nda", None, "Mutual non-disclosure.")])
        .await?;

    assert_eq!(first.chunk_ids, vec![ChunkId::new(1)]);
    assert_eq!(second.chunk_ids, vec![ChunkId::new(2)]);
    Ok(())
}

#[tokio::test]
async fn test_load_is_idempotent() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let manager = hashing_manager(temp_dir.path());
    manager
        .add(vec![SourceDocument::new("nda", None, "Mutual non-disclosure.")])
        .await?;
    let loaded = manager.len().await;

    fs::remove_dir_all(temp_dir.path())?;
    manager.load().await?;
    manager.load().await?;

    assert_eq!(manager.len().await, loaded);
    assert_eq!(manager.state().await, IndexState::Ready);
    Ok(())
}

#[tokio::test]
async fn test_empty_documents_are_a_noop() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let manager = hashing_manager(temp_dir.path());
    let before = manager.snapshot().await?;

    let report = manager
        .add(vec![SourceDocument::new("blank", None, "   \n\n  ")])
        .await?;
    assert_eq!(report.documents, 1);
    assert_eq!(report.chunks_added, 0);
    assert_eq!(manager.snapshot().await?.revision(), before.revision());
    Ok(())
}
