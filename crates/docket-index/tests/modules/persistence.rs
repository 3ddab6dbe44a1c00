//! Paired persistence across manager instances and corruption recovery.

use crate::support::{DIMENSION, hashing_manager, is_sentinel, manager_at};
use docket_core::{ChunkId, DocumentId, PersistMode, Result, SourceDocument};
use docket_index::store::{CATALOG_FILE, CURRENT_FILE, VECTORS_FILE};
use docket_index::{DeleteScope, HashingEmbeddingProvider, IndexState, IndexStore};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn sample_documents() -> Vec<SourceDocument> {
    vec![
        SourceDocument::with_pages(
            "lease",
            None,
            ["Rent is due monthly.", "The tenant maintains the garden."],
        ),
        SourceDocument::new("nda", None, "Confidential information stays confidential."),
    ]
}

#[tokio::test]
async fn test_state_survives_restart() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let original = hashing_manager(temp_dir.path());
    original.add(sample_documents()).await?;
    let written = original.snapshot().await?;
    drop(original);

    let reopened = hashing_manager(temp_dir.path());
    let restored = reopened.snapshot().await?;

    assert_eq!(restored.len(), written.len());
    assert_eq!(restored.catalog(), written.catalog());
    for (left, right) in restored.vectors().rows().zip(written.vectors().rows()) {
        assert_eq!(left.len(), DIMENSION);
        for (lhs, rhs) in left.iter().zip(right) {
            assert!((lhs - rhs).abs() < 1e-6);
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_reopened_index_continues_chunk_ids() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let original = hashing_manager(temp_dir.path());
    let first = original.add(sample_documents()).await?;
    original
        .delete(DeleteScope::Document(DocumentId::from("nda")))
        .await?;
    drop(original);

    let reopened = hashing_manager(temp_dir.path());
    let second = reopened
        .add(vec![SourceDocument::new("memo", None, "Board meeting notes.")])
        .await?;

    let highest = first.chunk_ids.iter().max().copied().unwrap();
    assert_eq!(second.chunk_ids, vec![highest.next()]);
    assert_eq!(reopened.stats().await?.next_chunk_id, ChunkId::new(highest.value() + 2));
    Ok(())
}

async fn assert_recovers_to_sentinel(root: &Path) -> Result<()> {
    let manager = hashing_manager(root);
    manager.load().await?;
    assert_eq!(manager.state().await, IndexState::Ready);

    let snapshot = manager.snapshot().await?;
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot.catalog().iter().all(is_sentinel));
    Ok(())
}

#[tokio::test]
async fn test_truncated_catalog_recovers() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let original = hashing_manager(temp_dir.path());
    original.add(sample_documents()).await?;
    let generation = original.store().current_generation_dir().await?;
    drop(original);

    let catalog_path = generation.join(CATALOG_FILE);
    let bytes = fs::read(&catalog_path)?;
    fs::write(&catalog_path, &bytes[..bytes.len() / 3])?;

    assert_recovers_to_sentinel(temp_dir.path()).await
}

#[tokio::test]
async fn test_missing_vector_artifact_recovers() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let original = hashing_manager(temp_dir.path());
    original.add(sample_documents()).await?;
    let generation = original.store().current_generation_dir().await?;
    drop(original);

    fs::remove_file(generation.join(VECTORS_FILE))?;

    assert_recovers_to_sentinel(temp_dir.path()).await
}

#[tokio::test]
async fn test_dangling_pointer_recovers() -> Result<()> {
    let temp_dir = TempDir::new()?;
    fs::write(temp_dir.path().join(CURRENT_FILE), "not-a-generation")?;

    assert_recovers_to_sentinel(temp_dir.path()).await
}

#[tokio::test]
async fn test_recovered_index_is_persisted() -> Result<()> {
    let temp_dir = TempDir::new()?;
    fs::write(temp_dir.path().join(CURRENT_FILE), "gen-999999")?;
    hashing_manager(temp_dir.path()).load().await?;

    let (vectors, catalog) = IndexStore::new(temp_dir.path()).load().await?;
    assert_eq!(vectors.len(), 1);
    assert_eq!(catalog.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_background_persistence_after_flush() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let writer = manager_at(
        HashingEmbeddingProvider::new(DIMENSION),
        temp_dir.path(),
        PersistMode::Background,
    );
    for index in 0..5 {
        writer
            .add(vec![SourceDocument::new(
                format!("memo-{index}"),
                None,
                format!("Memorandum number {index} on lease renewals."),
            )])
            .await?;
    }
    writer.flush().await?;
    let expected = writer.len().await;
    drop(writer);

    let reader = hashing_manager(temp_dir.path());
    assert_eq!(reader.len().await, 0);
    reader.load().await?;
    assert_eq!(reader.len().await, expected);
    assert_eq!(expected, 6);
    Ok(())
}
