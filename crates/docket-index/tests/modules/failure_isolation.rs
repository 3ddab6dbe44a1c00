//! Failed operations never change the published index.

use crate::support::{DeadProvider, SwitchableProvider, manager_at, retriever_for};
use docket_core::{Error, PersistMode, Result, SourceDocument};
use docket_index::IndexState;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tempfile::TempDir;

#[tokio::test]
async fn test_wrong_dimension_batch_is_rejected_whole() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let manager = manager_at(
        SwitchableProvider::with_batch_dimension(16),
        temp_dir.path(),
        PersistMode::Sync,
    );
    let before = manager.snapshot().await?;

    let result = manager
        .add(vec![SourceDocument::with_pages(
            "lease",
            None,
            ["Rent is due monthly.", "The deposit is refundable."],
        )])
        .await;
    assert!(matches!(result, Err(Error::DimensionMismatch { .. })));

    let after = manager.snapshot().await?;
    assert_eq!(after.len(), before.len());
    assert_eq!(after.as_ref(), before.as_ref());
    assert_eq!(manager.state().await, IndexState::Ready);
    Ok(())
}

#[tokio::test]
async fn test_provider_outage_leaves_index_usable() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let manager = Arc::new(manager_at(
        SwitchableProvider::default(),
        temp_dir.path(),
        PersistMode::Sync,
    ));
    manager
        .add(vec![SourceDocument::new("nda", None, "Confidential information stays secret.")])
        .await?;
    let before = manager.snapshot().await?;

    manager.provider().set_failing(true);
    let result = manager
        .add(vec![SourceDocument::new("lease", None, "Rent is due monthly.")])
        .await;
    let error = result.unwrap_err();
    assert!(matches!(error, Error::RateLimited(_)));
    assert!(error.is_retryable());

    assert_eq!(manager.snapshot().await?.as_ref(), before.as_ref());
    let passages = retriever_for(Arc::clone(&manager))
        .retrieve("confidential", 3, None)
        .await?;
    assert_eq!(passages.len(), 1);

    manager.provider().set_failing(false);
    let report = manager
        .add(vec![SourceDocument::new("lease", None, "Rent is due monthly.")])
        .await?;
    assert_eq!(report.chunks_added, 1);
    Ok(())
}

#[tokio::test]
async fn test_unreachable_provider_fails_index_terminally() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let manager = Arc::new(manager_at(DeadProvider, temp_dir.path(), PersistMode::Sync));

    assert!(matches!(manager.load().await, Err(Error::IndexUnavailable(_))));
    assert_eq!(manager.state().await, IndexState::Failed);

    let add = manager
        .add(vec![SourceDocument::new("nda", None, "Confidential.")])
        .await;
    assert!(matches!(add, Err(Error::IndexUnavailable(_))));

    let retriever = retriever_for(Arc::clone(&manager));
    assert!(matches!(
        retriever.retrieve("anything", 3, None).await,
        Err(Error::IndexUnavailable(_))
    ));
    assert!(retriever.retrieve_or_empty("anything", 3, None).await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_embedding_happens_once_per_batch() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let manager = manager_at(SwitchableProvider::default(), temp_dir.path(), PersistMode::Sync);
    manager
        .add(vec![
            SourceDocument::new("nda", None, "Confidential."),
            SourceDocument::new("lease", None, "Rent is due monthly."),
        ])
        .await?;

    assert_eq!(manager.provider().batch_calls.load(Ordering::SeqCst), 1);
    assert_eq!(manager.provider().single_calls.load(Ordering::SeqCst), 1);
    Ok(())
}
