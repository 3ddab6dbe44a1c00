//! Readers always observe a consistent pair while writers mutate.

use crate::support::hashing_manager;
use docket_core::{DocumentId, Error, Result, SourceDocument};
use docket_index::DeleteScope;
use std::collections::BTreeSet;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::task::JoinSet;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_see_consistent_snapshots() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let manager = Arc::new(hashing_manager(temp_dir.path()));
    manager.load().await?;

    let mut tasks = JoinSet::new();
    for writer in 0..4 {
        let manager = Arc::clone(&manager);
        tasks.spawn(async move {
            for round in 0..5 {
                let document = format!("doc-{writer}-{round}");
                manager
                    .add(vec![SourceDocument::new(
                        document.as_str(),
                        None,
                        format!("Clause {round} drafted by writer {writer}."),
                    )])
                    .await?;
                if round % 2 == 1 {
                    manager
                        .delete(DeleteScope::Document(DocumentId::new(document)))
                        .await?;
                }
            }
            Ok::<_, Error>(())
        });
    }
    for _ in 0..4 {
        let manager = Arc::clone(&manager);
        tasks.spawn(async move {
            for _ in 0..50 {
                let snapshot = manager.snapshot().await?;
                assert_eq!(snapshot.vectors().len(), snapshot.catalog().len());
                assert_eq!(snapshot.sentinel_count(), 1);
            }
            Ok::<_, Error>(())
        });
    }

    while let Some(joined) = tasks.join_next().await {
        joined.map_err(|error| Error::Other(error.to_string()))??;
    }

    let snapshot = manager.snapshot().await?;
    assert_eq!(snapshot.real_len(), 4 * 3);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_get_distinct_ids() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let manager = Arc::new(hashing_manager(temp_dir.path()));

    let mut tasks = JoinSet::new();
    for writer in 0..8 {
        let manager = Arc::clone(&manager);
        tasks.spawn(async move {
            manager
                .add(vec![SourceDocument::new(
                    format!("doc-{writer}"),
                    None,
                    format!("Schedule {writer} of the master agreement."),
                )])
                .await
        });
    }

    let mut ids = BTreeSet::new();
    while let Some(joined) = tasks.join_next().await {
        let report = joined.map_err(|error| Error::Other(error.to_string()))??;
        ids.extend(report.chunk_ids);
    }
    assert_eq!(ids.len(), 8);
    assert_eq!(manager.len().await, 9);
    Ok(())
}
