//! Integration tests for the embedded key-value store.

mod common;

use std::collections::HashMap;

use anyhow::Result;
use pretty_assertions::assert_eq;

use common::embedded_backend;

#[tokio::test]
async fn set_get_round_trip() -> Result<()> {
    let (_dir, storage) = embedded_backend(4).await?;

    assert_eq!(storage.kv.get("missing").await?, None);
    storage.kv.set("config:mode", "hybrid").await?;
    assert_eq!(
        storage.kv.get("config:mode").await?,
        Some("hybrid".to_string())
    );
    assert!(storage.kv.exists("config:mode").await?);
    assert!(!storage.kv.exists("config:other").await?);
    Ok(())
}

#[tokio::test]
async fn set_overwrites_last_write_wins() -> Result<()> {
    let (_dir, storage) = embedded_backend(4).await?;

    storage.kv.set("k", "first").await?;
    storage.kv.set("k", "second").await?;
    assert_eq!(storage.kv.get("k").await?, Some("second".to_string()));
    assert_eq!(storage.kv.len().await?, 1);
    Ok(())
}

#[tokio::test]
async fn batch_operations() -> Result<()> {
    let (_dir, storage) = embedded_backend(4).await?;

    let entries: HashMap<String, String> = (0..10)
        .map(|i| (format!("doc:{i}"), format!("value-{i}")))
        .collect();
    storage.kv.set_batch(&entries).await?;
    assert_eq!(storage.kv.len().await?, 10);

    let keys: Vec<String> = vec!["doc:1".into(), "doc:5".into(), "doc:99".into()];
    let fetched = storage.kv.get_batch(&keys).await?;
    assert_eq!(fetched.len(), 2, "missing keys are absent from the result");
    assert_eq!(fetched["doc:1"], "value-1");

    let deleted = storage
        .kv
        .delete_batch(&["doc:1".into(), "doc:2".into(), "doc:99".into()])
        .await?;
    assert_eq!(deleted, 2);
    assert_eq!(storage.kv.len().await?, 8);
    Ok(())
}

#[tokio::test]
async fn glob_patterns_match_star_and_question_mark() -> Result<()> {
    let (_dir, storage) = embedded_backend(4).await?;

    for key in ["doc:a", "doc:b", "chunk:a1", "chunk:a2", "chunk:b10", "100%"] {
        storage.kv.set(key, "x").await?;
    }

    let all = storage.kv.keys(None).await?;
    assert_eq!(all.len(), 6);
    assert!(all.windows(2).all(|w| w[0] <= w[1]), "keys sorted");

    assert_eq!(
        storage.kv.keys(Some("doc:*")).await?,
        vec!["doc:a".to_string(), "doc:b".to_string()]
    );
    assert_eq!(
        storage.kv.keys(Some("chunk:a?")).await?,
        vec!["chunk:a1".to_string(), "chunk:a2".to_string()]
    );
    // Literal % in a key must not act as a wildcard.
    assert_eq!(storage.kv.keys(Some("100%")).await?, vec!["100%".to_string()]);
    assert_eq!(storage.kv.keys(Some("*")).await?.len(), 6);
    Ok(())
}

#[tokio::test]
async fn delete_and_clear() -> Result<()> {
    let (_dir, storage) = embedded_backend(4).await?;

    storage.kv.set("a", "1").await?;
    assert!(storage.kv.delete("a").await?);
    assert!(!storage.kv.delete("a").await?, "second delete reports false");

    storage.kv.set("b", "2").await?;
    storage.kv.set("c", "3").await?;
    storage.kv.clear().await?;
    assert_eq!(storage.kv.len().await?, 0);
    Ok(())
}

#[tokio::test]
async fn concurrent_writers_converge() -> Result<()> {
    let (_dir, storage) = embedded_backend(4).await?;

    let kv = storage.kv.clone();
    let mut handles = Vec::new();
    for i in 0..16 {
        let kv = kv.clone();
        handles.push(tokio::spawn(async move {
            kv.set(&format!("worker:{i}"), &format!("{i}")).await
        }));
    }
    for handle in handles {
        handle.await??;
    }
    assert_eq!(storage.kv.len().await?, 16);
    Ok(())
}
