#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use chrono::Duration;
use core_test_support::CancellingParser;
use core_test_support::toy_config;
use core_test_support::toy_engine;
use core_test_support::toy_project;
use core_test_support::write_file;
use pretty_assertions::assert_eq;
use symdex_core::CancellationToken;
use symdex_core::FileUpdate;
use symdex_core::IndexConfig;
use symdex_core::IndexEngine;
use symdex_core::IndexError;
use symdex_core::ParserRegistry;
use symdex_core::SearchOptions;
use symdex_core::SymbolKind;
use tempfile::TempDir;

fn set_mtime(path: &std::path::Path, when: chrono::DateTime<chrono::Utc>) {
    std::fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::from(when))
        .unwrap();
}

#[tokio::test]
async fn indexes_project_and_answers_queries() {
    let (dir, files) = toy_project();
    let root = dir.path();
    write_file(root, "target/debug/gen.toy", "fn generated\n");
    write_file(root, "notes.md", "fn ignored\n");

    let engine = toy_engine(root);
    let summary = engine.index_project(root).await.unwrap();

    assert_eq!(summary.discovered, 3);
    assert_eq!(summary.indexed, 3);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.symbols, 4);

    let hits = engine.find_symbol("load").await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].score, 1.0);
    assert_eq!(hits[0].entry.file_path(), files[0].as_path());
    assert_eq!(hits[0].entry.dependencies, vec!["net".to_string()]);
    assert!(engine.find_symbol("generated").await.unwrap().is_empty());

    let variables = engine
        .find_symbols_by_type(SymbolKind::Variable)
        .await
        .unwrap();
    assert_eq!(variables.len(), 1);
    assert_eq!(variables[0].symbol.name, "cache");

    assert_eq!(
        engine
            .find_symbols_in_scope("module:src/store.toy")
            .await
            .unwrap()
            .len(),
        2
    );
    assert_eq!(engine.find_symbols_in_file(&files[1]).await.unwrap().len(), 1);

    let found = engine
        .search_symbols("ld", &SearchOptions::default())
        .await
        .unwrap();
    let names: Vec<&str> = found.iter().map(|m| m.entry.symbol.name.as_str()).collect();
    assert_eq!(names, vec!["load"]);
    assert_eq!(found[0].score, 0.5);

    assert_eq!(engine.find_files_by_extension("toy").await.unwrap().len(), 3);
    assert_eq!(engine.find_files_by_language("toy").await.unwrap().len(), 3);

    let stats = engine.get_stats().await.unwrap();
    assert_eq!(stats.files.total_files, 3);
    assert_eq!(stats.files.indexed_files, 3);
    assert_eq!(stats.files.total_dependencies, 2);
    assert_eq!(stats.symbols.total_symbols, 4);
}

#[tokio::test]
async fn parse_failure_is_recorded_and_does_not_abort_the_batch() {
    let (dir, _files) = toy_project();
    let root = dir.path();
    let broken = write_file(root, "src/broken.toy", "fn fine\n!!syntax-error\n");

    let engine = toy_engine(root);
    let summary = engine.index_project(root).await.unwrap();

    assert_eq!(summary.indexed, 3);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures[0].0, broken);

    let errors = engine.get_file_parse_errors(&broken).await.unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("broken.toy:2"), "{errors:?}");
    let entry = engine.get_file_entry(&broken).await.unwrap().unwrap();
    assert!(!entry.is_indexed);
    assert!(engine.find_symbol("fine").await.unwrap().is_empty());

    // a failed file is retried on the next run even if untouched on disk
    write_file(root, "src/broken.toy", "fn fine\n");
    set_mtime(&broken, entry.info.last_modified);
    let summary = engine.index_project(root).await.unwrap();
    assert_eq!(summary.indexed, 1);
    assert_eq!(summary.skipped, 3);
    assert!(engine.get_file_parse_errors(&broken).await.unwrap().is_empty());
    assert_eq!(engine.find_symbol("fine").await.unwrap().len(), 1);
}

#[tokio::test]
async fn reindexes_only_when_mtime_moves_forward() {
    let (dir, files) = toy_project();
    let engine = toy_engine(dir.path());
    engine.index_project(dir.path()).await.unwrap();
    let util = &files[2];

    assert_eq!(engine.index_file(util).await.unwrap(), FileUpdate::Unchanged);

    let recorded = engine
        .get_file_entry(util)
        .await
        .unwrap()
        .unwrap()
        .info
        .last_modified;
    write_file(dir.path(), "src/util.toy", "fn helper\nfn extra\n");

    set_mtime(util, recorded);
    assert_eq!(engine.index_file(util).await.unwrap(), FileUpdate::Unchanged);
    assert!(engine.find_symbol("extra").await.unwrap().is_empty());

    set_mtime(util, recorded + Duration::seconds(10));
    assert_eq!(
        engine.update_file(util).await.unwrap(),
        FileUpdate::Indexed { symbols: 2 }
    );
    assert_eq!(engine.find_symbol("extra").await.unwrap().len(), 1);
}

#[tokio::test]
async fn reindex_file_ignores_the_mtime_threshold() {
    let (dir, files) = toy_project();
    let engine = toy_engine(dir.path());
    engine.index_project(dir.path()).await.unwrap();

    let recorded = engine
        .get_file_entry(&files[2])
        .await
        .unwrap()
        .unwrap()
        .info
        .last_modified;
    write_file(dir.path(), "src/util.toy", "fn renamed_helper\n");
    set_mtime(&files[2], recorded);

    assert_eq!(
        engine.reindex_file(&files[2]).await.unwrap(),
        FileUpdate::Indexed { symbols: 1 }
    );
    assert!(engine.find_symbol("helper").await.unwrap().is_empty());
    assert_eq!(engine.find_symbol("renamed_helper").await.unwrap().len(), 1);
}

#[tokio::test]
async fn removed_files_leave_both_indexes() {
    let (dir, files) = toy_project();
    let root = dir.path();
    let engine = toy_engine(root);
    engine.index_project(root).await.unwrap();

    std::fs::remove_file(&files[2]).unwrap();
    assert_eq!(engine.update_file(&files[2]).await.unwrap(), FileUpdate::Removed);
    assert!(engine.find_symbol("helper").await.unwrap().is_empty());

    assert!(engine.remove_file(&files[1]).await.unwrap());
    assert!(!engine.remove_file(&files[1]).await.unwrap());
    assert!(engine.find_symbol("main").await.unwrap().is_empty());

    // a project run prunes files deleted behind the engine's back
    engine.index_file(&files[1]).await.unwrap();
    std::fs::remove_file(&files[1]).unwrap();
    let summary = engine.index_project(root).await.unwrap();
    assert_eq!(summary.removed, 1);
    assert_eq!(engine.indexed_files().await.unwrap(), vec![files[0].clone()]);
}

#[tokio::test]
async fn oversized_and_unsupported_files_are_skipped() {
    let (dir, files) = toy_project();
    let root = dir.path();
    let big = write_file(root, "src/big.toy", &"fn big\n".repeat(64));
    let config = IndexConfig {
        max_file_size: 128,
        ..toy_config(root)
    };
    let engine = IndexEngine::new(config, core_test_support::toy_registry()).unwrap();

    let summary = engine.index_project(root).await.unwrap();
    assert_eq!(summary.discovered, 4);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.indexed, 3);
    assert_eq!(engine.index_file(&big).await.unwrap(), FileUpdate::Skipped);

    let readme = write_file(root, "README.md", "fn nope\n");
    assert_eq!(engine.index_file(&readme).await.unwrap(), FileUpdate::Skipped);
    assert_eq!(engine.indexed_files().await.unwrap().len(), files.len());
}

#[tokio::test]
async fn dispose_is_idempotent_and_closes_the_engine() {
    let (dir, _files) = toy_project();
    let engine = toy_engine(dir.path());
    engine.index_project(dir.path()).await.unwrap();

    engine.dispose().await.unwrap();
    engine.dispose().await.unwrap();

    assert!(engine.is_disposed());
    assert!(matches!(
        engine.find_symbol("load").await,
        Err(IndexError::Disposed)
    ));
    assert!(matches!(engine.get_stats().await, Err(IndexError::Disposed)));
    assert!(matches!(
        engine.index_project(dir.path()).await,
        Err(IndexError::Disposed)
    ));
    assert!(matches!(engine.persist().await, Err(IndexError::Disposed)));
}

#[tokio::test]
async fn snapshot_written_on_dispose_restores_into_a_new_engine() {
    let (dir, files) = toy_project();
    let root = dir.path();
    let config = IndexConfig {
        enable_persistence: true,
        ..toy_config(root)
    };

    let engine = IndexEngine::new(config.clone(), core_test_support::toy_registry()).unwrap();
    engine.index_project(root).await.unwrap();
    engine.dispose().await.unwrap();
    assert!(root.join(".symdex").join("index.json").exists());

    let restored = IndexEngine::new(config, core_test_support::toy_registry()).unwrap();
    assert_eq!(restored.restore().await.unwrap(), 3);
    let hits = restored.find_symbol("load").await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].entry.file_path(), files[0].as_path());
    assert_eq!(restored.get_stats().await.unwrap().symbols.total_symbols, 4);

    // restored modification times match the disk, so nothing is reparsed
    let summary = restored.index_project(root).await.unwrap();
    assert_eq!(summary.indexed, 0);
    assert_eq!(summary.skipped, 3);
}

#[tokio::test]
async fn restore_without_snapshot_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let engine = toy_engine(dir.path());
    assert_eq!(engine.restore().await.unwrap(), 0);
}

#[tokio::test]
async fn truncated_snapshot_falls_back_to_a_full_reindex() {
    let (dir, _files) = toy_project();
    let root = dir.path();
    let config = IndexConfig {
        enable_persistence: true,
        ..toy_config(root)
    };
    let snapshot = write_file(root, ".symdex/index.json", "{\"version\": 1, \"entries\": [");

    let engine = IndexEngine::new(config.clone(), core_test_support::toy_registry()).unwrap();
    assert_eq!(engine.restore().await.unwrap(), 0);
    let summary = engine.index_project(root).await.unwrap();
    assert_eq!(summary.indexed, 3);
    engine.dispose().await.unwrap();

    // dispose replaced the broken file with a readable one
    let entries: Vec<_> = std::fs::read_dir(snapshot.parent().unwrap()).unwrap().collect();
    assert_eq!(entries.len(), 1);
    let reopened = IndexEngine::new(config, core_test_support::toy_registry()).unwrap();
    assert_eq!(reopened.restore().await.unwrap(), 3);
}

#[tokio::test]
async fn cancelled_before_start_indexes_nothing() {
    let (dir, _files) = toy_project();
    let engine = toy_engine(dir.path());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = engine
        .index_project_with_cancel(dir.path(), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, IndexError::Cancelled { indexed: 0 }));
    assert!(engine.indexed_files().await.unwrap().is_empty());
}

#[tokio::test]
async fn cancellation_mid_walk_keeps_finished_files_consistent() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let files: Vec<PathBuf> = (0..5)
        .map(|i| write_file(root, &format!("f{i}.toy"), &format!("fn item{i}\n")))
        .collect();

    let cancel = CancellationToken::new();
    let mut registry = ParserRegistry::new();
    registry.register(Arc::new(CancellingParser::new(cancel.clone(), 2)));
    let config = IndexConfig {
        max_concurrency: 1,
        ..toy_config(root)
    };
    let engine = IndexEngine::new(config, Arc::new(registry)).unwrap();

    let err = engine
        .index_project_with_cancel(root, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, IndexError::Cancelled { indexed: 2 }), "{err:?}");
    assert_eq!(engine.indexed_files().await.unwrap(), files[..2].to_vec());
    let stats = engine.get_stats().await.unwrap();
    assert_eq!(stats.files.indexed_files, 2);
    assert_eq!(stats.symbols.total_symbols, 2);
}

#[test]
fn invalid_config_is_rejected_at_construction() {
    let config = IndexConfig {
        max_concurrency: 0,
        ..IndexConfig::for_workspace("/tmp/ws")
    };
    let err = IndexEngine::new(config, core_test_support::toy_registry()).unwrap_err();
    assert!(matches!(err, IndexError::InvalidConfig(_)));
}
