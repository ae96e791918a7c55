//! Eviction of abandoned sessions and orphaned chunk artifacts.

mod common;

use chunkyard_server::reaper::{ReapStats, Reaper};
use common::*;
use serde_json::json;
use std::time::Duration;

fn reaper(server: &TestServer, ttl: Duration) -> Reaper {
    Reaper::new(server.state.registry.clone(), server.state.store.clone(), ttl)
}

#[tokio::test]
async fn test_idle_session_and_chunks_are_reaped() {
    let server = TestServer::new().await;
    server.status("abandoned.bin", 3, 12, LAST_MODIFIED).await;
    server.upload("abandoned.bin", 0, 3, b"aaaa").await;
    server.upload("abandoned.bin", 1, 3, b"bbbb").await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    server.status("active.bin", 2, 8, LAST_MODIFIED).await;
    server.upload("active.bin", 0, 2, b"cccc").await;

    let stats = reaper(&server, Duration::from_millis(30)).run_once().await;

    assert_eq!(
        stats,
        ReapStats {
            sessions: 1,
            session_chunks: 2,
            orphaned_chunks: 0,
        }
    );
    assert_eq!(server.chunk_files(), vec!["active.bin_2_chunk_0"]);

    // The abandoned upload starts over
    let (_, body) = server.status("abandoned.bin", 3, 12, LAST_MODIFIED).await;
    assert_eq!(body["uploadedChunks"], json!([]));
    let (_, body) = server.status("active.bin", 2, 8, LAST_MODIFIED).await;
    assert_eq!(body["uploadedChunks"], json!([0]));
}

#[tokio::test]
async fn test_chunks_orphaned_by_reset_are_swept() {
    let server = TestServer::new().await;
    server.status("doc.txt", 3, 12, LAST_MODIFIED).await;
    server.upload("doc.txt", 0, 3, b"old0").await;
    server.upload("doc.txt", 2, 3, b"old2").await;

    tokio::time::sleep(Duration::from_millis(50)).await;

    // New version: chunk 0 re-sent under the new session
    server.status("doc.txt", 3, 12, LAST_MODIFIED + 1).await;
    server.upload("doc.txt", 0, 3, b"new0").await;

    let stats = reaper(&server, Duration::from_millis(30)).run_once().await;

    // Both chunks of the replaced session go, the live session's chunk stays
    assert_eq!(stats.sessions, 0);
    assert_eq!(stats.orphaned_chunks, 2);
    assert_eq!(server.chunk_files(), vec!["doc.txt_2_chunk_0"]);
}

#[tokio::test]
async fn test_acknowledged_chunks_of_live_session_are_kept() {
    let server = TestServer::new().await;
    server.status("slow.bin", 3, 12, LAST_MODIFIED).await;
    server.upload("slow.bin", 0, 3, b"aaaa").await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    // Resuming keeps the session alive
    server.status("slow.bin", 3, 12, LAST_MODIFIED).await;

    let stats = reaper(&server, Duration::from_millis(30)).run_once().await;

    assert_eq!(stats, ReapStats::default());
    assert_eq!(server.chunk_files(), vec!["slow.bin_1_chunk_0"]);
}

#[tokio::test]
async fn test_chunks_without_session_are_swept() {
    let server = TestServer::new().await;
    std::fs::write(server.chunk_dir().join("ghost.bin_9_chunk_4"), b"boo").unwrap();
    std::fs::write(server.chunk_dir().join("README"), b"not a chunk").unwrap();

    // Too young to be considered abandoned
    let stats = reaper(&server, Duration::from_secs(3600)).run_once().await;
    assert_eq!(stats, ReapStats::default());

    tokio::time::sleep(Duration::from_millis(50)).await;
    let stats = reaper(&server, Duration::from_millis(30)).run_once().await;
    assert_eq!(stats.orphaned_chunks, 1);
    assert_eq!(server.chunk_files(), vec!["README"]);
}

#[tokio::test]
async fn test_reaper_leaves_output_area_alone() {
    let server = TestServer::new().await;
    server.upload_file("keep.bin", b"finished", 4).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    reaper(&server, Duration::from_millis(1)).run_once().await;

    assert_eq!(
        std::fs::read(server.output_dir().join("keep.bin")).unwrap(),
        b"finished"
    );
}
