//! Integration tests for benchpilot-session
//!
//! Covers the bounded buffer, the durable log and the store that ties them.

use benchpilot_session::{ConversationLog, Entry, HistoryBuffer, HistoryStore, Role};
use tempfile::TempDir;

// ============================================================================
// HistoryBuffer
// ============================================================================

#[test]
fn test_buffer_keeps_last_n_in_order() {
    let mut buffer = HistoryBuffer::new(3);
    for i in 1..=5 {
        buffer.push(Role::Human, format!("request {}", i));
    }

    let contents: Vec<&str> = buffer.entries().iter().map(|e| e.content.as_str()).collect();
    assert_eq!(contents, vec!["request 3", "request 4", "request 5"]);
}

#[test]
fn test_buffer_never_exceeds_limit() {
    let mut buffer = HistoryBuffer::new(10);
    for i in 0..25 {
        buffer.push(if i % 2 == 0 { Role::Human } else { Role::Ai }, i.to_string());
        assert!(buffer.len() <= 10);
    }
    assert_eq!(buffer.entries()[0].content, "15");
}

#[test]
fn test_buffer_default_limit() {
    let buffer = HistoryBuffer::default();
    assert_eq!(buffer.max_entries(), 10);
    assert!(buffer.is_empty());
}

#[test]
fn test_shrinking_limit_truncates_oldest() {
    let mut buffer = HistoryBuffer::new(5);
    for i in 0..5 {
        buffer.push(Role::Ai, i.to_string());
    }
    buffer.set_max_entries(2);

    assert_eq!(buffer.len(), 2);
    assert_eq!(buffer.entries()[0].content, "3");
    assert_eq!(buffer.entries()[1].content, "4");
}

#[test]
fn test_clear() {
    let mut buffer = HistoryBuffer::new(5);
    buffer.push(Role::Human, "a");
    buffer.clear();
    assert!(buffer.is_empty());
}

// ============================================================================
// ConversationLog
// ============================================================================

#[tokio::test]
async fn test_log_open_creates_file_and_parents() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("logs").join("conversation_log.txt");

    let log = ConversationLog::open(&path).await.unwrap();
    assert!(path.exists());
    assert_eq!(log.read_all().await.unwrap(), "");
}

#[tokio::test]
async fn test_log_appends_lines() {
    let dir = TempDir::new().unwrap();
    let log = ConversationLog::open(dir.path().join("log.txt")).await.unwrap();

    log.append(&Entry::new(Role::Human, "measure the DC level"))
        .await
        .unwrap();
    log.append(&Entry::new(Role::Ai, "2.50 V")).await.unwrap();

    assert_eq!(
        log.read_all().await.unwrap(),
        "Human: measure the DC level\nAI: 2.50 V\n"
    );
}

#[tokio::test]
async fn test_log_reopen_keeps_existing_content() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("log.txt");

    let first = ConversationLog::open(&path).await.unwrap();
    first.append(&Entry::new(Role::Human, "one")).await.unwrap();

    let second = ConversationLog::open(&path).await.unwrap();
    second.append(&Entry::new(Role::Human, "two")).await.unwrap();

    assert_eq!(second.read_all().await.unwrap(), "Human: one\nHuman: two\n");
}

// ============================================================================
// HistoryStore
// ============================================================================

#[tokio::test]
async fn test_store_log_keeps_everything_buffer_keeps_last_n() {
    let dir = TempDir::new().unwrap();
    let log = ConversationLog::open(dir.path().join("log.txt")).await.unwrap();
    let mut store = HistoryStore::new(2, log);

    for i in 0..4 {
        store
            .record_exchange(&format!("q{}", i), &format!("a{}", i))
            .await
            .unwrap();
    }

    assert_eq!(store.buffer().len(), 2);
    assert_eq!(store.render(), "Human: q3\nAI: a3");

    let logged = store.log().unwrap().read_all().await.unwrap();
    assert_eq!(logged.lines().count(), 8);
    assert!(logged.starts_with("Human: q0\nAI: a0\n"));
}

#[tokio::test]
async fn test_store_annotate_is_log_only() {
    let dir = TempDir::new().unwrap();
    let log = ConversationLog::open(dir.path().join("log.txt")).await.unwrap();
    let mut store = HistoryStore::new(10, log);

    store.annotate(Role::Plan, "1. initialise").await.unwrap();
    store.record(Role::Human, "go").await.unwrap();

    assert_eq!(store.buffer().len(), 1);
    let logged = store.log().unwrap().read_all().await.unwrap();
    assert_eq!(logged, "Plan: 1. initialise\nHuman: go\n");
}

#[tokio::test]
async fn test_in_memory_store_writes_nothing() {
    let mut store = HistoryStore::in_memory(3);
    store.record_exchange("q", "a").await.unwrap();

    assert!(store.log().is_none());
    assert_eq!(store.buffer().len(), 2);
}

#[tokio::test]
async fn test_exchange_stays_paired_when_log_write_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("log.txt");
    let log = ConversationLog::open(&path).await.unwrap();
    let mut store = HistoryStore::new(10, log);

    // a directory where the log file was makes every append fail
    std::fs::remove_file(&path).unwrap();
    std::fs::create_dir(&path).unwrap();

    let result = store.record_exchange("measure DC", "2.5 V").await;
    assert!(result.is_err());
    assert_eq!(store.render(), "Human: measure DC\nAI: 2.5 V");
}
