//! Chaos Tests for Slot Election
//!
//! Several host instances may react to one trigger. These tests race
//! engines against a single request and verify:
//! - Exactly one engine answers and the operation runs once
//! - Losers neither write nor delete anything
//! - Election holds across the in-memory and filesystem mailboxes
//!
//! The filesystem races run on a multi-threaded runtime so the claims really
//! overlap.

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use serde_json::json;
use tempfile::TempDir;
use tokio::task::JoinSet;

use command_server_core::engine::{EngineError, InvocationState, ProtocolEngine};
use command_server_core::executor::CommandRegistry;
use command_server_core::messages::Request;
use command_server_core::transport::{
    decode_response, encode_request, guard, CommunicationDir, FixedPaths, FsMailbox, MemoryMailbox,
};

// =============================================================================
// Chaos Test Infrastructure
// =============================================================================

/// Registry with one command that counts how often it ran
fn counting_registry() -> (Arc<CommandRegistry>, Arc<AtomicUsize>) {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);

    let registry = CommandRegistry::new();
    registry.register_sync("count", move |_| {
        Ok(json!(counter.fetch_add(1, Ordering::SeqCst) + 1))
    });

    (Arc::new(registry), runs)
}

fn count_request(uuid: &str) -> Vec<u8> {
    let mut request = Request::new("count", vec![]).with_return_output(true);
    request.uuid = uuid.to_string();
    encode_request(&request).unwrap()
}

struct RaceResult {
    winners: usize,
    slot_taken: usize,
    other: usize,
}

async fn race(engines: Vec<Arc<ProtocolEngine>>) -> RaceResult {
    let mut set = JoinSet::new();
    for engine in engines {
        set.spawn(async move { engine.handle_invocation().await });
    }

    let mut result = RaceResult {
        winners: 0,
        slot_taken: 0,
        other: 0,
    };
    while let Some(joined) = set.join_next().await {
        match joined.unwrap() {
            Ok(_) => result.winners += 1,
            Err(EngineError::SlotTaken) => result.slot_taken += 1,
            Err(_) => result.other += 1,
        }
    }
    result
}

// =============================================================================
// In-Memory Races
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn chaos_memory_engines_elect_one_responder() {
    const ENGINES: usize = 8;
    const ROUNDS: usize = 50;

    for round in 0..ROUNDS {
        let mailbox = MemoryMailbox::new();
        mailbox.put_request(count_request(&format!("round-{round}")), SystemTime::now());
        let (registry, runs) = counting_registry();

        let engines = (0..ENGINES)
            .map(|_| Arc::new(ProtocolEngine::new(Arc::new(mailbox.clone()), registry.clone())))
            .collect();
        let result = race(engines).await;

        assert_eq!(result.winners, 1, "round {round}");
        assert_eq!(result.slot_taken, ENGINES - 1, "round {round}");
        assert_eq!(result.other, 0, "round {round}");
        assert_eq!(runs.load(Ordering::SeqCst), 1, "round {round}");

        let response = decode_response(&mailbox.response().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(response.uuid, format!("round-{round}"));
        assert_eq!(response.return_value, Some(json!(1)));
    }
}

// =============================================================================
// Filesystem Races
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn chaos_fs_engines_elect_one_responder() {
    const ENGINES: usize = 8;
    const ROUNDS: usize = 20;

    let temp = TempDir::new().unwrap();
    let dir = CommunicationDir::resolve(&FixedPaths::with_root(temp.path()), "chaos");
    guard::ensure(dir.path()).unwrap();

    for round in 0..ROUNDS {
        let _ = fs::remove_file(dir.response_path());
        let request = count_request(&format!("fs-{round}"));
        fs::write(dir.request_path(), &request).unwrap();
        let (registry, runs) = counting_registry();

        let engines = (0..ENGINES)
            .map(|_| {
                Arc::new(ProtocolEngine::new(
                    Arc::new(FsMailbox::new(dir.clone())),
                    registry.clone(),
                ))
            })
            .collect();
        let result = race(engines).await;

        assert_eq!(result.winners, 1, "round {round}");
        assert_eq!(result.slot_taken, ENGINES - 1, "round {round}");
        assert_eq!(runs.load(Ordering::SeqCst), 1, "round {round}");

        // Losers must not have touched either file
        assert_eq!(fs::read(dir.request_path()).unwrap(), request);
        let bytes = fs::read(dir.response_path()).unwrap();
        let response = decode_response(&bytes).unwrap().unwrap();
        assert_eq!(response.uuid, format!("fs-{round}"));
    }
}

#[tokio::test]
async fn chaos_two_invocations_same_request() {
    let temp = TempDir::new().unwrap();
    let dir = CommunicationDir::resolve(&FixedPaths::with_root(temp.path()), "pair");
    guard::ensure(dir.path()).unwrap();

    let request = count_request("pair");
    fs::write(dir.request_path(), &request).unwrap();
    let (registry, runs) = counting_registry();

    let first = ProtocolEngine::new(Arc::new(FsMailbox::new(dir.clone())), registry.clone());
    let second = ProtocolEngine::new(Arc::new(FsMailbox::new(dir.clone())), registry);

    let (a, b) = tokio::join!(first.handle_invocation(), second.handle_invocation());

    assert!(a.is_ok() != b.is_ok(), "exactly one invocation must respond");
    let loser = if a.is_ok() { &second } else { &first };
    assert_eq!(loser.last_state(), InvocationState::Failed);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    let entries: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(entries.len(), 2);
    assert_eq!(fs::read(dir.request_path()).unwrap(), request);
}

#[tokio::test]
async fn chaos_late_engine_after_answer_stays_silent() {
    let mailbox = MemoryMailbox::new();
    mailbox.put_request(count_request("once"), SystemTime::now());
    let (registry, runs) = counting_registry();

    let early = ProtocolEngine::new(Arc::new(mailbox.clone()), registry.clone());
    early.handle_invocation().await.unwrap();
    let answered = mailbox.response();

    for _ in 0..5 {
        let late = ProtocolEngine::new(Arc::new(mailbox.clone()), registry.clone());
        let err = late.handle_invocation().await.unwrap_err();
        assert!(matches!(err, EngineError::SlotTaken));
    }

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(mailbox.response(), answered);
}
