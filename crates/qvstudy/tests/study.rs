//! Study workflow tests against real and in-memory databases.

use proptest::prelude::*;
use qvstudy::{
    AudioEncoder, Stage, StudyError, StudyResult, StudyStore, Topic, TopicFlow,
    WavArtifactStore,
};
use qvstudy_core::Database;
use std::collections::BTreeSet;
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::tempdir;

fn memory_store() -> StudyStore {
    StudyStore::open(Arc::new(Database::open_in_memory().unwrap())).unwrap()
}

fn wav() -> Vec<u8> {
    let mut data = b"RIFF\x24\0\0\0WAVEfmt ".to_vec();
    data.extend_from_slice(&[0u8; 24]);
    data
}

/// Names artifacts without writing them.
#[derive(Debug, Clone, Copy)]
struct FixedName;

impl AudioEncoder for FixedName {
    fn encode(&self, user: &str, topic: &str, _audio: &[u8]) -> StudyResult<String> {
        Ok(format!("{user}-{topic}-0.wav"))
    }
}

#[test]
fn unknown_user_is_not_found() {
    let store = memory_store();
    store.add_user("alice", &["t1"]).unwrap();
    assert!(store.get_topics("bob").unwrap_err().is_not_found());
    assert!(store.get_topic("bob", "t1").unwrap_err().is_not_found());
}

#[test]
fn removed_user_disappears() {
    let store = memory_store();
    store.add_user("alice", &["t1"]).unwrap();
    store.add_user("bob", &["t2"]).unwrap();

    assert!(store.remove_user("alice").unwrap());
    assert!(store.get_topics("alice").unwrap_err().is_not_found());
    let names: Vec<String> = store.list_users().unwrap().into_iter().map(|u| u.name).collect();
    assert_eq!(names, vec!["bob"]);

    // A second removal is a no-op.
    assert!(!store.remove_user("alice").unwrap());
}

#[test]
fn update_topic_is_idempotent() {
    let store = memory_store();
    store.add_user("alice", &["t1"]).unwrap();
    let mut topic = store.get_topic("alice", "t1").unwrap();
    topic.query1 = "hello".into();

    store.update_topic("alice", &topic).unwrap();
    let once = store.get_topics("alice").unwrap();
    store.update_topic("alice", &topic).unwrap();
    assert_eq!(store.get_topics("alice").unwrap(), once);
}

#[test]
fn complete_compares_against_stored_query() {
    let store = memory_store();
    store.add_user("alice", &["t1"]).unwrap();
    let flow = TopicFlow::new(store, FixedName);
    flow.record("alice", "t1", b"audio").unwrap();
    flow.confirm("alice", "t1", "cat").unwrap();

    let err = flow.complete("alice", "t1", "dog").unwrap_err();
    assert!(matches!(err, StudyError::ValidationFailed { .. }));
    let stored = flow.listen("alice", "t1").unwrap();
    assert!(!stored.completed);
    assert_eq!(stored.query1, "cat");

    let done = flow.complete("alice", "t1", "cat").unwrap();
    assert!(done.completed);
    assert_eq!(flow.listen("alice", "t1").unwrap(), done);
}

#[test]
fn concurrent_confirms_store_one_whole_value() {
    const THREADS: usize = 8;

    let store = memory_store();
    store.add_user("alice", &["t1"]).unwrap();
    let flow = Arc::new(TopicFlow::new(store, FixedName));
    let barrier = Arc::new(Barrier::new(THREADS));

    let reader = {
        let flow = Arc::clone(&flow);
        thread::spawn(move || {
            let mut seen = Vec::new();
            for _ in 0..200 {
                seen.push(flow.listen("alice", "t1").unwrap().query1);
            }
            seen
        })
    };

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let flow = Arc::clone(&flow);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let query = format!("query from writer {i}");
                barrier.wait();
                flow.confirm("alice", "t1", &query).unwrap();
                query
            })
        })
        .collect();

    let candidates: BTreeSet<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for seen in reader.join().unwrap() {
        assert!(seen.is_empty() || candidates.contains(&seen), "partial value {seen:?}");
    }

    let stored = flow.listen("alice", "t1").unwrap();
    assert!(candidates.contains(&stored.query1));

    // Every confirm is its own commit: init, add_user, then one per writer.
    assert_eq!(
        flow.store().database().committed_seq().as_u64(),
        2 + THREADS as u64
    );
}

#[test]
fn alice_scenario_on_disk() {
    let dir = tempdir().unwrap();
    let db_dir = dir.path().join("study.db");
    let audio_dir = dir.path().join("audio");

    {
        let db = Arc::new(Database::open(&db_dir).unwrap());
        let store = StudyStore::open(db).unwrap();
        store.add_user("alice", &["topicA", "topicB"]).unwrap();

        let flow = TopicFlow::new(store, WavArtifactStore::new(&audio_dir));
        let listened = flow.listen("alice", "topicA").unwrap();
        assert_eq!(listened.stage(), Stage::Assigned);

        let recorded = flow.record("alice", "topicA", &wav()).unwrap();
        assert_eq!(recorded.stage(), Stage::Recorded);
        assert!(audio_dir.join(&recorded.filename).is_file());

        flow.confirm("alice", "topicA", "hello world").unwrap();
        let done = flow.complete("alice", "topicA", "hello world").unwrap();
        assert_eq!(done.stage(), Stage::Completed);
    }

    let store = StudyStore::open(Arc::new(Database::open(&db_dir).unwrap())).unwrap();
    let topics = store.get_topics("alice").unwrap();
    assert_eq!(topics.len(), 2);
    let a = &topics[0];
    assert_eq!(a.topic, "topicA");
    assert!(a.completed);
    assert_eq!(a.query1, "hello world");
    assert_eq!(a.query2, "hello world");
    assert!(a.filename.starts_with("alice-topicA-"));
    assert_eq!(topics[1], Topic::new("alice", "topicB"));
}

#[test]
fn data_survives_checkpoint_and_reopen() {
    let dir = tempdir().unwrap();
    let db_dir = dir.path().join("study.db");
    {
        let db = Arc::new(Database::open(&db_dir).unwrap());
        let store = StudyStore::open(Arc::clone(&db)).unwrap();
        store.add_user("alice", &["t1"]).unwrap();
        db.checkpoint().unwrap();
        store.add_user("bob", &["t2"]).unwrap();
    }
    let store = StudyStore::open(Arc::new(Database::open(&db_dir).unwrap())).unwrap();
    assert_eq!(store.list_users().unwrap().len(), 2);
    assert_eq!(store.get_topics("bob").unwrap()[0].topic, "t2");
}

fn name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,11}"
}

proptest! {
    #[test]
    fn add_user_then_get_topics_returns_fresh_topics(
        user in name(),
        topics in prop::collection::btree_set(name(), 0..8),
    ) {
        let store = memory_store();
        let topics: Vec<String> = topics.into_iter().collect();
        store.add_user(&user, &topics).unwrap();

        let stored = store.get_topics(&user).unwrap();
        let names: Vec<&str> = stored.iter().map(|t| t.topic.as_str()).collect();
        let expected: Vec<&str> = topics.iter().map(String::as_str).collect();
        prop_assert_eq!(names, expected);
        for topic in &stored {
            prop_assert_eq!(topic, &Topic::new(user.as_str(), topic.topic.as_str()));
        }

        let users = store.list_users().unwrap();
        prop_assert_eq!(users.len(), 1);
        prop_assert_eq!(&users[0].topics, &topics);
    }
}
