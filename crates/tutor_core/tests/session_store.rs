use pretty_assertions::assert_eq;
use tutor_core::domain::{session_key, ConversationSession, Exchange};
use tutor_core::session_store::SqliteSessionStore;

fn sample_session() -> ConversationSession {
    let mut s = ConversationSession::new(12, "Astronomy");
    s.entity_buffer_mut().merge(["Kepler", "Mars"]);
    s.push_exchange(Exchange {
        question: "Who described planetary orbits?".to_string(),
        response: "Kepler did.".to_string(),
        sources: vec!["orbits.md".to_string()],
        entities: vec!["Kepler".to_string(), "Mars".to_string()],
    });
    s
}

#[test]
fn stores_and_reloads_session_by_key() {
    let store = SqliteSessionStore::open_in_memory().expect("open");
    let key = session_key(12);
    assert_eq!(store.get(&key).expect("get"), None);

    let s = sample_session();
    store.put(&key, &s).expect("put");
    assert_eq!(store.get(&key).expect("get"), Some(s.clone()));

    let mut reset = s;
    reset.reset();
    store.put(&key, &reset).expect("overwrite");
    let got = store.get(&key).expect("get").expect("present");
    assert!(got.history().is_empty());
    assert_eq!(store.list_keys(12).expect("list"), vec![key.clone()]);

    assert!(store.delete(&key).expect("delete"));
    assert!(!store.delete(&key).expect("delete again"));
}

#[test]
fn persists_to_disk_and_clears_subject_sessions() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nested").join("sessions.sqlite");

    {
        let store = SqliteSessionStore::open(&path).expect("open");
        store.put("student-a", &sample_session()).expect("put a");
        store.put("student-b", &sample_session()).expect("put b");
        store
            .put("other", &ConversationSession::new(99, "History"))
            .expect("put other");
    }

    let store = SqliteSessionStore::open(&path).expect("reopen");
    assert_eq!(
        store.list_keys(12).expect("list"),
        vec!["student-a".to_string(), "student-b".to_string()]
    );
    assert_eq!(store.delete_for_subject(12).expect("delete subject"), 2);
    assert!(store.list_keys(12).expect("list").is_empty());
    assert!(store.get("other").expect("get").is_some());
}
