use colloquy::config::DatabaseConfig;
use colloquy::db::export;
use colloquy::db::{MessageStore, Role, StoreError};
use uuid::Uuid;

#[test]
fn test_roles_round_trip_in_insertion_order() {
    let store = MessageStore::open_in_memory().unwrap();
    let session = store.create_session().unwrap();

    let inserted = [
        (Role::System, "You are a bot"),
        (Role::User, "Hello!"),
        (Role::Assistant, ""),
        (Role::User, "Still there?"),
    ];
    let mut ids = Vec::new();
    for (role, content) in inserted {
        ids.push(store.append_message(session, role.as_str(), content).unwrap());
    }
    assert!(ids.windows(2).all(|w| w[0] < w[1]));

    let history = store.list_messages(session).unwrap();
    assert_eq!(history.len(), inserted.len());
    for (message, (role, content)) in history.iter().zip(inserted) {
        assert_eq!(message.role, role);
        assert_eq!(message.content, content);
        assert_eq!(message.session_id, session);
    }
    assert_eq!(history.iter().map(|m| m.id).collect::<Vec<_>>(), ids);

    let pairs = store.list_messages_as_pairs(session).unwrap();
    assert_eq!(pairs[1], (Role::User, "Hello!".to_string()));
}

#[test]
fn test_unknown_session_persists_nothing() {
    let store = MessageStore::open_in_memory().unwrap();
    let real = store.create_session().unwrap();
    let ghost = Uuid::new_v4();

    let err = store.append_message(ghost, "user", "anyone?").unwrap_err();
    assert!(matches!(err, StoreError::InvalidArgument(_)));

    assert!(store.list_messages(real).unwrap().is_empty());
    assert!(store.get_session(ghost).unwrap().is_none());
}

#[test]
fn test_sessions_are_isolated_and_ids_are_global() {
    let store = MessageStore::open_in_memory().unwrap();
    let a = store.create_session().unwrap();
    let b = store.create_session().unwrap();

    let first = store.append_message(a, "user", "in a").unwrap();
    let second = store.append_message(b, "user", "in b").unwrap();
    let third = store.append_message(a, "assistant", "reply a").unwrap();
    assert!(first < second && second < third);

    let in_a = store.list_messages_as_pairs(a).unwrap();
    assert_eq!(
        in_a,
        vec![
            (Role::User, "in a".to_string()),
            (Role::Assistant, "reply a".to_string())
        ]
    );
    assert_eq!(store.list_messages(b).unwrap().len(), 1);
    assert_eq!(store.list_sessions().unwrap().len(), 2);
}

#[test]
fn test_messages_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = DatabaseConfig {
        path: dir.path().join("chat.duckdb").to_string_lossy().into_owned(),
    };

    let session = {
        let store = MessageStore::open(&config).unwrap();
        let session = store.create_session().unwrap();
        store.append_message(session, "user", "remember me").unwrap();
        store.append_message(session, "assistant", "I will").unwrap();
        session
    };

    let store = MessageStore::open(&config).unwrap();
    let fetched = store.get_session(session).unwrap().expect("session should persist");
    assert_eq!(fetched.id, session);

    let history = store.list_messages(session).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].content, "remember me");
    assert_eq!(history[1].role, Role::Assistant);

    // New ids keep climbing after reopening.
    let next = store.append_message(session, "user", "again").unwrap();
    assert!(next > history[1].id);
}

#[test]
fn test_export_projections_cover_every_message() {
    let store = MessageStore::open_in_memory().unwrap();
    let session = store.create_session().unwrap();
    store.append_message(session, "user", "Ping").unwrap();
    store.append_message(session, "assistant", "Pong").unwrap();
    let messages = store.list_messages(session).unwrap();

    let rendered = export::to_json(&messages).unwrap();
    let json: serde_json::Value = serde_json::from_str(&rendered).unwrap();
    let records = json.as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1]["role"], "assistant");
    assert_eq!(records[1]["content"], "Pong");
    assert!(records[0]["created_at"].as_str().unwrap().ends_with('Z'));

    let text = export::to_transcript(&messages);
    assert!(text.contains("] USER: Ping\n\n"));
    assert!(text.contains("] ASSISTANT: Pong\n\n"));
}
