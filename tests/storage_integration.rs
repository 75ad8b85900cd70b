/// Client store persistence across process restarts
use std::path::PathBuf;
use vitrine_console::i18n::Language;
use vitrine_console::intake::{Answer, IntakeFlow, IntakeState};
use vitrine_console::models::ProfileValue;
use vitrine_console::storage::{
    owner_key, session_key, JsonFileStore, KeyValueStore, KeyValueStoreExt, SessionStores,
    StoreKey,
};

fn scratch_dir(name: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("vitrine-{}-{}-{}", name, std::process::id(), nanos))
}

#[test]
fn test_file_store_survives_reopen() {
    let dir = scratch_dir("reopen");
    let path = dir.join("session.json");

    {
        let store = JsonFileStore::open(&path).unwrap();
        store.set(StoreKey::Email, "ana@example.com").unwrap();
        store.set(StoreKey::Theme, "dark").unwrap();
        store.remove(StoreKey::Theme).unwrap();
    }

    let reopened = JsonFileStore::open(&path).unwrap();
    assert_eq!(
        reopened.get(StoreKey::Email).unwrap().as_deref(),
        Some("ana@example.com")
    );
    assert_eq!(reopened.get(StoreKey::Theme).unwrap(), None);

    reopened.clear().unwrap();
    assert_eq!(JsonFileStore::open(&path).unwrap().get(StoreKey::Email).unwrap(), None);

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn test_intake_resumes_from_file_store() {
    let dir = scratch_dir("resume");
    let path = dir.join("session.json");

    {
        let store = std::sync::Arc::new(JsonFileStore::open(&path).unwrap());
        store.set(StoreKey::Email, "ana@example.com").unwrap();
        let mut flow = IntakeFlow::load(store, Language::Pt).unwrap();
        flow.answer(Answer::Text("Sim".into())).unwrap();
        flow.answer(Answer::Text("Masculino".into())).unwrap();
        flow.answer(Answer::Number(28.0)).unwrap();
    }

    let store = std::sync::Arc::new(JsonFileStore::open(&path).unwrap());
    assert_eq!(
        store.load_profile().unwrap().get("age"),
        Some(&ProfileValue::Number(28.0))
    );
    let flow = IntakeFlow::load(store, Language::Pt).unwrap();
    assert_eq!(flow.state(), IntakeState::Question(2));

    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_session_stores_are_isolated_and_reused() {
    let dir = scratch_dir("sessions");
    let stores = SessionStores::new(Some(dir.clone()));

    let a = stores.for_session(&session_key("token-a")).await.unwrap();
    let b = stores.for_session(&session_key("token-b")).await.unwrap();
    a.set(StoreKey::Country, "BR").unwrap();

    assert_eq!(b.get(StoreKey::Country).unwrap(), None);
    let again = stores.for_session(&session_key("token-a")).await.unwrap();
    assert_eq!(again.get(StoreKey::Country).unwrap().as_deref(), Some("BR"));

    let file = dir.join(format!("{}.json", session_key("token-a")));
    assert!(file.exists());

    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_owner_store_survives_restart_and_new_token() {
    let dir = scratch_dir("owner");
    let owner = owner_key(Some("u1"), "ana@example.com");

    {
        let stores = SessionStores::new(Some(dir.clone()));
        stores.bind(&session_key("tok-a"), &owner).await;
        let store = stores.for_token(&session_key("tok-a")).await.unwrap();
        store.set(StoreKey::Theme, "dark").unwrap();
    }

    let stores = SessionStores::new(Some(dir.clone()));
    stores.bind(&session_key("tok-b"), &owner).await;
    let store = stores.for_token(&session_key("tok-b")).await.unwrap();
    assert_eq!(store.get(StoreKey::Theme).unwrap().as_deref(), Some("dark"));
    assert!(dir.join(format!("{}.json", owner)).exists());

    let _ = std::fs::remove_dir_all(dir);
}
