/// Postal code lookup against a mocked ViaCEP service
use std::sync::Arc;
use vitrine_console::errors::AppError;
use vitrine_console::i18n::Language;
use vitrine_console::intake::{AddressInput, IntakeFlow, IntakeState, LookupStatus};
use vitrine_console::models::{Profile, ProfileValue};
use vitrine_console::postal::{PostalLookup, ViaCepClient};
use vitrine_console::storage::{KeyValueStore, KeyValueStoreExt, MemoryStore, StoreKey};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(mock_server: &MockServer) -> ViaCepClient {
    ViaCepClient::new(format!("{}/ws", mock_server.uri())).unwrap()
}

/// A flow waiting on the address question.
fn flow_at_address() -> IntakeFlow {
    let mut profile = Profile::default();
    profile.insert("gender", ProfileValue::Text("female".into()));
    profile.insert("age", ProfileValue::Number(30.0));
    profile.insert("height_cm", ProfileValue::Number(165.0));
    profile.insert("clothing_size", ProfileValue::Text("m".into()));
    profile.insert("shoe_size", ProfileValue::Number(37.0));
    profile.insert("styles", ProfileValue::Choices(vec!["casual".into()]));
    profile.insert("colors", ProfileValue::Choices(vec!["pastels".into()]));
    profile.insert("budget", ProfileValue::Text("from_100_to_300".into()));

    let store = MemoryStore::new();
    store.set(StoreKey::Email, "ana@example.com").unwrap();
    store.save_profile(&profile).unwrap();
    let store: Arc<dyn KeyValueStore> = Arc::new(store);

    let flow = IntakeFlow::load(store, Language::Pt).unwrap();
    assert_eq!(flow.state(), IntakeState::Question(8));
    flow
}

#[tokio::test]
async fn test_found_code_fills_place() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ws/01310100/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "cep": "01310-100",
            "localidade": "São Paulo",
            "uf": "SP"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let lookup = client(&mock_server);
    let place = lookup.lookup("01310100").await.unwrap().unwrap();
    assert_eq!(place.city, "São Paulo");
    assert_eq!(place.state, "SP");
    assert_eq!(place.country, "Brasil");

    // Served from cache the second time
    lookup.lookup("01310100").await.unwrap();
}

#[tokio::test]
async fn test_400_and_404_are_cached_as_not_found() {
    for status in [400u16, 404] {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/ws/99999999/json"))
            .respond_with(ResponseTemplate::new(status))
            .expect(1)
            .mount(&mock_server)
            .await;

        let lookup = client(&mock_server);
        assert_eq!(lookup.lookup("99999999").await.unwrap(), None, "status {}", status);
        assert_eq!(lookup.lookup("99999999").await.unwrap(), None, "status {}", status);
    }
}

#[tokio::test]
async fn test_erro_body_is_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ws/99999999/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"erro": true})))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ws/88888888/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"erro": "true"})))
        .mount(&mock_server)
        .await;

    let lookup = client(&mock_server);
    assert_eq!(lookup.lookup("99999999").await.unwrap(), None);
    assert_eq!(lookup.lookup("99999999").await.unwrap(), None);
    assert_eq!(lookup.lookup("88888888").await.unwrap(), None);
}

#[tokio::test]
async fn test_missing_city_or_state_is_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ws/11111111/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"uf": "SP"})))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ws/22222222/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "localidade": "Campinas",
            "uf": ""
        })))
        .mount(&mock_server)
        .await;

    let lookup = client(&mock_server);
    assert_eq!(lookup.lookup("11111111").await.unwrap(), None);
    assert_eq!(lookup.lookup("22222222").await.unwrap(), None);
}

#[tokio::test]
async fn test_server_error_is_not_cached() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ws/01310100/json"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&mock_server)
        .await;

    let lookup = client(&mock_server);
    for _ in 0..2 {
        match lookup.lookup("01310100").await.unwrap_err() {
            AppError::Upstream { status, .. } => assert_eq!(status, Some(503)),
            other => panic!("expected upstream error, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_unknown_code_adds_one_message_and_keeps_draft() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ws/99999999/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"erro": true})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let lookup = client(&mock_server);
    let mut flow = flow_at_address();
    flow.update_address(
        AddressInput {
            city: Some("Campinas".into()),
            ..Default::default()
        },
        &lookup,
    )
    .await
    .unwrap();

    let update = flow
        .update_address(
            AddressInput {
                postal_code: Some("99999-999".into()),
                ..Default::default()
            },
            &lookup,
        )
        .await
        .unwrap();

    assert_eq!(update.lookup, LookupStatus::NotFound);
    assert_eq!(update.messages.len(), 1);
    assert!(update.messages[0].as_bot().is_some());
    assert_eq!(update.draft.city, "Campinas");
    assert!(update.draft.state.is_empty());
    assert_eq!(flow.state(), IntakeState::Question(8));
}

#[tokio::test]
async fn test_failed_lookup_retries_on_resubmit() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ws/01310100/json"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ws/01310100/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "localidade": "São Paulo",
            "uf": "SP"
        })))
        .mount(&mock_server)
        .await;

    let lookup = client(&mock_server);
    let mut flow = flow_at_address();
    let input = AddressInput {
        postal_code: Some("01310100".into()),
        ..Default::default()
    };

    let update = flow.update_address(input.clone(), &lookup).await.unwrap();
    assert_eq!(update.lookup, LookupStatus::Failed);
    assert!(update.messages.is_empty());

    let update = flow.update_address(input, &lookup).await.unwrap();
    assert_eq!(update.lookup, LookupStatus::Found);
    assert_eq!(update.draft.city, "São Paulo");
}
