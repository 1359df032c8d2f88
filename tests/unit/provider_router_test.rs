use ragchat_controller::{
    config::ProviderDefaults,
    models::internal::{Connector, ProviderKind},
    services::{
        llm::{LanguageModel, ModelRequest},
        provider_router::{ModelFactory, ProviderRouteError, ProviderRouter},
    },
};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn connector(provider: ProviderKind, api_key: Option<&str>) -> Connector {
    Connector {
        id: Uuid::new_v4(),
        organization_id: Uuid::new_v4(),
        provider,
        model: None,
        api_key: api_key.map(str::to_string),
        endpoint: None,
        api_version: None,
    }
}

#[tokio::test]
async fn test_router_builds_anthropic_backend_against_override() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("x-api-key", "from-connector"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{ "type": "text", "text": "routed" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let router = ProviderRouter::new(ProviderDefaults {
        anthropic_api_key: Some("default-key".to_string()),
        anthropic_base_url: Some(server.uri()),
        ..Default::default()
    });

    let resolved = router
        .resolve(&connector(ProviderKind::Anthropic, Some("from-connector")))
        .unwrap();
    let model = router.build(&resolved);

    assert!(model.name().starts_with("anthropic/"));
    let response = model
        .complete(&ModelRequest::prompt("", "hi", 16))
        .await
        .unwrap();
    assert_eq!(response.text, "routed");
}

#[tokio::test]
async fn test_router_builds_openai_backend_with_default_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-default"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": "openai routed" } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let router = ProviderRouter::new(ProviderDefaults {
        openai_api_key: Some("sk-default".to_string()),
        openai_base_url: Some(server.uri()),
        ..Default::default()
    });

    let resolved = router.resolve(&connector(ProviderKind::OpenAi, None)).unwrap();
    let response = router
        .build(&resolved)
        .complete(&ModelRequest::prompt("", "hi", 16))
        .await
        .unwrap();
    assert_eq!(response.text, "openai routed");
}

#[test]
fn test_custom_provider_needs_base_url() {
    let router = ProviderRouter::new(ProviderDefaults::default());
    let err = router
        .resolve(&connector(ProviderKind::Custom, Some("key")))
        .unwrap_err();

    assert!(matches!(err, ProviderRouteError::MissingEndpoint(ProviderKind::Custom)));
    assert_eq!(err.provider(), ProviderKind::Custom);
}

#[test]
fn test_blank_connector_key_counts_as_missing() {
    let router = ProviderRouter::new(ProviderDefaults::default());
    let err = router
        .resolve(&connector(ProviderKind::Copilot, Some("   ")))
        .unwrap_err();
    assert!(matches!(err, ProviderRouteError::MissingCredential(ProviderKind::Copilot)));
}
