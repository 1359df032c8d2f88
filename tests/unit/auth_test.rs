use axum::{
    body::Body,
    http::{Request, StatusCode},
    routing::get,
    Extension, Router,
};
use ragchat_controller::{
    auth::{TenantIdentity, MEMBER_HEADER, ORGANIZATION_HEADER},
    config::Config,
};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

const KEY: &str = "auth_test_key_1234567890123456789012";

async fn whoami(identity: TenantIdentity) -> String {
    format!("{}/{}", identity.organization_id, identity.member_id)
}

fn app() -> Router {
    let config = Arc::new(Config {
        api_key: KEY.to_string(),
        ..Config::default()
    });
    Router::new()
        .route("/whoami", get(whoami))
        .layer(Extension(config))
}

fn request(auth: Option<&str>, org: Option<&str>, member: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri("/whoami");
    if let Some(auth) = auth {
        builder = builder.header("Authorization", auth);
    }
    if let Some(org) = org {
        builder = builder.header(ORGANIZATION_HEADER, org);
    }
    if let Some(member) = member {
        builder = builder.header(MEMBER_HEADER, member);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_valid_key_and_tenant_headers() {
    let (org, member) = (Uuid::new_v4(), Uuid::new_v4());
    let response = app()
        .oneshot(request(
            Some(&format!("Bearer {}", KEY)),
            Some(&org.to_string()),
            Some(&member.to_string()),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(String::from_utf8(body.to_vec()).unwrap(), format!("{}/{}", org, member));
}

#[tokio::test]
async fn test_rejections() {
    let (org, member) = (Uuid::new_v4().to_string(), Uuid::new_v4().to_string());
    let bearer = format!("Bearer {}", KEY);

    let cases = [
        request(None, Some(&org), Some(&member)),
        request(Some(KEY), Some(&org), Some(&member)),
        request(Some("Bearer short"), Some(&org), Some(&member)),
        request(Some(&bearer), None, Some(&member)),
        request(Some(&bearer), Some(&org), Some("not-a-uuid")),
    ];

    for req in cases {
        let response = app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
