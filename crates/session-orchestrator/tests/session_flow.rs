//! End-to-end session flows: scripted host, real HTTP credential backend
//! against a mock middleware server.

use credential_provisioning::{HttpCredentialBackend, ProvisioningService};
use identity_session::testing::{test_token, MockHost};
use identity_session::{AuthError, AuthSessionController, AuthorizationStatus, LoginOutcome};
use session_config_and_utils::{CLIENT_ID_ENV, CLIENT_SECRET_ENV};
use session_orchestrator::{
    BearerApiClient, CredentialView, OrchestratorError, SessionOrchestrator, ViewPhase,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

type Env = Arc<Mutex<HashMap<String, String>>>;

fn env_with_credentials() -> Env {
    let vars = [
        (CLIENT_ID_ENV.to_string(), "agency-app".to_string()),
        (CLIENT_SECRET_ENV.to_string(), "s3cret".to_string()),
    ];
    Arc::new(Mutex::new(vars.into_iter().collect()))
}

fn ada_token() -> String {
    test_token(&serde_json::json!({ "oid": "ada-1", "name": "Ada Lovelace" }))
}

async fn middleware() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "downstream-token",
            "expires_in": 3600
        })))
        .mount(&server)
        .await;
    server
}

fn orchestrator(
    host: &Arc<MockHost>,
    server: &MockServer,
    env: &Env,
    auto_login: bool,
) -> SessionOrchestrator {
    let backend = HttpCredentialBackend::new(server.uri(), Duration::from_secs(5)).unwrap();
    let env = env.clone();
    let credentials = ProvisioningService::with_env_lookup(Arc::new(backend), move |name| {
        env.lock().unwrap().get(name).cloned()
    });
    let auth = AuthSessionController::new(host.clone());
    SessionOrchestrator::new(Arc::new(auth), Arc::new(credentials), auto_login)
}

#[tokio::test]
async fn test_cached_session_provisions_credentials_on_start() {
    let server = middleware().await;
    let host = Arc::new(MockHost::new().with_token(&ada_token()));
    let orchestrator = orchestrator(&host, &server, &env_with_credentials(), true);

    assert_eq!(orchestrator.view(), ViewPhase::CheckingAuthentication);
    orchestrator.start().await.unwrap();

    assert!(orchestrator.auth().is_authenticated());
    assert!(orchestrator.credentials().state().is_ready);
    assert_eq!(host.authorization_calls(), 0);
    assert_eq!(
        orchestrator.view(),
        ViewPhase::SignedIn {
            greeting: "Hi Ada Lovelace".to_string(),
            credentials: CredentialView::Ready {
                status_label: "Connected"
            },
        }
    );
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_missing_session_triggers_one_automatic_login() {
    let server = middleware().await;
    let host = Arc::new(MockHost::new().with_refreshed_token(&ada_token()));
    let orchestrator = orchestrator(&host, &server, &env_with_credentials(), true);

    orchestrator.start().await.unwrap();

    assert_eq!(host.authorization_calls(), 1);
    assert!(orchestrator.auth().is_authenticated());
    assert!(orchestrator.credentials().state().is_ready);
    assert!(orchestrator.view().is_signed_in());
}

#[tokio::test]
async fn test_unconfigured_oauth_shows_configuration_required() {
    let server = middleware().await;
    let host = Arc::new(MockHost::new());
    let orchestrator = orchestrator(&host, &server, &env_with_credentials(), true);

    orchestrator.start().await.unwrap();
    orchestrator.pump().await;

    assert_eq!(host.authorization_calls(), 1);
    let state = orchestrator.auth().get_state();
    assert_eq!(
        state.error,
        Some(AuthError::AuthorizationNotConfigured.to_string())
    );
    assert_eq!(orchestrator.view(), ViewPhase::ConfigurationRequired);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_auto_login_disabled_stays_connecting() {
    let server = middleware().await;
    let host = Arc::new(MockHost::new().with_refreshed_token(&ada_token()));
    let orchestrator = orchestrator(&host, &server, &env_with_credentials(), false);

    orchestrator.start().await.unwrap();

    assert_eq!(host.authorization_calls(), 0);
    assert_eq!(orchestrator.view(), ViewPhase::Connecting);

    let outcome = orchestrator.login().await.unwrap();
    assert_eq!(outcome, LoginOutcome::Authenticated);
    assert!(orchestrator.credentials().state().is_ready);
}

#[tokio::test]
async fn test_cancelled_login_is_reported_once() {
    let server = middleware().await;
    let host = Arc::new(MockHost::new().with_authorization(AuthorizationStatus::Aborted));
    let orchestrator = orchestrator(&host, &server, &env_with_credentials(), true);

    orchestrator.start().await.unwrap();
    orchestrator.pump().await;

    assert_eq!(host.authorization_calls(), 1);
    assert_eq!(
        orchestrator.auth().get_state().error.as_deref(),
        Some(identity_session::CANCELLED_MESSAGE)
    );
    assert_eq!(orchestrator.view(), ViewPhase::ConfigurationRequired);
}

#[tokio::test]
async fn test_logout_resets_credentials_even_when_host_fails() {
    let server = middleware().await;
    let host = Arc::new(
        MockHost::new()
            .with_token(&ada_token())
            .failing_deauthorize("network down"),
    );
    let orchestrator = orchestrator(&host, &server, &env_with_credentials(), false);
    orchestrator.start().await.unwrap();
    assert!(orchestrator.credentials().access_token().is_some());

    let err = orchestrator.logout().await.unwrap_err();

    assert!(matches!(err, OrchestratorError::Auth(AuthError::Host(_))));
    let auth = orchestrator.auth().get_state();
    assert!(!auth.is_authenticated);
    assert_eq!(auth.access_token, None);
    assert_eq!(auth.user, None);
    assert_eq!(auth.error.as_deref(), Some("network down"));
    assert_eq!(orchestrator.credentials().state(), Default::default());
    assert_eq!(orchestrator.credentials().access_token(), None);
}

#[tokio::test]
async fn test_logout_rejected_during_login_keeps_credentials() {
    let server = middleware().await;
    let host = Arc::new(MockHost::new().with_token(&ada_token()));
    let orchestrator = Arc::new(orchestrator(&host, &server, &env_with_credentials(), false));
    orchestrator.start().await.unwrap();
    assert!(orchestrator.credentials().state().is_ready);

    let gate = host.hold_authorization();
    let login = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.login().await })
    };
    while host.authorization_calls() == 0 {
        tokio::task::yield_now().await;
    }

    let err = orchestrator.logout().await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::Auth(AuthError::OperationInFlight(_))
    ));
    assert_eq!(host.deauthorize_calls(), 0);
    assert!(orchestrator.auth().is_authenticated());
    assert!(orchestrator.credentials().state().is_ready);
    assert_eq!(
        orchestrator.credentials().access_token().as_deref(),
        Some("downstream-token")
    );

    gate.notify_one();
    assert_eq!(login.await.unwrap().unwrap(), LoginOutcome::Authenticated);
    orchestrator.pump().await;

    assert!(orchestrator.credentials().state().is_ready);
    assert_eq!(
        orchestrator.view(),
        ViewPhase::SignedIn {
            greeting: "Hi Ada Lovelace".to_string(),
            credentials: CredentialView::Ready {
                status_label: "Connected"
            },
        }
    );
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_sign_in_again_after_logout_reprovisions() {
    let server = middleware().await;
    let host = Arc::new(MockHost::new().with_token(&ada_token()));
    let orchestrator = orchestrator(&host, &server, &env_with_credentials(), false);
    orchestrator.start().await.unwrap();

    orchestrator.logout().await.unwrap();
    assert!(!orchestrator.credentials().state().is_ready);

    orchestrator.login().await.unwrap();
    assert!(orchestrator.credentials().state().is_ready);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_missing_client_env_requires_setup_until_retry() {
    let server = middleware().await;
    let env: Env = Arc::new(Mutex::new(HashMap::new()));
    let host = Arc::new(MockHost::new().with_token(&ada_token()));
    let orchestrator = orchestrator(&host, &server, &env, true);

    orchestrator.start().await.unwrap();

    match orchestrator.view() {
        ViewPhase::SignedIn {
            credentials:
                CredentialView::SetupRequired {
                    error,
                    required_env_vars,
                },
            ..
        } => {
            assert!(error.unwrap().contains(CLIENT_ID_ENV));
            assert_eq!(required_env_vars, vec![CLIENT_ID_ENV, CLIENT_SECRET_ENV]);
        }
        other => panic!("unexpected view: {other:?}"),
    }

    *env.lock().unwrap() = env_with_credentials().lock().unwrap().clone();
    orchestrator.retry_credentials().await.unwrap();

    assert!(orchestrator.credentials().state().is_ready);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_fetch_json_uses_downstream_token() {
    let server = middleware().await;
    Mock::given(method("GET"))
        .and(path("/v1/me"))
        .and(header("authorization", "Bearer downstream-token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "agency": "North" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let host = Arc::new(MockHost::new().with_token(&ada_token()));
    let orchestrator = orchestrator(&host, &server, &env_with_credentials(), true);
    let client = BearerApiClient::new(server.uri(), Duration::from_secs(5)).unwrap();

    let before = orchestrator
        .fetch_json::<serde_json::Value>(&client, "v1/me")
        .await
        .unwrap_err();
    assert!(matches!(before, OrchestratorError::CredentialsNotReady));

    orchestrator.start().await.unwrap();
    let body: serde_json::Value = orchestrator.fetch_json(&client, "v1/me").await.unwrap();
    assert_eq!(body["agency"], "North");
}

#[tokio::test]
async fn test_run_loop_reacts_to_snapshots() {
    let server = middleware().await;
    let host = Arc::new(MockHost::new().with_token(&ada_token()));
    let orchestrator = Arc::new(orchestrator(&host, &server, &env_with_credentials(), false));

    let runner = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.run().await })
    };

    orchestrator.auth().initialize().await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while !orchestrator.credentials().state().is_ready {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(orchestrator.pump().await, 0);
    runner.abort();
}
