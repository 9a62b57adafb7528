use serde_json::{json, Value};
use session_guard::auth::{hash_password, AuthService, SessionAuthenticator, TokenCodec};
use session_guard::configuration::JwtSettings;
use session_guard::startup::run;
use session_guard::store::{InMemoryTokenStore, TokenStore};
use session_guard::users::{InMemoryUserStore, User};
use std::net::TcpListener;
use std::sync::Arc;
use uuid::Uuid;

const TEST_COST: u32 = 4;
const ALICE_PASSWORD: &str = "S3cr3t!x";

pub struct TestApp {
    pub address: String,
    pub tokens: Arc<InMemoryTokenStore>,
    pub alice: User,
}

fn jwt_settings() -> JwtSettings {
    JwtSettings {
        access_secret: "integration-access-secret-0123456789abcdef".to_string(),
        refresh_secret: "integration-refresh-secret-0123456789abcdef".to_string(),
        access_token_expiry: 900,
        refresh_token_expiry: 604800,
        issuer: "session-guard".to_string(),
    }
}

fn spawn_app() -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let users = Arc::new(InMemoryUserStore::new());
    let alice = User {
        id: Uuid::new_v4(),
        username: "alice".to_string(),
        password_hash: hash_password(ALICE_PASSWORD, TEST_COST).unwrap(),
        is_admin: false,
    };
    users.insert(alice.clone()).unwrap();
    let tokens = Arc::new(InMemoryTokenStore::new());

    let codec = Arc::new(TokenCodec::new(&jwt_settings()));
    let service = AuthService::new(codec.clone(), tokens.clone(), users, TEST_COST)
        .expect("Failed to build auth service");
    let authenticator = Arc::new(SessionAuthenticator::new(codec));

    let server =
        run(listener, Arc::new(service), authenticator).expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp {
        address,
        tokens,
        alice,
    }
}

impl TestApp {
    async fn post(&self, path: &str, body: &Value, bearer: Option<&str>) -> reqwest::Response {
        let mut request = reqwest::Client::new()
            .post(&format!("{}{}", self.address, path))
            .json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        request.send().await.expect("Failed to execute request.")
    }

    async fn login(&self) -> (String, String) {
        let response = self
            .post(
                "/auth/login",
                &json!({"username": "alice", "password": ALICE_PASSWORD}),
                None,
            )
            .await;
        assert_eq!(200, response.status().as_u16());
        token_pair(response).await
    }

    async fn refresh(&self, refresh_token: &str) -> reqwest::Response {
        self.post(
            "/auth/refresh",
            &json!({ "refresh_token": refresh_token }),
            None,
        )
        .await
    }
}

async fn token_pair(response: reqwest::Response) -> (String, String) {
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "ok");
    (
        body["access_token"].as_str().unwrap().to_string(),
        body["refresh_token"].as_str().unwrap().to_string(),
    )
}

async fn status_of(response: reqwest::Response) -> (u16, String) {
    let code = response.status().as_u16();
    let body: Value = response.json().await.expect("Failed to parse error body");
    (code, body["status"].as_str().unwrap_or_default().to_string())
}

// --- Login ---

#[tokio::test]
async fn login_returns_token_pair_for_valid_credentials() {
    let app = spawn_app();

    let (access, refresh) = app.login().await;

    assert!(!access.is_empty());
    assert!(!refresh.is_empty());
    assert_ne!(access, refresh);
}

#[tokio::test]
async fn login_returns_401_for_wrong_password_and_unknown_user() {
    let app = spawn_app();
    let test_cases = vec![
        (json!({"username": "alice", "password": "Wr0ng!pw"}), "wrong password"),
        (json!({"username": "bob", "password": ALICE_PASSWORD}), "unknown user"),
    ];

    for (body, description) in test_cases {
        let response = app.post("/auth/login", &body, None).await;
        let (code, status) = status_of(response).await;
        assert_eq!(401, code, "Expected 401 for {}", description);
        assert_eq!("invalid-credentials", status, "Unexpected status for {}", description);
    }
}

#[tokio::test]
async fn login_returns_401_for_malformed_username() {
    let app = spawn_app();

    let response = app
        .post(
            "/auth/login",
            &json!({"username": "a!", "password": ALICE_PASSWORD}),
            None,
        )
        .await;

    let (code, status) = status_of(response).await;
    assert_eq!(401, code);
    assert_eq!("username-invalid", status);
}

#[tokio::test]
async fn login_returns_400_for_malformed_body() {
    let app = spawn_app();
    let test_cases = vec![
        (json!({"username": "alice"}), "missing the password"),
        (json!({"password": ALICE_PASSWORD}), "missing the username"),
        (json!({"username": 42, "password": ALICE_PASSWORD}), "wrong field type"),
    ];

    for (body, description) in test_cases {
        let response = app.post("/auth/login", &body, None).await;
        let (code, status) = status_of(response).await;
        assert_eq!(
            400, code,
            "The API did not fail with 400 Bad Request when the payload was {}.",
            description
        );
        assert_eq!("malformed-body", status);
    }
}

// --- Refresh ---

#[tokio::test]
async fn refresh_rotates_and_replay_revokes_family() {
    let app = spawn_app();
    let (_, r1) = app.login().await;

    let response = app.refresh(&r1).await;
    assert_eq!(200, response.status().as_u16());
    let (_, r2) = token_pair(response).await;

    let response = app.refresh(&r2).await;
    assert_eq!(200, response.status().as_u16());
    let (_, r3) = token_pair(response).await;

    // Replaying the first token revokes the whole family
    let (code, status) = status_of(app.refresh(&r1).await).await;
    assert_eq!(401, code);
    assert_eq!("token-reuse", status);

    // The newest token the legitimate client holds is gone too
    let (code, status) = status_of(app.refresh(&r3).await).await;
    assert_eq!(401, code);
    assert_eq!("token-invalid", status);
}

#[tokio::test]
async fn refresh_rejects_access_token_and_garbage() {
    let app = spawn_app();
    let (access, _) = app.login().await;

    let (code, status) = status_of(app.refresh(&access).await).await;
    assert_eq!(401, code);
    assert_eq!("invalid-signature", status);

    let (code, status) = status_of(app.refresh("not-a-jwt").await).await;
    assert_eq!(401, code);
    assert_eq!("token-invalid", status);
}

// --- Logout ---

#[tokio::test]
async fn logout_revokes_refresh_token() {
    let app = spawn_app();
    let (access, refresh) = app.login().await;

    let response = app
        .post(
            "/auth/logout",
            &json!({ "refresh_token": refresh }),
            Some(&access),
        )
        .await;
    assert_eq!(204, response.status().as_u16());

    let (code, status) = status_of(app.refresh(&refresh).await).await;
    assert_eq!(401, code);
    assert_eq!("token-invalid", status);
}

#[tokio::test]
async fn logout_requires_bearer_token() {
    let app = spawn_app();
    let (_, refresh) = app.login().await;

    let response = app
        .post("/auth/logout", &json!({ "refresh_token": refresh }), None)
        .await;

    let (code, status) = status_of(response).await;
    assert_eq!(401, code);
    assert_eq!("token-invalid", status);

    // Still usable: the unauthenticated request changed nothing
    assert_eq!(200, app.refresh(&refresh).await.status().as_u16());
}

// --- Update password ---

#[tokio::test]
async fn update_password_issues_new_family_and_revokes_others() {
    let app = spawn_app();
    let (access, old_refresh) = app.login().await;

    let response = app
        .post(
            "/auth/update-password",
            &json!({"old_password": ALICE_PASSWORD, "new_password": "N3w-passw0rd"}),
            Some(&access),
        )
        .await;
    assert_eq!(200, response.status().as_u16());
    let (_, new_refresh) = token_pair(response).await;

    let (code, _) = status_of(app.refresh(&old_refresh).await).await;
    assert_eq!(401, code);
    assert_eq!(200, app.refresh(&new_refresh).await.status().as_u16());

    let response = app
        .post(
            "/auth/login",
            &json!({"username": "alice", "password": "N3w-passw0rd"}),
            None,
        )
        .await;
    assert_eq!(200, response.status().as_u16());
}

#[tokio::test]
async fn update_password_rejects_wrong_old_password_and_weak_new_password() {
    let app = spawn_app();
    let (access, _) = app.login().await;

    let response = app
        .post(
            "/auth/update-password",
            &json!({"old_password": "Wr0ng!pw", "new_password": "N3w-passw0rd"}),
            Some(&access),
        )
        .await;
    let (code, status) = status_of(response).await;
    assert_eq!(401, code);
    assert_eq!("invalid-password", status);

    let response = app
        .post(
            "/auth/update-password",
            &json!({"old_password": ALICE_PASSWORD, "new_password": "password"}),
            Some(&access),
        )
        .await;
    let (code, status) = status_of(response).await;
    assert_eq!(400, code);
    assert_eq!("password-criteria-unmet", status);
}

// --- Persistence ---

#[tokio::test]
async fn family_keeps_one_live_token_across_rotations() {
    let app = spawn_app();
    let (_, r1) = app.login().await;
    let (_, r2) = token_pair(app.refresh(&r1).await).await;
    let (_, r3) = token_pair(app.refresh(&r2).await).await;

    let codec = TokenCodec::new(&jwt_settings());
    let claims = codec.decode_refresh(&r3).expect("Failed to decode refresh token");
    assert_eq!(claims.sub, app.alice.id.to_string());

    let family = claims.family.expect("Refresh token without family");
    assert_eq!(app.tokens.live_count(&family).unwrap(), 1);
    assert_eq!(app.tokens.family_records(&family).unwrap().len(), 3);

    let record = app
        .tokens
        .get_by_token_id(&claims.jti)
        .await
        .unwrap()
        .expect("Newest record missing");
    assert!(!record.used);
}
