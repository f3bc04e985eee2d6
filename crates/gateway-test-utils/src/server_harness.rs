//! Test server harness for E2E testing
//!
//! Provides `MockKeycloak` (a wiremock identity provider serving a realm
//! key set) and `TestGatewayServer` for spawning real gateway instances.

use crate::crypto_fixtures::TestKeypair;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use session_gateway::config::{certs_url, Config, DEFAULT_REALM};
use session_gateway::routes::{self, init_metrics_recorder, AppState};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use tokio::task::JoinHandle;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Kid of the default realm signing key.
pub const REALM_KEY_ID: &str = "bsw-realm-key-1";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Process-wide Prometheus handle.
///
/// The global recorder can only be installed once per process; later callers
/// get a detached handle.
pub fn test_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            init_metrics_recorder()
                .unwrap_or_else(|_| PrometheusBuilder::new().build_recorder().handle())
        })
        .clone()
}

/// Path of the realm certs endpoint on the mock identity provider.
pub fn realm_certs_path() -> String {
    format!("/realms/{}/protocol/openid-connect/certs", DEFAULT_REALM)
}

/// Identity provider stand-in serving the realm key set.
pub struct MockKeycloak {
    server: MockServer,
    keypair: TestKeypair,
}

impl MockKeycloak {
    /// Start a mock that publishes the default realm key.
    pub async fn start() -> Self {
        let keycloak = Self::start_empty().await;
        keycloak.mount_keys(keycloak.keypair.jwks_json()).await;
        keycloak
    }

    /// Start a mock with no certs endpoint mounted.
    pub async fn start_empty() -> Self {
        Self {
            server: MockServer::start().await,
            keypair: TestKeypair::new(1, REALM_KEY_ID),
        }
    }

    /// Serve `body` from the certs endpoint.
    pub async fn mount_keys(&self, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(realm_certs_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Answer the certs endpoint with `status`.
    pub async fn mount_status(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path(realm_certs_path()))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Base URL of the mock.
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Full certs URL of the mock.
    pub fn certs_url(&self) -> String {
        certs_url(&self.server.uri(), DEFAULT_REALM)
    }

    /// The realm signing key.
    pub fn keypair(&self) -> &TestKeypair {
        &self.keypair
    }

    /// Sign claims with the realm key.
    pub fn sign(&self, claims: &serde_json::Value) -> String {
        self.keypair.sign(claims)
    }

    /// Underlying wiremock server.
    pub fn server(&self) -> &MockServer {
        &self.server
    }

    /// Number of key set requests received so far.
    pub async fn certs_requests(&self) -> usize {
        let certs_path = realm_certs_path();
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.url.path() == certs_path)
            .count()
    }
}

/// Test harness for spawning the session gateway in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health_flow_e2e() -> Result<()> {
///     let keycloak = MockKeycloak::start().await;
///     let server = TestGatewayServer::spawn(&keycloak).await?;
///
///     let response = reqwest::get(format!("{}/health", server.url())).await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestGatewayServer {
    addr: SocketAddr,
    config: Config,
    _handle: JoinHandle<()>,
}

impl TestGatewayServer {
    /// Spawn a gateway whose internal identity provider URL is the mock.
    ///
    /// The public URL keeps its default, so tokens must carry
    /// [`crate::token_builders::DEFAULT_ISSUER`].
    pub async fn spawn(keycloak: &MockKeycloak) -> Result<Self, anyhow::Error> {
        Self::spawn_with(keycloak, HashMap::new()).await
    }

    /// Spawn with additional configuration variables.
    pub async fn spawn_with(
        keycloak: &MockKeycloak,
        overrides: HashMap<String, String>,
    ) -> Result<Self, anyhow::Error> {
        let mut vars = HashMap::from([
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("KEYCLOAK_INTERNAL_URL".to_string(), keycloak.uri()),
            ("HTTP_TIMEOUT_MS".to_string(), "2000".to_string()),
            ("VERIFY_BASE_DELAY_MS".to_string(), "10".to_string()),
        ]);
        vars.extend(overrides);

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let state = Arc::new(AppState::from_config(config.clone()));
        let app = routes::build_routes(state, test_metrics_handle());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for TestGatewayServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
