use std::time::{Duration, Instant};

use log::{info, warn};
use tokio::time::sleep;

use super::{
    authorization::{AppIdentity, AuthStatus, AuthorizationClient, AuthorizationGrant},
    configuration::Configuration,
    discovery,
    endpoints::EndpointSet,
    session::{Session, SessionManager},
    token_store::{FileTokenStore, TokenStore},
    transport::{ApiError, ApiGateway},
};

/// Delay-then-retry schedule for approval polling. The protocol keeps
/// reporting `Pending` for as long as the user has not answered the
/// LCD prompt, so the caller owns the pacing and the overall budget.
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max_interval: Duration,
    pub budget: Duration,
}

impl BackoffPolicy {
    pub fn new(initial: Duration, max_interval: Duration, budget: Duration) -> Self {
        Self {
            initial,
            max_interval,
            budget,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(2),
            max_interval: Duration::from_secs(30),
            budget: Duration::from_secs(600),
        }
    }
}

/// Re-polls the authorization status under `policy` until the grant
/// reaches a terminal state or the wall-clock budget runs out.
pub async fn wait_for_grant(
    client: &AuthorizationClient<'_>,
    mut grant: AuthorizationGrant,
    policy: &BackoffPolicy,
) -> Result<AuthorizationGrant, ApiError> {
    let started = Instant::now();
    let mut interval = policy.initial;

    loop {
        if grant.status.is_terminal() {
            return match grant.status {
                AuthStatus::Granted => {
                    info!("application access granted");
                    Ok(grant)
                }
                status => Err(status.as_failure().unwrap_or(ApiError::AuthorizationUnknown)),
            };
        }

        if started.elapsed() + interval > policy.budget {
            warn!("authorization polling budget exhausted");
            return Err(ApiError::AuthorizationTimeout);
        }

        sleep(interval).await;
        interval = std::cmp::min(interval * 2, policy.max_interval);

        grant.status = client.poll_status(grant.track_id).await?;
    }
}

async fn bootstrap(conf: &Configuration) -> Result<(ApiGateway, EndpointSet), ApiError> {
    let host = conf.api_host();

    let descriptor = if conf.api.discovery.unwrap_or(false) {
        match discovery::fetch_descriptor(&host, true).await {
            Ok(descriptor) => Some(descriptor),
            Err(e) => {
                warn!("discovery failed, falling back to the default api path: {e}");
                None
            }
        }
    } else {
        None
    };

    let endpoints = EndpointSet::resolve(&host, descriptor.as_ref());

    info!("using api base: {}", endpoints.login);

    let gateway = ApiGateway::new()?;

    Ok((gateway, endpoints))
}

/// Grants hit by these failures can never open a session again; the
/// stored copy must go so the next registration starts from scratch.
async fn discard_grant(store: &dyn TokenStore, error: &ApiError) {
    if !matches!(
        error,
        ApiError::AuthorizationDenied
            | ApiError::AuthorizationTimeout
            | ApiError::AuthorizationUnknown
            | ApiError::InvalidToken
    ) {
        return;
    }

    info!("discarding the stored grant, a fresh registration is required");

    if let Err(e) = store.clear().await {
        warn!("cannot discard the stored grant: {e}");
    }
}

fn data_dir(conf: &Configuration) -> String {
    conf.core
        .data_directory
        .clone()
        .unwrap_or_else(|| ".".to_string())
}

async fn open_authenticated_session(
    conf: &Configuration,
    gateway: &ApiGateway,
    endpoints: &EndpointSet,
    identity: &AppIdentity,
) -> Result<Session, Box<dyn std::error::Error + Send + Sync>> {
    let store = FileTokenStore::new(&data_dir(conf));

    let stored = store.load().await?.ok_or_else(|| {
        std::io::Error::other("application is not registered, run the register command first")
    })?;

    let client = AuthorizationClient::new(gateway, endpoints, &store);

    let mut grant = AuthorizationGrant::from_stored(stored);
    grant.status = client.poll_status(grant.track_id).await?;

    if let Some(failure) = grant.status.as_failure() {
        discard_grant(&store, &failure).await;
        return Err(Box::new(failure));
    }

    let manager = SessionManager::new(gateway, endpoints, identity);

    match manager.open_session(&grant).await {
        Ok(session) => Ok(session),
        Err(e) => {
            discard_grant(&store, &e).await;
            Err(Box::new(e))
        }
    }
}

/// Registers the application and waits for the user to approve it on
/// the appliance, re-using a previously persisted registration track
/// when one exists.
pub async fn register(
    conf: &Configuration,
    policy: &BackoffPolicy,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    conf.assert_data_dir_permissions()
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    conf.assert_app_id_is_not_empty()
        .map_err(|_| std::io::Error::other("app.app_id must not be blank"))?;

    let (gateway, endpoints) = bootstrap(conf).await?;
    let identity = conf.app_identity()?;

    let store = FileTokenStore::new(&data_dir(conf));
    let client = AuthorizationClient::new(&gateway, &endpoints, &store);

    let grant = client.register(&identity).await?;
    let grant = wait_for_grant(&client, grant, policy).await?;

    info!("successfully registered application (track {})", grant.track_id);

    Ok(())
}

/// Opens a session with the persisted grant and reports the outcome.
pub async fn session_diagnostic(
    conf: &Configuration,
    show_token: bool,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (gateway, endpoints) = bootstrap(conf).await?;
    let identity = conf.app_identity()?;

    let session = open_authenticated_session(conf, &gateway, &endpoints, &identity).await?;

    info!("session successfully opened");

    if show_token {
        println!("SESSION_TOKEN: {}", session.token());
    }

    Ok(())
}

/// Fetches the call log through the generic call endpoint and prints
/// it. Kept deliberately thin: everything goes through the gateway's
/// generic wrapper.
pub async fn call_log(
    conf: &Configuration,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (gateway, endpoints) = bootstrap(conf).await?;
    let identity = conf.app_identity()?;

    open_authenticated_session(conf, &gateway, &endpoints, &identity).await?;

    let envelope = match gateway
        .call::<serde_json::Value, ()>(&endpoints.call, None)
        .await
    {
        Ok(envelope) => envelope,
        Err(ApiError::AuthRequired) => {
            // implicit session expiry, log in again and replay once
            gateway.clear_session_token().await;
            open_authenticated_session(conf, &gateway, &endpoints, &identity).await?;

            gateway
                .call::<serde_json::Value, ()>(&endpoints.call, None)
                .await?
        }
        Err(e) => return Err(Box::new(e)),
    };
    let entries = envelope.into_result("call/log/")?;

    println!("{}", serde_json::to_string_pretty(&entries)?);

    Ok(())
}

#[cfg(test)]
mod tests {

    use std::time::Duration;

    use serde_json::json;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use crate::core::{
        authorization::{AuthStatus, AuthorizationClient, AuthorizationGrant},
        endpoints::EndpointSet,
        token_store::MockTokenStore,
        transport::{ApiError, ApiGateway},
    };

    use super::{discard_grant, wait_for_grant, BackoffPolicy};

    fn endpoints_for(mock_server: &MockServer) -> EndpointSet {
        EndpointSet {
            login: format!("{}/api/v1/login/", mock_server.uri()),
            authorize: format!("{}/api/v1/login/authorize/", mock_server.uri()),
            session: format!("{}/api/v1/login/session/", mock_server.uri()),
            call: format!("{}/api/v1/call/log/", mock_server.uri()),
        }
    }

    fn fast_policy() -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(10),
            Duration::from_millis(20),
            Duration::from_secs(5),
        )
    }

    fn pending_grant() -> AuthorizationGrant {
        AuthorizationGrant {
            app_token: "abc".to_string(),
            track_id: 7,
            status: AuthStatus::Pending,
        }
    }

    #[tokio::test]
    async fn wait_for_grant_polls_until_granted() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/login/authorize/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": { "status": "pending" }, "success": true,
            })))
            .up_to_n_times(2)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/v1/login/authorize/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": { "status": "granted" }, "success": true,
            })))
            .mount(&mock_server)
            .await;

        let store = MockTokenStore::new();
        let gateway = ApiGateway::new().unwrap();
        let endpoints = endpoints_for(&mock_server);
        let client = AuthorizationClient::new(&gateway, &endpoints, &store);

        let grant = wait_for_grant(&client, pending_grant(), &fast_policy())
            .await
            .unwrap();

        assert_eq!(AuthStatus::Granted, grant.status);
    }

    #[tokio::test]
    async fn wait_for_grant_fails_once_the_budget_is_exhausted() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/login/authorize/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": { "status": "pending" }, "success": true,
            })))
            .mount(&mock_server)
            .await;

        let store = MockTokenStore::new();
        let gateway = ApiGateway::new().unwrap();
        let endpoints = endpoints_for(&mock_server);
        let client = AuthorizationClient::new(&gateway, &endpoints, &store);

        let policy = BackoffPolicy::new(
            Duration::from_millis(10),
            Duration::from_millis(10),
            Duration::from_millis(50),
        );

        match wait_for_grant(&client, pending_grant(), &policy).await {
            Err(ApiError::AuthorizationTimeout) => {}
            other => panic!("expected AuthorizationTimeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn wait_for_grant_surfaces_denial_as_fatal() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/login/authorize/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": { "status": "denied" }, "success": true,
            })))
            .mount(&mock_server)
            .await;

        let store = MockTokenStore::new();
        let gateway = ApiGateway::new().unwrap();
        let endpoints = endpoints_for(&mock_server);
        let client = AuthorizationClient::new(&gateway, &endpoints, &store);

        match wait_for_grant(&client, pending_grant(), &fast_policy()).await {
            Err(ApiError::AuthorizationDenied) => {}
            other => panic!("expected AuthorizationDenied, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn discard_grant_clears_the_store_for_unrecoverable_failures() {
        let mut store = MockTokenStore::new();
        store.expect_clear().times(4).returning(|| Ok(()));

        discard_grant(&store, &ApiError::AuthorizationDenied).await;
        discard_grant(&store, &ApiError::AuthorizationTimeout).await;
        discard_grant(&store, &ApiError::AuthorizationUnknown).await;
        discard_grant(&store, &ApiError::InvalidToken).await;
    }

    #[tokio::test]
    async fn discard_grant_keeps_the_store_for_recoverable_failures() {
        let mut store = MockTokenStore::new();
        store.expect_clear().times(0);

        discard_grant(&store, &ApiError::AuthRequired).await;
        discard_grant(&store, &ApiError::RateLimited).await;
        discard_grant(&store, &ApiError::AuthorizationRequired).await;
        discard_grant(
            &store,
            &ApiError::MalformedResponse("boom".to_string()),
        )
        .await;
    }

    #[tokio::test]
    async fn wait_for_grant_returns_an_already_granted_grant_without_polling() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/login/authorize/7"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&mock_server)
            .await;

        let store = MockTokenStore::new();
        let gateway = ApiGateway::new().unwrap();
        let endpoints = endpoints_for(&mock_server);
        let client = AuthorizationClient::new(&gateway, &endpoints, &store);

        let mut grant = pending_grant();
        grant.status = AuthStatus::Granted;

        let grant = wait_for_grant(&client, grant, &fast_policy())
            .await
            .unwrap();

        assert_eq!(AuthStatus::Granted, grant.status);
    }
}
