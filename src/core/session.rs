use hmac::{Hmac, Mac};
use log::debug;
use serde::{Deserialize, Serialize};
use sha1::Sha1;

use super::{
    authorization::{AppIdentity, AuthStatus, AuthorizationGrant},
    endpoints::EndpointSet,
    transport::{ApiError, ApiGateway},
};

type HmacSha1 = Hmac<Sha1>;

/// Single-use nonce issued by the appliance per login attempt. Never
/// persisted.
#[derive(Deserialize, Clone, Debug)]
pub struct LoginChallenge {
    pub challenge: String,
}

/// A live authenticated session. The protocol signals no explicit
/// expiry; a later `AuthRequired` error means the session is gone and
/// a re-login is needed.
#[derive(Clone)]
pub struct Session {
    session_token: String,
}

impl Session {
    pub fn token(&self) -> &str {
        &self.session_token
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("session_token", &"<redacted>")
            .finish()
    }
}

#[derive(Serialize, Debug)]
struct SessionPayload {
    app_id: String,
    password: String,
}

#[derive(Deserialize, Clone, Debug)]
struct SessionResult {
    session_token: Option<String>,
}

/// Keyed hash of the challenge under the app token, hex encoded.
/// SHA-1 is what the appliance verifies against; substituting another
/// hash breaks interoperability. Deterministic, pure.
pub fn derive_password(challenge: &str, app_token: &str) -> String {
    let mut mac =
        HmacSha1::new_from_slice(app_token.as_bytes()).expect("HMAC can take key of any size");

    mac.update(challenge.as_bytes());

    mac.finalize()
        .into_bytes()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join("")
}

/// Converts a granted app token into a live session through the
/// challenge-response exchange.
pub struct SessionManager<'a> {
    gateway: &'a ApiGateway,
    endpoints: &'a EndpointSet,
    identity: &'a AppIdentity,
}

impl<'a> SessionManager<'a> {
    pub fn new(gateway: &'a ApiGateway, endpoints: &'a EndpointSet, identity: &'a AppIdentity) -> Self {
        Self {
            gateway,
            endpoints,
            identity,
        }
    }

    /// Fetches a fresh challenge. The appliance must have approved
    /// the app first, anything short of `Granted` is refused here.
    pub async fn login(&self, grant: &AuthorizationGrant) -> Result<LoginChallenge, ApiError> {
        if grant.status != AuthStatus::Granted {
            return Err(ApiError::AuthorizationRequired);
        }

        debug!("fetching login challenge");

        let envelope = self
            .gateway
            .call::<LoginChallenge, ()>(&self.endpoints.login, None)
            .await?;

        envelope.into_result("login/")
    }

    /// Full challenge-response exchange: fetch the challenge, derive
    /// the password, trade it for a session token. On failure no
    /// partial session state is left behind.
    pub async fn open_session(&self, grant: &AuthorizationGrant) -> Result<Session, ApiError> {
        let challenge = self.login(grant).await?;
        let password = derive_password(&challenge.challenge, &grant.app_token);

        debug!("negotiating session token");

        let payload = SessionPayload {
            app_id: self.identity.app_id().to_string(),
            password,
        };

        let envelope = self
            .gateway
            .call::<SessionResult, SessionPayload>(&self.endpoints.session, Some(&payload))
            .await?;
        let result = envelope.into_result("login/session/")?;

        let session_token = result.session_token.ok_or_else(|| {
            ApiError::MalformedResponse("login/session/ response carries no session token".to_string())
        })?;

        self.gateway.attach_session_token(&session_token).await;

        Ok(Session { session_token })
    }
}
