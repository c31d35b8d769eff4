use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::{
    endpoints::EndpointSet,
    token_store::{StoredGrant, TokenStore},
    transport::{ApiError, ApiGateway},
};

/// Identifies the calling application to the appliance. Fixed at
/// construction, shown on the LCD during the approval prompt.
#[derive(Serialize, Clone, Debug)]
pub struct AppIdentity {
    app_id: String,
    app_name: String,
    app_version: String,
    device_name: String,
}

impl AppIdentity {
    pub fn new(app_id: String, app_name: String, app_version: String, device_name: String) -> Self {
        Self {
            app_id,
            app_name,
            app_version,
            device_name,
        }
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthStatus {
    Pending,
    Granted,
    Denied,
    Timeout,
    Unknown,
}

impl AuthStatus {
    /// Interprets the status string reported by the appliance.
    /// Anything outside the documented set is treated as `Unknown`,
    /// which is terminal.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "pending" => Self::Pending,
            "granted" => Self::Granted,
            "denied" => Self::Denied,
            "timeout" => Self::Timeout,
            _ => Self::Unknown,
        }
    }

    /// `Pending` is the only state the handshake can still move from.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// The fatal error a terminal failure state surfaces as. These
    /// cannot be resumed, a fresh registration is required.
    pub fn as_failure(&self) -> Option<ApiError> {
        match self {
            Self::Denied => Some(ApiError::AuthorizationDenied),
            Self::Timeout => Some(ApiError::AuthorizationTimeout),
            Self::Unknown => Some(ApiError::AuthorizationUnknown),
            Self::Pending | Self::Granted => None,
        }
    }
}

/// The durable outcome of a registration. The token is usable for
/// session opening only once `status` is `Granted`.
#[derive(Clone)]
pub struct AuthorizationGrant {
    pub app_token: String,
    pub track_id: i32,
    pub status: AuthStatus,
}

impl AuthorizationGrant {
    /// Rehydrates a persisted grant. Status is not persisted, so a
    /// reloaded grant starts `Pending` and a single poll resolves it.
    pub fn from_stored(stored: StoredGrant) -> Self {
        Self {
            app_token: stored.app_token,
            track_id: stored.track_id,
            status: AuthStatus::Pending,
        }
    }

    pub fn to_stored(&self) -> StoredGrant {
        StoredGrant {
            app_token: self.app_token.clone(),
            track_id: self.track_id,
        }
    }
}

impl std::fmt::Debug for AuthorizationGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationGrant")
            .field("app_token", &"<redacted>")
            .field("track_id", &self.track_id)
            .field("status", &self.status)
            .finish()
    }
}

#[derive(Deserialize, Clone, Debug)]
struct RegistrationResult {
    app_token: String,
    track_id: i32,
    status: Option<String>,
}

#[derive(Deserialize, Clone, Debug)]
struct AuthorizationResult {
    status: String,
}

/// Drives the registration and approval-polling state machine. Does
/// no sleeping or looping itself, the delay-then-retry policy belongs
/// to the caller.
pub struct AuthorizationClient<'a> {
    gateway: &'a ApiGateway,
    endpoints: &'a EndpointSet,
    store: &'a dyn TokenStore,
}

impl<'a> AuthorizationClient<'a> {
    pub fn new(gateway: &'a ApiGateway, endpoints: &'a EndpointSet, store: &'a dyn TokenStore) -> Self {
        Self {
            gateway,
            endpoints,
            store,
        }
    }

    /// Requests an authorization for `identity`, or resumes the
    /// persisted one: a grant with a non-zero track id already exists
    /// on the appliance, re-registering would create a duplicate
    /// pending prompt.
    pub async fn register(&self, identity: &AppIdentity) -> Result<AuthorizationGrant, ApiError> {
        if let Some(stored) = self.load_persisted().await {
            if stored.track_id != 0 {
                debug!("found a persisted grant, resuming its authorization track");

                let mut grant = AuthorizationGrant::from_stored(stored);
                grant.status = self.poll_status(grant.track_id).await?;

                match grant.status {
                    AuthStatus::Pending | AuthStatus::Granted => return Ok(grant),
                    status => {
                        // a denied, timed out or revoked track never
                        // leaves its terminal state, only a fresh
                        // prompt can produce a usable token
                        info!("persisted authorization track is {status:?}, discarding it and registering from scratch");

                        if let Err(e) = self.store.clear().await {
                            warn!("cannot discard the stored grant: {e}");
                        }
                    }
                }
            }
        }

        debug!("requesting authorization");

        let envelope = self
            .gateway
            .call::<RegistrationResult, AppIdentity>(&self.endpoints.authorize, Some(identity))
            .await?;
        let result = envelope.into_result("login/authorize/")?;

        let status = result
            .status
            .as_deref()
            .map_or(AuthStatus::Pending, AuthStatus::parse);

        let grant = AuthorizationGrant {
            app_token: result.app_token,
            track_id: result.track_id,
            status,
        };

        if let Err(e) = self.store.save(&grant.to_stored()).await {
            warn!("storing the application token failed, you can still save it by yourself: {e}");
        }

        info!(
            "authorization requested, please go to the Freebox and check LCD screen instructions (track {})",
            grant.track_id
        );

        Ok(grant)
    }

    /// One status read for `track_id`. Side-effect free; re-invoking
    /// it under a backoff policy is the caller's job.
    pub async fn poll_status(&self, track_id: i32) -> Result<AuthStatus, ApiError> {
        debug!("checking authorization status");

        let url = format!("{}{}", self.endpoints.authorize, track_id);

        let envelope = self
            .gateway
            .call::<AuthorizationResult, ()>(&url, None)
            .await?;
        let result = envelope.into_result("login/authorize/{track_id}")?;

        Ok(AuthStatus::parse(&result.status))
    }

    async fn load_persisted(&self) -> Option<StoredGrant> {
        match self.store.load().await {
            Ok(stored) => stored,
            Err(e) => {
                warn!("cannot read the persisted grant, starting a fresh registration: {e}");
                None
            }
        }
    }
}
