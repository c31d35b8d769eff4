use std::time::Duration;

use log::debug;
use reqwest::{Certificate, Client};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

const FBX_APP_AUTH_HEADER: &str = "X-Fbx-App-Auth";

/// Appliances of this class may reset state between calls, so every
/// exchange gets a fresh connection and a short deadline.
const CALL_TIMEOUT: Duration = Duration::from_secs(4);

const FBX_ECC_ROOT: &str = "
-----BEGIN CERTIFICATE-----
MIICWTCCAd+gAwIBAgIJAMaRcLnIgyukMAoGCCqGSM49BAMCMGExCzAJBgNVBAYT
AkZSMQ8wDQYDVQQIDAZGcmFuY2UxDjAMBgNVBAcMBVBhcmlzMRMwEQYDVQQKDApG
cmVlYm94IFNBMRwwGgYDVQQDDBNGcmVlYm94IEVDQyBSb290IENBMB4XDTE1MDkw
MTE4MDIwN1oXDTM1MDgyNzE4MDIwN1owYTELMAkGA1UEBhMCRlIxDzANBgNVBAgM
BkZyYW5jZTEOMAwGA1UEBwwFUGFyaXMxEzARBgNVBAoMCkZyZWVib3ggU0ExHDAa
BgNVBAMME0ZyZWVib3ggRUNDIFJvb3QgQ0EwdjAQBgcqhkjOPQIBBgUrgQQAIgNi
AASCjD6ZKn5ko6cU5Vxh8GA1KqRi6p2GQzndxHtuUmwY8RvBbhZ0GIL7bQ4f08ae
JOv0ycWjEW0fyOnAw6AYdsN6y1eNvH2DVfoXQyGoCSvXQNAUxla+sJuLGICRYiZz
mnijYzBhMB0GA1UdDgQWBBTIB3c2GlbV6EIh2ErEMJvFxMz/QTAfBgNVHSMEGDAW
gBTIB3c2GlbV6EIh2ErEMJvFxMz/QTAPBgNVHRMBAf8EBTADAQH/MA4GA1UdDwEB
/wQEAwIBhjAKBggqhkjOPQQDAgNoADBlAjA8tzEMRVX8vrFuOGDhvZr7OSJjbBr8
gl2I70LeVNGEXZsAThUkqj5Rg9bV8xw3aSMCMQCDjB5CgsLH8EdZmiksdBRRKM2r
vxo6c0dSSNrr7dDN+m2/dRvgoIpGL2GauOGqDFY=
-----END CERTIFICATE-----";

const FBX_ROOT_CA: &str = "
-----BEGIN CERTIFICATE-----
MIIFmjCCA4KgAwIBAgIJAKLyz15lYOrYMA0GCSqGSIb3DQEBCwUAMFoxCzAJBgNV
BAYTAkZSMQ8wDQYDVQQIDAZGcmFuY2UxDjAMBgNVBAcMBVBhcmlzMRAwDgYDVQQK
DAdGcmVlYm94MRgwFgYDVQQDDA9GcmVlYm94IFJvb3QgQ0EwHhcNMTUwNzMwMTUw
OTIwWhcNMzUwNzI1MTUwOTIwWjBaMQswCQYDVQQGEwJGUjEPMA0GA1UECAwGRnJh
bmNlMQ4wDAYDVQQHDAVQYXJpczEQMA4GA1UECgwHRnJlZWJveDEYMBYGA1UEAwwP
RnJlZWJveCBSb290IENBMIICIjANBgkqhkiG9w0BAQEFAAOCAg8AMIICCgKCAgEA
xqYIvq8538SH6BJ99jDlOPoyDBrlwKEp879oYplicTC2/p0X66R/ft0en1uSQadC
sL/JTyfgyJAgI1Dq2Y5EYVT/7G6GBtVH6Bxa713mM+I/v0JlTGFalgMqamMuIRDQ
tdyvqEIs8DcfGB/1l2A8UhKOFbHQsMcigxOe9ZodMhtVNn0mUyG+9Zgu1e/YMhsS
iG4Kqap6TGtk80yruS1mMWVSgLOq9F5BGD4rlNlWLo0C3R10mFCpqvsFU+g4kYoA
dTxaIpi1pgng3CGLE0FXgwstJz8RBaZObYEslEYKDzmer5zrU1pVHiwkjsgwbnuy
WtM1Xry3Jxc7N/i1rxFmN/4l/Tcb1F7x4yVZmrzbQVptKSmyTEvPvpzqzdxVWuYi
qIFSe/njl8dX9v5hjbMo4CeLuXIRE4nSq2A7GBm4j9Zb6/l2WIBpnCKtwUVlroKw
NBgB6zHg5WI9nWGuy3ozpP4zyxqXhaTgrQcDDIG/SQS1GOXKGdkCcSa+VkJ0jTf5
od7PxBn9/TuN0yYdgQK3YDjD9F9+CLp8QZK1bnPdVGywPfL1iztngF9J6JohTyL/
VMvpWfS/X6R4Y3p8/eSio4BNuPvm9r0xp6IMpW92V8SYL0N6TQQxzZYgkLV7TbQI
Hw6v64yMbbF0YS9VjS0sFpZcFERVQiodRu7nYNC1jy8CAwEAAaNjMGEwHQYDVR0O
BBYEFD2erMkECujilR0BuER09FdsYIebMB8GA1UdIwQYMBaAFD2erMkECujilR0B
uER09FdsYIebMA8GA1UdEwEB/wQFMAMBAf8wDgYDVR0PAQH/BAQDAgGGMA0GCSqG
SIb3DQEBCwUAA4ICAQAZ2Nx8mWIWckNY8X2t/ymmCbcKxGw8Hn3BfTDcUWQ7GLRf
MGzTqxGSLBQ5tENaclbtTpNrqPv2k6LY0VjfrKoTSS8JfXkm6+FUtyXpsGK8MrLL
hZ/YdADTfbbWOjjD0VaPUoglvo2N4n7rOuRxVYIij11fL/wl3OUZ7GHLgL3qXSz0
+RGW+1oZo8HQ7pb6RwLfv42Gf+2gyNBckM7VVh9R19UkLCsHFqhFBbUmqwJgNA2/
3twgV6Y26qlyHXXODUfV3arLCwFoNB+IIrde1E/JoOry9oKvF8DZTo/Qm6o2KsdZ
dxs/YcIUsCvKX8WCKtH6la/kFCUcXIb8f1u+Y4pjj3PBmKI/1+Rs9GqB0kt1otyx
Q6bqxqBSgsrkuhCfRxwjbfBgmXjIZ/a4muY5uMI0gbl9zbMFEJHDojhH6TUB5qd0
JJlI61gldaT5Ci1aLbvVcJtdeGhElf7pOE9JrXINpP3NOJJaUSueAvxyj/WWoo0v
4KO7njox8F6jCHALNDLdTsX0FTGmUZ/s/QfJry3VNwyjCyWDy1ra4KWoqt6U7SzM
d5jENIZChM8TnDXJzqc+mu00cI3icn9bV9flYCXLTIsprB21wVSMh0XeBGylKxeB
S27oDfFq04XSox7JM9HdTt2hLK96x1T7FpFrBTnALzb7vHv9MhXqAT90fPR/8A==
-----END CERTIFICATE-----";

static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

/// The uniform shape of every appliance response.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ApiEnvelope<T: Clone> {
    pub msg: Option<String>,
    pub success: Option<bool>,
    pub error_code: Option<String>,
    pub result: Option<T>,
}

impl<T: Clone> ApiEnvelope<T> {
    /// Extracts the typed payload of a successful envelope.
    pub fn into_result(self, context: &str) -> Result<T, ApiError> {
        self.result
            .ok_or_else(|| ApiError::MalformedResponse(format!("{context} response was empty")))
    }
}

/*
auth_required 	Invalid session token, or not session token sent
invalid_token 	The app token you are trying to use is invalid or has been revoked
pending_token 	The app token you are trying to use has not been validated by user yet
insufficient_rights 	Your app permissions does not allow accessing this API
denied_from_external_ip 	You are trying to get an app_token from a remote IP
invalid_request 	Your request is invalid
ratelimited 	Too many auth error have been made from your IP
new_apps_denied 	New application token request has been disabled
apps_denied 	API access from apps has been disabled
internal_error 	Internal error
 */

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("server reported an unrecognized error code: {0}")]
    UnknownServer(String),
    #[error("invalid session token, or no session token sent")]
    AuthRequired,
    #[error("the app token you are trying to use is invalid or has been revoked")]
    InvalidToken,
    #[error("the app token you are trying to use has not been validated by user yet")]
    PendingToken,
    #[error("your app permissions do not allow accessing this API")]
    InsufficientRights,
    #[error("you are trying to get an app_token from a remote IP")]
    DeniedFromExternalIp,
    #[error("your request is invalid")]
    InvalidRequest,
    #[error("too many auth errors have been made from your IP")]
    RateLimited,
    #[error("new application token request has been disabled")]
    NewAppsDenied,
    #[error("API access from apps has been disabled")]
    AppsDenied,
    #[error("internal error")]
    InternalError,
    #[error("the user denied the authorization request")]
    AuthorizationDenied,
    #[error("the user did not confirm the authorization within the given time")]
    AuthorizationTimeout,
    #[error("the app token is invalid or has been revoked")]
    AuthorizationUnknown,
    #[error("the application has not been granted access by the user yet")]
    AuthorizationRequired,
}

impl ApiError {
    /// Translates a server-reported `error_code` into its typed error,
    /// 1:1 with the appliance documentation above.
    pub fn from_error_code(code: &str) -> Self {
        match code {
            "auth_required" => Self::AuthRequired,
            "invalid_token" => Self::InvalidToken,
            "pending_token" => Self::PendingToken,
            "insufficient_rights" => Self::InsufficientRights,
            "denied_from_external_ip" => Self::DeniedFromExternalIp,
            "invalid_request" => Self::InvalidRequest,
            "ratelimited" => Self::RateLimited,
            "new_apps_denied" => Self::NewAppsDenied,
            "apps_denied" => Self::AppsDenied,
            "internal_error" => Self::InternalError,
            _ => Self::UnknownServer(code.to_string()),
        }
    }
}

pub fn http_client_factory() -> Result<Client, reqwest::Error> {
    debug!("creating HTTP client");

    let root_ca = Certificate::from_pem(FBX_ROOT_CA.as_bytes())?;
    let ecc = Certificate::from_pem(FBX_ECC_ROOT.as_bytes())?;

    reqwest::ClientBuilder::new()
        .add_root_certificate(root_ca)
        .add_root_certificate(ecc)
        .timeout(CALL_TIMEOUT)
        .pool_max_idle_per_host(0)
        .user_agent(APP_USER_AGENT)
        .build()
}

/// Executes single JSON request/response exchanges against the
/// appliance, attaching the current session credential when one is
/// held. Performs no retries; every retry decision belongs to the
/// caller.
pub struct ApiGateway {
    client: Client,
    session_token: RwLock<Option<String>>,
}

impl ApiGateway {
    pub fn new() -> Result<Self, ApiError> {
        Ok(Self {
            client: http_client_factory()?,
            session_token: RwLock::new(None),
        })
    }

    /// Holds the session credential for subsequent calls.
    pub async fn attach_session_token(&self, token: &str) {
        let mut guard = self.session_token.write().await;
        *guard = Some(token.to_string());
    }

    pub async fn clear_session_token(&self) {
        let mut guard = self.session_token.write().await;
        *guard = None;
    }

    /// One exchange: POST with a JSON body when `body` is present, GET
    /// otherwise. Returns the successful envelope as-is; the caller
    /// extracts `result`.
    pub async fn call<T, B>(&self, url: &str, body: Option<&B>) -> Result<ApiEnvelope<T>, ApiError>
    where
        T: DeserializeOwned + Clone,
        B: Serialize + ?Sized,
    {
        debug!("calling {url}");

        let mut request = match body {
            Some(payload) => self.client.post(url).json(payload),
            None => self.client.get(url),
        };

        if let Some(token) = self.session_token.read().await.as_deref() {
            request = request.header(FBX_APP_AUTH_HEADER, token);
        }

        let text = request.send().await?.text().await?;

        let raw = serde_json::from_str::<serde_json::Value>(&text).map_err(|e| {
            ApiError::MalformedResponse(format!("response body is not valid JSON: {e}"))
        })?;

        if raw.get("error").is_some() {
            return Err(ApiError::MalformedResponse(
                "response carries a top-level error field instead of the envelope".to_string(),
            ));
        }

        let envelope = serde_json::from_value::<ApiEnvelope<T>>(raw).map_err(|e| {
            ApiError::MalformedResponse(format!("response does not match the envelope: {e}"))
        })?;

        if !envelope.success.unwrap_or(false) {
            return Err(match envelope.error_code.as_deref() {
                Some(code) => ApiError::from_error_code(code),
                None => ApiError::MalformedResponse(
                    "failed response without an error code".to_string(),
                ),
            });
        }

        Ok(envelope)
    }
}
