pub mod core;

pub use crate::core::{
    authorization::{AppIdentity, AuthStatus, AuthorizationClient, AuthorizationGrant},
    endpoints::{DeviceDescriptor, EndpointSet},
    session::{derive_password, LoginChallenge, Session, SessionManager},
    token_store::{FileTokenStore, StoredGrant, TokenStore},
    transport::{ApiEnvelope, ApiError, ApiGateway},
};
