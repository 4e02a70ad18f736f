//! Login validation seam.

use std::net::SocketAddr;

/// Confirms that a login request carries a session token the auth side
/// actually issued. Implementations that cannot reach their backing
/// service should return `false`; a fault must reject, never admit.
pub trait SessionValidator: Send + Sync + 'static {
    fn validate(&self, account_id: u64, session_token: u32, peer: Option<SocketAddr>) -> bool;
}

/// Accepts every token. For development setups without an auth service.
pub struct AllowAll;

impl SessionValidator for AllowAll {
    fn validate(&self, _account_id: u64, _session_token: u32, _peer: Option<SocketAddr>) -> bool {
        true
    }
}

/// Rejects every token. Used in tests for the fault path.
pub struct DenyAll;

impl SessionValidator for DenyAll {
    fn validate(&self, _account_id: u64, _session_token: u32, _peer: Option<SocketAddr>) -> bool {
        false
    }
}
