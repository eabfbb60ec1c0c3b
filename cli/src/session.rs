//! Login sessions.
//!
//! Session state lives in a `tower-sessions` store and the browser only holds
//! a signed cookie naming it. A session counts as logged in once
//! [`LOGGED_IN_KEY`] is set; logging out flushes the record, so a copied
//! cookie stops working too.

use anyhow::{Context, Result};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;
use tower_sessions::Session;

pub const SESSION_COOKIE: &str = "mealbook_session";

/// Session key holding the login flag.
pub const LOGGED_IN_KEY: &str = "logged_in";

/// Largest accepted `--session-ttl-hours`, about a century.
pub const MAX_SESSION_TTL_HOURS: u32 = 876_000;

type HmacSha256 = Hmac<Sha256>;

/// Decides whether a login attempt is allowed in.
///
/// The server only needs this yes/no answer, so a real identity provider can
/// replace the shared password without touching the handlers.
pub trait Authenticator: Send + Sync {
    fn verify(&self, password: &str) -> bool;
}

/// Single shared password.
///
/// Only a keyed MAC of the password is kept in memory; candidates are checked
/// with the MAC's constant-time verification.
pub struct SharedPassword {
    key: [u8; 32],
    tag: Vec<u8>,
}

impl SharedPassword {
    pub fn new(password: &str) -> Result<Self> {
        let mut key = [0u8; 32];
        rand::rng().fill(&mut key[..]);
        let mut mac = HmacSha256::new_from_slice(&key).context("invalid HMAC key")?;
        mac.update(password.as_bytes());
        Ok(Self {
            key,
            tag: mac.finalize().into_bytes().to_vec(),
        })
    }
}

impl Authenticator for SharedPassword {
    fn verify(&self, password: &str) -> bool {
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.key) else {
            return false;
        };
        mac.update(password.as_bytes());
        mac.verify_slice(&self.tag).is_ok()
    }
}

pub async fn is_logged_in(session: &Session) -> bool {
    matches!(session.get::<bool>(LOGGED_IN_KEY).await, Ok(Some(true)))
}

/// Mark the session as logged in under a fresh id.
pub async fn log_in(session: &Session) -> Result<()> {
    session
        .cycle_id()
        .await
        .context("failed to rotate session id")?;
    session
        .insert(LOGGED_IN_KEY, true)
        .await
        .context("failed to store login flag")?;
    Ok(())
}

/// Drop the session record and expire its cookie.
pub async fn log_out(session: &Session) -> Result<()> {
    session.flush().await.context("failed to flush session")
}
