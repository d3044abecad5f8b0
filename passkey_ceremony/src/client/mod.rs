//! Client side of a ceremony: invoking the platform authenticator exactly once
//! per user action and normalizing its output for the server.

mod authenticator;

use std::collections::HashSet;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::errors::PasskeyError;
use crate::options::{AuthenticationOptions, RegistrationOptions};
use crate::response::CeremonyResult;

pub use authenticator::{
    Assertion, AttestedCredential, Authenticator, AuthenticatorFailure, Capabilities,
};

/// Identifies a UI action (a button, a list row) that can start a ceremony.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionId(String);

impl ActionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl From<&str> for ActionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub enum CeremonyRequest {
    Register(RegistrationOptions),
    Authenticate(AuthenticationOptions),
}

impl CeremonyRequest {
    fn timeout(&self) -> Duration {
        let ms = match self {
            Self::Register(options) => options.timeout_ms(),
            Self::Authenticate(options) => options.timeout_ms(),
        };
        Duration::from_millis(ms)
    }
}

/// How a single authenticator invocation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CeremonyOutcome {
    Completed(CeremonyResult),
    /// Dismissed by the user, no credential answered, or timed out
    Cancelled,
    /// No usable authenticator on this client
    Unavailable,
}

impl CeremonyOutcome {
    pub fn into_result(self) -> Result<CeremonyResult, PasskeyError> {
        match self {
            Self::Completed(result) => Ok(result),
            Self::Cancelled => Err(PasskeyError::UserCancelled),
            Self::Unavailable => Err(PasskeyError::AuthenticatorUnavailable),
        }
    }
}

/// Clears the busy flag for an action when dropped.
struct BusyGuard<'a> {
    busy: &'a Mutex<HashSet<ActionId>>,
    action: ActionId,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        let mut busy = self.busy.lock().unwrap_or_else(|e| e.into_inner());
        busy.remove(&self.action);
    }
}

/// Runs ceremonies against an [`Authenticator`].
///
/// Each action may have at most one outstanding invocation. Ceremonies for
/// different actions queue behind a single permit, so the platform never shows
/// two prompts at once.
pub struct CeremonyOrchestrator<A> {
    authenticator: A,
    busy: Mutex<HashSet<ActionId>>,
    prompt: Semaphore,
}

impl<A: Authenticator> CeremonyOrchestrator<A> {
    pub fn new(authenticator: A) -> Self {
        Self {
            authenticator,
            busy: Mutex::new(HashSet::new()),
            prompt: Semaphore::new(1),
        }
    }

    pub fn authenticator(&self) -> &A {
        &self.authenticator
    }

    /// Whether passkey ceremonies should be offered at all.
    ///
    /// Requires both a platform authenticator and conditional mediation. A
    /// failing probe is treated as "not supported".
    pub async fn ceremony_supported(&self) -> bool {
        match self.authenticator.capabilities().await {
            Ok(caps) => caps.platform_authenticator && caps.conditional_mediation,
            Err(e) => {
                tracing::debug!("Capability probe failed: {}", e);
                false
            }
        }
    }

    pub fn is_busy(&self, action: &ActionId) -> bool {
        self.busy
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(action)
    }

    pub async fn run(
        &self,
        action: ActionId,
        request: CeremonyRequest,
    ) -> Result<CeremonyOutcome, PasskeyError> {
        let _guard = self.mark_busy(action.clone())?;

        // Time spent queued for the prompt counts against the timeout
        let timeout = request.timeout();
        let invocation = async {
            let _permit = match self.prompt.acquire().await {
                Ok(permit) => permit,
                Err(e) => return Err(AuthenticatorFailure::Other(e.to_string())),
            };

            tracing::debug!(%action, "Invoking authenticator");

            match &request {
                CeremonyRequest::Register(options) => self
                    .authenticator
                    .make_credential(options)
                    .await
                    .map(|raw| raw.map(|c| CeremonyResult::Registration(c.into_response()))),
                CeremonyRequest::Authenticate(options) => self
                    .authenticator
                    .get_assertion(options)
                    .await
                    .map(|raw| raw.map(|a| CeremonyResult::Authentication(a.into_response()))),
            }
        };

        let outcome = match tokio::time::timeout(timeout, invocation).await {
            Err(_) => {
                tracing::debug!(%action, "Authenticator timed out");
                CeremonyOutcome::Cancelled
            }
            Ok(Ok(Some(result))) => CeremonyOutcome::Completed(result),
            Ok(Ok(None)) => CeremonyOutcome::Cancelled,
            Ok(Err(AuthenticatorFailure::Unavailable)) => CeremonyOutcome::Unavailable,
            Ok(Err(AuthenticatorFailure::Other(msg))) => {
                tracing::warn!(%action, "Authenticator failed: {}", msg);
                return Err(PasskeyError::Authenticator(msg));
            }
        };

        tracing::debug!(%action, ?outcome, "Ceremony finished");
        Ok(outcome)
    }

    fn mark_busy(&self, action: ActionId) -> Result<BusyGuard<'_>, PasskeyError> {
        let mut busy = self.busy.lock().unwrap_or_else(|e| e.into_inner());
        if !busy.insert(action.clone()) {
            return Err(PasskeyError::CeremonyInProgress(action.to_string()));
        }
        Ok(BusyGuard {
            busy: &self.busy,
            action,
        })
    }
}
