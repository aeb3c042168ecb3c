//! Credential validator — per-class dispatch to identity checks
//!
//! Each caller class has exactly one identity delegate. The validator picks
//! it, makes a single call, and turns whatever comes back (including a
//! panic) into an [`AuthVerdict`].

use super::{AuthVerdict, CallerClass, Credentials, Principal, RejectReason};
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// External identity check — "are these credentials valid for this class?"
#[async_trait]
pub trait IdentityCheck: Send + Sync {
    /// `Ok(true)` valid, `Ok(false)` invalid, `Err` when the store could not answer
    async fn check(&self, class: CallerClass, credentials: &Credentials) -> Result<bool>;

    /// Delegate name for logging
    fn name(&self) -> &str;
}

/// Validates Basic credentials by delegating to the class's identity check
#[derive(Clone)]
pub struct CredentialValidator {
    guests: Arc<dyn IdentityCheck>,
    users: Arc<dyn IdentityCheck>,
    bots: Arc<dyn IdentityCheck>,
    api: Arc<dyn IdentityCheck>,
}

impl CredentialValidator {
    /// Same delegate for every class (the class is passed through to it)
    pub fn uniform(delegate: Arc<dyn IdentityCheck>) -> Self {
        Self {
            guests: delegate.clone(),
            users: delegate.clone(),
            bots: delegate.clone(),
            api: delegate,
        }
    }

    /// Replace the delegate for one class
    pub fn with_delegate(mut self, class: CallerClass, delegate: Arc<dyn IdentityCheck>) -> Self {
        match class {
            CallerClass::Guest => self.guests = delegate,
            CallerClass::User => self.users = delegate,
            CallerClass::Bot => self.bots = delegate,
            CallerClass::ApiPeer => self.api = delegate,
        }
        self
    }

    fn delegate(&self, class: CallerClass) -> &Arc<dyn IdentityCheck> {
        match class {
            CallerClass::Guest => &self.guests,
            CallerClass::User => &self.users,
            CallerClass::Bot => &self.bots,
            CallerClass::ApiPeer => &self.api,
        }
    }

    /// Validate credentials for a caller class. Makes at most one delegate call.
    pub async fn validate(&self, class: CallerClass, credentials: &Credentials) -> AuthVerdict {
        let delegate = self.delegate(class);

        let outcome = AssertUnwindSafe(delegate.check(class, credentials))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(true)) => AuthVerdict::Accepted(Principal::credentials(
                class,
                credentials.username.clone(),
            )),
            Ok(Ok(false)) => {
                tracing::debug!(
                    class = %class,
                    username = credentials.username,
                    delegate = delegate.name(),
                    "Credentials rejected"
                );
                AuthVerdict::Rejected(RejectReason::InvalidCredentials)
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    class = %class,
                    delegate = delegate.name(),
                    error = %e,
                    "Identity check failed"
                );
                AuthVerdict::Error(match e {
                    GatewayError::AuthMechanism(msg) => GatewayError::AuthMechanism(msg),
                    other => GatewayError::AuthMechanism(other.to_string()),
                })
            }
            Err(_) => {
                tracing::error!(
                    class = %class,
                    delegate = delegate.name(),
                    "Identity check panicked"
                );
                AuthVerdict::Error(GatewayError::AuthMechanism(format!(
                    "identity check '{}' panicked",
                    delegate.name()
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    enum Behaviour {
        Valid,
        Invalid,
        Fail,
        Panic,
    }

    struct MockCheck {
        behaviour: Behaviour,
        calls: AtomicUsize,
        seen: Mutex<Vec<CallerClass>>,
    }

    impl MockCheck {
        fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                behaviour,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl IdentityCheck for MockCheck {
        async fn check(&self, class: CallerClass, _credentials: &Credentials) -> Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(class);
            match self.behaviour {
                Behaviour::Valid => Ok(true),
                Behaviour::Invalid => Ok(false),
                Behaviour::Fail => Err(GatewayError::Other("store unreachable".into())),
                Behaviour::Panic => panic!("delegate blew up"),
            }
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    fn creds() -> Credentials {
        Credentials::new("alice", "secret")
    }

    #[tokio::test]
    async fn test_valid_is_accepted_for_every_class() {
        for class in CallerClass::ALL {
            let mock = MockCheck::new(Behaviour::Valid);
            let validator = CredentialValidator::uniform(mock.clone());
            match validator.validate(class, &creds()).await {
                AuthVerdict::Accepted(principal) => {
                    assert_eq!(principal.id, "alice");
                    assert_eq!(principal.class, Some(class));
                }
                other => panic!("expected accepted, got {:?}", other),
            }
            assert_eq!(*mock.seen.lock().unwrap(), vec![class]);
        }
    }

    #[tokio::test]
    async fn test_invalid_is_rejected() {
        for class in CallerClass::ALL {
            let validator = CredentialValidator::uniform(MockCheck::new(Behaviour::Invalid));
            let verdict = validator.validate(class, &creds()).await;
            assert!(matches!(
                verdict,
                AuthVerdict::Rejected(RejectReason::InvalidCredentials)
            ));
        }
    }

    #[tokio::test]
    async fn test_delegate_error_is_error_verdict() {
        for class in CallerClass::ALL {
            let validator = CredentialValidator::uniform(MockCheck::new(Behaviour::Fail));
            let verdict = validator.validate(class, &creds()).await;
            assert!(matches!(
                verdict,
                AuthVerdict::Error(GatewayError::AuthMechanism(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_delegate_panic_is_error_verdict() {
        let validator = CredentialValidator::uniform(MockCheck::new(Behaviour::Panic));
        let verdict = validator.validate(CallerClass::Bot, &creds()).await;
        assert!(verdict.is_error());
    }

    #[tokio::test]
    async fn test_single_call_per_validate() {
        let mock = MockCheck::new(Behaviour::Fail);
        let validator = CredentialValidator::uniform(mock.clone());
        let _ = validator.validate(CallerClass::User, &creds()).await;
        assert_eq!(mock.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dispatch_selects_class_delegate() {
        let default = MockCheck::new(Behaviour::Invalid);
        let bots = MockCheck::new(Behaviour::Valid);
        let validator = CredentialValidator::uniform(default.clone())
            .with_delegate(CallerClass::Bot, bots.clone());

        assert!(validator.validate(CallerClass::Bot, &creds()).await.is_accepted());
        assert!(validator.validate(CallerClass::User, &creds()).await.is_rejected());
        assert_eq!(bots.calls.load(Ordering::SeqCst), 1);
        assert_eq!(default.calls.load(Ordering::SeqCst), 1);
    }
}
