//! Identity provider capability.
//!
//! The engine never authenticates anyone itself. It asks an
//! [`IdentityProvider`] who is signed in and, before destructive operations,
//! asks it to validate a freshly supplied credential.
//!
//! [`StaticIdentity`] is a local provider with at most one account, used by
//! the CLI host and by tests.

use std::fmt;

use subtle::ConstantTimeEq;
use tokio::sync::RwLock;
use zeroize::Zeroizing;

use crate::error::IdentityError;

/// The authenticated owner of a vault.
#[derive(Clone)]
pub struct Principal {
    id: String,
    email: Option<String>,
    key_secret: Option<Zeroizing<Vec<u8>>>,
}

impl Principal {
    /// A principal identified only by its stable account id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
            key_secret: None,
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Use a dedicated durable secret (e.g. a passphrase) for key derivation
    /// instead of the account id.
    #[must_use]
    pub fn with_key_secret(mut self, secret: impl Into<Vec<u8>>) -> Self {
        self.key_secret = Some(Zeroizing::new(secret.into()));
        self
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Whether a dedicated key secret was set.
    #[must_use]
    pub fn has_key_secret(&self) -> bool {
        self.key_secret.is_some()
    }

    /// Bytes the vault key is derived from: the dedicated secret if one was
    /// set, the account id otherwise.
    #[must_use]
    pub fn key_secret(&self) -> &[u8] {
        self.key_secret
            .as_deref()
            .map_or(self.id.as_bytes(), Vec::as_slice)
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Principal")
            .field("id", &self.id)
            .field("email", &self.email)
            .field(
                "key_secret",
                &self.key_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Who is signed in, and whether they can prove it again.
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// The signed-in principal, or `None` for a signed-out or guest session.
    async fn current_principal(&self) -> Option<Principal>;

    /// Validate a freshly supplied credential for `principal`.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Rejected`] if the credential is wrong, or
    /// [`IdentityError::Unavailable`] if the provider cannot be reached.
    async fn reauthenticate(
        &self,
        principal: &Principal,
        credential: &str,
    ) -> Result<(), IdentityError>;

    /// Replace the signed-in `principal`'s credential.
    ///
    /// Returns the principal as the provider reports it from now on; its
    /// [`key_secret`](Principal::key_secret) may have changed, so callers
    /// re-derive the vault key from it. The caller re-authenticates first.
    ///
    /// # Errors
    ///
    /// [`IdentityError::InvalidCredential`] for an unusable new credential,
    /// [`IdentityError::Rejected`] if `principal` is not the signed-in one,
    /// or [`IdentityError::Unauthenticated`] if nobody is signed in.
    async fn update_credential(
        &self,
        principal: &Principal,
        new_credential: &str,
    ) -> Result<Principal, IdentityError>;
}

struct Account {
    principal: Principal,
    credential: Zeroizing<String>,
}

/// A local provider holding at most one signed-in account.
///
/// When the account's principal carries a key secret, the provider treats it
/// as bound to the credential: [`update_credential`] replaces both.
///
/// [`update_credential`]: IdentityProvider::update_credential
pub struct StaticIdentity {
    account: RwLock<Option<Account>>,
}

impl StaticIdentity {
    /// A provider with `principal` signed in, accepting `credential` on
    /// re-authentication.
    pub fn signed_in(principal: Principal, credential: impl Into<String>) -> Self {
        Self {
            account: RwLock::new(Some(Account {
                principal,
                credential: Zeroizing::new(credential.into()),
            })),
        }
    }

    /// A provider with nobody signed in.
    #[must_use]
    pub fn signed_out() -> Self {
        Self {
            account: RwLock::new(None),
        }
    }

    /// Sign `principal` in, replacing whoever was signed in.
    pub async fn sign_in(&self, principal: Principal, credential: impl Into<String>) {
        *self.account.write().await = Some(Account {
            principal,
            credential: Zeroizing::new(credential.into()),
        });
    }

    /// Forget the signed-in principal.
    pub async fn sign_out(&self) {
        *self.account.write().await = None;
    }
}

impl Account {
    fn verify(&self, principal: &Principal, credential: &str) -> Result<(), IdentityError> {
        let same_principal = self.principal.id() == principal.id();
        let matches: bool = self
            .credential
            .as_bytes()
            .ct_eq(credential.as_bytes())
            .into();

        if same_principal && matches && !self.credential.is_empty() {
            Ok(())
        } else {
            Err(IdentityError::Rejected {
                principal_id: principal.id().to_owned(),
            })
        }
    }
}

impl fmt::Debug for StaticIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticIdentity").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl IdentityProvider for StaticIdentity {
    async fn current_principal(&self) -> Option<Principal> {
        self.account
            .read()
            .await
            .as_ref()
            .map(|account| account.principal.clone())
    }

    async fn reauthenticate(
        &self,
        principal: &Principal,
        credential: &str,
    ) -> Result<(), IdentityError> {
        let guard = self.account.read().await;
        let Some(account) = guard.as_ref() else {
            return Err(IdentityError::Unauthenticated);
        };
        account.verify(principal, credential)
    }

    async fn update_credential(
        &self,
        principal: &Principal,
        new_credential: &str,
    ) -> Result<Principal, IdentityError> {
        if new_credential.trim().is_empty() {
            return Err(IdentityError::InvalidCredential {
                reason: "credential must not be blank".to_owned(),
            });
        }

        let mut guard = self.account.write().await;
        let Some(account) = guard.as_mut() else {
            return Err(IdentityError::Unauthenticated);
        };
        if account.principal.id() != principal.id() {
            return Err(IdentityError::Rejected {
                principal_id: principal.id().to_owned(),
            });
        }

        if account.principal.has_key_secret() {
            account.principal = account
                .principal
                .clone()
                .with_key_secret(new_credential.as_bytes().to_vec());
        }
        account.credential = Zeroizing::new(new_credential.to_owned());
        Ok(account.principal.clone())
    }
}
