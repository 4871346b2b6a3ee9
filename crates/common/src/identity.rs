//! Principals under scan.
//!
//! An [`Identity`] is immutable once built. Seeds carry an empty chain; every
//! identity reached through impersonation records the names of the principals
//! that were used to get there, excluding itself.

use std::fmt;
use std::sync::Arc;

/// Opaque credential material handed to collaborators.
///
/// The traversal and dispatcher only clone and pass it along. Collaborators that
/// authenticate API calls read the bearer token via [`Credential::bearer`].
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(Arc<str>);

impl Credential {
    pub fn new(token: impl Into<Arc<str>>) -> Self {
        Self(token.into())
    }

    /// Raw bearer token for the `Authorization` header.
    pub fn bearer(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// A credentialed principal plus the chain of principals used to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    name: String,
    credential: Credential,
    chain: Vec<String>,
}

impl Identity {
    /// Creates a seed identity with an empty chain.
    pub fn seed(name: impl Into<String>, credential: Credential) -> Self {
        Self {
            name: name.into(),
            credential,
            chain: Vec::new(),
        }
    }

    /// Builds the identity reached by impersonating `target` from `self`.
    ///
    /// The new chain is `self.chain + [self.name]`, so its length is always one
    /// more than the source chain.
    pub fn pivot_to(&self, target: impl Into<String>, credential: Credential) -> Self {
        let mut chain = Vec::with_capacity(self.chain.len() + 1);
        chain.extend(self.chain.iter().cloned());
        chain.push(self.name.clone());
        Self {
            name: target.into(),
            credential,
            chain,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn chain(&self) -> &[String] {
        &self.chain
    }

    /// Returns `true` for identities supplied by a seed provider.
    pub fn is_seed(&self) -> bool {
        self.chain.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_has_empty_chain() {
        let a = Identity::seed("a@x.iam.gserviceaccount.com", Credential::new("tok-a"));
        assert!(a.is_seed());
        assert!(a.chain().is_empty());
    }

    #[test]
    fn test_pivot_extends_chain_by_one() {
        let a = Identity::seed("a", Credential::new("tok-a"));
        let b = a.pivot_to("b", Credential::new("tok-b"));
        let c = b.pivot_to("c", Credential::new("tok-c"));

        assert_eq!(b.chain(), ["a"]);
        assert_eq!(c.chain(), ["a", "b"]);
        assert_eq!(c.chain().len(), b.chain().len() + 1);
        assert!(!c.chain().iter().any(|n| n == c.name()));
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let cred = Credential::new("ya29.secret");
        assert!(!format!("{cred:?}").contains("ya29"));
        assert_eq!(cred.bearer(), "ya29.secret");
    }
}
