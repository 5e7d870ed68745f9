//! Identity resolution
//!
//! Turns the token presented with a connection into an `Identity` before
//! the session is accepted. The hub and sessions never see the token.

use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::IdentityError;
use crate::types::Identity;

/// Capability for resolving a connection token into an identity
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<Identity, IdentityError>;
}

/// Accepts anyone: the token is taken as the display name
#[derive(Debug, Clone, Default)]
pub struct GuestResolver {
    avatar_url: Option<String>,
}

impl GuestResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give every guest the same avatar
    pub fn with_avatar(avatar_url: impl Into<String>) -> Self {
        Self {
            avatar_url: Some(avatar_url.into()),
        }
    }
}

#[async_trait]
impl IdentityResolver for GuestResolver {
    async fn resolve(&self, token: &str) -> Result<Identity, IdentityError> {
        let name = token.trim();
        if name.is_empty() {
            return Err(IdentityError::Rejected("empty display name".to_string()));
        }
        Ok(Identity {
            unique_id: Uuid::new_v4().to_string(),
            display_name: name.to_string(),
            avatar_url: self.avatar_url.clone(),
        })
    }
}

/// Fixed token table
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    identities: HashMap<String, Identity>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, token: impl Into<String>, identity: Identity) {
        self.identities.insert(token.into(), identity);
    }
}

#[async_trait]
impl IdentityResolver for StaticResolver {
    async fn resolve(&self, token: &str) -> Result<Identity, IdentityError> {
        self.identities
            .get(token)
            .cloned()
            .ok_or(IdentityError::UnknownToken)
    }
}
