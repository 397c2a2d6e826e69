//! Authentication module

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use cloudgreet_common::types::TenantId;
use cloudgreet_common::Error;
use cloudgreet_core::{
    AiSettingsService, CredentialCipher, EngagementService, IntegrationService,
    ProspectingService, SequenceManager, StatsAggregator, TemplateLibrary,
};
use cloudgreet_storage::models::ApiKey;
use cloudgreet_storage::Store;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::ApiError;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub sequences: SequenceManager,
    pub templates: TemplateLibrary,
    pub engagement: EngagementService,
    pub stats: StatsAggregator,
    pub ai_settings: AiSettingsService,
    pub prospecting: ProspectingService,
    pub integrations: IntegrationService,
}

impl AppState {
    pub fn new(store: Store, cipher: CredentialCipher) -> Self {
        Self {
            sequences: SequenceManager::new(store.clone()),
            templates: TemplateLibrary::new(store.templates.clone()),
            engagement: EngagementService::new(store.clone()),
            stats: StatsAggregator::new(store.sends.clone()),
            ai_settings: AiSettingsService::new(store.settings.clone()),
            prospecting: ProspectingService::new(store.clone()),
            integrations: IntegrationService::new(store.settings.clone(), cipher),
            store,
        }
    }
}

/// Authenticated context extracted from API key
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// The tenant ID this API key belongs to
    pub tenant_id: TenantId,
    /// Scopes granted to this API key
    pub scopes: Vec<String>,
    /// API key ID for audit logging
    pub api_key_id: Uuid,
}

impl AuthContext {
    /// Check if the authenticated context has a specific scope
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == "*" || s == scope)
    }
}

/// Extract API key from request
pub fn extract_api_key(req: &Request) -> Option<&str> {
    if let Some(auth) = req.headers().get("authorization") {
        if let Ok(auth_str) = auth.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.trim());
            }
        }
    }

    if let Some(key) = req.headers().get("x-api-key") {
        if let Ok(key_str) = key.to_str() {
            return Some(key_str.trim());
        }
    }

    None
}

/// Extract the prefix from an API key (first 8 characters)
pub fn extract_key_prefix(api_key: &str) -> Option<&str> {
    api_key.get(..8)
}

/// Hash an API key with SHA-256 (legacy storage format)
pub fn hash_api_key(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Verify an API key against a stored hash.
///
/// Supports both Argon2 hashes (`$argon2...`) and legacy SHA-256 hex hashes.
fn verify_api_key(api_key: &str, stored_hash: &str) -> bool {
    if stored_hash.starts_with("$argon2") {
        return PasswordHash::new(stored_hash)
            .ok()
            .and_then(|parsed_hash| {
                Argon2::default()
                    .verify_password(api_key.as_bytes(), &parsed_hash)
                    .ok()
            })
            .is_some();
    }

    hash_api_key(api_key) == stored_hash
}

/// Validate an API key against the store
async fn validate_api_key(store: &Store, api_key: &str) -> Result<ApiKey, ApiError> {
    let prefix = extract_key_prefix(api_key).ok_or_else(|| {
        warn!("API key too short");
        Error::Auth("Invalid API key".to_string())
    })?;

    let candidates = store.api_keys.find_by_prefix(prefix).await.map_err(|e| {
        error!(error = %e, "Failed to look up API key");
        e
    })?;

    for candidate in candidates {
        if !verify_api_key(api_key, &candidate.key_hash) {
            continue;
        }
        if candidate.is_expired() {
            warn!(api_key_id = %candidate.id, "API key has expired");
            return Err(Error::Auth("API key has expired".to_string()).into());
        }

        let api_keys = store.api_keys.clone();
        let key_id = candidate.id;
        tokio::spawn(async move {
            if let Err(e) = api_keys.update_last_used(key_id).await {
                error!(api_key_id = %key_id, error = %e, "Failed to update API key last_used_at");
            }
        });

        debug!(
            api_key_id = %candidate.id,
            tenant_id = %candidate.tenant_id,
            "API key authenticated"
        );
        return Ok(candidate);
    }

    warn!(prefix = %prefix, "No API key matched");
    Err(Error::Auth("Invalid API key".to_string()).into())
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let api_key = extract_api_key(&request).ok_or_else(|| {
        warn!(path = %request.uri().path(), "Missing API key");
        Error::Auth("Missing API key".to_string())
    })?;

    let validated_key = validate_api_key(&state.store, api_key).await?;

    request.extensions_mut().insert(AuthContext {
        tenant_id: validated_key.tenant_id,
        scopes: validated_key.scopes,
        api_key_id: validated_key.id,
    });

    Ok(next.run(request).await)
}

/// Reject the request unless the key carries `scope`
pub fn require_scope(auth: &AuthContext, scope: &str) -> Result<(), ApiError> {
    if !auth.has_scope(scope) {
        warn!(
            api_key_id = %auth.api_key_id,
            scope = %scope,
            "Scope access denied"
        );
        return Err(Error::PermissionDenied(format!("API key lacks scope '{}'", scope)).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};

    #[test]
    fn verifies_legacy_sha256_hash() {
        let api_key = "cg_test_legacy_key";
        let legacy_hash = hash_api_key(api_key);

        assert!(verify_api_key(api_key, &legacy_hash));
        assert!(!verify_api_key("wrong_key", &legacy_hash));
    }

    #[test]
    fn verifies_argon2_hash() {
        let api_key = "cg_test_argon2_key";
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(api_key.as_bytes(), &salt)
            .expect("argon2 hash generation should succeed")
            .to_string();

        assert!(verify_api_key(api_key, &hash));
        assert!(!verify_api_key("wrong_key", &hash));
    }

    #[test]
    fn short_keys_have_no_prefix() {
        assert_eq!(extract_key_prefix("cg_12345678"), Some("cg_12345"));
        assert_eq!(extract_key_prefix("short"), None);
    }

    #[test]
    fn wildcard_scope_grants_everything() {
        let auth = AuthContext {
            tenant_id: Uuid::new_v4(),
            scopes: vec!["*".to_string()],
            api_key_id: Uuid::new_v4(),
        };
        assert!(auth.has_scope("outreach:write"));
        assert!(require_scope(&auth, "integrations:write").is_ok());

        let limited = AuthContext {
            scopes: vec!["outreach:read".to_string()],
            ..auth
        };
        assert!(limited.has_scope("outreach:read"));
        assert!(require_scope(&limited, "outreach:write").is_err());
    }
}
