use crate::error::AppError;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role carried by an access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Admin,
}

/// JWT claims for access tokens.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the account email.
    pub sub: String,
    pub role: Role,
    /// Present only for client tokens.
    pub client_id: Option<Uuid>,
    /// Expiry, seconds since epoch.
    pub exp: i64,
}

/// Verified authorization context, constructed once at the request boundary
/// and passed into core operations. Core logic never sees raw tokens.
#[derive(Debug, Clone, Copy)]
pub struct AuthContext {
    pub role: Role,
    pub client_id: Option<Uuid>,
}

impl AuthContext {
    pub fn admin() -> Self {
        Self {
            role: Role::Admin,
            client_id: None,
        }
    }

    pub fn client(client_id: Uuid) -> Self {
        Self {
            role: Role::Client,
            client_id: Some(client_id),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Require the admin role.
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden(anyhow::anyhow!(
                "Administrator role required"
            )))
        }
    }

    /// Require that the caller is the given client, or an admin.
    pub fn require_client(&self, client_id: Uuid) -> Result<(), AppError> {
        if self.is_admin() || self.client_id == Some(client_id) {
            Ok(())
        } else {
            Err(AppError::Forbidden(anyhow::anyhow!(
                "Not authorized for this client"
            )))
        }
    }
}

/// Issue a signed access token.
pub fn issue_token(
    secret: &str,
    sub: &str,
    role: Role,
    client_id: Option<Uuid>,
    ttl_seconds: i64,
) -> Result<String, AppError> {
    let claims = Claims {
        sub: sub.to_string(),
        role,
        client_id,
        exp: chrono_now_epoch() + ttl_seconds,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to sign token: {}", e)))
}

/// Verify a token and build the typed [`AuthContext`] from its claims.
pub fn verify_token(secret: &str, token: &str) -> Result<AuthContext, AppError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| AppError::Unauthorized(anyhow::anyhow!("Invalid token: {}", e)))?;

    if data.claims.role == Role::Client && data.claims.client_id.is_none() {
        return Err(AppError::Unauthorized(anyhow::anyhow!(
            "Client token missing client_id claim"
        )));
    }

    Ok(AuthContext {
        role: data.claims.role,
        client_id: data.claims.client_id,
    })
}

fn chrono_now_epoch() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-signing-secret";

    #[test]
    fn issue_then_verify_client_token() {
        let client_id = Uuid::new_v4();
        let token =
            issue_token(SECRET, "client@example.com", Role::Client, Some(client_id), 3600).unwrap();
        let ctx = verify_token(SECRET, &token).unwrap();
        assert_eq!(ctx.role, Role::Client);
        assert_eq!(ctx.client_id, Some(client_id));
    }

    #[test]
    fn client_token_without_client_id_is_rejected() {
        let token = issue_token(SECRET, "client@example.com", Role::Client, None, 3600).unwrap();
        assert!(verify_token(SECRET, &token).is_err());
    }

    #[test]
    fn tampered_token_is_rejected() {
        let token = issue_token(SECRET, "admin@example.com", Role::Admin, None, 3600).unwrap();
        assert!(verify_token("other-secret", &token).is_err());
    }

    #[test]
    fn require_client_allows_owner_and_admin_only() {
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();
        assert!(AuthContext::client(owner).require_client(owner).is_ok());
        assert!(AuthContext::client(other).require_client(owner).is_err());
        assert!(AuthContext::admin().require_client(owner).is_ok());
    }
}
