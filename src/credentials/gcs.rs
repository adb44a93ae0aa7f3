//! Remote validation of a service-account key against Google Cloud Storage.
//!
//! The probe performs the cheapest call that proves the key works end to end:
//! sign a JWT-bearer assertion with the key's private key, exchange it for an
//! access token, and list at most one bucket in the key's project.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use super::{CredentialError, ServiceAccountKey};

const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_only";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Validates a parsed key against the remote storage provider.
#[async_trait]
pub trait StorageProbe: Send + Sync {
    async fn verify(&self, key: &ServiceAccountKey) -> Result<(), CredentialError>;
}

#[derive(Debug, Serialize)]
struct GrantClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Production probe talking to the Google OAuth and Storage endpoints.
pub struct GcsProbe {
    client: reqwest::Client,
    storage_endpoint: String,
}

impl GcsProbe {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            storage_endpoint: "https://storage.googleapis.com/storage/v1".to_string(),
        }
    }
}

impl Default for GcsProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageProbe for GcsProbe {
    async fn verify(&self, key: &ServiceAccountKey) -> Result<(), CredentialError> {
        let now = chrono::Utc::now().timestamp();
        let claims = GrantClaims {
            iss: key.client_email.clone(),
            scope: STORAGE_SCOPE.to_string(),
            aud: key.token_uri.clone(),
            iat: now,
            exp: now + 3600,
        };

        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| CredentialError::Invalid(format!("private key rejected: {e}")))?;
        let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &signing_key)
            .map_err(|e| CredentialError::Invalid(format!("could not sign assertion: {e}")))?;

        let response = self
            .client
            .post(&key.token_uri)
            .form(&[
                ("grant_type", JWT_BEARER_GRANT),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| CredentialError::Invalid(format!("token grant unreachable: {e}")))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialError::Invalid(format!(
                "token grant failed ({status}): {}",
                body.trim()
            )));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| CredentialError::Invalid(format!("malformed token response: {e}")))?;

        let probe = self
            .client
            .get(format!("{}/b", self.storage_endpoint))
            .query(&[("project", key.project_id.as_str()), ("maxResults", "1")])
            .bearer_auth(token.access_token)
            .send()
            .await
            .map_err(|e| CredentialError::Invalid(format!("storage probe unreachable: {e}")))?;
        if !probe.status().is_success() {
            return Err(CredentialError::Invalid(format!(
                "storage probe rejected key for project '{}' ({})",
                key.project_id,
                probe.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_garbage_private_key_fails_before_any_network() {
        let key = ServiceAccountKey {
            key_type: "service_account".to_string(),
            project_id: "demo".to_string(),
            private_key_id: "k1".to_string(),
            private_key: "not a pem".to_string(),
            client_email: "svc@demo.iam.gserviceaccount.com".to_string(),
            token_uri: "https://oauth2.googleapis.com/token".to_string(),
        };
        let err = GcsProbe::new().verify(&key).await.unwrap_err();
        assert!(err.to_string().contains("private key rejected"));
    }
}
