//! # Token Issuer
//!
//! Obtains a fresh bearer token from the OAuth2 token endpoint using the
//! client-credentials grant. The issuer sits behind a trait so the token
//! accessor can be driven by a fake in tests.

use async_trait::async_trait;
use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{AuthType, AuthUrl, ClientId, ClientSecret, Scope, TokenResponse, TokenUrl};
use tracing::debug;

use crate::core::config::CredentialsConfig;
use crate::core::error::{ProxyError, ProxyResult};

/// Source of fresh bearer tokens
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Acquire a new access token
    async fn issue_token(&self) -> ProxyResult<String>;
}

/// Client-credentials token issuer built on the `oauth2` crate
pub struct OAuth2TokenIssuer {
    client: BasicClient,
    scope: String,
}

impl OAuth2TokenIssuer {
    pub fn new(config: &CredentialsConfig) -> ProxyResult<Self> {
        let token_url = TokenUrl::new(config.token_url.clone())
            .map_err(|e| ProxyError::config(format!("Invalid token URL '{}': {}", config.token_url, e)))?;

        // The client-credentials grant never visits the authorization endpoint,
        // but BasicClient requires one.
        let auth_url = AuthUrl::new(config.token_url.clone())
            .map_err(|e| ProxyError::config(format!("Invalid token URL '{}': {}", config.token_url, e)))?;

        let client = BasicClient::new(
            ClientId::new(config.client_id.clone()),
            Some(ClientSecret::new(config.client_secret.clone())),
            auth_url,
            Some(token_url),
        )
        .set_auth_type(AuthType::RequestBody);

        Ok(Self {
            client,
            scope: config.scope.clone(),
        })
    }
}

#[async_trait]
impl TokenIssuer for OAuth2TokenIssuer {
    async fn issue_token(&self) -> ProxyResult<String> {
        debug!(scope = %self.scope, "Requesting client-credentials token");

        let response = self
            .client
            .exchange_client_credentials()
            .add_scope(Scope::new(self.scope.clone()))
            .request_async(async_http_client)
            .await
            .map_err(|e| ProxyError::credential(e.to_string()))?;

        Ok(response.access_token().secret().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> CredentialsConfig {
        CredentialsConfig {
            token_url: format!("{}/connect/token", server.uri()),
            client_id: "proxy-client".to_string(),
            client_secret: "proxy-secret".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_issue_token_posts_client_credentials() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/connect/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_id=proxy-client"))
            .and(body_string_contains("scope=icdapi_access"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "issued-token",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let issuer = OAuth2TokenIssuer::new(&config_for(&server)).unwrap();
        assert_eq!(issuer.issue_token().await.unwrap(), "issued-token");
    }

    #[tokio::test]
    async fn test_rejected_credentials_map_to_credential_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/connect/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_client"
            })))
            .mount(&server)
            .await;

        let issuer = OAuth2TokenIssuer::new(&config_for(&server)).unwrap();
        let err = issuer.issue_token().await.unwrap_err();
        assert!(matches!(err, ProxyError::Credential { .. }));
    }

    #[test]
    fn test_invalid_token_url_is_configuration_error() {
        let config = CredentialsConfig {
            token_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            OAuth2TokenIssuer::new(&config),
            Err(ProxyError::Configuration { .. })
        ));
    }
}
