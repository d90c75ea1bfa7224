//! Provider-specific OAuth logic
//!
//! Endpoint defaults for known providers, and the HTTP client that exchanges
//! an authorization code and reads the user's claims.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

use crate::error::{AppError, AppResult};
use crate::models::UserIdentity;
use crate::settings::ProviderSettings;

/// Path the provider redirects back to, relative to `redirect_base_url`
pub const CALLBACK_PATH: &str = "/auth/callback";

/// The external identity provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Provider key used in user records (`google`, `github`, ...)
    fn name(&self) -> &str;

    /// Where to send the browser to start a login
    fn authorization_url(&self, state: &str) -> String;

    /// Trade an authorization grant for the user's verified identity
    ///
    /// # Errors
    ///
    /// Returns `AppError::AuthProvider` on network failure, timeout, a
    /// non-success status or claims without a subject
    async fn exchange_grant(&self, grant: &str) -> AppResult<UserIdentity>;
}

/// Resolved provider configuration
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub client_id: String,
    pub client_secret: String,
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    pub userinfo_endpoint: Url,
    pub scopes: Vec<String>,
    pub redirect_uri: String,
    pub extra_auth_params: BTreeMap<String, String>,
}

struct KnownProvider {
    authorization: &'static str,
    token: &'static str,
    userinfo: &'static str,
    scopes: &'static [&'static str],
}

fn known_provider(name: &str) -> Option<KnownProvider> {
    match name {
        "google" => Some(KnownProvider {
            authorization: "https://accounts.google.com/o/oauth2/v2/auth",
            token: "https://oauth2.googleapis.com/token",
            userinfo: "https://openidconnect.googleapis.com/v1/userinfo",
            scopes: &["openid", "email", "profile"],
        }),
        "github" => Some(KnownProvider {
            authorization: "https://github.com/login/oauth/authorize",
            token: "https://github.com/login/oauth/access_token",
            userinfo: "https://api.github.com/user",
            scopes: &["read:user", "user:email"],
        }),
        _ => None,
    }
}

impl ProviderConfig {
    /// Merge settings over the defaults of a known provider
    ///
    /// # Errors
    ///
    /// Returns `AppError::Configuration` if credentials are missing, an
    /// endpoint is neither configured nor known, or an endpoint is not a URL
    pub fn from_settings(settings: &ProviderSettings, redirect_base_url: &str) -> AppResult<Self> {
        let client_id = settings
            .get_client_id()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                AppError::Configuration(format!("Missing client_id for provider {}", settings.name))
            })?;
        let client_secret = settings
            .get_client_secret()
            .filter(|secret| !secret.is_empty())
            .ok_or_else(|| {
                AppError::Configuration(format!(
                    "Missing client_secret for provider {}",
                    settings.name
                ))
            })?;

        let known = known_provider(&settings.name);
        let authorization_endpoint = resolve_endpoint(
            &settings.name,
            settings.authorization_endpoint.as_deref(),
            known.as_ref().map(|k| k.authorization),
            "authorization",
        )?;
        let token_endpoint = resolve_endpoint(
            &settings.name,
            settings.token_endpoint.as_deref(),
            known.as_ref().map(|k| k.token),
            "token",
        )?;
        let userinfo_endpoint = resolve_endpoint(
            &settings.name,
            settings.userinfo_endpoint.as_deref(),
            known.as_ref().map(|k| k.userinfo),
            "userinfo",
        )?;

        let scopes = if settings.scopes.is_empty() {
            known
                .as_ref()
                .map(|k| k.scopes.iter().map(ToString::to_string).collect())
                .unwrap_or_default()
        } else {
            settings.scopes.clone()
        };

        Ok(Self {
            name: settings.name.clone(),
            client_id,
            client_secret,
            authorization_endpoint,
            token_endpoint,
            userinfo_endpoint,
            scopes,
            redirect_uri: format!("{}{CALLBACK_PATH}", redirect_base_url.trim_end_matches('/')),
            extra_auth_params: settings
                .extra_auth_params
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        })
    }
}

fn resolve_endpoint(
    provider: &str,
    configured: Option<&str>,
    default: Option<&str>,
    kind: &str,
) -> AppResult<Url> {
    let raw = configured.or(default).ok_or_else(|| {
        AppError::Configuration(format!("Provider {provider} has no {kind} endpoint configured"))
    })?;
    Url::parse(raw)
        .map_err(|e| AppError::Configuration(format!("Invalid {kind} endpoint for {provider}: {e}")))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Identity from userinfo claims
///
/// Accepts OIDC claims (`sub`) and GitHub-style profiles (numeric `id`, `login`).
///
/// # Errors
///
/// Returns `AppError::AuthProvider` when no subject can be found
pub fn identity_from_claims(claims: &Value) -> AppResult<UserIdentity> {
    let provider_id = match (claims.get("sub"), claims.get("id")) {
        (Some(Value::String(sub)), _) if !sub.is_empty() => sub.clone(),
        (_, Some(Value::String(id))) if !id.is_empty() => id.clone(),
        (_, Some(Value::Number(id))) => id.to_string(),
        _ => {
            return Err(AppError::AuthProvider(
                "userinfo response has no subject".to_string(),
            ))
        }
    };

    let text = |key: &str| {
        claims
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let email = text("email");
    let display_name = text("name")
        .or_else(|| text("login"))
        .or_else(|| email.clone())
        .unwrap_or_else(|| provider_id.clone());

    Ok(UserIdentity {
        provider_id,
        display_name,
        email,
    })
}

/// OAuth 2.0 authorization-code provider over HTTP
pub struct HttpIdentityProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl HttpIdentityProvider {
    /// # Errors
    ///
    /// Returns `AppError::Configuration` if the HTTP client cannot be built
    pub fn new(config: ProviderConfig, timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    async fn fetch_access_token(&self, grant: &str) -> AppResult<String> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", grant),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];

        let response = self
            .client
            .post(self.config.token_endpoint.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::AuthProvider(format!("Token request failed: {e}")))?;

        let status = response.status();
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::AuthProvider(format!("Token response unreadable ({status}): {e}")))?;

        if let Some(error) = body.error {
            return Err(AppError::AuthProvider(format!(
                "Token endpoint returned {error}: {}",
                body.error_description.unwrap_or_default()
            )));
        }
        if !status.is_success() {
            return Err(AppError::AuthProvider(format!("Token endpoint returned {status}")));
        }
        body.access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AppError::AuthProvider("Token response has no access_token".to_string()))
    }

    async fn fetch_claims(&self, access_token: &str) -> AppResult<Value> {
        let response = self
            .client
            .get(self.config.userinfo_endpoint.clone())
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| AppError::AuthProvider(format!("Userinfo request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::AuthProvider(format!("Userinfo endpoint returned {status}")));
        }
        response
            .json()
            .await
            .map_err(|e| AppError::AuthProvider(format!("Userinfo response unreadable: {e}")))
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn authorization_url(&self, state: &str) -> String {
        let mut url = self.config.authorization_endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.config.client_id)
                .append_pair("redirect_uri", &self.config.redirect_uri)
                .append_pair("scope", &self.config.scopes.join(" "))
                .append_pair("state", state);
            for (key, value) in &self.config.extra_auth_params {
                query.append_pair(key, value);
            }
        }
        url.into()
    }

    async fn exchange_grant(&self, grant: &str) -> AppResult<UserIdentity> {
        log::debug!(
            "Exchanging authorization grant with {} (length {})",
            self.config.name,
            grant.len()
        );
        let access_token = self.fetch_access_token(grant).await?;
        let claims = self.fetch_claims(&access_token).await?;
        identity_from_claims(&claims)
    }
}
