//! Short-lived registry credentials for AWS ECR

use crate::config::AwsAccessConfig;
use crate::error::{PushError, Result};
use async_trait::async_trait;
use aws_sdk_ecr::config::Credentials;
use aws_sdk_ecr::error::DisplayErrorContext;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use std::fmt;
use tracing::{debug, info};

const ECR_HOST_MARKER: &str = ".dkr.ecr.";
const ECR_HOST_SUFFIX: &str = ".amazonaws.com";

/// Username/password pair accepted by `docker login`
#[derive(Clone, PartialEq)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for RegistryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Exchanges cloud credentials for registry login credentials
#[async_trait]
pub trait CredentialExchange: Send + Sync {
    async fn login_credentials(&self, server: &str) -> Result<RegistryCredentials>;
}

/// Account and region encoded in an ECR registry host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcrRegistry {
    pub account_id: String,
    pub region: String,
}

/// Parse `[scheme://]<account>.dkr.ecr.<region>.amazonaws.com[/...]`
pub fn parse_ecr_url(url: &str) -> Result<EcrRegistry> {
    let invalid = || {
        PushError::Ecr(format!(
            "Failed to parse the ECR URL: {} it should be on the form <account number>.dkr.ecr.<region>.amazonaws.com",
            url
        ))
    };

    let without_scheme = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    let host = without_scheme.split('/').next().unwrap_or_default();

    let (account_id, rest) = host.split_once(ECR_HOST_MARKER).ok_or_else(invalid)?;
    let region = rest
        .rfind(ECR_HOST_SUFFIX)
        .map(|end| &rest[..end])
        .ok_or_else(invalid)?;

    if account_id.is_empty()
        || !account_id.chars().all(|c| c.is_ascii_digit())
        || region.is_empty()
    {
        return Err(invalid());
    }

    Ok(EcrRegistry {
        account_id: account_id.to_string(),
        region: region.to_string(),
    })
}

/// Decode a base64 `user:password` authorization token
pub fn decode_authorization_token(token: &str) -> Result<RegistryCredentials> {
    let decoded = STANDARD
        .decode(token.trim())
        .map_err(|e| PushError::Ecr(format!("Error decoding ECR AuthorizationToken: {}", e)))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|e| PushError::Ecr(format!("Error decoding ECR AuthorizationToken: {}", e)))?;

    let (username, password) = decoded.split_once(':').ok_or_else(|| {
        PushError::Ecr("Error decoding ECR AuthorizationToken: missing ':' separator".to_string())
    })?;

    Ok(RegistryCredentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}

/// Credential exchange backed by the ECR `GetAuthorizationToken` API
#[derive(Debug, Clone, Default)]
pub struct EcrCredentials {
    access: AwsAccessConfig,
}

impl EcrCredentials {
    pub fn new(access: AwsAccessConfig) -> Self {
        Self { access }
    }

    /// Static keys win over a named profile; with neither, the default chain is used
    async fn sdk_config(&self, region: &str) -> aws_config::SdkConfig {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()));

        if self.access.has_static_credentials() {
            debug!("Using static AWS credentials");
            let session_token =
                (!self.access.aws_token.is_empty()).then(|| self.access.aws_token.clone());
            loader = loader.credentials_provider(Credentials::new(
                self.access.aws_access_key.clone(),
                self.access.aws_secret_key.clone(),
                session_token,
                None,
                "docker-push",
            ));
        } else if !self.access.aws_profile.is_empty() {
            debug!(profile = %self.access.aws_profile, "Using AWS profile");
            loader = loader.profile_name(&self.access.aws_profile);
        }

        loader.load().await
    }
}

#[async_trait]
impl CredentialExchange for EcrCredentials {
    async fn login_credentials(&self, server: &str) -> Result<RegistryCredentials> {
        let registry = parse_ecr_url(server)?;
        info!(
            "Getting ECR token for account: {} in {}..",
            registry.account_id, registry.region
        );

        let sdk_config = self.sdk_config(&registry.region).await;
        let client = aws_sdk_ecr::Client::new(&sdk_config);

        let response = client
            .get_authorization_token()
            .send()
            .await
            .map_err(|e| PushError::Ecr(DisplayErrorContext(&e).to_string()))?;

        let token = response
            .authorization_data()
            .first()
            .and_then(|data| data.authorization_token())
            .ok_or_else(|| {
                PushError::Ecr(format!(
                    "ECR returned no authorization token for account {}",
                    registry.account_id
                ))
            })?;

        debug!("Received ECR authorization token");
        decode_authorization_token(token)
    }
}
