use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_ecr::Client as EcrClient;
use tracing::debug;

use super::{ImageDetail, ImagePage, ImageSource, ImageSourceFactory};
use crate::error::{format_sdk_error, PollError};
use crate::settings::Settings;

/// Image source backed by the ECR `DescribeImages` API
pub struct EcrImageSource {
    client: EcrClient,
}

impl EcrImageSource {
    /// Build an ECR client bound to the configured region
    ///
    /// Static credentials are used when both keys are set; otherwise the
    /// default credential chain (env vars, profile, IAM role) applies. A single
    /// attempt is made; an empty or malformed region is a
    /// [`PollError::AuthConfig`].
    pub async fn connect(settings: &Settings) -> Result<Self, PollError> {
        let region = settings.aws_region.trim();
        validate_region(region)?;

        let aws_config = if let (Some(access_key), Some(secret_key)) =
            (settings.access_key(), settings.secret_key())
        {
            let creds =
                aws_sdk_ecr::config::Credentials::new(access_key, secret_key, None, None, "static");
            aws_config::defaults(BehaviorVersion::latest())
                .credentials_provider(creds)
                .region(aws_config::Region::new(region.to_string()))
                .load()
                .await
        } else {
            debug!("No static credentials configured, using the default AWS credential chain");
            aws_config::defaults(BehaviorVersion::latest())
                .region(aws_config::Region::new(region.to_string()))
                .load()
                .await
        };

        Ok(Self {
            client: EcrClient::new(&aws_config),
        })
    }
}

/// Connects [`EcrImageSource`]s from settings
pub struct EcrConnector;

#[async_trait]
impl ImageSourceFactory for EcrConnector {
    type Source = EcrImageSource;

    async fn connect(&self, settings: &Settings) -> Result<EcrImageSource, PollError> {
        EcrImageSource::connect(settings).await
    }
}

#[async_trait]
impl ImageSource for EcrImageSource {
    async fn describe_images(
        &self,
        registry_id: Option<&str>,
        repository: &str,
        next_token: Option<String>,
    ) -> Result<ImagePage, PollError> {
        let response = self
            .client
            .describe_images()
            .repository_name(repository)
            .set_registry_id(registry_id.map(String::from))
            .set_next_token(next_token)
            .send()
            .await
            .map_err(|e| PollError::List {
                repository: repository.to_string(),
                message: format_sdk_error(&e),
            })?;

        Ok(ImagePage {
            image_details: response
                .image_details()
                .iter()
                .map(ImageDetail::from)
                .collect(),
            next_token: response.next_token().map(String::from),
        })
    }
}

/// Reject regions the SDK would only fail on at request time
fn validate_region(region: &str) -> Result<(), PollError> {
    if region.is_empty() {
        return Err(PollError::AuthConfig(
            "AWS_REGION must not be empty".to_string(),
        ));
    }
    let well_formed = region
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !well_formed || region.starts_with('-') || region.ends_with('-') {
        return Err(PollError::AuthConfig(format!(
            "malformed AWS region '{}'",
            region
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_region() {
        assert!(validate_region("us-east-2").is_ok());
        assert!(validate_region("ap-southeast-1").is_ok());
        assert!(matches!(
            validate_region(""),
            Err(PollError::AuthConfig(_))
        ));
        assert!(matches!(
            validate_region("US East"),
            Err(PollError::AuthConfig(_))
        ));
        assert!(matches!(
            validate_region("-us-east-1"),
            Err(PollError::AuthConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_rejects_empty_region() {
        let settings = Settings {
            aws_region: "  ".to_string(),
            repository: "web".to_string(),
            ..Default::default()
        };
        let result = EcrImageSource::connect(&settings).await;
        assert!(matches!(result, Err(PollError::AuthConfig(_))));
    }

    #[tokio::test]
    async fn test_connect_with_static_credentials() {
        let settings = Settings {
            access_key: Some("AKIAEXAMPLE".to_string()),
            secret_key: Some("secret".to_string()),
            aws_region: "us-east-2".to_string(),
            repository: "web".to_string(),
            ..Default::default()
        };
        let source = EcrImageSource::connect(&settings).await.unwrap();
        assert_eq!(
            source.client.config().region().map(|r| r.to_string()),
            Some("us-east-2".to_string())
        );
    }
}
