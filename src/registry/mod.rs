pub mod ecr;
pub mod models;

use async_trait::async_trait;
use tracing::debug;

use crate::error::PollError;
use crate::settings::Settings;
pub use models::ImageDetail;

/// One page of a describe-images listing
#[derive(Debug, Default)]
pub struct ImagePage {
    pub image_details: Vec<ImageDetail>,
    /// Continuation token for the next page, `None` on the last page
    pub next_token: Option<String>,
}

/// Source of image metadata for a registry
///
/// Implemented by [`ecr::EcrImageSource`] against the AWS API. The trait keeps
/// pagination and orchestration independent of the SDK.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Fetch a single page of image details for `repository`
    async fn describe_images(
        &self,
        registry_id: Option<&str>,
        repository: &str,
        next_token: Option<String>,
    ) -> Result<ImagePage, PollError>;
}

/// Builds an authenticated [`ImageSource`]
///
/// The poller connects once per repository, mirroring how each repository is
/// polled independently.
#[async_trait]
pub trait ImageSourceFactory: Send + Sync {
    type Source: ImageSource;

    async fn connect(&self, settings: &Settings) -> Result<Self::Source, PollError>;
}

/// List every image in a repository, following continuation tokens
///
/// Records are returned in page order. The first page failure aborts the
/// listing and anything accumulated so far is dropped.
pub async fn list_all_images<S: ImageSource + ?Sized>(
    source: &S,
    registry_id: Option<&str>,
    repository: &str,
) -> Result<Vec<ImageDetail>, PollError> {
    let mut images = Vec::new();
    let mut next_token: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = source
            .describe_images(registry_id, repository, next_token)
            .await?;
        pages += 1;

        images.extend(page.image_details);

        next_token = page.next_token;
        if next_token.is_none() {
            break;
        }
    }

    debug!(
        repository = repository,
        pages = pages,
        images = images.len(),
        "No more images are present in the repository to process"
    );

    Ok(images)
}

/// Derive the registry (account) id from a registry endpoint
///
/// # Example
/// `"123456789.dkr.ecr.us-east-2.amazonaws.com"` yields `"123456789"`.
pub fn extract_registry_id(registry_url: &str) -> &str {
    registry_url.split('.').next().unwrap_or_default()
}
