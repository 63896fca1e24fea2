use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::error::PollError;
use crate::filter::filter_images;
use crate::output::{merge_into_file, MergeOutcome};
use crate::registry::{list_all_images, ImageSource, ImageSourceFactory};
use crate::settings::Settings;

/// Result of a completed run
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Repositories whose images were written, with what was written
    pub polled: Vec<(String, MergeOutcome)>,
}

/// Polls every configured repository and appends new images to the results file
///
/// Repositories are processed one after another. Each one re-reads and
/// rewrites the results file, so later repositories see earlier appends.
pub struct Poller {
    settings: Settings,
    last_fetched: Option<DateTime<Utc>>,
    file_mode: u32,
}

impl Poller {
    pub fn new(settings: Settings) -> Result<Self, PollError> {
        let file_mode = settings.file_mode()?;
        let last_fetched = settings.last_fetched();

        match last_fetched {
            Some(since) => info!(since = %since, "Polling images pushed since the last fetch"),
            None => info!(
                limit = settings.cold_start_limit,
                "No previous fetch time, keeping the most recently pushed images"
            ),
        }

        Ok(Self {
            settings,
            last_fetched,
            file_mode,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Poll all repositories, connecting through `factory` for each one
    ///
    /// By default the first failure aborts the run. With `continue_on_error`
    /// every repository is attempted, failures are logged, and the first error
    /// is returned once all repositories have been tried.
    pub async fn run<F: ImageSourceFactory>(&self, factory: &F) -> Result<RunSummary, PollError> {
        let mut summary = RunSummary::default();
        let mut first_error = None;

        for repository in self.settings.repositories() {
            let result = match factory.connect(&self.settings).await {
                Ok(source) => self.poll_repository(&source, repository).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(outcome) => summary.polled.push((repository.to_string(), outcome)),
                Err(e) if self.settings.continue_on_error => {
                    error!(
                        repository = repository,
                        error = %e,
                        "Polling repository failed, continuing with the next one"
                    );
                    first_error.get_or_insert(e);
                }
                Err(e) => return Err(e),
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    /// List, filter and record the images of a single repository
    pub async fn poll_repository<S: ImageSource + ?Sized>(
        &self,
        source: &S,
        repository: &str,
    ) -> Result<MergeOutcome, PollError> {
        let registry_id = self.settings.registry_id();

        let images = list_all_images(source, registry_id, repository).await?;
        let total = images.len();

        let selected = filter_images(images, self.last_fetched, self.settings.cold_start_limit);
        info!(
            repository = repository,
            registry_id = registry_id.unwrap_or("<caller account>"),
            total = total,
            selected = selected.len(),
            "Fetched images from container registry"
        );

        let outcome = merge_into_file(
            &self.settings.output_path,
            &self.settings.aws_region,
            &selected,
            self.file_mode,
        )?;

        info!(repository = repository, "Polling from container registry succeeded");
        Ok(outcome)
    }
}
