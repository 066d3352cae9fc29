//! Repository status endpoints

use galaxy_core::domain::toolshed::{RepositoryRef, RepositoryStatus};
use tracing::{debug, warn};

use crate::ToolShedClient;
use crate::error::Result;

impl ToolShedClient {
    /// Builds the GET request for a repository endpoint
    fn repository_request(&self, path: &str, repo: &RepositoryRef) -> Result<reqwest::Request> {
        let url = self.endpoint(path)?;
        let request = self
            .client
            .get(&url)
            .query(&[
                ("name", repo.name.as_str()),
                ("owner", repo.owner.as_str()),
                ("changeset_revision", repo.changeset_revision.as_str()),
            ])
            .build()?;
        Ok(request)
    }

    /// Fetches the update status of an installed repository revision
    pub async fn status_for_installed_repository(
        &self,
        repo: &RepositoryRef,
    ) -> Result<RepositoryStatus> {
        let request =
            self.repository_request("repository/status_for_installed_repository", repo)?;
        debug!("GET {}", request.url());
        let response = self.client.execute(request).await?;

        self.handle_response(response).await
    }

    /// Like [`Self::status_for_installed_repository`], but a failed call
    /// yields the default (all-false) status so polling can carry on
    pub async fn status_or_default(&self, repo: &RepositoryRef) -> RepositoryStatus {
        match self.status_for_installed_repository(repo).await {
            Ok(status) => status,
            Err(e) => {
                warn!(
                    "Failed to get status of {}/{} from {}: {}",
                    repo.owner, repo.name, self.base_url, e
                );
                RepositoryStatus::default()
            }
        }
    }

    /// Returns the next installable changeset revision after the installed one
    ///
    /// The tool shed answers with plain text; an empty body means there is
    /// nothing newer.
    pub async fn next_installable_changeset_revision(
        &self,
        repo: &RepositoryRef,
    ) -> Result<Option<String>> {
        let request =
            self.repository_request("repository/next_installable_changeset_revision", repo)?;
        debug!("GET {}", request.url());
        let response = self.client.execute(request).await?;

        let text = self.handle_text_response(response).await?;
        let revision = text.trim();
        if revision.is_empty() || revision == repo.changeset_revision {
            Ok(None)
        } else {
            Ok(Some(revision.to_string()))
        }
    }
}
