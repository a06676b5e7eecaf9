use url::Url;

use crate::error::{ClientError, Result};
use crate::http::{handle_error, make_url};
use crate::types::{ModelInfo, PreferenceRecord, UserStatus};

/// Client for the control plane
///
/// Serves the model catalog, user status (credit balance), and the
/// analytics endpoint receiving shadow-comparison preferences.
#[derive(Debug, Clone)]
pub struct ControlPlaneClient {
    base_url: Url,
    http: reqwest::Client,
}

impl ControlPlaneClient {
    /// Create a client for the control plane at `base_url`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn new(base_url: Url) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { base_url, http })
    }

    /// List the model catalog
    ///
    /// GET `/models`
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = make_url(&self.base_url, "/models");

        let response = self.http.get(url).send().await?;

        handle_error(response).await?.json().await.map_err(Into::into)
    }

    /// Fetch a user's status, including the remaining credit balance
    ///
    /// GET `/users/:id`
    pub async fn user_status(&self, user_id: u64) -> Result<UserStatus> {
        let url = make_url(&self.base_url, &format!("/users/{user_id}"));

        let response = self.http.get(url).send().await?;

        handle_error(response).await?.json().await.map_err(Into::into)
    }

    /// Submit a shadow-comparison preference
    ///
    /// POST `/evaluations`
    pub async fn submit_preference(&self, record: &PreferenceRecord) -> Result<()> {
        let url = make_url(&self.base_url, "/evaluations");

        let response = self.http.post(url).json(record).send().await?;

        handle_error(response).await?;
        Ok(())
    }
}
