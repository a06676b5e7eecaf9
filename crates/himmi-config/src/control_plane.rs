use serde::Deserialize;
use url::Url;

/// Control plane connection settings
///
/// The control plane serves the model catalog (`/models`), user status
/// (`/users/{id}`), and shadow-comparison preferences (`/evaluations`)
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControlPlaneConfig {
    /// Base URL of the control plane API
    #[serde(default = "default_base_url")]
    pub base_url: Url,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

fn default_base_url() -> Url {
    Url::parse("http://localhost:8000").expect("must be a valid URL")
}
