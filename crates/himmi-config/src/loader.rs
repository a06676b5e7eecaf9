use std::path::Path;

use secrecy::ExposeSecret;

use crate::Config;

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, a placeholder cannot be
    /// expanded, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::parse(&raw)
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing, or validation fails
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid setting
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_gateway()?;
        self.validate_telemetry()?;
        Ok(())
    }

    fn validate_gateway(&self) -> anyhow::Result<()> {
        let gateway = &self.gateway;

        if gateway.api_key_prefix.trim().is_empty() {
            anyhow::bail!("gateway.api_key_prefix must not be empty");
        }

        if let Some(ref key) = gateway.api_key
            && !key.expose_secret().trim().starts_with(&gateway.api_key_prefix)
        {
            anyhow::bail!("gateway.api_key must start with '{}'", gateway.api_key_prefix);
        }

        if gateway.request_timeout()?.is_some_and(|d| d.is_zero()) {
            anyhow::bail!("gateway.request_timeout must be greater than 0");
        }

        if gateway.connect_timeout()?.is_zero() {
            anyhow::bail!("gateway.connect_timeout must be greater than 0");
        }

        Ok(())
    }

    fn validate_telemetry(&self) -> anyhow::Result<()> {
        let Some(rate) = self
            .telemetry
            .as_ref()
            .and_then(|t| t.tracing.as_ref())
            .map(|t| t.sampling_rate)
        else {
            return Ok(());
        };

        if !(0.0..=1.0).contains(&rate) {
            anyhow::bail!("telemetry.tracing.sampling_rate must be between 0 and 1");
        }

        Ok(())
    }
}
