use crate::{Error, Result, config::ClientSettings};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Record of the last deployment, written next to the operator's working
/// directory so the client binaries can find the endpoint again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointInfo {
    pub endpoint_name: String,
    pub instance_type: String,
    pub region: String,
    pub deployed_at: DateTime<Utc>,
}

impl EndpointInfo {
    pub async fn load(path: &Path) -> Result<Self> {
        debug!("Reading endpoint info from {}", path.display());
        let contents = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, contents).await?;
        info!("Endpoint info saved to {}", path.display());
        Ok(())
    }

    /// Deletes the file if it still describes `endpoint_name`.
    pub async fn remove_if_matches(path: &Path, endpoint_name: &str) -> Result<bool> {
        match Self::load(path).await {
            Ok(info) if info.endpoint_name == endpoint_name => {
                tokio::fs::remove_file(path).await?;
                Ok(true)
            }
            Ok(_) => Ok(false),
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// `ENDPOINT_NAME` if set, otherwise the name recorded by the last deployment.
pub async fn resolve_endpoint_name(settings: &ClientSettings) -> Result<String> {
    if let Some(ref name) = settings.endpoint_name {
        return Ok(name.clone());
    }

    let path = &settings.endpoint_info_path;
    match EndpointInfo::load(path).await {
        Ok(info) => Ok(info.endpoint_name),
        Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::config(format!(
            "ENDPOINT_NAME is not set and {} does not exist",
            path.display()
        ))),
        Err(e) => Err(Error::config(format!(
            "ENDPOINT_NAME is not set and {} is unreadable: {}",
            path.display(),
            e
        ))),
    }
}
