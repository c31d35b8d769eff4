use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::error;
use mockall::automock;
use serde::{Deserialize, Serialize};
use tokio::{fs, fs::File, io::AsyncWriteExt};

/// The durable part of a grant: the secret token and the tracking
/// identifier assigned by the appliance. Status is not persisted, it
/// is recomputed by polling on reload.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct StoredGrant {
    pub app_token: String,
    pub track_id: i32,
}

impl std::fmt::Debug for StoredGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredGrant")
            .field("app_token", &"<redacted>")
            .field("track_id", &self.track_id)
            .finish()
    }
}

#[automock]
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn load(&self) -> Result<Option<StoredGrant>, Box<dyn std::error::Error + Send + Sync>>;
    async fn save(
        &self,
        grant: &StoredGrant,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    async fn clear(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// File-backed store keeping the grant under the configured data
/// directory.
#[derive(Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(data_dir: &str) -> Self {
        Self {
            path: Path::new(data_dir).join("grant.toml"),
        }
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<StoredGrant>, Box<dyn std::error::Error + Send + Sync>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let body = fs::read_to_string(&self.path).await?;

        match toml::from_str::<StoredGrant>(&body) {
            Ok(grant) => Ok(Some(grant)),
            Err(e) => {
                error!("persisted grant is corrupted: {e}");
                Err(Box::new(e))
            }
        }
    }

    async fn save(
        &self,
        grant: &StoredGrant,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let body = toml::to_string(grant)?;

        // write to a side file then rename, an interrupted write must
        // never leave a half-written token behind
        let tmp = self.path.with_extension("toml.tmp");

        let mut file = File::create(&tmp).await?;
        file.write_all(body.as_bytes()).await?;
        file.shutdown().await?;

        fs::rename(&tmp, &self.path).await?;

        Ok(())
    }

    async fn clear(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.path.exists() {
            fs::remove_file(&self.path).await?;
        }

        Ok(())
    }
}
