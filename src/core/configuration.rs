use serde::Deserialize;
use std::{
    fs::{self},
    path::Path,
};
use tokio::{fs::File, io::AsyncReadExt};

use super::{authorization::AppIdentity, endpoints::DEFAULT_FBX_HOST};

#[derive(Deserialize, Clone, Debug)]
pub struct Configuration {
    pub api: ApiConfiguration,
    pub app: AppConfiguration,
    pub core: CoreConfiguration,
    pub log: LogConfiguration,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ApiConfiguration {
    pub host: Option<String>,
    pub discovery: Option<bool>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct AppConfiguration {
    pub app_id: Option<String>,
    pub app_name: Option<String>,
    pub app_version: Option<String>,
    pub device_name: Option<String>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct CoreConfiguration {
    pub data_directory: Option<String>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct LogConfiguration {
    pub level: Option<String>,
    pub retention: Option<usize>,
}

impl Configuration {
    pub fn api_host(&self) -> String {
        self.api
            .host
            .clone()
            .unwrap_or_else(|| DEFAULT_FBX_HOST.to_string())
    }

    /// Builds the immutable identity shown on the appliance LCD.
    /// `device_name` falls back to the machine hostname.
    pub fn app_identity(&self) -> Result<AppIdentity, std::io::Error> {
        let device_name = match self.app.device_name.clone() {
            Some(name) => name,
            None => hostname::get()?.to_string_lossy().to_string(),
        };

        Ok(AppIdentity::new(
            self.app
                .app_id
                .clone()
                .unwrap_or_else(|| "fr.freebox.client".to_string()),
            self.app
                .app_name
                .clone()
                .unwrap_or_else(|| "Freebox Client".to_string()),
            self.app
                .app_version
                .clone()
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            device_name,
        ))
    }

    pub fn assert_data_dir_permissions(&self) -> Result<(), &str> {
        // same default as the token store, an unset directory means
        // the working directory
        let data_dir = self
            .core
            .data_directory
            .to_owned()
            .unwrap_or_else(|| ".".to_string());

        let path = Path::new(&data_dir);

        if !path.try_exists().map_err(|_| "access is denied")? {
            return Err("data dir does not exist");
        }

        let permissions = fs::metadata(path)
            .map_err(|_| "cannot read metadata")?
            .permissions();

        if permissions.readonly() {
            return Err("data_dir cannot be readonly");
        }

        Ok(())
    }

    /// A blank `app_id` would be sent verbatim to the appliance and
    /// rejected there. Unset is fine, the default identity applies.
    pub fn assert_app_id_is_not_empty(&self) -> Result<(), ()> {
        match self.app.app_id.as_deref() {
            Some(v) if v.trim().is_empty() => Err(()),
            _ => Ok(()),
        }
    }
}

pub async fn get_configuration(
    file_path: String,
) -> Result<Configuration, Box<dyn std::error::Error + Send + Sync>> {
    let path = Path::new(&file_path);

    if !path.exists() {
        return Err(Box::new(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("configuration file is missing: {file_path}"),
        )));
    }

    let mut file = File::open(path).await?;
    let mut buffer = vec![];

    file.read_to_end(&mut buffer).await?;

    let result = String::from_utf8(buffer)?;

    let configuration = toml::from_str::<Configuration>(&result)?;

    Ok(configuration)
}
