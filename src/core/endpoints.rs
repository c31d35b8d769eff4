use serde::Deserialize;

pub const DEFAULT_FBX_HOST: &str = "mafreebox.freebox.fr";
const DEFAULT_API_PATH: &str = "/api/v1/";

/// Self-description advertised by the appliance on `/api_version`.
#[derive(Deserialize, Clone, Debug)]
pub struct DeviceDescriptor {
    pub api_base_url: String,
    pub api_version: String,
    pub api_domain: Option<String>,
    pub https_port: Option<u16>,
    pub box_model_name: Option<String>,
    pub device_name: Option<String>,
}

impl DeviceDescriptor {
    /// The appliance advertises its version as `major.minor`; only the
    /// major number takes part in the base path.
    pub fn api_major(&self) -> Option<u32> {
        self.api_version
            .split('.')
            .next()
            .and_then(|v| v.parse::<u32>().ok())
    }
}

/// The concrete URLs the protocol components call, resolved once.
#[derive(Clone, Debug)]
pub struct EndpointSet {
    pub login: String,
    pub authorize: String,
    pub session: String,
    pub call: String,
}

impl EndpointSet {
    /// Composes the versioned endpoint set from the appliance
    /// self-description, or from the fixed default path when no
    /// descriptor is available (first contact). Pure string
    /// composition, no I/O.
    pub fn resolve(host: &str, descriptor: Option<&DeviceDescriptor>) -> Self {
        let api_path = match descriptor.and_then(|d| d.api_major().map(|major| (d, major))) {
            Some((d, major)) => {
                format!("{}/v{}/", d.api_base_url.trim_end_matches('/'), major)
            }
            None => DEFAULT_API_PATH.to_string(),
        };

        let base = format!("https://{}{}", host, api_path);
        let login = format!("{}login/", base);

        Self {
            authorize: format!("{}authorize/", login),
            session: format!("{}session/", login),
            call: format!("{}call/log/", base),
            login,
        }
    }
}

#[cfg(test)]
mod tests {

    use super::{DeviceDescriptor, EndpointSet, DEFAULT_FBX_HOST};

    #[test]
    fn resolve_without_descriptor_uses_default_path() {
        let endpoints = EndpointSet::resolve(DEFAULT_FBX_HOST, None);

        assert_eq!(
            "https://mafreebox.freebox.fr/api/v1/login/",
            endpoints.login
        );
        assert_eq!(
            "https://mafreebox.freebox.fr/api/v1/login/authorize/",
            endpoints.authorize
        );
        assert_eq!(
            "https://mafreebox.freebox.fr/api/v1/login/session/",
            endpoints.session
        );
        assert_eq!(
            "https://mafreebox.freebox.fr/api/v1/call/log/",
            endpoints.call
        );
    }

    #[test]
    fn resolve_with_descriptor_composes_versioned_path() {
        let descriptor = DeviceDescriptor {
            api_base_url: "/api/".to_string(),
            api_version: "12.1".to_string(),
            api_domain: None,
            https_port: None,
            box_model_name: None,
            device_name: None,
        };

        let endpoints = EndpointSet::resolve(DEFAULT_FBX_HOST, Some(&descriptor));

        assert_eq!(
            "https://mafreebox.freebox.fr/api/v12/login/",
            endpoints.login
        );
        assert_eq!(
            "https://mafreebox.freebox.fr/api/v12/call/log/",
            endpoints.call
        );
    }

    #[test]
    fn resolve_with_unparsable_version_falls_back_to_default() {
        let descriptor = DeviceDescriptor {
            api_base_url: "/api/".to_string(),
            api_version: "beta".to_string(),
            api_domain: None,
            https_port: None,
            box_model_name: None,
            device_name: None,
        };

        let endpoints = EndpointSet::resolve(DEFAULT_FBX_HOST, Some(&descriptor));

        assert_eq!(
            "https://mafreebox.freebox.fr/api/v1/login/",
            endpoints.login
        );
    }
}
