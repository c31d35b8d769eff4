use log::debug;

use super::{
    endpoints::DeviceDescriptor,
    transport::{http_client_factory, ApiError},
};

/// Fetches the appliance self-description from `/api_version`.
///
/// This endpoint is served outside the API envelope, so it goes
/// through a plain client rather than the gateway. The `use_tls`
/// param may be set to `false` for appliances still answering plain
/// HTTP on the LAN.
pub async fn fetch_descriptor(host: &str, use_tls: bool) -> Result<DeviceDescriptor, ApiError> {
    debug!("discovering api version on {host}");

    let client = http_client_factory()?;

    let scheme = if use_tls { "https" } else { "http" };

    let descriptor = client
        .get(format!("{scheme}://{host}/api_version"))
        .send()
        .await?
        .json::<DeviceDescriptor>()
        .await?;

    Ok(descriptor)
}

#[cfg(test)]
mod tests {

    use serde_json::json;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::fetch_descriptor;

    #[tokio::test]
    async fn fetch_descriptor_reads_the_self_description() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api_version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "box_model_name": "Freebox v7 (r1)",
                "api_base_url": "/api/",
                "https_port": 443,
                "device_name": "Freebox Server",
                "https_available": true,
                "box_model": "fbxgw7-r1/full",
                "api_domain": "example.fbxos.fr",
                "uid": "23b86ec8091f46cab7b3095418274f73",
                "api_version": "12.0",
                "device_type": "FreeboxServer7,1",
            })))
            .mount(&mock_server)
            .await;

        let host = mock_server.uri().trim_start_matches("http://").to_string();

        let descriptor = fetch_descriptor(&host, false).await.unwrap();

        assert_eq!("/api/", descriptor.api_base_url);
        assert_eq!(Some(12), descriptor.api_major());
        assert_eq!(Some("example.fbxos.fr".to_string()), descriptor.api_domain);
    }
}
