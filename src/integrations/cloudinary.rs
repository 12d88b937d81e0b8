//! Cloudinary image uploads with signed requests.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::instrument;

use super::{ImageHost, IntegrationError, UploadedImage, error_from_response};
use crate::config::CloudinaryConfig;

const SERVICE: &str = "cloudinary";

#[derive(Clone)]
pub struct CloudinaryClient {
    client: reqwest::Client,
    cloud_name: String,
    api_key: String,
    api_secret: SecretString,
    folder: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Deserialize)]
struct DestroyResponse {
    result: String,
}

impl CloudinaryClient {
    /// # Errors
    ///
    /// Returns `IntegrationError::Http` if the HTTP client cannot be built.
    pub fn new(config: &CloudinaryConfig) -> Result<Self, IntegrationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            cloud_name: config.cloud_name.clone(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            folder: config.folder.clone(),
        })
    }

    fn endpoint(&self, action: &str) -> String {
        format!("https://api.cloudinary.com/v1_1/{}/image/{action}", self.cloud_name)
    }

    fn signed_form(&self, params: &[(&'static str, String)]) -> Form {
        let signature = sign_params(params, self.api_secret.expose_secret());
        params
            .iter()
            .fold(Form::new(), |form, (k, v)| form.text(*k, v.clone()))
            .text("api_key", self.api_key.clone())
            .text("signature", signature)
            .text("signature_algorithm", "sha256")
    }
}

#[async_trait]
impl ImageHost for CloudinaryClient {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn upload(&self, file_name: &str, content_type: &str, bytes: Vec<u8>) -> Result<UploadedImage, IntegrationError> {
        let timestamp = Utc::now().timestamp().to_string();
        let part = Part::bytes(bytes).file_name(file_name.to_string()).mime_str(content_type)?;
        let form = self
            .signed_form(&[("folder", self.folder.clone()), ("timestamp", timestamp)])
            .part("file", part);

        let response = self.client.post(self.endpoint("upload")).multipart(form).send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(SERVICE, response).await);
        }
        let uploaded: UploadResponse = response.json().await?;
        tracing::info!(public_id = %uploaded.public_id, "Image uploaded");
        Ok(UploadedImage {
            url: uploaded.secure_url,
            public_id: uploaded.public_id,
            width: uploaded.width,
            height: uploaded.height,
        })
    }

    #[instrument(skip(self))]
    async fn destroy(&self, public_id: &str) -> Result<(), IntegrationError> {
        let timestamp = Utc::now().timestamp().to_string();
        let form = self.signed_form(&[("public_id", public_id.to_string()), ("timestamp", timestamp)]);
        let response = self.client.post(self.endpoint("destroy")).multipart(form).send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(SERVICE, response).await);
        }
        let destroyed: DestroyResponse = response.json().await?;
        match destroyed.result.as_str() {
            "ok" | "not found" => Ok(()),
            other => Err(IntegrationError::Decode { service: SERVICE, message: format!("destroy returned {other}") }),
        }
    }
}

/// Cloudinary request signature: the parameters sorted by name, joined as a
/// query string, followed by the API secret, hashed with SHA-256.
fn sign_params(params: &[(&'static str, String)], api_secret: &str) -> String {
    let mut sorted: Vec<_> = params.iter().collect();
    sorted.sort_by_key(|(k, _)| *k);
    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    hex::encode(Sha256::digest(format!("{joined}{api_secret}").as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_sorts_params() {
        let signature = sign_params(
            &[("timestamp", "1700000000".to_string()), ("folder", "storefront".to_string())],
            "abcd",
        );
        assert_eq!(signature, "df9b2f813fa8533d068d6d2c746e814d339f366a56fbf07e525e6b6c51d6e82d");
    }

    #[test]
    fn test_upload_response_shape() {
        let uploaded: UploadResponse = serde_json::from_str(
            r#"{"secure_url":"https://res.cloudinary.com/demo/image/upload/v1/storefront/a.jpg","public_id":"storefront/a","width":800,"height":600,"format":"jpg"}"#,
        )
        .unwrap();
        assert_eq!(uploaded.public_id, "storefront/a");
        assert_eq!(uploaded.width, Some(800));
    }
}
