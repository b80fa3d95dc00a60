use crate::config::MediaConfig;
use crate::error::{ClientError, ClientResult};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

enum Credentials<'a> {
    Jwt(&'a str),
    ApiKey { key: &'a str, secret: &'a str },
}

/// Pins media on Pinata and maps stored references to gateway URLs.
#[derive(Clone)]
pub struct MediaStore {
    client: reqwest::Client,
    config: MediaConfig,
}

impl MediaStore {
    pub fn new(config: MediaConfig) -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|err| ClientError::remote(format!("failed to build http client: {err}")))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &MediaConfig {
        &self.config
    }

    /// Uploads `bytes` and returns an `ipfs://<cid>` reference.
    pub async fn upload(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        mime: Option<&str>,
    ) -> ClientResult<String> {
        self.check_size(bytes.len())?;
        let mime = mime
            .map(str::to_string)
            .or_else(|| infer::get(&bytes).map(|kind| kind.mime_type().to_string()))
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let mut attempts = Vec::new();
        if let Some(jwt) = self.config.jwt.as_deref() {
            attempts.push(Credentials::Jwt(jwt));
        }
        if let (Some(key), Some(secret)) = (
            self.config.api_key.as_deref(),
            self.config.secret_key.as_deref(),
        ) {
            attempts.push(Credentials::ApiKey { key, secret });
        }
        if attempts.is_empty() {
            return Err(ClientError::Validation(
                "Pinata credentials are not configured".into(),
            ));
        }

        let mut last_status = StatusCode::UNAUTHORIZED;
        for credentials in attempts {
            let form = build_form(file_name, &bytes, &mime)?;
            let request = self.client.post(&self.config.pin_endpoint).multipart(form);
            let request = match credentials {
                Credentials::Jwt(jwt) => request.bearer_auth(jwt),
                Credentials::ApiKey { key, secret } => request
                    .header("pinata_api_key", key)
                    .header("pinata_secret_api_key", secret),
            };
            let response = request
                .send()
                .await
                .map_err(|err| ClientError::remote(format!("upload request failed: {err}")))?;

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED {
                tracing::debug!("pinata rejected credentials, trying next");
                last_status = status;
                continue;
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                tracing::warn!(status = %status, body = %body, "pinata upload failed");
                return Err(ClientError::remote(status_message(status)));
            }
            let pinned: PinResponse = response
                .json()
                .await
                .map_err(|err| ClientError::remote(format!("unexpected pinata response: {err}")))?;
            tracing::info!(cid = %pinned.ipfs_hash, size = bytes.len(), "media pinned");
            return Ok(format!("ipfs://{}", pinned.ipfs_hash));
        }
        Err(ClientError::remote(status_message(last_status)))
    }

    /// Maps a stored media reference to something a browser can fetch.
    pub fn gateway_url(&self, reference: &str) -> String {
        gateway_url(&self.config.gateway, reference)
    }

    fn check_size(&self, len: usize) -> ClientResult<()> {
        let limit = self.config.max_upload_bytes;
        if len as u64 > limit {
            return Err(ClientError::Validation(format!(
                "File too large (max {} MB)",
                limit / (1024 * 1024)
            )));
        }
        Ok(())
    }
}

fn build_form(file_name: &str, bytes: &[u8], mime: &str) -> ClientResult<Form> {
    let part = Part::bytes(bytes.to_vec())
        .file_name(file_name.to_string())
        .mime_str(mime)
        .map_err(|err| ClientError::Validation(format!("invalid mime type {mime}: {err}")))?;
    let metadata = json!({ "name": file_name }).to_string();
    let options = json!({ "cidVersion": 0 }).to_string();
    Ok(Form::new()
        .part("file", part)
        .text("pinataMetadata", metadata)
        .text("pinataOptions", options))
}

fn status_message(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "Pinata authentication failed. Please check your API credentials.".into(),
        403 => "Pinata access denied. Your API key may not have upload permissions.".into(),
        429 => "Too many uploads. Please wait a moment and try again.".into(),
        500..=599 => "Pinata service is temporarily unavailable. Please try again later.".into(),
        other => format!("Upload failed with status {other}"),
    }
}

/// `http(s)` passes through; bare CIDs and `ipfs://` get the gateway prefix.
pub fn gateway_url(gateway: &str, reference: &str) -> String {
    let reference = reference.trim();
    if reference.starts_with("http://") || reference.starts_with("https://") {
        return reference.to_string();
    }
    let base = gateway.trim_end_matches('/');
    if let Some(cid) = reference.strip_prefix("ipfs://") {
        return format!("{base}/{}", cid.trim_start_matches("ipfs/"));
    }
    if reference.starts_with("Qm") || reference.starts_with("baf") {
        return format!("{base}/{reference}");
    }
    reference.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode as ServerStatus};
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Copy)]
    enum PinMode {
        /// Rejects bearer tokens, accepts the key pair.
        KeyPairOnly,
        RejectAll,
        Throttled,
    }

    #[derive(Clone)]
    struct FakePinata {
        mode: PinMode,
        seen: Arc<Mutex<Vec<&'static str>>>,
    }

    async fn pin_file(
        State(pinata): State<FakePinata>,
        headers: HeaderMap,
        _body: axum::body::Bytes,
    ) -> (ServerStatus, Json<serde_json::Value>) {
        let scheme = if headers.contains_key("authorization") {
            "jwt"
        } else if headers.contains_key("pinata_api_key")
            && headers.contains_key("pinata_secret_api_key")
        {
            "key"
        } else {
            "none"
        };
        pinata.seen.lock().unwrap().push(scheme);
        match (pinata.mode, scheme) {
            (PinMode::KeyPairOnly, "key") => (
                ServerStatus::OK,
                Json(json!({ "IpfsHash": "QmPinnedByKey", "PinSize": 3 })),
            ),
            (PinMode::Throttled, _) => (
                ServerStatus::TOO_MANY_REQUESTS,
                Json(json!({ "error": "slow down" })),
            ),
            _ => (
                ServerStatus::UNAUTHORIZED,
                Json(json!({ "error": "invalid credentials" })),
            ),
        }
    }

    async fn spawn_pinata(mode: PinMode) -> (String, Arc<Mutex<Vec<&'static str>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/pinning/pinFileToIPFS", post(pin_file))
            .with_state(FakePinata {
                mode,
                seen: seen.clone(),
            });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (format!("http://{addr}/pinning/pinFileToIPFS"), seen)
    }

    fn store_for(endpoint: String, jwt: bool, key_pair: bool) -> MediaStore {
        MediaStore::new(MediaConfig {
            pin_endpoint: endpoint,
            jwt: jwt.then(|| "stale-jwt".to_string()),
            api_key: key_pair.then(|| "key".to_string()),
            secret_key: key_pair.then(|| "secret".to_string()),
            ..MediaConfig::default()
        })
        .unwrap()
    }

    const PNG_HEADER: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

    #[tokio::test]
    async fn unauthorized_jwt_falls_back_to_key_pair() {
        let (endpoint, seen) = spawn_pinata(PinMode::KeyPairOnly).await;
        let store = store_for(endpoint, true, true);
        let reference = store
            .upload("avatar.png", PNG_HEADER.to_vec(), None)
            .await
            .unwrap();
        assert_eq!(reference, "ipfs://QmPinnedByKey");
        assert_eq!(*seen.lock().unwrap(), vec!["jwt", "key"]);
    }

    #[tokio::test]
    async fn rejected_credentials_report_auth_failure() {
        let (endpoint, seen) = spawn_pinata(PinMode::RejectAll).await;
        let store = store_for(endpoint, true, true);
        let err = store.upload("a.png", PNG_HEADER.to_vec(), None).await.unwrap_err();
        assert_eq!(
            err.user_message(),
            "Pinata authentication failed. Please check your API credentials."
        );
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn throttling_is_not_retried() {
        let (endpoint, seen) = spawn_pinata(PinMode::Throttled).await;
        let store = store_for(endpoint, true, true);
        let err = store.upload("a.png", PNG_HEADER.to_vec(), None).await.unwrap_err();
        assert!(err.user_message().starts_with("Too many uploads"));
        assert_eq!(*seen.lock().unwrap(), vec!["jwt"]);
    }

    const GATEWAY: &str = "https://gateway.pinata.cloud/ipfs/";

    #[test]
    fn gateway_mapping() {
        assert_eq!(
            gateway_url(GATEWAY, "ipfs://QmHash"),
            "https://gateway.pinata.cloud/ipfs/QmHash"
        );
        assert_eq!(
            gateway_url(GATEWAY, "bafybeigdyrzt"),
            "https://gateway.pinata.cloud/ipfs/bafybeigdyrzt"
        );
        assert_eq!(
            gateway_url(GATEWAY, "https://example.com/a.png"),
            "https://example.com/a.png"
        );
        assert_eq!(gateway_url(GATEWAY, "data:image/png"), "data:image/png");
    }

    #[tokio::test]
    async fn oversized_upload_rejected_before_network() {
        let store = MediaStore::new(MediaConfig {
            max_upload_bytes: 4,
            jwt: Some("token".into()),
            pin_endpoint: "http://127.0.0.1:9/unreachable".into(),
            ..MediaConfig::default()
        })
        .unwrap();
        let err = store.upload("a.png", vec![0; 5], None).await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
    }

    #[tokio::test]
    async fn missing_credentials_rejected() {
        let store = MediaStore::new(MediaConfig::default()).unwrap();
        let err = store.upload("a.png", vec![1, 2, 3], None).await.unwrap_err();
        assert!(err.to_string().contains("credentials"));
    }

    #[test]
    fn status_messages_are_user_facing() {
        assert!(status_message(StatusCode::UNAUTHORIZED).contains("authentication failed"));
        assert!(status_message(StatusCode::BAD_GATEWAY).contains("temporarily unavailable"));
        assert_eq!(status_message(StatusCode::BAD_REQUEST), "Upload failed with status 400");
    }
}
