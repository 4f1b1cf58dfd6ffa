use super::StorageError;
use crate::settings::IpfsSettings;
use serde::Deserialize;
use url::Url;

/// Thin shim over the IPFS HTTP API. Every endpoint is a POST per the
/// kubo convention.
pub struct IpfsClient {
    base: Url,
    client: reqwest::Client,
}

impl IpfsClient {
    pub fn new(settings: &IpfsSettings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;
        Ok(Self {
            base: settings.url.clone(),
            client,
        })
    }

    pub async fn block_get(&self, cid: &str) -> Result<Vec<u8>, StorageError> {
        let response = self
            .request("api/v0/block/get", cid)
            .await?
            .bytes()
            .await
            .map_err(request_error)?;
        Ok(response.to_vec())
    }

    pub async fn pin_add(&self, cid: &str) -> Result<(), StorageError> {
        self.request("api/v0/pin/add", cid).await.map(|_| ())
    }

    pub async fn pin_rm(&self, cid: &str) -> Result<(), StorageError> {
        match self.request("api/v0/pin/rm", cid).await {
            Ok(_) => Ok(()),
            // unpinning something that was never pinned is a no-op
            Err(StorageError::Ipfs(reason)) if reason.contains("not pinned") => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Adds raw bytes as a single block and returns the CIDv0.
    pub async fn add(&self, bytes: Vec<u8>) -> Result<String, StorageError> {
        #[derive(Deserialize)]
        struct AddResponse {
            #[serde(rename = "Hash")]
            hash: String,
        }

        let url = self.endpoint("api/v0/add")?;
        let form = reqwest::multipart::Form::new()
            .part("file", reqwest::multipart::Part::bytes(bytes));
        let response = self
            .client
            .post(url)
            .query(&[("pin", "false"), ("raw-leaves", "false")])
            .multipart(form)
            .send()
            .await
            .map_err(request_error)?;

        let response = check_status(response).await?;
        let parsed: AddResponse = response.json().await.map_err(request_error)?;
        Ok(parsed.hash)
    }

    pub async fn repo_gc(&self) -> Result<(), StorageError> {
        let url = self.endpoint("api/v0/repo/gc")?;
        let response = self.client.post(url).send().await.map_err(request_error)?;
        check_status(response).await.map(|_| ())
    }

    async fn request(&self, path: &str, arg: &str) -> Result<reqwest::Response, StorageError> {
        let url = self.endpoint(path)?;
        let response = self
            .client
            .post(url)
            .query(&[("arg", arg)])
            .send()
            .await
            .map_err(request_error)?;
        check_status(response).await
    }

    fn endpoint(&self, path: &str) -> Result<Url, StorageError> {
        self.base
            .join(path)
            .map_err(|e| StorageError::Ipfs(format!("invalid endpoint {path}: {e}")))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StorageError::Ipfs(format!("status {status}: {body}")))
}

fn request_error(err: reqwest::Error) -> StorageError {
    if err.is_timeout() {
        StorageError::Timeout
    } else {
        StorageError::Ipfs(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::{
        matchers::{method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    async fn client(server: &MockServer) -> IpfsClient {
        IpfsClient::new(&IpfsSettings {
            url: Url::parse(&server.uri()).unwrap(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    const CID: &str = "QmbFMke1KXqnYyBBWxB74N4c5SBnJMVAiMNRcGu6x1AwQH";

    #[tokio::test]
    async fn block_get_returns_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v0/block/get"))
            .and(query_param("arg", CID))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"block data".to_vec()))
            .mount(&server)
            .await;

        let bytes = client(&server).await.block_get(CID).await.unwrap();
        assert_eq!(bytes, b"block data");
    }

    #[tokio::test]
    async fn pin_rm_tolerates_not_pinned() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v0/pin/rm"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_string(r#"{"Message":"not pinned or pinned indirectly"}"#),
            )
            .mount(&server)
            .await;

        client(&server).await.pin_rm(CID).await.unwrap();
    }

    #[tokio::test]
    async fn api_errors_surface_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v0/pin/add"))
            .respond_with(ResponseTemplate::new(500).set_body_string("merkledag: not found"))
            .mount(&server)
            .await;

        let err = client(&server).await.pin_add(CID).await.unwrap_err();
        match err {
            StorageError::Ipfs(reason) => assert!(reason.contains("merkledag")),
            other => panic!("expected ipfs error, got {other:?}"),
        }
    }
}
