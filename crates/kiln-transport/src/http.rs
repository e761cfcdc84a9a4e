//! HTTP client for the Kiln object protocol.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};

use kiln_protocol::{
    endpoints, DownloadResponse, ErrorResponse, ExistsResponse, IdsRequest, ObjectEntry,
    ProtocolResult, UploadRequest, UploadResponse,
};
use kiln_types::ObjectId;

use crate::api::{ApiError, ApiResult, ObjectApi};
use crate::config::{Account, BatchConfig};

/// [`ObjectApi`] over HTTP using `reqwest`.
#[derive(Clone, Debug)]
pub struct HttpObjectApi {
    client: Client,
    base_url: String,
    account: Account,
}

impl HttpObjectApi {
    /// Build a client for `account`, applying the batching request timeout.
    pub fn new(account: Account, batching: &BatchConfig) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(batching.request_timeout)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;
        let base_url = account.server_url.trim_end_matches('/').to_string();
        Ok(Self {
            client,
            base_url,
            account,
        })
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    fn request(&self, method: Method, path: ProtocolResult<String>) -> ApiResult<RequestBuilder> {
        let path = path.map_err(|e| ApiError::Protocol(e.to_string()))?;
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(header) = self.account.auth.header_value() {
            builder = builder.header(AUTHORIZATION, header);
        }
        Ok(builder)
    }

    async fn send(builder: RequestBuilder) -> ApiResult<Response> {
        builder
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))
    }

    /// Map non-success statuses onto [`ApiError`].
    async fn check(response: Response) -> ApiResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = match response.json::<ErrorResponse>().await {
            Ok(body) => body.error,
            Err(_) => status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string(),
        };
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ApiError::Unauthorized(message)),
            _ => Err(ApiError::Status {
                status: status.as_u16(),
                message,
            }),
        }
    }

    async fn json<T: serde::de::DeserializeOwned>(response: Response) -> ApiResult<T> {
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Protocol(e.to_string()))
    }
}

#[async_trait]
impl ObjectApi for HttpObjectApi {
    async fn upload(&self, stream: &str, batch: &UploadRequest) -> ApiResult<usize> {
        let builder = self
            .request(Method::POST, endpoints::upload_path(stream))?
            .json(batch);
        let response = Self::check(Self::send(builder).await?).await?;
        let body: UploadResponse = Self::json(response).await?;
        Ok(body.stored)
    }

    async fn download(&self, stream: &str, id: &ObjectId) -> ApiResult<Option<String>> {
        let builder = self.request(Method::GET, endpoints::object_path(stream, id))?;
        let response = Self::send(builder).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check(response).await?;
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Protocol(e.to_string()))?;
        Ok(Some(text))
    }

    async fn download_many(&self, stream: &str, ids: &[ObjectId]) -> ApiResult<Vec<ObjectEntry>> {
        let builder = self
            .request(Method::POST, endpoints::download_path(stream))?
            .json(&IdsRequest { ids: ids.to_vec() });
        let response = Self::check(Self::send(builder).await?).await?;
        let body: DownloadResponse = Self::json(response).await?;
        Ok(body.objects)
    }

    async fn exists(&self, stream: &str, ids: &[ObjectId]) -> ApiResult<Vec<ObjectId>> {
        let builder = self
            .request(Method::POST, endpoints::exists_path(stream))?
            .json(&IdsRequest { ids: ids.to_vec() });
        let response = Self::check(Self::send(builder).await?).await?;
        let body: ExistsResponse = Self::json(response).await?;
        Ok(body.present)
    }
}
