use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize};
use url::Url;

use super::{
    Application, ApplicationId, GotifySettings, MessageManager, MessageSender, OutboundMessage,
    SinkError, SinkMessage, Version,
};
use crate::metrics::Metrics;

/// header gotify reads application and client tokens from
const TOKEN_HEADER: &str = "X-Gotify-Key";

/// page size when listing messages, the maximum gotify accepts
const PAGE_LIMIT: u32 = 200;

/// error body gotify returns for failed requests
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiError {
    error: String,
    #[serde(default)]
    error_description: String,
}

/// response of `GET /application/{id}/message`
#[derive(Debug, Deserialize)]
struct PagedMessages {
    messages: Vec<SinkMessage>,
    paging: Paging,
}

#[derive(Debug, Deserialize)]
struct Paging {
    /// only present if there are more messages to fetch
    #[serde(default)]
    next: Option<String>,
    /// pass as `since` to fetch the next page
    since: u64,
}

#[derive(Debug)]
struct Inner {
    http: reqwest::Client,
    base: Url,
}

/// Unauthenticated gotify client. Hands out [AppHandle] and [ClientHandle]
/// which carry the credential for their scope.
#[derive(Debug, Clone)]
pub struct GotifyClient {
    inner: Arc<Inner>,
}

impl GotifyClient {
    pub fn new(settings: &GotifySettings) -> Result<Self, SinkError> {
        let http = reqwest::Client::builder().timeout(settings.timeout).build()?;

        // Url::join drops the last path segment unless it ends with a slash
        let mut base = settings.url.clone();
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }

        Ok(Self { inner: Arc::new(Inner { http, base }) })
    }

    /// send-scoped handle
    pub fn app(&self, token: impl Into<String>) -> AppHandle {
        AppHandle { client: self.clone(), token: token.into() }
    }

    /// management-scoped handle
    pub fn management(&self, token: impl Into<String>) -> ClientHandle {
        ClientHandle { client: self.clone(), token: token.into() }
    }

    pub async fn version(&self) -> Result<Version, SinkError> {
        let request = self.request(Method::GET, "version", None)?;
        self.execute("version", request).await?.json().await.map_err(Into::into)
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
    ) -> Result<RequestBuilder, SinkError> {
        let url = self.inner.base.join(path)?;
        let mut request = self.inner.http.request(method, url);
        if let Some(token) = token {
            request = request.header(TOKEN_HEADER, token);
        }

        Ok(request)
    }

    /// sends the request and turns non success responses into [SinkError::Api]
    async fn execute(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<Response, SinkError> {
        let metrics = Metrics::global();
        let _timer = metrics.start_request(operation);

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                metrics.record_request_failed(operation, "");
                return Err(err.into());
            }
        };

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        metrics.record_request_failed(operation, status.as_str());

        let text = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ApiError>(&text) {
            Ok(ApiError { error, error_description }) if !error_description.is_empty() => {
                format!("{error}: {error_description}")
            }
            Ok(ApiError { error, .. }) => error,
            Err(_) => text,
        };

        Err(SinkError::Api { status, message })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, SinkError> {
        Ok(self.execute(operation, request).await?.json().await?)
    }
}

/// Handle authenticated with an application token
#[derive(Debug, Clone)]
pub struct AppHandle {
    client: GotifyClient,
    token: String,
}

#[async_trait]
impl MessageSender for AppHandle {
    async fn create_message(&self, message: &OutboundMessage) -> Result<(), SinkError> {
        let request = self.client.request(Method::POST, "message", Some(&self.token))?.json(message);
        self.client.execute("create_message", request).await?;

        Ok(())
    }
}

/// Handle authenticated with a client token
#[derive(Debug, Clone)]
pub struct ClientHandle {
    client: GotifyClient,
    token: String,
}

impl ClientHandle {
    pub async fn list_applications(&self) -> Result<Vec<Application>, SinkError> {
        let request = self.client.request(Method::GET, "application", Some(&self.token))?;
        self.client.get_json("list_applications", request).await
    }

    /// Finds the application the given application token belongs to
    pub async fn find_application(&self, token: &str) -> Result<Option<Application>, SinkError> {
        Ok(self.list_applications().await?.into_iter().find(|app| app.token == token))
    }
}

#[async_trait]
impl MessageManager for ClientHandle {
    async fn list_messages(&self, app_id: ApplicationId) -> Result<Vec<SinkMessage>, SinkError> {
        let path = format!("application/{app_id}/message");
        let mut messages = Vec::new();
        let mut since = None;

        loop {
            let mut request = self
                .client
                .request(Method::GET, &path, Some(&self.token))?
                .query(&[("limit", PAGE_LIMIT)]);
            if let Some(since) = since {
                request = request.query(&[("since", since)]);
            }

            let page: PagedMessages = self.client.get_json("list_messages", request).await?;
            messages.extend(page.messages);

            match page.paging.next {
                Some(_) if page.paging.since > 0 => since = Some(page.paging.since),
                _ => break,
            }
        }

        Ok(messages)
    }

    async fn delete_message(&self, id: u64) -> Result<(), SinkError> {
        let request =
            self.client.request(Method::DELETE, &format!("message/{id}"), Some(&self.token))?;
        self.client.execute("delete_message", request).await?;

        Ok(())
    }
}
