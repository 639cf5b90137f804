//! Cloud Functions v1 REST implementation of [`FunctionsApi`].

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};

use super::{ApiFuture, FunctionsApi, FunctionsApiError, GcpContext};
use crate::resource::{IamPolicy, RemoteResource};

/// Public endpoint of the Cloud Functions v1 API.
pub const DEFAULT_API_URL: &str = "https://cloudfunctions.googleapis.com/v1";

/// Default timeout applied to every API request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Thin typed client over the Cloud Functions REST API.
#[derive(Clone, Debug)]
pub struct CloudFunctionsClient {
    http: Client,
    base_url: String,
    context: GcpContext,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListFunctionsPage {
    #[serde(default)]
    functions: Vec<RemoteResource>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct SetIamPolicyRequest<'a> {
    policy: &'a IamPolicy,
}

impl CloudFunctionsClient {
    /// Creates a client for `base_url` (normally [`DEFAULT_API_URL`]).
    ///
    /// # Errors
    ///
    /// Returns [`FunctionsApiError::Client`] when the HTTP client cannot be
    /// built.
    pub fn new(
        context: GcpContext,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, FunctionsApiError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| FunctionsApiError::Client {
                message: err.to_string(),
            })?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            context,
        })
    }

    /// Credential context this client authenticates with.
    #[must_use]
    pub const fn context(&self) -> &GcpContext {
        &self.context
    }

    /// Base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorised(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(self.context.access_token())
    }

    async fn send(
        request: RequestBuilder,
        operation: &str,
    ) -> Result<Response, FunctionsApiError> {
        let response = request
            .send()
            .await
            .map_err(|err| FunctionsApiError::Transport {
                operation: operation.to_owned(),
                message: err.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(FunctionsApiError::Status {
            operation: operation.to_owned(),
            status: status.as_u16(),
            body,
        })
    }

    async fn list_page(
        &self,
        parent: &str,
        page_token: Option<&str>,
    ) -> Result<ListFunctionsPage, FunctionsApiError> {
        let mut request = self
            .authorised(self.http.get(self.url(&format!("{parent}/functions"))));
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = Self::send(request, "list").await?;
        let body = response
            .text()
            .await
            .map_err(|err| FunctionsApiError::Transport {
                operation: String::from("list"),
                message: err.to_string(),
            })?;
        serde_json::from_str(&body).map_err(|err| FunctionsApiError::Parse {
            operation: String::from("list"),
            message: err.to_string(),
        })
    }
}

impl FunctionsApi for CloudFunctionsClient {
    type Error = FunctionsApiError;

    fn list_functions<'a>(
        &'a self,
        parent: &'a str,
    ) -> ApiFuture<'a, Vec<RemoteResource>, Self::Error> {
        Box::pin(async move {
            let mut functions = Vec::new();
            let mut page_token: Option<String> = None;
            loop {
                let page = self.list_page(parent, page_token.as_deref()).await?;
                functions.extend(page.functions);
                match page.next_page_token {
                    Some(token) if !token.is_empty() => page_token = Some(token),
                    _ => break,
                }
            }
            Ok(functions)
        })
    }

    fn delete_function<'a>(&'a self, name: &'a str) -> ApiFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let request = self.authorised(self.http.delete(self.url(name)));
            Self::send(request, "delete").await?;
            Ok(())
        })
    }

    fn set_iam_policy<'a>(
        &'a self,
        resource: &'a str,
        policy: &'a IamPolicy,
    ) -> ApiFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let request = self
                .authorised(self.http.post(self.url(&format!("{resource}:setIamPolicy"))))
                .json(&SetIamPolicyRequest { policy });
            Self::send(request, "setIamPolicy").await?;
            Ok(())
        })
    }
}
