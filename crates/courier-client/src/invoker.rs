//! Query and mutation calls over HTTP.

use std::sync::Arc;

use courier_core::Reply;
use serde::{Serialize, de::DeserializeOwned};

use crate::{ClientConfig, ClientError};

/// Issues query and mutation requests.
#[derive(Debug, Clone)]
pub struct Invoker {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
}

impl Invoker {
    #[must_use]
    pub fn new(http: reqwest::Client, config: Arc<ClientConfig>) -> Self {
        Self { http, config }
    }

    /// `GET <base>/<route>` with `args` encoded as the query string.
    ///
    /// The response body is decoded whatever the status, so handler errors
    /// and the not-found body both arrive as [`Reply::Err`].
    ///
    /// # Errors
    /// Returns error if the request fails or the body is not a reply.
    pub async fn query<A, T>(&self, route: &str, args: &A) -> Result<Reply<T>, ClientError>
    where
        A: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .http
            .get(self.config.route_url(route))
            .query(args)
            .send()
            .await?;
        decode(route, response).await
    }

    /// `POST <base>/<route>` with `args` as a JSON body.
    ///
    /// # Errors
    /// Returns error if the request fails or the body is not a reply.
    pub async fn mutate<A, T>(&self, route: &str, args: &A) -> Result<Reply<T>, ClientError>
    where
        A: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .http
            .post(self.config.route_url(route))
            .json(args)
            .send()
            .await?;
        decode(route, response).await
    }
}

async fn decode<T: DeserializeOwned>(
    route: &str,
    response: reqwest::Response,
) -> Result<Reply<T>, ClientError> {
    let status = response.status();
    let body = response.bytes().await?;
    tracing::debug!(route, %status, bytes = body.len(), "Reply received");
    Ok(serde_json::from_slice(&body)?)
}
