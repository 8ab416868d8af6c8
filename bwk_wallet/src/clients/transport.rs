use std::time::Duration;

use async_trait::async_trait;
use reqwest::Response;

use crate::error::Error;

/// The HTTP calls needed by the [`crate::RemoteClient`]
#[async_trait]
pub trait Transport: Send + Sync {
    /// GET `url`, returning the body of a successful response
    async fn get(&self, url: &str) -> Result<String, Error>;

    /// POST `body` as json to `url`, returning the body of a successful response
    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<String, Error>;
}

/// [`Transport`] based on a `reqwest` client
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<String, Error> {
        let response = self.client.get(url).send().await.map_err(map_err)?;
        body(url, response).await
    }

    async fn post_json(&self, url: &str, body_json: &serde_json::Value) -> Result<String, Error> {
        let response = self
            .client
            .post(url)
            .json(body_json)
            .send()
            .await
            .map_err(map_err)?;
        body(url, response).await
    }
}

async fn body(url: &str, response: Response) -> Result<String, Error> {
    let status = response.status().as_u16();
    let level = if status == 200 {
        log::Level::Trace
    } else {
        log::Level::Info
    };
    log::log!(
        level,
        "{} status_code:{} - body bytes:{:?}",
        url,
        status,
        response.content_length(),
    );

    let text = response.text().await.map_err(map_err)?;
    match status {
        200..=299 => Ok(text),
        404 => Err(Error::NotFound(url.to_string())),
        _ => Err(Error::Http { status, body: text }),
    }
}

fn map_err(e: reqwest::Error) -> Error {
    if e.is_connect() || e.is_timeout() {
        Error::Connectivity(e.to_string())
    } else {
        Error::Reqwest(e)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{ReqwestTransport, Transport};
    use crate::error::Error;

    #[tokio::test]
    async fn test_status_mapping() {
        let mut server = mockito::Server::new_async().await;
        let ok = server
            .mock("GET", "/ok")
            .with_status(200)
            .with_body("hello")
            .create_async()
            .await;
        let missing = server
            .mock("GET", "/missing")
            .with_status(404)
            .create_async()
            .await;
        let broken = server
            .mock("GET", "/broken")
            .with_status(503)
            .with_body("busy")
            .create_async()
            .await;

        let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();
        let url = server.url();
        assert_eq!(transport.get(&format!("{url}/ok")).await.unwrap(), "hello");
        assert!(matches!(
            transport.get(&format!("{url}/missing")).await,
            Err(Error::NotFound(_))
        ));
        match transport.get(&format!("{url}/broken")).await {
            Err(Error::Http { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "busy");
            }
            r => panic!("unexpected {r:?}"),
        }
        ok.assert_async().await;
        missing.assert_async().await;
        broken.assert_async().await;
    }

    #[tokio::test]
    async fn test_connection_refused_is_connectivity() {
        // nothing listens on port 9 of localhost
        let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();
        let err = transport.get("http://127.0.0.1:9/x").await.unwrap_err();
        assert!(err.is_connectivity(), "{err:?}");
    }
}
