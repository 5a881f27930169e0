use std::time::Duration;

use crate::decoder::{DecodeError, FragmentStream, open_stream};

/// Where the aggregator gets a session's text fragments from.
#[async_trait::async_trait]
pub trait FragmentSource: Send + Sync {
    /// Starts a session for `query`. Dropping the stream abandons it.
    async fn open(&self, query: &str) -> Result<FragmentStream, DecodeError>;
}

/// Fragments decoded from a skycast server's `/stream` endpoint.
pub struct HttpFragmentSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFragmentSource {
    pub fn new(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait::async_trait]
impl FragmentSource for HttpFragmentSource {
    async fn open(&self, query: &str) -> Result<FragmentStream, DecodeError> {
        let decoder = open_stream(&self.client, &self.base_url, query).await?;
        Ok(Box::pin(decoder))
    }
}
