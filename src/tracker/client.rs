use super::{AnnounceRequest, AnnounceResponse};
use crate::bencode::decode;
use crate::error::{FetchError, Result};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

/// HTTP tracker client
pub struct TrackerClient {
    client: Client,
}

impl TrackerClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Announce once and return the peers the tracker handed out.
    pub async fn announce(
        &self,
        announce: &str,
        request: &AnnounceRequest,
    ) -> Result<AnnounceResponse> {
        let url = request.url(announce)?;
        info!("Announcing to tracker: {}", announce);
        debug!("Tracker request URL: {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        debug!("Tracker response status: {}, body length: {}", status, body.len());

        if !status.is_success() {
            return Err(FetchError::Tracker(format!("HTTP status {}", status)));
        }

        let announced = AnnounceResponse::from_bencode(&decode(&body)?)?;
        info!(
            "Received {} peers from tracker (interval: {}s)",
            announced.peers.len(),
            announced.interval
        );

        Ok(announced)
    }
}
