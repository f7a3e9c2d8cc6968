use crate::error::Result;
use url::Url;

/// Parameters of a single `started` announce
#[derive(Debug, Clone)]
pub struct AnnounceRequest {
    pub fingerprint: [u8; 20],
    pub peer_id: [u8; 20],
    /// Port reported to the tracker
    pub port: u16,
    /// Bytes still to download
    pub left: u64,
}

impl AnnounceRequest {
    pub fn new(fingerprint: [u8; 20], peer_id: [u8; 20], port: u16, left: u64) -> Self {
        Self {
            fingerprint,
            peer_id,
            port,
            left,
        }
    }

    /// Announce URL with our parameters appended to any query already present.
    ///
    /// The binary fields are percent-encoded here; `url` leaves existing
    /// escapes in a query alone, so they reach the tracker unchanged.
    pub fn url(&self, announce: &str) -> Result<Url> {
        let mut url = Url::parse(announce)?;

        let ours = format!(
            "info_hash={}&peer_id={}&port={}&uploaded=0&downloaded=0&left={}{}",
            percent_encode(&self.fingerprint),
            percent_encode(&self.peer_id),
            self.port,
            self.left,
            "&compact=1&event=started",
        );
        let query = match url.query() {
            Some(existing) if !existing.is_empty() => format!("{}&{}", existing, ours),
            _ => ours,
        };
        url.set_query(Some(&query));

        Ok(url)
    }
}

/// Escape everything outside the RFC 3986 unreserved set
fn percent_encode(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                (b as char).to_string()
            }
            _ => format!("%{:02X}", b),
        })
        .collect()
}
