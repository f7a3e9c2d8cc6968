use super::message::read_full;
use crate::error::{FetchError, Result};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

pub const PROTOCOL_STRING: &[u8] = b"BitTorrent protocol";

/// 1 + 19 + 8 + 20 + 20
pub const HANDSHAKE_LEN: usize = 68;

/// Handshake greeting for the peer wire protocol
/// Format: <pstrlen><pstr><reserved><fingerprint><peer_id>
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub fingerprint: [u8; 20],
    pub peer_id: [u8; 20],
}

impl Handshake {
    pub fn new(fingerprint: [u8; 20], peer_id: [u8; 20]) -> Self {
        Self {
            fingerprint,
            peer_id,
        }
    }

    pub fn to_bytes(&self) -> [u8; HANDSHAKE_LEN] {
        let mut buf = [0u8; HANDSHAKE_LEN];
        buf[0] = PROTOCOL_STRING.len() as u8;
        buf[1..20].copy_from_slice(PROTOCOL_STRING);
        // 20..28 reserved, left zero
        buf[28..48].copy_from_slice(&self.fingerprint);
        buf[48..68].copy_from_slice(&self.peer_id);
        buf
    }

    pub fn from_bytes(data: &[u8; HANDSHAKE_LEN]) -> Result<Self> {
        let pstrlen = data[0] as usize;
        if pstrlen != PROTOCOL_STRING.len() {
            return Err(FetchError::HandshakeFailure(format!(
                "protocol string length {}",
                pstrlen
            )));
        }
        if &data[1..20] != PROTOCOL_STRING {
            return Err(FetchError::HandshakeFailure(
                "unknown protocol string".to_string(),
            ));
        }

        let mut fingerprint = [0u8; 20];
        fingerprint.copy_from_slice(&data[28..48]);
        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&data[48..68]);

        Ok(Self {
            fingerprint,
            peer_id,
        })
    }
}

/// Exchange greetings and check both sides are after the same content.
///
/// Returns the remote peer id. Nothing else may be sent on `stream` until this
/// has returned successfully.
pub async fn handshake<S>(
    stream: &mut S,
    fingerprint: [u8; 20],
    client_id: [u8; 20],
) -> Result<[u8; 20]>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream
        .write_all(&Handshake::new(fingerprint, client_id).to_bytes())
        .await?;

    let mut reply = [0u8; HANDSHAKE_LEN];
    read_full(stream, &mut reply).await?;
    let theirs = Handshake::from_bytes(&reply)?;

    if theirs.fingerprint != fingerprint {
        return Err(FetchError::FingerprintMismatch);
    }

    debug!("Handshake accepted, remote id {}", hex::encode(theirs.peer_id));
    Ok(theirs.peer_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_handshake_serialization() {
        let handshake = Handshake::new([1u8; 20], [2u8; 20]);
        let bytes = handshake.to_bytes();

        assert_eq!(bytes[0], 19);
        assert_eq!(&bytes[1..20], PROTOCOL_STRING);
        assert_eq!(&bytes[20..28], &[0u8; 8]);

        let decoded = Handshake::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, handshake);
    }

    #[test]
    fn test_rejects_foreign_protocol() {
        let mut bytes = Handshake::new([1u8; 20], [2u8; 20]).to_bytes();
        bytes[5] = b'X';
        assert!(matches!(
            Handshake::from_bytes(&bytes),
            Err(FetchError::HandshakeFailure(_))
        ));
    }

    #[tokio::test]
    async fn test_handshake_exchange() {
        let (mut ours, mut theirs) = tokio::io::duplex(256);
        let fingerprint = [7u8; 20];

        let remote = tokio::spawn(async move {
            let mut greeting = [0u8; HANDSHAKE_LEN];
            theirs.read_exact(&mut greeting).await.unwrap();
            let greeting = Handshake::from_bytes(&greeting).unwrap();
            assert_eq!(greeting.peer_id, [1u8; 20]);
            theirs
                .write_all(&Handshake::new(greeting.fingerprint, [9u8; 20]).to_bytes())
                .await
                .unwrap();
        });

        let peer_id = handshake(&mut ours, fingerprint, [1u8; 20]).await.unwrap();
        assert_eq!(peer_id, [9u8; 20]);
        remote.await.unwrap();
    }

    #[tokio::test]
    async fn test_fingerprint_mismatch() {
        let reply = Handshake::new([8u8; 20], [9u8; 20]).to_bytes();
        let mut stream = tokio_test::io::Builder::new()
            .write(&Handshake::new([7u8; 20], [1u8; 20]).to_bytes())
            .read(&reply)
            .build();

        let result = handshake(&mut stream, [7u8; 20], [1u8; 20]).await;
        assert!(matches!(result, Err(FetchError::FingerprintMismatch)));
    }

    #[tokio::test]
    async fn test_peer_hangs_up_mid_greeting() {
        let reply = Handshake::new([7u8; 20], [9u8; 20]).to_bytes();
        let mut stream = tokio_test::io::Builder::new()
            .write(&Handshake::new([7u8; 20], [1u8; 20]).to_bytes())
            .read(&reply[..30])
            .build();

        let result = handshake(&mut stream, [7u8; 20], [1u8; 20]).await;
        assert!(matches!(
            result,
            Err(FetchError::ShortRead {
                expected: HANDSHAKE_LEN,
                got: 30
            })
        ));
    }
}
