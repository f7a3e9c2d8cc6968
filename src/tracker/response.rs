use crate::bencode::Value;
use crate::error::{FetchError, Result};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// What the tracker told us
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceResponse {
    /// Seconds the tracker asks us to wait before announcing again
    pub interval: u64,
    pub peers: Vec<SocketAddr>,
}

impl AnnounceResponse {
    pub fn from_bencode(value: &Value) -> Result<Self> {
        if value.as_dict().is_none() {
            return Err(tracker_err("response is not a dictionary"));
        }

        if let Some(failure) = value.get("failure reason") {
            let reason = failure.as_str().unwrap_or("unknown failure");
            return Err(tracker_err(reason));
        }

        let interval = value.get_u64("interval").unwrap_or(0);

        let peers = match value.get("peers") {
            Some(Value::Bytes(compact)) => parse_compact(compact)?,
            Some(Value::List(list)) => parse_dicts(list)?,
            Some(_) => return Err(tracker_err("invalid 'peers' format")),
            None => return Err(tracker_err("missing 'peers'")),
        };

        Ok(Self { interval, peers })
    }
}

fn tracker_err(msg: impl Into<String>) -> FetchError {
    FetchError::Tracker(msg.into())
}

/// 4 bytes of IPv4 address then 2 bytes of port, per peer
fn parse_compact(data: &[u8]) -> Result<Vec<SocketAddr>> {
    if data.len() % 6 != 0 {
        return Err(tracker_err(format!(
            "compact peer list is {} bytes, not a multiple of 6",
            data.len()
        )));
    }

    Ok(data
        .chunks_exact(6)
        .map(|c| {
            let ip = Ipv4Addr::new(c[0], c[1], c[2], c[3]);
            SocketAddr::new(IpAddr::V4(ip), u16::from_be_bytes([c[4], c[5]]))
        })
        .collect())
}

fn parse_dicts(list: &[Value]) -> Result<Vec<SocketAddr>> {
    list.iter()
        .map(|peer| {
            let ip: IpAddr = peer
                .get_str("ip")
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| tracker_err("peer without a valid 'ip'"))?;
            let port = peer
                .get_u64("port")
                .and_then(|p| u16::try_from(p).ok())
                .ok_or_else(|| tracker_err("peer without a valid 'port'"))?;
            Ok(SocketAddr::new(ip, port))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bencode::decode;

    #[test]
    fn test_compact_peers() {
        let mut body = b"d8:intervali900e5:peers12:".to_vec();
        body.extend_from_slice(&[127, 0, 0, 1, 0x1a, 0xe1, 10, 0, 0, 2, 0x00, 0x50]);
        body.push(b'e');

        let response = AnnounceResponse::from_bencode(&decode(&body).unwrap()).unwrap();
        assert_eq!(response.interval, 900);
        assert_eq!(
            response.peers,
            vec![
                "127.0.0.1:6881".parse::<SocketAddr>().unwrap(),
                "10.0.0.2:80".parse().unwrap(),
            ]
        );
    }

    #[test]
    fn test_dictionary_peers() {
        let body = b"d8:intervali60e5:peersld2:ip9:127.0.0.14:porti7000eed2:ip3:::14:porti7001eeee";
        let response = AnnounceResponse::from_bencode(&decode(body).unwrap()).unwrap();
        assert_eq!(
            response.peers,
            vec![
                "127.0.0.1:7000".parse::<SocketAddr>().unwrap(),
                "[::1]:7001".parse().unwrap(),
            ]
        );
    }

    #[test]
    fn test_failure_reason() {
        let body = b"d14:failure reason12:unregisterede";
        match AnnounceResponse::from_bencode(&decode(body).unwrap()) {
            Err(FetchError::Tracker(reason)) => assert_eq!(reason, "unregistered"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_ragged_compact_list() {
        let body = b"d5:peers5:abcdee";
        assert!(matches!(
            AnnounceResponse::from_bencode(&decode(body).unwrap()),
            Err(FetchError::Tracker(_))
        ));
    }
}
