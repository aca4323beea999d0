//! HTTP layer of the SSTP setup.
//!
//! Before any SSTP frame moves, the client issues an `SSTP_DUPLEX_POST`
//! against a well-known resource and expects a `200`. The correlation id
//! is a random GUID the server never validates, and the Content-Length
//! is pinned to the maximum so the stream never terminates on length.

use rand::Rng;
use sstp_common::error::SessionError;
use tracing::{debug, info};

use crate::tls::TlsTransport;

/// Fixed resource path every SSTP gateway serves.
const SSTP_RESOURCE: &str = "/sra_{BA195980-CD49-458b-9E23-C84EE0ADCD75}/";

/// Format a correlation GUID as `{XXXXXXXX-XXXX-XXXX-XXXXXXXXXXXX}`.
fn correlation_guid() -> String {
    let mut rng = rand::thread_rng();
    let a: u32 = rng.r#gen();
    let b: u16 = rng.r#gen();
    let c: u16 = rng.r#gen();
    let d: u64 = rng.r#gen::<u64>() & 0x0000_ffff_ffff_ffff;
    format!("{{{a:08X}-{b:04X}-{c:04X}-{d:012X}}}")
}

/// Send the duplex POST and validate the status line.
pub async fn negotiate(
    transport: &mut (dyn TlsTransport + '_),
    server: &str,
) -> Result<(), SessionError> {
    let guid = correlation_guid();
    debug!("correlation id {guid}");

    let request = format!(
        "SSTP_DUPLEX_POST {SSTP_RESOURCE} HTTP/1.1\r\n\
         Host: {server}\r\n\
         SSTPCORRELATIONID: {guid}\r\n\
         Content-Length: {}\r\n\
         Cookie: ClientHTTPCookie=True; ClientBypassHLAuth=True\r\n\
         \r\n",
        u64::MAX
    );
    transport.send(request.as_bytes()).await?;

    let mut buf = [0u8; 1024];
    let n = transport.recv(&mut buf).await?;
    if n == 0 {
        return Err(SessionError::HandshakeRejected(
            "connection closed before any response".into(),
        ));
    }

    let response = &buf[..n];
    if !response.starts_with(b"HTTP/1.1 200") {
        let line = response
            .split(|&b| b == b'\r')
            .next()
            .map(|l| String::from_utf8_lossy(l).into_owned())
            .unwrap_or_default();
        return Err(SessionError::HandshakeRejected(line));
    }

    info!("HTTP upgrade accepted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::io;

    struct ScriptedTransport {
        sent: Vec<Vec<u8>>,
        responses: VecDeque<Vec<u8>>,
    }

    impl ScriptedTransport {
        fn new(responses: &[&[u8]]) -> Self {
            Self {
                sent: Vec::new(),
                responses: responses.iter().map(|r| r.to_vec()).collect(),
            }
        }
    }

    #[async_trait]
    impl TlsTransport for ScriptedTransport {
        async fn send(&mut self, data: &[u8]) -> io::Result<usize> {
            self.sent.push(data.to_vec());
            Ok(data.len())
        }

        async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.responses.pop_front() {
                Some(response) => {
                    buf[..response.len()].copy_from_slice(&response);
                    Ok(response.len())
                }
                None => Ok(0),
            }
        }

        async fn shutdown(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn peer_cert_der(&self) -> Option<&[u8]> {
            None
        }

        fn max_record_size(&self) -> usize {
            1024
        }
    }

    #[tokio::test]
    async fn test_negotiate_accepts_200() {
        let mut transport =
            ScriptedTransport::new(&[b"HTTP/1.1 200 OK\r\nContent-Length: 18446744073709551615\r\n\r\n"]);

        negotiate(&mut transport, "vpn.example.org").await.unwrap();

        let request = String::from_utf8(transport.sent[0].clone()).unwrap();
        assert!(request.starts_with(
            "SSTP_DUPLEX_POST /sra_{BA195980-CD49-458b-9E23-C84EE0ADCD75}/ HTTP/1.1\r\n"
        ));
        assert!(request.contains("Host: vpn.example.org\r\n"));
        assert!(request.contains("Content-Length: 18446744073709551615\r\n"));
        assert!(request.contains("Cookie: ClientHTTPCookie=True; ClientBypassHLAuth=True\r\n"));
        assert!(request.ends_with("\r\n\r\n"));
    }

    #[tokio::test]
    async fn test_negotiate_rejects_non_200() {
        let mut transport = ScriptedTransport::new(&[b"HTTP/1.1 401 Unauthorized\r\n\r\n"]);

        let err = negotiate(&mut transport, "vpn.example.org")
            .await
            .unwrap_err();
        match err {
            SessionError::HandshakeRejected(line) => {
                assert_eq!(line, "HTTP/1.1 401 Unauthorized");
            }
            other => panic!("expected handshake rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_negotiate_rejects_closed_stream() {
        let mut transport = ScriptedTransport::new(&[]);
        let err = negotiate(&mut transport, "vpn.example.org")
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::HandshakeRejected(_)));
    }

    #[test]
    fn test_correlation_guid_shape() {
        let guid = correlation_guid();
        assert_eq!(guid.len(), 2 + 8 + 1 + 4 + 1 + 4 + 1 + 12);
        assert!(guid.starts_with('{') && guid.ends_with('}'));
        assert_eq!(guid.matches('-').count(), 3);
    }
}
