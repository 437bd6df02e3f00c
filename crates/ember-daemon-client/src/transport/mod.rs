//! Framed TCP transport for the daemon's publish/subscribe and
//! request/reply channels.
//!
//! All channels exchange length-delimited frames. Publish channels carry
//! topic frames (`<topic>\n<payload>`) from server to client and JSON
//! subscribe frames (`{"subscribe": [..]}`) from client to server. The
//! status channel is plaintext; the control channels wrap the same framing
//! in the authenticated-encrypted stream from [`secure`].

pub mod secure;

use std::io;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_util::bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

pub(crate) type FramedStream = Framed<TcpStream, LengthDelimitedCodec>;

pub(crate) fn frame(stream: TcpStream) -> FramedStream {
    Framed::new(stream, LengthDelimitedCodec::new())
}

/// Client-to-server subscription request on a publish channel.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct SubscribeFrame {
    pub subscribe: Vec<String>,
}

/// Encode a server-to-client topic frame.
pub(crate) fn encode_topic_frame(topic: &str, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(topic.len() + 1 + payload.len());
    buf.put_slice(topic.as_bytes());
    buf.put_u8(b'\n');
    buf.put_slice(payload);
    buf.freeze()
}

/// Split a topic frame into its topic and raw payload.
///
/// The payload is deliberately left unparsed: the router decides what to do
/// with malformed JSON.
pub(crate) fn decode_topic_frame(mut frame: BytesMut) -> io::Result<(String, Bytes)> {
    let split = frame
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "frame has no topic"))?;
    let topic_bytes = frame.split_to(split);
    frame.advance(1);
    let topic = std::str::from_utf8(&topic_bytes)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "topic is not UTF-8"))?
        .to_string();
    Ok((topic, frame.freeze()))
}

/// Plaintext subscriber for the status publish channel.
pub struct Subscriber {
    framed: FramedStream,
}

impl Subscriber {
    /// Connect to a publish channel.
    pub async fn connect(host: &str, port: u16) -> io::Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        Ok(Self {
            framed: frame(stream),
        })
    }

    /// Register for the given topics.
    pub async fn subscribe(&mut self, topics: &[&str]) -> io::Result<()> {
        let frame = SubscribeFrame {
            subscribe: topics.iter().map(|t| t.to_string()).collect(),
        };
        let raw = serde_json::to_vec(&frame)?;
        self.framed.send(Bytes::from(raw)).await
    }

    /// Receive the next topic frame, in arrival order.
    pub async fn next(&mut self) -> io::Result<(String, Bytes)> {
        let frame = self
            .framed
            .next()
            .await
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "status channel closed"))??;
        decode_topic_frame(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_topic_frame_round_trip() {
        let frame = encode_topic_frame("apiStatus", br#"{"meta":{"status":200}}"#);
        let (topic, payload) = decode_topic_frame(BytesMut::from(&frame[..])).unwrap();
        assert_eq!(topic, "apiStatus");
        assert_eq!(&payload[..], br#"{"meta":{"status":200}}"#);
    }

    #[test]
    fn test_topic_frame_payload_may_contain_newlines() {
        let frame = encode_topic_frame("transaction", b"line1\nline2");
        let (topic, payload) = decode_topic_frame(BytesMut::from(&frame[..])).unwrap();
        assert_eq!(topic, "transaction");
        assert_eq!(&payload[..], b"line1\nline2");
    }

    #[test]
    fn test_decode_rejects_frame_without_topic() {
        let result = decode_topic_frame(BytesMut::from(&b"no separator here"[..]));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_subscriber_receives_published_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut framed = frame(stream);
            // Read the subscribe frame, then publish two messages.
            let sub = framed.next().await.unwrap().unwrap();
            let parsed: SubscribeFrame = serde_json::from_slice(&sub).unwrap();
            assert_eq!(parsed.subscribe, vec!["apiStatus".to_string()]);

            framed
                .send(encode_topic_frame("apiStatus", b"first"))
                .await
                .unwrap();
            framed
                .send(encode_topic_frame("apiStatus", b"second"))
                .await
                .unwrap();
        });

        let mut sub = Subscriber::connect("127.0.0.1", port).await.unwrap();
        sub.subscribe(&["apiStatus"]).await.unwrap();

        let (topic, payload) = sub.next().await.unwrap();
        assert_eq!(topic, "apiStatus");
        assert_eq!(&payload[..], b"first");

        let (_, payload) = sub.next().await.unwrap();
        assert_eq!(&payload[..], b"second");

        server.await.unwrap();
    }
}
