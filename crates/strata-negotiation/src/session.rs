//! Typed, bidirectional message channel for one negotiation.
//!
//! A session is owned by the task driving the negotiation. It does not retry: a failed
//! send or read ends the negotiation and the caller decides what to do next.

use crate::error::{NegotiationError, Result};
use crate::message::{Message, MessageCode};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use strata_contract::HostSettings;
use strata_types::PublicKey;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

/// What a session knows about the other side
#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub public_key: PublicKey,
    /// Present when the peer is a host that has announced its terms
    pub host_settings: Option<HostSettings>,
}

#[async_trait]
pub trait Session: Send {
    async fn send_message(&mut self, message: Message) -> Result<()>;

    /// Waits for the next message
    async fn read_message(&mut self) -> Result<Message>;

    /// Returns a message only if one is already queued
    fn try_read_message(&mut self) -> Result<Option<Message>>;

    fn peer(&self) -> &PeerInfo;
}

/// Typed helpers over any [`Session`]
#[async_trait]
pub trait SessionExt: Session {
    async fn send_typed<T: Serialize + Sync + ?Sized>(
        &mut self,
        code: MessageCode,
        payload: &T,
    ) -> Result<()> {
        let message = Message::encode(code, payload)?;
        self.send_message(message).await
    }

    async fn send_signal(&mut self, code: MessageCode) -> Result<()> {
        self.send_message(Message::signal(code)).await
    }

    /// Tells the peer why the negotiation is being abandoned
    async fn send_error(&mut self, error: &NegotiationError) -> Result<()> {
        self.send_typed(MessageCode::NegotiationError, &error.to_string())
            .await
    }

    /// Reads the next message, which must carry `code`. A negotiation error from the peer
    /// becomes [`NegotiationError::PeerNegotiation`].
    async fn read_expected<T: DeserializeOwned + Send>(&mut self, code: MessageCode) -> Result<T> {
        let message = self.read_message().await?;
        expect_code(&message, code)?;
        message.decode()
    }

    /// Like [`SessionExt::read_expected`] for payload-free messages
    async fn read_signal(&mut self, code: MessageCode) -> Result<()> {
        let message = self.read_message().await?;
        expect_code(&message, code)
    }
}

impl<S: Session + ?Sized> SessionExt for S {}

pub(crate) fn expect_code(message: &Message, code: MessageCode) -> Result<()> {
    if message.code == code {
        return Ok(());
    }
    if message.code == MessageCode::NegotiationError {
        let reason = message
            .decode::<String>()
            .unwrap_or_else(|_| "unreadable error message".to_string());
        return Err(NegotiationError::PeerNegotiation(reason));
    }
    Err(NegotiationError::Decode(format!(
        "expected {:?}, received {:?}",
        code, message.code
    )))
}

/// In-process session over a pair of tokio channels
pub struct ChannelSession {
    tx: mpsc::Sender<Message>,
    rx: mpsc::Receiver<Message>,
    peer: PeerInfo,
    read_timeout: Option<Duration>,
}

const CHANNEL_CAPACITY: usize = 64;

impl ChannelSession {
    /// Two connected ends. Each end's `peer()` describes the other end.
    pub fn pair(first_peer: PeerInfo, second_peer: PeerInfo) -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::channel(CHANNEL_CAPACITY);
        let (tx_b, rx_b) = mpsc::channel(CHANNEL_CAPACITY);
        (
            Self {
                tx: tx_a,
                rx: rx_b,
                peer: first_peer,
                read_timeout: None,
            },
            Self {
                tx: tx_b,
                rx: rx_a,
                peer: second_peer,
                read_timeout: None,
            },
        )
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Session for ChannelSession {
    async fn send_message(&mut self, message: Message) -> Result<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| NegotiationError::SessionClosed)
    }

    async fn read_message(&mut self) -> Result<Message> {
        let next = match self.read_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.rx.recv())
                .await
                .map_err(|_| NegotiationError::Timeout)?,
            None => self.rx.recv().await,
        };
        next.ok_or(NegotiationError::SessionClosed)
    }

    fn try_read_message(&mut self) -> Result<Option<Message>> {
        match self.rx.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(NegotiationError::SessionClosed),
        }
    }

    fn peer(&self) -> &PeerInfo {
        &self.peer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(byte: u8) -> PeerInfo {
        PeerInfo {
            public_key: PublicKey::from_bytes([byte; 32]),
            host_settings: None,
        }
    }

    #[tokio::test]
    async fn test_pair_delivers_in_order() {
        let (mut a, mut b) = ChannelSession::pair(peer(2), peer(1));
        a.send_typed(MessageCode::UploadRequest, &7u64).await.unwrap();
        a.send_signal(MessageCode::HostAck).await.unwrap();

        let first: u64 = b.read_expected(MessageCode::UploadRequest).await.unwrap();
        assert_eq!(first, 7);
        b.read_signal(MessageCode::HostAck).await.unwrap();
        assert_eq!(b.peer().public_key, PublicKey::from_bytes([1; 32]));
    }

    #[tokio::test]
    async fn test_peer_error_surfaces_as_peer_negotiation() {
        let (mut a, mut b) = ChannelSession::pair(peer(2), peer(1));
        a.send_error(&NegotiationError::InvalidRequest("bad offset".into()))
            .await
            .unwrap();
        let err = b
            .read_expected::<u64>(MessageCode::DownloadResponse)
            .await
            .unwrap_err();
        match err {
            NegotiationError::PeerNegotiation(reason) => assert!(reason.contains("bad offset")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unexpected_code_is_decode_error() {
        let (mut a, mut b) = ChannelSession::pair(peer(2), peer(1));
        a.send_signal(MessageCode::HostAck).await.unwrap();
        let err = b.read_signal(MessageCode::ClientCommitSuccess).await.unwrap_err();
        assert!(matches!(err, NegotiationError::Decode(_)));
    }

    #[tokio::test]
    async fn test_closed_and_timeout() {
        let (a, b) = ChannelSession::pair(peer(2), peer(1));
        let mut b = b.with_read_timeout(Duration::from_millis(20));
        assert!(matches!(b.try_read_message(), Ok(None)));
        assert!(matches!(b.read_message().await, Err(NegotiationError::Timeout)));

        drop(a);
        assert!(matches!(b.read_message().await, Err(NegotiationError::SessionClosed)));
        assert!(matches!(b.try_read_message(), Err(NegotiationError::SessionClosed)));
    }
}
