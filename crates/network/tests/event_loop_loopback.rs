//! Event loop against scripted peers on loopback sockets.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::BytesMut;
use peerwire_network::messages::{BlockHeader, BlockPayload, NetAddress, VersionPayload};
use peerwire_network::{
    EventLoop, Framer, Hash256, MemoryStorage, Message, NetworkError, Priority, RequestQueue,
    RequestTracker, SessionConfig, Storage,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

fn config() -> SessionConfig {
    SessionConfig::default()
}

fn version(protocol_version: u32, peer: SocketAddr) -> Message {
    Message::Version(VersionPayload {
        version: protocol_version,
        services: 1,
        timestamp: 1_700_000_000,
        receiver: NetAddress::new(1, peer),
        sender: NetAddress::new(1, peer),
        nonce: 7,
        user_agent: "/scripted-peer/".to_string(),
        start_height: 0,
    })
}

fn test_block() -> BlockPayload {
    BlockPayload::new(
        BlockHeader {
            version: 1,
            prev_block: Hash256::zero(),
            merkle_root: Hash256::new([0x42; 32]),
            time: 1_700_000_000,
            bits: 0x207fffff,
            nonce: 1,
        },
        vec![0x00],
    )
}

/// Peer side of a loopback connection
struct ScriptedPeer {
    stream: TcpStream,
    framer: Framer,
    buf: BytesMut,
}

impl ScriptedPeer {
    async fn accept(listener: &TcpListener, framer: Framer) -> Self {
        let (stream, _) = listener.accept().await.unwrap();
        Self {
            stream,
            framer,
            buf: BytesMut::new(),
        }
    }

    /// Next message from the node, `None` once it closed the connection
    async fn recv(&mut self) -> Option<Message> {
        loop {
            if let Some(message) = self.framer.decode(&mut self.buf).unwrap() {
                return Some(message);
            }
            match self.stream.read_buf(&mut self.buf).await {
                Ok(0) | Err(_) => return None,
                Ok(_) => {}
            }
        }
    }

    async fn send(&mut self, message: &Message) {
        let bytes = self.framer.to_bytes(message);
        self.stream.write_all(&bytes).await.unwrap();
    }

    /// Collects everything until the node disconnects
    async fn drain(&mut self) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Some(message) = self.recv().await {
            messages.push(message);
        }
        messages
    }
}

async fn listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    (listener, address)
}

#[tokio::test]
async fn test_handshake_and_block_download() {
    let (listener, address) = listener().await;
    let config = config();
    let framer = config.framer();
    let block = test_block();
    let block_iv = block.inventory();

    let peer_block = block.clone();
    let peer = tokio::spawn(async move {
        let mut peer = ScriptedPeer::accept(&listener, framer).await;
        let mut seen = vec![peer.recv().await.unwrap()];
        peer.send(&version(31900, address)).await;
        peer.send(&Message::Verack).await;
        peer.send(&Message::Inv(vec![peer_block.inventory()])).await;

        while let Some(message) = peer.recv().await {
            let requested = matches!(&message, Message::GetData(items) if items.contains(&peer_block.inventory()));
            seen.push(message);
            if requested {
                peer.send(&Message::Block(peer_block.clone())).await;
                break;
            }
        }
        seen.extend(peer.drain().await);
        seen
    });

    let mut event_loop = EventLoop::new(config, RequestQueue::new(), MemoryStorage::new());
    event_loop.connect(address).unwrap();

    let finished = timeout(TEST_TIMEOUT, async {
        while !event_loop.storage().has_block(&block_iv.hash) {
            event_loop.turn().await?;
        }
        Ok::<_, NetworkError>(())
    })
    .await;
    assert!(matches!(finished, Ok(Ok(()))));
    assert!(event_loop.tracker().is_empty());

    event_loop.close_all();
    assert!(event_loop.is_empty());

    let seen = timeout(TEST_TIMEOUT, peer).await.unwrap().unwrap();
    assert!(matches!(seen.first(), Some(Message::Version(v)) if v.version == 31900));
    assert!(seen.contains(&Message::Verack));
    assert!(seen.contains(&Message::GetData(vec![block_iv])));
}

#[tokio::test]
async fn test_old_version_ends_session() {
    let (listener, address) = listener().await;
    let config = config();
    let framer = config.framer();

    let peer = tokio::spawn(async move {
        let mut peer = ScriptedPeer::accept(&listener, framer).await;
        let _ = peer.recv().await;
        peer.send(&version(31800, address)).await;
        peer.drain().await
    });

    let mut event_loop = EventLoop::new(config, RequestQueue::new(), MemoryStorage::new());
    event_loop.connect(address).unwrap();
    let result = timeout(TEST_TIMEOUT, event_loop.run()).await;
    assert!(matches!(result, Ok(Ok(()))));
    assert!(event_loop.is_empty());

    let after_version = timeout(TEST_TIMEOUT, peer).await.unwrap().unwrap();
    assert!(!after_version.contains(&Message::Verack));
}

#[tokio::test]
async fn test_handshake_timeout_ends_session() {
    let (listener, address) = listener().await;
    let config = config().with_handshake_timeout(Duration::from_millis(200));
    let framer = config.framer();

    let peer = tokio::spawn(async move {
        let mut peer = ScriptedPeer::accept(&listener, framer).await;
        // Never answers
        peer.drain().await
    });

    let mut event_loop = EventLoop::new(config, RequestQueue::new(), MemoryStorage::new());
    event_loop.connect(address).unwrap();
    let result = timeout(TEST_TIMEOUT, event_loop.run()).await;
    assert!(matches!(result, Ok(Ok(()))));

    let received = timeout(TEST_TIMEOUT, peer).await.unwrap().unwrap();
    assert!(matches!(received.as_slice(), [Message::Version(_)]));
}

#[tokio::test]
async fn test_unanswered_request_returns_to_pool() {
    let (listener, address) = listener().await;
    let config = config().with_request_timeout(Duration::from_millis(100));
    let framer = config.framer();
    let iv = test_block().inventory();

    let peer = tokio::spawn(async move {
        let mut peer = ScriptedPeer::accept(&listener, framer).await;
        let _ = peer.recv().await;
        peer.send(&version(31900, address)).await;
        peer.send(&Message::Verack).await;
        peer.send(&Message::Inv(vec![iv])).await;
        peer.drain().await
    });

    let mut event_loop = EventLoop::new(config, RequestQueue::new(), MemoryStorage::new());
    event_loop.connect(address).unwrap();

    let requeued = timeout(TEST_TIMEOUT, async {
        while event_loop.tracker().assignee(&iv).is_none() {
            event_loop.turn().await?;
        }
        while !event_loop.tracker().is_pending(&iv) {
            event_loop.turn().await?;
        }
        Ok::<_, NetworkError>(())
    })
    .await;
    assert!(matches!(requeued, Ok(Ok(()))));

    // The only peer gets it again
    assert!(!event_loop.tracker_mut().enqueue(iv, Priority::High));
    assert_eq!(event_loop.tracker_mut().pop_next(&address), Some(iv));

    event_loop.close_all();
    let received = timeout(TEST_TIMEOUT, peer).await.unwrap().unwrap();
    let requests = received
        .iter()
        .filter(|message| matches!(message, Message::GetData(_)))
        .count();
    assert_eq!(requests, 1);
}

#[tokio::test]
async fn test_refused_connection_closes() {
    // Reserve a port and release it so nothing is listening there
    let address = {
        let (listener, address) = listener().await;
        drop(listener);
        address
    };

    let mut event_loop = EventLoop::new(config(), RequestQueue::new(), MemoryStorage::new());
    match event_loop.connect(address) {
        Ok(_) => {
            let result = timeout(TEST_TIMEOUT, event_loop.run()).await;
            assert!(matches!(result, Ok(Ok(()))));
            assert!(event_loop.is_empty());
        }
        Err(NetworkError::Connect { address: failed, .. }) => assert_eq!(failed, address),
        Err(other) => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_run_without_sessions_returns() {
    let mut event_loop = EventLoop::new(config(), RequestQueue::new(), MemoryStorage::new());
    let result = timeout(TEST_TIMEOUT, event_loop.run()).await;
    assert!(matches!(result, Ok(Ok(()))));
    assert!(!event_loop.storage().has_block(&Hash256::zero()));
}
