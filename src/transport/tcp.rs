use crate::error::{TransportError, TransportResult};
use crate::transport::socket::SocketLike;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

/// Configuration for TCP text sockets
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Maximum frame size in bytes
    pub max_message_size: usize,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Write timeout (None for no timeout)
    pub write_timeout: Option<Duration>,
    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub nodelay: bool,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            max_message_size: 16 * 1024 * 1024, // 16 MB
            connect_timeout: Duration::from_secs(5),
            write_timeout: Some(Duration::from_secs(30)),
            nodelay: true,
        }
    }
}

impl TcpConfig {
    /// Create a new configuration with custom max message size
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set write timeout
    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Enable or disable TCP_NODELAY
    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }
}

/// Text socket over TCP. Each frame is a 4-byte big-endian length followed by UTF-8.
#[derive(Debug)]
pub struct TcpSocket {
    config: TcpConfig,
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
    peer_addr: SocketAddr,
    connected: Arc<AtomicBool>,
}

impl TcpSocket {
    /// Connect to an address
    pub async fn connect(addr: SocketAddr, config: TcpConfig) -> TransportResult<Self> {
        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| TransportError::Timeout {
                duration_ms: config.connect_timeout.as_millis() as u64,
                operation: format!("connecting to {}", addr),
            })?
            .map_err(|e| TransportError::ConnectionFailed {
                name: addr.to_string(),
                reason: e.to_string(),
            })?;

        Self::from_stream(stream, config)
    }

    /// Wrap an existing stream
    pub fn from_stream(stream: TcpStream, config: TcpConfig) -> TransportResult<Self> {
        let peer_addr = stream
            .peer_addr()
            .map_err(|e| TransportError::Protocol(format!("Failed to get peer address: {}", e)))?;

        // Disable Nagle's algorithm for lower latency
        if config.nodelay {
            stream.set_nodelay(true).map_err(|e| {
                TransportError::Protocol(format!("Failed to set TCP_NODELAY: {}", e))
            })?;
        }

        let (reader, writer) = stream.into_split();
        Ok(Self {
            config,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            peer_addr,
            connected: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn write_frame(&self, data: &[u8]) -> TransportResult<()> {
        if !self.is_connected() {
            return Err(TransportError::Closed);
        }

        if data.len() > self.config.max_message_size {
            return Err(TransportError::MessageTooLarge {
                size: data.len(),
                max: self.config.max_message_size,
            });
        }

        let len_bytes = (data.len() as u32).to_be_bytes();

        let write_op = async {
            let mut writer = self.writer.lock().await;
            let fail = |e: std::io::Error| {
                self.connected.store(false, Ordering::Release);
                TransportError::SendFailed {
                    reason: e.to_string(),
                }
            };
            writer.write_all(&len_bytes).await.map_err(fail)?;
            writer.write_all(data).await.map_err(fail)?;
            Ok::<(), TransportError>(())
        };

        if let Some(timeout) = self.config.write_timeout {
            tokio::time::timeout(timeout, write_op)
                .await
                .map_err(|_| TransportError::Timeout {
                    duration_ms: timeout.as_millis() as u64,
                    operation: "TCP write".to_string(),
                })??;
        } else {
            write_op.await?;
        }

        Ok(())
    }

    /// Read one frame. `None` on EOF or any read error.
    async fn read_frame(&self) -> Option<Vec<u8>> {
        if !self.is_connected() {
            return None;
        }

        let mut reader = self.reader.lock().await;

        let mut len_bytes = [0u8; 4];
        if let Err(e) = reader.read_exact(&mut len_bytes).await {
            self.connected.store(false, Ordering::Release);
            tracing::debug!(peer = %self.peer_addr, error = %e, "tcp socket closed");
            return None;
        }

        let len = u32::from_be_bytes(len_bytes) as usize;
        if len > self.config.max_message_size {
            // The stream cannot be resynchronized past an oversized frame.
            self.connected.store(false, Ordering::Release);
            tracing::warn!(
                peer = %self.peer_addr,
                size = len,
                max = self.config.max_message_size,
                "oversized frame, closing"
            );
            return None;
        }

        let mut buffer = vec![0u8; len];
        if let Err(e) = reader.read_exact(&mut buffer).await {
            self.connected.store(false, Ordering::Release);
            tracing::debug!(peer = %self.peer_addr, error = %e, "tcp socket closed mid-frame");
            return None;
        }
        Some(buffer)
    }
}

#[async_trait]
impl SocketLike for TcpSocket {
    async fn send_text(&self, text: String) -> TransportResult<()> {
        self.write_frame(text.as_bytes()).await
    }

    async fn recv_text(&self) -> Option<String> {
        loop {
            let frame = self.read_frame().await?;
            match String::from_utf8(frame) {
                Ok(text) => return Some(text),
                Err(e) => {
                    tracing::debug!(peer = %self.peer_addr, error = %e, "dropping non-UTF-8 frame");
                }
            }
        }
    }
}

/// TCP listener producing [`TcpSocket`]s
pub struct TcpSocketListener {
    listener: TcpListener,
    config: TcpConfig,
}

impl TcpSocketListener {
    /// Bind to a socket address and listen for incoming connections
    pub async fn bind(addr: SocketAddr, config: TcpConfig) -> TransportResult<Self> {
        let listener =
            TcpListener::bind(addr)
                .await
                .map_err(|e| TransportError::ConnectionFailed {
                    name: addr.to_string(),
                    reason: format!("Failed to bind: {}", e),
                })?;

        Ok(Self { listener, config })
    }

    /// Get the local address the listener is bound to
    pub fn local_addr(&self) -> TransportResult<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| TransportError::Protocol(format!("Failed to get local address: {}", e)))
    }

    /// Accept an incoming connection
    pub async fn accept(&self) -> TransportResult<TcpSocket> {
        let (stream, _addr) =
            self.listener
                .accept()
                .await
                .map_err(|e| TransportError::ConnectionFailed {
                    name: "tcp_listener".to_string(),
                    reason: format!("Failed to accept connection: {}", e),
                })?;

        TcpSocket::from_stream(stream, self.config.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn connected_pair(config: TcpConfig) -> (TcpSocket, TcpSocket) {
        let listener = TcpSocketListener::bind("127.0.0.1:0".parse().unwrap(), config.clone())
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move { TcpSocket::connect(addr, config).await });
        let server = listener.accept().await.unwrap();
        let client = client.await.unwrap().unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn test_tcp_send_recv_text() {
        let (client, server) = connected_pair(TcpConfig::default()).await;
        assert!(client.is_connected());

        client.send_text("Hello, TCP!".to_string()).await.unwrap();
        assert_eq!(server.recv_text().await.unwrap(), "Hello, TCP!");

        server.send_text("Hello back!".to_string()).await.unwrap();
        assert_eq!(client.recv_text().await.unwrap(), "Hello back!");
    }

    #[tokio::test]
    async fn test_tcp_concurrent_read_and_write() {
        let (client, server) = connected_pair(TcpConfig::default()).await;
        let client = Arc::new(client);

        // A pending read must not block writes on the same socket.
        let reader = client.clone();
        let read_task = tokio::spawn(async move { reader.recv_text().await });

        client.send_text("ping".to_string()).await.unwrap();
        assert_eq!(server.recv_text().await.unwrap(), "ping");

        server.send_text("pong".to_string()).await.unwrap();
        assert_eq!(read_task.await.unwrap().unwrap(), "pong");
    }

    #[tokio::test]
    async fn test_tcp_message_too_large() {
        let config = TcpConfig::default().with_max_message_size(16);
        let (client, _server) = connected_pair(config).await;

        let result = client.send_text("x".repeat(64)).await;
        assert!(matches!(
            result,
            Err(TransportError::MessageTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_tcp_peer_close_ends_stream() {
        let (client, server) = connected_pair(TcpConfig::default()).await;
        drop(server);
        assert!(client.recv_text().await.is_none());
        assert!(!client.is_connected());
    }
}
