//! duplex-rpc - call methods across any duplex message channel
//!
//! One side exposes a tree of methods on a channel, the other side wraps
//! the same channel and calls into it through a [`Commander`]. Methods may
//! hand out further objects as remote references, and large binary values
//! can be marked with [`transfer`] to move instead of being copied where
//! the channel allows it.
pub mod client;
pub mod codec;
pub mod commander;
pub mod dispatch;
pub mod error;
pub mod message;
pub mod methods;
pub mod pending;
pub mod references;
pub mod server;
pub mod transfer;
pub mod transport;
pub mod value;

pub use client::{ClientConfig, ClientHandle, RpcClient, wrap};
pub use codec::{Codec, JsonCodec, PrettyJsonCodec};
pub use commander::{AWAITABLE_PROBE, Commander, Invoke, Remote};
pub use dispatch::{DispatchError, dispatch, resolve};
pub use error::{Result, RpcError, TransportError, TransportResult};
pub use message::Envelope;
pub use message::types::{
    CallId, CallPayload, NamespaceId, RemoteHandle, ReplyPayload, Scope, TopicPath,
};
pub use methods::{Member, Method, MethodResult, Methods, Outcome, remote};
pub use references::RemoteReferences;
pub use server::{RpcServer, ServerHandle, expose};
pub use transfer::{Extracted, extract, transfer};
pub use transport::port::{MessagePort, PortChannel, PortLike};
pub use transport::socket::{MemorySocket, SocketChannel, SocketLike};
pub use transport::tcp::{TcpConfig, TcpSocket, TcpSocketListener};
pub use transport::window::{InProcessWindow, WindowChannel, WindowLike};
pub use transport::{Channel, MessageHandler, TransportStats};
pub use value::{Record, Value};
