//! TCP session with the deduplication server

use log::{debug, info};
use shared::{parse_client_id, Response, ResponseError, MAX_REQUEST_BYTES};
use std::io;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The server closed the connection without admitting us
    #[error("server closed the connection before admission")]
    Denied,

    #[error("invalid client identifier {0:?}")]
    InvalidId(String),

    #[error("request is {len} bytes, the server accepts at most {limit}")]
    RequestTooLarge { len: usize, limit: usize },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Response(#[from] ResponseError),
}

/// One connection to the server
///
/// The server admits clients one exchange at a time, so a `Client` is used
/// once: connect, wait for the identifier, submit a line, read the answer.
pub struct Client {
    stream: BufReader<TcpStream>,
    server_addr: SocketAddr,
    client_id: Option<u32>,
}

impl Client {
    pub async fn connect(server_addr: &str) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(server_addr)
            .await
            .map_err(|source| ClientError::Connect {
                addr: server_addr.to_string(),
                source,
            })?;
        let server_addr = stream.peer_addr()?;
        info!("Connection to server {} established", server_addr);

        Ok(Client {
            stream: BufReader::new(stream),
            server_addr,
            client_id: None,
        })
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    pub fn client_id(&self) -> Option<u32> {
        self.client_id
    }

    /// Blocks until the server admits this connection and returns the identifier
    ///
    /// A server that shuts down while we wait closes the socket without
    /// sending anything, which is reported as [`ClientError::Denied`].
    pub async fn wait_for_admission(&mut self) -> Result<u32, ClientError> {
        if let Some(client_id) = self.client_id {
            return Ok(client_id);
        }

        let mut line = String::new();
        let read = self.stream.read_line(&mut line).await?;
        if read == 0 {
            return Err(ClientError::Denied);
        }

        let client_id = parse_client_id(&line).ok_or_else(|| ClientError::InvalidId(line.clone()))?;
        info!("[Client #{}] Received ID from server", client_id);
        self.client_id = Some(client_id);
        Ok(client_id)
    }

    /// Sends one request line and reads the server's answer
    pub async fn submit(&mut self, line: &str) -> Result<Response, ClientError> {
        self.wait_for_admission().await?;

        let line = line.trim_end_matches(['\r', '\n']);
        if line.len() >= MAX_REQUEST_BYTES {
            return Err(ClientError::RequestTooLarge {
                len: line.len(),
                limit: MAX_REQUEST_BYTES,
            });
        }

        let stream = self.stream.get_mut();
        stream.write_all(line.as_bytes()).await?;
        stream.write_all(b"\n").await?;
        stream.flush().await?;
        debug!("Sent request {:?}", line);

        let mut text = String::new();
        self.stream.read_to_string(&mut text).await?;
        debug!("Received response {:?}", text);

        Ok(Response::parse(&text)?)
    }

    pub async fn submit_values(&mut self, values: &[f64]) -> Result<Response, ClientError> {
        self.submit(&shared::format_values(values)).await
    }
}
