//! Blocking memcached text-protocol client, limited to what retention needs:
//! `set`, `get` and `quit`.

use super::{CacheConnection, Connector};
use crate::error::{RepcacheError, Result};
use std::fmt;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 11211;
const MAX_KEY_LEN: usize = 250;

/// A pool entry: `host`, `host:port` or `inet:host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

impl FromStr for ServerAddress {
    type Err = RepcacheError;

    fn from_str(s: &str) -> Result<Self> {
        let raw = s.trim();
        let rest = raw.strip_prefix("inet:").unwrap_or(raw);
        if rest.is_empty() || rest.starts_with("unix:") {
            return Err(RepcacheError::InvalidAddress(raw.to_string()));
        }

        // [v6]:port
        if let Some(bracketed) = rest.strip_prefix('[') {
            let (host, tail) = bracketed
                .split_once(']')
                .ok_or_else(|| RepcacheError::InvalidAddress(raw.to_string()))?;
            let port = match tail.strip_prefix(':') {
                Some(p) => parse_port(raw, p)?,
                None if tail.is_empty() => DEFAULT_PORT,
                None => return Err(RepcacheError::InvalidAddress(raw.to_string())),
            };
            return Ok(ServerAddress {
                host: host.to_string(),
                port,
            });
        }

        match rest.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && !host.contains(':') => Ok(ServerAddress {
                host: host.to_string(),
                port: parse_port(raw, port)?,
            }),
            Some(_) => Err(RepcacheError::InvalidAddress(raw.to_string())),
            None => Ok(ServerAddress {
                host: rest.to_string(),
                port: DEFAULT_PORT,
            }),
        }
    }
}

fn parse_port(raw: &str, port: &str) -> Result<u16> {
    port.parse()
        .map_err(|_| RepcacheError::InvalidAddress(raw.to_string()))
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Reject keys memcached would refuse: too long, empty, or containing
/// whitespace/control bytes.
pub fn validate_key(key: &[u8]) -> Result<()> {
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(RepcacheError::InvalidKey(format!(
            "{} ({} bytes, limit {})",
            String::from_utf8_lossy(key),
            key.len(),
            MAX_KEY_LEN
        )));
    }
    if key.iter().any(|&b| b <= b' ' || b == 0x7f) {
        return Err(RepcacheError::InvalidKey(format!(
            "{} contains whitespace or control characters",
            String::from_utf8_lossy(key)
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct MemcacheConnector {
    connect_timeout: Duration,
    io_timeout: Duration,
    expire_secs: u32,
    max_value_bytes: usize,
}

impl Default for MemcacheConnector {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(crate::config::DEFAULT_CONNECT_TIMEOUT_MS),
            io_timeout: Duration::from_millis(crate::config::DEFAULT_IO_TIMEOUT_MS),
            expire_secs: 0,
            max_value_bytes: crate::config::DEFAULT_MAX_VALUE_BYTES,
        }
    }
}

impl MemcacheConnector {
    pub fn new(connect_timeout: Duration, io_timeout: Duration, expire_secs: u32) -> Self {
        Self {
            connect_timeout,
            io_timeout,
            expire_secs,
            max_value_bytes: crate::config::DEFAULT_MAX_VALUE_BYTES,
        }
    }

    /// Cap on value size for both `set` payloads and `VALUE` replies.
    pub fn with_max_value_bytes(mut self, max_value_bytes: usize) -> Self {
        self.max_value_bytes = max_value_bytes;
        self
    }

    pub fn from_config(config: &crate::config::RepcacheConfig) -> Self {
        Self::new(
            Duration::from_millis(config.connect_timeout_ms),
            Duration::from_millis(config.io_timeout_ms),
            config.expire_secs,
        )
        .with_max_value_bytes(config.max_value_bytes)
    }
}

impl Connector for MemcacheConnector {
    type Connection = MemcacheConnection;

    fn connect(&self, address: &str) -> Result<MemcacheConnection> {
        let server: ServerAddress = address.parse()?;
        let addrs = (server.host.as_str(), server.port)
            .to_socket_addrs()
            .map_err(|e| RepcacheError::Connect {
                address: address.to_string(),
                reason: format!("resolve failed: {}", e),
            })?;

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(self.io_timeout))?;
                    stream.set_write_timeout(Some(self.io_timeout))?;
                    stream.set_nodelay(true)?;
                    return Ok(MemcacheConnection {
                        address: address.to_string(),
                        stream: Some(BufReader::new(stream)),
                        expire_secs: self.expire_secs,
                        max_value_bytes: self.max_value_bytes,
                    });
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(RepcacheError::Connect {
            address: address.to_string(),
            reason: last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no socket address resolved".to_string()),
        })
    }
}

/// One TCP connection to a memcached server.
///
/// Once a request has been written, any reply that cannot be consumed in full
/// closes the connection: later requests fail instead of reading a stale
/// reply. Only `NOT_STORED` and `SERVER_ERROR` lines leave it open.
pub struct MemcacheConnection {
    address: String,
    stream: Option<BufReader<TcpStream>>,
    expire_secs: u32,
    max_value_bytes: usize,
}

impl MemcacheConnection {
    pub fn address(&self) -> &str {
        &self.address
    }

    /// False once the connection was closed, either explicitly or after a
    /// reply that could not be consumed.
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn stream(&mut self) -> Result<&mut BufReader<TcpStream>> {
        let address = &self.address;
        self.stream.as_mut().ok_or_else(|| {
            RepcacheError::Protocol(format!("connection to {} already closed", address))
        })
    }

    fn read_line(&mut self) -> Result<String> {
        let stream = self.stream()?;
        let mut line = Vec::new();
        let n = stream.read_until(b'\n', &mut line)?;
        if n == 0 {
            return Err(RepcacheError::Protocol(
                "server closed the connection".to_string(),
            ));
        }
        if !line.ends_with(b"\r\n") {
            return Err(RepcacheError::Protocol(format!(
                "unterminated response line: {}",
                String::from_utf8_lossy(&line)
            )));
        }
        line.truncate(line.len() - 2);
        Ok(String::from_utf8_lossy(&line).into_owned())
    }

    fn server_error(line: &str) -> Option<RepcacheError> {
        if line == "ERROR" || line.starts_with("CLIENT_ERROR") || line.starts_with("SERVER_ERROR")
        {
            Some(RepcacheError::Protocol(line.to_string()))
        } else {
            None
        }
    }

    /// Replies that were read in full and leave nothing pending on the socket.
    fn leaves_stream_in_sync(err: &RepcacheError) -> bool {
        match err {
            RepcacheError::NotStored(_) => true,
            RepcacheError::Protocol(line) => line.starts_with("SERVER_ERROR"),
            _ => false,
        }
    }

    /// Close the socket without `quit`: whatever the server still sends is
    /// never read.
    fn abandon(&mut self, err: &RepcacheError) {
        if let Some(reader) = self.stream.take() {
            tracing::warn!(
                "[RepcacheRetention] closing connection to {} after failed exchange: {}",
                self.address,
                err
            );
            let _ = reader.into_inner().shutdown(Shutdown::Both);
        }
    }

    fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if !Self::leaves_stream_in_sync(err) {
                self.abandon(err);
            }
        }
        result
    }

    fn check_value_len(&self, len: usize) -> Result<()> {
        if len > self.max_value_bytes {
            return Err(RepcacheError::Protocol(format!(
                "value of {} bytes exceeds the {} byte limit",
                len, self.max_value_bytes
            )));
        }
        Ok(())
    }

    fn set_exchange(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let expire_secs = self.expire_secs;

        let stream = self.stream()?.get_mut();
        let mut request = Vec::with_capacity(key.len() + value.len() + 32);
        request.extend_from_slice(b"set ");
        request.extend_from_slice(key);
        request.extend_from_slice(format!(" 0 {} {}\r\n", expire_secs, value.len()).as_bytes());
        request.extend_from_slice(value);
        request.extend_from_slice(b"\r\n");
        stream.write_all(&request)?;
        stream.flush()?;

        let line = self.read_line()?;
        match line.as_str() {
            "STORED" => Ok(()),
            "NOT_STORED" => Err(RepcacheError::NotStored(
                String::from_utf8_lossy(key).into_owned(),
            )),
            other => Err(Self::server_error(other).unwrap_or_else(|| {
                RepcacheError::Protocol(format!("unexpected reply to set: {}", other))
            })),
        }
    }

    fn get_exchange(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let stream = self.stream()?.get_mut();
        let mut request = Vec::with_capacity(key.len() + 6);
        request.extend_from_slice(b"get ");
        request.extend_from_slice(key);
        request.extend_from_slice(b"\r\n");
        stream.write_all(&request)?;
        stream.flush()?;

        let header = self.read_line()?;
        if header == "END" {
            return Ok(None);
        }
        if let Some(err) = Self::server_error(&header) {
            return Err(err);
        }

        // VALUE <key> <flags> <bytes> [<cas>]
        let mut parts = header.split(' ');
        let len = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some("VALUE"), Some(k), Some(_flags), Some(len)) if k.as_bytes() == key => len
                .parse::<usize>()
                .map_err(|_| RepcacheError::Protocol(format!("bad VALUE line: {}", header)))?,
            _ => {
                return Err(RepcacheError::Protocol(format!(
                    "unexpected reply to get: {}",
                    header
                )))
            }
        };
        self.check_value_len(len)?;
        let block_len = len
            .checked_add(2)
            .ok_or_else(|| RepcacheError::Protocol(format!("bad VALUE line: {}", header)))?;

        let mut data = vec![0u8; block_len];
        self.stream()?.read_exact(&mut data)?;
        if !data.ends_with(b"\r\n") {
            return Err(RepcacheError::Protocol(
                "data block not terminated by CRLF".to_string(),
            ));
        }
        data.truncate(len);

        let trailer = self.read_line()?;
        if trailer != "END" {
            return Err(RepcacheError::Protocol(format!(
                "expected END after value, got: {}",
                trailer
            )));
        }
        Ok(Some(data))
    }
}

impl CacheConnection for MemcacheConnection {
    fn store(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        validate_key(key)?;
        self.check_value_len(value.len())?;
        let result = self.set_exchange(key, value);
        self.settle(result)
    }

    fn fetch(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;
        let result = self.get_exchange(key);
        self.settle(result)
    }

    fn disconnect(&mut self) {
        if let Some(reader) = self.stream.take() {
            let mut stream = reader.into_inner();
            let _ = stream.write_all(b"quit\r\n");
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}
