//! Client for a remote RESP server.
//!
//! A [`RemoteStore`] owns one TCP connection. A batch is written as a single
//! pipeline: every command is encoded into one buffer, flushed once, and then
//! exactly one reply per command is read back.
//!
//! A failed transport leaves the connection in an unknown state, so it is
//! dropped and the next call connects again. The failed call itself is not
//! retried.

use super::resp::{self, Frame};
use super::{Batch, BitOp, Store};
use crate::config::Options;
use crate::error::{StoreError, StoreResult};
use bytes::BytesMut;
use parking_lot::Mutex;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

const READ_CHUNK: usize = 16 * 1024;

const PING: &[u8] = b"PING";
const SELECT: &[u8] = b"SELECT";
const GETBIT: &[u8] = b"GETBIT";
const SETBIT: &[u8] = b"SETBIT";
const ONE: &[u8] = b"1";

/// Connection settings kept for reconnecting.
#[derive(Debug, Clone)]
struct Endpoint {
    address: String,
    db: u32,
    connect_timeout: Option<Duration>,
    io_timeout: Option<Duration>,
}

/// A live connection with its buffers.
#[derive(Debug)]
struct Connection {
    stream: TcpStream,
    read_buf: BytesMut,
    write_buf: BytesMut,
}

impl Connection {
    fn open(endpoint: &Endpoint) -> StoreResult<Self> {
        let addrs: Vec<SocketAddr> = endpoint
            .address
            .to_socket_addrs()
            .map_err(|e| {
                StoreError::connection_failed(format!("cannot resolve {}: {}", endpoint.address, e))
            })?
            .collect();

        let mut last_error = None;
        let mut stream = None;
        for addr in &addrs {
            let attempt = match endpoint.connect_timeout {
                Some(timeout) => TcpStream::connect_timeout(addr, timeout),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => last_error = Some(e),
            }
        }

        let stream = match (stream, last_error) {
            (Some(stream), _) => stream,
            (None, Some(e)) => {
                let mut err = StoreError::from(e);
                err.detail = format!("cannot connect to {}: {}", endpoint.address, err.detail);
                return Err(err);
            }
            (None, None) => {
                return Err(StoreError::connection_failed(format!(
                    "no addresses for {}",
                    endpoint.address
                )))
            }
        };

        stream.set_read_timeout(endpoint.io_timeout)?;
        stream.set_write_timeout(endpoint.io_timeout)?;
        stream.set_nodelay(true)?;

        let mut conn = Self {
            stream,
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            write_buf: BytesMut::with_capacity(READ_CHUNK),
        };

        if endpoint.db != 0 {
            let db = endpoint.db.to_string();
            resp::encode_command(&mut conn.write_buf, &[SELECT, db.as_bytes()]);
            match conn.pipeline(1)?.pop() {
                Some(Frame::Simple(_)) => {}
                Some(Frame::Error(msg)) => return Err(StoreError::from_reply(&msg)),
                other => return Err(unexpected("SELECT", other.as_ref())),
            }
        }

        log::debug!("Connected to {} (db {})", endpoint.address, endpoint.db);
        Ok(conn)
    }

    /// Sends the buffered commands and reads `count` replies.
    ///
    /// Error replies come back as [`Frame::Error`]; an `Err` means the
    /// transport or the framing failed.
    fn pipeline(&mut self, count: usize) -> StoreResult<Vec<Frame>> {
        self.stream.write_all(&self.write_buf)?;
        self.stream.flush()?;
        self.write_buf.clear();

        let mut replies = Vec::with_capacity(count);
        while replies.len() < count {
            replies.push(self.read_frame()?);
        }
        Ok(replies)
    }

    fn read_frame(&mut self) -> StoreResult<Frame> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(frame) = Frame::decode(&mut self.read_buf)? {
                return Ok(frame);
            }
            let n = self.stream.read(&mut chunk)?;
            if n == 0 {
                return Err(StoreError::connection_failed("connection closed by server"));
            }
            self.read_buf.extend_from_slice(&chunk[..n]);
        }
    }
}

/// Pipelining client for a RESP-speaking key-value server.
///
/// # Thread Safety
///
/// Calls from several threads are serialised on the single connection. Give
/// each thread its own `RemoteStore` to overlap round trips.
#[derive(Debug)]
pub struct RemoteStore {
    endpoint: Endpoint,
    conn: Mutex<Option<Connection>>,
}

impl RemoteStore {
    /// Connects to the server described by `options`.
    ///
    /// # Errors
    ///
    /// Returns a `ConnectionFailed` error if the server cannot be reached,
    /// or a `Timeout` error if it does not answer in time.
    pub fn connect(options: &Options) -> StoreResult<Self> {
        let endpoint = Endpoint {
            address: options.address(),
            db: options.db,
            connect_timeout: options.connect_timeout,
            io_timeout: options.io_timeout,
        };
        let conn = Connection::open(&endpoint)?;
        Ok(Self { endpoint, conn: Mutex::new(Some(conn)) })
    }

    /// Returns the `host:port` this store talks to.
    pub fn address(&self) -> &str {
        &self.endpoint.address
    }

    /// Returns the selected namespace.
    pub fn db(&self) -> u32 {
        self.endpoint.db
    }

    /// Sends `commands` as one pipeline and returns their replies in order.
    pub fn pipeline(&self, commands: &[Frame]) -> StoreResult<Vec<Frame>> {
        self.with_connection(|conn| {
            for command in commands {
                command.encode(&mut conn.write_buf);
            }
            conn.pipeline(commands.len())
        })
    }

    fn with_connection<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut guard = self.conn.lock();
        let mut conn = match guard.take() {
            Some(conn) => conn,
            None => {
                log::debug!("Reconnecting to {}", self.endpoint.address);
                Connection::open(&self.endpoint)?
            }
        };

        let result = f(&mut conn);
        match &result {
            Ok(_) => *guard = Some(conn),
            Err(e) => log::warn!("Dropping connection to {}: {}", self.endpoint.address, e),
        }
        result
    }

    /// Runs one integer-returning command over keys, e.g. `DEL` or `EXISTS`.
    fn key_count(&self, command: &'static str, keys: &[String]) -> StoreResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut args: Vec<&[u8]> = Vec::with_capacity(keys.len() + 1);
        args.push(command.as_bytes());
        args.extend(keys.iter().map(|k| k.as_bytes()));

        let reply = self.with_connection(|conn| {
            resp::encode_command(&mut conn.write_buf, &args);
            conn.pipeline(1)
        })?;
        match reply.into_iter().next() {
            Some(Frame::Integer(n)) if n >= 0 => Ok(n as u64),
            Some(Frame::Error(msg)) => Err(StoreError::from_reply(&msg)),
            other => Err(unexpected(command, other.as_ref())),
        }
    }
}

impl Store for RemoteStore {
    fn ping(&self) -> StoreResult<()> {
        let reply = self.with_connection(|conn| {
            resp::encode_command(&mut conn.write_buf, &[PING]);
            conn.pipeline(1)
        })?;
        match reply.into_iter().next() {
            Some(Frame::Simple(s)) if s == "PONG" => Ok(()),
            Some(Frame::Error(msg)) => Err(StoreError::from_reply(&msg)),
            other => Err(unexpected("PING", other.as_ref())),
        }
    }

    fn execute(&self, batch: &Batch) -> StoreResult<Vec<bool>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let replies = self.with_connection(|conn| {
            for op in batch.iter() {
                let offset = op.offset().to_string();
                match op {
                    BitOp::Get { key, .. } => resp::encode_command(
                        &mut conn.write_buf,
                        &[GETBIT, key.as_bytes(), offset.as_bytes()],
                    ),
                    BitOp::Set { key, .. } => resp::encode_command(
                        &mut conn.write_buf,
                        &[SETBIT, key.as_bytes(), offset.as_bytes(), ONE],
                    ),
                }
            }
            log::trace!("Pipelining {} bit operations to {}", batch.len(), self.endpoint.address);
            conn.pipeline(batch.len())
        })?;

        // Every reply has been read, so an error reply leaves the
        // connection usable.
        let mut bits = Vec::with_capacity(replies.len());
        let mut first_error = None;
        for (op, reply) in batch.iter().zip(replies) {
            match reply {
                Frame::Integer(0) => bits.push(false),
                Frame::Integer(1) => bits.push(true),
                Frame::Error(msg) => {
                    first_error.get_or_insert_with(|| StoreError::from_reply(&msg));
                    bits.push(false);
                }
                other => {
                    let name = match op {
                        BitOp::Get { .. } => "GETBIT",
                        BitOp::Set { .. } => "SETBIT",
                    };
                    first_error.get_or_insert_with(|| unexpected(name, Some(&other)));
                    bits.push(false);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(bits),
        }
    }

    fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        self.key_count("DEL", keys)
    }

    fn exists(&self, keys: &[String]) -> StoreResult<u64> {
        self.key_count("EXISTS", keys)
    }
}

fn unexpected(command: &str, reply: Option<&Frame>) -> StoreError {
    StoreError::unknown(format!("unexpected reply to {}: {:?}", command, reply))
}
