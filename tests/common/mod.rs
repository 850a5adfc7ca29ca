// Shared helpers for redbloom integration tests
#![allow(dead_code)]

use bytes::BytesMut;
use rand::Rng;
use redbloom::store::resp::Frame;
use redbloom::{BloomFilter, MemoryStore, Options, Store, StoreError};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

pub const KEY: &str = "ibloomTesting";
pub const CAPACITY: u64 = 10_000;
pub const ERROR_RATE: f64 = 0.1;

/// Random lowercase strings.
pub fn sample_strings(length: usize, count: usize) -> Vec<String> {
    let mut rng = rand::rng();
    (0..count)
        .map(|_| (0..length).map(|_| rng.random_range(b'a'..=b'z') as char).collect())
        .collect()
}

/// A filter over a fresh in-memory store with one large shard.
pub fn memory_filter(store: &MemoryStore) -> BloomFilter<MemoryStore> {
    BloomFilter::with_store(
        KEY,
        CAPACITY,
        ERROR_RATE,
        redbloom::config::DEFAULT_MAX_SHARD_BITS,
        store.clone(),
    )
    .unwrap()
}

/// A RESP server on a loopback port, backed by a [`MemoryStore`].
///
/// Understands PING, SELECT, GETBIT, SETBIT, DEL, EXISTS and HSET.
pub struct TestServer {
    addr: SocketAddr,
    store: MemoryStore,
}

impl TestServer {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let store = MemoryStore::new();

        let shared = store.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let store = shared.clone();
                thread::spawn(move || serve(stream, store));
            }
        });

        Self { addr, store }
    }

    pub fn options(&self) -> Options {
        Options::default()
            .host("127.0.0.1")
            .port(self.addr.port())
            .io_timeout(Some(Duration::from_secs(10)))
    }

    /// Namespace 0 of the data the server holds.
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

/// Options for a port nobody listens on.
pub fn unreachable_options() -> Options {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    Options::default().host("127.0.0.1").port(port)
}

/// Options for a server that accepts connections but never answers.
pub fn silent_server_options(io_timeout: Duration) -> Options {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    thread::spawn(move || {
        let mut held = Vec::new();
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => held.push(stream),
                Err(_) => break,
            }
        }
    });
    Options::default().host("127.0.0.1").port(port).io_timeout(Some(io_timeout))
}

fn serve(stream: TcpStream, root: MemoryStore) {
    // Replies go out on their own thread so a client that writes a long
    // pipeline before reading never blocks us.
    let (tx, rx) = mpsc::channel::<BytesMut>();
    let Ok(mut writer) = stream.try_clone() else { return };
    let writer_thread = thread::spawn(move || {
        for buf in rx {
            if writer.write_all(&buf).is_err() {
                break;
            }
        }
    });

    let mut reader = stream;
    let mut db = root.clone();
    let mut input = BytesMut::new();
    let mut chunk = [0u8; 16 * 1024];
    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        input.extend_from_slice(&chunk[..n]);

        let mut out = BytesMut::new();
        while let Ok(Some(frame)) = Frame::decode(&mut input) {
            dispatch(&mut db, &root, frame).encode(&mut out);
        }
        if !out.is_empty() && tx.send(out).is_err() {
            break;
        }
    }

    drop(tx);
    let _ = writer_thread.join();
}

fn dispatch(db: &mut MemoryStore, root: &MemoryStore, frame: Frame) -> Frame {
    let args: Vec<String> = match frame {
        Frame::Array(items) => items
            .iter()
            .filter_map(|f| f.as_bytes())
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .collect(),
        _ => return Frame::Error("ERR protocol error".to_string()),
    };
    let Some((command, rest)) = args.split_first() else {
        return Frame::Error("ERR empty command".to_string());
    };

    match (command.to_ascii_uppercase().as_str(), rest) {
        ("PING", []) => Frame::Simple("PONG".to_string()),
        ("SELECT", [index]) => match index.parse() {
            Ok(index) => {
                *db = root.namespace(index);
                Frame::Simple("OK".to_string())
            }
            Err(_) => Frame::Error("ERR invalid DB index".to_string()),
        },
        ("GETBIT", [key, offset]) => match offset.parse() {
            Ok(offset) => bit_reply(db.get_bit(key, offset)),
            Err(_) => bad_offset(),
        },
        ("SETBIT", [key, offset, value]) if value == "1" => match offset.parse() {
            Ok(offset) => bit_reply(db.set_bit(key, offset)),
            Err(_) => bad_offset(),
        },
        ("DEL", keys) if !keys.is_empty() => count_reply(db.delete(keys)),
        ("EXISTS", keys) if !keys.is_empty() => count_reply(db.exists(keys)),
        ("HSET", [key, field, value]) => match db.hset(key, field, value.as_bytes()) {
            Ok(new) => Frame::Integer(new as i64),
            Err(e) => Frame::Error(e.detail),
        },
        (other, _) => Frame::Error(format!("ERR unknown command '{}'", other)),
    }
}

fn bit_reply(result: Result<bool, StoreError>) -> Frame {
    match result {
        Ok(bit) => Frame::Integer(bit as i64),
        Err(e) => Frame::Error(e.detail),
    }
}

fn count_reply(result: Result<u64, StoreError>) -> Frame {
    match result {
        Ok(n) => Frame::Integer(n as i64),
        Err(e) => Frame::Error(e.detail),
    }
}

fn bad_offset() -> Frame {
    Frame::Error("ERR bit offset is not an integer or out of range".to_string())
}
