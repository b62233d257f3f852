//! Connection Tests
//!
//! These tests verify, against real loopback peers:
//! - Connect failures are told apart (resolution, refusal, misuse)
//! - Replies survive fragmentation on the wire
//! - EOF after a reply, error replies and decode faults
//! - Receive and send deadlines, including cumulative waits
//! - Partial writes and shutdown from another thread

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use respwire::network::{ConnectionState, Endpoint};
use respwire::protocol::{encode_command, Decoder, Reply};
use respwire::{Connection, ConnectionConfig, RespError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

/// Accept one connection on a fresh port and run `handler` on it
fn serve<T, F>(handler: F) -> (u16, JoinHandle<T>)
where
    T: Send + 'static,
    F: FnOnce(TcpStream) -> T + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        handler(stream)
    });
    (port, handle)
}

fn connect(port: u16) -> Connection {
    let mut conn = Connection::new();
    conn.connect("127.0.0.1", port, Some(Duration::from_secs(2))).unwrap();
    conn
}

/// Read one framed command from the client side of the test
fn read_request(stream: &mut TcpStream) -> Reply {
    let mut decoder = Decoder::new();
    let mut chunk = [0u8; 512];
    loop {
        if let Some(reply) = decoder.gets().unwrap() {
            return reply;
        }
        let n = stream.read(&mut chunk).unwrap();
        assert!(n > 0, "client closed before sending a full command");
        decoder.feed(&chunk[..n]);
    }
}

fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

// =============================================================================
// Connect Tests
// =============================================================================

#[test]
fn test_connect_wrong_host() {
    let mut conn = Connection::new();
    let err = conn.connect("nonexisting.invalid", 6379, None).unwrap_err();

    assert!(matches!(err, RespError::NameResolution { .. }), "got {:?}", err);
    assert!(!conn.is_connected());
}

#[test]
fn test_connect_refused() {
    let port = unused_port();
    let mut conn = Connection::new();
    let err = conn.connect("127.0.0.1", port, None).unwrap_err();

    assert!(matches!(err, RespError::ConnectionRefused(_)), "got {:?}", err);
    assert_eq!(conn.state(), ConnectionState::Disconnected);
}

#[test]
fn test_failed_connect_is_retryable() {
    let port = unused_port();
    let mut conn = Connection::new();
    assert!(conn.connect("127.0.0.1", port, None).is_err());

    let (port, server) = serve(|_stream| ());
    conn.connect("127.0.0.1", port, None).unwrap();
    assert!(conn.is_connected());
    server.join().unwrap();
}

#[test]
fn test_connect_zero_timeout_rejected() {
    let mut conn = Connection::new();
    let err = conn.connect("127.0.0.1", 6379, Some(Duration::ZERO)).unwrap_err();
    assert!(matches!(err, RespError::InvalidTimeout(_)));
}

#[test]
fn test_connected_tcp() {
    let (port, server) = serve(|_stream| ());
    let mut conn = Connection::new();
    assert!(!conn.is_connected());

    conn.connect("127.0.0.1", port, None).unwrap();
    assert!(conn.is_connected());

    conn.disconnect();
    assert!(!conn.is_connected());
    server.join().unwrap();
}

#[test]
fn test_disconnect_is_idempotent() {
    let mut conn = Connection::new();
    conn.disconnect();
    conn.disconnect();
    assert_eq!(conn.state(), ConnectionState::Disconnected);
}

#[cfg(unix)]
#[test]
fn test_connected_tcp_has_fileno() {
    let (port, server) = serve(|_stream| ());
    let conn = connect(port);
    assert!(conn.file_descriptor().unwrap() > 2);
    server.join().unwrap();
}

#[cfg(unix)]
#[test]
fn test_connect_unix() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("respwire.sock");
    let listener = UnixListener::bind(&path).unwrap();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut request = [0u8; 14];
        stream.read_exact(&mut request).unwrap();
        assert_eq!(&request, b"*1\r\n$4\r\nPING\r\n");
        stream.write_all(b"+PONG\r\n").unwrap();
    });

    let mut conn = Connection::new();
    conn.connect_unix(&path, None).unwrap();
    assert!(conn.is_connected());
    assert!(conn.file_descriptor().unwrap() > 2);

    conn.write(&["PING"]).unwrap();
    assert_eq!(conn.read().unwrap(), Reply::Status("PONG".to_string()));

    conn.disconnect();
    assert!(!conn.is_connected());
    server.join().unwrap();
}

#[test]
fn test_connect_endpoint() {
    let (port, server) = serve(|_stream| ());
    let endpoint: Endpoint = format!("127.0.0.1:{}", port).parse().unwrap();

    let mut conn = Connection::new();
    conn.connect_endpoint(&endpoint, None).unwrap();
    assert!(conn.is_connected());
    server.join().unwrap();
}

// =============================================================================
// Usage Tests
// =============================================================================

#[cfg(unix)]
#[test]
fn test_fileno_when_disconnected() {
    let conn = Connection::new();
    assert!(matches!(conn.file_descriptor(), Err(RespError::NotConnected)));
}

#[test]
fn test_set_timeout_when_disconnected() {
    let mut conn = Connection::new();
    let err = conn.set_timeout(10_000).unwrap_err();
    assert!(matches!(err, RespError::NotConnected));
    assert!(err.is_usage());
}

#[test]
fn test_wrong_value_for_timeout() {
    let (port, server) = serve(|_stream| ());
    let mut conn = connect(port);

    let err = conn.set_timeout(-10).unwrap_err();
    assert!(matches!(err, RespError::InvalidTimeout(_)));

    conn.set_timeout(0).unwrap();
    assert_eq!(conn.timeout(), None);
    conn.set_timeout(250_000).unwrap();
    assert_eq!(conn.timeout(), Some(Duration::from_millis(250)));
    server.join().unwrap();
}

#[test]
fn test_read_when_disconnected() {
    let mut conn = Connection::new();
    assert!(matches!(conn.read(), Err(RespError::NotConnected)));
    assert!(matches!(conn.write(&["PING"]), Err(RespError::NotConnected)));
    assert!(matches!(conn.flush(), Err(RespError::NotConnected)));
}

// =============================================================================
// Read Tests
// =============================================================================

#[test]
fn test_write_and_read() {
    let (port, server) = serve(|mut stream| {
        let request = read_request(&mut stream);
        stream.write_all(b"$5\r\nvalue\r\n").unwrap();
        request
    });

    let mut conn = connect(port);
    conn.write(&["GET", "key"]).unwrap();
    assert_eq!(conn.read().unwrap(), Reply::bulk("value"));

    let request = server.join().unwrap();
    assert_eq!(
        request,
        Reply::Array(Some(vec![Reply::bulk("GET"), Reply::bulk("key")]))
    );
}

#[test]
fn test_pipelined_commands() {
    let (port, server) = serve(|mut stream| {
        read_request(&mut stream);
        read_request(&mut stream);
        stream.write_all(b"+OK\r\n:2\r\n").unwrap();
    });

    let mut conn = connect(port);
    conn.write(&["SET", "a", "1"]).unwrap();
    conn.write(&["INCR", "a"]).unwrap();
    assert_eq!(conn.read().unwrap(), Reply::Status("OK".to_string()));
    assert_eq!(conn.read().unwrap(), Reply::Integer(2));
    server.join().unwrap();
}

#[test]
fn test_read_fragmented_reply() {
    let (port, server) = serve(|mut stream| {
        let reply = b"*2\r\n*2\r\n$5\r\nhello\r\n$5\r\nworld\r\n$1\r\n!\r\n";
        for piece in reply.chunks(3) {
            stream.write_all(piece).unwrap();
            stream.flush().unwrap();
            thread::sleep(Duration::from_millis(2));
        }
    });

    let mut conn = connect(port);
    conn.set_timeout(2_000_000).unwrap();
    assert_eq!(
        conn.read().unwrap(),
        Reply::Array(Some(vec![
            Reply::Array(Some(vec![Reply::bulk("hello"), Reply::bulk("world")])),
            Reply::bulk("!"),
        ]))
    );
    server.join().unwrap();
}

#[test]
fn test_read_against_eof() {
    let (port, server) = serve(|mut stream| {
        read_request(&mut stream);
        stream.write_all(b"+OK\r\n").unwrap();
        // Dropping the stream closes it
    });

    let mut conn = connect(port);
    conn.set_timeout(2_000_000).unwrap();
    conn.write(&["QUIT"]).unwrap();

    assert_eq!(conn.read().unwrap(), Reply::Status("OK".to_string()));

    let err = conn.read().unwrap_err();
    assert!(matches!(err, RespError::ConnectionReset), "got {:?}", err);
    assert!(err.requires_reconnect());
    assert!(!conn.is_connected());
    server.join().unwrap();
}

#[test]
fn test_raise_on_error_reply() {
    let (port, server) = serve(|mut stream| {
        read_request(&mut stream);
        stream.write_all(b"-ERR wrong number of arguments\r\n").unwrap();
        read_request(&mut stream);
        stream.write_all(b"+PONG\r\n").unwrap();
    });

    let mut conn = connect(port);
    conn.write(&["GET"]).unwrap();

    match conn.read() {
        Err(RespError::ErrorReply(message)) => {
            assert!(message.contains("wrong number of arguments"))
        }
        other => panic!("expected error reply, got {:?}", other),
    }

    // An error reply is not a transport fault
    assert!(conn.is_connected());
    conn.write(&["PING"]).unwrap();
    assert_eq!(conn.read().unwrap(), Reply::Status("PONG".to_string()));
    server.join().unwrap();
}

#[test]
fn test_nested_error_reply_is_a_value() {
    let (port, server) = serve(|mut stream| {
        read_request(&mut stream);
        stream.write_all(b"*2\r\n-err0\r\n-err1\r\n").unwrap();
    });

    let mut conn = connect(port);
    conn.write(&["EXEC"]).unwrap();
    let reply = conn.read().unwrap();
    assert_eq!(
        reply,
        Reply::Array(Some(vec![
            Reply::Error("err0".to_string()),
            Reply::Error("err1".to_string()),
        ]))
    );
    server.join().unwrap();
}

#[test]
fn test_protocol_fault_drops_connection() {
    let (port, server) = serve(|mut stream| {
        read_request(&mut stream);
        stream.write_all(b"?garbage\r\n").unwrap();
    });

    let mut conn = connect(port);
    conn.write(&["PING"]).unwrap();

    let err = conn.read().unwrap_err();
    assert!(matches!(err, RespError::Protocol(_)), "got {:?}", err);
    assert!(!err.is_transport());
    assert!(!conn.is_connected());
    server.join().unwrap();
}

// =============================================================================
// Timeout Tests
// =============================================================================

#[test]
fn test_read_against_timeout() {
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let (port, server) = serve(move |_stream| {
        let _ = done_rx.recv();
    });

    let mut conn = connect(port);
    conn.set_timeout(10_000).unwrap();

    let started = Instant::now();
    let err = conn.read().unwrap_err();
    assert!(matches!(err, RespError::ReceiveTimeout), "got {:?}", err);
    assert!(err.is_timeout());
    assert!(started.elapsed() >= Duration::from_millis(10));

    // A timeout does not tear the connection down
    assert!(conn.is_connected());

    done_tx.send(()).unwrap();
    server.join().unwrap();
}

#[test]
fn test_timeout_keeps_partial_reply() {
    let (go_tx, go_rx) = mpsc::channel::<()>();
    let (port, server) = serve(move |mut stream| {
        stream.write_all(b"$5\r\nhel").unwrap();
        go_rx.recv().unwrap();
        stream.write_all(b"lo\r\n").unwrap();
    });

    let mut conn = connect(port);
    conn.set_timeout(20_000).unwrap();
    assert!(matches!(conn.read(), Err(RespError::ReceiveTimeout)));

    go_tx.send(()).unwrap();
    conn.set_timeout(2_000_000).unwrap();
    assert_eq!(conn.read().unwrap(), Reply::bulk("hello"));
    server.join().unwrap();
}

#[test]
fn test_cumulative_wait_exceeds_timeout() {
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let (port, server) = serve(move |mut stream| {
        // One byte every 5ms: each wait is short, the whole reply is not
        let reply = format!("+{}\r\n", "x".repeat(200));
        for byte in reply.as_bytes() {
            if done_rx.try_recv().is_ok() || stream.write_all(&[*byte]).is_err() {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        let _ = done_rx.recv();
    });

    let mut conn = connect(port);
    conn.set_timeout(50_000).unwrap();

    let started = Instant::now();
    let err = conn.read().unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, RespError::ReceiveTimeout), "got {:?}", err);
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_millis(900), "waited {:?}", elapsed);

    done_tx.send(()).unwrap();
    server.join().unwrap();
}

#[test]
fn test_flush_and_receive_share_one_timeout() {
    let (port, server) = serve(|mut stream| {
        // Drain late, never reply
        thread::sleep(Duration::from_millis(150));
        let mut received = Vec::new();
        let _ = stream.read_to_end(&mut received);
    });

    let mut conn = connect(port);
    conn.set_timeout(200_000).unwrap();
    let payload = vec![b'x'; 32 * 1024 * 1024];
    conn.write(&[&payload[..]]).unwrap();

    let started = Instant::now();
    let err = conn.read().unwrap_err();
    let elapsed = started.elapsed();

    assert!(err.is_timeout(), "got {:?}", err);
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_millis(350), "waited {:?}", elapsed);

    conn.disconnect();
    server.join().unwrap();
}

#[cfg(unix)]
#[test]
fn test_huge_timeout_means_no_deadline() {
    let (client, mut server) = UnixStream::pair().unwrap();
    let config = ConnectionConfig::builder().timeout(Duration::MAX).build();
    let mut conn = Connection::from_transport(Box::new(client), config);

    conn.write(&["PING"]).unwrap();
    conn.flush().unwrap();
    let mut request = [0u8; 14];
    server.read_exact(&mut request).unwrap();

    server.write_all(b"+PONG\r\n").unwrap();
    assert_eq!(conn.read().unwrap(), Reply::Status("PONG".to_string()));
}

#[test]
fn test_reads_without_spurious_timeouts() {
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let (port, server) = serve(move |mut stream| {
        while done_rx.try_recv().is_err() {
            if stream.write_all(b"+ok\r\n").is_err() {
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
    });

    let mut conn = connect(port);
    conn.set_timeout(250_000).unwrap();

    let started = Instant::now();
    while started.elapsed() < Duration::from_millis(100) {
        assert_eq!(conn.read().unwrap(), Reply::Status("ok".to_string()));
    }

    done_tx.send(()).unwrap();
    conn.disconnect();
    server.join().unwrap();
}

#[test]
fn test_send_timeout_when_peer_does_not_read() {
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let (port, server) = serve(move |_stream| {
        let _ = done_rx.recv();
    });

    let mut conn = connect(port);
    conn.set_timeout(200_000).unwrap();

    // Far more than both socket buffers together can hold
    let payload = vec![b'x'; 64 * 1024 * 1024];
    conn.write(&[&payload[..]]).unwrap();

    let started = Instant::now();
    let err = conn.flush().unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, RespError::SendTimeout), "got {:?}", err);
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_secs(5), "waited {:?}", elapsed);
    assert!(conn.pending_output() > 0);
    assert!(conn.is_connected());

    done_tx.send(()).unwrap();
    conn.disconnect();
    server.join().unwrap();
}

// =============================================================================
// Write Tests
// =============================================================================

#[test]
fn test_recover_from_partial_write() {
    let (port, server) = serve(|mut stream| {
        let mut received = Vec::new();
        stream.read_to_end(&mut received).unwrap();
        received
    });

    let payload = "x".repeat(4 * 1024 * 1024);
    let mut conn = connect(port);
    conn.set_timeout(5_000_000).unwrap();
    conn.write(&[payload.as_str()]).unwrap();
    conn.flush().unwrap();
    assert_eq!(conn.pending_output(), 0);
    conn.disconnect();

    let received = server.join().unwrap();
    assert_eq!(received, encode_command(&[payload.as_str()]).to_vec());
}

#[test]
fn test_write_followed_by_remote_drain() {
    let (port, server) = serve(|mut stream| {
        thread::sleep(Duration::from_millis(50));
        let mut received = Vec::new();
        stream.read_to_end(&mut received).unwrap();
        received.len()
    });

    let first = vec![b'a'; 8 * 1024 * 1024];
    let second = vec![b'b'; 8 * 1024 * 1024];
    let mut conn = connect(port);
    conn.set_timeout(5_000_000).unwrap();
    conn.write(&[&first[..]]).unwrap();
    conn.write(&[&second[..]]).unwrap();
    let expected = conn.pending_output();
    conn.flush().unwrap();
    conn.disconnect();

    assert_eq!(server.join().unwrap(), expected);
}

// =============================================================================
// Shutdown Tests
// =============================================================================

#[test]
fn test_shutdown_from_other_thread_unblocks_read() {
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let (port, server) = serve(move |_stream| {
        let _ = done_rx.recv();
    });

    let mut conn = connect(port);
    let handle = conn.shutdown_handle().unwrap();
    let closer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        handle.shutdown().unwrap();
    });

    // No timeout: only the shutdown can end this read
    let err = conn.read().unwrap_err();
    assert!(matches!(err, RespError::ConnectionReset), "got {:?}", err);

    closer.join().unwrap();
    done_tx.send(()).unwrap();
    server.join().unwrap();
}

// =============================================================================
// Transport Tests
// =============================================================================

#[cfg(unix)]
#[test]
fn test_custom_transport() {
    let (client, mut server) = UnixStream::pair().unwrap();
    let mut conn = Connection::from_transport(Box::new(client), ConnectionConfig::default());
    assert!(conn.is_connected());

    conn.write(&["PING"]).unwrap();
    conn.flush().unwrap();

    let mut request = [0u8; 14];
    server.read_exact(&mut request).unwrap();
    assert_eq!(&request, b"*1\r\n$4\r\nPING\r\n");

    server.write_all(b"+PONG\r\n").unwrap();
    assert_eq!(conn.read().unwrap(), Reply::Status("PONG".to_string()));
}

#[cfg(unix)]
#[test]
fn test_small_read_chunks() {
    let (client, mut server) = UnixStream::pair().unwrap();
    let config = ConnectionConfig::builder().read_chunk_size(1).build();
    let mut conn = Connection::from_transport(Box::new(client), config);

    server.write_all(b"*3\r\n:1\r\n$-1\r\n+three\r\n").unwrap();
    assert_eq!(
        conn.read().unwrap(),
        Reply::Array(Some(vec![
            Reply::Integer(1),
            Reply::Bulk(None),
            Reply::Status("three".to_string()),
        ]))
    );
    assert_eq!(conn.decoder().buffered(), 0);
}

// =============================================================================
// Endpoint Tests
// =============================================================================

#[test]
fn test_endpoint_parsing() {
    assert_eq!("localhost:6380".parse::<Endpoint>().unwrap(), Endpoint::tcp("localhost", 6380));
    assert_eq!("localhost".parse::<Endpoint>().unwrap(), Endpoint::tcp("localhost", 6379));
    assert_eq!("[::1]:7000".parse::<Endpoint>().unwrap(), Endpoint::tcp("::1", 7000));
    assert!("localhost:port".parse::<Endpoint>().is_err());
    assert!("".parse::<Endpoint>().is_err());
}

#[cfg(unix)]
#[test]
fn test_endpoint_unix_path() {
    let endpoint: Endpoint = "/tmp/redis.sock".parse().unwrap();
    assert_eq!(endpoint, Endpoint::unix("/tmp/redis.sock"));
    assert_eq!(endpoint.to_string(), "/tmp/redis.sock");
}
