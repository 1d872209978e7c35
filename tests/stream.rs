use std::thread;
use std::time::{Duration, Instant};

use netwait::{
    DatagramSocket, Error, Ipv4, Shutdown, SocketAddrV4, StreamSocket, Unix, UnixAddr,
};

fn loopback_listener() -> (StreamSocket<Ipv4>, SocketAddrV4) {
    let mut listener = StreamSocket::<Ipv4>::new().unwrap();
    listener.bind(&SocketAddrV4::new([127, 0, 0, 1], 0)).unwrap();
    listener.listen(16).unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

#[test]
fn init_is_idempotent() {
    netwait::init();
    netwait::init();
}

#[test]
fn round_trip_preserves_every_byte() {
    let (mut listener, addr) = loopback_listener();
    let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
    let expected = payload.clone();

    let server = thread::spawn(move || {
        let mut peer = listener.accept().unwrap();
        let sent = peer.write(&payload).unwrap();
        assert_eq!(sent, payload.len());
    });

    let mut client = StreamSocket::<Ipv4>::new().unwrap();
    client.set_timeout(5.0).unwrap();
    client.connect(&addr).unwrap();
    let got = client.read_exact(expected.len()).unwrap();
    assert_eq!(got, expected);

    server.join().unwrap();
}

#[test]
fn read_exact_times_out_with_partial_data() {
    let (mut listener, addr) = loopback_listener();

    let server = thread::spawn(move || {
        let mut peer = listener.accept().unwrap();
        peer.write(b"hello").unwrap();
        // Hold the connection open until the client goes away.
        let err = peer.read_exact(1).unwrap_err();
        assert!(matches!(err.error, Error::Closed));
    });

    let mut client = StreamSocket::<Ipv4>::new().unwrap();
    client.set_timeout(5.0).unwrap();
    client.connect(&addr).unwrap();
    client.set_timeout(0.25).unwrap();

    let start = Instant::now();
    let err = client.read_exact(10).unwrap_err();
    assert!(matches!(err.error, Error::Timeout));
    assert_eq!(err.partial, b"hello");
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(150));
    assert!(elapsed < Duration::from_secs(5));

    client.close().unwrap();
    server.join().unwrap();
}

#[test]
fn zero_byte_read_succeeds_without_waiting() {
    let (mut listener, addr) = loopback_listener();

    let server = thread::spawn(move || {
        let mut peer = listener.accept().unwrap();
        let err = peer.read_exact(1).unwrap_err();
        assert!(matches!(err.error, Error::Closed));
    });

    let mut client = StreamSocket::<Ipv4>::new().unwrap();
    client.connect(&addr).unwrap();
    // Blocking mode: anything that waited here would hang the test.
    assert_eq!(client.read_exact(0).unwrap(), b"");

    client.close().unwrap();
    server.join().unwrap();
}

#[test]
fn read_until_resumes_across_split_delimiter() {
    let (mut listener, addr) = loopback_listener();

    let server = thread::spawn(move || {
        let mut peer = listener.accept().unwrap();
        peer.write(b"GET / HTTP/1.1\r").unwrap();
        thread::sleep(Duration::from_millis(150));
        peer.write(b"\n rest").unwrap();
        let err = peer.read_exact(1).unwrap_err();
        assert!(matches!(err.error, Error::Closed));
    });

    let mut client = StreamSocket::<Ipv4>::new().unwrap();
    client.set_timeout(5.0).unwrap();
    client.connect(&addr).unwrap();

    let mut scanner = client.read_until(b"\r\n".to_vec(), false).unwrap();
    let line = scanner.next_chunk().unwrap();
    assert_eq!(line, b"GET / HTTP/1.1");
    drop(scanner);

    // The delimiter was consumed; the tail is still buffered.
    assert_eq!(client.read_exact(5).unwrap(), b" rest");

    client.close().unwrap();
    server.join().unwrap();
}

#[test]
fn read_until_inclusive_keeps_the_delimiter() {
    let (mut listener, addr) = loopback_listener();

    let server = thread::spawn(move || {
        let mut peer = listener.accept().unwrap();
        peer.write(b"alpha\nbeta\n").unwrap();
        let err = peer.read_exact(1).unwrap_err();
        assert!(matches!(err.error, Error::Closed));
    });

    let mut client = StreamSocket::<Ipv4>::new().unwrap();
    client.set_timeout(5.0).unwrap();
    client.connect(&addr).unwrap();

    let mut scanner = client.read_until(b"\n".to_vec(), true).unwrap();
    assert_eq!(scanner.next_chunk().unwrap(), b"alpha\n");
    assert_eq!(scanner.next_chunk().unwrap(), b"beta\n");
    drop(scanner);

    client.close().unwrap();
    server.join().unwrap();
}

#[test]
fn read_until_reports_partial_on_peer_close_then_fuses() {
    let (mut listener, addr) = loopback_listener();

    let server = thread::spawn(move || {
        let mut peer = listener.accept().unwrap();
        peer.write(b"no newline").unwrap();
        peer.close().unwrap();
    });

    let mut client = StreamSocket::<Ipv4>::new().unwrap();
    client.set_timeout(5.0).unwrap();
    client.connect(&addr).unwrap();

    let mut scanner = client.read_until(b"\n".to_vec(), false).unwrap();
    let err = match scanner.next().unwrap() {
        Err(err) => err,
        Ok(chunk) => panic!("expected terminal error, got chunk {:?}", chunk),
    };
    assert!(matches!(err.error, Error::Closed));
    assert_eq!(err.partial, b"no newline");
    assert!(scanner.next().is_none());

    server.join().unwrap();
}

#[test]
fn empty_delimiter_is_rejected() {
    let mut sock = StreamSocket::<Ipv4>::new().unwrap();
    let err = sock.read_until(Vec::new(), false).unwrap_err();
    assert!(matches!(err, Error::Invalid { .. }));
}

#[test]
fn accept_times_out_after_roughly_the_configured_delay() {
    let (mut listener, _addr) = loopback_listener();
    listener.set_timeout(0.3).unwrap();

    let start = Instant::now();
    let err = listener.accept().unwrap_err();
    assert!(matches!(err, Error::Timeout));
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_secs(5));
}

#[test]
fn failed_connect_invalidates_the_socket() {
    // Grab a loopback port with no listener behind it.
    let (mut listener, addr) = loopback_listener();
    listener.close().unwrap();

    let mut client = StreamSocket::<Ipv4>::new().unwrap();
    client.set_timeout(1.0).unwrap();
    assert!(client.connect(&addr).is_err());

    // The failure path must have closed the descriptor; every later
    // operation reports the closed state instead of hanging or crashing.
    assert_eq!(client.as_raw_fd(), -1);
    assert!(matches!(client.write(b"x").unwrap_err(), Error::Closed));
    assert!(matches!(client.accept().unwrap_err(), Error::Closed));
    let err = client.read_exact(1).unwrap_err();
    assert!(matches!(err.error, Error::Closed));
}

#[test]
fn connect_to_unroutable_address_respects_the_deadline() {
    let mut client = StreamSocket::<Ipv4>::new().unwrap();
    client.set_timeout(0.05).unwrap();

    let start = Instant::now();
    let err = client
        .connect(&SocketAddrV4::new([10, 255, 255, 1], 9))
        .unwrap_err();
    // Routes that blackhole time out at the deadline; routes that reject
    // fail at once. The handle is invalid either way.
    assert!(matches!(err, Error::Timeout | Error::Connect { .. }));
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(client.as_raw_fd(), -1);
    assert!(matches!(client.write(b"x").unwrap_err(), Error::Closed));
}

#[test]
fn write_to_closed_peer_fails() {
    let (mut listener, addr) = loopback_listener();

    let server = thread::spawn(move || {
        let mut peer = listener.accept().unwrap();
        peer.close().unwrap();
    });

    let mut client = StreamSocket::<Ipv4>::new().unwrap();
    client.set_timeout(2.0).unwrap();
    client.connect(&addr).unwrap();
    server.join().unwrap();

    // The first write may still land in flight; keep pushing until the
    // reset surfaces.
    let chunk = vec![0u8; 65536];
    let mut failed = None;
    for _ in 0..50 {
        match client.write(&chunk) {
            Ok(_) => thread::sleep(Duration::from_millis(20)),
            Err(err) => {
                failed = Some(err);
                break;
            }
        }
    }
    let err = failed.expect("write kept succeeding against a closed peer");
    assert!(matches!(err, Error::Closed | Error::Send { .. }));
}

#[test]
fn shutdown_write_signals_eof_but_keeps_the_read_half() {
    let (mut listener, addr) = loopback_listener();

    let server = thread::spawn(move || {
        let mut peer = listener.accept().unwrap();
        let err = peer.read_exact(1).unwrap_err();
        assert!(matches!(err.error, Error::Closed));
        assert_eq!(err.partial, b"");
        peer.write(b"bye").unwrap();
    });

    let mut client = StreamSocket::<Ipv4>::new().unwrap();
    client.set_timeout(5.0).unwrap();
    client.connect(&addr).unwrap();
    client.shutdown(Shutdown::Write).unwrap();

    assert_eq!(client.read_exact(3).unwrap(), b"bye");
    server.join().unwrap();
}

#[test]
fn unix_domain_round_trip() {
    let path = format!("/tmp/netwait-test-{}.sock", std::process::id());
    let _ = std::fs::remove_file(&path);

    let mut listener = StreamSocket::<Unix>::new().unwrap();
    listener.bind(&UnixAddr::new(path.as_bytes())).unwrap();
    listener.listen(4).unwrap();

    let server = thread::spawn(move || {
        let mut peer = listener.accept().unwrap();
        peer.write(b"hello").unwrap();
    });

    let mut client = StreamSocket::<Unix>::new().unwrap();
    client.set_timeout(5.0).unwrap();
    client.connect(&UnixAddr::new(path.as_bytes())).unwrap();
    assert_eq!(client.read_exact(5).unwrap(), b"hello");

    server.join().unwrap();
    let _ = std::fs::remove_file(&path);
}

#[test]
fn datagram_round_trip_and_recv_timeout() {
    let mut receiver = DatagramSocket::<Ipv4>::new().unwrap();
    receiver.bind(&SocketAddrV4::new([127, 0, 0, 1], 0)).unwrap();
    let addr = receiver.local_addr().unwrap();

    let mut sender = DatagramSocket::<Ipv4>::new().unwrap();
    sender.set_timeout(2.0).unwrap();
    assert_eq!(sender.send_to(b"ping", &addr).unwrap(), 4);

    receiver.set_timeout(2.0).unwrap();
    let (data, from) = receiver.recv_from(64).unwrap();
    assert_eq!(data, b"ping");
    assert_eq!(from.ip(), [127, 0, 0, 1]);

    receiver.set_timeout(0.2).unwrap();
    let start = Instant::now();
    let err = receiver.recv(64).unwrap_err();
    assert!(matches!(err, Error::Timeout));
    assert!(start.elapsed() >= Duration::from_millis(120));
}

#[test]
fn connected_datagram_send_and_recv() {
    let mut receiver = DatagramSocket::<Ipv4>::new().unwrap();
    receiver.bind(&SocketAddrV4::new([127, 0, 0, 1], 0)).unwrap();
    receiver.set_timeout(2.0).unwrap();
    let addr = receiver.local_addr().unwrap();

    let mut sender = DatagramSocket::<Ipv4>::new().unwrap();
    sender.set_timeout(2.0).unwrap();
    sender.connect(&addr).unwrap();
    assert_eq!(sender.send(b"pong").unwrap(), 4);

    assert_eq!(receiver.recv(64).unwrap(), b"pong");
}

#[test]
fn close_is_idempotent() {
    let mut sock = StreamSocket::<Ipv4>::new().unwrap();
    sock.close().unwrap();
    sock.close().unwrap();
    assert_eq!(sock.as_raw_fd(), -1);
}
