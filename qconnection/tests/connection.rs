use std::{io, sync::OnceLock, time::Duration};

use qbase::{
    config::Config,
    error::ErrorKind,
    role::Role,
    sid::{Dir, StreamId},
    varint::VarInt,
};
use qconnection::{
    Connection, ConnectionError, PlainCrypto,
    pipe::{self, LinkConditions},
};
use qrecovery::streams::StreamError;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    time::{self, Instant},
};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn connect_with(
    conditions: LinkConditions,
    client_config: Config,
    server_config: Config,
) -> (Connection, Connection) {
    init_tracing();
    let (client_end, server_end) = pipe::pair(conditions);
    let client = Connection::new_client(client_config.clone())
        .run(PlainCrypto::new(server_config.parameters()), client_end);
    let server = Connection::new_server(server_config)
        .run(PlainCrypto::new(client_config.parameters()), server_end);
    (client, server)
}

async fn connect(conditions: LinkConditions) -> (Connection, Connection) {
    let (client, server) = connect_with(conditions, Config::default(), Config::default());
    client.handshake_complete().await.unwrap();
    server.handshake_complete().await.unwrap();
    (client, server)
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[tokio::test(start_paused = true)]
async fn test_handshake_and_echo() {
    let (client, server) = connect(LinkConditions::perfect()).await;
    assert_eq!(client.role(), Role::Client);
    assert_eq!(server.role(), Role::Server);

    let echo = tokio::spawn(async move {
        let mut stream = server.accept_bi_stream().await.unwrap();
        let mut request = Vec::new();
        stream.reader().read_to_end(&mut request).await.unwrap();
        stream.write_all(&request).await.unwrap();
        stream.finish().unwrap();
        server
    });

    let mut stream = client.open_bi_stream().unwrap();
    assert_eq!(stream.stream_id(), StreamId::new(Role::Client, Dir::Bi, 0));
    stream.write_all(b"hello").await.unwrap();
    stream.finish().unwrap();
    let mut response = Vec::new();
    stream.reader().read_to_end(&mut response).await.unwrap();
    assert_eq!(response, b"hello");

    let _server = echo.await.unwrap();
    assert!(client.stats().smoothed_rtt < Duration::from_millis(333));
}

#[tokio::test(start_paused = true)]
async fn test_transfer_over_lossy_link() {
    let conditions = LinkConditions {
        loss: 0.1,
        duplicate: 0.05,
        reorder: 0.1,
        seed: 7,
    };
    let (client, server) = connect(conditions).await;
    let data = pattern(200_000);

    let sent = data.clone();
    let sender = tokio::spawn(async move {
        let mut writer = client.open_uni_stream().unwrap();
        writer.write_all(&sent).await.unwrap();
        writer.shutdown().await.unwrap();
        client
    });
    let mut reader = server.accept_uni_stream().await.unwrap();
    let mut received = Vec::new();
    reader.read_to_end(&mut received).await.unwrap();
    assert_eq!(received.len(), data.len());
    assert!(received == data);

    let client = sender.await.unwrap();
    assert!(client.is_active());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_streams() {
    let (client, server) = connect(LinkConditions::lossy(0.05, 11)).await;

    let receiver = tokio::spawn(async move {
        let mut streams = Vec::new();
        for _ in 0..8 {
            let mut reader = server.accept_uni_stream().await.unwrap();
            streams.push(tokio::spawn(async move {
                let mut data = Vec::new();
                reader.read_to_end(&mut data).await.unwrap();
                data
            }));
        }
        let received = futures::future::join_all(streams).await;
        (server, received)
    });

    let writers = (0..8usize).map(|i| {
        let mut writer = client.open_uni_stream().unwrap();
        async move {
            writer.write_all(&pattern(10_000 + i)).await.unwrap();
            writer.finish().unwrap();
        }
    });
    futures::future::join_all(writers.collect::<Vec<_>>()).await;

    let (_server, received) = receiver.await.unwrap();
    let mut lengths = received
        .into_iter()
        .map(|data| data.unwrap().len())
        .collect::<Vec<_>>();
    lengths.sort_unstable();
    assert_eq!(lengths, (10_000..10_008).collect::<Vec<_>>());
}

#[tokio::test(start_paused = true)]
async fn test_open_waits_for_stream_limit() {
    let server_config = Config::builder()
        .initial_max_streams_bidi(1u64)
        .build()
        .unwrap();
    let (client, server) = connect_with(LinkConditions::perfect(), Config::default(), server_config);
    client.handshake_complete().await.unwrap();

    let mut first = client.open_bi_stream().unwrap();
    assert!(matches!(
        client.open_bi_stream(),
        Err(StreamError::TooManyStreams)
    ));
    let opener = tokio::spawn({
        let client = client.clone();
        async move { client.open_bi_stream_sync().await }
    });
    time::sleep(Duration::from_millis(100)).await;
    assert!(!opener.is_finished());

    first.write_all(b"ping").await.unwrap();
    first.finish().unwrap();
    let mut accepted = server.accept_bi_stream().await.unwrap();
    let mut request = Vec::new();
    accepted.reader().read_to_end(&mut request).await.unwrap();
    assert_eq!(request, b"ping");
    accepted.write_all(b"pong").await.unwrap();
    accepted.finish().unwrap();
    drop(accepted);

    let mut response = Vec::new();
    first.reader().read_to_end(&mut response).await.unwrap();
    assert_eq!(response, b"pong");
    drop(first);

    let second = opener.await.unwrap().unwrap();
    assert_eq!(second.stream_id(), StreamId::new(Role::Client, Dir::Bi, 1));
}

#[tokio::test(start_paused = true)]
async fn test_reset_fails_pending_read() {
    let (client, server) = connect(LinkConditions::perfect()).await;

    let mut writer = client.open_uni_stream().unwrap();
    writer.write_all(b"never read").await.unwrap();
    let mut reader = server.accept_uni_stream().await.unwrap();
    writer.reset(VarInt::from_u32(9)).unwrap();

    let mut buf = [0; 64];
    let error = loop {
        match reader.read(&mut buf).await {
            Ok(0) => panic!("reset stream reached its end"),
            Ok(_) => continue,
            Err(error) => break error,
        }
    };
    let StreamError::Reset(reset) = error else {
        panic!("unexpected error {error}");
    };
    assert_eq!(reset.error_code(), 9);
    assert!(writer.write(b"more").await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_close_with_application_error() {
    let (client, server) = connect(LinkConditions::perfect()).await;
    let mut reader = {
        let mut writer = server.open_uni_stream().unwrap();
        writer.write_all(b"x").await.unwrap();
        client.accept_uni_stream().await.unwrap()
    };

    client.close_with_error(VarInt::from_u32(5), "bye");
    let ConnectionError::Local(local) = client.closed().await else {
        panic!("client closed for another reason");
    };
    assert_eq!(local.kind(), ErrorKind::Application);

    let ConnectionError::Peer(peer) = server.closed().await else {
        panic!("server closed for another reason");
    };
    assert_eq!(peer, local);
    assert!(!server.is_active());

    let mut buf = [0; 8];
    assert!(matches!(
        reader.read(&mut buf).await,
        Err(StreamError::Connection(_))
    ));
    assert!(matches!(
        server.open_bi_stream(),
        Err(StreamError::Connection(_))
    ));
    assert!(server.handshake_complete().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_idle_timeout() {
    let config = Config::builder()
        .idle_timeout(Duration::from_secs(2))
        .build()
        .unwrap();
    let started = Instant::now();
    let (client, server) = connect_with(LinkConditions::perfect(), config.clone(), config);
    client.handshake_complete().await.unwrap();

    assert_eq!(client.closed().await, ConnectionError::IdleTimeout);
    assert_eq!(server.closed().await, ConnectionError::IdleTimeout);
    assert!(started.elapsed() >= Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_handshake_fails_without_peer() {
    let config = Config::builder()
        .idle_timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    init_tracing();
    let (client_end, _server_end) = pipe::pair(LinkConditions::perfect());
    let client = Connection::new_client(config.clone()).run(PlainCrypto::new(config.parameters()), client_end);

    assert_eq!(client.handshake_complete().await, Err(ConnectionError::IdleTimeout));
}

#[tokio::test(start_paused = true)]
async fn test_deadlines() {
    let (client, server) = connect(LinkConditions::perfect()).await;
    let mut stream = client.open_bi_stream().unwrap();
    stream.write_all(b"wake up").await.unwrap();
    let mut accepted = server.accept_bi_stream().await.unwrap();

    let mut buf = [0; 16];
    let deadline = Instant::now() + Duration::from_millis(200);
    let error = stream.read_with_deadline(&mut buf, deadline).await.unwrap_err();
    assert_eq!(error.kind(), io::ErrorKind::TimedOut);

    // the stream is still usable after the cancelled read
    accepted.write_all(b"late").await.unwrap();
    let deadline = Instant::now() + Duration::from_secs(1);
    let n = stream.read_with_deadline(&mut buf, deadline).await.unwrap();
    assert_eq!(&buf[..n], b"late");

    drop(accepted);
}

#[tokio::test(start_paused = true)]
async fn test_write_blocks_until_deadline() {
    let client_config = Config::builder()
        .send_buffer_capacity(4096usize)
        .build()
        .unwrap();
    let server_config = Config::builder()
        .initial_max_stream_data_uni(4096u64)
        .build()
        .unwrap();
    let (client, server) = connect_with(LinkConditions::perfect(), client_config, server_config);
    client.handshake_complete().await.unwrap();

    let mut writer = client.open_uni_stream().unwrap();
    let chunk = pattern(1024);
    let mut written = 0;
    let error = loop {
        let deadline = Instant::now() + Duration::from_millis(500);
        match writer.write_with_deadline(&chunk, deadline).await {
            Ok(n) => written += n,
            Err(error) => break error,
        }
    };
    assert_eq!(error.kind(), io::ErrorKind::TimedOut);
    assert!((4096..=8192).contains(&written));

    // reading opens the window again, the writer gets going
    let mut reader = server.accept_uni_stream().await.unwrap();
    let consumer = tokio::spawn(async move {
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await.unwrap();
        data.len()
    });
    writer.write_all(&chunk).await.unwrap();
    writer.finish().unwrap();
    assert_eq!(consumer.await.unwrap(), written + chunk.len());
}
