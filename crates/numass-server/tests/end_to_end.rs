#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::fs;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use numass_client::{ClientConfig, NumassClient};
use numass_core::meta::{json, Meta, Value};
use numass_core::protocol::{message, Dialect, Envelope, EnvelopeCodec};
use numass_server::app_state::AppState;
use numass_server::config::{ServerConfig, ServerSection};
use numass_server::transport;

struct Running {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: JoinHandle<numass_core::Result<()>>,
}

async fn start(root: &std::path::Path, dialect: Dialect) -> Running {
    let cfg = ServerConfig::new(ServerSection {
        listen: "127.0.0.1:0".into(),
        storage_root: root.to_path_buf(),
        dialect,
        ..ServerSection::default()
    });
    let app = AppState::new(cfg).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, rx) = oneshot::channel::<()>();
    let task = tokio::spawn(transport::serve(listener, app, async move {
        let _ = rx.await;
    }));
    Running { addr, stop, task }
}

impl Running {
    fn client_config(&self) -> ClientConfig {
        ClientConfig::new(self.addr.ip().to_string(), self.addr.port())
    }

    async fn stop(self) {
        self.stop.send(()).unwrap();
        self.task.await.unwrap().unwrap();
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn client_drives_every_service() {
    let root = tempfile::tempdir().unwrap();
    let server = start(root.path(), Dialect::Modern).await;
    let cfg = server.client_config();

    let src = tempfile::tempdir().unwrap();
    let set = src.path().join("set_1");
    fs::create_dir(&set).unwrap();
    fs::write(set.join("p0"), vec![3u8; 256]).unwrap();

    let root_path = root.path().to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut client = NumassClient::new(cfg);

        let run = client.get_current_run();
        assert!(message::is_success(&run));
        assert_eq!(run.get_string("run.path").as_deref(), Some("default"));

        let started = client.start_run("run-42");
        assert_eq!(started.get_string("path").as_deref(), Some("run-42"));
        assert!(root_path.join("run-42").is_dir());

        assert!(message::is_success(&client.set_state("hv", 18500)));
        assert!(message::is_success(&client.set_state("valve", true)));
        let states = client.get_states(&["hv"]).unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states.get("hv"), Some(&Value::Int(18500)));
        assert_eq!(client.get_states(&[]).unwrap().len(), 2);

        assert!(message::is_success(&client.add_note("first", None)));
        assert!(message::is_success(&client.add_note("second", None)));
        let notes = client.get_notes(1);
        let listed = notes.get_nodes("note");
        assert_eq!(listed.len(), 1);
        assert!(listed[0].get_string("time").is_some());

        let pushed = client.send_data("raw", &set);
        assert!(message::is_success(&pushed), "{pushed:?}");
        let stored = root_path.join("run-42/raw/set_1.nm.zip");
        assert!(fs::read(&stored).unwrap().starts_with(b"PK"));

        let reset = client.reset_run();
        assert_eq!(reset.get_string("run.path").as_deref(), Some("default"));

        client.close();
    })
    .await
    .unwrap();

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_action_is_reported_not_fatal() {
    let root = tempfile::tempdir().unwrap();
    let server = start(root.path(), Dialect::Modern).await;
    let cfg = server.client_config();

    tokio::task::spawn_blocking(move || {
        let mut client = NumassClient::new(cfg);
        for (ty, action) in [("numass.run", "explode"), ("numass.nothing", "get")] {
            let reply = client.respond(&message::request_action(ty, action).build());
            assert!(!message::is_success(&reply.meta));
            assert_eq!(
                reply.meta.get_string("error.class").as_deref(),
                Some("UNKNOWN_ACTION")
            );
        }
        // Same connection still serves requests.
        assert!(client.is_connected());
        assert!(message::is_success(&client.get_current_run()));
    })
    .await
    .unwrap();

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn traversal_is_rejected() {
    let root = tempfile::tempdir().unwrap();
    let server = start(root.path(), Dialect::Modern).await;
    let cfg = server.client_config();

    tokio::task::spawn_blocking(move || {
        let mut client = NumassClient::new(cfg);
        let reply = client.start_run("../outside");
        assert!(!message::is_success(&reply));
        assert_eq!(reply.get_string("error.class").as_deref(), Some("STORAGE"));
    })
    .await
    .unwrap();

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn legacy_request_and_terminator_echo() {
    let root = tempfile::tempdir().unwrap();
    let server = start(root.path(), Dialect::Legacy).await;
    let addr = server.addr;

    tokio::task::spawn_blocking(move || {
        let codec = EnvelopeCodec::new(Dialect::Legacy);
        let mut stream = TcpStream::connect(addr).unwrap();

        let request = message::request_action("numass.run", "get").build();
        codec.write(&mut stream, &request).unwrap();
        let reply = codec.read_frame(&mut stream).unwrap();
        assert_eq!(reply.tag.dialect(), Dialect::Legacy);
        assert_eq!(reply.envelope.meta.get_string("run.path").as_deref(), Some("default"));

        codec.write(&mut stream, &message::terminator()).unwrap();
        let bye = codec.read(&mut stream).unwrap();
        assert!(message::is_terminator(&bye));

        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).unwrap();
        assert!(rest.is_empty());
    })
    .await
    .unwrap();

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn bad_meta_keeps_session_garbage_ends_it() {
    let root = tempfile::tempdir().unwrap();
    let server = start(root.path(), Dialect::Modern).await;
    let addr = server.addr;

    tokio::task::spawn_blocking(move || {
        let codec = EnvelopeCodec::default();
        let mut stream = TcpStream::connect(addr).unwrap();

        // Valid tag, meta that is not JSON.
        let meta = Meta::new().with_value("k", "v");
        let meta_len = json::encode(&meta).unwrap().len();
        let mut bad = codec.encode(&Envelope::new(meta)).unwrap();
        let start = bad.len() - meta_len;
        for b in &mut bad[start..] {
            *b = b'!';
        }
        stream.write_all(&bad).unwrap();
        let reply = codec.read(&mut stream).unwrap();
        assert_eq!(reply.meta.get_string("error.class").as_deref(), Some("META_DECODE"));

        codec
            .write(&mut stream, &message::request_action("numass.run", "get").build())
            .unwrap();
        assert!(message::is_success(&codec.read(&mut stream).unwrap().meta));

        stream.write_all(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        let reply = codec.read(&mut stream).unwrap();
        assert_eq!(reply.meta.get_string("error.class").as_deref(), Some("FRAMING"));
        let mut rest = Vec::new();
        let _ = stream.read_to_end(&mut rest);
        assert!(rest.is_empty());
    })
    .await
    .unwrap();

    server.stop().await;
}
