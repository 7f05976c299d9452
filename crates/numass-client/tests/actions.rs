#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::net::TcpListener;

use chrono::{TimeZone, Utc};

use numass_client::{ClientConfig, NumassClient};
use numass_core::meta::{Meta, Value};
use numass_core::protocol::message;

use stub_server::Stub;

#[test]
fn start_run_end_to_end() {
    let stub = Stub::replying(|req| {
        Meta::new()
            .with_value("type", "numass.run")
            .with_value("success", true)
            .with_value("path", req.get_string("path").unwrap())
    });
    let mut client = NumassClient::new(stub.config());

    let meta = client.start_run("run-42");
    assert_eq!(meta.get_string("path").as_deref(), Some("run-42"));
    assert!(message::is_success(&meta));
    drop(client);

    let seen = stub.join();
    let req = &seen[0].envelope.meta;
    assert_eq!(req.get_string("type").as_deref(), Some("numass.run"));
    assert_eq!(req.get_string("action").as_deref(), Some("start"));
    assert_eq!(req.get_string("path").as_deref(), Some("run-42"));
}

#[test]
fn missing_success_flag_counts_as_success() {
    let stub = Stub::replying(|req| match req.get_string("type").as_deref() {
        Some("numass.state") => Meta::new()
            .with_node("state", Meta::new().with_value("name", "hv").with_value("value", 18500))
            .with_node("state", Meta::new().with_value("name", "valve").with_value("value", true)),
        _ => Meta::new().with_node("run", Meta::new().with_value("path", "default")),
    });
    let mut client = NumassClient::new(stub.config());

    let run = client.get_current_run();
    assert!(message::is_success(&run));
    assert_eq!(run.get_string("run.path").as_deref(), Some("default"));

    let states = client.get_states(&[]).unwrap();
    assert_eq!(states.get("hv"), Some(&Value::Int(18500)));
    assert_eq!(states.get("valve"), Some(&Value::Bool(true)));
    client.close();
    stub.join();
}

#[test]
fn get_states_surfaces_remote_failure() {
    let stub = Stub::replying(|_| {
        Meta::new()
            .with_value("success", false)
            .with_value("error.message", "no such state")
            .with_value("error.class", "STORAGE")
    });
    let mut client = NumassClient::new(stub.config());

    let err = client.get_states(&["hv"]).unwrap_err();
    assert_eq!(err.class_name(), "STORAGE");
    assert!(err.to_string().contains("no such state"));
    client.close();

    let seen = stub.join();
    let names = seen[0].envelope.meta.get_value("name").unwrap().items().len();
    assert_eq!(names, 1);
}

#[test]
fn state_and_note_requests_carry_their_fields() {
    let stub = Stub::replying(|_| Meta::new().with_value("success", true));
    let mut client = NumassClient::new(stub.config());

    client.set_state("hv", 18500);
    let mut many = BTreeMap::new();
    many.insert("a".to_string(), Value::from(1));
    many.insert("b".to_string(), Value::from("x"));
    client.set_states(&many);
    client.add_note("baseline ok", None);
    let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    client.add_note("hv ramp", Some(at));
    client.get_notes(0);
    client.get_notes(5);
    client.close();

    let seen: Vec<Meta> = stub.join().into_iter().map(|f| f.envelope.meta).collect();

    let single = seen[0].get_nodes("state");
    assert_eq!(single.len(), 1);
    assert_eq!(single[0].get_int("value"), Some(18500));
    assert_eq!(seen[1].get_nodes("state").len(), 2);

    assert_eq!(seen[2].get_string("note.text").as_deref(), Some("baseline ok"));
    assert!(!seen[2].has_value("note.time"));
    assert_eq!(
        seen[3].get_string("note.time").as_deref(),
        Some("2024-03-01T12:00:00.000Z")
    );

    assert_eq!(seen[4].get_string("action").as_deref(), Some("pull"));
    assert!(!seen[4].has_value("limit"));
    assert_eq!(seen[5].get_int("limit"), Some(5));
}

#[test]
fn directory_push_sends_one_archive_and_cleans_up() {
    let src = tempfile::tempdir().unwrap();
    let set = src.path().join("set_1");
    fs::create_dir(&set).unwrap();
    fs::write(set.join("p0"), vec![7u8; 1024]).unwrap();
    let scratch = tempfile::tempdir().unwrap();

    let stub = Stub::replying(|_| Meta::new().with_value("success", true));
    let mut cfg = stub.config();
    cfg.archive_dir = Some(scratch.path().to_path_buf());
    let mut client = NumassClient::new(cfg);

    let meta = client.send_data("run-42/raw", &set);
    assert!(message::is_success(&meta));
    assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
    client.close();

    let seen = stub.join();
    let push = &seen[0].envelope;
    assert_eq!(push.meta.get_string("action").as_deref(), Some("push"));
    assert_eq!(push.meta.get_string("path").as_deref(), Some("run-42/raw"));
    assert_eq!(push.meta.get_string("name").as_deref(), Some("set_1"));
    assert!(push.data.starts_with(b"PK"));
}

#[test]
fn directory_push_cleans_up_on_failure() {
    let src = tempfile::tempdir().unwrap();
    fs::write(src.path().join("p0"), b"points").unwrap();
    let scratch = tempfile::tempdir().unwrap();

    let stub = Stub::spawn(|_, _| false);
    let mut cfg = stub.config();
    cfg.archive_dir = Some(scratch.path().to_path_buf());
    let mut client = NumassClient::new(cfg);

    let meta = client.send_data("run-42", src.path());
    assert!(!message::is_success(&meta));
    assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
    stub.join();
}

#[test]
fn archive_push_strips_extension() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("set_2.nm.zip");
    fs::write(&archive, b"PK\x03\x04payload").unwrap();

    let stub = Stub::replying(|_| Meta::new());
    let mut client = NumassClient::new(stub.config());
    assert!(message::is_success(&client.send_data("run-42", &archive)));
    client.close();

    let seen = stub.join();
    assert_eq!(seen[0].envelope.meta.get_string("name").as_deref(), Some("set_2"));
    assert_eq!(&seen[0].envelope.data[..], b"PK\x03\x04payload");
}

#[test]
fn unsupported_source_never_contacts_server() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();
    let mut client = NumassClient::new(ClientConfig::new(addr.ip().to_string(), addr.port()));

    let dir = tempfile::tempdir().unwrap();
    let plain = dir.path().join("points.txt");
    fs::write(&plain, b"1 2 3").unwrap();

    for source in [plain, dir.path().join("missing")] {
        let meta = client.send_data("run-42", &source);
        assert!(!message::is_success(&meta));
        assert_eq!(meta.get_string("error.class").as_deref(), Some("UNSUPPORTED_SOURCE"));
        assert_eq!(meta.get_string("type").as_deref(), Some("numass.data"));
    }

    assert!(!client.is_connected());
    let err = listener.accept().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WouldBlock);
}
