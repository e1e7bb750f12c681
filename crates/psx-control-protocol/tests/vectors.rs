use std::{fs, path::PathBuf};

use psx_control_protocol::*;
use serde_json::Value;

fn repo_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..")
}

fn load_vectors() -> Value {
    let path = repo_root().join("protocol-vectors/control-v1.json");
    let raw = fs::read_to_string(&path).unwrap_or_else(|err| panic!("read {path:?}: {err}"));
    serde_json::from_str(&raw).unwrap_or_else(|err| panic!("parse {path:?}: {err}"))
}

fn hex_to_bytes(hex: &str) -> Vec<u8> {
    assert!(hex.len() % 2 == 0, "odd hex length: {hex}");
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .unwrap_or_else(|err| panic!("bad hex {hex:?}: {err}"))
        })
        .collect()
}

fn json_get<'a>(obj: &'a Value, key: &str, ctx: &str) -> &'a Value {
    obj.get(key)
        .unwrap_or_else(|| panic!("{ctx}: missing key {key:?}"))
}

fn json_str<'a>(obj: &'a Value, key: &str, ctx: &str) -> &'a str {
    json_get(obj, key, ctx)
        .as_str()
        .unwrap_or_else(|| panic!("{ctx}: {key:?} must be a string"))
}

fn json_u32(obj: &Value, key: &str, ctx: &str) -> u32 {
    let v = json_get(obj, key, ctx)
        .as_u64()
        .unwrap_or_else(|| panic!("{ctx}: {key:?} must be an integer"));
    u32::try_from(v).unwrap_or_else(|_| panic!("{ctx}: {key:?} out of range"))
}

fn json_u8(obj: &Value, key: &str, ctx: &str) -> u8 {
    u8::try_from(json_u32(obj, key, ctx)).unwrap_or_else(|_| panic!("{ctx}: {key:?} out of range"))
}

fn expected_request(v: &Value, ctx: &str) -> Request {
    let path = || WirePath::from(json_str(v, "path", ctx));
    match json_str(v, "op", ctx) {
        "shutdown" => Request::Shutdown,
        "pause" => Request::Pause,
        "resume" => Request::Resume,
        "snapshot" => Request::Snapshot {
            id: json_u8(v, "id", ctx),
        },
        "clear_snapshot" => Request::ClearSnapshot,
        "query_memory" => Request::QueryMemory {
            start: json_u32(v, "start", ctx),
            len: json_u32(v, "len", ctx),
            key: json_u8(v, "key", ctx),
        },
        "dump_memory" => Request::DumpMemory {
            start: json_u32(v, "start", ctx),
            len: json_u32(v, "len", ctx),
            path: path(),
        },
        "release_query" => Request::ReleaseQuery,
        "silence" => Request::Silence {
            key: json_u8(v, "key", ctx),
        },
        "unsilence" => Request::Unsilence {
            key: json_u8(v, "key", ctx),
        },
        "poke" => Request::Poke {
            addr: json_u32(v, "addr", ctx),
            value: json_u8(v, "value", ctx),
        },
        "drill" => Request::Drill {
            addr: json_u32(v, "addr", ctx),
            value: json_u8(v, "value", ctx),
            count: json_u8(v, "count", ctx),
        },
        "start_audio_recording" => Request::StartAudioRecording { path: path() },
        "stop_audio_recording" => Request::StopAudioRecording,
        "save_state" => Request::SaveState { path: path() },
        "load_state" => Request::LoadState { path: path() },
        "set_speed" => Request::SetSpeed {
            percent: json_u32(v, "percent", ctx),
        },
        "ping" => Request::Ping,
        "unknown" => Request::Unknown {
            opcode: json_u8(v, "opcode", ctx),
        },
        other => panic!("{ctx}: unknown op {other:?}"),
    }
}

fn frame_bytes(vector: &Value, ctx: &str) -> Vec<u8> {
    let mut bytes = hex_to_bytes(json_str(vector, "hex", ctx));
    if let Some(path) = vector.get("path").and_then(Value::as_str) {
        bytes.extend_from_slice(path.as_bytes());
    }
    bytes
}

#[test]
fn request_vectors_decode_and_reencode() {
    let vectors = load_vectors();
    let requests = json_get(&vectors, "requests", "root")
        .as_array()
        .expect("requests must be an array");
    assert!(!requests.is_empty());

    for vector in requests {
        let name = json_str(vector, "name", "request vector");
        let ctx = format!("request vector {name}");
        let bytes = frame_bytes(vector, &ctx);
        let expected = expected_request(json_get(vector, "request", &ctx), &ctx);

        let mut reader = RequestReader::new(bytes.as_slice());
        let decoded = reader
            .next_request()
            .unwrap_or_else(|err| panic!("{ctx}: decode failed: {err}"))
            .unwrap_or_else(|| panic!("{ctx}: no request decoded"));
        assert_eq!(decoded, expected, "{ctx}");
        assert!(
            reader.next_request().unwrap().is_none(),
            "{ctx}: trailing bytes after the frame"
        );

        if let Request::Unknown { .. } = expected {
            continue;
        }
        let mut encoded = Vec::new();
        encode_request(&expected, &mut encoded).unwrap();
        assert_eq!(encoded, bytes, "{ctx}: encoding mismatch");
    }
}

#[test]
fn request_vectors_decode_back_to_back() {
    let vectors = load_vectors();
    let requests = json_get(&vectors, "requests", "root").as_array().unwrap();

    let mut stream = Vec::new();
    let mut expected = Vec::new();
    for vector in requests {
        let ctx = json_str(vector, "name", "request vector").to_string();
        stream.extend(frame_bytes(vector, &ctx));
        expected.push(expected_request(json_get(vector, "request", &ctx), &ctx));
    }

    let mut reader = RequestReader::new(stream.as_slice());
    let mut decoded = Vec::new();
    while let Some(req) = reader.next_request().unwrap() {
        decoded.push(req);
    }
    assert_eq!(decoded, expected);
}

#[test]
fn notification_vectors_encode() {
    let vectors = load_vectors();
    let notifications = json_get(&vectors, "notifications", "root")
        .as_array()
        .expect("notifications must be an array");

    for vector in notifications {
        let name = json_str(vector, "name", "notification vector");
        let ctx = format!("notification vector {name}");
        let bytes = hex_to_bytes(json_str(vector, "hex", &ctx));

        let notification = if vector.get("status").is_some() {
            let code = json_u8(vector, "status", &ctx);
            Notification::Status(
                Status::from_code(code).unwrap_or_else(|| panic!("{ctx}: bad status {code}")),
            )
        } else {
            Notification::HookFired {
                key: json_u8(vector, "key", &ctx),
                value: hex_to_bytes(json_str(vector, "value_hex", &ctx)),
            }
        };
        assert_eq!(notification.to_bytes(), bytes, "{ctx}");

        let len = match &notification {
            Notification::HookFired { value, .. } => Some(value.len()),
            Notification::Status(_) => None,
        };
        let decoded = decode_notifications(&bytes, |_| len).unwrap();
        assert_eq!(decoded, vec![notification], "{ctx}");
    }
}
