fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use telelink_protocol::{Codec, Command, DecodeError, Envelope, JsonCodec, Payload};

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    fn load_bytes(name: &str) -> Vec<u8> {
        let path = fixtures_dir().join(name);
        fs::read(&path).unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        serde_json::from_slice(&load_bytes(name))
            .unwrap_or_else(|e| panic!("failed to parse fixture {name}: {e}"))
    }

    /// Deserializes a fixture into a Rust type, re-serializes it, and compares
    /// the JSON values (order-independent comparison).
    fn roundtrip_test<T>(name: &str)
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));
        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  wire: {fixture}\n  ours: {reserialized}"
        );
    }

    fn envelope(payload: &Payload) -> &Envelope {
        match payload {
            Payload::Envelope(env) => env,
            other => panic!("expected envelope, got {other:?}"),
        }
    }

    #[test]
    fn fixture_envelope_roundtrip() {
        roundtrip_test::<Envelope>("envelope_reading.json");
    }

    #[test]
    fn fixture_command_roundtrip() {
        roundtrip_test::<Command>("command_set_rate.json");
    }

    #[test]
    fn envelope_keeps_unknown_fields() {
        let codec = JsonCodec::new();
        let event = codec
            .decode(&load_bytes("envelope_reading.json"), "tcp://gw:9000")
            .unwrap();

        assert_eq!(event.source_id(), "probe-7");
        assert_eq!(event.kind(), Some("reading"));
        let env = envelope(event.payload());
        assert_eq!(env.timestamp, Some(1_717_171_717_000));
        assert_eq!(env.extra["seq"], 42);
        assert_eq!(env.extra["firmware"], "2.3.1");
        assert_eq!(event.data()["temperature_c"], 21.5);
    }

    #[test]
    fn device_id_alias_sets_source() {
        let codec = JsonCodec::new();
        let event = codec
            .decode(&load_bytes("envelope_device_id.json"), "tcp://gw:9000")
            .unwrap();

        assert_eq!(event.source_id(), "scale-2");
        assert_eq!(envelope(event.payload()).source.as_deref(), Some("scale-2"));
    }

    #[test]
    fn non_envelope_json_is_opaque() {
        let codec = JsonCodec::new();
        let event = codec
            .decode(&load_bytes("opaque_samples.json"), "ws://gw:8080/")
            .unwrap();

        assert_eq!(event.source_id(), "ws://gw:8080/");
        assert_eq!(event.kind(), None);
        assert_eq!(event.payload(), &Payload::Opaque(load_fixture("opaque_samples.json")));
    }

    #[test]
    fn command_encoding_matches_fixture() {
        let command = Command::new("set_rate")
            .with_target("probe-7")
            .with_data(&serde_json::json!({ "hz": 10 }))
            .unwrap();
        let encoded = JsonCodec::new().encode(&command);

        let wire: serde_json::Value = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(wire, load_fixture("command_set_rate.json"));
        // Compact: no whitespace outside strings.
        assert!(!encoded.contains(&b' ') && !encoded.contains(&b'\n'));
    }

    #[test]
    fn line_stream_decodes_around_bad_lines() {
        let codec = JsonCodec::new();
        let raw = load_bytes("stream.ndjson");

        let mut kinds = Vec::new();
        let mut malformed = 0;
        for line in raw.split(|b| *b == b'\n').filter(|l| !l.is_empty()) {
            match codec.decode(line, "tcp://gw:9000") {
                Ok(event) => kinds.push(event.kind().map(str::to_owned)),
                Err(DecodeError::MalformedPayload(_)) => malformed += 1,
                Err(e) => panic!("unexpected error {e}"),
            }
        }

        assert_eq!(
            kinds,
            vec![Some("reading".to_string()), Some("reading".to_string()), None]
        );
        assert_eq!(malformed, 1);
    }
}
