//! Codec tests for cadence core

use cadence_core::{codec, events, Envelope, PlaylistOptions, PlaylistState, Track};
use serde_json::json;

fn three_track_state() -> PlaylistState {
    PlaylistState {
        options: PlaylistOptions {
            continuous: Some(true),
            repeat: Some(false),
            volume: Some(0.5),
        },
        cursor_index: 1,
        cursor_time: 42.0,
        list: vec![
            Track::new("https://cdn.example/a.mp3")
                .with_title("Episode A")
                .with_podcast("77", "Show"),
            Track::new("https://cdn.example/b.mp3").with_title("Episode B"),
            Track {
                duration: Some("01:02:03".to_string()),
                poster: Some("https://cdn.example/c.jpg".to_string()),
                release_date: Some("2024-02-29".to_string()),
                played: true,
                ..Track::new("https://cdn.example/c.mp3")
            },
        ],
    }
}

#[test]
fn test_playlist_state_roundtrip() {
    let state = three_track_state();

    let text = serde_json::to_string(&state).expect("serialize failed");
    let decoded: PlaylistState = serde_json::from_str(&text).expect("deserialize failed");

    assert_eq!(decoded, state);
    let srcs: Vec<_> = decoded.list.iter().map(|t| t.src.as_str()).collect();
    assert_eq!(
        srcs,
        vec![
            "https://cdn.example/a.mp3",
            "https://cdn.example/b.mp3",
            "https://cdn.example/c.mp3"
        ]
    );
    assert_eq!(decoded.cursor_index, 1);
    assert_eq!(decoded.cursor_time, 42.0);
    assert_eq!(decoded.options.continuous, Some(true));
    assert_eq!(decoded.options.repeat, Some(false));
    assert_eq!(decoded.options.volume, Some(0.5));
}

#[test]
fn test_playlist_state_wire_names() {
    let value = serde_json::to_value(three_track_state()).unwrap();

    assert_eq!(value["cursorIndex"], json!(1));
    assert_eq!(value["cursorTime"], json!(42.0));
    assert_eq!(value["options"], json!({ "continuous": true, "repeat": false, "volume": 0.5 }));
    assert_eq!(value["list"][0]["podcastTitle"], json!("Show"));
    assert_eq!(value["list"][2]["releaseDate"], json!("2024-02-29"));
}

#[test]
fn test_empty_state_wire_shape() {
    let value = serde_json::to_value(PlaylistState::new()).unwrap();
    assert_eq!(
        value,
        json!({ "options": {}, "cursorIndex": 0, "cursorTime": 0.0, "list": [] })
    );
}

#[test]
fn test_envelope_through_codec() {
    let envelope = Envelope::with(events::PLAYLIST_DATA_RESPONSE, &three_track_state())
        .expect("envelope failed");

    let encoded = codec::encode(&envelope).expect("encode failed");
    let decoded = codec::decode(&encoded).expect("decode failed");

    assert_eq!(decoded.event, events::PLAYLIST_DATA_RESPONSE);
    let state: PlaylistState = serde_json::from_value(decoded.data.unwrap()).unwrap();
    assert_eq!(state, three_track_state());
}

#[test]
fn test_disconnected_carries_successor() {
    let encoded = codec::encode(&Envelope::disconnected("conn-2")).unwrap();
    let decoded = codec::decode(&encoded).unwrap();

    assert_eq!(decoded.event, events::DISCONNECTED);
    assert_eq!(decoded.data, Some(json!("conn-2")));
}

#[test]
fn test_error_envelope() {
    let envelope = Envelope::error(events::PLAYLIST, "no playlist for this session");
    assert_eq!(
        envelope.data,
        Some(json!({ "message": "no playlist for this session", "event": "playlist" }))
    );
}
