use super::*;

#[test]
fn sniffing_prefers_signatures_over_kind() {
    assert_eq!(sniff_extension(b"\x89PNG\r\n\x1a\nrest", MediaKind::Video), "png");
    assert_eq!(sniff_extension(b"RIFF\0\0\0\0WAVEfmt ", MediaKind::Audio), "wav");
    assert_eq!(sniff_extension(b"ID3\x04", MediaKind::Audio), "mp3");
    assert_eq!(sniff_extension(b"\0\0\0\x18ftypisom", MediaKind::Video), "mp4");
    assert_eq!(sniff_extension(b"\0\0\0\x18ftypM4A ", MediaKind::Audio), "m4a");
    assert_eq!(sniff_extension(b"??", MediaKind::Image), "png");
}

#[test]
fn location_extension_falls_back_to_kind() {
    let r = MediaReference::located("a", MediaKind::Video, "clips/intro.MOV");
    assert_eq!(r.extension(), "mov");
    let r = MediaReference::located("b", MediaKind::Audio, "https://cdn.example/x");
    assert_eq!(r.extension(), "wav");
}

#[test]
fn located_reference_serializes_and_bytes_do_not() {
    let mut r = MediaReference::located("k1", MediaKind::Image, "/tmp/a.png");
    r.width = Some(64);
    let json = serde_json::to_string(&r).unwrap();
    assert!(json.contains("\"location\":\"/tmp/a.png\""));
    let back: MediaReference = serde_json::from_str(&json).unwrap();
    assert_eq!(back, r);

    r.payload = MediaPayload::Bytes(Arc::new(vec![1, 2, 3]));
    assert!(r.is_in_memory());
    assert!(serde_json::to_string(&r).is_err());
}
