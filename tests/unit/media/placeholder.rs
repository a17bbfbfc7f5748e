use super::*;

fn req(kind: MediaKind, prompt: &str) -> PlaceholderRequest<'_> {
    PlaceholderRequest {
        kind,
        prompt_text: prompt,
        duration: Some(1.5),
        width: 32,
        height: 18,
    }
}

#[test]
fn image_placeholder_is_png_of_requested_size() {
    let bytes = SolidPlaceholder
        .generate_placeholder(&req(MediaKind::Image, "a red fox"))
        .unwrap();
    let img = image::load_from_memory(&bytes).unwrap();
    assert_eq!((img.width(), img.height()), (32, 18));
    let px = img.to_rgb8().get_pixel(5, 5).0;
    assert_eq!(px, SolidPlaceholder::color_for("a red fox"));
}

#[test]
fn color_is_deterministic_and_prompt_dependent() {
    let a = SolidPlaceholder::color_for("one");
    assert_eq!(a, SolidPlaceholder::color_for("one"));
    assert_ne!(a, SolidPlaceholder::color_for("two"));
    assert!(a.iter().all(|c| (64..=191).contains(c)));
}

#[test]
fn audio_placeholder_is_silent_wav_covering_duration() {
    let bytes = SolidPlaceholder
        .generate_placeholder(&req(MediaKind::Audio, "hello"))
        .unwrap();
    assert_eq!(&bytes[0..4], b"RIFF");
    assert_eq!(&bytes[8..12], b"WAVE");
    // 1.5 s at 8 kHz, 2 bytes per sample.
    assert_eq!(bytes.len(), 44 + 24_000);
    assert!(bytes[44..].iter().all(|b| *b == 0));
}

#[test]
fn zero_sized_visual_is_rejected() {
    let mut r = req(MediaKind::Video, "x");
    r.width = 0;
    assert!(SolidPlaceholder.generate_placeholder(&r).is_err());
}

#[test]
fn audio_too_long_for_a_wav_header_is_a_validation_error() {
    let mut r = req(MediaKind::Audio, "endless drone");
    r.duration = Some(1.0e6);
    let err = SolidPlaceholder.generate_placeholder(&r).unwrap_err();
    assert!(matches!(err, ClipforgeError::Validation(_)));

    // Data chunk fits in 32 bits but the RIFF size (data + 36) does not.
    assert!(silent_wav(2_147_483_630, 8_000).is_err());
    assert!(silent_wav(u64::MAX, 8_000).is_err());
}
