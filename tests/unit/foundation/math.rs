use super::*;

#[test]
fn stable_hasher_is_length_prefixed() {
    let mut a = StableHasher::new();
    a.write_str("ab");
    a.write_str("c");
    let mut b = StableHasher::new();
    b.write_str("a");
    b.write_str("bc");
    assert_ne!(a.finish_hex(), b.finish_hex());
}

#[test]
fn stable_hasher_digest_is_32_hex_chars() {
    let mut h = StableHasher::new();
    h.write_u8(1);
    h.write_f64(0.5);
    let hex = h.finish_hex();
    assert_eq!(hex.len(), 32);
    assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn sha256_matches_known_vector() {
    assert_eq!(
        sha256_hex(b"abc"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}
