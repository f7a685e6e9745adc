use super::*;

// -------------------- Construction --------------------

#[test]
fn default_uses_8192_bits_and_3_hashes() {
    let bf = BloomFilter::default();
    assert_eq!(bf.num_bits(), 8192);
    assert_eq!(bf.num_hashes(), 3);
    assert_eq!(bf.bits.len(), 1024);
}

#[test]
fn odd_bit_count_rounds_byte_len_up() {
    let bf = BloomFilter::new(13, 2);
    assert_eq!(bf.bits.len(), 2);
}

#[test]
#[should_panic(expected = "num_bits must be > 0")]
fn new_panics_on_zero_bits() {
    BloomFilter::new(0, 3);
}

#[test]
#[should_panic(expected = "num_hashes must be > 0")]
fn new_panics_on_zero_hashes() {
    BloomFilter::new(64, 0);
}

// -------------------- Insert / Contains --------------------

#[test]
fn inserted_key_is_found() {
    let mut bf = BloomFilter::default();
    bf.insert("hello");
    assert!(bf.may_contain("hello"));
}

#[test]
fn missing_key_is_not_found() {
    let bf = BloomFilter::default();
    assert!(!bf.may_contain("hello"));
}

#[test]
fn empty_key_is_supported() {
    let mut bf = BloomFilter::default();
    bf.insert("");
    assert!(bf.may_contain(""));
}

#[test]
fn many_keys_all_found() {
    let mut bf = BloomFilter::default();
    for i in 0..1000 {
        bf.insert(&format!("key-{}", i));
    }
    for i in 0..1000 {
        assert!(
            bf.may_contain(&format!("key-{}", i)),
            "key {} should be found",
            i
        );
    }
}

#[test]
fn absent_keys_are_mostly_rejected() {
    let mut bf = BloomFilter::default();
    for i in 0..500 {
        bf.insert(&format!("present-{}", i));
    }

    let lookups = 10_000;
    let false_positives = (0..lookups)
        .filter(|i| bf.may_contain(&format!("absent-{}", i)))
        .count();

    // 500 keys in 8192 bits with k=3 is roughly 0.5% FPR; allow lots of slack.
    assert!(
        false_positives < lookups / 10,
        "too many false positives: {} / {}",
        false_positives,
        lookups
    );
}

#[test]
fn hashes_are_non_negative_fold_of_signed_value() {
    // FNV-1a offset basis alone has the top bit set, so the fold must apply.
    assert_eq!(fnv1a_32(b""), (0x811c_9dc5u32 as i32).unsigned_abs());
    assert_eq!(djb2(b""), 5381);
    assert_eq!(djb2(b"a"), 5381 * 33 + 97);
}

// -------------------- Serialization --------------------

#[test]
fn summary_roundtrip_preserves_membership() {
    let mut bf = BloomFilter::default();
    for k in ["alpha", "beta", "gamma"] {
        bf.insert(k);
    }

    let restored = BloomFilter::from_summary(&bf.summary()).unwrap();
    assert_eq!(restored, bf);
    for k in ["alpha", "beta", "gamma"] {
        assert!(restored.may_contain(k));
    }
}

#[test]
fn summary_json_shape() {
    let bf = BloomFilter::new(16, 2);
    let json = serde_json::to_value(bf.summary()).unwrap();
    assert_eq!(json["m"], 16);
    assert_eq!(json["k"], 2);
    assert_eq!(json["bloom"], "AAA=");
}

#[test]
fn from_summary_rejects_bad_base64() {
    let summary = BloomSummary {
        bloom: "not base64!!".to_string(),
        m: 16,
        k: 2,
    };
    let err = BloomFilter::from_summary(&summary).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);
}

#[test]
fn from_summary_rejects_length_mismatch() {
    let summary = BloomSummary {
        bloom: STANDARD.encode([0u8; 4]),
        m: 8192,
        k: 3,
    };
    assert!(BloomFilter::from_summary(&summary).is_err());
}

#[test]
fn from_summary_rejects_zero_hashes() {
    let summary = BloomSummary {
        bloom: STANDARD.encode([0u8; 2]),
        m: 16,
        k: 0,
    };
    assert!(BloomFilter::from_summary(&summary).is_err());
}

#[test]
fn debug_output_omits_raw_bits() {
    let bf = BloomFilter::default();
    let dbg = format!("{:?}", bf);
    assert!(dbg.contains("num_bits: 8192"));
    assert!(dbg.contains("bytes: 1024"));
}
