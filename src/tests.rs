//! Cross-component tests: the end-to-end properties that tie the encoders,
//! decoders, slices, grouped outboards and the tracker together.

use proptest::prelude::*;

use crate::decode::{decode, verify_outboard, Decoder};
use crate::encode::{encode, outboard, Encoder};
use crate::group::GroupOutboard;
use crate::hash::{chunk_cv, hash};
use crate::partial::PartialBao;
use crate::slice::{decode_slice, extract_slice};
use crate::tree::BlockSize;

/// The recurring test input: byte `i` is `i mod 251`, the same pattern the
/// upstream BLAKE3 test vectors use.
pub(crate) fn test_data(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Interesting input lengths around the chunk and parent boundaries.
pub(crate) const TEST_CASES: &[usize] = &[
    0,
    1,
    10,
    1023,
    1024,
    1025,
    2047,
    2048,
    2049,
    3072,
    3073,
    4095,
    4096,
    4097,
    8192,
    16384,
    16385,
    102400,
];

#[test]
fn empty_input_scenario() {
    let expected = "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262";
    let (combined, combined_hash) = encode(&[]);
    let (ob, ob_hash) = outboard(&[]);
    assert_eq!(combined_hash.to_hex(), expected);
    assert_eq!(ob_hash.to_hex(), expected);
    // Both encodings are exactly the zero-filled header.
    assert_eq!(combined, vec![0u8; 8]);
    assert_eq!(combined, ob);
}

#[test]
fn one_chunk_scenario() {
    let data = test_data(1024);
    let (combined, root) = encode(&data);
    let (ob, _) = outboard(&data);
    assert_eq!(combined.len(), 8 + 1024);
    assert_eq!(ob.len(), 8);
    assert_eq!(root, chunk_cv(&data, 0, true));
    assert_eq!(root.as_bytes(), blake3::hash(&data).as_bytes());
}

#[test]
fn bit_flips_in_a_small_encoding_are_always_detected() {
    let data = test_data(100);
    let (encoded, root) = encode(&data);
    assert_eq!(encoded.len(), 108);
    for byte in 8..encoded.len() {
        for bit in 0..8 {
            let mut bad = encoded.clone();
            bad[byte] ^= 1 << bit;
            assert!(
                decode(&bad, &root).is_err(),
                "flip of byte {byte} bit {bit} went undetected"
            );
        }
    }
}

#[test]
fn bit_flips_in_the_parent_region_are_always_detected() {
    let data = test_data(2048);
    let (encoded, root) = encode(&data);
    // The parent node occupies bytes 8..72.
    for byte in 8..72 {
        for bit in 0..8 {
            let mut bad = encoded.clone();
            bad[byte] ^= 1 << bit;
            assert!(
                decode(&bad, &root).is_err(),
                "flip of byte {byte} bit {bit} went undetected"
            );
        }
    }
}

#[test]
fn bit_flips_in_an_outboard_are_always_detected() {
    let data = test_data(2048);
    let (ob, root) = outboard(&data);
    for byte in 8..ob.len() {
        for bit in 0..8 {
            let mut bad = ob.clone();
            bad[byte] ^= 1 << bit;
            assert!(
                verify_outboard(&bad, &data, &root).is_err(),
                "flip of byte {byte} bit {bit} went undetected"
            );
        }
    }
}

#[test]
fn grouped_outboard_at_log_zero_is_the_plain_outboard() {
    for &len in TEST_CASES {
        let data = test_data(len);
        let (plain, root) = outboard(&data);
        let grouped = GroupOutboard::create(&data, BlockSize::ZERO);
        assert_eq!(grouped.encoded(), &plain[..], "len {len}");
        assert_eq!(grouped.root(), root, "len {len}");
    }
}

#[test]
fn slices_compose_with_the_tracker_content() {
    // A tracker reassembles content whose encoding then slices and
    // verifies like any other.
    let data = test_data(10240);
    let bs = BlockSize::from_chunk_log(1);
    let source = PartialBao::from_content(&data, bs);
    let content = source.finalize(true).unwrap();
    let (encoded, root) = encode(&content);
    let slice = extract_slice(&encoded, 4096, 2048).unwrap();
    assert_eq!(
        decode_slice(&slice, &root, 4096, 2048).unwrap(),
        &data[4096..6144]
    );
}

#[test_log::test]
fn tracker_order_independence() {
    let data = test_data(13 * 1024 + 7);
    let bs = BlockSize::from_chunk_log(1);
    let source = PartialBao::from_content(&data, bs);
    let n = source.num_groups();
    let group = |i: u64| {
        let start = (i * bs.bytes()) as usize;
        let end = data.len().min(start + bs.bytes() as usize);
        data[start..end].to_vec()
    };

    let mut forward = PartialBao::new(source.root(), data.len() as u64, bs);
    for i in 0..n {
        let proof = source.create_proof(i).unwrap();
        forward.add_chunk_group(i, &group(i), &proof).unwrap();
    }
    let mut backward = PartialBao::new(source.root(), data.len() as u64, bs);
    for i in (0..n).rev() {
        let proof = source.create_proof(i).unwrap();
        backward.add_chunk_group(i, &group(i), &proof).unwrap();
    }
    assert_eq!(forward, backward);
    assert_eq!(forward.finalize(true).unwrap(), data);
    assert_eq!(backward.finalize(true).unwrap(), data);
}

#[test_log::test]
fn decoder_survives_byte_at_a_time_input() {
    let data = test_data(3 * 1024 + 11);
    let (encoded, root) = encode(&data);
    let mut decoder = Decoder::new(root, data.len() as u64);
    for &byte in &encoded {
        decoder.write(&[byte]).unwrap();
    }
    decoder.finalize().unwrap();
    let mut out = vec![0u8; data.len()];
    assert_eq!(decoder.read(&mut out).unwrap(), data.len());
    assert_eq!(out, data);
}

proptest! {
    #[test]
    fn prop_round_trip(data in proptest::collection::vec(any::<u8>(), 0..4097)) {
        let (encoded, root) = encode(&data);
        let expected = blake3::hash(&data);
        prop_assert_eq!(root.as_bytes(), expected.as_bytes());
        prop_assert_eq!(decode(&encoded, &root).unwrap(), data);
    }

    #[test]
    fn prop_streaming_equivalence(
        data in proptest::collection::vec(any::<u8>(), 0..8193),
        cuts in proptest::collection::vec(0usize..8193, 0..8),
    ) {
        let expected = encode(&data);
        let mut cuts: Vec<usize> = cuts.into_iter().map(|c| c.min(data.len())).collect();
        cuts.sort_unstable();
        let mut encoder = Encoder::new();
        let mut prev = 0;
        for cut in cuts {
            encoder.write(&data[prev..cut]).unwrap();
            prev = cut;
        }
        encoder.write(&data[prev..]).unwrap();
        prop_assert_eq!(encoder.finalize().unwrap(), expected);
    }

    #[test]
    fn prop_slice_round_trip(
        len in 0usize..6000,
        start in 0u64..8000,
        slice_len in 0u64..8000,
    ) {
        let data = test_data(len);
        let (encoded, root) = encode(&data);
        let slice = extract_slice(&encoded, start, slice_len).unwrap();
        let out = decode_slice(&slice, &root, start, slice_len).unwrap();
        // A zero-length request yields nothing; a start past the end is
        // clamped onto the final byte; otherwise the range is clipped to
        // the content.
        let expected: Vec<u8> = if slice_len == 0 || len == 0 {
            Vec::new()
        } else if start as usize >= len {
            data[len - 1..].to_vec()
        } else {
            let lo = start as usize;
            let hi = lo.saturating_add(slice_len as usize).min(len);
            data[lo..hi].to_vec()
        };
        prop_assert_eq!(out, expected);
    }

    #[test]
    fn prop_group_root_equivalence(
        len in 0usize..6000,
        g in 0u8..5,
    ) {
        let data = test_data(len);
        let ob = GroupOutboard::create(&data, BlockSize::from_chunk_log(g));
        prop_assert_eq!(ob.root(), hash(&data));
        ob.verify(&data).unwrap();
    }

    #[test]
    fn prop_tracker_snapshot_round_trip(
        len in 0usize..6000,
        g in 0u8..3,
        keep in proptest::collection::vec(any::<bool>(), 0..8),
    ) {
        let data = test_data(len);
        let bs = BlockSize::from_chunk_log(g);
        let source = PartialBao::from_content(&data, bs);
        let mut sink = PartialBao::new(source.root(), data.len() as u64, bs);
        for i in 0..source.num_groups() {
            if keep.get(i as usize).copied().unwrap_or(false) {
                let start = (i * bs.bytes()) as usize;
                let end = data.len().min(start + bs.bytes() as usize);
                let proof = source.create_proof(i).unwrap();
                sink.add_chunk_group(i, &data[start..end], &proof).unwrap();
            }
        }
        let restored = PartialBao::import_state(&sink.export_state().unwrap()).unwrap();
        prop_assert_eq!(restored, sink);
    }
}

// The normalization edge cases are easy to get subtly wrong; pin them down
// separately from the property test.
#[test]
fn slice_normalization_edges() {
    let data = test_data(2048);
    let (encoded, root) = encode(&data);
    // start on the exact end of the content
    let slice = extract_slice(&encoded, 2048, 100).unwrap();
    assert_eq!(decode_slice(&slice, &root, 2048, 100).unwrap(), &data[2047..]);
    // len 0 on the empty input
    let (empty_encoded, empty_root) = encode(&[]);
    let slice = extract_slice(&empty_encoded, 0, 0).unwrap();
    assert_eq!(decode_slice(&slice, &empty_root, 0, 0).unwrap(), Vec::<u8>::new());
}
