use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::*;
use crate::handlers::{DiscardBwtHandler, SsaHandler};
use crate::packed::{PackedLayout, PackedString};
use crate::primitives::{Parallel, Sequential};
use crate::string_set::{PackedStringSet, SingleString};

fn layout() -> PackedLayout {
    PackedLayout::new(2, false).unwrap()
}

fn random_symbols(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..len).map(|_| rng.random_range(0..4u8)).collect()
}

// room for plenty of suffixes on the host, `block_size` suffixes per block
fn small_params(block_size: u64) -> BwtParams {
    BwtParams {
        host_memory: 1 << 26,
        device_memory: block_size * DEVICE_BYTES_PER_SUFFIX,
        bucketing_bits: vec![8, 12],
        dcs_period: 8,
        chunk_strings: 64,
        slice_suffixes: 256,
        ..BwtParams::default()
    }
}

fn naive_order<S: StringSet>(string_set: &S) -> Vec<SuffixCoord> {
    let num_strings = string_set.num_strings();

    let mut suffixes: Vec<SuffixCoord> = (0..num_strings)
        .flat_map(|string_id| {
            (0..string_set.string_len(string_id))
                .map(move |offset| SuffixCoord::new(string_id, offset))
        })
        .collect();
    suffixes.sort_by(|&a, &b| radices::compare_suffixes(string_set, a, b));

    (0..num_strings)
        .map(|string_id| SuffixCoord::new(string_id, string_set.string_len(string_id)))
        .chain(suffixes)
        .collect()
}

fn sorted_suffixes<B: Backend, S: StringSet>(
    ctx: &ExecutionContext<B>,
    string_set: &S,
    params: &BwtParams,
) -> (Vec<SuffixCoord>, LargeBwtStats) {
    let mut handler = SsaHandler::new(1);
    let stats = large_bwt(ctx, string_set, &mut handler, params).unwrap();

    (handler.into_ssa().into_samples(), stats)
}

#[test]
fn test_enact_reports_large_bucket_without_emitting() {
    let text = PackedString::<u32>::from_symbols(layout(), &random_symbols(2000, 1)).unwrap();
    let string = SingleString::new(&text).unwrap();
    let params = small_params(50);
    let ctx = ExecutionContext::new(Sequential);

    let mut skeleton = LargeBwtSkeleton::new(&ctx, &string, &params).unwrap();
    let mut handler = DiscardBwtHandler::default();

    let status = skeleton.enact(8, &mut handler).unwrap();
    assert!(matches!(
        status,
        LargeBwtStatus::LargeBucket { bucket_size, .. } if bucket_size > 50
    ));
    assert_eq!(handler.num_symbols, 0);

    assert_eq!(skeleton.enact(12, &mut handler).unwrap(), LargeBwtStatus::Ok);
    assert_eq!(handler.num_symbols, 2000);
}

#[test]
fn test_escalation_restarts_counting() {
    let text = PackedString::<u32>::from_symbols(layout(), &random_symbols(2000, 7)).unwrap();
    let string = SingleString::new(&text).unwrap();
    let expected = naive_order(&string);

    let sequential = ExecutionContext::new(Sequential);
    let (suffixes, stats) = sorted_suffixes(&sequential, &string, &small_params(50));
    assert_eq!(stats.bucketing_bits, 12);
    assert_eq!(stats.num_suffixes, 2001);
    assert_eq!(suffixes, expected);

    let parallel = ExecutionContext::new(Parallel::new(Some(2)).unwrap());
    let (suffixes, _) = sorted_suffixes(&parallel, &string, &small_params(50));
    assert_eq!(suffixes, expected);
}

#[test]
fn test_exhausted_widths_fail_with_large_bucket() {
    let text = PackedString::<u32>::from_symbols(layout(), &random_symbols(2000, 3)).unwrap();
    let string = SingleString::new(&text).unwrap();
    let params = BwtParams {
        bucketing_bits: vec![8],
        ..small_params(50)
    };

    let error = large_bwt(
        &ExecutionContext::new(Sequential),
        &string,
        &mut DiscardBwtHandler::default(),
        &params,
    )
    .unwrap_err();

    assert!(matches!(
        error,
        LargeBwtError::LargeBucket { bucket_size, suggested_device_memory, .. }
            if bucket_size > 50 && suggested_device_memory >= bucket_size * DEVICE_BYTES_PER_SUFFIX
    ));
}

#[test]
fn test_bucket_larger_than_staging_overflows() {
    let text = PackedString::<u32>::from_symbols(layout(), &[0; 300]).unwrap();
    let string = SingleString::new(&text).unwrap();

    // host tables: 2 * 8 * 256 + 16 * 8 + 100 * 44, plus a 1000 suffix block
    let params = BwtParams {
        host_memory: 9624 + 100 * 8,
        device_memory: 1000 * DEVICE_BYTES_PER_SUFFIX,
        bucketing_bits: vec![8],
        dcs_period: 8,
        chunk_strings: 15,
        slice_suffixes: 100,
        ..BwtParams::default()
    };

    let error = large_bwt(
        &ExecutionContext::new(Sequential),
        &string,
        &mut DiscardBwtHandler::default(),
        &params,
    )
    .unwrap_err();

    assert_eq!(
        error,
        LargeBwtError::BufferOverflow {
            bucket_index: radices::DOLLAR_MASK,
            bucket_size: 299,
            capacity: 100
        }
    );
}

#[test]
fn test_oversized_short_bucket_keeps_string_order() {
    let strings = vec![[0u8]; 200];
    let set =
        PackedStringSet::<u32>::from_strings(layout(), strings.iter().map(|string| &string[..]))
            .unwrap();
    let params = BwtParams {
        bucketing_bits: vec![8],
        ..small_params(50)
    };

    let (suffixes, stats) = sorted_suffixes(&ExecutionContext::new(Sequential), &set, &params);

    let expected: Vec<SuffixCoord> = (0..200)
        .map(|string_id| SuffixCoord::new(string_id, 1))
        .chain((0..200).map(|string_id| SuffixCoord::new(string_id, 0)))
        .collect();

    assert_eq!(suffixes, expected);
    assert_eq!(stats.num_oversized_buckets, 1);
    assert_eq!(stats.num_dcs_samples, 0);
}

#[test]
fn test_repeats_are_resolved_by_the_difference_cover() {
    let symbols: Vec<u8> = (0..1200).map(|i| (i % 2) as u8).collect();
    let text = PackedString::<u32>::from_symbols(layout(), &symbols).unwrap();
    let string = SingleString::new(&text).unwrap();

    let ctx = ExecutionContext::new(Sequential);
    let (suffixes, stats) = sorted_suffixes(&ctx, &string, &small_params(5000));

    assert_eq!(suffixes, naive_order(&string));
    assert!(stats.num_dcs_samples > 0);
    assert!(stats.num_delayed_groups > 0);
}

#[test]
fn test_peaks_stay_within_budgets() {
    let strings: Vec<Vec<u8>> = (0..40)
        .map(|seed| random_symbols(10 + seed * 7, seed as u64))
        .collect();
    let set =
        PackedStringSet::<u32>::from_strings(layout(), strings.iter().map(Vec::as_slice)).unwrap();
    let params = BwtParams {
        host_memory: 1 << 20,
        chunk_strings: 7,
        ..small_params(100)
    };

    let (suffixes, stats) = sorted_suffixes(&ExecutionContext::new(Sequential), &set, &params);

    assert_eq!(suffixes, naive_order(&set));
    assert!(stats.peak_host_bytes > 0 && stats.peak_host_bytes <= params.host_memory);
    assert!(stats.peak_device_bytes > 0 && stats.peak_device_bytes <= params.device_memory);
    assert!(stats.num_sub_buckets >= stats.num_super_blocks);
}

#[test]
fn test_widths_beyond_the_host_budget_are_skipped() {
    let text = PackedString::<u32>::from_symbols(layout(), &random_symbols(2000, 11)).unwrap();
    let string = SingleString::new(&text).unwrap();

    // 24 bit tables alone take 256 MiB
    let params = BwtParams {
        host_memory: 1 << 20,
        bucketing_bits: vec![8, 12, 24],
        ..small_params(50)
    };

    let (suffixes, stats) = sorted_suffixes(&ExecutionContext::new(Sequential), &string, &params);
    assert_eq!(suffixes, naive_order(&string));
    assert_eq!(stats.bucketing_bits, 12);
    assert!(stats.peak_host_bytes <= params.host_memory);
}

#[test]
fn test_exhaustion_by_host_budget_fails_with_large_bucket() {
    let text = PackedString::<u32>::from_symbols(layout(), &random_symbols(2000, 13)).unwrap();
    let string = SingleString::new(&text).unwrap();
    let params = BwtParams {
        host_memory: 1 << 20,
        bucketing_bits: vec![8, 20],
        ..small_params(50)
    };

    let ctx = ExecutionContext::new(Sequential);
    let skeleton = LargeBwtSkeleton::new(&ctx, &string, &params).unwrap();
    assert_eq!(skeleton.bucketing_widths(), [8]);

    let error = large_bwt(&ctx, &string, &mut DiscardBwtHandler::default(), &params).unwrap_err();
    assert!(matches!(
        error,
        LargeBwtError::LargeBucket { bucket_size, .. } if bucket_size > 50
    ));
}
