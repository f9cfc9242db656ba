use proptest::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use large_bwt::{
    BackendKind, BwtParams, BwtSsaHandler, DOLLAR_SYMBOL, HostBwtHandler, LargeBwtBuilder,
    LargeBwtError, PackedLayout, PackedString, PackedStringSet, SuffixCoord, SumTree, find_primary,
    invert_string_bwt, invert_string_set_bwt,
};

// a = 0, b = 1, n = 2
static BANANA: &[u8] = &[1, 0, 2, 0, 2, 0];

fn dna_layout() -> PackedLayout {
    PackedLayout::new(2, false).unwrap()
}

fn dna_set(strings: &[Vec<u8>]) -> PackedStringSet<u32> {
    PackedStringSet::from_strings(dna_layout(), strings.iter().map(Vec::as_slice)).unwrap()
}

// small blocks so that bucketing has to escalate on the larger inputs
fn small_builder(backend: BackendKind) -> LargeBwtBuilder {
    let mut builder = LargeBwtBuilder::new();
    builder
        .with_host_memory(1 << 26)
        .with_device_memory(256 * 40)
        .with_bucketing_bits(&[8, 12, 16])
        .with_dcs_period(8)
        .with_chunk_strings(5)
        .with_slice_suffixes(64)
        .with_backend(backend)
        .with_num_threads(2);

    builder
}

fn naive_suffix_order(strings: &[Vec<u8>]) -> Vec<SuffixCoord> {
    let mut suffixes: Vec<SuffixCoord> = strings
        .iter()
        .enumerate()
        .flat_map(|(string_id, string)| {
            (0..string.len()).map(move |offset| SuffixCoord::new(string_id as u32, offset as u32))
        })
        .collect();

    // a proper prefix compares smaller, which is what the terminator does
    suffixes.sort_by(|a, b| {
        strings[a.string_id as usize][a.offset as usize..]
            .cmp(&strings[b.string_id as usize][b.offset as usize..])
            .then(a.string_id.cmp(&b.string_id))
    });

    strings
        .iter()
        .enumerate()
        .map(|(string_id, string)| SuffixCoord::new(string_id as u32, string.len() as u32))
        .chain(suffixes)
        .collect()
}

fn naive_bwt(strings: &[Vec<u8>], order: &[SuffixCoord]) -> Vec<u8> {
    order
        .iter()
        .map(|coord| match coord.offset {
            0 => DOLLAR_SYMBOL,
            offset => strings[coord.string_id as usize][offset as usize - 1],
        })
        .collect()
}

fn is_strictly_sorted(order: &[SuffixCoord], strings: &[Vec<u8>]) -> bool {
    let key = |coord: &SuffixCoord| {
        (&strings[coord.string_id as usize][coord.offset as usize..], coord.string_id)
    };

    order[strings.len()..].windows(2).all(|pair| key(&pair[0]) < key(&pair[1]))
}

fn check_single_string(builder: &LargeBwtBuilder, symbols: &[u8], layout: PackedLayout) {
    let text = PackedString::<u32>::from_symbols(layout, symbols).unwrap();
    let strings = [symbols.to_vec()];

    let mut expected = naive_bwt(&strings, &naive_suffix_order(&strings));
    let expected_primary = expected.iter().position(|&symbol| symbol == DOLLAR_SYMBOL).unwrap();
    expected.remove(expected_primary);

    let (bwt, primary) = builder.bwt(&text).unwrap();
    assert_eq!(bwt, expected);
    assert_eq!(primary, expected_primary as u64);
    assert_eq!(find_primary(&text).unwrap(), primary);
    assert_eq!(invert_string_bwt(&bwt, primary, layout.symbol_bits()).unwrap(), symbols);
}

#[test]
fn whole_algorithm_banana() {
    let text = PackedString::<u32>::from_symbols(dna_layout(), BANANA).unwrap();
    let builder = small_builder(BackendKind::Sequential);

    let (bwt, primary) = builder.bwt(&text).unwrap();
    assert_eq!(bwt, [0, 2, 2, 1, 0, 0]);
    assert_eq!(primary, 4);
    assert_eq!(find_primary(&text).unwrap(), 4);

    let (packed, packed_primary) = builder.packed_bwt(&text).unwrap();
    assert_eq!(packed.to_symbols(), bwt);
    assert_eq!(packed_primary, 4);

    let (ssa_bwt, _, ssa) = builder.bwt_with_ssa(&text, 2).unwrap();
    assert_eq!(ssa_bwt, bwt);
    // suffix array 6 5 3 1 0 4 2
    assert_eq!(
        ssa.samples(),
        [
            SuffixCoord::new(0, 6),
            SuffixCoord::new(0, 3),
            SuffixCoord::new(0, 0),
            SuffixCoord::new(0, 2)
        ]
    );
}

#[test]
fn whole_algorithm_short_texts() {
    let builder = small_builder(BackendKind::Sequential);

    let empty = PackedString::<u32>::new(dna_layout());
    assert_eq!(builder.bwt(&empty).unwrap(), (vec![], 0));
    assert_eq!(find_primary(&empty).unwrap(), 0);

    let one = PackedString::<u32>::from_symbols(dna_layout(), &[3]).unwrap();
    assert_eq!(builder.bwt(&one).unwrap(), (vec![3], 1));

    let two = PackedString::<u32>::from_symbols(dna_layout(), &[1, 0]).unwrap();
    assert_eq!(builder.bwt(&two).unwrap(), (vec![0, 1], 2));
}

#[test]
fn whole_algorithm_reads() {
    // ACGTAC, GATTACA, CA
    let strings = vec![vec![0, 1, 2, 3, 0, 1], vec![2, 0, 3, 3, 0, 1, 0], vec![1, 0]];
    let set = dna_set(&strings);

    for backend in [BackendKind::Sequential, BackendKind::Parallel] {
        let builder = small_builder(backend);

        let order = builder.suffix_sort(&set).unwrap();
        assert_eq!(order.len(), 6 + 7 + 2 + 3);
        assert!(is_strictly_sorted(&order, &strings));
        assert_eq!(order, naive_suffix_order(&strings));

        let mut handler = HostBwtHandler::new();
        builder.large_bwt(&set, &mut handler).unwrap();

        let bwt = handler.into_bwt();
        assert_eq!(bwt, naive_bwt(&strings, &order));
        assert_eq!(invert_string_set_bwt(&bwt, 3, 2).unwrap(), strings);
    }
}

#[test]
fn whole_algorithm_equal_length_reads() {
    // ACGTACG, GATTACA, CCCAGTA
    let strings = vec![
        vec![0, 1, 2, 3, 0, 1, 2],
        vec![2, 0, 3, 3, 0, 1, 0],
        vec![1, 1, 1, 0, 2, 3, 0],
    ];
    let set = dna_set(&strings);

    for backend in [BackendKind::Sequential, BackendKind::Parallel] {
        let builder = small_builder(backend);

        let order = builder.suffix_sort(&set).unwrap();
        assert_eq!(order.len(), 3 * 7 + 3);
        assert!(is_strictly_sorted(&order, &strings));
        assert_eq!(order, naive_suffix_order(&strings));

        let mut handler = HostBwtHandler::new();
        builder.large_bwt(&set, &mut handler).unwrap();

        let bwt = handler.into_bwt();
        assert_eq!(bwt, naive_bwt(&strings, &order));
        assert_eq!(invert_string_set_bwt(&bwt, 3, 2).unwrap(), strings);
    }
}

#[test]
fn whole_algorithm_duplicate_and_empty_strings() {
    let strings = vec![vec![2, 1], vec![], vec![2, 1], vec![2], vec![], vec![2, 1]];
    let set = dna_set(&strings);

    let order = small_builder(BackendKind::Sequential).suffix_sort(&set).unwrap();
    assert_eq!(order, naive_suffix_order(&strings));
}

#[test]
fn whole_algorithm_long_repeat() {
    let symbols = vec![0u8; 10_000];
    let text = PackedString::<u32>::from_symbols(dna_layout(), &symbols).unwrap();
    let set = PackedStringSet::<u32>::from_strings(dna_layout(), [&symbols[..]]).unwrap();

    let mut builder = small_builder(BackendKind::Parallel);
    builder.with_device_memory(16_384 * 40).with_bucketing_bits(&[8, 12]);

    let mut handler = BwtSsaHandler::new(HostBwtHandler::new(), 1);
    let stats = builder.large_bwt(&set, &mut handler).unwrap();
    assert!(stats.num_dcs_samples > 0);
    assert!(stats.num_delayed_groups > 0);
    assert!(stats.peak_host_bytes <= builder.params().host_memory);
    assert!(stats.peak_device_bytes <= builder.params().device_memory);

    // every suffix is a prefix of the longer ones
    let (bwt, ssa) = handler.into_parts();
    let expected_order: Vec<SuffixCoord> = (0..=10_000)
        .rev()
        .map(|offset| SuffixCoord::new(0, offset))
        .collect();
    assert_eq!(ssa.samples(), expected_order);
    assert_eq!(bwt.bwt()[10_000], DOLLAR_SYMBOL);

    assert_eq!(builder.bwt(&text).unwrap(), (vec![0; 10_000], 10_000));
}

#[test]
fn whole_algorithm_large_bucket_error() {
    let mut builder = small_builder(BackendKind::Sequential);
    builder.with_device_memory(10 * 40).with_bucketing_bits(&[8]);

    let mut rng = ChaCha8Rng::seed_from_u64(0x0DDB1A5E5BAD5EEDu64);
    let symbols: Vec<u8> = (0..1000).map(|_| rng.random_range(0..4)).collect();
    let text = PackedString::<u32>::from_symbols(dna_layout(), &symbols).unwrap();
    assert!(matches!(builder.bwt(&text), Err(LargeBwtError::LargeBucket { .. })));

    // all suffixes but the last share the prefix "aa", bucket 0b0000_1111
    let text = PackedString::<u32>::from_symbols(dna_layout(), &[0; 300]).unwrap();
    assert_eq!(
        builder.bwt(&text),
        Err(LargeBwtError::LargeBucket {
            bucket_index: 15,
            bucket_size: 299,
            suggested_device_memory: 1 << 20
        })
    );
}

#[test]
fn whole_algorithm_host_budget_below_the_widest_tables() {
    // 16 and 20 bit tables fit in 64 MiB next to the default slices, 24 bit ones do not
    let text = PackedString::<u32>::from_symbols(dna_layout(), BANANA).unwrap();

    let mut builder = LargeBwtBuilder::new();
    builder
        .with_host_memory(64 << 20)
        .with_device_memory(64 << 20)
        .with_backend(BackendKind::Sequential);

    assert_eq!(builder.bwt(&text).unwrap(), (vec![0, 2, 2, 1, 0, 0], 4));

    // a pass that needs a width whose tables do not fit ends like running out of widths
    let mut rng = ChaCha8Rng::seed_from_u64(0x0DDB1A5E5BAD5EEDu64);
    let symbols: Vec<u8> = (0..1000).map(|_| rng.random_range(0..4)).collect();
    let text = PackedString::<u32>::from_symbols(dna_layout(), &symbols).unwrap();

    let mut builder = small_builder(BackendKind::Sequential);
    builder
        .with_host_memory(1 << 20)
        .with_device_memory(10 * 40)
        .with_bucketing_bits(&[8, 24]);
    assert!(matches!(builder.bwt(&text), Err(LargeBwtError::LargeBucket { .. })));
}

#[test]
fn whole_algorithm_rejects_invalid_params() {
    let text = PackedString::<u32>::from_symbols(dna_layout(), BANANA).unwrap();

    let mut builder = LargeBwtBuilder::new();
    builder.with_dcs_period(100);
    assert!(matches!(builder.bwt(&text), Err(LargeBwtError::InvalidParams(_))));

    let mut builder = LargeBwtBuilder::new();
    builder.with_bucketing_bits(&[5]);
    assert!(matches!(builder.bwt(&text), Err(LargeBwtError::InvalidParams(_))));
}

#[test]
fn whole_algorithm_params_from_json() {
    let params: BwtParams = serde_json::from_str(
        r#"{ "device_memory": 10240, "bucketing_bits": [8, 12], "backend": "sequential" }"#,
    )
    .unwrap();

    assert_eq!(params.device_memory, 10240);
    assert_eq!(params.backend, BackendKind::Sequential);
    assert_eq!(params.dcs_period, BwtParams::default().dcs_period);
    assert_eq!(params.validate(2), Ok(()));

    let mut builder = LargeBwtBuilder::new();
    builder.with_params(params);
    check_single_string(&builder, BANANA, dna_layout());
}

#[test]
fn whole_algorithm_skewed_alphabet() {
    // mostly one symbol, so that long runs and ties are frequent
    let weights = SumTree::new(&[50u32, 3, 1, 1]);
    let mut rng = ChaCha8Rng::seed_from_u64(0x0DDB1A5E5BAD5EEDu64);

    for len in [100, 1000, 3000] {
        let symbols: Vec<u8> = (0..len)
            .map(|_| weights.sample(rng.random::<f64>()).unwrap() as u8)
            .collect();

        for backend in [BackendKind::Sequential, BackendKind::Parallel] {
            let mut builder = small_builder(backend);
            builder.with_device_memory(4096 * 40);

            check_single_string(&builder, &symbols, dna_layout());
        }
    }
}

proptest! {
    #[test]
    fn whole_algorithm_correctness_random_texts(symbols in prop::collection::vec(0u8..4, 0..2000)) {
        let text = PackedString::<u32>::from_symbols(dna_layout(), &symbols).unwrap();
        let strings = [symbols.clone()];

        let mut expected = naive_bwt(&strings, &naive_suffix_order(&strings));
        let expected_primary = expected.iter().position(|&symbol| symbol == DOLLAR_SYMBOL).unwrap();
        expected.remove(expected_primary);

        let (bwt, primary) = small_builder(BackendKind::Sequential).bwt(&text).unwrap();
        prop_assert_eq!(&bwt, &expected);
        prop_assert_eq!(primary, expected_primary as u64);
        prop_assert_eq!(invert_string_bwt(&bwt, primary, 2).unwrap(), symbols);
    }

    #[test]
    fn whole_algorithm_correctness_wide_symbols(
        symbols in prop::collection::vec(0u8..128, 0..1000)
    ) {
        let layout = PackedLayout::new(7, true).unwrap();
        let text = PackedString::<u64>::from_symbols(layout, &symbols).unwrap();

        let mut builder = small_builder(BackendKind::Parallel);
        builder.with_bucketing_bits(&[11, 18]);

        let strings = [symbols];
        let expected = naive_suffix_order(&strings);
        let set = PackedStringSet::<u64>::from_strings(layout, strings.iter().map(Vec::as_slice))
            .unwrap();

        prop_assert_eq!(builder.suffix_sort(&set).unwrap(), expected);
        prop_assert_eq!(builder.bwt(&text).unwrap().1, find_primary(&text).unwrap());
    }

    #[test]
    fn whole_algorithm_correctness_random_string_sets(
        strings in prop::collection::vec(prop::collection::vec(0u8..4, 0..60), 0..30)
    ) {
        let set = dna_set(&strings);
        let expected = naive_suffix_order(&strings);

        for backend in [BackendKind::Sequential, BackendKind::Parallel] {
            let builder = small_builder(backend);
            let mut handler = BwtSsaHandler::new(HostBwtHandler::new(), 1);
            let stats = builder.large_bwt(&set, &mut handler).unwrap();
            let (bwt, ssa) = handler.into_parts();

            prop_assert_eq!(ssa.samples(), &expected[..]);
            prop_assert_eq!(bwt.bwt(), &naive_bwt(&strings, &expected)[..]);
            prop_assert_eq!(stats.num_suffixes, expected.len() as u64);
            prop_assert!(stats.peak_host_bytes <= builder.params().host_memory);
            prop_assert!(stats.peak_device_bytes <= builder.params().device_memory);
        }
    }
}
