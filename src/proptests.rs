use super::*;

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn validate_trie(t: &MultibitTrie) {
    let stride = t.stride.bits();
    let mut reachable = 0usize;
    let mut stack = vec![(NodeId::ROOT, 0u32)];

    while let Some((node, depth)) = stack.pop() {
        reachable += 1;
        assert!(depth <= t.stride.depth(), "node below maximum depth");

        if let Some(route) = t.nodes.route(node) {
            let len = u32::from(route.prefix_length);
            if depth == 0 {
                assert_eq!(len, 0, "root may only hold the default route");
            } else {
                assert!(
                    len > (depth - 1) * stride && len <= depth * stride,
                    "route /{len} stored at depth {depth}"
                );
            }
        }

        for branch in 0..t.stride.fanout() as u32 {
            let child = t.nodes.child(node, branch);
            if !child.is_null() {
                assert!(child.index() < t.node_count(), "child id out of range");
                assert_ne!(child, NodeId::ROOT, "root cannot be a child");
                stack.push((child, depth + 1));
            }
        }
    }

    assert_eq!(
        reachable,
        t.node_count(),
        "every allocated node must be reachable exactly once"
    );
}

/// Addresses on and around the edges of each prefix.
fn probes(records: &[PrefixRecord], extra: &[u32]) -> Vec<u32> {
    let mut out = extra.to_vec();
    for r in records {
        let mask = r.mask();
        out.push(r.prefix);
        out.push(r.prefix & mask);
        out.push(r.prefix | !mask);
        if r.length > 0 {
            // Flip the last significant bit to step just outside.
            out.push(r.prefix ^ (1 << (ADDRESS_BITS - u32::from(r.length))));
        }
    }
    out
}

fn prefix_strategy() -> impl Strategy<Value = u32> + Clone {
    // Clustered prefixes so that most sets overlap.
    prop_oneof![
        2 => any::<u32>(),
        3 => any::<u8>().prop_map(|b| 0x0A00_0000 | (u32::from(b) << 16)),
        3 => (0u32..16, 0u32..16).prop_map(|(a, b)| 0xC0A8_0000 | (a << 12) | (b << 4)),
    ]
}

fn record_strategy() -> impl Strategy<Value = PrefixRecord> {
    (prefix_strategy(), 0u8..=MAX_PREFIX_LEN, 0..1024i32).prop_map(|(prefix, length, next_hop)| {
        PrefixRecord {
            prefix,
            length,
            next_hop,
        }
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 10_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_equivalence_with_reference(
        stride in any::<Stride>(),
        records in prop::collection::vec(record_strategy(), 0..=64),
        extra in prop::collection::vec(any::<u32>(), 0..=64),
    ) {
        let trie = MultibitTrie::from_records(stride, records.iter().copied()).unwrap();
        let reference: ReferenceLpm = records.iter().copied().collect();
        validate_trie(&trie);

        let addresses = probes(&records, &extra);
        let report = check_correctness(&trie, &reference, addresses.iter().copied());
        prop_assert!(report.is_ok(), "mismatches: {:?}", report.mismatches);

        for &address in &addresses {
            prop_assert_eq!(trie.lookup(address), trie.lookup(address));
        }
    }

    #[test]
    fn prop_shorter_prefix_keeps_longer_matches(
        stride in any::<Stride>(),
        records in prop::collection::vec(record_strategy(), 1..=32),
        shorter in record_strategy(),
    ) {
        let mut trie = MultibitTrie::from_records(stride, records.iter().copied()).unwrap();
        let addresses = probes(&records, &[]);
        let before: Vec<Option<RouteEntry>> =
            addresses.iter().map(|&a| trie.lookup_route(a)).collect();

        trie.insert_record(&shorter).unwrap();

        for (&address, old) in addresses.iter().zip(before) {
            if let Some(old) = old.filter(|r| r.prefix_length >= shorter.length) {
                prop_assert_eq!(trie.lookup_route(address), Some(old));
            }
        }
    }

    #[test]
    fn prop_default_route_is_first(
        stride in any::<Stride>(),
        hops in prop::collection::vec(any::<i32>(), 1..=8),
        address in any::<u32>(),
    ) {
        let mut trie = MultibitTrie::new(stride);
        for &hop in &hops {
            trie.insert(address, 0, hop).unwrap();
            prop_assert_eq!(trie.default_route(), Some(hops[0]));
        }
        prop_assert_eq!(trie.lookup(address), Some(hops[0]));
        prop_assert_eq!(trie.node_count(), 1);
    }

    #[test]
    fn prop_leaf_push_covers_dont_care_bits(
        // Stride 1 never leaves a partial group.
        stride in prop_oneof![Just(Stride::Two), Just(Stride::Four), Just(Stride::Eight)],
        prefix in any::<u32>(),
        length in 1u8..MAX_PREFIX_LEN,
        tail in any::<u32>(),
    ) {
        prop_assume!(u32::from(length) % stride.bits() != 0);
        let mut trie = MultibitTrie::new(stride);
        trie.insert(prefix, length, 7).unwrap();

        let mask = prefix_mask(length);
        prop_assert_eq!(trie.lookup((prefix & mask) | (tail & !mask)), Some(7));

        let outside = (prefix ^ (1 << (ADDRESS_BITS - u32::from(length)))) & mask;
        prop_assert_eq!(trie.lookup(outside | (tail & !mask)), None);
    }

    #[test]
    fn prop_node_count_monotonic(
        stride in any::<Stride>(),
        records in prop::collection::vec(record_strategy(), 0..=48),
    ) {
        let mut trie = MultibitTrie::new(stride);
        let mut last = trie.node_count();
        for record in &records {
            trie.insert_record(record).unwrap();
            prop_assert!(trie.node_count() >= last);
            last = trie.node_count();
        }
        prop_assert_eq!(trie.dump().count(), trie.node_count());
        validate_trie(&trie);
    }
}

fn for_each_permutation<T: Clone>(items: &[T], mut f: impl FnMut(Vec<T>)) {
    fn rec<T: Clone>(items: &[T], used: &mut [bool], out: &mut Vec<T>, f: &mut impl FnMut(Vec<T>)) {
        if out.len() == items.len() {
            f(out.clone());
            return;
        }
        for i in 0..items.len() {
            if used[i] {
                continue;
            }
            used[i] = true;
            out.push(items[i].clone());
            rec(items, used, out, f);
            out.pop();
            used[i] = false;
        }
    }

    let mut used = vec![false; items.len()];
    let mut out = Vec::with_capacity(items.len());
    rec(items, &mut used, &mut out, &mut f);
}

#[test]
fn exhaustive_insert_order_overlapping_set() {
    // Distinct (prefix, length) pairs, so the answer cannot depend on order.
    let records = vec![
        PrefixRecord::new(0x0000_0000, 0, 1).unwrap(),
        PrefixRecord::new(0x0A00_0000, 7, 2).unwrap(),
        PrefixRecord::new(0x0A00_0000, 8, 3).unwrap(),
        PrefixRecord::new(0x0A40_0000, 10, 4).unwrap(),
        PrefixRecord::new(0x0A41_0000, 16, 5).unwrap(),
        PrefixRecord::new(0x0A41_0080, 25, 6).unwrap(),
    ];
    let addresses = probes(&records, &[0x0B00_0000, 0x0A41_00FF, 0x0A7F_FFFF]);

    for stride in Stride::ALL {
        let baseline = MultibitTrie::from_records(stride, records.iter().copied()).unwrap();
        let expected: Vec<Option<NextHop>> =
            addresses.iter().map(|&a| baseline.lookup(a)).collect();

        for_each_permutation(&records, |perm| {
            let reference: ReferenceLpm = perm.iter().copied().collect();
            let trie = MultibitTrie::from_records(stride, perm).unwrap();
            validate_trie(&trie);
            assert_eq!(trie.node_count(), baseline.node_count());

            let got: Vec<Option<NextHop>> = addresses.iter().map(|&a| trie.lookup(a)).collect();
            assert_eq!(got, expected, "stride {stride}");
            let report = check_correctness(&trie, &reference, addresses.iter().copied());
            assert!(report.is_ok(), "stride {stride}: {:?}", report.mismatches);
        });
    }
}

#[test]
fn randomized_table_matches_reference() {
    let mut rng = StdRng::seed_from_u64(42);
    let records: Vec<PrefixRecord> = (0..1000)
        .map(|i| PrefixRecord {
            prefix: rng.gen(),
            // Skew towards realistic table lengths.
            length: if rng.gen_bool(0.8) {
                rng.gen_range(8..=24)
            } else {
                rng.gen_range(0..=MAX_PREFIX_LEN)
            },
            next_hop: i,
        })
        .collect();
    let mut addresses: Vec<u32> = (0..4000).map(|_| rng.gen()).collect();
    addresses.extend(probes(&records, &[]));

    let reference: ReferenceLpm = records.iter().copied().collect();
    for stride in Stride::ALL {
        let trie = MultibitTrie::from_records(stride, records.iter().copied()).unwrap();
        validate_trie(&trie);
        let report = check_correctness(&trie, &reference, addresses.iter().copied());
        assert!(report.is_ok(), "stride {stride}: {:?}", &report.mismatches[..1]);
        assert_eq!(report.total, addresses.len());
    }
}
