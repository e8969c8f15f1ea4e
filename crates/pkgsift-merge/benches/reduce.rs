use chrono::{TimeZone, Utc};
use pkgsift_merge::{DocInfo, NewDocAction, partition, reduce_group};

fn synthetic_ids(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| format!("github.com/user{}/repo-{i}", i % 977))
        .collect()
}

#[divan::bench(args = [16, 128, 1024])]
fn partition_ids(bencher: divan::Bencher, parts: usize) {
    let ids = synthetic_ids(10_000);
    bencher.bench(|| {
        ids.iter()
            .map(|id| partition(divan::black_box(id), parts))
            .sum::<usize>()
    });
}

#[divan::bench(args = [1, 4, 32])]
fn reduce_one_group(bencher: divan::Bencher, deltas: usize) {
    let base = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    let mut group = vec![NewDocAction::original(DocInfo::new("github.com/a/b", base))];
    for i in 0..deltas {
        let at = base + chrono::Duration::seconds(i as i64);
        group.push(NewDocAction::update(DocInfo::new("github.com/a/b", at)));
    }
    bencher
        .with_inputs(|| group.clone())
        .bench_values(reduce_group);
}

fn main() {
    divan::main();
}
