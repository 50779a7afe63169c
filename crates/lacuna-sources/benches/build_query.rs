//! Benchmark provider query construction over large reference batches

use lacuna_core::Reference;

fn main() {
    divan::main();
}

fn references(n: usize) -> Vec<Reference> {
    (0..n)
        .map(|i| Reference {
            openalex_id: Some(format!("W{i}")),
            doi: Some(format!("10.1234/test.{i}")),
            pubmed_id: Some(format!("{}", 10_000_000 + i)),
            ..Default::default()
        })
        .collect()
}

#[divan::bench(args = [25, 250])]
fn scopus(bencher: divan::Bencher, n: usize) {
    let refs = references(n);
    bencher.bench(|| lacuna_sources::scopus::build_query(divan::black_box(&refs)));
}

#[divan::bench(args = [25, 250])]
fn dimensions(bencher: divan::Bencher, n: usize) {
    let refs = references(n);
    bencher.bench(|| lacuna_sources::dimensions::build_query(divan::black_box(&refs)));
}

#[divan::bench(args = [25, 250])]
fn wos(bencher: divan::Bencher, n: usize) {
    let refs = references(n);
    bencher.bench(|| lacuna_sources::wos::build_query(divan::black_box(&refs)));
}
