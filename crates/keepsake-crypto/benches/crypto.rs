use keepsake_crypto::{decrypt, derive_bundle_key, encrypt, generate_iv, unwrap, wrap, DataKey, ItemKey};

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_encrypt(bencher: divan::Bencher, size: usize) {
    let item_key = ItemKey::generate();
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| encrypt(divan::black_box(&data), divan::black_box(&item_key)).unwrap());
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_decrypt(bencher: divan::Bencher, size: usize) {
    let item_key = ItemKey::generate();
    let data = make_data(size);
    let encrypted = encrypt(&data, &item_key).unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| decrypt(divan::black_box(&encrypted), divan::black_box(&item_key)).unwrap());
}

#[divan::bench]
fn bench_wrap_item_key(bencher: divan::Bencher) {
    let data_key = DataKey::generate();
    let item_key = ItemKey::generate();
    let iv = generate_iv();
    bencher.bench(|| wrap(divan::black_box(&item_key), divan::black_box(&data_key), &iv).unwrap());
}

#[divan::bench]
fn bench_unwrap_item_key(bencher: divan::Bencher) {
    let data_key = DataKey::generate();
    let iv = generate_iv();
    let wrapped = wrap(&ItemKey::generate(), &data_key, &iv).unwrap();
    bencher.bench(|| {
        let key: ItemKey = unwrap(divan::black_box(&wrapped), &data_key, &iv).unwrap();
        key
    });
}

#[divan::bench(sample_count = 10)]
fn bench_derive_bundle_key() {
    divan::black_box(derive_bundle_key(divan::black_box("tok-abc123")));
}

fn main() {
    divan::main();
}
