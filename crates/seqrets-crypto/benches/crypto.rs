use secrecy::SecretString;
use seqrets_core::RawInstruction;
use seqrets_crypto::{decrypt, encrypt, reconstruct, split, KdfParams};

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

#[divan::bench(args = [32, 1024, 65536])]
fn bench_split_3_of_5(bencher: divan::Bencher, size: usize) {
    let secret = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| split(divan::black_box(&secret), 3, 5, "bench").unwrap());
}

#[divan::bench(args = [32, 1024, 65536])]
fn bench_reconstruct_3_of_5(bencher: divan::Bencher, size: usize) {
    let secret = make_data(size);
    let shares = split(&secret, 3, 5, "bench").unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| reconstruct(divan::black_box(&shares[1..4])).unwrap());
}

#[divan::bench(args = [1024, 65536])]
fn bench_encrypt_instruction(bencher: divan::Bencher, size: usize) {
    let inst = RawInstruction::from_bytes("bench.bin", &make_data(size), "application/octet-stream");
    let password = SecretString::from("bench-password".to_string());
    let params = KdfParams::insecure_fast();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| encrypt(divan::black_box(&inst), &password, None, &params).unwrap());
}

#[divan::bench(args = [1024, 65536])]
fn bench_decrypt_instruction(bencher: divan::Bencher, size: usize) {
    let inst = RawInstruction::from_bytes("bench.bin", &make_data(size), "application/octet-stream");
    let password = SecretString::from("bench-password".to_string());
    let enc = encrypt(&inst, &password, None, &KdfParams::insecure_fast()).unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| decrypt(divan::black_box(&enc), &password, None).unwrap());
}

fn main() {
    divan::main();
}
