use seqrets_chunks::{checksum, decode, encode, encode_text, ChunkAssembler};

fn make_data(size: usize) -> Vec<u8> {
    // Semi-realistic data: repeating pattern with some entropy
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn chunk_encode(bencher: divan::Bencher, size: usize) {
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| encode(divan::black_box(&data), 700).unwrap());
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn chunk_decode(bencher: divan::Bencher, size: usize) {
    let chunks = encode(&make_data(size), 700).unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| decode(divan::black_box(&chunks)).unwrap());
}

#[divan::bench(args = [1024, 65536])]
fn assemble_text(bencher: divan::Bencher, size: usize) {
    let texts = encode_text(&make_data(size), 700).unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            let mut asm = ChunkAssembler::new();
            for t in texts.iter().rev() {
                asm.push_text(divan::black_box(t)).unwrap();
            }
            asm.finish().unwrap()
        });
}

#[divan::bench(args = [700, 65536])]
fn blake3_checksum(bencher: divan::Bencher, size: usize) {
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| checksum(divan::black_box(&data)));
}

fn main() {
    divan::main();
}
