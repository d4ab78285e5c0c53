// Benchmark for emulation throughput and image loading
// Run with: cargo bench

use criterion::{criterion_group, criterion_main, Criterion};
use pinwire_mcu::encoding::*;
use pinwire_mcu::{parse_intel_hex, Board, ExecutableImage, FLASH_BYTES};

fn blink_words() -> Vec<u16> {
    vec![
        ldi(16, 0x20),
        out(0x04, 16),
        out(0x05, 16),
        rcall(3),
        out(0x05, 1),
        rcall(1),
        rjmp(-5),
        ldi(24, 0xFF),
        ldi(25, 0xFF),
        sbiw(24, 1),
        brne(-2),
        ret(),
    ]
}

fn bench_run_burst(c: &mut Criterion) {
    let image = ExecutableImage::from_bytes(&words_to_bytes(&blink_words()));
    c.bench_function("run_burst 100k steps (blink)", |b| {
        let mut board = Board::new(&image);
        b.iter(|| {
            let report = board.run_burst(100_000);
            assert!(report.fault.is_none());
        });
    });
}

fn bench_snapshot(c: &mut Criterion) {
    let image = ExecutableImage::from_bytes(&words_to_bytes(&blink_words()));
    let mut board = Board::new(&image);
    board.run_burst(10);
    let pins = [0, 1, 2, 3, 4, 5, 6, 7, 13];
    c.bench_function("snapshot 9 pins", |b| {
        b.iter(|| board.snapshot(&pins));
    });
}

fn bench_parse_hex(c: &mut Criterion) {
    let words: Vec<u16> = (0..8_192u16).map(|i| if i % 2 == 0 { nop() } else { inc(16) }).collect();
    let hex = words_to_hex(&words);
    c.bench_function("parse 16 KiB hex image", |b| {
        b.iter(|| {
            let image = parse_intel_hex(&hex, FLASH_BYTES).unwrap();
            assert_eq!(image.byte_len(), 16_384);
        });
    });
}

criterion_group!(benches, bench_run_burst, bench_snapshot, bench_parse_hex);
criterion_main!(benches);
