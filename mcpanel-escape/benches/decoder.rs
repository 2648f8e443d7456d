use criterion::{
    BatchSize, Criterion, black_box, criterion_group, criterion_main,
};
use mcpanel_escape::Decoder;

fn bench_decoder_throughput(c: &mut Criterion) {
    let payload = "[12:00:01 INFO]: \x1b[33mSteve\x1b[0m joined the game\r\n"
        .repeat(200);

    c.bench_function("decoder_styled_log_lines", |b| {
        b.iter_batched(
            Decoder::new,
            |mut decoder| {
                black_box(decoder.process(&payload));
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_decoder_plain_text(c: &mut Criterion) {
    let payload = "plain console line without styling\n".repeat(400);

    c.bench_function("decoder_plain_lines", |b| {
        b.iter_batched(
            Decoder::new,
            |mut decoder| {
                black_box(decoder.process(&payload));
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_decoder_throughput, bench_decoder_plain_text);
criterion_main!(benches);
