use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use docrag::models::{Document, Metadata};
use docrag::services::TextChunker;

fn sample_text(paragraphs: usize) -> String {
    let paragraph = "The battery pack uses lithium iron phosphate cells. \
        Each module is monitored for temperature and voltage. \
        Balancing runs whenever the pack is idle and fully charged.";
    vec![paragraph; paragraphs].join("\n\n")
}

fn bench_split(c: &mut Criterion) {
    let chunker = TextChunker::with_defaults();
    let mut group = c.benchmark_group("split");

    for paragraphs in [10, 100, 1000] {
        let text = sample_text(paragraphs);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(paragraphs), &text, |b, text| {
            b.iter(|| chunker.split(black_box(text)))
        });
    }
    group.finish();
}

fn bench_chunk_document(c: &mut Criterion) {
    let chunker = TextChunker::new(500, 50).unwrap();
    let document = Document::new(sample_text(200), "bench.txt", Metadata::new());

    c.bench_function("chunk_document_500_50", |b| {
        b.iter(|| chunker.chunk(black_box(&document)))
    });
}

criterion_group!(benches, bench_split, bench_chunk_document);
criterion_main!(benches);
