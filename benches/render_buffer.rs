use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ratatui::style::Style;
use simpl::core::render_buffer::RenderBuffer;
use simpl::ui::markdown::render_markdown;

fn make_output(lines: usize) -> String {
    let mut out = String::new();
    for i in 0..lines {
        out.push_str(&format!(
            "{i:>6} lorem ipsum dolor sit amet consectetur adipiscing elit\r\n"
        ));
    }
    out
}

/// Split `text` into pieces that ignore line boundaries, like pipe reads do.
fn chunks(text: &str, size: usize) -> Vec<String> {
    text.as_bytes()
        .chunks(size)
        .map(|c| String::from_utf8_lossy(c).into_owned())
        .collect()
}

fn bench_render_buffer(c: &mut Criterion) {
    for &lines in &[1_000usize, 20_000] {
        let output = make_output(lines);
        let pieces = chunks(&output, 512);

        let mut group = c.benchmark_group(format!("render_buffer_lines{lines}"));
        group.throughput(Throughput::Bytes(output.len() as u64));

        for &visible in &[15usize, 60] {
            group.bench_function(BenchmarkId::new("ingest", visible), |b| {
                b.iter(|| {
                    let mut buffer = RenderBuffer::new(visible);
                    for piece in &pieces {
                        buffer.add_chunk(piece);
                    }
                    buffer.render_lines(true).len()
                })
            });
        }

        // A redraw per chunk, as the live region does at high refresh rates.
        group.bench_function(BenchmarkId::new("ingest_and_render", 15), |b| {
            b.iter(|| {
                let mut buffer = RenderBuffer::new(15);
                let mut drawn = 0;
                for piece in &pieces {
                    buffer.add_chunk(piece);
                    drawn += buffer.render_lines(true).len();
                }
                drawn
            })
        });
        group.finish();
    }
}

fn bench_markdown(c: &mut Criterion) {
    let reply = "## Answer\n\nUse `ls -la` to list **all** files:\n\n\
                 ```sh\nls -la\n```\n\n- one\n- two\n\n"
        .repeat(50);
    c.bench_function("markdown_reply", |b| {
        b.iter(|| render_markdown(&reply, Style::default()).len())
    });
}

criterion_group!(benches, bench_render_buffer, bench_markdown);
criterion_main!(benches);
