// Decoding benchmark - greedy vs beam search over a synthetic oracle
//
// Run with: cargo bench --bench decoding_bench

use caption_net::common::{NextTokenOracle, OracleError, TokenId, PAD_ID};
use caption_net::onnx::{preprocess_image, IMAGE_SIZE};
use caption_net::{SearchStrategy, TextGenerator, Vocabulary};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{DynamicImage, ImageBuffer, Rgb, RgbImage};
use ndarray::{Array1, ArrayView1};

const VOCAB_WORDS: usize = 2000;
const MAX_LENGTH: usize = 34;

/// Peaked distribution keyed on the last real token, never favouring END
struct SyntheticOracle {
    vocab_size: usize,
}

impl NextTokenOracle for SyntheticOracle {
    fn predict(
        &mut self,
        _embedding: ArrayView1<'_, f32>,
        padded_prefix: &[TokenId],
    ) -> Result<Array1<f32>, OracleError> {
        let last = padded_prefix
            .iter()
            .rev()
            .copied()
            .find(|&id| id != PAD_ID)
            .unwrap_or(PAD_ID) as usize;

        let mut probs = Array1::from_elem(self.vocab_size, 0.5 / self.vocab_size as f32);
        let favourite = 2 + (last * 7 + 3) % (self.vocab_size - 3);
        probs[favourite] += 0.3;
        probs[2 + (favourite + 1) % (self.vocab_size - 3)] += 0.2;
        Ok(probs)
    }
}

/// startseq, w0..wN, endseq
fn synthetic_vocab() -> Vocabulary {
    let words = std::iter::once("startseq".to_string())
        .chain((0..VOCAB_WORDS).map(|i| format!("w{}", i)))
        .chain(std::iter::once("endseq".to_string()));
    Vocabulary::from_words(words, "startseq", "endseq").unwrap()
}

fn bench_decoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("decoding");
    let embedding = Array1::from_elem(4096, 0.01f32);
    let vocab_size = VOCAB_WORDS + 3;

    let mut generator =
        TextGenerator::from_tokenizer(SyntheticOracle { vocab_size }, synthetic_vocab()).unwrap();

    group.bench_function("greedy", |b| {
        b.iter(|| {
            let caption = generator
                .decode(black_box(embedding.view()), SearchStrategy::Greedy, MAX_LENGTH, 1)
                .unwrap();
            black_box(caption);
        });
    });

    for beams in [1usize, 3, 5] {
        group.bench_with_input(BenchmarkId::new("beam", beams), &beams, |b, &k| {
            b.iter(|| {
                let caption = generator
                    .decode(black_box(embedding.view()), SearchStrategy::Beam, MAX_LENGTH, k)
                    .unwrap();
                black_box(caption);
            });
        });
    }

    group.finish();
}

fn bench_vgg_preprocessing(c: &mut Criterion) {
    let mut group = c.benchmark_group("vgg_preprocessing");

    for (resolution, name) in [(224u32, "224x168"), (500, "500x375"), (1024, "1024x768")] {
        let test_image: RgbImage = ImageBuffer::from_fn(resolution, resolution * 3 / 4, |x, y| {
            Rgb([
                ((x + y) % 256) as u8,
                ((x * 2) % 256) as u8,
                ((y * 2) % 256) as u8,
            ])
        });
        let test_image = DynamicImage::ImageRgb8(test_image);

        group.bench_with_input(BenchmarkId::new("resize_bgr", name), &test_image, |b, img| {
            b.iter(|| black_box(preprocess_image(black_box(img), IMAGE_SIZE)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_decoding, bench_vgg_preprocessing);
criterion_main!(benches);
