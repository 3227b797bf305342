//! Integration tests for pair expansion and the batch stream

use caption_net_common::{
    Descriptions, TokenId, TokenizerAdapter, Vocabulary, END_TOKEN, START_TOKEN,
};
use caption_net_training::{
    expand_caption, sequence_batch_stream, steps_per_epoch, FeatureStore, SequenceBatch,
    StreamConfig, TrainingError,
};
use ndarray::{Array1, ArrayD, Axis, IxDyn};

const MAX_LENGTH: usize = 6;

/// One (embedding bits, padded prefix, target) row
type Pair = (Vec<u32>, Vec<TokenId>, TokenId);

fn pairs(batch: &SequenceBatch) -> Vec<Pair> {
    let targets = batch.target_ids();
    batch
        .image_input
        .axis_iter(Axis(0))
        .zip(batch.text_input.axis_iter(Axis(0)))
        .zip(targets)
        .map(|((image, prefix), target)| {
            (
                image.iter().map(|v| v.to_bits()).collect(),
                prefix.to_vec(),
                target,
            )
        })
        .collect()
}

fn dataset() -> (Descriptions, Vocabulary) {
    let descriptions: Descriptions = [
        ("img1", "startseq cat sat endseq"),
        ("img1", "startseq cat sat on mat endseq"),
        ("img2", "startseq dog runs endseq"),
        ("img3", "startseq dog sat on cat endseq"),
        ("img4", "startseq cat runs endseq"),
        ("img5", "startseq mat endseq"),
    ]
    .into_iter()
    .collect();
    let vocab =
        Vocabulary::fit_on_texts(descriptions.all_captions(), START_TOKEN, END_TOKEN).unwrap();
    (descriptions, vocab)
}

/// Native `[1, 3]` embedding with values unique to `seed`
fn native_embedding(seed: f32) -> ArrayD<f32> {
    ArrayD::from_shape_vec(IxDyn(&[1, 3]), vec![seed, seed + 0.5, -seed]).unwrap()
}

fn features_for(ids: &[&str]) -> FeatureStore {
    ids.iter()
        .enumerate()
        .map(|(i, id)| (id.to_string(), native_embedding(i as f32 + 1.0)))
        .collect()
}

fn sorted(mut pairs: Vec<Pair>) -> Vec<Pair> {
    pairs.sort();
    pairs
}

/// One full pass yields exactly the pairs of expanding every image on its own
#[test]
fn test_full_pass_matches_per_image_expansion() {
    let (descriptions, vocab) = dataset();
    let store = features_for(&["img1", "img2", "img3", "img4", "img5"]);
    let vocab_size = vocab.vocab_size();

    let mut expected = Vec::new();
    for (key, captions) in descriptions.iter() {
        let embedding: Array1<f32> = store.get(key).unwrap().iter().copied().collect();
        let batch =
            expand_caption(&vocab, captions, embedding.view(), MAX_LENGTH, vocab_size).unwrap();
        expected.extend(pairs(&batch));
    }

    let config = StreamConfig::new(MAX_LENGTH, vocab_size, 2);
    let steps = steps_per_epoch(descriptions.len(), config.batch_size);
    assert_eq!(steps, 2);

    // 5 images in windows of 2 -> 3 batches per pass
    let mut stream = sequence_batch_stream(&descriptions, &store, &vocab, config).unwrap();
    let mut streamed = Vec::new();
    for batch in stream.by_ref().take(3) {
        let batch = batch.unwrap();
        assert!(!batch.is_empty());
        assert_eq!(batch.text_input.ncols(), MAX_LENGTH);
        assert_eq!(batch.targets.ncols(), vocab_size);
        streamed.extend(pairs(&batch));
    }

    assert_eq!(streamed.len(), expected.len());
    assert_eq!(sorted(streamed), sorted(expected));
    assert_eq!(stream.stats().skipped_keys, 0);
    assert_eq!(stream.stats().empty_windows, 0);
}

/// The stream keeps cycling with every key matched and never yields an empty batch
#[test]
fn test_stream_never_yields_empty_batches() {
    let (descriptions, vocab) = dataset();
    let store = features_for(&["img1", "img2", "img3", "img4", "img5"]);
    let config = StreamConfig::new(MAX_LENGTH, vocab.vocab_size(), 3);

    let mut stream = sequence_batch_stream(&descriptions, &store, &vocab, config).unwrap();
    for batch in stream.by_ref().take(20) {
        assert!(!batch.unwrap().is_empty());
    }
    assert_eq!(stream.stats().batches, 20);
    assert_eq!(stream.stats().passes, 9);
}

/// A key without an embedding adds nothing and is counted; other keys are unaffected
#[test]
fn test_missing_embedding_is_skipped() {
    let (descriptions, vocab) = dataset();
    let full = features_for(&["img1", "img2", "img3", "img4", "img5"]);
    let mut partial = FeatureStore::new();
    for key in ["img1", "img3", "img4", "img5"] {
        partial.insert(key, full.get(key).unwrap().clone());
    }
    let config = StreamConfig::new(MAX_LENGTH, vocab.vocab_size(), 5);

    let mut full_stream = sequence_batch_stream(&descriptions, &full, &vocab, config).unwrap();
    let full_batch = full_stream.next().unwrap().unwrap();

    let mut stream = sequence_batch_stream(&descriptions, &partial, &vocab, config).unwrap();
    let batch = stream.next().unwrap().unwrap();

    let img2_embedding: Vec<u32> = full.get("img2").unwrap().iter().map(|v| v.to_bits()).collect();
    let img2_pairs = descriptions.get("img2").unwrap()[0].split_whitespace().count() - 1;

    let all_pairs = pairs(&full_batch);
    let kept: Vec<Pair> = all_pairs
        .iter()
        .filter(|(image, _, _)| *image != img2_embedding)
        .cloned()
        .collect();

    assert_eq!(all_pairs.len() - kept.len(), img2_pairs);
    assert_eq!(pairs(&batch), kept);
    assert_eq!(stream.stats().skipped_keys, 1);
}

/// With no embedding anywhere the bounded stream reports the condition once and ends
#[test]
fn test_all_mismatched_reports_no_matching_data() {
    let (descriptions, vocab) = dataset();
    let store = features_for(&["other1", "other2"]);
    let config = StreamConfig::new(MAX_LENGTH, vocab.vocab_size(), 2).with_max_empty_passes(2);

    let mut stream = sequence_batch_stream(&descriptions, &store, &vocab, config).unwrap();
    match stream.next() {
        Some(Err(TrainingError::NoMatchingData { passes })) => assert_eq!(passes, 2),
        other => panic!("expected NoMatchingData, got {:?}", other.map(|r| r.map(|b| b.len()))),
    }
    assert!(stream.next().is_none());

    let stats = stream.stats();
    assert_eq!(stats.passes, 2);
    assert_eq!(stats.batches, 0);
    assert_eq!(stats.skipped_keys, 10);
    assert_eq!(stats.empty_windows, 6);
}

/// Stored `[1, 3]` embeddings reach the batch as flat rows of 3
#[test]
fn test_native_embeddings_are_flattened() {
    let (descriptions, vocab) = dataset();
    let store = features_for(&["img1"]);
    let config = StreamConfig::new(MAX_LENGTH, vocab.vocab_size(), 1);

    let mut stream = sequence_batch_stream(&descriptions, &store, &vocab, config).unwrap();
    let batch = stream.next().unwrap().unwrap();

    assert_eq!(batch.image_input.ncols(), 3);
    for row in batch.image_input.axis_iter(Axis(0)) {
        assert_eq!(row.to_vec(), vec![1.0, 1.5, -1.0]);
    }
}
