// tests/dispatch_batch.rs
//
// Batch dispatcher behaviour through the public API:
// - rules-only end-to-end classification
// - order preservation across mixed cache hits/misses
// - per-task failure falls back to rules, per-comment malformed output degrades one comment

use std::sync::Arc;

use comment_analyzer::analyze::{
    AdapterSet, BatchDispatcher, BatchItem, BlockingAdapter, DynAdapter, FixedAdapter, LabelScore,
    RawOutput,
};
use comment_analyzer::config::AnalyzerConfig;
use comment_analyzer::model::{Category, ConfidenceScores, Sentiment, Task};

fn items(pairs: &[(&str, &str)]) -> Vec<BatchItem> {
    pairs.iter().map(|(t, id)| BatchItem::new(*t, *id)).collect()
}

#[tokio::test]
async fn rules_only_end_to_end() {
    let d = BatchDispatcher::rules_only(&AnalyzerConfig::default());
    let batch = items(&[
        ("I love this serum, amazing glow!", "c1"),
        ("buy now click here", "c2"),
        ("k", "c3"),
    ]);
    let out = d.process_batch(&batch).await.expect("batch");
    assert_eq!(out.len(), 3);

    let c1 = &out[0];
    assert_eq!(c1.comment_id, "c1");
    assert_eq!(c1.sentiment, Sentiment::Positive);
    assert_eq!(c1.category, Category::Skincare);
    assert!(!c1.is_spam);

    let c2 = &out[1];
    assert_eq!(c2.comment_id, "c2");
    assert!(c2.is_spam);

    let c3 = &out[2];
    assert_eq!(c3.comment_id, "c3");
    assert_eq!(c3.sentiment, Sentiment::Neutral);
    assert!(!c3.is_spam);
    assert!(c3.quality_score < 0.5, "length penalty expected, got {}", c3.quality_score);

    // no adapters: every task reports the no-result confidence
    for r in &out {
        assert_eq!(r.confidence_scores, ConfidenceScores::uniform(0.3));
    }
}

#[tokio::test]
async fn order_survives_partial_cache_hits() {
    let d = BatchDispatcher::rules_only(&AnalyzerConfig::default());
    d.process_batch(&items(&[("second text", "warm-b"), ("fourth text", "warm-d")]))
        .await
        .expect("warm cache");

    let batch = items(&[
        ("first text", "a"),
        ("second text", "b"),
        ("third text", "c"),
        ("fourth text", "d"),
        ("fifth text", "e"),
    ]);
    let out = d.process_batch(&batch).await.expect("batch");
    let ids: Vec<&str> = out.iter().map(|r| r.comment_id.as_str()).collect();
    assert_eq!(ids, ["a", "b", "c", "d", "e"]);
    assert_eq!(out[1].processing_time, 0.0);
    assert_eq!(out[3].processing_time, 0.0);
    assert_eq!(out[1].text, "second text");
}

#[tokio::test]
async fn repeated_text_hits_cache_with_zero_processing_time() {
    let slow: DynAdapter = Arc::new(BlockingAdapter::new("slow", |texts: &[String]| {
        std::thread::sleep(std::time::Duration::from_millis(5));
        Ok(texts
            .iter()
            .map(|_| RawOutput::Single(LabelScore::new("MEDIUM_QUALITY", 0.6)))
            .collect())
    }));
    let d = BatchDispatcher::new(
        &AnalyzerConfig::default(),
        AdapterSet::rules_only().with(Task::Quality, slow),
    );
    let batch = items(&[("Is this safe for sensitive skin?", "q1")]);

    let first = d.process_batch(&batch).await.expect("first");
    assert!(first[0].processing_time > 0.0);

    let second = d.process_batch(&batch).await.expect("second");
    assert_eq!(second[0].processing_time, 0.0);
    assert_eq!(first[0].sentiment, second[0].sentiment);
    assert_eq!(first[0].category, second[0].category);
    assert_eq!(first[0].is_spam, second[0].is_spam);
    assert_eq!(first[0].quality_score, second[0].quality_score);
}

#[tokio::test]
async fn failing_task_falls_back_to_rules_without_touching_other_tasks() {
    let broken: DynAdapter = Arc::new(BlockingAdapter::new("broken", |_texts: &[String]| {
        Err(anyhow::anyhow!("model not loaded"))
    }));
    let category: DynAdapter = Arc::new(FixedAdapter::for_task(Task::Category, Some("makeup"), 0.8));
    let d = BatchDispatcher::new(
        &AnalyzerConfig::default(),
        AdapterSet::rules_only()
            .with(Task::Spam, broken)
            .with(Task::Category, category),
    );

    let out = d
        .process_batch(&items(&[("buy now click here", "s1"), ("nice serum", "s2")]))
        .await
        .expect("batch");

    assert!(out[0].is_spam, "rule verdict used for the failed spam task");
    assert!(!out[1].is_spam);
    assert!((out[0].confidence_scores.spam - 0.3).abs() < 1e-6);
    // category adapter still answered for every item
    for r in &out {
        assert_eq!(r.category, Category::Makeup);
        assert!((r.confidence_scores.category - 0.8).abs() < 1e-6);
    }
}

#[tokio::test]
async fn malformed_output_degrades_only_its_comment() {
    let sentiment: DynAdapter = Arc::new(BlockingAdapter::new("picky", |texts: &[String]| {
        Ok(texts
            .iter()
            .map(|t| {
                if t.contains("poison") {
                    RawOutput::Ranked(vec![])
                } else {
                    RawOutput::Ranked(vec![
                        LabelScore::new("POSITIVE", 0.95),
                        LabelScore::new("NEGATIVE", 0.05),
                    ])
                }
            })
            .collect())
    }));
    let d = BatchDispatcher::new(
        &AnalyzerConfig::default(),
        AdapterSet::rules_only().with(Task::Sentiment, sentiment),
    );

    let batch = items(&[
        ("arrived on tuesday", "n1"),
        ("poison pill comment", "bad"),
        ("shipped in a box", "n2"),
    ]);
    let out = d.process_batch(&batch).await.expect("batch");
    assert_eq!(out.len(), 3);

    assert_eq!(out[0].sentiment, Sentiment::Positive);
    assert_eq!(out[2].sentiment, Sentiment::Positive);
    assert!((out[0].confidence_scores.sentiment - 0.95).abs() < 1e-6);

    let bad = &out[1];
    assert_eq!(bad.comment_id, "bad");
    assert_eq!(bad.sentiment, Sentiment::Neutral);
    assert_eq!(bad.category, Category::General);
    assert_eq!(bad.quality_score, 0.5);
    assert_eq!(bad.confidence_scores, ConfidenceScores::uniform(0.3));

    // degraded results are not cached
    assert_eq!(d.cache().stats().entries, 2);
}

#[tokio::test]
async fn large_input_is_split_into_batches_in_order() {
    let mut cfg = AnalyzerConfig::default();
    cfg.batch_size = 3;
    let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let spam: DynAdapter = Arc::new(BlockingAdapter::new("counting", move |texts: &[String]| {
        assert!(texts.len() <= 3);
        seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|_| RawOutput::Single(LabelScore::new("NOT_SPAM", 0.9)))
            .collect())
    }));
    let d = BatchDispatcher::new(&cfg, AdapterSet::rules_only().with(Task::Spam, spam));

    let batch: Vec<BatchItem> = (0..8)
        .map(|i| BatchItem::new(format!("distinct comment {i}"), format!("id{i}")))
        .collect();
    let out = d.analyze(&batch).await.expect("analyze");
    assert_eq!(out.len(), 8);
    for (i, r) in out.iter().enumerate() {
        assert_eq!(r.comment_id, format!("id{i}"));
    }
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
}
