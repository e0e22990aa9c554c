//! End-to-end scenarios over the assembled service with capability fakes.

mod common;

use common::{harness, harness_with, model_calls};
use dalil::{Config, MessageRole, QueryRoute};

#[tokio::test]
async fn greeting_skips_every_model() {
    let h = harness().await;

    let result = h.service.query("مرحبا", "s1", true).await.unwrap();

    assert_eq!(result.query_type, QueryRoute::Greeting);
    assert!(result.sources.is_empty());
    assert!(!result.answer.is_empty());
    assert_eq!(model_calls(&h), (0, 0, 0));

    // Both turns landed in memory for s1
    let history = h.service.history("s1", None).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, MessageRole::User);
    assert_eq!(history[0].content, "مرحبا");
    assert_eq!(history[1].role, MessageRole::Assistant);
}

#[tokio::test]
async fn rag_query_grounds_answer_in_ingested_document() {
    let h = harness().await;

    h.service
        .ingest_texts(&["القاهرة هي عاصمة مصر.".to_string()], &[], None)
        .await
        .unwrap();

    let result = h
        .service
        .query("ما هي عاصمة مصر؟", "s2", true)
        .await
        .unwrap();

    assert_eq!(result.query_type, QueryRoute::Rag);
    assert!(!result.sources.is_empty());
    assert!(result.sources[0].content.contains("القاهره"));
    assert!(result.answer.contains("القاهره"));

    let history = h.service.history("s2", None).await.unwrap();
    assert_eq!(history.len(), 2);
    // The stored user turn is the original text, unnormalized
    assert_eq!(history[0].content, "ما هي عاصمة مصر؟");
}

#[tokio::test]
async fn followup_sees_prior_turns_in_order() {
    let h = harness().await;

    h.service
        .ingest_texts(&["القاهرة هي عاصمة مصر.".to_string()], &[], None)
        .await
        .unwrap();

    h.service
        .query("ما هي عاصمة مصر؟", "s2", true)
        .await
        .unwrap();
    let first_answer = h.service.history("s2", None).await.unwrap()[1]
        .content
        .clone();

    h.service
        .query("وما عدد سكانها؟", "s2", true)
        .await
        .unwrap();

    // The generator's last request carried both prior turns, in order,
    // before the current question.
    let request = h.generator.last_request();
    let contents: Vec<&str> = request.iter().map(|m| m.content.as_str()).collect();
    let user_pos = contents
        .iter()
        .position(|c| c.contains("ما هي عاصمة مصر؟"))
        .expect("prior user turn present");
    let assistant_pos = contents
        .iter()
        .position(|c| *c == first_answer)
        .expect("prior assistant turn present");
    assert!(user_pos < assistant_pos);
    assert!(assistant_pos < contents.len() - 1);
}

#[tokio::test]
async fn calculator_answers_without_models() {
    let h = harness().await;

    let result = h.service.query("1 + 1", "s3", true).await.unwrap();

    assert_eq!(result.query_type, QueryRoute::Calculator);
    assert_eq!(result.answer, "2");
    assert!(result.sources.is_empty());
    assert_eq!(model_calls(&h), (0, 0, 0));
}

#[tokio::test]
async fn ingest_counts_add_up_and_queries_hit_them() {
    let h = harness().await;

    let texts = vec![
        "النيل اطول نهر في العالم.".to_string(),
        "الاسكندرية ميناء مصر الرئيسي على البحر المتوسط.".to_string(),
        "اهرامات الجيزة من عجائب الدنيا السبع.".to_string(),
    ];
    let outcome = h.service.ingest_texts(&texts, &[], None).await.unwrap();
    assert_eq!(outcome.documents, 3);

    let info = h.service.collection_info("arabic_documents").await.unwrap();
    assert_eq!(info.points_count as usize, outcome.chunks);

    let result = h
        .service
        .query("ما هو اطول نهر في العالم؟", "s4", true)
        .await
        .unwrap();
    assert!(!result.sources.is_empty());
}

#[tokio::test]
async fn oversize_file_rejected_and_collection_untouched() {
    let mut config = Config::default();
    config.ingestion.max_file_size_bytes = 1024;
    let h = harness_with(config).await;

    let before = h
        .service
        .collection_info("arabic_documents")
        .await
        .unwrap()
        .points_count;

    let big = vec![b'x'; 1025];
    let err = h
        .service
        .ingest_file(&big, "big.txt", None, None, None)
        .await
        .unwrap_err();
    assert_eq!(err.exit_code(), 5);

    let after = h
        .service
        .collection_info("arabic_documents")
        .await
        .unwrap()
        .points_count;
    assert_eq!(before, after);
}

#[tokio::test]
async fn file_at_exact_limit_succeeds() {
    let mut config = Config::default();
    config.ingestion.max_file_size_bytes = 1024;
    let h = harness_with(config).await;

    let exact = vec![b'x'; 1024];
    let report = h
        .service
        .ingest_file(&exact, "exact.txt", None, None, None)
        .await
        .unwrap();
    assert!(report.chunks > 0);
}

#[tokio::test]
async fn empty_query_returns_canned_reply_without_calls() {
    let h = harness().await;

    // Whitespace and diacritics only: empty after normalization
    let result = h.service.query("  \u{064B}\u{0640}  ", "s5", true).await.unwrap();

    assert_eq!(result.query_type, QueryRoute::Simple);
    assert!(result.sources.is_empty());
    assert!(!result.answer.is_empty());
    assert_eq!(model_calls(&h), (0, 0, 0));
    // The early return never touches memory
    assert!(h.service.history("s5", None).await.unwrap().is_empty());
}

#[tokio::test]
async fn rag_over_empty_collection_still_generates() {
    let h = harness().await;

    let result = h
        .service
        .query("ما هي عاصمة مصر؟", "s6", true)
        .await
        .unwrap();

    assert_eq!(result.query_type, QueryRoute::Rag);
    assert!(result.sources.is_empty());
    // One embed for the query, no rerank on zero candidates, one generate
    assert_eq!(model_calls(&h), (1, 0, 1));
    assert!(!result.answer.is_empty());
}

#[tokio::test]
async fn rag_invariant_exactly_one_generate_at_most_one_rerank() {
    let h = harness().await;

    h.service
        .ingest_texts(&["القاهرة هي عاصمة مصر.".to_string()], &[], None)
        .await
        .unwrap();
    let ingest_embeds = h
        .embedder
        .calls
        .load(std::sync::atomic::Ordering::SeqCst);

    h.service
        .query("ما هي عاصمة مصر؟", "s7", true)
        .await
        .unwrap();

    let (embeds, reranks, generates) = model_calls(&h);
    assert_eq!(embeds - ingest_embeds, 1);
    assert_eq!(reranks, 1);
    assert_eq!(generates, 1);
}

#[tokio::test]
async fn use_rag_false_bypasses_retrieval() {
    let h = harness().await;

    h.service
        .ingest_texts(&["القاهرة هي عاصمة مصر.".to_string()], &[], None)
        .await
        .unwrap();
    let ingest_embeds = h
        .embedder
        .calls
        .load(std::sync::atomic::Ordering::SeqCst);

    let result = h
        .service
        .query("ما هي عاصمة مصر؟", "s8", false)
        .await
        .unwrap();

    assert!(result.sources.is_empty());
    let (embeds, reranks, generates) = model_calls(&h);
    assert_eq!(embeds, ingest_embeds);
    assert_eq!(reranks, 0);
    assert_eq!(generates, 1);
}

#[tokio::test]
async fn reingest_without_dedup_doubles_chunks() {
    let h = harness().await;
    let bytes = "القاهرة هي عاصمة مصر.".as_bytes();

    let first = h
        .service
        .ingest_file(bytes, "doc.txt", None, None, None)
        .await
        .unwrap();
    let second = h
        .service
        .ingest_file(bytes, "doc.txt", None, None, None)
        .await
        .unwrap();

    assert_eq!(first.chunks, second.chunks);
    assert!(!second.duplicate);

    let info = h.service.collection_info("arabic_documents").await.unwrap();
    assert_eq!(info.points_count as usize, first.chunks + second.chunks);
}

#[tokio::test]
async fn reingest_with_dedup_reports_zero_chunks() {
    let mut config = Config::default();
    config.ingestion.dedup_enabled = true;
    let h = harness_with(config).await;
    let bytes = "القاهرة هي عاصمة مصر.".as_bytes();

    h.service
        .ingest_file(bytes, "doc.txt", None, None, None)
        .await
        .unwrap();
    let second = h
        .service
        .ingest_file(bytes, "doc.txt", None, None, None)
        .await
        .unwrap();

    assert!(second.duplicate);
    assert_eq!(second.documents, 1);
    assert_eq!(second.chunks, 0);
}

#[tokio::test]
async fn clear_history_roundtrip() {
    let h = harness().await;

    h.service.query("مرحبا", "s9", true).await.unwrap();
    assert_eq!(h.service.history("s9", None).await.unwrap().len(), 2);

    let deleted = h.service.clear_history("s9").await.unwrap();
    assert_eq!(deleted, 2);
    assert!(h.service.history("s9", None).await.unwrap().is_empty());
}

#[tokio::test]
async fn sessions_do_not_leak_into_each_other() {
    let h = harness().await;

    h.service.query("مرحبا", "alpha", true).await.unwrap();
    h.service.query("hello", "beta", true).await.unwrap();

    let alpha = h.service.history("alpha", None).await.unwrap();
    let beta = h.service.history("beta", None).await.unwrap();
    assert_eq!(alpha.len(), 2);
    assert_eq!(beta.len(), 2);
    assert_eq!(alpha[0].content, "مرحبا");
    assert_eq!(beta[0].content, "hello");
}

#[tokio::test]
async fn clear_documents_empties_the_collection() {
    let h = harness().await;

    h.service
        .ingest_texts(&["القاهرة هي عاصمة مصر.".to_string()], &[], None)
        .await
        .unwrap();
    assert!(
        h.service
            .collection_info("arabic_documents")
            .await
            .unwrap()
            .points_count
            > 0
    );

    h.service.clear_documents().await.unwrap();
    let info = h.service.collection_info("arabic_documents").await.unwrap();
    assert_eq!(info.points_count, 0);
}

#[tokio::test]
async fn unknown_collection_info_is_not_found() {
    let h = harness().await;
    let err = h.service.collection_info("missing").await.unwrap_err();
    assert_eq!(err.exit_code(), 3);
}

#[tokio::test]
async fn batch_tolerates_per_file_extraction_failures() {
    let h = harness().await;

    let files = vec![
        dalil::FileUpload {
            content: "نص سليم تماما هنا.".as_bytes().to_vec(),
            filename: "good.txt".to_string(),
            declared_mime: Some("text/plain".to_string()),
            custom_metadata: None,
        },
        dalil::FileUpload {
            content: b"%PDF-1.7 garbage".to_vec(),
            filename: "broken.pdf".to_string(),
            declared_mime: None,
            custom_metadata: None,
        },
    ];

    let report = h.service.ingest_batch(files).await.unwrap();

    assert_eq!(report.files.len(), 2);
    assert!(report.files[0].error.is_none());
    assert!(report.files[0].chunks > 0);
    assert!(report.files[1].error.is_some());
    assert!(report.documents >= 1);
}
