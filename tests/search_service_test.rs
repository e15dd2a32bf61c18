use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{Duration, Utc};
use tempfile::TempDir;

use xiphos::data::InteractionAction;
use xiphos::error::{Result, XiphosError};
use xiphos::ml::ranking::{RankingCollaborator, RankingContext};
use xiphos::prelude::*;
use xiphos::service::{Personalization, ResultStore, SearchResult};

fn training_data() -> TrainingData {
    TrainingData::from_queries(
        &[
            "db2 deadlock",
            "db2 sqlcode -911",
            "vsam status 35",
            "cics asra abend",
            "reset password",
        ],
        &[1.0, 1.0, 1.0, 1.0, 1.0],
    )
}

fn knowledge_base() -> Arc<InMemoryResultStore> {
    let now = Utc::now();
    Arc::new(InMemoryResultStore::new(vec![
        KnowledgeEntry::new("DB2 SQLCODE -911", "Deadlock or timeout on a DB2 table")
            .with_id("kb-1")
            .with_category("DB2")
            .with_created_at(now - Duration::days(2)),
        KnowledgeEntry::new("DB2 lock escalation", "Too many row locks held")
            .with_id("kb-2")
            .with_category("DB2")
            .with_created_at(now - Duration::days(1)),
        KnowledgeEntry::new("VSAM status 35", "Dataset not found at open")
            .with_id("kb-3")
            .with_category("VSAM")
            .with_created_at(now),
    ]))
}

fn service() -> SearchService {
    SearchService::new(ServiceConfig::default()).with_result_store(knowledge_base())
}

#[derive(Debug, Default)]
struct CountingRanker {
    calls: AtomicUsize,
}

impl RankingCollaborator for CountingRanker {
    fn rerank(
        &self,
        _query: &str,
        mut results: Vec<SearchResult>,
        _context: &RankingContext,
    ) -> Result<Vec<SearchResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        results.reverse();
        Ok(results)
    }

    fn name(&self) -> &str {
        "counting"
    }
}

#[derive(Debug)]
struct BrokenStore;

impl ResultStore for BrokenStore {
    fn retrieve(&self, _query: &str, _limit: usize) -> Result<Vec<SearchResult>> {
        Err(XiphosError::other("backend unavailable"))
    }

    fn name(&self) -> &str {
        "broken"
    }
}

#[tokio::test]
async fn test_initialize_marks_service_ready() {
    let service = service();
    assert!(!service.is_service_initialized());

    let metrics = service.initialize(&training_data()).await.unwrap();

    assert!(service.is_service_initialized());
    assert_eq!(metrics.models_trained, ModelKind::ALL.len());
    assert_eq!(service.bundle_version(), Some(1));
}

#[tokio::test]
async fn test_search_before_initialize_fails() {
    let service = service();

    let err = service.search(SearchRequest::new("x")).await.unwrap_err();

    assert!(matches!(err, XiphosError::NotInitialized(_)));
    assert!(err.to_string().contains("not initialized"));
}

#[tokio::test]
async fn test_empty_query_after_initialize() {
    let service = service();
    service.initialize(&training_data()).await.unwrap();

    let response = service.search(SearchRequest::new("")).await.unwrap();

    assert!(response.results.len() <= service.config().default_page_size);
    assert_eq!(response.pagination.total_items, response.total_count);
    assert!(!response.personalization_applied);
}

#[tokio::test]
async fn test_search_returns_results_and_suggestions() {
    let service = service();
    service.initialize(&training_data()).await.unwrap();

    let response = service.search(SearchRequest::new("db2")).await.unwrap();

    let ids: Vec<_> = response.results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["kb-2", "kb-1"]);
    assert!(!response.suggestions.is_empty());
    assert!(response.suggestions.len() <= service.config().max_suggestions);
    assert!(response.suggestions.iter().all(|s| s.text.starts_with("db2")));
    assert!(
        response
            .suggestions
            .windows(2)
            .all(|w| w[0].confidence >= w[1].confidence)
    );
    assert!(response.semantic_analysis.enhancement.is_some());
}

#[tokio::test]
async fn test_malformed_pagination_is_clamped() {
    let service = service();
    service.initialize(&training_data()).await.unwrap();

    let response = service
        .search(SearchRequest::new("db2").with_pagination(-5, 0))
        .await
        .unwrap();
    assert_eq!(response.pagination.offset, 0);
    assert_eq!(response.pagination.limit, service.config().default_page_size);
    assert_eq!(response.results.len(), 2);

    let response = service
        .search(SearchRequest::new("db2").with_pagination(1, 10_000))
        .await
        .unwrap();
    assert_eq!(response.pagination.limit, service.config().max_page_size);
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.total_count, 2);
}

#[tokio::test]
async fn test_personalization_flag() {
    let service = service();
    service.initialize(&training_data()).await.unwrap();

    let plain = service.search(SearchRequest::new("db2")).await.unwrap();
    assert!(!plain.personalization_applied);

    let personalization = Personalization {
        user_id: Some("u1".to_string()),
        click_history: vec!["kb-1".to_string()],
        ..Default::default()
    };
    let personalized = service
        .search(SearchRequest::new("db2").with_personalization(personalization))
        .await
        .unwrap();
    assert!(personalized.personalization_applied);
    assert_eq!(personalized.total_count, plain.total_count);
}

#[tokio::test]
async fn test_known_user_gets_personalized_ranking() {
    let service = service();
    service.initialize(&training_data()).await.unwrap();

    let anonymous = service
        .search(SearchRequest::new("db2").with_user("u7"))
        .await
        .unwrap();
    assert!(!anonymous.personalization_applied);

    service.update_user_interaction("u7", "kb-1", "db2 deadlock", InteractionAction::Click, None);
    let known = service
        .search(SearchRequest::new("db2").with_user("u7"))
        .await
        .unwrap();
    assert!(known.personalization_applied);
    assert_eq!(service.recorded_interactions().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_identical_searches_agree() {
    let service = Arc::new(service());
    service.initialize(&training_data()).await.unwrap();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .search(SearchRequest::new("db2").with_pagination(0, 1))
                    .await
            })
        })
        .collect();

    let responses: Vec<SearchResponse> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    for response in &responses {
        assert_eq!(response.results.len(), responses[0].results.len());
        assert_eq!(
            response.pagination.total_items,
            responses[0].pagination.total_items
        );
    }
    assert_eq!(service.metric_window().len(), 16);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_search_during_retrain_sees_a_complete_bundle() {
    let service = Arc::new(service());
    service.initialize(&training_data()).await.unwrap();

    let retrain = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.retrain_models(&training_data()).await })
    };
    for _ in 0..8 {
        let response = service.search(SearchRequest::new("db2")).await.unwrap();
        assert_eq!(response.total_count, 2);
    }
    retrain.await.unwrap().unwrap();

    assert_eq!(service.bundle_version(), Some(2));
}

#[tokio::test]
async fn test_export_import_reproduces_suggestions() {
    let dir = TempDir::new().unwrap();
    let trained = service();
    trained.initialize(&training_data()).await.unwrap();
    let exported = trained.export_models(dir.path()).await.unwrap();
    assert!(exported.is_complete());
    assert!(exported.bytes > 0);

    let restored = service();
    let imported = restored.import_models(dir.path()).await.unwrap();
    assert!(imported.is_complete());
    assert!(restored.is_service_initialized());

    for query in ["db2", "vsam", "re"] {
        let before = trained.search(SearchRequest::new(query)).await.unwrap();
        let after = restored.search(SearchRequest::new(query)).await.unwrap();
        let texts = |r: &SearchResponse| {
            r.suggestions
                .iter()
                .map(|s| (s.text.clone(), s.confidence))
                .collect::<Vec<_>>()
        };
        assert_eq!(texts(&before), texts(&after), "suggestions for '{query}'");
    }
}

#[tokio::test]
async fn test_export_before_initialize_fails() {
    let dir = TempDir::new().unwrap();
    let service = service();

    let err = service.export_models(dir.path()).await.unwrap_err();

    assert!(matches!(err, XiphosError::NotInitialized(_)));
}

#[tokio::test]
async fn test_import_from_missing_directory_fails() {
    let dir = TempDir::new().unwrap();
    let service = service();

    let err = service
        .import_models(dir.path().join("nothing-here"))
        .await
        .unwrap_err();

    assert!(matches!(err, XiphosError::Persistence(_)));
    assert!(!service.is_service_initialized());
}

#[tokio::test]
async fn test_ranking_override_survives_retrain() {
    let ranker = Arc::new(CountingRanker::default());
    let service = service().with_ranking(ranker.clone());
    service.initialize(&training_data()).await.unwrap();
    service.retrain_models(&training_data()).await.unwrap();

    let response = service
        .search(SearchRequest::new("db2").with_personalization(Personalization::default()))
        .await
        .unwrap();

    assert!(response.personalization_applied);
    assert_eq!(ranker.calls.load(Ordering::SeqCst), 1);
    let ids: Vec<_> = response.results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["kb-1", "kb-2"]);
}

#[tokio::test]
async fn test_failing_store_degrades_to_empty_results() {
    let service = SearchService::new(ServiceConfig::default()).with_result_store(Arc::new(BrokenStore));
    service.initialize(&training_data()).await.unwrap();

    let response = service.search(SearchRequest::new("db2")).await.unwrap();

    assert!(response.results.is_empty());
    assert_eq!(response.total_count, 0);
    assert!(!response.suggestions.is_empty());
    let window = service.metric_window();
    assert_eq!(window.last().map(|m| m.error_rate), Some(1.0));
}

#[tokio::test]
async fn test_model_health_and_insights() {
    let service = service();
    assert!(
        service
            .get_model_health()
            .values()
            .all(|h| h.status == xiphos::service::HealthStatus::Critical)
    );

    service.initialize(&training_data()).await.unwrap();
    for _ in 0..4 {
        service.search(SearchRequest::new("db2")).await.unwrap();
    }

    let health = service.get_model_health();
    assert_eq!(health.len(), ModelKind::ALL.len());
    assert!(health.values().all(|h| h.last_trained.is_some()));

    let insights = service.get_system_insights();
    let metrics: Vec<_> = insights.trends.iter().map(|t| t.metric.as_str()).collect();
    assert!(metrics.contains(&"average_response_time"));
}
