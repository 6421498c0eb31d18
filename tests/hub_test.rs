use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rgenhub::engines::{EngineRegistry, MockEngine, MockOutcome};
use rgenhub::{EngineConfig, GenerationRequest, HubError, ImageGeneratorHub};

fn hub(engines: &[Arc<MockEngine>]) -> ImageGeneratorHub {
    let mut registry = EngineRegistry::new();
    for engine in engines {
        registry.register(engine.clone()).unwrap();
    }
    ImageGeneratorHub::new(registry)
}

fn configs(names: &[&str]) -> Vec<EngineConfig> {
    names
        .iter()
        .map(|name| EngineConfig::new(*name, format!("prompt for {}", name)))
        .collect()
}

fn engines_in(response: &rgenhub::GenerationResponse) -> HashSet<String> {
    response
        .images
        .iter()
        .map(|image| image.engine_name.clone())
        .collect()
}

#[tokio::test]
async fn too_many_engines_requested_invokes_nothing() {
    let a = Arc::new(MockEngine::succeeding("A"));
    let b = Arc::new(MockEngine::succeeding("B"));
    let hub = hub(&[a.clone(), b.clone()]);

    let result = hub
        .generate_images(GenerationRequest::new(configs(&["A", "B"]), 3))
        .await;

    assert!(matches!(result, Err(HubError::InvalidRequest(_))));
    assert_eq!(a.calls() + b.calls(), 0);
}

#[tokio::test]
async fn invalid_size_token_invokes_nothing() {
    let a = Arc::new(MockEngine::succeeding("A"));
    let hub = hub(&[a.clone()]);

    let result = hub
        .generate_images(GenerationRequest::new(configs(&["A"]), 1).with_image_size("poster"))
        .await;

    match result {
        Err(err @ HubError::InvalidSize(_)) => assert_eq!(err.http_status(), 400),
        other => panic!("expected InvalidSize, got {:?}", other),
    }
    assert_eq!(a.calls(), 0);
}

#[tokio::test]
async fn zero_images_is_rejected() {
    let a = Arc::new(MockEngine::succeeding("A"));
    let hub = hub(&[a.clone()]);

    let result = hub
        .generate_images(GenerationRequest::new(configs(&["A"]), 1).with_num_images(0))
        .await;

    assert!(matches!(result, Err(HubError::InvalidRequest(_))));
    assert_eq!(a.calls(), 0);
}

#[tokio::test]
async fn two_healthy_engines_share_the_work() {
    let a = Arc::new(MockEngine::succeeding("A"));
    let b = Arc::new(MockEngine::succeeding("B"));
    let hub = hub(&[a.clone(), b.clone()]);

    let response = hub
        .generate_images(GenerationRequest::new(configs(&["A", "B"]), 2).with_num_images(2))
        .await
        .unwrap();

    assert_eq!(response.images.len(), 4);
    assert!(response.failed_engines.is_empty());
    assert_eq!(a.requested_counts(), vec![2]);
    assert_eq!(b.requested_counts(), vec![2]);
}

#[tokio::test]
async fn failure_without_fallback_aborts_with_no_partial_result() {
    let a = Arc::new(MockEngine::failing("A"));
    let b = Arc::new(MockEngine::succeeding("B"));
    let hub = hub(&[a.clone(), b.clone()]);

    let result = hub
        .generate_images(GenerationRequest::new(configs(&["A", "B"]), 2).with_num_images(2))
        .await;

    match result {
        Err(err @ HubError::AggregateFailure(_)) => {
            assert_eq!(err.http_status(), 500);
            assert!(err.to_string().contains("A"));
        }
        other => panic!("expected AggregateFailure, got {:?}", other),
    }
    // the sibling still ran to completion
    assert_eq!(b.calls(), 1);
}

#[tokio::test]
async fn unknown_engine_without_fallback_is_a_caller_error() {
    let a = Arc::new(MockEngine::succeeding("A"));
    let hub = hub(&[a.clone()]);

    let result = hub
        .generate_images(GenerationRequest::new(configs(&["A", "Ghost"]), 2))
        .await;

    match result {
        Err(HubError::EngineNotFound(name)) => assert_eq!(name, "Ghost"),
        other => panic!("expected EngineNotFound, got {:?}", other),
    }
    assert_eq!(a.calls(), 0);
}

#[tokio::test]
async fn shortfall_moves_past_engine_that_fails_on_retry() {
    let a = Arc::new(MockEngine::failing("A"));
    let b = Arc::new(
        MockEngine::succeeding("B")
            .with_script(vec![MockOutcome::Succeed, MockOutcome::Fail("quota".into())]),
    );
    let c = Arc::new(MockEngine::succeeding("C"));
    let hub = hub(&[a.clone(), b.clone(), c.clone()]);

    let response = hub
        .generate_images(
            GenerationRequest::new(configs(&["A", "B", "C"]), 2)
                .with_num_images(2)
                .with_fallback(true),
        )
        .await
        .unwrap();

    assert_eq!(response.images.len(), 4);
    assert_eq!(response.failed_engines, vec!["A", "B"]);
    assert_eq!(
        engines_in(&response),
        HashSet::from(["B".to_string(), "C".to_string()])
    );
    assert_eq!(b.requested_counts(), vec![2, 2]);
    assert_eq!(c.requested_counts(), vec![2]);
}

#[tokio::test]
async fn shortfall_goes_to_first_healthy_candidate_including_primaries() {
    let a = Arc::new(MockEngine::failing("A"));
    let b = Arc::new(MockEngine::succeeding("B"));
    let c = Arc::new(MockEngine::succeeding("C"));
    let hub = hub(&[a.clone(), b.clone(), c.clone()]);

    let response = hub
        .generate_images(
            GenerationRequest::new(configs(&["A", "B", "C"]), 2)
                .with_num_images(2)
                .with_fallback(true),
        )
        .await
        .unwrap();

    // the pool keeps caller order minus failed engines, so B is asked first
    assert_eq!(response.images.len(), 4);
    assert_eq!(response.failed_engines, vec!["A"]);
    assert_eq!(b.requested_counts(), vec![2, 2]);
    assert_eq!(c.calls(), 0);
}

#[tokio::test]
async fn unused_engine_absorbs_remainder_when_pool_starts_with_it() {
    let a = Arc::new(MockEngine::failing("A"));
    let b = Arc::new(MockEngine::succeeding("B"));
    let c = Arc::new(MockEngine::succeeding("C"));
    let hub = hub(&[a.clone(), b.clone(), c.clone()]);

    let response = hub
        .generate_images(
            GenerationRequest::new(configs(&["A", "C", "B"]), 2)
                .with_num_images(3)
                .with_fallback(true),
        )
        .await
        .unwrap();

    assert_eq!(response.failed_engines, vec!["A"]);
    assert_eq!(response.images.len(), 6);
    // C ran its primary share then took A's three in a single call
    assert_eq!(c.requested_counts(), vec![3, 3]);
    assert_eq!(b.calls(), 0);
}

#[tokio::test]
async fn every_engine_failing_is_an_aggregate_failure_even_with_fallback() {
    let a = Arc::new(MockEngine::failing("A"));
    let b = Arc::new(MockEngine::failing("B"));
    let hub = hub(&[a.clone(), b.clone()]);

    let result = hub
        .generate_images(
            GenerationRequest::new(configs(&["A", "B"]), 2).with_fallback(true),
        )
        .await;

    match result {
        Err(HubError::AggregateFailure(message)) => {
            assert!(message.contains("No engine could generate images"))
        }
        other => panic!("expected AggregateFailure, got {:?}", other),
    }
    // failed engines are never retried during redistribution
    assert_eq!(a.calls(), 1);
    assert_eq!(b.calls(), 1);
}

#[tokio::test]
async fn partial_result_with_fallback_is_success() {
    let a = Arc::new(
        MockEngine::succeeding("A")
            .with_script(vec![MockOutcome::Succeed, MockOutcome::Fail("quota".into())]),
    );
    let b = Arc::new(MockEngine::failing("B"));
    let hub = hub(&[a.clone(), b.clone()]);

    let response = hub
        .generate_images(
            GenerationRequest::new(configs(&["A", "B"]), 2)
                .with_num_images(2)
                .with_fallback(true),
        )
        .await
        .unwrap();

    assert_eq!(response.images.len(), 2);
    assert_eq!(response.failed_engines, vec!["B", "A"]);
}

#[tokio::test]
async fn size_tokens_are_case_insensitive() {
    let a = Arc::new(MockEngine::succeeding("A"));
    let hub = hub(&[a.clone()]);

    let response = hub
        .generate_images(
            GenerationRequest::new(configs(&["A"]), 1)
                .with_num_images(3)
                .with_image_size("LARGE"),
        )
        .await
        .unwrap();

    assert_eq!(response.images.len(), 3);
    assert_eq!(a.requested_counts(), vec![3]);
}

#[test]
fn registry_rejects_incomplete_size_catalogs() {
    use rgenhub::models::{Dimensions, SizeBucket, SizeCatalog};

    let lopsided = SizeCatalog::new(vec![
        (SizeBucket::Small, Dimensions::square(256)),
        (SizeBucket::Small, Dimensions::square(512)),
        (SizeBucket::Large, Dimensions::square(1024)),
    ]);
    let mut registry = EngineRegistry::new();
    let result = registry.register(Arc::new(MockEngine::succeeding("Odd").with_sizes(lopsided)));

    assert!(matches!(result, Err(HubError::InvalidSizeCatalog { .. })));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn unknown_engine_with_fallback_is_redistributed() {
    let b = Arc::new(MockEngine::succeeding("B"));
    let hub = hub(&[b.clone()]);

    let response = hub
        .generate_images(
            GenerationRequest::new(configs(&["Ghost", "B"]), 1)
                .with_num_images(2)
                .with_fallback(true),
        )
        .await
        .unwrap();

    assert_eq!(response.failed_engines, vec!["Ghost"]);
    assert_eq!(response.images.len(), 2);
    assert_eq!(b.requested_counts(), vec![2]);
}

#[tokio::test]
async fn only_the_needed_engines_run_in_the_primary_phase() {
    let a = Arc::new(MockEngine::succeeding("A"));
    let b = Arc::new(MockEngine::succeeding("B"));
    let c = Arc::new(MockEngine::succeeding("C"));
    let hub = hub(&[a.clone(), b.clone(), c.clone()]);

    let response = hub
        .generate_images(GenerationRequest::new(configs(&["A", "B", "C"]), 2).with_fallback(true))
        .await
        .unwrap();

    assert_eq!(response.images.len(), 2);
    assert_eq!(c.calls(), 0);
}

#[tokio::test]
async fn primary_attempts_run_concurrently() {
    let delay = Duration::from_millis(300);
    let a = Arc::new(MockEngine::succeeding("A").with_delay(delay));
    let b = Arc::new(MockEngine::succeeding("B").with_delay(delay));
    let c = Arc::new(MockEngine::succeeding("C").with_delay(delay));
    let hub = hub(&[a, b, c]);

    let started = std::time::Instant::now();
    let response = hub
        .generate_images(GenerationRequest::new(configs(&["A", "B", "C"]), 3))
        .await
        .unwrap();

    assert_eq!(response.images.len(), 3);
    assert!(started.elapsed() < delay * 2);
}

#[tokio::test]
async fn stalled_engine_times_out_and_work_is_redistributed() {
    let slow = Arc::new(MockEngine::hanging("Slow"));
    let b = Arc::new(MockEngine::succeeding("B"));
    let hub = hub(&[slow.clone(), b.clone()]).with_engine_timeout(Duration::from_millis(100));

    let response = hub
        .generate_images(
            GenerationRequest::new(configs(&["Slow", "B"]), 2)
                .with_num_images(1)
                .with_fallback(true),
        )
        .await
        .unwrap();

    assert_eq!(response.failed_engines, vec!["Slow"]);
    assert_eq!(response.images.len(), 2);
    assert_eq!(b.requested_counts(), vec![1, 1]);
}

#[tokio::test]
async fn oversized_image_count_is_rejected_before_any_work() {
    let a = Arc::new(MockEngine::failing("A"));
    let hub = hub(&[a.clone()]);

    let result = hub
        .generate_images(GenerationRequest::new(configs(&["A"]), 1).with_num_images(u32::MAX))
        .await;

    match result {
        Err(err @ HubError::InvalidRequest(_)) => assert_eq!(err.http_status(), 400),
        other => panic!("expected InvalidRequest, got {:?}", other),
    }
    assert_eq!(a.calls(), 0);
}

#[tokio::test]
async fn image_cap_is_configurable_and_inclusive() {
    let a = Arc::new(MockEngine::succeeding("A"));
    let hub = hub(&[a.clone()]).with_max_images_per_engine(3);

    let at_cap = hub
        .generate_images(GenerationRequest::new(configs(&["A"]), 1).with_num_images(3))
        .await
        .unwrap();
    assert_eq!(at_cap.images.len(), 3);

    let over_cap = hub
        .generate_images(GenerationRequest::new(configs(&["A"]), 1).with_num_images(4))
        .await;
    assert!(matches!(over_cap, Err(HubError::InvalidRequest(_))));
    assert_eq!(a.requested_counts(), vec![3]);
}

#[tokio::test]
async fn engine_missing_credentials_has_its_share_redistributed() {
    let a = Arc::new(MockEngine::succeeding("A").with_required_param("api_key", "API key"));
    let b = Arc::new(MockEngine::succeeding("B"));
    let hub = hub(&[a.clone(), b.clone()]);

    let response = hub
        .generate_images(
            GenerationRequest::new(configs(&["A", "B"]), 2)
                .with_num_images(2)
                .with_fallback(true),
        )
        .await
        .unwrap();

    assert_eq!(response.failed_engines, vec!["A"]);
    assert_eq!(response.images.len(), 4);
    assert!(response.images.iter().all(|image| image.engine_name == "B"));
    assert_eq!(b.requested_counts(), vec![2, 2]);
}

#[tokio::test]
async fn panicking_engine_is_a_failed_attempt() {
    let a = Arc::new(MockEngine::panicking("A"));
    let b = Arc::new(MockEngine::succeeding("B"));
    let c = Arc::new(MockEngine::succeeding("C"));
    let hub = hub(&[a.clone(), b.clone(), c.clone()]);

    let response = hub
        .generate_images(
            GenerationRequest::new(configs(&["A", "B", "C"]), 3)
                .with_num_images(1)
                .with_fallback(true),
        )
        .await
        .unwrap();

    assert_eq!(response.failed_engines, vec!["A"]);
    assert_eq!(response.images.len(), 3);
    assert!(engines_in(&response).is_subset(&HashSet::from(["B".to_string(), "C".to_string()])));
    assert_eq!(a.calls(), 1);
    assert_eq!(b.requested_counts(), vec![1, 1]);
    assert_eq!(c.requested_counts(), vec![1]);
}

#[tokio::test]
async fn panicking_engine_without_fallback_is_a_server_error() {
    let a = Arc::new(MockEngine::panicking("A"));
    let b = Arc::new(MockEngine::succeeding("B"));
    let hub = hub(&[a, b.clone()]);

    let result = hub
        .generate_images(GenerationRequest::new(configs(&["A", "B"]), 2))
        .await;

    match result {
        Err(err @ HubError::AggregateFailure(_)) => assert_eq!(err.http_status(), 500),
        other => panic!("expected AggregateFailure, got {:?}", other),
    }
    assert_eq!(b.calls(), 1);
}
