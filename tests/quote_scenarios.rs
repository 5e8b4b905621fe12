use serde_json::{json, Map, Value};

use protoquote::pricing::cache::CacheSettings;
use protoquote::pricing::migration::MigrationStrategy;
use protoquote::pricing::{EngineSettings, PriceStatus, PricingEngine, QuoteInput};

fn engine(strategy: MigrationStrategy, cache_dir: &std::path::Path) -> PricingEngine {
    PricingEngine::new(EngineSettings {
        migration_strategy: Some(strategy),
        cache: CacheSettings {
            directory: cache_dir.to_path_buf(),
            ..CacheSettings::default()
        },
        ..EngineSettings::default()
    })
}

fn engine_without_cache(strategy: MigrationStrategy) -> PricingEngine {
    PricingEngine::new(EngineSettings {
        migration_strategy: Some(strategy),
        cache: CacheSettings {
            enabled: false,
            ..CacheSettings::default()
        },
        ..EngineSettings::default()
    })
}

fn params(pairs: Value) -> Map<String, Value> {
    pairs.as_object().cloned().expect("object literal")
}

fn input(parameters: Map<String, Value>, width_mm: f64, height_mm: f64) -> QuoteInput {
    QuoteInput {
        parameters,
        width_mm,
        height_mm,
        tenant_id: None,
        user_id: None,
        request_id: None,
    }
}

#[tokio::test]
async fn single_fr4_board_matches_the_published_rate_card() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = engine(MigrationStrategy::OldOnly, dir.path());
    let result = engine
        .quote(&input(params(json!({"quantity": 1})), 50.0, 50.0))
        .await
        .expect("quote succeeds");

    // 25cm² x 1.6 EGP = 40, single-board bracket x2 = 80,
    // +14% VAT = 91.2, +200 EGP engineering fee = 291.2.
    assert_eq!(result.status, PriceStatus::Success);
    assert!((result.breakdown.total_egp() - 291.2).abs() < 1e-9);

    let response = result.to_response();
    assert_eq!(response.currency, "EGP");
    assert!((response.final_price_egp - 291.2).abs() < 1e-9);
    assert!((response.details.base_price_egp - 40.0).abs() < 1e-9);
    assert!(!response.details.from_cache);
}

#[tokio::test]
async fn identical_requests_hit_the_cache_the_second_time() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = engine(MigrationStrategy::OldOnly, dir.path());
    let request = input(params(json!({"quantity": 10})), 80.0, 60.0);

    let first = engine.quote(&request).await.expect("first quote");
    let second = engine.quote(&request).await.expect("second quote");

    assert!(!first.from_cache);
    assert_eq!(first.status, PriceStatus::Success);
    assert!(second.from_cache);
    assert_eq!(second.status, PriceStatus::Cached);
    assert_eq!(second.breakdown.total_egp(), first.breakdown.total_egp());
}

#[tokio::test]
async fn per_board_price_drops_at_the_five_board_bracket() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = engine(MigrationStrategy::OldOnly, dir.path());
    let four = engine
        .quote(&input(params(json!({"quantity": 4})), 50.0, 50.0))
        .await
        .expect("quote for four");
    let five = engine
        .quote(&input(params(json!({"quantity": 5})), 50.0, 50.0))
        .await
        .expect("quote for five");

    assert!((four.multipliers.quantity - 1.5).abs() < 1e-12);
    assert!((five.multipliers.quantity - 1.0).abs() < 1e-12);
    let four_per_board = four.breakdown.total_egp() / 4.0;
    let five_per_board = five.breakdown.total_egp() / 5.0;
    assert!(five_per_board < four_per_board);
}

#[tokio::test]
async fn calculation_failures_degrade_to_fallback_pricing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = engine(MigrationStrategy::OldOnly, dir.path());
    // Legal dimensions that exceed the local production panel.
    let result = engine
        .quote(&input(params(json!({"quantity": 2})), 390.0, 290.0))
        .await
        .expect("fallback instead of error");

    assert_eq!(result.status, PriceStatus::Fallback);
    assert!(result.breakdown.total_egp().is_finite());
    assert!(result.breakdown.total_egp() > 0.0);
    assert!(result
        .warnings
        .iter()
        .any(|w| w.contains("fallback pricing used")));
}

#[tokio::test]
async fn variant_assignment_is_sticky_per_user() {
    let engine = engine_without_cache(MigrationStrategy::NewOnly);
    let mut request = input(params(json!({"quantity": 5})), 50.0, 50.0);
    request.user_id = Some("loyal-customer".to_owned());

    let first = engine
        .quote(&request)
        .await
        .expect("first quote")
        .ab_variant;
    assert!(first.is_some());
    for _ in 0..100 {
        let result = engine.quote(&request).await.expect("repeat quote");
        assert_eq!(result.ab_variant, first);
    }
}

#[tokio::test]
async fn tenant_discounts_order_the_final_prices() {
    let engine = engine_without_cache(MigrationStrategy::NewOnly);
    let mut totals = Vec::new();
    for tenant in ["default", "enterprise", "partner"] {
        let mut request = input(params(json!({"quantity": 5})), 100.0, 100.0);
        request.tenant_id = Some(tenant.to_owned());
        request.user_id = Some("shared-user".to_owned());
        let result = engine.quote(&request).await.expect("tenant quote");
        assert_eq!(result.tenant_id.as_deref(), Some(tenant));
        totals.push(result.breakdown.total_egp());
    }
    assert!(totals[1] < totals[0], "enterprise under default");
    assert!(totals[2] < totals[1], "partner under enterprise");
}

#[tokio::test]
async fn unknown_tenant_prices_like_the_default_tenant() {
    let engine = engine_without_cache(MigrationStrategy::NewOnly);
    let mut known = input(params(json!({"quantity": 5})), 60.0, 40.0);
    known.tenant_id = Some("default".to_owned());
    known.user_id = Some("same-user".to_owned());
    let mut unknown = known.clone();
    unknown.tenant_id = Some("who-is-this".to_owned());

    let known_quote = engine.quote(&known).await.expect("default quote");
    let unknown_quote = engine.quote(&unknown).await.expect("unknown quote");
    assert_eq!(
        known_quote.breakdown.total_egp(),
        unknown_quote.breakdown.total_egp()
    );
    assert_eq!(unknown_quote.tenant_id.as_deref(), Some("default"));
}

#[tokio::test]
async fn unknown_material_is_rejected_before_pricing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = engine(MigrationStrategy::NewWithFallback, dir.path());
    let err = engine
        .quote(&input(
            params(json!({"base_material": "Vibranium"})),
            50.0,
            50.0,
        ))
        .await
        .expect_err("unsupported material");
    assert_eq!(err.code, protoquote::error::ErrorCode::InvalidParameters);
}

#[tokio::test]
async fn recoverable_input_oddities_surface_as_warnings() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = engine(MigrationStrategy::OldOnly, dir.path());
    let result = engine
        .quote(&input(
            params(json!({"quantity": "several", "silkscreen": "magenta"})),
            50.0,
            50.0,
        ))
        .await
        .expect("quote succeeds with defaults");
    assert_eq!(result.status, PriceStatus::Success);
    assert!(result.warnings.iter().any(|w| w.contains("quantity")));
    assert!(result.warnings.iter().any(|w| w.contains("silkscreen")));
}

#[tokio::test]
async fn quote_counters_are_labeled_by_experiment_arm() {
    let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("recorder installs once per process");

    let engine = engine_without_cache(MigrationStrategy::NewOnly);
    let mut request = input(params(json!({"quantity": 5})), 50.0, 50.0);
    request.user_id = Some("metrics-user".to_owned());
    let result = engine.quote(&request).await.expect("quote succeeds");
    let variant = result.ab_variant.expect("variant recorded");

    let rendered = handle.render();
    assert!(rendered.contains("pricing_quotes_total"));
    assert!(
        rendered.contains(&format!("variant=\"{variant}\"")),
        "quote counter should carry the assigned variant: {rendered}"
    );
}

#[tokio::test]
async fn gradual_rollout_routes_every_request_deterministically() {
    let engine = engine_without_cache(MigrationStrategy::GradualRollout);
    engine.set_migration(MigrationStrategy::GradualRollout, 50);
    let mut request = input(params(json!({"quantity": 5})), 50.0, 50.0);
    request.request_id = Some("req-000".to_owned());

    let first = engine.quote(&request).await.expect("first quote");
    let engine_tag = first.metadata.get("engine").cloned();
    for _ in 0..10 {
        let repeat = engine.quote(&request).await.expect("repeat quote");
        assert_eq!(repeat.metadata.get("engine").cloned(), engine_tag);
    }
}
