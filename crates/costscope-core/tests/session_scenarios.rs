//! End-to-end scenarios: scopes → session → tree → hints

use costscope_core::hints::HintKind;
use costscope_core::{scope, ProfilerConfig, ScopePath, Session, Severity, UsageEvent};

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn test_single_call_is_priced() {
    let session = Session::new("single");
    let record = scope::profile("fetch_and_summarize", || {
        session.record_current(UsageEvent::new("gpt-4o", 12_000, 400))
    });

    assert!(close(record.cost_usd, 0.034));
    assert_eq!(record.scope_path, ScopePath::new(["fetch_and_summarize"]));
    assert!(record.flags.is_clean());
}

#[test]
fn test_pipeline_rolls_up() {
    let session = Session::new("pipeline");
    scope::profile("pipeline", || {
        scope::profile("fetch", || {
            session.record_current(UsageEvent::new("gpt-4o", 12_000, 400));
        });
        scope::profile("generate", || {
            session.record_current(UsageEvent::new("gpt-4o-mini", 2_000, 800));
        });
    });

    let tree = session.tree();
    let pipeline = tree.find(&ScopePath::new(["pipeline"])).unwrap();
    let fetch = tree.find(&ScopePath::new(["pipeline", "fetch"])).unwrap();
    let generate = tree.find(&ScopePath::new(["pipeline", "generate"])).unwrap();

    assert_eq!(pipeline.self_cost_usd, 0.0);
    assert!(close(
        pipeline.inclusive_cost_usd,
        fetch.inclusive_cost_usd + generate.inclusive_cost_usd
    ));
    assert!(close(tree.total_cost(), session.total_cost()));
    assert_eq!(session.cost_by_scope().len(), 1);
}

#[test]
fn test_unknown_model_does_not_raise() {
    let session = Session::new("unpriced");
    let record = session.record(
        UsageEvent::new("totally-new-model", 1_000, 100),
        ScopePath::new(["experiment"]),
    );

    assert_eq!(record.cost_usd, 0.0);
    assert!(record.flags.unpriced);

    let stats = session.stats();
    assert_eq!(stats.total_calls, 1);
    assert_eq!(stats.unpriced_calls, 1);
    assert_eq!(session.diagnostics().len(), 1);
}

#[test]
fn test_unattributed_calls_reach_the_report() {
    let session = Session::new("loose");
    session.record_current(UsageEvent::new("gpt-4o", 1_000, 100));

    let report = session.report();
    assert!(report.tree.root.self_calls == 1);
    assert!(report.stats.cost_by_scope.contains_key("<unattributed>"));
}

#[test]
fn test_reset_then_stats_is_empty() {
    let session = Session::new("reset");
    let _guard = scope::enter("long_running");
    session.record_current(UsageEvent::new("gpt-4o", 1_000, 100));

    session.reset();
    let stats = session.stats();
    assert_eq!(stats.total_cost_usd, 0.0);
    assert_eq!(stats.total_tokens, 0);
    assert_eq!(stats.total_calls, 0);
    assert!(stats.calls.is_empty());

    // The guard entered before the reset still attributes later calls
    let record = session.record_current(UsageEvent::new("gpt-4o", 1, 1));
    assert_eq!(record.scope_path, ScopePath::new(["long_running"]));
}

#[test]
fn test_cheaper_model_hint_above_threshold() {
    let session = Session::new("hint-fires");
    scope::profile("summarize", || {
        session.record_current(UsageEvent::new("gpt-4o", 5_000, 500));
    });
    scope::profile("classify", || {
        session.record_current(UsageEvent::new("o3-mini", 500, 50));
    });

    let hints = session.hints();
    let hint = hints
        .iter()
        .find(|h| h.kind == HintKind::CheaperModel)
        .expect("cheaper-model hint");
    assert_eq!(hint.severity, Severity::High);
    assert_eq!(hint.scope_path, ScopePath::new(["summarize"]));
    assert!(hint.estimated_monthly_savings_usd.unwrap() > 0.0);
    assert_eq!(hints[0].severity, Severity::High);
}

#[test]
fn test_cheaper_model_hint_below_threshold() {
    let mut config = ProfilerConfig::default();
    config.session_name = "hint-silent".into();
    config.hints.cost_share_threshold = 0.5;
    let session = Session::builder().config(config).build().unwrap();

    // gpt-4o share ≈ 0.0175 / (0.0175 + 0.066) ≈ 21%, below 50%
    session.record(UsageEvent::new("gpt-4o", 5_000, 500), ScopePath::new(["summarize"]));
    session.record(UsageEvent::new("o3-mini", 50_000, 2_500), ScopePath::new(["reason"]));

    let hints = session.hints();
    assert!(hints.iter().all(|h| h.kind != HintKind::CheaperModel));
}

#[test]
fn test_custom_pricing_resolver() {
    use costscope_core::{ModelPricing, StaticPricing};
    use std::sync::Arc;

    let pricing = StaticPricing::new().with_override("in-house-70b", ModelPricing::new(1.0, 2.0));
    let session = Session::builder()
        .name("custom")
        .pricing(Arc::new(pricing))
        .build()
        .unwrap();

    let record = session.record(UsageEvent::new("in-house-70b", 1_000_000, 500_000), ScopePath::root());
    assert!(close(record.cost_usd, 2.0));
}
