use criterion::{criterion_group, criterion_main, Criterion};
use rulematch::{
    enhancer::{ExceptionData, FrameContext, MatchFrame},
    parse_rules, MatchCache, MatchPolicy, MatcherList, MatcherRegistry, RuleResolver,
};
use serde_json::{json, Value};

const TEST_RULES: &str = "\
path:*.js #frontend
path:src/sentry/api/** #api
path:src/sentry/*/models.py #models
module:sentry.tasks.* #workers
url:*/checkout* #payments
tags.browser.name:Chrome* #web
codeowners:/src/sentry/integrations/ #integrations
codeowners:docs/* #docs
";

const TEST_MATCHERS: &[&str] = &[
    "app:yes",
    "path:**/sentry/** !function:_*",
    "[ module:django.* ] | function:get_response",
    "family:native,javascript | [ app:no ]",
    "type:ValueError value:*invalid*",
];

fn test_events() -> Vec<Value> {
    let frames = |files: &[&str]| {
        files
            .iter()
            .enumerate()
            .map(|(i, file)| {
                json!({
                    "filename": file,
                    "abs_path": format!("/srv/app/{file}"),
                    "module": file.trim_end_matches(".py").replace('/', "."),
                    "function": format!("handler_{i}"),
                    "in_app": i % 2 == 0,
                })
            })
            .collect::<Vec<_>>()
    };

    vec![
        json!({
            "platform": "python",
            "request": {"url": "https://shop.example.com/checkout/confirm"},
            "exception": {"values": [{
                "type": "ValueError",
                "value": "invalid literal",
                "stacktrace": {"frames": frames(&[
                    "django/core/handlers/base.py",
                    "src/sentry/api/endpoints/project.py",
                    "src/sentry/models/models.py",
                ])},
            }]},
            "tags": [["browser.name", "Chrome 110"]],
        }),
        json!({
            "platform": "javascript",
            "stacktrace": {"frames": frames(&[
                "node_modules/react/index.js",
                "static/app/views/issue.js",
            ])},
        }),
        json!({
            "platform": "python",
            "stacktrace": {"frames": frames(&[
                "src/sentry/integrations/slack/client.py",
                "src/sentry/tasks/post_process.py",
            ])},
        }),
    ]
}

fn build_matchers(registry: &MatcherRegistry) -> Vec<MatcherList> {
    TEST_MATCHERS
        .iter()
        .map(|source| MatcherList::parse(source, registry).unwrap())
        .collect()
}

fn matching_benchmark(c: &mut Criterion) {
    c.bench_function("building", |b| {
        b.iter(|| {
            let rules = parse_rules(TEST_RULES).unwrap();
            let resolver = RuleResolver::new(rules, MatchPolicy::AllMatches);
            let matchers = build_matchers(&MatcherRegistry::new());
            (resolver, matchers)
        })
    });

    let events = test_events();
    let resolver = RuleResolver::new(parse_rules(TEST_RULES).unwrap(), MatchPolicy::AllMatches);
    c.bench_function("matching owners", |b| {
        b.iter(|| {
            for event in &events {
                resolver.owners(event);
            }
        })
    });

    let registry = MatcherRegistry::new();
    let matchers = build_matchers(&registry);
    let contexts = events
        .iter()
        .map(|event| (MatchFrame::from_event(event), ExceptionData::from_event(event)))
        .collect::<Vec<_>>();
    c.bench_function("matching frames", |b| {
        b.iter(|| {
            for (frames, exception) in &contexts {
                let ctx = FrameContext {
                    frames,
                    platform: "python",
                    exception,
                };
                let mut cache = MatchCache::new();
                for matcher in &matchers {
                    matcher.matching_frames(&ctx, &mut cache);
                }
            }
        })
    });
}

criterion_group!(benches, matching_benchmark);
criterion_main!(benches);
