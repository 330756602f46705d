//! Tests for the registration module.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::*;
use crate::config::HttpSettings;
use crate::http::testing::MockTransport;
use crate::resource::{PackageSource, ProviderRegistry, SourceRepository};

const INDEX_URL: &str = "https://feed.test/v3/index.json";
const REGISTRATION_BASE: &str = "https://feed.test/v3/registration/";
const FOO_ROOT: &str = "https://feed.test/v3/registration/foo/index.json";

fn settings() -> HttpSettings {
    HttpSettings {
        max_retries: 1,
        retry_delay_ms: 1,
        retry_max_delay_ms: 2,
        timeout_secs: 5,
        ..HttpSettings::default()
    }
}

fn v(s: &str) -> NuGetVersion {
    NuGetVersion::parse(s).unwrap()
}

fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

fn service_index(endpoints: &[&str]) -> String {
    let resources: Vec<Value> = endpoints
        .iter()
        .map(|endpoint| json!({ "@id": endpoint, "@type": "RegistrationsBaseUrl/3.6.0" }))
        .collect();
    json!({ "version": "3.0.0", "resources": resources }).to_string()
}

fn leaf(version: &str) -> Value {
    json!({
        "@id": format!("https://feed.test/v3/registration/foo/{version}.json"),
        "catalogEntry": {
            "id": "Foo",
            "version": version,
            "description": format!("Foo {version}"),
            "published": "2024-01-01T00:00:00+00:00"
        },
        "packageContent": format!("https://feed.test/v3/flat/foo/{version}/foo.{version}.nupkg")
    })
}

fn inlined_page(versions: &[&str]) -> Value {
    let items: Vec<Value> = versions.iter().map(|v| leaf(v)).collect();
    json!({
        "@id": format!("{FOO_ROOT}#page/{}/{}", versions[0], versions[versions.len() - 1]),
        "lower": versions[0],
        "upper": versions[versions.len() - 1],
        "count": items.len(),
        "items": items
    })
}

fn remote_page(page_url: &str, lower: &str, upper: &str) -> Value {
    json!({ "@id": page_url, "lower": lower, "upper": upper, "count": 2 })
}

fn page_document(page_url: &str, versions: &[&str]) -> String {
    let items: Vec<Value> = versions.iter().map(|v| leaf(v)).collect();
    json!({ "@id": page_url, "count": items.len(), "items": items }).to_string()
}

fn root(pages: Vec<Value>) -> String {
    json!({ "count": pages.len(), "items": pages }).to_string()
}

fn feed() -> Arc<MockTransport> {
    let transport = Arc::new(MockTransport::new());
    transport.json(INDEX_URL, service_index(&[REGISTRATION_BASE]));
    transport
}

fn source(transport: &Arc<MockTransport>) -> SourceRepository {
    SourceRepository::with_registry(
        PackageSource::new("test", url(INDEX_URL)),
        settings(),
        Arc::new(ProviderRegistry::with_transport(transport.clone())),
    )
}

fn version_strings(index: &RegistrationIndex) -> Vec<String> {
    index.versions().map(|v| v.to_string()).collect()
}

mod template_tests {
    use super::*;

    #[test]
    fn base_url_gets_id_and_index_appended() {
        let template = RegistrationTemplate::from_endpoint(&url("https://feed.test/v3/registration"));
        assert_eq!(
            template.expand("Newtonsoft.Json").unwrap().as_str(),
            "https://feed.test/v3/registration/newtonsoft.json/index.json"
        );
    }

    #[test]
    fn placeholder_survives_url_encoding() {
        let template =
            RegistrationTemplate::from_endpoint(&url("https://feed.test/reg/{id}/index.json"));
        assert_eq!(template.as_str(), "https://feed.test/reg/{id}/index.json");
        assert_eq!(
            template.expand("Foo").unwrap().as_str(),
            "https://feed.test/reg/foo/index.json"
        );
    }

    #[test]
    fn resolve_keeps_endpoint_order() {
        let transport = Arc::new(MockTransport::new());
        let client = Arc::new(crate::http::DataClient::new(transport, settings()));
        let resource = RegistrationResource::new(
            client,
            &[url("https://a.test/reg/"), url("https://b.test/reg/")],
        );

        let candidates = resource.resolve_template("Foo").unwrap();
        assert_eq!(
            candidates,
            vec![
                url("https://a.test/reg/foo/index.json"),
                url("https://b.test/reg/foo/index.json")
            ]
        );
    }

    #[test]
    fn invalid_package_ids_are_rejected() {
        assert!(validate_package_id("Foo.Bar_baz-1").is_ok());
        for bad in ["", "../etc", "foo/bar", "foo?x=1", ".hidden", "a..b"] {
            assert!(
                matches!(validate_package_id(bad), Err(RegistrationError::InvalidPackageId(_))),
                "{bad} should be rejected"
            );
        }
        assert!(validate_package_id(&"a".repeat(101)).is_err());
    }
}

mod state_tests {
    use super::*;
    use crate::registration::RegistrationState::*;

    #[test]
    fn legal_transitions() {
        assert!(Unresolved.can_advance_to(TemplateChosen));
        assert!(TemplateChosen.can_advance_to(RootFetched));
        assert!(RootFetched.can_advance_to(PagesFetching));
        assert!(RootFetched.can_advance_to(Merged));
        assert!(PagesFetching.can_advance_to(Merged));
        assert!(Merged.can_advance_to(Ready));
        assert!(TemplateChosen.can_advance_to(Failed));
        assert!(PagesFetching.can_advance_to(Failed));
    }

    #[test]
    fn terminal_states_do_not_advance() {
        for next in [Unresolved, TemplateChosen, RootFetched, PagesFetching, Merged, Ready, Failed] {
            assert!(!Ready.can_advance_to(next));
            assert!(!Failed.can_advance_to(next));
        }
        assert!(Ready.is_terminal());
        assert!(Failed.is_terminal());
        assert!(!Merged.is_terminal());
        assert!(!Merged.can_advance_to(Failed));
    }
}

mod index_tests {
    use super::*;

    #[tokio::test]
    async fn inlined_pages_merge_in_order() {
        let transport = feed();
        transport.json(
            FOO_ROOT,
            root(vec![
                inlined_page(&["1.0.0", "1.5.0"]),
                inlined_page(&["1.6.0", "2.0.0"]),
            ]),
        );
        let source = source(&transport);
        let cancel = CancellationToken::new();

        let index = get_registration_index(&source, "Foo", &cancel)
            .await
            .unwrap()
            .expect("package exists");

        assert_eq!(version_strings(&index), vec!["1.0.0", "1.5.0", "1.6.0", "2.0.0"]);
        assert!(index.is_complete());
        assert_eq!(index.url().as_str(), FOO_ROOT);
        assert!(index.pages().iter().all(|page| page.inlined));

        let entry = get_version(&source, "foo", &v("1.6.0"), &cancel)
            .await
            .unwrap()
            .expect("version exists");
        assert_eq!(entry.version, v("1.6.0"));
        assert_eq!(entry.description.as_deref(), Some("Foo 1.6.0"));
        assert_eq!(
            entry.package_content.as_deref(),
            Some("https://feed.test/v3/flat/foo/1.6.0/foo.1.6.0.nupkg")
        );

        let missing = get_version(&source, "Foo", &v("1.7.0"), &cancel).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn remote_pages_are_fetched() {
        let transport = feed();
        let page = "https://feed.test/v3/registration/foo/page/1.0.0/1.1.0.json";
        transport.json(FOO_ROOT, root(vec![remote_page(page, "1.0.0", "1.1.0")]));
        transport.json(page, page_document(page, &["1.0.0", "1.1.0"]));
        let source = source(&transport);

        let index = get_registration_index(&source, "Foo", &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(version_strings(&index), vec!["1.0.0", "1.1.0"]);
        assert_eq!(index.pages()[0].loaded, Some(2));
        assert!(!index.pages()[0].inlined);
    }

    #[tokio::test]
    async fn missing_remote_page_degrades() {
        let transport = feed();
        let page = "https://feed.test/v3/registration/foo/page/1.0.0/1.4.0.json";
        transport.json(
            FOO_ROOT,
            root(vec![
                remote_page(page, "1.0.0", "1.4.0"),
                inlined_page(&["2.0.0", "2.1.0"]),
            ]),
        );
        transport.status(page, StatusCode::NOT_FOUND);
        let source = source(&transport);

        let index = get_registration_index(&source, "Foo", &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(version_strings(&index), vec!["2.0.0", "2.1.0"]);
        assert!(!index.is_complete());
        let gap = &index.gaps()[0];
        assert_eq!(gap.url.as_str(), page);
        assert_eq!(gap.lower, Some(v("1.0.0")));
        assert_eq!(gap.upper, Some(v("1.4.0")));
    }

    #[tokio::test]
    async fn inlined_pages_may_omit_id() {
        let transport = feed();
        let mut first = inlined_page(&["1.0.0", "1.5.0"]);
        let mut second = inlined_page(&["1.6.0", "2.0.0"]);
        first.as_object_mut().unwrap().remove("@id");
        second.as_object_mut().unwrap().remove("@id");
        transport.json(FOO_ROOT, root(vec![first, second]));
        let source = source(&transport);
        let cancel = CancellationToken::new();

        let index = get_registration_index(&source, "Foo", &cancel)
            .await
            .unwrap()
            .expect("package exists");

        assert_eq!(version_strings(&index), vec!["1.0.0", "1.5.0", "1.6.0", "2.0.0"]);
        assert!(index.is_complete());
        assert_eq!(
            index.pages()[1].url.as_str(),
            format!("{FOO_ROOT}#page/1.6.0/2.0.0")
        );

        let entry = get_version(&source, "Foo", &v("1.6.0"), &cancel)
            .await
            .unwrap()
            .expect("version exists");
        assert_eq!(entry.version, v("1.6.0"));
    }

    #[tokio::test]
    async fn unreadable_inlined_page_degrades() {
        let transport = feed();
        let mut broken = inlined_page(&["1.6.0", "2.0.0"]);
        broken["items"][0]["catalogEntry"]["version"] = json!("not.a.version");
        transport.json(
            FOO_ROOT,
            root(vec![inlined_page(&["1.0.0", "1.5.0"]), broken]),
        );
        let source = source(&transport);

        let index = get_registration_index(&source, "Foo", &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(version_strings(&index), vec!["1.0.0", "1.5.0"]);
        assert_eq!(index.gaps().len(), 1);
        let gap = &index.gaps()[0];
        assert_eq!(gap.url.as_str(), format!("{FOO_ROOT}#page/1.6.0/2.0.0"));
        assert_eq!(gap.lower, Some(v("1.6.0")));
        assert!(gap.reason.contains("malformed"), "reason: {}", gap.reason);
        assert_eq!(index.pages()[1].loaded, None);
        assert!(index.pages()[1].inlined);
    }

    #[tokio::test]
    async fn remote_page_without_id_is_a_gap() {
        let transport = feed();
        transport.json(
            FOO_ROOT,
            root(vec![
                json!({ "lower": "1.0.0", "upper": "1.4.0", "count": 2 }),
                inlined_page(&["2.0.0"]),
            ]),
        );
        let source = source(&transport);

        let index = get_registration_index(&source, "Foo", &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(version_strings(&index), vec!["2.0.0"]);
        let gap = &index.gaps()[0];
        assert_eq!(gap.url.as_str(), format!("{FOO_ROOT}#page/1.0.0/1.4.0"));
        assert_eq!(gap.upper, Some(v("1.4.0")));
        assert_eq!(transport.hits(FOO_ROOT), 1);
        assert_eq!(transport.hits(gap.url.as_str()), 0);
    }

    #[tokio::test]
    async fn every_page_unreachable_is_unavailable() {
        let transport = feed();
        let page = "https://feed.test/v3/registration/foo/page/1.0.0/1.4.0.json";
        transport.json(FOO_ROOT, root(vec![remote_page(page, "1.0.0", "1.4.0")]));
        transport.fail(page);
        let source = source(&transport);

        let err = get_registration_index(&source, "Foo", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.is_unavailable(), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn empty_registration_is_empty_index() {
        let transport = feed();
        transport.json(FOO_ROOT, json!({ "count": 0, "items": [] }).to_string());
        let source = source(&transport);

        let index = get_registration_index(&source, "Foo", &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();

        assert!(index.is_empty());
        assert!(index.is_complete());
        assert!(index.latest(true).is_none());
    }

    #[tokio::test]
    async fn unknown_package_is_none() {
        let transport = feed();
        let source = source(&transport);

        let result = get_registration_index(&source, "Missing.Package", &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_unavailable() {
        let transport = feed();
        transport.fail(FOO_ROOT);
        let source = source(&transport);

        let err = get_registration_index(&source, "Foo", &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            RegistrationError::Unavailable { package_id, reasons } => {
                assert_eq!(package_id, "Foo");
                assert_eq!(reasons.len(), 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        // first attempt plus one retry
        assert_eq!(transport.hits(FOO_ROOT), 2);
    }

    #[tokio::test]
    async fn later_template_used_when_earlier_lacks_package() {
        let transport = Arc::new(MockTransport::new());
        transport.json(
            INDEX_URL,
            service_index(&["https://mirror.test/reg/", REGISTRATION_BASE]),
        );
        transport.json(FOO_ROOT, root(vec![inlined_page(&["1.0.0"])]));
        let source = source(&transport);

        let index = get_registration_index(&source, "Foo", &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(index.url().as_str(), FOO_ROOT);
        assert_eq!(transport.hits("https://mirror.test/reg/foo/index.json"), 1);
    }

    #[tokio::test]
    async fn malformed_root_fails_immediately() {
        let transport = feed();
        transport.json(FOO_ROOT, "{ not json");
        let source = source(&transport);

        let err = get_registration_index(&source, "Foo", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RegistrationError::Fetch(crate::http::FetchError::MalformedResponse { .. })
        ));
    }

    #[tokio::test]
    async fn wrong_shape_root_is_invalid_document() {
        let transport = feed();
        transport.json(FOO_ROOT, json!({ "items": "nope" }).to_string());
        let source = source(&transport);

        let err = get_registration_index(&source, "Foo", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, RegistrationError::InvalidDocument { .. }));
    }

    #[tokio::test]
    async fn invalid_id_is_not_fetched() {
        let transport = feed();
        let source = source(&transport);

        let err = get_registration_index(&source, "../secrets", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, RegistrationError::InvalidPackageId(_)));
    }

    #[tokio::test]
    async fn source_without_registrations() {
        let transport = Arc::new(MockTransport::new());
        transport.json(
            INDEX_URL,
            json!({
                "version": "3.0.0",
                "resources": [ { "@id": "https://feed.test/query", "@type": "SearchQueryService" } ]
            })
            .to_string(),
        );
        let source = source(&transport);

        let err = get_registration_index(&source, "Foo", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, RegistrationError::NoRegistrationResource(name) if name == "test"));
    }

    #[tokio::test]
    async fn repeated_lookup_revalidates() {
        let transport = feed();
        transport.json_with_etag(FOO_ROOT, root(vec![inlined_page(&["1.0.0"])]), "\"r1\"");
        let source = source(&transport);
        let cancel = CancellationToken::new();

        get_registration_index(&source, "Foo", &cancel).await.unwrap();
        let again = get_registration_index(&source, "Foo", &cancel)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(version_strings(&again), vec!["1.0.0"]);
        let requests = transport.requests_for(FOO_ROOT);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].if_none_match.as_deref(), Some("\"r1\""));
    }
}

mod concurrency_tests {
    use super::*;

    #[tokio::test]
    async fn merge_ignores_completion_order() {
        let transport = feed();
        let slow = "https://feed.test/v3/registration/foo/page/1.0.0/1.2.0.json";
        let fast = "https://feed.test/v3/registration/foo/page/1.2.0/1.3.0.json";
        transport.json(
            FOO_ROOT,
            root(vec![
                remote_page(slow, "1.0.0", "1.2.0"),
                remote_page(fast, "1.2.0", "1.3.0"),
            ]),
        );
        // both pages list 1.2.0; the first-declared page must win although it completes last
        transport.json(slow, page_document(slow, &["1.0.0", "1.2.0"]));
        transport.json(
            fast,
            json!({
                "@id": fast,
                "items": [
                    { "catalogEntry": { "id": "Foo", "version": "1.2.0", "description": "from fast page" } },
                    leaf("1.3.0")
                ]
            })
            .to_string(),
        );
        transport.delay_route(slow, Duration::from_millis(100));
        let source = source(&transport);

        let index = get_registration_index(&source, "Foo", &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(version_strings(&index), vec!["1.0.0", "1.2.0", "1.3.0"]);
        let kept = index.find(&v("1.2.0")).unwrap();
        assert_eq!(kept.description.as_deref(), Some("Foo 1.2.0"));
        assert_eq!(index.pages()[0].url.as_str(), slow);
    }

    #[tokio::test]
    async fn cancellation_during_page_fetch() {
        let transport = feed();
        let page = "https://feed.test/v3/registration/foo/page/1.0.0/1.1.0.json";
        transport.json(FOO_ROOT, root(vec![remote_page(page, "1.0.0", "1.1.0")]));
        transport.json(page, page_document(page, &["1.0.0", "1.1.0"]));
        transport.delay_route(page, Duration::from_millis(500));
        let source = source(&transport);

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let err = get_registration_index(&source, "Foo", &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let transport = feed();
        let source = source(&transport);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = get_registration_index(&source, "Foo", &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(transport.hits(INDEX_URL), 0);
    }
}
