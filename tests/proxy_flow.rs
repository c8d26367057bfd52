//! End-to-end tests: client → proxy → mock upstream and back.

mod common;

use std::time::Duration;

use axum::http::{HeaderName, HeaderValue};
use url::Url;

use common::{
    client, start_mock_upstream, start_mock_upstream_with, start_proxy, start_tracked_proxy, MockResponse,
};
use forward_proxy::config::{ProxyConfig, ReplacementRule};
use forward_proxy::rewrite::Codec;

fn config_for(upstream: &str) -> ProxyConfig {
    ProxyConfig::new(Url::parse(upstream).unwrap())
}

#[tokio::test]
async fn html_body_points_back_at_the_proxy() {
    let page = "<a href=\"http://UP/docs\">docs</a>\
                <a href=\"https://ext.example.com/x\">ext</a>\
                <script src=\"//UP/app.js\" integrity=\"sha384-abc\"></script>";
    let placeholder = "UP";

    // Replacements run before host rewriting, so the placeholder becomes the
    // upstream host and is then rewritten like any other reference.
    let upstream = start_mock_upstream(
        MockResponse::new(200)
            .header("Content-Type", "text/html; charset=utf-8")
            .body(page),
    )
    .await;

    let mut config = config_for(&upstream.url());
    config.proxy_external = true;
    config.replacements = vec![ReplacementRule {
        needle: placeholder.into(),
        value: upstream.authority(),
    }];
    let (proxy, _shutdown) = start_proxy(config).await;

    let res = client().get(format!("http://{proxy}/")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["x-proxy-client"], "Forward-Cli");
    assert_eq!(res.headers()["cache-control"], "no-cache");

    let length: usize = res.headers()["content-length"].to_str().unwrap().parse().unwrap();
    let body = res.text().await.unwrap();
    assert_eq!(length, body.len());

    assert!(body.contains(&format!("href=\"http://{proxy}/docs\"")));
    assert!(body.contains(&format!(
        "href=\"http://{proxy}/?forward_url=https%3A%2F%2Fext.example.com%2Fx\""
    )));
    assert!(body.contains(&format!("<script src=\"//{proxy}/app.js\"></script>")));
    assert!(!body.contains(&upstream.authority()));
}

#[tokio::test]
async fn compressed_bodies_are_rewritten_and_reencoded() {
    for codec in [Codec::Gzip, Codec::Deflate, Codec::Brotli] {
        let css = b"body { background: url(http://cdn.example.com/bg.png) }".to_vec();
        let upstream = start_mock_upstream(
            MockResponse::new(200)
                .header("Content-Type", "text/css")
                .header("Content-Encoding", codec.name())
                .body(codec.encode(&css).unwrap()),
        )
        .await;

        let mut config = config_for(&upstream.url());
        config.replacements = vec![ReplacementRule {
            needle: "http://cdn.example.com".into(),
            value: format!("http://{}", upstream.authority()),
        }];
        let (proxy, _shutdown) = start_proxy(config).await;

        let res = client().get(format!("http://{proxy}/site.css")).send().await.unwrap();
        assert_eq!(res.status(), 200, "{}", codec.name());
        assert_eq!(res.headers()["content-encoding"], codec.name());

        let length: usize = res.headers()["content-length"].to_str().unwrap().parse().unwrap();
        let encoded = res.bytes().await.unwrap();
        assert_eq!(length, encoded.len(), "{}", codec.name());

        let decoded = String::from_utf8(codec.decode(&encoded).unwrap()).unwrap();
        assert_eq!(
            decoded,
            format!("body {{ background: url(http://{proxy}/bg.png) }}"),
            "{}",
            codec.name()
        );
    }
}

#[tokio::test]
async fn json_bodies_are_rewritten() {
    let upstream = start_mock_upstream(
        MockResponse::new(200)
            .header("Content-Type", "application/json")
            .body(r#"{"next":"https://UP/page/2","ok":true}"#),
    )
    .await;

    let mut config = config_for(&upstream.url());
    config.replacements = vec![ReplacementRule {
        needle: "UP".into(),
        value: upstream.authority(),
    }];
    let (proxy, _shutdown) = start_proxy(config).await;

    let res = client().get(format!("http://{proxy}/api")).send().await.unwrap();
    let value: serde_json::Value = serde_json::from_str(&res.text().await.unwrap()).unwrap();

    assert_eq!(value["next"], format!("http://{proxy}/page/2"));
    assert_eq!(value["ok"], true);
}

#[tokio::test]
async fn javascript_bodies_are_rewritten() {
    let upstream = start_mock_upstream_with(|addr| {
        MockResponse::new(200)
            .header("Content-Type", "application/javascript; charset=utf-8")
            .body(format!("fetch(\"https://{addr}/api/items\");"))
    })
    .await;
    let (proxy, _shutdown) = start_proxy(config_for(&upstream.url())).await;

    let res = client().get(format!("http://{proxy}/app.js")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(
        res.text().await.unwrap(),
        format!("fetch(\"http://{proxy}/api/items\");")
    );
}

#[tokio::test]
async fn request_headers_are_rewritten_for_the_upstream() {
    let upstream = start_mock_upstream(MockResponse::new(204)).await;

    let mut config = config_for(&upstream.url());
    config.request_headers = vec![(
        HeaderName::from_static("x-token"),
        HeaderValue::from_static("abc"),
    )];
    let (proxy, _shutdown) = start_proxy(config).await;

    let res = client()
        .get(format!("http://{proxy}/search?q=rust&page"))
        .header("connection", "keep-alive")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 204);

    let requests = upstream.requests();
    assert_eq!(requests.len(), 1);
    let head = &requests[0];
    let upstream_host = upstream.authority();

    assert!(head.starts_with("get /search?q=rust&page http/1.1\r\n"), "{head}");
    assert!(head.contains(&format!("host: {upstream_host}\r\n")), "{head}");
    assert!(head.contains(&format!("x-origin-host: {proxy}\r\n")), "{head}");
    assert!(head.contains(&format!("origin: http://{upstream_host}\r\n")), "{head}");
    assert!(head.contains(&format!("referrer: http://{upstream_host}\r\n")), "{head}");
    assert!(head.contains("x-real-ip: 127.0.0.1\r\n"), "{head}");
    assert!(head.contains("x-forwarded-for: 127.0.0.1\r\n"), "{head}");
    assert!(head.contains("x-token: abc\r\n"), "{head}");
}

#[tokio::test]
async fn redirects_and_cookies_stay_on_the_proxy() {
    let upstream = start_mock_upstream(MockResponse::new(301)).await;
    let location = format!("https://{}/login?next=%2Fhome", upstream.authority());

    // A second upstream carries the headers that reference the first one.
    let redirecting = start_mock_upstream(
        MockResponse::new(301)
            .header("Location", &location)
            .header("Set-Cookie", "sid=1; Domain=upstream.test; Path=/; Secure; HttpOnly")
            .header("Strict-Transport-Security", "max-age=63072000")
            .header("Content-Security-Policy", "default-src 'self'"),
    )
    .await;

    let mut config = config_for(&upstream.url());
    config.cors = true;
    let (proxy, _shutdown) = start_proxy(config).await;

    let res = client()
        .get(format!("http://{proxy}/"))
        .header("x-proxy-target", redirecting.url())
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 302);
    // The override upstream is the one rewritten; the configured one is
    // an external host and stays as is.
    assert_eq!(res.headers()["location"], location.as_str());
    assert_eq!(
        res.headers()["set-cookie"],
        "sid=1; Domain=127.0.0.1; Path=/; HttpOnly"
    );
    assert_eq!(res.headers()["access-control-allow-origin"], "*");
    assert_eq!(res.headers()["access-control-allow-credentials"], "true");
    assert!(res.headers().get("strict-transport-security").is_none());
    assert!(res.headers().get("content-security-policy").is_none());
    assert!(upstream.requests().is_empty());
    assert_eq!(redirecting.requests().len(), 1);
}

#[tokio::test]
async fn location_on_the_upstream_host_is_rewritten() {
    let upstream = start_mock_upstream_with(|addr| {
        MockResponse::new(301)
            .header("Location", &format!("https://{addr}/after?from=%2Fstart"))
            .header("Set-Cookie", "theme=dark")
    })
    .await;
    let (proxy, _shutdown) = start_proxy(config_for(&upstream.url())).await;

    let res = client().get(format!("http://{proxy}/start")).send().await.unwrap();
    assert_eq!(res.status(), 302);
    assert_eq!(
        res.headers()["location"],
        format!("http://{proxy}/after?from=%2Fstart").as_str()
    );
    assert_eq!(res.headers()["set-cookie"], "theme=dark; Domain=127.0.0.1");
}

#[tokio::test]
async fn forward_url_tunnels_to_another_host() {
    let upstream = start_mock_upstream(
        MockResponse::new(200)
            .header("Content-Type", "text/html")
            .body("<img src=\"http://TUNNEL/img.png\">"),
    )
    .await;

    let mut config = config_for("http://127.0.0.1:9");
    config.replacements = vec![ReplacementRule {
        needle: "TUNNEL".into(),
        value: upstream.authority(),
    }];
    let (proxy, _shutdown) = start_proxy(config).await;

    let target = format!("{}/deep/page?x=1", upstream.url());
    let res = client()
        .get(format!("http://{proxy}/"))
        .query(&[("forward_url", target.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let body = res.text().await.unwrap();
    assert_eq!(body, format!("<img src=\"http://{proxy}/img.png\">"));

    let head = &upstream.requests()[0];
    assert!(head.starts_with("get /deep/page?x=1 http/1.1\r\n"), "{head}");
    assert!(head.contains(&format!("host: {}\r\n", upstream.authority())), "{head}");
}

#[tokio::test]
async fn ineligible_bodies_pass_through_untouched() {
    let payload: Vec<u8> = b"\x89PNG not really gzip http://example.com".to_vec();
    let upstream = start_mock_upstream(
        MockResponse::new(200)
            .header("Content-Type", "image/png")
            .header("Content-Encoding", "gzip")
            .body(payload.clone()),
    )
    .await;
    let (proxy, _shutdown) = start_proxy(config_for(&upstream.url())).await;

    let res = client().get(format!("http://{proxy}/logo.png")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.bytes().await.unwrap().to_vec(), payload);
}

#[tokio::test]
async fn corrupt_rewritable_body_reports_500() {
    let upstream = start_mock_upstream(
        MockResponse::new(200)
            .header("Content-Type", "text/html")
            .header("Content-Encoding", "gzip")
            .body("definitely not gzip"),
    )
    .await;
    let (proxy, _shutdown) = start_proxy(config_for(&upstream.url())).await;

    let res = client().get(format!("http://{proxy}/")).send().await.unwrap();
    assert_eq!(res.status(), 500);
    assert!(res.text().await.unwrap().contains("failed to decode gzip body"));
}

#[tokio::test]
async fn unreachable_upstream_reports_500() {
    let (proxy, _shutdown) = start_proxy(config_for("http://127.0.0.1:9")).await;

    let res = client().get(format!("http://{proxy}/")).send().await.unwrap();
    assert_eq!(res.status(), 500);
    let body = res.text().await.unwrap();
    assert!(body.contains("upstream request to http://127.0.0.1:9/"), "{body}");
    assert!(body.to_lowercase().contains("connection refused"), "{body}");
}

#[tokio::test]
async fn client_disconnect_cancels_the_exchange() {
    let upstream = start_mock_upstream(
        MockResponse::new(200)
            .header("Content-Type", "text/plain")
            .body("too late")
            .delay(Duration::from_secs(5)),
    )
    .await;
    let (proxy, _shutdown, tracker) = start_tracked_proxy(config_for(&upstream.url())).await;

    let abandoned = reqwest::Client::builder()
        .timeout(Duration::from_millis(300))
        .build()
        .unwrap()
        .get(format!("http://{proxy}/slow"))
        .send()
        .await;
    assert!(abandoned.unwrap_err().is_timeout());

    // The handler is dropped long before the upstream would have answered.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while tracker.active_count() > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(tracker.active_count(), 0);
    assert_eq!(tracker.cancelled_count(), 1);
    assert_eq!(upstream.requests().len(), 1);
}

#[tokio::test]
async fn overwrite_folder_is_served_before_proxying() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("assets")).unwrap();
    std::fs::write(dir.path().join("assets/local.css"), "p{}").unwrap();

    let upstream = start_mock_upstream(
        MockResponse::new(200)
            .header("Content-Type", "text/plain")
            .body("from upstream"),
    )
    .await;
    let mut config = config_for(&upstream.url());
    config.overwrite_folder = Some(dir.path().to_path_buf());
    let (proxy, _shutdown) = start_proxy(config).await;

    let res = client()
        .get(format!("http://{proxy}/assets/local.css"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["content-type"], "text/css");
    assert_eq!(res.text().await.unwrap(), "p{}");
    assert!(upstream.requests().is_empty());

    let res = client()
        .get(format!("http://{proxy}/assets/missing.css"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.text().await.unwrap(), "from upstream");
    assert_eq!(upstream.requests().len(), 1);
}
