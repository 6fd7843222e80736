//! Extractors and the embedding client against local fake servers.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path, State},
    http::{StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine as _;
use serde_json::{json, Value};

use chainlens::config::{CrawlConfig, DocumentConfig, EmbeddingConfig, RepositoryConfig};
use chainlens::connector_pdf::DocumentExtractor;
use chainlens::connector_repo::{PathFilter, RepositoryExtractor};
use chainlens::connector_web::WebExtractor;
use chainlens::embedding::VoyageProvider;
use chainlens_core::embedding::{EmbeddingProvider, InputKind};
use chainlens_core::models::IndexOptions;

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

// ═══════════════════════════════════════════════════════════════════════
// Voyage embeddings API
// ═══════════════════════════════════════════════════════════════════════

#[derive(Clone, Default)]
struct VoyageFake {
    /// Input length of every request, in arrival order.
    batches: Arc<Mutex<Vec<usize>>>,
    bodies: Arc<Mutex<Vec<Value>>>,
    /// Requests still to be answered with 429.
    throttled: Arc<AtomicUsize>,
}

async fn voyage_embeddings(State(fake): State<VoyageFake>, Json(body): Json<Value>) -> Response {
    let input = body["input"].as_array().cloned().unwrap_or_default();
    fake.batches.lock().unwrap().push(input.len());
    fake.bodies.lock().unwrap().push(body.clone());

    let throttle = fake
        .throttled
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if throttle {
        return (StatusCode::TOO_MANY_REQUESTS, "slow down").into_response();
    }

    let data: Vec<Value> = input
        .iter()
        .enumerate()
        .map(|(i, _)| json!({"object": "embedding", "index": i, "embedding": [i as f32, 1.0]}))
        .collect();
    Json(json!({"object": "list", "data": data, "model": body["model"]})).into_response()
}

async fn voyage(throttled: usize) -> (VoyageFake, EmbeddingConfig) {
    let fake = VoyageFake::default();
    fake.throttled.store(throttled, Ordering::SeqCst);
    let app = Router::new()
        .route("/v1/embeddings", post(voyage_embeddings))
        .with_state(fake.clone());
    let addr = serve(app).await;

    let config = EmbeddingConfig {
        provider: "voyage".into(),
        model: "voyage-code-3".into(),
        dims: 2,
        url: format!("http://{}/v1/embeddings", addr),
        batch_size: 2,
        max_retries: 2,
        backoff_secs: 0,
        timeout_secs: 5,
        ..EmbeddingConfig::default()
    };
    (fake, config)
}

fn texts(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("chunk {}", i)).collect()
}

#[tokio::test]
async fn voyage_batches_and_retries_rate_limits() {
    let (fake, config) = voyage(1).await;
    let provider = VoyageProvider::with_api_key(&config, "test-key".into()).unwrap();

    let vectors = provider
        .embed(&texts(5), InputKind::Document)
        .await
        .unwrap();

    assert_eq!(vectors.len(), 5);
    assert_eq!(vectors[0], vec![0.0, 1.0]);
    assert_eq!(vectors[1], vec![1.0, 1.0]);
    assert_eq!(vectors[4], vec![0.0, 1.0]);
    // The first batch was throttled once and resent.
    assert_eq!(*fake.batches.lock().unwrap(), vec![2, 2, 2, 1]);

    let bodies = fake.bodies.lock().unwrap();
    assert_eq!(bodies[0]["input_type"], "document");
    assert_eq!(bodies[0]["model"], "voyage-code-3");
    assert_eq!(bodies[0]["output_dimension"], 2);
}

#[tokio::test]
async fn voyage_query_input_type() {
    let (fake, config) = voyage(0).await;
    let provider = VoyageProvider::with_api_key(&config, "test-key".into()).unwrap();

    provider
        .embed(&["slot0".to_string()], InputKind::Query)
        .await
        .unwrap();
    assert_eq!(fake.bodies.lock().unwrap()[0]["input_type"], "query");
}

#[tokio::test]
async fn voyage_gives_up_after_max_retries() {
    let (fake, config) = voyage(100).await;
    let provider = VoyageProvider::with_api_key(&config, "test-key".into()).unwrap();

    let err = provider
        .embed(&texts(1), InputKind::Document)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("HTTP 429"), "got: {}", err);
    assert_eq!(fake.batches.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn voyage_server_error_is_not_retried() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let app = Router::new().route(
        "/v1/embeddings",
        post(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                (StatusCode::INTERNAL_SERVER_ERROR, "boom")
            }
        }),
    );
    let addr = serve(app).await;
    let config = EmbeddingConfig {
        url: format!("http://{}/v1/embeddings", addr),
        dims: 2,
        backoff_secs: 0,
        ..EmbeddingConfig::default()
    };
    let provider = VoyageProvider::with_api_key(&config, "k".into()).unwrap();

    let err = provider.embed(&texts(1), InputKind::Query).await.unwrap_err();
    assert!(err.to_string().contains("500"), "got: {}", err);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// ═══════════════════════════════════════════════════════════════════════
// GitHub API
// ═══════════════════════════════════════════════════════════════════════

const README: &str = "# Vault Kit\nA minimal ERC-4626 vault.\n## Install\nRun forge install.\n";

const GUIDE: &str = "# Guide\n## Deposits\nCall deposit with the amount of assets.\n";

const VAULT_SOL: &str = r#"// SPDX-License-Identifier: MIT
pragma solidity ^0.8.20;

/// @title Vault
contract Vault {
    /// @notice Deposit assets and mint shares.
    /// @param assets Amount of assets.
    function deposit(uint256 assets) external returns (uint256 shares) {
        shares = assets;
    }
}
"#;

fn repo_file(path: &str) -> Option<&'static str> {
    match path {
        "README.md" => Some(README),
        "docs/guide.md" => Some(GUIDE),
        "contracts/Vault.sol" => Some(VAULT_SOL),
        "test/Vault.t.sol" => Some(VAULT_SOL),
        "examples/Demo.sol" => Some(VAULT_SOL),
        "package.json" => Some("{}"),
        _ => None,
    }
}

async fn github_tree(Path((owner, repo, branch)): Path<(String, String, String)>) -> Response {
    if owner != "acme" || repo != "vault-kit" || branch != "main" {
        return (StatusCode::NOT_FOUND, Json(json!({"message": "Not Found"}))).into_response();
    }
    Json(json!({
        "sha": "abc123",
        "tree": [
            {"path": "README.md", "type": "blob"},
            {"path": "docs", "type": "tree"},
            {"path": "docs/guide.md", "type": "blob"},
            {"path": "docs/broken.md", "type": "blob"},
            {"path": "contracts/Vault.sol", "type": "blob"},
            {"path": "test/Vault.t.sol", "type": "blob"},
            {"path": "examples/Demo.sol", "type": "blob"},
            {"path": "package.json", "type": "blob"}
        ],
        "truncated": false
    }))
    .into_response()
}

async fn github_contents(
    State(fetched): State<Arc<Mutex<Vec<String>>>>,
    Path((_owner, _repo, path)): Path<(String, String, String)>,
) -> Response {
    fetched.lock().unwrap().push(path.clone());
    let Some(text) = repo_file(&path) else {
        return (StatusCode::NOT_FOUND, Json(json!({"message": "Not Found"}))).into_response();
    };
    // GitHub wraps base64 payloads at 60 columns.
    let encoded = base64::engine::general_purpose::STANDARD.encode(text);
    let wrapped = encoded
        .as_bytes()
        .chunks(60)
        .map(|c| std::str::from_utf8(c).unwrap())
        .collect::<Vec<_>>()
        .join("\n");
    Json(json!({"path": path, "content": wrapped, "encoding": "base64"})).into_response()
}

async fn github() -> (Arc<Mutex<Vec<String>>>, RepositoryExtractor) {
    let fetched = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/repos/{owner}/{repo}/git/trees/{branch}", get(github_tree))
        .route("/repos/{owner}/{repo}/contents/{*path}", get(github_contents))
        .with_state(fetched.clone());
    let addr = serve(app).await;

    let config = RepositoryConfig {
        api_base: format!("http://{}", addr),
        file_delay_ms: 0,
        ..RepositoryConfig::default()
    };
    (fetched, RepositoryExtractor::new(config, "chainlens-test").unwrap())
}

#[tokio::test]
async fn repository_crawl_selects_and_segments_files() {
    let (fetched, extractor) = github().await;
    let filter = PathFilter::new(&[], &[]).unwrap();

    let units = extractor
        .crawl(
            "https://github.com/acme/vault-kit",
            "main",
            &IndexOptions::default(),
            &filter,
        )
        .await
        .unwrap();

    let fetched: HashSet<String> = fetched.lock().unwrap().iter().cloned().collect();
    let expected: HashSet<String> = [
        "README.md",
        "docs/guide.md",
        "docs/broken.md",
        "contracts/Vault.sol",
    ]
    .into_iter()
    .map(String::from)
    .collect();
    assert_eq!(fetched, expected);

    let readme: Vec<_> = units
        .iter()
        .filter(|u| u.file_path.as_deref() == Some("README.md"))
        .collect();
    assert_eq!(readme.len(), 2);
    assert_eq!(readme[0].heading.as_deref(), Some("Vault Kit"));
    assert_eq!(readme[1].heading.as_deref(), Some("Vault Kit > Install"));
    assert!(readme[1].content.contains("forge install"));

    let deposit = units
        .iter()
        .find(|u| u.file_path.as_deref() == Some("contracts/Vault.sol"))
        .expect("solidity unit");
    assert_eq!(deposit.heading.as_deref(), Some("Vault > deposit"));
    assert!(deposit.content.contains("Deposit assets and mint shares."));
    assert!(deposit.content.contains("function deposit(uint256 assets)"));

    assert!(units
        .iter()
        .all(|u| u.file_path.as_deref() != Some("test/Vault.t.sol")));
}

#[tokio::test]
async fn repository_toggles_and_globs() {
    let (fetched, extractor) = github().await;
    let options = IndexOptions {
        index_markdown: false,
        index_docs: false,
        index_readme: false,
        index_tests: true,
        ..IndexOptions::default()
    };
    let filter = PathFilter::new(&[], &["contracts/**".to_string()]).unwrap();

    let units = extractor
        .crawl("https://github.com/acme/vault-kit", "main", &options, &filter)
        .await
        .unwrap();

    assert_eq!(*fetched.lock().unwrap(), vec!["test/Vault.t.sol".to_string()]);
    assert!(units
        .iter()
        .all(|u| u.file_path.as_deref() == Some("test/Vault.t.sol")));
}

#[tokio::test]
async fn repository_missing_branch_fails() {
    let (_fetched, extractor) = github().await;
    let filter = PathFilter::new(&[], &[]).unwrap();

    let err = extractor
        .crawl(
            "https://github.com/acme/vault-kit",
            "develop",
            &IndexOptions::default(),
            &filter,
        )
        .await
        .unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to crawl GitHub repo acme/vault-kit"));
}

// ═══════════════════════════════════════════════════════════════════════
// Documentation site
// ═══════════════════════════════════════════════════════════════════════

const ROOT_PAGE: &str = r##"<html><head><title>Vault Docs</title></head><body>
<nav><a href="/blog/post">Blog</a></nav>
<main>
<h1>Introduction</h1>
<p>Vault Kit is a minimal ERC-4626 vault implementation. Deposits mint shares in proportion
to the assets already held, and withdrawals burn those shares again. The guides below walk
through every entry point of the contract in detail.</p>
<ul>
<li><a href="/docs/a">Deposits guide</a></li>
<li><a href="/docs/b">Withdrawals guide</a></li>
<li><a href="/docs/a?ref=nav#top">Deposits again</a></li>
<li><a href="/docs/missing">Missing page</a></li>
<li><a href="https://other.example/x">Elsewhere</a></li>
<li><a href="#top">Back to top</a></li>
</ul>
</main></body></html>"##;

const PAGE_A: &str = r#"<html><head><title>Deposits</title></head><body><main>
<h1>Deposits</h1>
<p>Call deposit with an amount of assets and a receiver. The vault mints shares to the receiver.</p>
<a href="/docs/c">Deeper page</a>
</main></body></html>"#;

const PAGE_B: &str = r#"<html><head><title>Withdrawals</title></head><body><main>
<h1>Withdrawals</h1>
<p>Call withdraw with an amount of assets. The vault burns the owner's shares.</p>
</main></body></html>"#;

const PAGE_C: &str = r#"<html><body><main><h1>Deep</h1><p>Only reachable at depth two.</p></main></body></html>"#;

async fn site_page(State(hits): State<Arc<Mutex<Vec<String>>>>, uri: Uri) -> Response {
    hits.lock().unwrap().push(uri.path().to_string());
    match uri.path() {
        "/docs/" => Html(ROOT_PAGE).into_response(),
        "/docs/a" => Html(PAGE_A).into_response(),
        "/docs/b" => Html(PAGE_B).into_response(),
        "/docs/c" => Html(PAGE_C).into_response(),
        "/blog/post" => Html("<html><body><main>Blog</main></body></html>").into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn site() -> (Arc<Mutex<Vec<String>>>, String, WebExtractor) {
    let hits = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new().fallback(site_page).with_state(hits.clone());
    let addr = serve(app).await;

    let config = CrawlConfig {
        page_delay_ms: 0,
        render_delay_ms: 0,
        browser: None,
        ..CrawlConfig::default()
    };
    (
        hits,
        format!("http://{}", addr),
        WebExtractor::new(config).unwrap(),
    )
}

#[tokio::test]
async fn web_crawl_follows_same_host_links_to_depth() {
    let (hits, base, extractor) = site().await;
    let root = format!("{}/docs/", base);

    let units = extractor
        .crawl(&root, 1, &["/docs".to_string()], &[])
        .await
        .unwrap();

    let paths: HashSet<String> = hits.lock().unwrap().iter().cloned().collect();
    assert!(paths.contains("/docs/a"));
    assert!(paths.contains("/docs/b"));
    assert!(!paths.contains("/docs/c"), "depth limit exceeded");
    assert!(!paths.contains("/blog/post"), "include filter ignored");
    // `/docs/a?ref=nav#top` normalizes to an already visited page.
    let a_hits = hits.lock().unwrap().iter().filter(|p| *p == "/docs/a").count();
    assert_eq!(a_hits, 1);

    let mut page_order: Vec<String> = Vec::new();
    for unit in &units {
        let url = unit.url.clone().unwrap();
        if !page_order.contains(&url) {
            page_order.push(url);
        }
    }
    assert_eq!(
        page_order,
        vec![root.clone(), format!("{}/docs/a", base), format!("{}/docs/b", base)]
    );

    assert!(units.iter().any(|u| u
        .heading
        .as_deref()
        .is_some_and(|h| h.contains("Introduction"))
        && u.content.contains("ERC-4626")));
    assert!(units.iter().any(|u| u
        .heading
        .as_deref()
        .is_some_and(|h| h.contains("Withdrawals"))));
}

#[tokio::test]
async fn web_crawl_depth_zero_is_start_page_only() {
    let (hits, base, extractor) = site().await;
    let root = format!("{}/docs/", base);

    let units = extractor.crawl(&root, 0, &[], &[]).await.unwrap();

    assert!(!units.is_empty());
    assert!(units.iter().all(|u| u.url.as_deref() == Some(root.as_str())));
    assert!(hits.lock().unwrap().iter().all(|p| p == "/docs/"));
}

#[tokio::test]
async fn web_crawl_exclude_filter() {
    let (hits, base, extractor) = site().await;
    let root = format!("{}/docs/", base);

    extractor
        .crawl(&root, 1, &[], &["/docs/b".to_string(), "/blog".to_string()])
        .await
        .unwrap();

    let paths: HashSet<String> = hits.lock().unwrap().iter().cloned().collect();
    assert!(paths.contains("/docs/a"));
    assert!(!paths.contains("/docs/b"));
    assert!(!paths.contains("/blog/post"));
}

#[tokio::test]
async fn web_crawl_unreachable_root_is_an_error() {
    let (_hits, base, extractor) = site().await;
    let root = format!("{}/nowhere", base);
    let err = extractor.crawl(&root, 2, &[], &[]).await.unwrap_err();
    let msg = format!("{:#}", err);
    assert!(msg.contains(&format!("Failed to fetch {}", root)), "{}", msg);
    assert!(msg.contains("HTTP 404"), "{}", msg);
}

#[tokio::test]
async fn web_crawl_skips_broken_links_below_the_root() {
    let (hits, base, extractor) = site().await;
    let root = format!("{}/docs/", base);

    let units = extractor.crawl(&root, 1, &["/docs".to_string()], &[]).await.unwrap();
    assert!(hits.lock().unwrap().iter().any(|p| p == "/docs/missing"));
    assert!(units
        .iter()
        .any(|u| u.url.as_deref() == Some(format!("{}/docs/b", base).as_str())));
}

#[tokio::test]
async fn web_crawl_rejects_malformed_url() {
    let (_hits, _base, extractor) = site().await;
    let err = extractor.crawl("not a url", 1, &[], &[]).await.unwrap_err();
    assert!(err.to_string().starts_with("invalid URL: not a url"));
}

// ═══════════════════════════════════════════════════════════════════════
// PDF documents
// ═══════════════════════════════════════════════════════════════════════

async fn pdf_server() -> String {
    let app = Router::new()
        .route(
            "/garbage.pdf",
            get(|| async { ([("content-type", "application/pdf")], "this is not a pdf") }),
        )
        .fallback(|| async { StatusCode::NOT_FOUND });
    format!("http://{}", serve(app).await)
}

#[tokio::test]
async fn pdf_http_error_fails_the_source() {
    let base = pdf_server().await;
    let extractor = DocumentExtractor::new(DocumentConfig::default(), "chainlens-test").unwrap();
    let url = format!("{}/missing.pdf", base);

    let err = extractor.parse(&url).await.unwrap_err().to_string();
    assert!(err.contains(&format!("Failed to parse PDF from {}", url)), "got: {}", err);
    assert!(err.contains("Failed to fetch PDF: HTTP 404"), "got: {}", err);
}

#[tokio::test]
async fn pdf_invalid_bytes_fail_to_parse() {
    let base = pdf_server().await;
    let extractor = DocumentExtractor::new(DocumentConfig::default(), "chainlens-test").unwrap();
    let url = format!("{}/garbage.pdf", base);

    let err = extractor.parse(&url).await.unwrap_err().to_string();
    assert!(err.starts_with(&format!("Failed to parse PDF from {}", url)), "got: {}", err);
}
