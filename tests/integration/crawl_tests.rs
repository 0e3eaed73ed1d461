//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full crawl cycle end-to-end, from TOML configuration to report.

use listing_harvester::config::{parse_config, Config};
use listing_harvester::crawler::{run_crawl, CrawlReport, RecordStatus};
use listing_harvester::output::{ReportOptions, ResultSink, TextReportSink};
use listing_harvester::HarvestError;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BOARD_PATH: &str = "/forum/board/10/";

/// Creates a forum configuration pointing at the mock server
fn forum_config(server: &MockServer, crawl_extra: &str) -> Config {
    let toml = format!(
        r#"
[fetch]
timeout-secs = 5
max-retries = 2
base-delay-ms = 10

[crawl]
seed-url = "{seed}"
delay-between-requests-ms = 10
{crawl_extra}

[listing]
keyword = "sony"

[[listing.rules]]
selector = "tr td a[href*='/forum/topic/']"
description = "Topic links in table cells"

[[listing.rules]]
selector = "a[href*='/forum/topic/']"
description = "Any topic links"

[listing.filters]
strip-patterns = [" end"]
skip-titles = ["end", "→", "..."]
skip-numeric = true
required-prefixes = ["FS:", "WTB:", "FT:"]
"#,
        seed = format!("{}{}", server.uri(), BOARD_PATH),
        crawl_extra = crawl_extra,
    );

    parse_config(&toml).expect("test config is valid")
}

/// A board page listing the given topics, each titled "FS: Sony lens #n"
fn board_page(topics: &[u32]) -> String {
    let rows: String = topics
        .iter()
        .map(|n| {
            format!(
                r#"<tr><td><a href="/forum/topic/{n}/">FS: Sony lens #{n}</a></td><td>{n}</td></tr>"#
            )
        })
        .collect();
    format!(
        r#"<html><body><table>{rows}
        <tr><td><a href="/forum/topic/900/">Nikon Z 50mm for trade</a></td></tr>
        <tr><td><a href="/forum/topic/901/">WTB: Nikon D850</a></td></tr>
        <tr><td><a href="/forum/topic/902/">2</a></td></tr>
        </table></body></html>"#
    )
}

fn topic_page(n: u32) -> String {
    format!(
        r#"<html><body>
        <div class="post_body">
        Price: ${n},250
        Selling Sony lens number {n}, barely used and always kept in a dry cabinet.
        Quote
        Ships fully insured within the continental US, local pickup welcome.
        Report this post
        </div>
        </body></html>"#
    )
}

async fn mount_board(server: &MockServer, board: &str, topics: &[u32]) {
    Mock::given(method("GET"))
        .and(path(board))
        .respond_with(ResponseTemplate::new(200).set_body_string(board_page(topics)))
        .mount(server)
        .await;
}

async fn mount_topic(server: &MockServer, n: u32) {
    Mock::given(method("GET"))
        .and(path(format!("/forum/topic/{}/", n)))
        .respond_with(ResponseTemplate::new(200).set_body_string(topic_page(n)))
        .mount(server)
        .await;
}

fn topic_url(server: &MockServer, n: u32) -> String {
    format!("{}/forum/topic/{}/", server.uri(), n)
}

fn urls(report: &CrawlReport) -> Vec<String> {
    report.records.iter().map(|r| r.url.clone()).collect()
}

#[tokio::test]
async fn test_full_crawl_and_report() {
    let server = MockServer::start().await;
    mount_board(&server, BOARD_PATH, &[1, 2, 3]).await;
    for n in 1..=3 {
        mount_topic(&server, n).await;
    }

    let config = forum_config(&server, "");
    let report = run_crawl(&config, CancellationToken::new()).await.unwrap();

    // prefix and keyword filters leave only the three Sony topics
    assert_eq!(
        urls(&report),
        vec![
            topic_url(&server, 1),
            topic_url(&server, 2),
            topic_url(&server, 3)
        ]
    );
    assert!(!report.cancelled);
    assert_eq!(report.stats.succeeded, 3);
    assert_eq!(report.stats.priced, 3);

    let first = &report.records[0];
    assert_eq!(first.title, "FS: Sony lens #1");
    assert_eq!(first.price, "$1,250");
    assert_eq!(
        first.details,
        "Price: $1,250\n\
         Selling Sony lens number 1, barely used and always kept in a dry cabinet.\n\
         Ships fully insured within the continental US, local pickup welcome."
    );

    let dir = tempfile::tempdir().unwrap();
    let report_path = dir.path().join("scraped_listings.txt");
    TextReportSink::new(ReportOptions::default())
        .write(&report, &report_path)
        .unwrap();

    let written = std::fs::read_to_string(&report_path).unwrap();
    assert!(written.contains("ITEM #3\nTitle: FS: Sony lens #3\nPrice: $3,250\n"));
}

#[tokio::test]
async fn test_partial_failure_keeps_going() {
    let server = MockServer::start().await;
    mount_board(&server, BOARD_PATH, &[1, 2, 3, 4, 5]).await;
    for n in [1, 2, 4, 5] {
        mount_topic(&server, n).await;
    }
    Mock::given(method("GET"))
        .and(path("/forum/topic/3/"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let config = forum_config(&server, "");
    let report = run_crawl(&config, CancellationToken::new()).await.unwrap();

    assert_eq!(report.records.len(), 5);

    let failed: Vec<_> = report
        .records
        .iter()
        .filter(|r| matches!(r.status, RecordStatus::Failed(_)))
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].url, topic_url(&server, 3));
    assert_eq!(failed[0].price, "N/A");
    assert_eq!(failed[0].details, "Error fetching details");

    assert_eq!(report.stats.failed, 1);
    assert_eq!(report.stats.succeeded, 4);
}

#[tokio::test]
async fn test_order_matches_between_sequential_and_parallel() {
    let server = MockServer::start().await;
    mount_board(&server, BOARD_PATH, &[1, 2, 3, 4, 5, 6]).await;

    // early topics answer slowest so completion order differs from listing order
    for (n, delay_ms) in [(1, 400), (2, 250), (3, 100), (4, 0), (5, 0), (6, 0)] {
        Mock::given(method("GET"))
            .and(path(format!("/forum/topic/{}/", n)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(topic_page(n))
                    .set_delay(Duration::from_millis(delay_ms)),
            )
            .mount(&server)
            .await;
    }

    let sequential = run_crawl(&forum_config(&server, "max-concurrency = 1"), CancellationToken::new())
        .await
        .unwrap();
    let parallel = run_crawl(&forum_config(&server, "max-concurrency = 4"), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(sequential.records.len(), 6);
    assert_eq!(urls(&sequential), urls(&parallel));

    let prices = |report: &CrawlReport| -> Vec<String> {
        report.records.iter().map(|r| r.price.clone()).collect()
    };
    assert_eq!(prices(&sequential), prices(&parallel));
}

#[tokio::test]
async fn test_seed_failure_aborts_crawl() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(BOARD_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let config = forum_config(&server, "");
    match run_crawl(&config, CancellationToken::new()).await {
        Err(HarvestError::SeedFetch(e)) => assert_eq!(e.attempts().len(), 2),
        Err(other) => panic!("expected SeedFetch, got {}", other),
        Ok(report) => panic!("expected failure, got {} records", report.records.len()),
    }
}

#[tokio::test]
async fn test_max_items_limits_detail_fetches() {
    let server = MockServer::start().await;
    mount_board(&server, BOARD_PATH, &[1, 2, 3, 4]).await;
    for n in 1..=2 {
        mount_topic(&server, n).await;
    }
    for n in 3..=4 {
        Mock::given(method("GET"))
            .and(path(format!("/forum/topic/{}/", n)))
            .respond_with(ResponseTemplate::new(200).set_body_string(topic_page(n)))
            .expect(0)
            .mount(&server)
            .await;
    }

    let config = forum_config(&server, "max-items = 2");
    let report = run_crawl(&config, CancellationToken::new()).await.unwrap();

    assert_eq!(
        urls(&report),
        vec![topic_url(&server, 1), topic_url(&server, 2)]
    );
}

#[tokio::test]
async fn test_pagination_deduplicates_across_pages() {
    let server = MockServer::start().await;
    mount_board(&server, BOARD_PATH, &[1, 2]).await;
    mount_board(&server, "/forum/board/10/1/", &[2, 3]).await;
    Mock::given(method("GET"))
        .and(path("/forum/board/10/2/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    mount_topic(&server, 1).await;
    mount_topic(&server, 3).await;
    Mock::given(method("GET"))
        .and(path("/forum/topic/2/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(topic_page(2)))
        .expect(1)
        .mount(&server)
        .await;

    let config = forum_config(
        &server,
        "\n[crawl.pagination]\nurl-template = \"{seed}{page}/\"\nmax-pages = 3",
    );
    let report = run_crawl(&config, CancellationToken::new()).await.unwrap();

    assert_eq!(
        urls(&report),
        vec![
            topic_url(&server, 1),
            topic_url(&server, 2),
            topic_url(&server, 3)
        ]
    );
    assert_eq!(report.stats.failed, 0);
}

#[tokio::test]
async fn test_cancellation_returns_partial_results() {
    let server = MockServer::start().await;
    mount_board(&server, BOARD_PATH, &[1, 2, 3]).await;
    for n in 1..=3 {
        mount_topic(&server, n).await;
    }

    let mut config = forum_config(&server, "");
    config.crawl.delay_between_requests_ms = 30_000;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let report = run_crawl(&config, cancel).await.unwrap();

    assert!(report.cancelled);
    assert_eq!(urls(&report), vec![topic_url(&server, 1)]);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_inline_quotes_without_detail_fetches() {
    let server = MockServer::start().await;
    let quotes = [
        (
            "“The world as we have created it is a process of our thinking. It cannot be changed without changing our thinking.”",
            "Albert Einstein",
        ),
        (
            "“It is our choices, Harry, that show what we truly are, far more than our abilities.”",
            "J.K. Rowling",
        ),
    ];
    let body: String = quotes
        .iter()
        .map(|(text, author)| {
            format!(
                r#"<div class="quote"><span class="text">{}</span><span>by <small class="author">{}</small></span></div>"#,
                text, author
            )
        })
        .collect();
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            "<html><body>{}</body></html>",
            body
        )))
        .expect(1)
        .mount(&server)
        .await;

    let toml = format!(
        r##"
[crawl]
seed-url = "{}/"
max-items = 10
use-inline-content = true

[[listing.rules]]
selector = "div.quote"
description = "Quote containers"
title-template = "{{text}}... - {{author}}"
fallback-href = "#quote-{{index}}"
content-field = "text"
fields = [
    {{ name = "text", selector = "span.text", max-chars = 50 }},
    {{ name = "author", selector = "small.author" }},
]
"##,
        server.uri()
    );
    let config = parse_config(&toml).unwrap();

    let report = run_crawl(&config, CancellationToken::new()).await.unwrap();

    assert_eq!(report.records.len(), 2);
    for (i, (record, (text, author))) in report.records.iter().zip(quotes.iter()).enumerate() {
        let short: String = text.chars().take(50).collect();
        assert_eq!(record.title, format!("{}... - {}", short, author));
        assert_eq!(record.url, format!("{}/#quote-{}", server.uri(), i));
        assert_eq!(record.details, *text);
        assert_eq!(record.price, "N/A");
    }
}
