//! Live-network scenarios against a real httpbin instance.
//!
//! Gated behind `BOOST_REQUEST_HTTPBIN` (default `httpbin.org`) and `#[ignore]`d
//! so the default `cargo test` run stays fully offline; run with
//! `cargo test -- --ignored` (and the env var set, for a self-hosted
//! httpbin) to exercise them.

use std::collections::HashMap;

use fetcha_core::body::{FormBody, JsonBody};
use fetcha_core::endpoint::Options;
use fetcha_core::request::Request;
use fetcha_core::session::Session;
use serde_json::Value;
use url::Url;

fn httpbin_base() -> String {
    let host = std::env::var("BOOST_REQUEST_HTTPBIN").unwrap_or_else(|_| "httpbin.org".to_owned());
    format!("https://{host}")
}

fn url(path: &str) -> Url {
    Url::parse(&format!("{}{path}", httpbin_base())).unwrap()
}

#[tokio::test]
#[ignore = "hits a live httpbin endpoint"]
async fn headers_echo() {
    let session = Session::new(Options::default()).unwrap();
    let request = Request::get(url("/headers")).header("Test-Header", "it works").unwrap();
    let mut response = session.request(request).await.unwrap();

    assert_eq!(response.status(), http::StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["headers"]["Test-Header"], "it works");
    assert!(body["headers"]["Host"].is_string());
}

#[tokio::test]
#[ignore = "hits a live httpbin endpoint"]
async fn simple_redirect_records_one_hop() {
    let session = Session::new(Options::default()).unwrap();
    let mut response = session.get(url("/redirect-to?url=%2Fget")).await.unwrap();

    assert_eq!(response.status(), http::StatusCode::OK);
    assert_eq!(response.history().len(), 1);
    assert_eq!(response.history()[0].location().path(), "/get");
    let _ = response.bytes().await.unwrap();
}

#[tokio::test]
#[ignore = "hits a live httpbin endpoint"]
async fn too_many_redirects_surfaces_accumulated_history() {
    let options = Options::default().with_max_redirects(5);
    let session = Session::new(options).unwrap();
    let err = session.get(url("/redirect/10")).await.unwrap_err();

    match err {
        fetcha_core::Error::TooManyRedirects { limit, history } => {
            assert_eq!(limit, 5);
            assert_eq!(history.len(), 5);
        }
        other => panic!("expected too_many_redirects, got {other:?}"),
    }
}

#[tokio::test]
#[ignore = "hits a live httpbin endpoint"]
async fn post_json_echoes_submitted_value() {
    let session = Session::new(Options::default()).unwrap();
    let payload = serde_json::json!({"test-key": "test-value"});
    let mut response = session
        .request(Request::post(url("/post")).body(JsonBody::new(&payload).unwrap()))
        .await
        .unwrap();

    assert_eq!(response.status(), http::StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["headers"]["Content-Type"], "application/json");
    assert_eq!(body["json"], payload);
}

#[tokio::test]
#[ignore = "hits a live httpbin endpoint"]
async fn post_form_echoes_submitted_pairs() {
    let session = Session::new(Options::default()).unwrap();
    let mut form = HashMap::new();
    form.insert("foo", "42");
    form.insert("bar", "21");
    form.insert("foo bar", "23");

    let mut response = session
        .request(Request::post(url("/post")).body(FormBody::new(&form).unwrap()))
        .await
        .unwrap();

    assert_eq!(response.status(), http::StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["headers"]["Content-Type"], "application/x-www-form-urlencoded");
    assert_eq!(body["form"]["foo"], "42");
    assert_eq!(body["form"]["bar"], "21");
    assert_eq!(body["form"]["foo bar"], "23");
}

#[tokio::test]
#[ignore = "hits a live httpbin endpoint"]
async fn download_on_redirect_writes_full_file() {
    let session = Session::new(Options::default()).unwrap();
    let mut response = session.get(url("/redirect-to?url=%2Fimage")).await.unwrap();

    assert_eq!(response.history().len(), 1);
    assert_eq!(response.headers().get(http::header::CONTENT_TYPE).unwrap(), "image/png");
    let content_length: u64 = response
        .headers()
        .get(http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap();

    let bytes = response.bytes().await.unwrap();
    assert_eq!(bytes.len() as u64, content_length);

    let file = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(file.path(), &bytes).unwrap();
    assert_eq!(std::fs::metadata(file.path()).unwrap().len(), content_length);
}
