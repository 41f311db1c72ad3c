use serde_json::json;
use shuttle_core::config::HttpConfig;
use shuttle_core::{MetadataSource, ShuttleError, StatusClient};
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client() -> StatusClient {
    StatusClient::new(&HttpConfig::default()).unwrap()
}

fn url(server: &MockServer, p: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), p)).unwrap()
}

#[tokio::test]
async fn fetches_and_parses_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/stations/s1e0b382a0/status"))
        .and(header(
            "user-agent",
            format!("shuttle/{}", env!("CARGO_PKG_VERSION")).as_str(),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "online",
            "current_track": {
                "title": "King Crimson - Red",
                "artwork_url_large": "https://images.radio.co/red.jpg"
            }
        })))
        .mount(&server)
        .await;

    let meta = client()
        .fetch_status(&url(&server, "/stations/s1e0b382a0/status"))
        .await
        .unwrap();
    assert_eq!(meta.artist, "King Crimson");
    assert_eq!(meta.title, "Red");
    assert_eq!(
        meta.artwork_url.map(|u| u.to_string()),
        Some("https://images.radio.co/red.jpg".to_string())
    );
}

#[tokio::test]
async fn server_errors_surface_as_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = client()
        .fetch_status(&url(&server, "/status"))
        .await
        .unwrap_err();
    assert!(matches!(err, ShuttleError::Status(500)));
}

#[tokio::test]
async fn malformed_json_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = client()
        .fetch_status(&url(&server, "/status"))
        .await
        .unwrap_err();
    assert!(matches!(err, ShuttleError::Json(_)));
}

#[tokio::test]
async fn artwork_bytes_are_returned_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/art.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3, 4]))
        .mount(&server)
        .await;

    let bytes = client()
        .fetch_artwork(&url(&server, "/art.png"))
        .await
        .unwrap();
    assert_eq!(bytes, vec![1, 2, 3, 4]);
}
