//! Relay framing over a live mock relay and the real HTTP stack.

use cloudcal_client::transport::{HttpRequest, Transport};
use cloudcal_client::ServiceConfig;
use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn relayed_transport(relay: &MockServer) -> Transport {
    let config = ServiceConfig::icloud()
        .with_relay(format!("{}/forward", relay.uri()))
        .expect("relay url parses");
    Transport::from_config(&config).expect("transport builds")
}

#[tokio::test]
async fn requests_ride_inside_the_relay_envelope() {
    let relay = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/forward"))
        .and(query_param(
            "url",
            "https://idmsa.example.com/appleauth/auth/signin",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&relay)
        .await;

    let transport = relayed_transport(&relay);
    let target = Url::parse("https://idmsa.example.com/appleauth/auth/signin").unwrap();
    let request = HttpRequest::post(target)
        .with_header("Accept", "application/json")
        .with_json_body(json!({"accountName": "user@example.com"}));

    let response = transport.send(request).await.unwrap();
    assert_eq!(response.status, 200);

    // The relay saw one POST carrying the original method, headers and
    // body in the envelope, with the target in the query string.
    let received = relay.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    let envelope: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(envelope["method"], "POST");
    assert_eq!(envelope["headers"]["Accept"], "application/json");
    assert_eq!(envelope["body"]["accountName"], "user@example.com");
}

#[tokio::test]
async fn relayed_cookies_surface_as_set_cookie() {
    let relay = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header(
                    "forward-cookie",
                    "X-WEBAUTH=w1; Path=/, X-SESSION=s2; HttpOnly",
                )
                .insert_header("content-encoding", "identity")
                .set_body_json(json!({})),
        )
        .mount(&relay)
        .await;

    let transport = relayed_transport(&relay);
    let target = Url::parse("https://setup.example.com/setup/ws/1/accountLogin").unwrap();
    let response = transport.send(HttpRequest::get(target)).await.unwrap();

    let cookies = response.set_cookie_values();
    assert!(cookies.contains(&"X-WEBAUTH=w1; Path=/".to_string()), "{cookies:?}");
    assert!(cookies.contains(&"X-SESSION=s2; HttpOnly".to_string()), "{cookies:?}");
    assert!(response.header("set-cookie").is_some());

    // Framing headers describing the relay hop are dropped.
    assert!(response.header("content-encoding").is_none());
}

#[tokio::test]
async fn relay_errors_map_to_transport_failures() {
    // Nothing mounted: wiremock answers 404, which the caller sees as a
    // response, not an error. A dead relay is the transport failure.
    let relay = MockServer::start().await;
    let transport = relayed_transport(&relay);
    let target = Url::parse("https://idmsa.example.com/appleauth/auth/signin").unwrap();
    let response = transport.send(HttpRequest::get(target)).await.unwrap();
    assert_eq!(response.status, 404);
}
