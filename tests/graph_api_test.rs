use httpmock::prelude::*;
use mig_reach::core::{AgeBucket, CountryCode, Gender, OriginCategory, ReachApi};
use mig_reach::domain::model::TargetingSpec;
use mig_reach::utils::error::FailureKind;
use mig_reach::{ApiSettings, EtlError, GraphApiClient};
use serde_json::json;
use std::time::Duration;

fn client(server: &MockServer, account_id: &str) -> GraphApiClient {
    GraphApiClient::new(ApiSettings {
        base_url: server.base_url(),
        api_version: "v18.0".to_string(),
        access_token: "test-token".to_string(),
        account_id: account_id.to_string(),
        timeout: Duration::from_secs(5),
        search_limit: 500,
    })
    .unwrap()
}

fn italy() -> OriginCategory {
    OriginCategory {
        id: "6015559470583".to_string(),
        name: "Lived in Italy (Formerly Expats - Italy)".to_string(),
        country: "Italy".to_string(),
    }
}

#[tokio::test]
async fn test_search_countries_sends_token_and_filters_entries() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v18.0/search")
                .query_param("type", "adgeolocation")
                .query_param("location_types", r#"["country"]"#)
                .query_param("limit", "500")
                .query_param("access_token", "test-token");
            then.status(200).json_body(json!({
                "data": [
                    {"key": "ES", "name": "Spain", "type": "country", "country_code": "ES"},
                    {"key": "DE", "name": "Germany", "type": "country", "country_code": "DE"},
                    {"key": "3847", "name": "Bavaria", "type": "region"}
                ]
            }));
        })
        .await;

    let countries = client(&server, "123").search_countries().await.unwrap();

    mock.assert_async().await;
    assert_eq!(countries.len(), 2);
    assert_eq!(countries[0].name, "Spain");
    assert_eq!(countries[1].country_code, "DE");
}

#[tokio::test]
async fn test_search_behaviors_keeps_paths() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v18.0/search")
                .query_param("type", "adTargetingCategory")
                .query_param("class", "behaviors");
            then.status(200).json_body(json!({
                "data": [
                    {
                        "id": "6015559470583",
                        "name": "Lived in Italy (Formerly Expats - Italy)",
                        "path": ["Expats", "Lived in Italy (Formerly Expats - Italy)"]
                    },
                    {"id": "6002714895372", "name": "Frequent Travelers"}
                ]
            }));
        })
        .await;

    let behaviors = client(&server, "123").search_behaviors().await.unwrap();

    mock.assert_async().await;
    assert_eq!(behaviors.len(), 2);
    assert_eq!(behaviors[0].path[0], "Expats");
    assert!(behaviors[1].path.is_empty());
}

#[tokio::test]
async fn test_reach_estimate_uses_account_endpoint() {
    let server = MockServer::start_async().await;
    let spec = TargetingSpec::for_country(CountryCode("ES".to_string()), AgeBucket::open(20))
        .with_gender(Some(Gender::Female))
        .with_origin(Some(italy()));
    let encoded = spec.to_json().to_string();

    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v18.0/act_123/reachestimate")
                .query_param("targeting_spec", encoded.as_str())
                .query_param("access_token", "test-token");
            then.status(200)
                .json_body(json!({"data": {"users": 48_000, "estimate_ready": true}}));
        })
        .await;

    let estimate = client(&server, "act_123").reach_estimate(&spec).await.unwrap();

    mock.assert_async().await;
    assert_eq!(estimate.users(), 48_000);
}

#[tokio::test]
async fn test_reach_estimate_falls_back_to_lower_bound() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/v18.0/act_123/reachestimate");
            then.status(200)
                .json_body(json!({"data": [{"users_lower_bound": 1_200, "users_upper_bound": 1_400}]}));
        })
        .await;

    let spec = TargetingSpec::for_country(CountryCode("DE".to_string()), AgeBucket::closed(18, 65));
    let estimate = client(&server, "123").reach_estimate(&spec).await.unwrap();

    mock.assert_async().await;
    assert_eq!(estimate.users(), 1_200);
}

#[tokio::test]
async fn test_error_responses_are_classified() {
    let server = MockServer::start_async().await;
    let spec = TargetingSpec::for_country(CountryCode("ES".to_string()), AgeBucket::closed(18, 65));

    let throttled = server
        .mock_async(|when, then| {
            when.method(GET).path("/v18.0/act_1/reachestimate");
            then.status(400).json_body(json!({
                "error": {
                    "message": "(#17) User request limit reached",
                    "type": "OAuthException",
                    "code": 17,
                    "error_subcode": 2446079
                }
            }));
        })
        .await;
    let err = client(&server, "1").reach_estimate(&spec).await.unwrap_err();
    assert!(matches!(err, EtlError::RateLimited { code: Some(17), .. }));
    assert_eq!(err.failure_kind(), FailureKind::RateLimited);
    throttled.assert_async().await;

    let too_many = server
        .mock_async(|when, then| {
            when.method(GET).path("/v18.0/act_2/reachestimate");
            then.status(429).body("slow down");
        })
        .await;
    let err = client(&server, "2").reach_estimate(&spec).await.unwrap_err();
    assert!(matches!(err, EtlError::RateLimited { code: None, .. }));
    too_many.assert_async().await;

    let server_error = server
        .mock_async(|when, then| {
            when.method(GET).path("/v18.0/act_3/reachestimate");
            then.status(502).body("Bad Gateway");
        })
        .await;
    let err = client(&server, "3").reach_estimate(&spec).await.unwrap_err();
    assert_eq!(err.failure_kind(), FailureKind::Transport);
    server_error.assert_async().await;

    server
        .mock_async(|when, then| {
            when.method(GET).path("/v18.0/act_4/reachestimate");
            then.status(400).json_body(json!({
                "error": {"message": "Invalid parameter", "code": 100}
            }));
        })
        .await;
    let err = client(&server, "4").reach_estimate(&spec).await.unwrap_err();
    assert!(matches!(err, EtlError::InvalidInput { code: Some(100), .. }));
    assert_eq!(err.failure_kind(), FailureKind::Fatal);
}

#[tokio::test]
async fn test_unreachable_server_is_transport_error() {
    let settings = ApiSettings {
        base_url: "http://127.0.0.1:9".to_string(),
        api_version: "v18.0".to_string(),
        access_token: "test-token".to_string(),
        account_id: "123".to_string(),
        timeout: Duration::from_secs(2),
        search_limit: 10,
    };
    let client = GraphApiClient::new(settings).unwrap();

    let err = client.search_countries().await.unwrap_err();
    assert!(matches!(err, EtlError::TransportError { .. }));
}
