use std::time::Duration;

use assert_matches::assert_matches;
use chrono::NaiveDate;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gateway_cell::{ClearinghouseClient, ErrorClass, GatewayError, PayerGateway, StatusCheck};
use shared_config::AppConfig;
use x12_cell::*;

fn test_config(base_url: &str) -> AppConfig {
    AppConfig {
        clearinghouse_base_url: base_url.to_string(),
        clearinghouse_client_id: "test-client".to_string(),
        clearinghouse_client_secret: "test-secret".to_string(),
        submitter_id: "FLOWIQ".to_string(),
        receiver_id: "CLEARINGHOUSE".to_string(),
        redis_url: None,
    }
}

fn eligibility_request() -> EligibilityRequest {
    EligibilityRequest {
        member_id: "M123".to_string(),
        payer_code: "BCBS01".to_string(),
        provider_npi: "1234567890".to_string(),
        subscriber_last_name: "DOE".to_string(),
        subscriber_first_name: "JANE".to_string(),
        service_date: NaiveDate::from_ymd_opt(2024, 1, 30).unwrap(),
        service_type_code: SERVICE_TYPE_PLAN_COVERAGE.to_string(),
        trace_id: "TRACE-0001".to_string(),
    }
}

fn benefit_response_body(control_number: u32) -> String {
    let result = EligibilityResult {
        member_id: "M123".to_string(),
        payer_code: "BCBS01".to_string(),
        trace_id: "TRACE-0001".to_string(),
        control_number: format!("{:09}", control_number),
        plan_active: true,
        coverages: vec![BenefitCoverage {
            service_type_code: "30".to_string(),
            coverage_level: Some("IND".to_string()),
            benefit_amount_cents: Some(100_000),
        }],
        rejection: None,
    };
    let options = EnvelopeOptions::new("CLEARINGHOUSE", "FLOWIQ", control_number);
    encode_eligibility_response(&result, &options).unwrap()
}

async fn mount_token_endpoint(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "tok-1",
            "token_type": "bearer",
            "expires_in": 3600
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn submit_eligibility_parses_benefit_response() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/x12/eligibility"))
        .respond_with(ResponseTemplate::new(200).set_body_string(benefit_response_body(42)))
        .mount(&server)
        .await;

    let client = ClearinghouseClient::new(&test_config(&server.uri())).unwrap();
    let result = client
        .submit_eligibility(&eligibility_request())
        .await
        .unwrap();

    assert_eq!(result.member_id, "M123");
    assert_eq!(result.payer_code, "BCBS01");
    assert_eq!(result.control_number, format!("{:09}", 42));
    assert!(result.plan_active);
}

#[tokio::test]
async fn token_is_cached_across_calls() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/x12/eligibility"))
        .respond_with(ResponseTemplate::new(200).set_body_string(benefit_response_body(1)))
        .expect(2)
        .mount(&server)
        .await;

    let client = ClearinghouseClient::new(&test_config(&server.uri())).unwrap();
    client
        .submit_eligibility(&eligibility_request())
        .await
        .unwrap();
    client
        .submit_eligibility(&eligibility_request())
        .await
        .unwrap();
}

#[tokio::test]
async fn server_errors_are_transient() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/x12/eligibility"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let client = ClearinghouseClient::new(&test_config(&server.uri())).unwrap();
    let err = client
        .submit_eligibility(&eligibility_request())
        .await
        .unwrap_err();

    assert_matches!(err, GatewayError::HttpStatus { status: 503, .. });
    assert_eq!(err.class(), ErrorClass::Transient);
}

#[tokio::test]
async fn malformed_response_is_permanent() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/x12/eligibility"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not an x12 payload"))
        .mount(&server)
        .await;

    let client = ClearinghouseClient::new(&test_config(&server.uri())).unwrap();
    let err = client
        .submit_eligibility(&eligibility_request())
        .await
        .unwrap_err();

    assert_matches!(err, GatewayError::X12(_));
    assert_eq!(err.class(), ErrorClass::Permanent);
    assert!(err.to_string().to_lowercase().contains("parse"));
}

#[tokio::test]
async fn rejected_token_is_refreshed_and_retried_once() {
    let server = MockServer::start().await;
    // Initial fetch plus the forced refresh after the 401.
    mount_token_endpoint(&server, 2).await;

    Mock::given(method("POST"))
        .and(path("/x12/eligibility"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/x12/eligibility"))
        .respond_with(ResponseTemplate::new(200).set_body_string(benefit_response_body(7)))
        .mount(&server)
        .await;

    let client = ClearinghouseClient::new(&test_config(&server.uri())).unwrap();
    let result = client
        .submit_eligibility(&eligibility_request())
        .await
        .unwrap();

    assert_eq!(result.member_id, "M123");
}

#[tokio::test]
async fn recurring_unauthorized_is_permanent() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, 2).await;

    Mock::given(method("POST"))
        .and(path("/x12/eligibility"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid audience"))
        .mount(&server)
        .await;

    let client = ClearinghouseClient::new(&test_config(&server.uri())).unwrap();
    let err = client
        .submit_eligibility(&eligibility_request())
        .await
        .unwrap_err();

    assert_matches!(err, GatewayError::Auth(_));
    assert_eq!(err.class(), ErrorClass::Permanent);
}

#[tokio::test]
async fn slow_clearinghouse_times_out_as_transient() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/x12/eligibility"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(benefit_response_body(1))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let client =
        ClearinghouseClient::with_timeout(&test_config(&server.uri()), Duration::from_millis(100))
            .unwrap();
    let err = client
        .submit_eligibility(&eligibility_request())
        .await
        .unwrap_err();

    assert_matches!(err, GatewayError::Timeout);
    assert_eq!(err.class(), ErrorClass::Transient);
}

#[tokio::test]
async fn claim_submission_returns_clearinghouse_control_number() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, 1).await;

    let ack = ClaimAck {
        control_number: format!("{:09}", 314159),
        accepted: true,
    };
    let ack_body = encode_claim_ack(&ack, &EnvelopeOptions::new("CLEARINGHOUSE", "FLOWIQ", 314159));
    Mock::given(method("POST"))
        .and(path("/x12/claims"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ack_body))
        .mount(&server)
        .await;

    let claim = ClaimRequest {
        encounter_id: "ENC-1".to_string(),
        member_id: "M123".to_string(),
        payer_code: "BCBS01".to_string(),
        provider_npi: "1234567890".to_string(),
        subscriber_last_name: "DOE".to_string(),
        subscriber_first_name: "JANE".to_string(),
        diagnosis_codes: vec!["Z0000".to_string()],
        service_lines: vec![ServiceLine {
            procedure_code: "99213".to_string(),
            charge_cents: 5000,
            units: 1,
            service_date: NaiveDate::from_ymd_opt(2024, 1, 30).unwrap(),
        }],
    };

    let client = ClearinghouseClient::new(&test_config(&server.uri())).unwrap();
    let received = client.submit_claim(&claim).await.unwrap();

    assert_eq!(received, ack);
}

#[tokio::test]
async fn status_check_distinguishes_pending_from_settled() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, 1).await;

    let control = format!("{:09}", 314159);
    let settled = ClaimResult {
        encounter_id: "ENC-1".to_string(),
        control_number: control.clone(),
        status: ClaimPaymentStatus::Paid,
        charged_cents: 5000,
        paid_cents: 4200,
        denial_reason: None,
    };
    let remittance =
        encode_claim_remittance(&settled, &EnvelopeOptions::new("CLEARINGHOUSE", "FLOWIQ", 314159));

    Mock::given(method("GET"))
        .and(path(format!("/x12/claims/{}/status", control)))
        .respond_with(ResponseTemplate::new(204))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/x12/claims/{}/status", control)))
        .respond_with(ResponseTemplate::new(200).set_body_string(remittance))
        .mount(&server)
        .await;

    let client = ClearinghouseClient::new(&test_config(&server.uri())).unwrap();

    assert_eq!(
        client.check_claim_status(&control).await.unwrap(),
        StatusCheck::Pending
    );
    assert_matches!(
        client.check_claim_status(&control).await.unwrap(),
        StatusCheck::Settled(result) if result == settled
    );
}
