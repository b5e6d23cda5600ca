use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Instant;

use async_trait::async_trait;
use chrono::NaiveDate;

use gateway_cell::{GatewayError, PayerGateway, StatusCheck};
use x12_cell::{ClaimAck, ClaimRequest, EligibilityRequest, EligibilityResult, ServiceLine};

/// Scripted clearinghouse double. Each call pops the next scripted
/// response for that method and records when it happened, so tests can
/// assert on retry counts and backoff spacing.
#[derive(Default)]
pub struct FakeGateway {
    eligibility_script: Mutex<VecDeque<Result<EligibilityResult, GatewayError>>>,
    claim_script: Mutex<VecDeque<Result<ClaimAck, GatewayError>>>,
    status_script: Mutex<VecDeque<Result<StatusCheck, GatewayError>>>,
    pub eligibility_calls: Mutex<Vec<Instant>>,
    pub claim_calls: Mutex<Vec<Instant>>,
    pub status_calls: Mutex<Vec<Instant>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_eligibility(&self, response: Result<EligibilityResult, GatewayError>) {
        self.eligibility_script.lock().unwrap().push_back(response);
    }

    pub fn script_claim(&self, response: Result<ClaimAck, GatewayError>) {
        self.claim_script.lock().unwrap().push_back(response);
    }

    pub fn script_status(&self, response: Result<StatusCheck, GatewayError>) {
        self.status_script.lock().unwrap().push_back(response);
    }

    pub fn eligibility_call_count(&self) -> usize {
        self.eligibility_calls.lock().unwrap().len()
    }

    pub fn claim_call_count(&self) -> usize {
        self.claim_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl PayerGateway for FakeGateway {
    async fn submit_eligibility(
        &self,
        _request: &EligibilityRequest,
    ) -> Result<EligibilityResult, GatewayError> {
        self.eligibility_calls.lock().unwrap().push(Instant::now());
        self.eligibility_script
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted eligibility response left")
    }

    async fn submit_claim(&self, _request: &ClaimRequest) -> Result<ClaimAck, GatewayError> {
        self.claim_calls.lock().unwrap().push(Instant::now());
        self.claim_script
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted claim response left")
    }

    async fn check_claim_status(
        &self,
        _control_number: &str,
    ) -> Result<StatusCheck, GatewayError> {
        self.status_calls.lock().unwrap().push(Instant::now());
        self.status_script
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted status response left")
    }
}

pub fn sample_eligibility_request() -> EligibilityRequest {
    EligibilityRequest {
        member_id: "W883449464".to_string(),
        payer_code: "60054".to_string(),
        provider_npi: "1548271829".to_string(),
        subscriber_last_name: "DOE".to_string(),
        subscriber_first_name: "JANE".to_string(),
        service_date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
        service_type_code: "30".to_string(),
        trace_id: "TRACE001".to_string(),
    }
}

pub fn sample_claim_request() -> ClaimRequest {
    ClaimRequest {
        encounter_id: "ENC-2001".to_string(),
        member_id: "W883449464".to_string(),
        payer_code: "60054".to_string(),
        provider_npi: "1548271829".to_string(),
        subscriber_last_name: "DOE".to_string(),
        subscriber_first_name: "JANE".to_string(),
        diagnosis_codes: vec!["J069".to_string()],
        service_lines: vec![ServiceLine {
            procedure_code: "99213".to_string(),
            charge_cents: 12_500,
            units: 1,
            service_date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
        }],
    }
}

pub fn active_eligibility_result(trace_id: &str) -> EligibilityResult {
    EligibilityResult {
        member_id: "W883449464".to_string(),
        payer_code: "60054".to_string(),
        trace_id: trace_id.to_string(),
        control_number: "000000123".to_string(),
        plan_active: true,
        coverages: Vec::new(),
        rejection: None,
    }
}
