use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::X12Error;
use crate::segment::{
    format_amount, open_envelope, parse_amount, write_envelope, EnvelopeOptions, SegmentWriter,
};

const VERSION_270: &str = "005010X279A1";

/// Plan coverage and benefits, the default 270 inquiry type.
pub const SERVICE_TYPE_PLAN_COVERAGE: &str = "30";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibilityRequest {
    pub member_id: String,
    pub payer_code: String,
    pub provider_npi: String,
    pub subscriber_last_name: String,
    pub subscriber_first_name: String,
    pub service_date: NaiveDate,
    pub service_type_code: String,
    pub trace_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenefitCoverage {
    pub service_type_code: String,
    pub coverage_level: Option<String>,
    pub benefit_amount_cents: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub code: String,
    pub reason: String,
}

impl Rejection {
    /// AAA03 request-validation codes we expect from payers.
    pub fn from_code(code: &str) -> Self {
        let reason = match code {
            "42" => "unable to respond at current time",
            "72" => "invalid or missing subscriber id",
            "75" => "subscriber or insured not found",
            "79" => "invalid participant identification",
            _ => "payer rejected the request",
        };
        Self {
            code: code.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibilityResult {
    pub member_id: String,
    pub payer_code: String,
    pub trace_id: String,
    pub control_number: String,
    pub plan_active: bool,
    pub coverages: Vec<BenefitCoverage>,
    pub rejection: Option<Rejection>,
}

/// Builds an X12 270 eligibility inquiry.
pub fn encode_eligibility_request(
    request: &EligibilityRequest,
    options: &EnvelopeOptions,
) -> Result<String, X12Error> {
    if request.member_id.is_empty() {
        return Err(X12Error::MissingField("member id"));
    }
    if request.payer_code.is_empty() {
        return Err(X12Error::MissingField("payer code"));
    }
    if request.provider_npi.is_empty() {
        return Err(X12Error::MissingField("provider npi"));
    }
    if request.trace_id.is_empty() {
        return Err(X12Error::MissingField("trace id"));
    }

    let date = options.timestamp.format("%Y%m%d").to_string();
    let time = options.timestamp.format("%H%M").to_string();
    let service_date = request.service_date.format("%Y%m%d").to_string();

    let mut body = SegmentWriter::new();
    body.segment("BHT", &["0022", "13", &request.trace_id, &date, &time]);
    body.segment("HL", &["1", "", "20", "1"]);
    body.segment(
        "NM1",
        &["PR", "2", "PAYER", "", "", "", "", "PI", &request.payer_code],
    );
    body.segment("HL", &["2", "1", "21", "1"]);
    body.segment(
        "NM1",
        &["1P", "2", "PROVIDER", "", "", "", "", "XX", &request.provider_npi],
    );
    body.segment("HL", &["3", "2", "22", "0"]);
    body.segment("TRN", &["1", &request.trace_id, "9000000001"]);
    body.segment(
        "NM1",
        &[
            "IL",
            "1",
            &request.subscriber_last_name,
            &request.subscriber_first_name,
            "",
            "",
            "",
            "MI",
            &request.member_id,
        ],
    );
    body.segment("DTP", &["291", "D8", &service_date]);
    body.segment("EQ", &[&request.service_type_code]);

    Ok(write_envelope(options, "HS", "270", VERSION_270, &body))
}

/// Parses an X12 270, the inverse of [`encode_eligibility_request`].
pub fn decode_eligibility_request(raw: &str) -> Result<EligibilityRequest, X12Error> {
    let interchange = open_envelope(raw, "270")?;

    let mut member_id = None;
    let mut last_name = String::new();
    let mut first_name = String::new();
    let mut payer_code = None;
    let mut provider_npi = None;
    let mut trace_id = None;
    let mut service_date = None;
    let mut service_type = None;

    for segment in &interchange.body {
        match segment.id.as_str() {
            "NM1" => match segment.element(1) {
                Some("PR") => payer_code = Some(segment.required(9)?.to_string()),
                Some("1P") => provider_npi = Some(segment.required(9)?.to_string()),
                Some("IL") => {
                    last_name = segment.element(3).unwrap_or_default().to_string();
                    first_name = segment.element(4).unwrap_or_default().to_string();
                    member_id = Some(segment.required(9)?.to_string());
                }
                _ => {}
            },
            "TRN" => trace_id = Some(segment.required(2)?.to_string()),
            "DTP" if segment.element(1) == Some("291") => {
                let raw_date = segment.required(3)?;
                let parsed = NaiveDate::parse_from_str(raw_date, "%Y%m%d").map_err(|_| {
                    X12Error::Parse(format!("invalid DTP service date: {}", raw_date))
                })?;
                service_date = Some(parsed);
            }
            "EQ" => service_type = Some(segment.required(1)?.to_string()),
            _ => {}
        }
    }

    Ok(EligibilityRequest {
        member_id: member_id
            .ok_or_else(|| X12Error::Parse("270 missing subscriber NM1*IL".to_string()))?,
        payer_code: payer_code
            .ok_or_else(|| X12Error::Parse("270 missing payer NM1*PR".to_string()))?,
        provider_npi: provider_npi
            .ok_or_else(|| X12Error::Parse("270 missing provider NM1*1P".to_string()))?,
        subscriber_last_name: last_name,
        subscriber_first_name: first_name,
        service_date: service_date
            .ok_or_else(|| X12Error::Parse("270 missing DTP*291 service date".to_string()))?,
        service_type_code: service_type
            .ok_or_else(|| X12Error::Parse("270 missing EQ inquiry".to_string()))?,
        trace_id: trace_id
            .ok_or_else(|| X12Error::Parse("270 missing TRN trace".to_string()))?,
    })
}

/// Builds an X12 271 benefit response. Production code never calls this;
/// it exists for test doubles standing in for the clearinghouse.
pub fn encode_eligibility_response(
    result: &EligibilityResult,
    options: &EnvelopeOptions,
) -> Result<String, X12Error> {
    if result.member_id.is_empty() {
        return Err(X12Error::MissingField("member id"));
    }
    if result.payer_code.is_empty() {
        return Err(X12Error::MissingField("payer code"));
    }

    let date = options.timestamp.format("%Y%m%d").to_string();
    let time = options.timestamp.format("%H%M").to_string();
    let status_code = if result.plan_active { "1" } else { "6" };

    let mut body = SegmentWriter::new();
    body.segment("BHT", &["0022", "11", &result.trace_id, &date, &time]);
    body.segment("HL", &["1", "", "20", "1"]);
    body.segment(
        "NM1",
        &["PR", "2", "PAYER", "", "", "", "", "PI", &result.payer_code],
    );
    body.segment("HL", &["2", "1", "21", "1"]);
    body.segment("NM1", &["1P", "2", "PROVIDER"]);
    body.segment("HL", &["3", "2", "22", "0"]);
    body.segment("TRN", &["2", &result.trace_id, "9000000001"]);
    body.segment(
        "NM1",
        &["IL", "1", "", "", "", "", "", "MI", &result.member_id],
    );

    if let Some(rejection) = &result.rejection {
        body.segment("AAA", &["Y", "", &rejection.code, "C"]);
    }

    if result.coverages.is_empty() && result.rejection.is_none() {
        body.segment("EB", &[status_code]);
    }
    for coverage in &result.coverages {
        let amount = coverage
            .benefit_amount_cents
            .map(format_amount)
            .unwrap_or_default();
        body.segment(
            "EB",
            &[
                status_code,
                coverage.coverage_level.as_deref().unwrap_or_default(),
                &coverage.service_type_code,
                "",
                "",
                "",
                &amount,
            ],
        );
    }

    Ok(write_envelope(options, "HB", "271", VERSION_270, &body))
}

/// Parses an X12 271 benefit response. Any structural mismatch is a
/// permanent failure; the submission must not be retried.
pub fn decode_eligibility_response(raw: &str) -> Result<EligibilityResult, X12Error> {
    let interchange = open_envelope(raw, "271")?;

    let mut member_id = None;
    let mut payer_code = None;
    let mut trace_id = None;
    let mut plan_active = None;
    let mut coverages = Vec::new();
    let mut rejection = None;

    for segment in &interchange.body {
        match segment.id.as_str() {
            "NM1" => match segment.element(1) {
                Some("PR") => payer_code = Some(segment.required(9)?.to_string()),
                Some("IL") => member_id = Some(segment.required(9)?.to_string()),
                _ => {}
            },
            "TRN" => trace_id = Some(segment.required(2)?.to_string()),
            "EB" => {
                let status = segment.required(1)?;
                if plan_active.is_none() {
                    plan_active = Some(status == "1");
                }
                if let Some(service_type) = segment.element(3).filter(|s| !s.is_empty()) {
                    let benefit_amount_cents = match segment.element(7).filter(|s| !s.is_empty()) {
                        Some(amount) => Some(parse_amount(amount)?),
                        None => None,
                    };
                    coverages.push(BenefitCoverage {
                        service_type_code: service_type.to_string(),
                        coverage_level: segment
                            .element(2)
                            .filter(|s| !s.is_empty())
                            .map(str::to_string),
                        benefit_amount_cents,
                    });
                }
            }
            "AAA" => {
                rejection = Some(Rejection::from_code(segment.required(3)?));
            }
            _ => {}
        }
    }

    if plan_active.is_none() && rejection.is_none() {
        return Err(X12Error::Parse(
            "271 carries neither EB benefits nor AAA rejection".to_string(),
        ));
    }

    Ok(EligibilityResult {
        member_id: member_id
            .ok_or_else(|| X12Error::Parse("271 missing subscriber NM1*IL".to_string()))?,
        payer_code: payer_code
            .ok_or_else(|| X12Error::Parse("271 missing payer NM1*PR".to_string()))?,
        trace_id: trace_id
            .ok_or_else(|| X12Error::Parse("271 missing TRN trace".to_string()))?,
        control_number: interchange.control_number,
        plan_active: plan_active.unwrap_or(false),
        coverages,
        rejection,
    })
}
