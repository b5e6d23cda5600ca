use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::X12Error;
use crate::segment::{
    format_amount, open_envelope, parse_amount, write_envelope, EnvelopeOptions, SegmentWriter,
};

const VERSION_837: &str = "005010X222A1";
const VERSION_999: &str = "005010X231A1";
const VERSION_835: &str = "005010X221A1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceLine {
    pub procedure_code: String,
    pub charge_cents: i64,
    pub units: u32,
    pub service_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub encounter_id: String,
    pub member_id: String,
    pub payer_code: String,
    pub provider_npi: String,
    pub subscriber_last_name: String,
    pub subscriber_first_name: String,
    pub diagnosis_codes: Vec<String>,
    pub service_lines: Vec<ServiceLine>,
}

impl ClaimRequest {
    pub fn total_charge_cents(&self) -> i64 {
        self.service_lines.iter().map(|l| l.charge_cents).sum()
    }
}

/// 999-style acknowledgment of an 837 submission. `control_number` is the
/// clearinghouse-assigned interchange control number the claim is tracked
/// under from this point on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimAck {
    pub control_number: String,
    pub accepted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClaimPaymentStatus {
    Paid,
    Denied,
}

/// Settlement parsed from an 835 remittance CLP loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimResult {
    pub encounter_id: String,
    pub control_number: String,
    pub status: ClaimPaymentStatus,
    pub charged_cents: i64,
    pub paid_cents: i64,
    pub denial_reason: Option<String>,
}

/// Builds an X12 837 professional claim.
pub fn encode_claim_request(
    request: &ClaimRequest,
    options: &EnvelopeOptions,
) -> Result<String, X12Error> {
    if request.encounter_id.is_empty() {
        return Err(X12Error::MissingField("encounter id"));
    }
    if request.member_id.is_empty() {
        return Err(X12Error::MissingField("member id"));
    }
    if request.payer_code.is_empty() {
        return Err(X12Error::MissingField("payer code"));
    }
    if request.provider_npi.is_empty() {
        return Err(X12Error::MissingField("provider npi"));
    }
    if request.diagnosis_codes.is_empty() {
        return Err(X12Error::MissingField("diagnosis codes"));
    }
    if request.service_lines.is_empty() {
        return Err(X12Error::MissingField("service lines"));
    }

    let date = options.timestamp.format("%Y%m%d").to_string();
    let time = options.timestamp.format("%H%M").to_string();
    let total_charge = format_amount(request.total_charge_cents());

    let mut body = SegmentWriter::new();
    body.segment(
        "BHT",
        &["0019", "00", &request.encounter_id, &date, &time, "CH"],
    );
    body.segment(
        "NM1",
        &["41", "2", "SUBMITTER", "", "", "", "", "46", &options.sender_id],
    );
    body.segment(
        "NM1",
        &["40", "2", "RECEIVER", "", "", "", "", "46", &request.payer_code],
    );
    body.segment("HL", &["1", "", "20", "1"]);
    body.segment(
        "NM1",
        &[
            "85",
            "2",
            "BILLING PROVIDER",
            "",
            "",
            "",
            "",
            "XX",
            &request.provider_npi,
        ],
    );
    body.segment("HL", &["2", "1", "22", "0"]);
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
    body.segment(
        "CLM",
        &[
            &request.encounter_id,
            &total_charge,
            "",
            "",
            "11:B:1",
            "Y",
            "A",
            "Y",
            "Y",
        ],
    );

    let diagnosis_elements: Vec<String> = request
        .diagnosis_codes
        .iter()
        .enumerate()
        .map(|(i, code)| {
            let qualifier = if i == 0 { "ABK" } else { "ABF" };
            format!("{}:{}", qualifier, code)
        })
        .collect();
    let diagnosis_refs: Vec<&str> = diagnosis_elements.iter().map(String::as_str).collect();
    body.segment("HI", &diagnosis_refs);

    for (index, line) in request.service_lines.iter().enumerate() {
        let line_number = (index + 1).to_string();
        let composite = format!("HC:{}", line.procedure_code);
        let charge = format_amount(line.charge_cents);
        let units = line.units.to_string();
        let line_date = line.service_date.format("%Y%m%d").to_string();

        body.segment("LX", &[&line_number]);
        body.segment("SV1", &[&composite, &charge, "UN", &units]);
        body.segment("DTP", &["472", "D8", &line_date]);
    }

    Ok(write_envelope(options, "HC", "837", VERSION_837, &body))
}

/// Parses an X12 837, the inverse of [`encode_claim_request`].
pub fn decode_claim_request(raw: &str) -> Result<ClaimRequest, X12Error> {
    let interchange = open_envelope(raw, "837")?;

    let mut encounter_id = None;
    let mut member_id = None;
    let mut last_name = String::new();
    let mut first_name = String::new();
    let mut payer_code = None;
    let mut provider_npi = None;
    let mut diagnosis_codes = Vec::new();
    let mut service_lines = Vec::new();
    let mut current_line: Option<PendingLine> = None;

    for segment in &interchange.body {
        match segment.id.as_str() {
            "NM1" => match segment.element(1) {
                Some("40") => payer_code = Some(segment.required(9)?.to_string()),
                Some("85") => provider_npi = Some(segment.required(9)?.to_string()),
                Some("IL") => {
                    last_name = segment.element(3).unwrap_or_default().to_string();
                    first_name = segment.element(4).unwrap_or_default().to_string();
                    member_id = Some(segment.required(9)?.to_string());
                }
                _ => {}
            },
            "CLM" => encounter_id = Some(segment.required(1)?.to_string()),
            "HI" => {
                for element in &segment.elements {
                    if let Some((_, code)) = element.split_once(':') {
                        diagnosis_codes.push(code.to_string());
                    }
                }
            }
            "LX" => {
                if let Some(line) = current_line.take() {
                    service_lines.push(line.finish()?);
                }
                current_line = Some(PendingLine::default());
            }
            "SV1" => {
                let line = current_line
                    .as_mut()
                    .ok_or_else(|| X12Error::Parse("SV1 outside an LX loop".to_string()))?;
                line.procedure_code = segment
                    .sub_element(1, 1)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string);
                line.charge_cents = Some(parse_amount(segment.required(2)?)?);
                let units = segment.required(4)?;
                line.units = Some(units.parse().map_err(|_| {
                    X12Error::Parse(format!("invalid SV1 unit count: {}", units))
                })?);
            }
            "DTP" if segment.element(1) == Some("472") => {
                let line = current_line
                    .as_mut()
                    .ok_or_else(|| X12Error::Parse("DTP*472 outside an LX loop".to_string()))?;
                let raw_date = segment.required(3)?;
                let parsed = NaiveDate::parse_from_str(raw_date, "%Y%m%d").map_err(|_| {
                    X12Error::Parse(format!("invalid DTP service date: {}", raw_date))
                })?;
                line.service_date = Some(parsed);
            }
            _ => {}
        }
    }
    if let Some(line) = current_line.take() {
        service_lines.push(line.finish()?);
    }

    if service_lines.is_empty() {
        return Err(X12Error::Parse("837 carries no service lines".to_string()));
    }

    Ok(ClaimRequest {
        encounter_id: encounter_id
            .ok_or_else(|| X12Error::Parse("837 missing CLM claim information".to_string()))?,
        member_id: member_id
            .ok_or_else(|| X12Error::Parse("837 missing subscriber NM1*IL".to_string()))?,
        payer_code: payer_code
            .ok_or_else(|| X12Error::Parse("837 missing receiver NM1*40".to_string()))?,
        provider_npi: provider_npi
            .ok_or_else(|| X12Error::Parse("837 missing billing provider NM1*85".to_string()))?,
        subscriber_last_name: last_name,
        subscriber_first_name: first_name,
        diagnosis_codes,
        service_lines,
    })
}

#[derive(Default)]
struct PendingLine {
    procedure_code: Option<String>,
    charge_cents: Option<i64>,
    units: Option<u32>,
    service_date: Option<NaiveDate>,
}

impl PendingLine {
    fn finish(self) -> Result<ServiceLine, X12Error> {
        Ok(ServiceLine {
            procedure_code: self
                .procedure_code
                .ok_or_else(|| X12Error::Parse("service line missing SV1 procedure".to_string()))?,
            charge_cents: self
                .charge_cents
                .ok_or_else(|| X12Error::Parse("service line missing SV1 charge".to_string()))?,
            units: self
                .units
                .ok_or_else(|| X12Error::Parse("service line missing SV1 units".to_string()))?,
            service_date: self
                .service_date
                .ok_or_else(|| X12Error::Parse("service line missing DTP*472 date".to_string()))?,
        })
    }
}

/// Builds a 999 acknowledgment; test-double support.
pub fn encode_claim_ack(ack: &ClaimAck, options: &EnvelopeOptions) -> String {
    let code = if ack.accepted { "A" } else { "R" };
    let accepted_count = if ack.accepted { "1" } else { "0" };

    let mut body = SegmentWriter::new();
    body.segment("AK1", &["HC", "1"]);
    body.segment("AK2", &["837", "0001"]);
    body.segment("IK5", &[code]);
    body.segment("AK9", &[code, "1", "1", accepted_count]);

    write_envelope(options, "FA", "999", VERSION_999, &body)
}

/// Parses the 999 acknowledgment returned by the claims endpoint.
pub fn decode_claim_ack(raw: &str) -> Result<ClaimAck, X12Error> {
    let interchange = open_envelope(raw, "999")?;

    let ak9 = interchange
        .body
        .iter()
        .find(|s| s.id == "AK9")
        .ok_or_else(|| X12Error::Parse("999 missing AK9 acknowledgment".to_string()))?;

    let accepted = match ak9.required(1)? {
        "A" | "E" => true,
        "R" | "M" | "P" | "W" | "X" => false,
        other => {
            return Err(X12Error::Parse(format!(
                "unknown AK9 acknowledgment code: {}",
                other
            )))
        }
    };

    Ok(ClaimAck {
        control_number: interchange.control_number,
        accepted,
    })
}

/// Builds an 835 remittance; test-double support.
pub fn encode_claim_remittance(result: &ClaimResult, options: &EnvelopeOptions) -> String {
    let status_code = match result.status {
        ClaimPaymentStatus::Paid => "1",
        ClaimPaymentStatus::Denied => "4",
    };
    let paid = format_amount(result.paid_cents);
    let charged = format_amount(result.charged_cents);

    let mut body = SegmentWriter::new();
    body.segment("BPR", &["I", &paid, "C", "CHK"]);
    body.segment("CLP", &[&result.encounter_id, status_code, &charged, &paid]);
    if let Some(reason) = &result.denial_reason {
        body.segment("CAS", &["CO", reason, &charged]);
    }

    write_envelope(options, "HP", "835", VERSION_835, &body)
}

/// Parses the 835 remittance advice a status check returns once the
/// claim settles.
pub fn decode_claim_remittance(raw: &str) -> Result<ClaimResult, X12Error> {
    let interchange = open_envelope(raw, "835")?;

    let clp = interchange
        .body
        .iter()
        .find(|s| s.id == "CLP")
        .ok_or_else(|| X12Error::Parse("835 missing CLP claim payment information".to_string()))?;

    let status = match clp.required(2)? {
        "1" | "2" | "3" => ClaimPaymentStatus::Paid,
        "4" => ClaimPaymentStatus::Denied,
        other => {
            return Err(X12Error::Parse(format!(
                "unknown CLP claim status code: {}",
                other
            )))
        }
    };

    let denial_reason = interchange
        .body
        .iter()
        .find(|s| s.id == "CAS")
        .map(|s| s.required(2).map(str::to_string))
        .transpose()?;

    Ok(ClaimResult {
        encounter_id: clp.required(1)?.to_string(),
        control_number: interchange.control_number,
        status,
        charged_cents: parse_amount(clp.required(3)?)?,
        paid_cents: parse_amount(clp.required(4)?)?,
        denial_reason,
    })
}
