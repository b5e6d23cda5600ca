//! X12 EDI codec for the payer transaction pipeline: 270/271 eligibility,
//! 837 claims, 999 acknowledgments and 835 remittances over a pragmatic
//! 5010 envelope subset.

pub mod claim;
pub mod eligibility;
pub mod error;
pub mod segment;

pub use claim::{
    decode_claim_ack, decode_claim_remittance, decode_claim_request, encode_claim_ack,
    encode_claim_remittance, encode_claim_request, ClaimAck, ClaimPaymentStatus, ClaimRequest,
    ClaimResult, ServiceLine,
};
pub use eligibility::{
    decode_eligibility_request, decode_eligibility_response, encode_eligibility_request,
    encode_eligibility_response, BenefitCoverage, EligibilityRequest, EligibilityResult,
    Rejection, SERVICE_TYPE_PLAN_COVERAGE,
};
pub use error::X12Error;
pub use segment::EnvelopeOptions;
