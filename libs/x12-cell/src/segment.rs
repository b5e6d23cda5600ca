use chrono::{DateTime, Utc};

use crate::error::X12Error;

pub const SEGMENT_TERMINATOR: char = '~';
pub const ELEMENT_SEPARATOR: char = '*';
pub const SUB_ELEMENT_SEPARATOR: char = ':';

/// A single X12 segment. Element positions are 1-based to match the
/// X12 naming convention (NM109 is `element(9)` of an NM1 segment).
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub id: String,
    pub elements: Vec<String>,
}

impl Segment {
    pub fn element(&self, position: usize) -> Option<&str> {
        if position == 0 {
            return None;
        }
        self.elements.get(position - 1).map(|s| s.as_str())
    }

    pub fn required(&self, position: usize) -> Result<&str, X12Error> {
        self.element(position)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                X12Error::Parse(format!(
                    "segment {} missing element {:02}",
                    self.id, position
                ))
            })
    }

    /// First sub-element (before `:`) of the element at `position`.
    pub fn sub_element(&self, position: usize, sub: usize) -> Option<&str> {
        self.element(position)
            .and_then(|e| e.split(SUB_ELEMENT_SEPARATOR).nth(sub))
    }
}

/// Splits raw X12 text into segments, tolerating newlines and
/// whitespace between segments.
pub fn parse_segments(raw: &str) -> Result<Vec<Segment>, X12Error> {
    let mut segments = Vec::new();

    for chunk in raw.split(SEGMENT_TERMINATOR) {
        let chunk = chunk.trim();
        if chunk.is_empty() {
            continue;
        }

        let mut parts = chunk.split(ELEMENT_SEPARATOR);
        let id = parts
            .next()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| X12Error::Parse("segment with empty identifier".to_string()))?;

        segments.push(Segment {
            id,
            elements: parts.map(|s| s.to_string()).collect(),
        });
    }

    if segments.is_empty() {
        return Err(X12Error::Parse("payload contains no segments".to_string()));
    }

    Ok(segments)
}

pub struct SegmentWriter {
    out: String,
    count: usize,
}

impl SegmentWriter {
    pub fn new() -> Self {
        Self {
            out: String::new(),
            count: 0,
        }
    }

    /// Writes a segment, dropping trailing empty elements as X12 allows.
    pub fn segment(&mut self, id: &str, elements: &[&str]) {
        let last = elements
            .iter()
            .rposition(|e| !e.is_empty())
            .map(|i| i + 1)
            .unwrap_or(0);
        self.raw_segment(id, &elements[..last]);
    }

    /// Writes a segment keeping every element, required for the
    /// fixed-width ISA header.
    pub fn raw_segment(&mut self, id: &str, elements: &[&str]) {
        self.out.push_str(id);
        for element in elements {
            self.out.push(ELEMENT_SEPARATOR);
            self.out.push_str(element);
        }
        self.out.push(SEGMENT_TERMINATOR);
        self.count += 1;
    }

    pub fn segment_count(&self) -> usize {
        self.count
    }

    pub fn finish(self) -> String {
        self.out
    }
}

impl Default for SegmentWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Interchange-level options for building an outbound envelope.
#[derive(Debug, Clone)]
pub struct EnvelopeOptions {
    pub sender_id: String,
    pub receiver_id: String,
    pub control_number: u32,
    pub timestamp: DateTime<Utc>,
}

impl EnvelopeOptions {
    pub fn new(sender_id: &str, receiver_id: &str, control_number: u32) -> Self {
        Self {
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            control_number,
            timestamp: Utc::now(),
        }
    }
}

/// A parsed interchange: envelope identifiers plus the body segments
/// between ST and SE.
#[derive(Debug, Clone)]
pub struct Interchange {
    pub control_number: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub transaction_set: String,
    pub body: Vec<Segment>,
}

/// Wraps `body` in a full ISA/GS/ST .. SE/GE/IEA envelope.
pub fn write_envelope(
    options: &EnvelopeOptions,
    functional_id: &str,
    transaction_set: &str,
    version: &str,
    body: &SegmentWriter,
) -> String {
    let date_long = options.timestamp.format("%Y%m%d").to_string();
    let date_short = options.timestamp.format("%y%m%d").to_string();
    let time = options.timestamp.format("%H%M").to_string();
    let control = format!("{:09}", options.control_number);
    let group_control = options.control_number.to_string();

    let mut writer = SegmentWriter::new();
    writer.raw_segment(
        "ISA",
        &[
            "00",
            "          ",
            "00",
            "          ",
            "ZZ",
            &pad15(&options.sender_id),
            "ZZ",
            &pad15(&options.receiver_id),
            &date_short,
            &time,
            "^",
            "00501",
            &control,
            "0",
            "P",
            ":",
        ],
    );
    writer.segment(
        "GS",
        &[
            functional_id,
            &options.sender_id,
            &options.receiver_id,
            &date_long,
            &time,
            &group_control,
            "X",
            version,
        ],
    );
    writer.segment("ST", &[transaction_set, "0001", version]);

    // SE01 counts ST through SE inclusive.
    let body_text = &body.out;
    let se_count = (body.segment_count() + 2).to_string();
    let mut out = writer.finish();
    out.push_str(body_text);

    let mut trailer = SegmentWriter::new();
    trailer.segment("SE", &[&se_count, "0001"]);
    trailer.segment("GE", &["1", &group_control]);
    trailer.segment("IEA", &["1", &control]);
    out.push_str(&trailer.finish());
    out
}

/// Validates the envelope structure and returns the interchange
/// identifiers plus the ST..SE body.
pub fn open_envelope(raw: &str, expected_set: &'static str) -> Result<Interchange, X12Error> {
    let segments = parse_segments(raw)?;

    let isa = segments
        .first()
        .filter(|s| s.id == "ISA")
        .ok_or_else(|| X12Error::Parse("interchange must start with ISA".to_string()))?;
    if isa.elements.len() != 16 {
        return Err(X12Error::Parse(format!(
            "ISA must carry 16 elements, found {}",
            isa.elements.len()
        )));
    }
    let control_number = isa.required(13)?.to_string();
    let sender_id = isa.required(6)?.trim().to_string();
    let receiver_id = isa.required(8)?.trim().to_string();

    let last = segments
        .last()
        .ok_or_else(|| X12Error::Parse("payload contains no segments".to_string()))?;
    if last.id != "IEA" {
        return Err(X12Error::Parse(format!(
            "interchange must end with IEA, found {}",
            last.id
        )));
    }

    let st_index = segments
        .iter()
        .position(|s| s.id == "ST")
        .ok_or_else(|| X12Error::Parse("missing ST transaction set header".to_string()))?;
    let se_index = segments
        .iter()
        .position(|s| s.id == "SE")
        .ok_or_else(|| X12Error::Parse("missing SE transaction set trailer".to_string()))?;
    if se_index <= st_index {
        return Err(X12Error::Parse("SE trailer precedes ST header".to_string()));
    }

    let transaction_set = segments[st_index].required(1)?.to_string();
    if transaction_set != expected_set {
        return Err(X12Error::UnexpectedTransactionSet {
            expected: expected_set,
            found: transaction_set,
        });
    }

    Ok(Interchange {
        control_number,
        sender_id,
        receiver_id,
        transaction_set,
        body: segments[st_index + 1..se_index].to_vec(),
    })
}

fn pad15(id: &str) -> String {
    format!("{:<15.15}", id)
}

/// Formats a cent amount as the decimal-dollar string X12 monetary
/// elements carry.
pub fn format_amount(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.abs();
    format!("{}{}.{:02}", sign, cents / 100, cents % 100)
}

pub fn parse_amount(raw: &str) -> Result<i64, X12Error> {
    let negative = raw.starts_with('-');
    let unsigned = raw.trim_start_matches('-');
    let (dollars, cents) = match unsigned.split_once('.') {
        Some((d, c)) => (d, c),
        None => (unsigned, "0"),
    };
    let dollars: i64 = dollars
        .parse()
        .map_err(|_| X12Error::Parse(format!("invalid monetary amount: {}", raw)))?;
    let cents_str = format!("{:0<2.2}", cents);
    let cents: i64 = cents_str
        .parse()
        .map_err(|_| X12Error::Parse(format!("invalid monetary amount: {}", raw)))?;
    let total = dollars
        .checked_mul(100)
        .and_then(|d| d.checked_add(cents))
        .ok_or_else(|| X12Error::Parse(format!("monetary amount out of range: {}", raw)))?;
    Ok(if negative { -total } else { total })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_empty_elements_are_trimmed() {
        let mut writer = SegmentWriter::new();
        writer.segment("NM1", &["IL", "1", "DOE", "JANE", "", "", "", "MI", "M123", ""]);
        assert_eq!(writer.finish(), "NM1*IL*1*DOE*JANE****MI*M123~");
    }

    #[test]
    fn amount_round_trip() {
        for cents in [0, 5, 100, 12345, 9_999_999] {
            assert_eq!(parse_amount(&format_amount(cents)).unwrap(), cents);
        }
        assert_eq!(parse_amount("100").unwrap(), 10000);
        assert_eq!(parse_amount("50.5").unwrap(), 5050);
    }

    #[test]
    fn oversized_amount_is_a_parse_error() {
        assert!(matches!(
            parse_amount("9223372036854775807"),
            Err(X12Error::Parse(_))
        ));
        assert!(matches!(
            parse_amount("-9223372036854775807"),
            Err(X12Error::Parse(_))
        ));
    }

    #[test]
    fn rejects_empty_payload() {
        assert!(parse_segments("   \n ").is_err());
    }
}
