// slip.rs
// Payment slip handling: image validation, QR payload decoding, OCR text
// extraction and merging of two extraction results.

use std::sync::LazyLock;

use base64::{Engine, engine::general_purpose::STANDARD};
use regex::Regex;
use thiserror::Error;

use crate::models::{OcrData, QrData};

pub const MAX_SLIP_BYTES: usize = 5 * 1024 * 1024;

pub const ALLOWED_CONTENT_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/webp"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlipError {
    #[error("ไม่พบข้อมูลรูปภาพสลิป")]
    Empty,
    #[error("ข้อมูลรูปภาพไม่ใช่ base64 ที่ถูกต้อง")]
    InvalidBase64,
    #[error("ประเภทไฟล์ไม่รองรับ ({0}) รองรับเฉพาะ JPEG, PNG, GIF และ WEBP")]
    UnsupportedType(String),
    #[error("ประเภทไฟล์ไม่ตรงกับเนื้อหารูปภาพ")]
    TypeMismatch,
    #[error("ไฟล์สลิปมีขนาดเกิน 5MB")]
    TooLarge,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QrError {
    #[error("QR payload is not ASCII")]
    NotAscii,
    #[error("malformed TLV at offset {0}")]
    Malformed(usize),
}

/// A validated, decoded slip image.
#[derive(Debug, Clone)]
pub struct DecodedSlip {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
}

impl DecodedSlip {
    pub fn extension(&self) -> &'static str {
        match self.content_type {
            "image/jpeg" => "jpg",
            "image/png" => "png",
            "image/gif" => "gif",
            _ => "webp",
        }
    }
}

/// Accepts `data:<type>;base64,<data>` or bare base64. A declared type must be
/// allow-listed and agree with the image's magic bytes.
pub fn decode_slip_image(input: &str) -> Result<DecodedSlip, SlipError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(SlipError::Empty);
    }

    let (declared, payload) = match input.strip_prefix("data:") {
        Some(rest) => {
            let (header, data) = rest.split_once(',').ok_or(SlipError::InvalidBase64)?;
            let mut parts = header.split(';');
            let mime = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
            if !parts.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
                return Err(SlipError::InvalidBase64);
            }
            (Some(normalize_mime(&mime)), data)
        }
        None => (None, input),
    };

    if let Some(mime) = &declared {
        if !ALLOWED_CONTENT_TYPES.contains(&mime.as_str()) {
            return Err(SlipError::UnsupportedType(mime.clone()));
        }
    }

    // Reject obviously oversize payloads before allocating the decoded buffer.
    if payload.len() / 4 * 3 > MAX_SLIP_BYTES + 3 {
        return Err(SlipError::TooLarge);
    }

    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|_| SlipError::InvalidBase64)?;
    if bytes.is_empty() {
        return Err(SlipError::Empty);
    }
    if bytes.len() > MAX_SLIP_BYTES {
        return Err(SlipError::TooLarge);
    }

    let sniffed = sniff_image_type(&bytes);
    let content_type = match (declared, sniffed) {
        (Some(mime), Some(actual)) if mime == actual => actual,
        (Some(_), _) => return Err(SlipError::TypeMismatch),
        (None, Some(actual)) => actual,
        (None, None) => return Err(SlipError::UnsupportedType("unknown".into())),
    };

    Ok(DecodedSlip {
        bytes,
        content_type,
    })
}

fn normalize_mime(mime: &str) -> String {
    match mime {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        other => other.to_string(),
    }
}

pub fn sniff_image_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some("image/png")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

/// Splits an EMVCo-style `IDLLVALUE` sequence into (id, value) pairs.
pub fn parse_tlv(payload: &str) -> Result<Vec<(String, String)>, QrError> {
    if !payload.is_ascii() {
        return Err(QrError::NotAscii);
    }
    let mut fields = Vec::new();
    let mut pos = 0;
    while pos < payload.len() {
        let header = payload
            .get(pos..pos + 4)
            .ok_or(QrError::Malformed(pos))?;
        let len: usize = header[2..4].parse().map_err(|_| QrError::Malformed(pos))?;
        let value = payload
            .get(pos + 4..pos + 4 + len)
            .ok_or(QrError::Malformed(pos))?;
        fields.push((header[0..2].to_string(), value.to_string()));
        pos += 4 + len;
    }
    Ok(fields)
}

/// CRC-16/CCITT-FALSE as used by EMVCo QR payloads.
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for byte in data {
        crc ^= (*byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Decodes the mini-QR printed on Thai bank transfer slips.
///
/// Layout: tag `00` nests `00` API id, `01` sending bank code and `02` the
/// transaction reference; `51` carries the country code and `91` a CRC over
/// everything up to and including its own `9104` header.
pub fn parse_slip_qr(payload: &str) -> Result<QrData, QrError> {
    let payload = payload.trim();
    let mut data = QrData {
        raw: payload.to_string(),
        ..QrData::default()
    };

    for (tag, value) in parse_tlv(payload)? {
        match tag.as_str() {
            "00" => {
                for (sub, sub_value) in parse_tlv(&value)? {
                    match sub.as_str() {
                        "00" => data.api_id = Some(sub_value),
                        "01" => data.sending_bank = Some(sub_value),
                        "02" => data.trans_ref = Some(sub_value),
                        _ => {}
                    }
                }
            }
            "51" => data.country_code = Some(value),
            "91" => {
                if let Some(idx) = payload.rfind("9104") {
                    let expected = crc16_ccitt(payload[..idx + 4].as_bytes());
                    data.crc_valid = format!("{expected:04X}").eq_ignore_ascii_case(&value);
                }
            }
            _ => {}
        }
    }

    Ok(data)
}

static AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:จำนวนเงิน|จำนวน|amount)\s*[:：]?\s*([0-9][0-9,]*\.[0-9]{2})")
        .expect("amount regex")
});
static FEE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:ค่าธรรมเนียม|fee)\s*[:：]?\s*([0-9][0-9,]*\.[0-9]{2})").expect("fee regex")
});
static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"([0-9]{1,2}\s*(?:ม\.ค\.|ก\.พ\.|มี\.ค\.|เม\.ย\.|พ\.ค\.|มิ\.ย\.|ก\.ค\.|ส\.ค\.|ก\.ย\.|ต\.ค\.|พ\.ย\.|ธ\.ค\.)\s*[0-9]{2,4}|[0-9]{1,2}/[0-9]{1,2}/[0-9]{2,4})",
    )
    .expect("date regex")
});
static TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]{1,2}:[0-9]{2}(?::[0-9]{2})?)").expect("time regex"));
static ACCOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([xX0-9]{3}-[xX0-9]-[xX0-9]{4,5}-[xX0-9])").expect("account regex")
});
static REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:รหัสอ้างอิง|ref(?:erence)?(?:\s*no\.?)?)\s*[:：]?\s*([A-Za-z0-9]{6,})")
        .expect("reference regex")
});
static TRANSACTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:เลขที่รายการ|transaction\s*(?:no\.?|id))\s*[:：]?\s*([A-Za-z0-9]{6,})")
        .expect("transaction regex")
});

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

fn money(raw: Option<String>) -> Option<f64> {
    raw.and_then(|s| s.replace(',', "").parse().ok())
}

/// Pulls transaction fields out of OCR text of a transfer slip.
pub fn parse_slip_text(text: &str) -> OcrData {
    let mut accounts = ACCOUNT_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()));

    OcrData {
        amount: money(capture(&AMOUNT_RE, text)),
        fee: money(capture(&FEE_RE, text)),
        date: capture(&DATE_RE, text),
        time: capture(&TIME_RE, text),
        from_account: accounts.next(),
        to_account: accounts.next(),
        reference: capture(&REFERENCE_RE, text),
        transaction_no: capture(&TRANSACTION_RE, text),
    }
}

/// Field-level merge: every field of `primary` wins when present, otherwise
/// the `secondary` value is used.
pub fn merge_extraction(primary: Option<OcrData>, secondary: Option<OcrData>) -> Option<OcrData> {
    match (primary, secondary) {
        (None, None) => None,
        (Some(p), None) => Some(p),
        (None, Some(s)) => Some(s),
        (Some(p), Some(s)) => Some(OcrData {
            amount: p.amount.or(s.amount),
            fee: p.fee.or(s.fee),
            date: p.date.or(s.date),
            time: p.time.or(s.time),
            from_account: p.from_account.or(s.from_account),
            to_account: p.to_account.or(s.to_account),
            reference: p.reference.or(s.reference),
            transaction_no: p.transaction_no.or(s.transaction_no),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    fn png_base64() -> String {
        let mut bytes = PNG_HEADER.to_vec();
        bytes.extend_from_slice(&[0u8; 32]);
        STANDARD.encode(bytes)
    }

    #[test]
    fn decodes_data_url_with_matching_type() {
        let slip = decode_slip_image(&format!("data:image/png;base64,{}", png_base64())).unwrap();
        assert_eq!(slip.content_type, "image/png");
        assert_eq!(slip.extension(), "png");
        assert_eq!(slip.bytes.len(), 40);
    }

    #[test]
    fn bare_base64_is_sniffed() {
        let jpeg = STANDARD.encode([0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10]);
        assert_eq!(decode_slip_image(&jpeg).unwrap().content_type, "image/jpeg");
    }

    #[test]
    fn jpg_alias_is_accepted() {
        let jpeg = STANDARD.encode([0xFF, 0xD8, 0xFF, 0xE0]);
        let slip = decode_slip_image(&format!("data:image/jpg;base64,{jpeg}")).unwrap();
        assert_eq!(slip.content_type, "image/jpeg");
    }

    #[test]
    fn rejects_types_outside_allow_list() {
        let err = decode_slip_image(&format!("data:application/pdf;base64,{}", png_base64()));
        assert_eq!(
            err.unwrap_err(),
            SlipError::UnsupportedType("application/pdf".into())
        );
    }

    #[test]
    fn rejects_declared_type_that_disagrees_with_content() {
        let err = decode_slip_image(&format!("data:image/gif;base64,{}", png_base64()));
        assert_eq!(err.unwrap_err(), SlipError::TypeMismatch);
    }

    #[test]
    fn rejects_oversize_and_garbage() {
        let mut big = PNG_HEADER.to_vec();
        big.resize(MAX_SLIP_BYTES + 1, 0);
        assert_eq!(
            decode_slip_image(&STANDARD.encode(&big)).unwrap_err(),
            SlipError::TooLarge
        );
        assert_eq!(
            decode_slip_image("data:image/png;base64,@@@").unwrap_err(),
            SlipError::InvalidBase64
        );
        assert_eq!(decode_slip_image("   ").unwrap_err(), SlipError::Empty);
    }

    fn tlv(id: &str, value: &str) -> String {
        format!("{id}{:02}{value}", value.len())
    }

    fn with_crc(body: &str) -> String {
        let unsigned = format!("{body}9104");
        format!("{unsigned}{:04X}", crc16_ccitt(unsigned.as_bytes()))
    }

    fn sample_payload() -> String {
        let inner = [
            tlv("00", "000001"),
            tlv("01", "004"),
            tlv("02", "0014242082547BPM04988"),
        ]
        .concat();
        with_crc(&format!("{}{}", tlv("00", &inner), tlv("51", "TH")))
    }

    #[test]
    fn crc_matches_reference_vector() {
        assert_eq!(crc16_ccitt(b"123456789"), 0x29B1);
    }

    #[test]
    fn parses_slip_qr_payload() {
        let qr = parse_slip_qr(&sample_payload()).unwrap();
        assert_eq!(qr.api_id.as_deref(), Some("000001"));
        assert_eq!(qr.sending_bank.as_deref(), Some("004"));
        assert_eq!(qr.trans_ref.as_deref(), Some("0014242082547BPM04988"));
        assert_eq!(qr.country_code.as_deref(), Some("TH"));
        assert!(qr.crc_valid);
    }

    #[test]
    fn tampered_qr_fails_crc() {
        let payload = sample_payload().replacen("BPM", "BPX", 1);
        let qr = parse_slip_qr(&payload).unwrap();
        assert_eq!(qr.trans_ref.as_deref(), Some("0014242082547BPX04988"));
        assert!(!qr.crc_valid);
    }

    #[test]
    fn truncated_tlv_is_malformed() {
        assert_eq!(parse_tlv("0010abc"), Err(QrError::Malformed(0)));
        assert_eq!(parse_tlv("00"), Err(QrError::Malformed(0)));
    }

    #[test]
    fn extracts_fields_from_thai_slip_text() {
        let text = "โอนเงินสำเร็จ\n10 มี.ค. 67 14:32 น.\nนาย สมชาย\nxxx-x-x1234-x\nหอพักสุขใจ\n123-4-56789-0\nจำนวน: 3,150.00 บาท\nค่าธรรมเนียม 0.00 บาท\nรหัสอ้างอิง: 2024031014320001\nเลขที่รายการ: 0014242082547BPM04988";
        let ocr = parse_slip_text(text);
        assert_eq!(ocr.amount, Some(3150.0));
        assert_eq!(ocr.fee, Some(0.0));
        assert_eq!(ocr.date.as_deref(), Some("10 มี.ค. 67"));
        assert_eq!(ocr.time.as_deref(), Some("14:32"));
        assert_eq!(ocr.from_account.as_deref(), Some("xxx-x-x1234-x"));
        assert_eq!(ocr.to_account.as_deref(), Some("123-4-56789-0"));
        assert_eq!(ocr.reference.as_deref(), Some("2024031014320001"));
        assert_eq!(ocr.transaction_no.as_deref(), Some("0014242082547BPM04988"));
    }

    #[test]
    fn merge_prefers_primary_fields() {
        let primary = OcrData {
            amount: Some(3150.0),
            reference: None,
            ..OcrData::default()
        };
        let secondary = OcrData {
            amount: Some(3000.0),
            reference: Some("REF123456".into()),
            ..OcrData::default()
        };
        let merged = merge_extraction(Some(primary), Some(secondary)).unwrap();
        assert_eq!(merged.amount, Some(3150.0));
        assert_eq!(merged.reference.as_deref(), Some("REF123456"));
        assert!(merge_extraction(None, None).is_none());
    }
}
