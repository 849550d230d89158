//! Reversible, query-parameter-safe tokens carrying one participant's draw.
//!
//! A token is the compact JSON form of a [`PayloadRecord`], character-reversed,
//! Base64-encoded and percent-encoded. The layering only keeps the receiver's name
//! out of plain sight; anyone holding a token can read it.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bytes left alone by browser `encodeURIComponent`; everything else is escaped.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Standard alphabet that also accepts tokens whose `=` padding was dropped in transit.
const LENIENT_STANDARD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// What one participant sees when opening their link.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PayloadRecord {
    #[serde(rename = "t")]
    pub title: String,
    #[serde(rename = "d")]
    pub description: String,
    #[serde(rename = "g")]
    pub giver: String,
    #[serde(rename = "r")]
    pub receiver: String,
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("token is not valid percent-encoded UTF-8")]
    PercentEncoding(#[source] std::str::Utf8Error),
    #[error("token is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("decoded token is not UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("token does not hold a valid record: {0}")]
    Payload(#[from] serde_json::Error),
}

pub fn encode(record: &PayloadRecord) -> Result<String, CodecError> {
    let json = serde_json::to_string(record)?;
    let reversed: String = json.chars().rev().collect();
    let b64 = STANDARD.encode(reversed.as_bytes());
    Ok(utf8_percent_encode(&b64, URI_COMPONENT).to_string())
}

/// Inverse of [`encode`]. Takes the query value verbatim. A token that went through
/// one extra round of URL decoding still decodes: Base64 text has no `%`, and a `+`
/// that form decoding turned into a space is turned back.
pub fn decode(token: &str) -> Result<PayloadRecord, CodecError> {
    let b64 = percent_decode_str(token)
        .decode_utf8()
        .map_err(CodecError::PercentEncoding)?
        .replace(' ', "+");
    let bytes = LENIENT_STANDARD.decode(b64.as_bytes())?;
    let reversed = String::from_utf8(bytes)?;
    let json: String = reversed.chars().rev().collect();
    Ok(serde_json::from_str(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record(title: &str, description: &str, giver: &str, receiver: &str) -> PayloadRecord {
        PayloadRecord {
            title: title.to_string(),
            description: description.to_string(),
            giver: giver.to_string(),
            receiver: receiver.to_string(),
        }
    }

    fn token_for_json(json: &str) -> String {
        let reversed: String = json.chars().rev().collect();
        utf8_percent_encode(&STANDARD.encode(reversed), URI_COMPONENT).to_string()
    }

    #[test]
    fn xmas_record_round_trips() {
        let original = record("XMAS", "", "ALICE", "BOB");
        let token = encode(&original).unwrap();
        assert_eq!(decode(&token).unwrap(), original);
    }

    #[test]
    fn token_matches_existing_link_format() {
        let token = encode(&record("XMAS", "", "ALICE", "BOB")).unwrap();

        let json = r#"{"t":"XMAS","d":"","g":"ALICE","r":"BOB"}"#;
        let reversed: String = json.chars().rev().collect();
        let expected = STANDARD
            .encode(reversed)
            .replace('+', "%2B")
            .replace('/', "%2F")
            .replace('=', "%3D");
        assert_eq!(token, expected);
    }

    #[test]
    fn token_is_query_safe() {
        // Long enough to produce '+', '/' and padding in the base64 form.
        let original = record("Büro ~ Wichteln?", "Budget: 20€ & <3", "Zoë", "Ünal/Ørsted");
        let token = encode(&original).unwrap();

        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_.!~*'()%".contains(c)));
        assert_eq!(decode(&token).unwrap(), original);
    }

    #[test]
    fn already_unescaped_token_still_decodes() {
        let original = record("Office party", "Bring snacks", "DANA", "EVE");
        let token = encode(&original).unwrap();
        let unescaped = percent_decode_str(&token).decode_utf8().unwrap();

        assert_eq!(decode(&unescaped).unwrap(), original);
    }

    /// Unescaped form of a token whose Base64 text contains a `+`.
    fn unescaped_token_with_plus() -> (PayloadRecord, String) {
        (0..500)
            .map(|i| record("Wichteln", &format!("gift {i}"), "DANA", "EVE"))
            .find_map(|original| {
                let token = encode(&original).unwrap();
                let unescaped = percent_decode_str(&token).decode_utf8().unwrap().into_owned();
                unescaped.contains('+').then_some((original, unescaped))
            })
            .unwrap()
    }

    #[test]
    fn form_decoded_token_still_decodes() {
        let (original, unescaped) = unescaped_token_with_plus();
        let form_decoded = unescaped.replace('+', " ");

        assert_eq!(decode(&form_decoded).unwrap(), original);
    }

    #[test]
    fn token_without_padding_decodes() {
        let original = record("X", "", "A", "B");
        let token = encode(&original).unwrap();
        let trimmed = token.trim_end_matches("%3D");

        assert_eq!(decode(trimmed).unwrap(), original);
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(decode("not-a-token!!").is_err());
        assert!(decode("").is_err());
        assert!(decode("%").is_err());
        assert!(decode("%FF%FE").is_err());
    }

    #[test]
    fn truncated_token_is_malformed() {
        let token = encode(&record("XMAS", "", "ALICE", "BOB")).unwrap();
        let truncated = &token[..token.len() / 2];
        assert!(decode(truncated).is_err());
    }

    #[test]
    fn missing_field_is_malformed() {
        let token = token_for_json(r#"{"t":"XMAS","d":"","g":"ALICE"}"#);
        assert!(matches!(decode(&token), Err(CodecError::Payload(_))));
    }

    #[test]
    fn non_string_field_is_malformed() {
        let token = token_for_json(r#"{"t":"XMAS","d":"","g":"ALICE","r":7}"#);
        assert!(matches!(decode(&token), Err(CodecError::Payload(_))));
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let token = token_for_json(r#"{"t":"XMAS","d":"","g":"ALICE","r":"BOB","v":2}"#);
        assert_eq!(decode(&token).unwrap(), record("XMAS", "", "ALICE", "BOB"));
    }

    proptest! {
        #[test]
        fn any_record_round_trips(
            title in any::<String>(),
            description in any::<String>(),
            giver in any::<String>(),
            receiver in any::<String>(),
        ) {
            let original = PayloadRecord { title, description, giver, receiver };
            let token = encode(&original).unwrap();
            prop_assert_eq!(decode(&token).unwrap(), original);
        }

        #[test]
        fn arbitrary_input_never_panics(input in any::<String>()) {
            let _ = decode(&input);
        }
    }
}
