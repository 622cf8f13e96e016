use super::error::FieldError;
use super::layout::{self, Field};

/// Classification of a tag name against the instantaneous-demand vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Envelope,
    Field(Field),
    Other,
}

/// Wrap a batch of concatenated messages under a synthetic root so the XML
/// parser accepts any number of top-level elements.
pub fn wrap_fragment(text: &str) -> String {
    let root = layout::FRAGMENT_ROOT_TAG;
    format!("<{root}>{text}</{root}>")
}

/// Classify a tag name, ignoring ASCII case.
pub fn classify_tag(name: &str) -> TagKind {
    if name.eq_ignore_ascii_case(layout::ENVELOPE_TAG) {
        return TagKind::Envelope;
    }
    Field::ALL
        .into_iter()
        .find(|field| name.eq_ignore_ascii_case(field.tag()))
        .map_or(TagKind::Other, TagKind::Field)
}

/// Drop the device's two-character hex prefix without inspecting it.
///
/// Values shorter than the prefix become empty.
pub fn strip_hex_prefix(raw: &str) -> &str {
    match raw.char_indices().nth(layout::HEX_PREFIX_LEN) {
        Some((idx, _)) => &raw[idx..],
        None => "",
    }
}

/// Parse unprefixed hexadecimal digits as an unsigned integer.
///
/// # Errors
/// Returns `FieldError::MalformedField` when `raw` is empty, contains a
/// non-hex character, or does not fit in 64 bits.
pub fn parse_hex(field: Field, raw: &str) -> Result<u64, FieldError> {
    let malformed = || FieldError::MalformedField {
        field,
        value: raw.to_string(),
    };
    if !is_hex_digits(raw) {
        return Err(malformed());
    }
    u64::from_str_radix(raw, layout::HEX_RADIX).map_err(|_| malformed())
}

fn is_hex_digits(raw: &str) -> bool {
    !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_hexdigit())
}
