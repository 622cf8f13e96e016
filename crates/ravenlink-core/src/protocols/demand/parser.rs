use roxmltree::{Document, Node};
use tracing::warn;

use super::decoder::{Measurement, decode_measurement};
use super::error::{FieldError, FragmentError};
use super::layout::Field;
use super::reader::{TagKind, classify_tag, strip_hex_prefix, wrap_fragment};

/// Result of parsing one fragment.
///
/// `measurements` holds every decodable envelope in document order; it is
/// empty whenever `failure` is set. Blocks with malformed fields are
/// counted, not returned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FragmentOutcome {
    pub measurements: Vec<Measurement>,
    pub malformed_blocks: usize,
    pub failure: Option<FragmentError>,
}

impl FragmentOutcome {
    pub fn failed(failure: FragmentError) -> Self {
        Self {
            failure: Some(failure),
            ..Self::default()
        }
    }
}

/// Extract every `InstantaneousDemand` block from a fragment.
///
/// The fragment may hold any number of top-level elements; it is wrapped
/// under a synthetic root before parsing. Markup that is not well formed
/// discards the whole fragment.
pub fn parse_fragment(text: &str) -> FragmentOutcome {
    let wrapped = wrap_fragment(text);
    let document = match Document::parse(&wrapped) {
        Ok(document) => document,
        Err(err) => {
            let failure = FragmentError::from(err);
            warn!(error = %failure, bytes = text.len(), "discarding demand fragment");
            return FragmentOutcome::failed(failure);
        }
    };

    let mut state = ParseState::default();
    for node in document.root_element().descendants() {
        if node.is_element() && classify_tag(node.tag_name().name()) == TagKind::Envelope {
            state.read_envelope(node);
        }
    }

    FragmentOutcome {
        measurements: state.measurements,
        malformed_blocks: state.malformed_blocks,
        failure: None,
    }
}

#[derive(Debug, Default)]
struct FieldBuffers {
    timestamp: String,
    demand: String,
    multiplier: String,
    divisor: String,
}

impl FieldBuffers {
    fn slot(&mut self, field: Field) -> &mut String {
        match field {
            Field::Timestamp => &mut self.timestamp,
            Field::Demand => &mut self.demand,
            Field::Multiplier => &mut self.multiplier,
            Field::Divisor => &mut self.divisor,
        }
    }

    fn clear(&mut self) {
        for field in Field::ALL {
            self.slot(field).clear();
        }
    }

    fn decode(&self) -> Result<Measurement, FieldError> {
        decode_measurement(
            strip_hex_prefix(&self.timestamp),
            strip_hex_prefix(&self.demand),
            strip_hex_prefix(&self.multiplier),
            strip_hex_prefix(&self.divisor),
        )
    }
}

#[derive(Debug, Default)]
struct ParseState {
    fields: FieldBuffers,
    measurements: Vec<Measurement>,
    malformed_blocks: usize,
}

impl ParseState {
    /// Collect the four fields of one envelope and decode them.
    ///
    /// A repeated field keeps its last value.
    fn read_envelope(&mut self, envelope: Node<'_, '_>) {
        self.fields.clear();
        for node in envelope.descendants().filter(Node::is_element) {
            if let TagKind::Field(field) = classify_tag(node.tag_name().name()) {
                let slot = self.fields.slot(field);
                slot.clear();
                node.descendants()
                    .filter(Node::is_text)
                    .filter_map(|text| text.text())
                    .for_each(|text| slot.push_str(text));
            }
        }

        match self.fields.decode() {
            Ok(measurement) => self.measurements.push(measurement),
            Err(err) => {
                self.malformed_blocks += 1;
                warn!(error = %err, "dropping demand block");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::parse_fragment;
    use crate::protocols::demand::error::FragmentError;

    fn block(ts: &str, demand: &str, mult: &str, div: &str) -> String {
        format!(
            "<InstantaneousDemand><TimeStamp>{ts}</TimeStamp><Demand>{demand}</Demand>\
             <Multiplier>{mult}</Multiplier><Divisor>{div}</Divisor></InstantaneousDemand>"
        )
    }

    #[test]
    fn parse_single_block() {
        let outcome = parse_fragment(&block("0x00000001", "0x000001", "0x01", "0x01"));
        assert!(outcome.failure.is_none());
        assert_eq!(outcome.measurements.len(), 1);
        assert_eq!(outcome.measurements[0].raw_timestamp(), 1);
        assert_eq!(outcome.measurements[0].magnitude(), 1.0);
    }

    #[test]
    fn parse_two_blocks_in_document_order() {
        let text = format!(
            "{}\n{}",
            block("0x0000000a", "0x0004d2", "0x01", "0x03e8"),
            block("0x0000000b", "0x000064", "0x02", "0x0a"),
        );
        let outcome = parse_fragment(&text);
        let stamps: Vec<u64> = outcome
            .measurements
            .iter()
            .map(|m| m.raw_timestamp())
            .collect();
        assert_eq!(stamps, vec![10, 11]);
        assert!((outcome.measurements[0].magnitude() - 1.234).abs() < 1e-12);
        assert!((outcome.measurements[1].magnitude() - 20.0).abs() < 1e-12);
    }

    #[test]
    fn tags_are_case_insensitive_and_unordered() {
        let text = "<instantaneousdemand><DIVISOR>0x03e8</DIVISOR><multiplier>0x01</multiplier>\
                    <demand>0x0001f4</demand><timestamp>0x1c3b2a10</timestamp></instantaneousdemand>";
        let outcome = parse_fragment(text);
        assert_eq!(outcome.measurements.len(), 1);
        assert_eq!(outcome.measurements[0].raw_timestamp(), 0x1c3b_2a10);
        assert!((outcome.measurements[0].magnitude() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn ignores_unrelated_messages_and_tags() {
        let text = format!(
            "<ConnectionStatus><DeviceMacId>0xd8d5b9000000abcd</DeviceMacId>\
             <Status>Connected</Status></ConnectionStatus>\
             <InstantaneousDemand><DeviceMacId>0x00</DeviceMacId>{}</InstantaneousDemand>",
            "<TimeStamp>0x00000002</TimeStamp><Demand>0x000010</Demand>\
             <Multiplier>0x01</Multiplier><Divisor>0x01</Divisor>"
        );
        let outcome = parse_fragment(&text);
        assert!(outcome.failure.is_none());
        assert_eq!(outcome.measurements.len(), 1);
        assert_eq!(outcome.measurements[0].magnitude(), 16.0);
    }

    #[test]
    fn rootless_empty_elements_yield_nothing() {
        let outcome = parse_fragment("<a/><b/><c/>");
        assert!(outcome.measurements.is_empty());
        assert!(outcome.failure.is_none());
        assert_eq!(parse_fragment(""), Default::default());
    }

    #[test]
    fn unterminated_block_discards_the_fragment() {
        let text = format!(
            "{}<InstantaneousDemand><TimeStamp>0x02</TimeStamp><Demand>0x",
            block("0x01", "0x01", "0x01", "0x01")
        );
        let outcome = parse_fragment(&text);
        assert!(outcome.measurements.is_empty());
        assert!(matches!(outcome.failure, Some(FragmentError::Markup(_))));
    }

    #[test]
    fn mismatched_end_tag_discards_earlier_blocks_too() {
        let text = format!(
            "{}<InstantaneousDemand><Demand>0x01</Divisor></InstantaneousDemand>{}",
            block("0x01", "0x01", "0x01", "0x01"),
            block("0x02", "0x02", "0x01", "0x01"),
        );
        let outcome = parse_fragment(&text);
        assert!(outcome.measurements.is_empty());
        assert_eq!(outcome.malformed_blocks, 0);
        assert!(matches!(outcome.failure, Some(FragmentError::Markup(_))));
    }

    #[test]
    fn stray_end_tag_fails() {
        let outcome = parse_fragment("</InstantaneousDemand>");
        assert!(matches!(outcome.failure, Some(FragmentError::Markup(_))));
    }

    #[test]
    fn cdata_entities_and_comments_are_read_as_text() {
        let text = "<InstantaneousDemand><!-- stamp --><TimeStamp>0x0<!-- x -->3</TimeStamp>\
                    <Demand><![CDATA[0x04D2]]></Demand><Multiplier>&#x30;x01</Multiplier>\
                    <Divisor>0x03e8</Divisor></InstantaneousDemand>";
        let outcome = parse_fragment(text);
        assert!(outcome.failure.is_none());
        assert_eq!(outcome.measurements.len(), 1);
        assert_eq!(outcome.measurements[0].raw_timestamp(), 3);
        assert!((outcome.measurements[0].magnitude() - 1.234).abs() < 1e-12);
    }

    #[test]
    fn repeated_field_keeps_last_value() {
        let text = "<InstantaneousDemand><Demand>0x01</Demand><TimeStamp>0x01</TimeStamp>\
                    <Demand>0x07</Demand><Multiplier>0x01</Multiplier><Divisor>0x01</Divisor>\
                    </InstantaneousDemand>";
        let outcome = parse_fragment(text);
        assert_eq!(outcome.measurements[0].magnitude(), 7.0);
    }

    #[test]
    #[traced_test]
    fn malformed_block_is_dropped_and_parsing_continues() {
        let text = format!(
            "{}{}",
            block("0x01", "0xZZ", "0x01", "0x01"),
            block("0x02", "0x05", "0x01", "0x01"),
        );
        let outcome = parse_fragment(&text);
        assert_eq!(outcome.malformed_blocks, 1);
        assert!(outcome.failure.is_none());
        assert_eq!(outcome.measurements.len(), 1);
        assert_eq!(outcome.measurements[0].raw_timestamp(), 2);
        assert!(logs_contain("dropping demand block"));
    }

    #[test]
    fn missing_field_counts_as_malformed() {
        let text = "<InstantaneousDemand><TimeStamp>0x01</TimeStamp></InstantaneousDemand>";
        let outcome = parse_fragment(text);
        assert!(outcome.measurements.is_empty());
        assert_eq!(outcome.malformed_blocks, 1);
    }

    #[test]
    fn fields_reset_between_blocks() {
        let text = format!(
            "{}<InstantaneousDemand><TimeStamp>0x02</TimeStamp></InstantaneousDemand>",
            block("0x01", "0x01", "0x01", "0x01")
        );
        let outcome = parse_fragment(&text);
        assert_eq!(outcome.measurements.len(), 1);
        assert_eq!(outcome.malformed_blocks, 1);
    }

    #[test]
    #[traced_test]
    fn markup_failure_is_logged() {
        let outcome = parse_fragment("<InstantaneousDemand>&nope;</InstantaneousDemand>");
        assert!(matches!(outcome.failure, Some(FragmentError::Markup(_))));
        assert!(logs_contain("discarding demand fragment"));
    }
}
