//! RAVEn instantaneous-demand decoding.
//!
//! The device streams XML-like messages over serial. Only
//! `InstantaneousDemand` blocks are decoded; every other message, tag and
//! stray text is ignored. Tag names are matched case-insensitively, and
//! each field value has its two-character `0x` prefix stripped before the
//! remaining hex digits are decoded.
//!
//! Batches concatenate arbitrary serial reads, so a fragment need not have a
//! single root element. It is wrapped under a synthetic root and parsed with
//! `roxmltree`; only field text is read from the resulting tree. A markup
//! error discards the whole fragment.
//!
//! Version française (résumé):
//! Le module décode les blocs `InstantaneousDemand` (horodatage, demande,
//! multiplicateur, diviseur en hexadécimal préfixé `0x`). Les balises sont
//! insensibles à la casse ; une erreur de balisage rejette le fragment
//! entier.

pub mod decoder;
pub mod error;
pub mod layout;
pub mod parser;
pub mod reader;

pub use decoder::{Measurement, decode_measurement};
pub use error::{FieldError, FragmentError};
pub use layout::{EPOCH_OFFSET_SECONDS, Field};
pub use parser::{FragmentOutcome, parse_fragment};
