//! Recognises `block/rm` refusals caused by a pin.
//!
//! The node offers no structured signal for this: the only evidence is the
//! error text, e.g. `pinned via QmParent` or `pinned by QmXYZ directly`. A
//! refusal is recognised by its `pinned` prefix and the blocking pin is the
//! third space-separated token. Both rules track the node's wording, so any
//! change to that message breaks here and nowhere else.

/// Prefix of a `block/rm` error caused by a pin.
pub const PINNED_PREFIX: &str = "pinned";

const PIN_TOKEN_INDEX: usize = 2;

/// What a `block/rm` error text says about pins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinConflict {
    /// Not a pin refusal.
    None,
    /// A pin refusal naming the pin to remove.
    Pinned(String),
    /// A pin refusal whose text has no identifier where one is expected.
    Unparsable,
}

/// Classifies the error text returned by `block/rm`.
pub fn parse_conflict(message: &str) -> PinConflict {
    if !message.starts_with(PINNED_PREFIX) {
        return PinConflict::None;
    }
    match message.split(' ').nth(PIN_TOKEN_INDEX) {
        Some(token) if !token.is_empty() => PinConflict::Pinned(token.to_string()),
        _ => PinConflict::Unparsable,
    }
}
