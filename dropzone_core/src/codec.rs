//! The Message Codec - canonical team messages to typed events and back.
//!
//! Every report an agent sends is one line of plain text:
//!
//! ```text
//! Moving to room_3
//! Opening door of room_3
//! Searching through room_3
//! Found goal block {size: 0.5, shape: 2, colour: red} at location (4, 7)
//! Picking up goal block {size: 0.5, shape: 2, colour: red} at location (4, 7)
//! Dropped goal block {size: 0.5, shape: 2, colour: red} at drop location (12, 3)
//! Found block by bob approved
//! Trust belief of bob : 0.25
//! ```
//!
//! Keywords are matched case-insensitively; payloads keep their case. The
//! signature payload is accepted in any key order, with or without quotes, so
//! `{shape:2,colour:red,size:0.5}` and `{"size": 0.5, "shape": 2, "colour": "red"}`
//! decode to the same event. Decoding never fails: anything unrecognised is
//! [`Event::Invalid`].

use dropzone_env::{AgentId, Colour, Location, VisualSignature};
use serde::{Deserialize, Serialize};
use std::fmt;

const MOVING: &str = "moving to ";
const OPENING: &str = "opening door of ";
const SEARCHING: &str = "searching through ";
const FOUND: &str = "found goal block ";
const PICKING_UP: &str = "picking up goal block ";
const DROPPED: &str = "dropped goal block ";
const CONFIRMATION: &str = "found block by ";
const BELIEF: &str = "trust belief of ";
const AT_LOCATION: &str = "at location ";
const AT_DROP_LOCATION: &str = "at drop location ";

/// Outcome carried by a found-block confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Approved,
    Denied,
}

impl Verdict {
    fn as_str(&self) -> &'static str {
        match self {
            Verdict::Approved => "approved",
            Verdict::Denied => "denied",
        }
    }
}

/// A decoded team message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    Moving { room: String },
    Opening { room: String },
    Searching { room: String },
    Found { signature: VisualSignature, location: Location },
    PickingUp { signature: VisualSignature, location: Location },
    Dropped { signature: VisualSignature, location: Location },
    /// Indirect experience about a third party.
    FoundConfirmation { peer: AgentId, verdict: Verdict },
    /// Reputation broadcast about a third party.
    TrustBelief { peer: AgentId, value: f64 },
    /// Text that matched no known form.
    Invalid,
}

/// Message type, used to key per-peer message logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Moving,
    Opening,
    Searching,
    Found,
    PickingUp,
    Dropped,
    FoundConfirmation,
    TrustBelief,
}

impl Event {
    /// The message type, or `None` for [`Event::Invalid`].
    pub fn kind(&self) -> Option<EventKind> {
        Some(match self {
            Event::Moving { .. } => EventKind::Moving,
            Event::Opening { .. } => EventKind::Opening,
            Event::Searching { .. } => EventKind::Searching,
            Event::Found { .. } => EventKind::Found,
            Event::PickingUp { .. } => EventKind::PickingUp,
            Event::Dropped { .. } => EventKind::Dropped,
            Event::FoundConfirmation { .. } => EventKind::FoundConfirmation,
            Event::TrustBelief { .. } => EventKind::TrustBelief,
            Event::Invalid => return None,
        })
    }

    /// The third party a confirmation or belief is about.
    pub fn subject(&self) -> Option<&AgentId> {
        match self {
            Event::FoundConfirmation { peer, .. } | Event::TrustBelief { peer, .. } => Some(peer),
            _ => None,
        }
    }

    /// Returns true for [`Event::Invalid`].
    pub fn is_invalid(&self) -> bool {
        matches!(self, Event::Invalid)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Moving { room } => write!(f, "Moving to {}", room),
            Event::Opening { room } => write!(f, "Opening door of {}", room),
            Event::Searching { room } => write!(f, "Searching through {}", room),
            Event::Found { signature, location } => {
                write!(f, "Found goal block {} at location {}", signature, location)
            }
            Event::PickingUp { signature, location } => {
                write!(f, "Picking up goal block {} at location {}", signature, location)
            }
            Event::Dropped { signature, location } => {
                write!(f, "Dropped goal block {} at drop location {}", signature, location)
            }
            Event::FoundConfirmation { peer, verdict } => {
                write!(f, "Found block by {} {}", peer, verdict.as_str())
            }
            Event::TrustBelief { peer, value } => write!(f, "Trust belief of {} : {}", peer, value),
            Event::Invalid => Ok(()),
        }
    }
}

/// Renders an event in its canonical text form.
///
/// Returns `None` for [`Event::Invalid`], which has no wire form.
pub fn encode(event: &Event) -> Option<String> {
    if event.is_invalid() {
        return None;
    }
    Some(event.to_string())
}

/// Parses a message. Never fails; unknown text yields [`Event::Invalid`].
pub fn decode(text: &str) -> Event {
    try_decode(text.trim()).unwrap_or(Event::Invalid)
}

fn try_decode(text: &str) -> Option<Event> {
    if let Some(rest) = strip_keyword(text, MOVING) {
        return Some(Event::Moving { room: room_name(rest)? });
    }
    if let Some(rest) = strip_keyword(text, OPENING) {
        return Some(Event::Opening { room: room_name(rest)? });
    }
    if let Some(rest) = strip_keyword(text, SEARCHING) {
        return Some(Event::Searching { room: room_name(rest)? });
    }
    if let Some(rest) = strip_keyword(text, FOUND) {
        let (signature, location) = block_claim(rest, AT_LOCATION)?;
        return Some(Event::Found { signature, location });
    }
    if let Some(rest) = strip_keyword(text, PICKING_UP) {
        let (signature, location) = block_claim(rest, AT_LOCATION)?;
        return Some(Event::PickingUp { signature, location });
    }
    if let Some(rest) = strip_keyword(text, DROPPED) {
        let (signature, location) = block_claim(rest, AT_DROP_LOCATION)?;
        return Some(Event::Dropped { signature, location });
    }
    if let Some(rest) = strip_keyword(text, CONFIRMATION) {
        let mut words = rest.split_whitespace();
        let peer = words.next()?;
        let verdict = match words.next()?.to_ascii_lowercase().as_str() {
            "approved" => Verdict::Approved,
            "denied" => Verdict::Denied,
            _ => return None,
        };
        if words.next().is_some() {
            return None;
        }
        return Some(Event::FoundConfirmation {
            peer: AgentId::from(peer),
            verdict,
        });
    }
    if let Some(rest) = strip_keyword(text, BELIEF) {
        let (peer, value) = rest.split_once(':')?;
        let peer = room_name(peer)?;
        let value: f64 = value.trim().parse().ok()?;
        if !value.is_finite() {
            return None;
        }
        return Some(Event::TrustBelief {
            peer: AgentId::new(peer),
            value,
        });
    }
    None
}

/// Case-insensitive keyword prefix match.
fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let head = text.get(..keyword.len())?;
    if head.eq_ignore_ascii_case(keyword) {
        Some(&text[keyword.len()..])
    } else {
        None
    }
}

/// Room and agent names are a single whitespace-free token.
fn room_name(text: &str) -> Option<String> {
    let name = text.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return None;
    }
    Some(name.to_string())
}

/// `{...} at [drop ]location (x, y)`
fn block_claim(text: &str, location_keyword: &str) -> Option<(VisualSignature, Location)> {
    let text = text.trim_start();
    if !text.starts_with('{') {
        return None;
    }
    let close = text.find('}')?;
    let signature = parse_signature(&text[1..close])?;
    let tail = strip_keyword(text[close + 1..].trim_start(), location_keyword)?;
    let location = parse_location(tail)?;
    Some((signature, location))
}

fn parse_signature(body: &str) -> Option<VisualSignature> {
    let mut size = None;
    let mut shape = None;
    let mut colour = None;

    for field in body.split(',') {
        let (key, value) = field.split_once(':')?;
        let key = unquote(key).to_ascii_lowercase();
        let value = unquote(value);
        match key.as_str() {
            "size" => size = Some(value.parse::<f64>().ok().filter(|s| s.is_finite())?),
            "shape" => shape = Some(value.parse::<u32>().ok()?),
            "colour" | "color" => {
                if value.is_empty() {
                    return None;
                }
                colour = Some(Colour::from(value.to_string()));
            }
            _ => return None,
        }
    }

    Some(VisualSignature {
        size: size?,
        shape: shape?,
        colour: colour?,
    })
}

fn unquote(raw: &str) -> &str {
    raw.trim().trim_matches(|c| c == '"' || c == '\'').trim()
}

fn parse_location(text: &str) -> Option<Location> {
    let inner = text.trim().strip_prefix('(')?.strip_suffix(')')?;
    let (x, y) = inner.split_once(',')?;
    Some(Location::new(x.trim().parse().ok()?, y.trim().parse().ok()?))
}
