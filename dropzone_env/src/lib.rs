//! Dropzone Environment Abstraction Layer
//!
//! This crate is the narrow "Sans-IO" surface between a Dropzone agent and the
//! grid world it lives in. Nothing here decides anything; it only describes:
//! - What an agent perceives each tick (`Observation`)
//! - What it may do about it (`Action`)
//! - How it moves (`Navigator`, a path executor owned by the environment side)
//! - How it talks to teammates (`Envelope`, `MessageTransport`)
//!
//! # Example
//!
//! ```ignore
//! use dropzone_env::{Action, Navigator, NavStep, Observation};
//!
//! fn follow<N: Navigator>(nav: &mut N, obs: &Observation) -> Option<Action> {
//!     match nav.next_step(obs) {
//!         NavStep::Move(dir) => Some(Action::Move(dir)),
//!         NavStep::Arrived | NavStep::Blocked => None,
//!     }
//! }
//! ```

mod action;
mod error;
mod navigator;
mod observation;
mod transport;
mod types;

pub use action::Action;
pub use error::EnvError;
pub use navigator::{NavStep, Navigator};
pub use observation::{CollectionSite, DoorState, Observation, ObservedBlock, RoomLayout, SelfState};
pub use transport::{Envelope, MessageTransport};
pub use types::{AgentId, Colour, Direction, Location, ObjectId, VisualSignature};
