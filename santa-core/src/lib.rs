//! Secret Santa draws and the tokens that carry them.
//!
//! [`allocation`] picks a receiver for every participant, honouring exclusions.
//! [`codec`] turns one participant's draw into a token that fits in a URL, and back.
//! [`event`] ties the two together for a submitted event.

pub mod allocation;
pub mod codec;
pub mod event;

pub type ParticipantName = String;

pub use allocation::{allocate, Allocation, AllocationError, Exclusions, Pairing, MAX_TRIALS};
pub use codec::{decode, encode, CodecError, PayloadRecord};
pub use event::{reveal_link, validate, Assignment, EventError, EventRequest, ParticipantEntry, ValidatedEvent};
