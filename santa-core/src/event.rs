use std::collections::{HashMap, HashSet};

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::allocation::{allocate, AllocationError, Exclusions};
use crate::codec::{encode, CodecError, PayloadRecord};
use crate::ParticipantName;

/// Raw event as submitted by an organiser, before trimming and checks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub participants: Vec<ParticipantEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantEntry {
    pub name: String,
    #[serde(default)]
    pub exclusions: Vec<String>,
}

/// An event that satisfies every precondition of [`allocate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedEvent {
    title: String,
    description: String,
    participants: Vec<ParticipantName>,
    exclusions: Exclusions,
}

/// One participant's share of a draw. The receiver only lives inside the token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Assignment {
    pub giver: ParticipantName,
    pub token: String,
}

#[derive(Debug, Error)]
pub enum EventError {
    #[error("event title is required")]
    MissingTitle,
    #[error("participant names cannot be empty")]
    EmptyName,
    #[error("at least 2 participants are required")]
    NotEnoughParticipants,
    #[error("participant {0} is listed more than once")]
    DuplicateName(String),
    #[error("{participant} excludes unknown participant {excluded}")]
    UnknownExclusion {
        participant: String,
        excluded: String,
    },
    #[error("{0} cannot exclude themselves")]
    SelfExclusion(String),
    #[error("{0} excludes every other participant")]
    ExcludesEveryone(String),
    #[error("could not draw names: {0}")]
    Allocation(#[from] AllocationError),
    #[error("could not build link: {0}")]
    Codec(#[from] CodecError),
}

/// Trims and checks a raw event. Names are unique ignoring case, and exclusions are
/// resolved to the spelling the participant was registered with.
pub fn validate(request: &EventRequest) -> Result<ValidatedEvent, EventError> {
    let title = request.title.trim();
    if title.is_empty() {
        return Err(EventError::MissingTitle);
    }

    let mut participants = Vec::with_capacity(request.participants.len());
    let mut by_key: HashMap<String, usize> = HashMap::new();
    for entry in &request.participants {
        let name = entry.name.trim();
        if name.is_empty() {
            return Err(EventError::EmptyName);
        }
        if by_key.insert(name.to_lowercase(), participants.len()).is_some() {
            return Err(EventError::DuplicateName(name.to_string()));
        }
        participants.push(name.to_string());
    }

    if participants.len() < 2 {
        return Err(EventError::NotEnoughParticipants);
    }

    let mut exclusions = Exclusions::new();
    for (entry, name) in request.participants.iter().zip(&participants) {
        let mut excluded: HashSet<ParticipantName> = HashSet::new();
        for raw in &entry.exclusions {
            let wanted = raw.trim();
            if wanted.is_empty() {
                continue;
            }
            let index = by_key
                .get(&wanted.to_lowercase())
                .copied()
                .ok_or_else(|| EventError::UnknownExclusion {
                    participant: name.clone(),
                    excluded: wanted.to_string(),
                })?;
            let target = &participants[index];
            if target == name {
                return Err(EventError::SelfExclusion(name.clone()));
            }
            excluded.insert(target.clone());
        }

        if excluded.len() + 1 >= participants.len() {
            return Err(EventError::ExcludesEveryone(name.clone()));
        }
        if !excluded.is_empty() {
            exclusions.insert(name.clone(), excluded);
        }
    }

    Ok(ValidatedEvent {
        title: title.to_string(),
        description: request.description.trim().to_string(),
        participants,
        exclusions,
    })
}

impl ValidatedEvent {
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn participants(&self) -> &[ParticipantName] {
        &self.participants
    }

    pub fn exclusions(&self) -> &Exclusions {
        &self.exclusions
    }

    /// Draws once and returns one token per participant, in registration order.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec<Assignment>, EventError> {
        let allocation = allocate(&self.participants, &self.exclusions, rng)?;

        allocation
            .pairings()
            .iter()
            .map(|pairing| -> Result<Assignment, EventError> {
                let record = PayloadRecord {
                    title: self.title.clone(),
                    description: self.description.clone(),
                    giver: pairing.giver.clone(),
                    receiver: pairing.receiver.clone(),
                };
                Ok(Assignment {
                    giver: pairing.giver.clone(),
                    token: encode(&record)?,
                })
            })
            .collect()
    }
}

/// Link a participant opens to see their draw. `token` must come from [`encode`].
pub fn reveal_link(base_url: &str, token: &str) -> String {
    format!("{}/reveal?data={token}", base_url.trim_end_matches('/'))
}
