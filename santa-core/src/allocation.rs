use std::collections::{HashMap, HashSet};

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::ParticipantName;

/// Number of random permutations tried before falling back to the exhaustive search.
pub const MAX_TRIALS: usize = 1000;

/// Giver name -> names that giver must not draw.
pub type Exclusions = HashMap<ParticipantName, HashSet<ParticipantName>>;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Pairing {
    pub giver: ParticipantName,
    pub receiver: ParticipantName,
}

/// A complete draw: one pairing per participant, in the order the givers were supplied.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Allocation {
    pairings: Vec<Pairing>,
}

impl Allocation {
    fn from_indices(participants: &[ParticipantName], receivers: &[usize]) -> Self {
        let pairings = participants
            .iter()
            .zip(receivers)
            .map(|(giver, &receiver)| Pairing {
                giver: giver.clone(),
                receiver: participants[receiver].clone(),
            })
            .collect();
        Self { pairings }
    }

    pub fn pairings(&self) -> &[Pairing] {
        &self.pairings
    }

    pub fn receiver_for(&self, giver: &str) -> Option<&str> {
        self.pairings
            .iter()
            .find(|p| p.giver == giver)
            .map(|p| p.receiver.as_str())
    }

    pub fn len(&self) -> usize {
        self.pairings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairings.is_empty()
    }

    /// Checks that this draw is a bijection over `participants` with no self-draw
    /// and no excluded pairing.
    pub fn is_valid_for(&self, participants: &[ParticipantName], exclusions: &Exclusions) -> bool {
        if self.pairings.len() != participants.len() {
            return false;
        }

        let everyone: HashSet<&str> = participants.iter().map(String::as_str).collect();
        let givers: HashSet<&str> = self.pairings.iter().map(|p| p.giver.as_str()).collect();
        let receivers: HashSet<&str> = self.pairings.iter().map(|p| p.receiver.as_str()).collect();
        if givers != everyone || receivers != everyone {
            return false;
        }

        self.pairings
            .iter()
            .all(|p| p.giver != p.receiver && !is_excluded(exclusions, &p.giver, &p.receiver))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AllocationError {
    #[error("at least 2 participants are required, got {count}")]
    NotEnoughParticipants { count: usize },
    #[error("no assignment satisfies the exclusions")]
    Infeasible,
}

/// Draws a receiver for every participant.
///
/// `participants` must hold unique names and nobody may exclude themselves; neither
/// is checked here (see [`crate::event::validate`]). A bounded number of random
/// permutations is tried first; when none fits, a depth-first search over the
/// remaining candidates either finds an assignment or proves there is none.
pub fn allocate<R: Rng + ?Sized>(
    participants: &[ParticipantName],
    exclusions: &Exclusions,
    rng: &mut R,
) -> Result<Allocation, AllocationError> {
    if participants.len() < 2 {
        return Err(AllocationError::NotEnoughParticipants {
            count: participants.len(),
        });
    }

    let forbidden = forbidden_matrix(participants, exclusions);

    if let Some(receivers) = random_trials(&forbidden, rng) {
        return Ok(Allocation::from_indices(participants, &receivers));
    }

    debug!(
        participants = participants.len(),
        trials = MAX_TRIALS,
        "random trials exhausted, searching exhaustively"
    );

    let result = backtrack(&forbidden, rng);
    debug!(found = result.is_some(), "exhaustive search finished");
    result
        .map(|receivers| Allocation::from_indices(participants, &receivers))
        .ok_or(AllocationError::Infeasible)
}

fn is_excluded(exclusions: &Exclusions, giver: &str, receiver: &str) -> bool {
    exclusions
        .get(giver)
        .map(|set| set.contains(receiver))
        .unwrap_or(false)
}

/// `forbidden[g][r]` is true when giver `g` may not draw receiver `r`, self-draws included.
fn forbidden_matrix(participants: &[ParticipantName], exclusions: &Exclusions) -> Vec<Vec<bool>> {
    participants
        .iter()
        .enumerate()
        .map(|(g, giver)| {
            participants
                .iter()
                .enumerate()
                .map(|(r, receiver)| g == r || is_excluded(exclusions, giver, receiver))
                .collect()
        })
        .collect()
}

fn random_trials<R: Rng + ?Sized>(forbidden: &[Vec<bool>], rng: &mut R) -> Option<Vec<usize>> {
    let mut receivers: Vec<usize> = (0..forbidden.len()).collect();
    for _ in 0..MAX_TRIALS {
        receivers.shuffle(rng);
        let fits = receivers
            .iter()
            .enumerate()
            .all(|(giver, &receiver)| !forbidden[giver][receiver]);
        if fits {
            return Some(receivers);
        }
    }
    None
}

/// Remaining receivers one giver can still try, shuffled once when the giver is reached.
struct Frame {
    candidates: Vec<usize>,
}

impl Frame {
    fn new<R: Rng + ?Sized>(giver: usize, forbidden: &[Vec<bool>], used: &[bool], rng: &mut R) -> Self {
        let mut candidates: Vec<usize> = (0..forbidden.len())
            .filter(|&r| !used[r] && !forbidden[giver][r])
            .collect();
        candidates.shuffle(rng);
        Self { candidates }
    }
}

/// Depth-first search with an explicit stack; frame `i` belongs to giver `i` and
/// `assigned[i]` is that giver's current receiver. A pick is only kept when the
/// givers after it can still all be matched, so infeasible inputs fail at the root
/// instead of after walking the whole tree.
fn backtrack<R: Rng + ?Sized>(forbidden: &[Vec<bool>], rng: &mut R) -> Option<Vec<usize>> {
    let n = forbidden.len();
    let mut used = vec![false; n];
    if !completable(forbidden, 0, &used) {
        return None;
    }

    let mut assigned: Vec<usize> = Vec::with_capacity(n);
    let mut stack = vec![Frame::new(0, forbidden, &used, rng)];

    while !stack.is_empty() {
        let giver = stack.len() - 1;

        // Returning to a frame after its subtree failed: release its last pick.
        if assigned.len() > giver {
            if let Some(previous) = assigned.pop() {
                used[previous] = false;
            }
        }

        match stack[giver].candidates.pop() {
            Some(receiver) => {
                used[receiver] = true;
                if !completable(forbidden, giver + 1, &used) {
                    used[receiver] = false;
                    continue;
                }
                assigned.push(receiver);
                if assigned.len() == n {
                    return Some(assigned);
                }
                let next = Frame::new(giver + 1, forbidden, &used, rng);
                stack.push(next);
            }
            None => {
                stack.pop();
            }
        }
    }

    None
}

/// Whether givers `first..n` can each get a distinct unused, allowed receiver
/// (bipartite matching by augmenting paths).
fn completable(forbidden: &[Vec<bool>], first: usize, used: &[bool]) -> bool {
    let n = forbidden.len();
    let mut owner: Vec<Option<usize>> = vec![None; n];
    (first..n).all(|giver| {
        let mut seen = vec![false; n];
        augment(forbidden, used, giver, &mut seen, &mut owner)
    })
}

fn augment(
    forbidden: &[Vec<bool>],
    used: &[bool],
    giver: usize,
    seen: &mut [bool],
    owner: &mut [Option<usize>],
) -> bool {
    for receiver in 0..forbidden.len() {
        if used[receiver] || forbidden[giver][receiver] || seen[receiver] {
            continue;
        }
        seen[receiver] = true;
        let free = match owner[receiver] {
            None => true,
            Some(holder) => augment(forbidden, used, holder, seen, owner),
        };
        if free {
            owner[receiver] = Some(giver);
            return true;
        }
    }
    false
}
