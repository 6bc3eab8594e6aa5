//! Want/have negotiation for `multi_ack_detailed`.
//!
//! The engine's only job is to choose the first pack the fetch response
//! must include. It tracks, per revision, the set of ref values the
//! client has not yet claimed to have; the newest revision whose set
//! drains is fully known to the client, so transmission can start at the
//! pack after it.

use std::collections::HashSet;

use vault_hash::ObjectId;
use vault_repo::Revision;

/// One server line in the negotiation exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Nak,
    /// The object is known, but no revision is fully covered yet.
    AckCommon(ObjectId),
    /// Some revision is fully covered; the pack range is decided.
    AckReady(ObjectId),
    /// Closing acknowledgement after `done`.
    Ack(ObjectId),
}

impl Response {
    /// The wire form (no trailing newline, matching the rest of the
    /// server's frames).
    pub fn to_line(self) -> String {
        match self {
            Response::Nak => "NAK".to_string(),
            Response::AckCommon(id) => format!("ACK {id} common"),
            Response::AckReady(id) => format!("ACK {id} ready"),
            Response::Ack(id) => format!("ACK {id}"),
        }
    }
}

/// Negotiation state for one fetch request.
///
/// Owned by the driver for the duration of the negotiation loop; one
/// request, one owner.
pub struct Negotiation {
    /// Per revision, chronological: ref values the client has not named.
    remaining: Vec<HashSet<ObjectId>>,
    last_common: Option<ObjectId>,
    /// Index of the newest fully-covered revision.
    result: Option<usize>,
}

impl Negotiation {
    pub fn new(revisions: &[Revision]) -> Self {
        Self {
            remaining: revisions.iter().map(Revision::value_set).collect(),
            last_common: None,
            result: None,
        }
    }

    /// A flush in mid-negotiation keeps the exchange alive with a `NAK`,
    /// unless the pack range is already decided.
    pub fn on_flush(&mut self) -> Option<Response> {
        if self.result.is_none() {
            Some(Response::Nak)
        } else {
            None
        }
    }

    /// Process one `have` value.
    ///
    /// Scans revisions newest-first, removing the value wherever it
    /// appears; the first revision whose set drains decides the result.
    pub fn on_have(&mut self, have: ObjectId) -> Option<Response> {
        let mut common = false;
        for i in (0..self.remaining.len()).rev() {
            let set = &mut self.remaining[i];
            if set.remove(&have) {
                common = true;
                if set.is_empty() {
                    self.result = Some(i);
                    break;
                }
            }
        }

        if self.result.is_some() {
            self.last_common = Some(have);
            Some(Response::AckReady(have))
        } else if common {
            self.last_common = Some(have);
            Some(Response::AckCommon(have))
        } else {
            None
        }
    }

    /// Closing response for the client's `done`.
    pub fn on_done(&self) -> Response {
        match self.last_common {
            Some(id) => Response::Ack(id),
            None => Response::Nak,
        }
    }

    /// Index of the first pack to transmit: everything after the newest
    /// fully-covered revision, or the whole history when nothing was.
    pub fn start_index(&self) -> usize {
        match self.result {
            Some(covered) => covered + 1,
            None => 0,
        }
    }
}
