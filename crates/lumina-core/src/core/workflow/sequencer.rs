//! Request Sequencer
//!
//! Per-kind monotonically increasing request numbers. A response is applied
//! only if its ticket is still the latest issued for its kind; anything older
//! was superseded and is dropped on arrival.

use serde::{Deserialize, Serialize};

use crate::core::{CoreError, CoreResult, RequestKind};

/// Identifies one issued request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestTicket {
    pub kind: RequestKind,
    pub seq: u64,
}

impl std::fmt::Display for RequestTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.kind, self.seq)
    }
}

/// Issues and checks request tickets
#[derive(Clone, Debug, Default)]
pub struct RequestSequencer {
    latest: [u64; 2],
}

impl RequestSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a ticket that supersedes every earlier ticket of the same kind
    pub fn issue(&mut self, kind: RequestKind) -> RequestTicket {
        let slot = &mut self.latest[kind.index()];
        *slot += 1;
        RequestTicket { kind, seq: *slot }
    }

    /// Supersedes outstanding tickets of a kind without issuing a new one
    pub fn invalidate(&mut self, kind: RequestKind) {
        self.latest[kind.index()] += 1;
    }

    /// Supersedes outstanding tickets of every kind
    pub fn invalidate_all(&mut self) {
        for kind in RequestKind::all() {
            self.invalidate(kind);
        }
    }

    /// Latest sequence number for a kind
    pub fn latest(&self, kind: RequestKind) -> u64 {
        self.latest[kind.index()]
    }

    /// Returns true if the ticket has not been superseded
    pub fn is_current(&self, ticket: RequestTicket) -> bool {
        self.latest(ticket.kind) == ticket.seq
    }

    /// Fails with `StaleResponse` if the ticket has been superseded
    pub fn check(&self, ticket: RequestTicket) -> CoreResult<()> {
        if self.is_current(ticket) {
            Ok(())
        } else {
            Err(CoreError::StaleResponse {
                kind: ticket.kind,
                seq: ticket.seq,
                latest: self.latest(ticket.kind),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_increments_per_kind() {
        let mut seq = RequestSequencer::new();
        assert_eq!(seq.issue(RequestKind::Detect).seq, 1);
        assert_eq!(seq.issue(RequestKind::Detect).seq, 2);
        assert_eq!(seq.issue(RequestKind::Search).to_string(), "search#1");
    }

    #[test]
    fn test_older_ticket_is_stale() {
        let mut seq = RequestSequencer::new();
        let a = seq.issue(RequestKind::Search);
        let b = seq.issue(RequestKind::Search);

        assert!(seq.check(b).is_ok());
        let err = seq.check(a).unwrap_err();
        assert!(err.is_stale());
        assert!(matches!(
            err,
            CoreError::StaleResponse {
                kind: RequestKind::Search,
                seq: 1,
                latest: 2
            }
        ));
    }

    #[test]
    fn test_kinds_are_independent() {
        let mut seq = RequestSequencer::new();
        let detect = seq.issue(RequestKind::Detect);
        seq.issue(RequestKind::Search);
        assert!(seq.is_current(detect));
    }

    #[test]
    fn test_invalidate_all() {
        let mut seq = RequestSequencer::new();
        let detect = seq.issue(RequestKind::Detect);
        let search = seq.issue(RequestKind::Search);

        seq.invalidate_all();
        assert!(!seq.is_current(detect));
        assert!(!seq.is_current(search));
    }
}
