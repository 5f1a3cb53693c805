//! Status lifecycle shared by orders and shipments.
//!
//! `pending -> paid -> shipped`, with `cancelled` reachable from `pending` or
//! `paid`. Each service keeps its own copy of the status and its own table of
//! which predecessors a transition accepts.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Paid,
    Shipped,
    Cancelled,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Paid => "paid",
            Status::Shipped => "shipped",
            Status::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status `{0}`")]
pub struct UnknownStatus(pub String);

impl FromStr for Status {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Status::Pending),
            "paid" => Ok(Status::Paid),
            "shipped" => Ok(Status::Shipped),
            "cancelled" => Ok(Status::Cancelled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    MarkPaid,
    MarkShipped,
    Cancel,
}

impl Transition {
    pub fn target(self) -> Status {
        match self {
            Transition::MarkPaid => Status::Paid,
            Transition::MarkShipped => Status::Shipped,
            Transition::Cancel => Status::Cancelled,
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Transition::MarkPaid => "mark-paid",
            Transition::MarkShipped => "mark-shipped",
            Transition::Cancel => "cancel",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot {transition} from status {from}")]
pub struct TransitionError {
    pub from: Status,
    pub transition: Transition,
}

impl TransitionError {
    /// The record already sits where the transition would take it.
    pub fn is_replay(&self) -> bool {
        self.from == self.transition.target()
    }
}

/// Allowed predecessors per transition.
#[derive(Debug)]
pub struct TransitionTable {
    name: &'static str,
    rules: &'static [(Transition, &'static [Status])],
}

pub static SHIPMENT_TRANSITIONS: TransitionTable = TransitionTable {
    name: "shipment",
    rules: &[
        (Transition::MarkPaid, &[Status::Pending]),
        (Transition::MarkShipped, &[Status::Paid]),
        (Transition::Cancel, &[Status::Pending, Status::Paid]),
    ],
};

pub static ORDER_TRANSITIONS: TransitionTable = TransitionTable {
    name: "order",
    rules: &[
        (Transition::MarkPaid, &[Status::Pending]),
        (Transition::MarkShipped, &[Status::Pending, Status::Paid]),
        (Transition::Cancel, &[Status::Pending, Status::Paid]),
    ],
};

impl TransitionTable {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn allows(&self, from: Status, transition: Transition) -> bool {
        self.rules
            .iter()
            .any(|(t, predecessors)| *t == transition && predecessors.contains(&from))
    }

    pub fn apply(&self, from: Status, transition: Transition) -> Result<Status, TransitionError> {
        if self.allows(from, transition) {
            Ok(transition.target())
        } else {
            Err(TransitionError { from, transition })
        }
    }
}
