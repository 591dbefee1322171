//! Explicit continuation model.
//!
//! After every settled step the interpreter persists a serializable program
//! counter (the step's tree path) together with a context snapshot. Resume
//! loads the snapshot and re-walks the tree, fast-forwarding along the
//! recorded cursor instead of re-executing settled steps. Parallel nodes
//! checkpoint only at their barrier: branches are not individually
//! resumable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::ExecutionContext;

/// One segment of a step-tree path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathSeg {
    /// Index within a step sequence.
    Seq(usize),
    /// Taken branch of a condition.
    Then,
    Else,
    /// Branch index of a parallel node; appears in error paths, never in a
    /// checkpoint cursor.
    Branch(usize),
}

/// Render a path for logs and error references: `steps[1].then[0]`.
pub fn render_path(path: &[PathSeg]) -> String {
    let mut out = String::from("steps");
    for seg in path {
        match seg {
            PathSeg::Seq(i) => out.push_str(&format!("[{i}]")),
            PathSeg::Then => out.push_str(".then"),
            PathSeg::Else => out.push_str(".else"),
            PathSeg::Branch(i) => out.push_str(&format!(".branch[{i}]")),
        }
    }
    out
}

/// Serializable continuation: the path of the last settled step plus the
/// context as of that settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub cursor: Vec<PathSeg>,
    pub context: ExecutionContext,
    pub saved_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(cursor: Vec<PathSeg>, context: ExecutionContext) -> Self {
        Self {
            cursor,
            context,
            saved_at: Utc::now(),
        }
    }
}

/// What the resume walk should do with the step at a given path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayPlan {
    /// Run it: either fast-forward is over or the tree changed under us.
    Execute,
    /// Already settled before the checkpoint; its effects are in the
    /// restored context.
    Skip,
    /// A composite step containing the cursor target; descend along the
    /// recorded branch without re-evaluating predicates.
    Descend,
}

/// Fast-forward state for one resume walk. Inactive instances (the common
/// case for fresh runs) answer `Execute` for everything.
#[derive(Debug)]
pub struct FastForward {
    target: Vec<PathSeg>,
    consumed: bool,
}

impl FastForward {
    /// Fast-forward to just past `target`, the last settled step's path.
    pub fn to(target: Vec<PathSeg>) -> Self {
        Self {
            target,
            consumed: false,
        }
    }

    /// No fast-forwarding: every step executes.
    pub fn none() -> Self {
        Self {
            target: Vec::new(),
            consumed: true,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.consumed
    }

    /// The recorded segment at `depth`, used to pick a condition branch
    /// while descending.
    pub fn segment_at(&self, depth: usize) -> Option<PathSeg> {
        if self.consumed {
            None
        } else {
            self.target.get(depth).copied()
        }
    }

    /// Classify the step at `path` relative to the cursor target.
    pub fn plan(&mut self, path: &[PathSeg]) -> ReplayPlan {
        if self.consumed {
            return ReplayPlan::Execute;
        }

        if path.len() <= self.target.len() && path.iter().zip(&self.target).all(|(a, b)| a == b) {
            if path.len() == self.target.len() {
                // This is the last settled step; everything after executes.
                self.consumed = true;
                return ReplayPlan::Skip;
            }
            return ReplayPlan::Descend;
        }

        for (candidate, recorded) in path.iter().zip(&self.target) {
            if candidate != recorded {
                return match (candidate, recorded) {
                    (PathSeg::Seq(i), PathSeg::Seq(j)) if i < j => ReplayPlan::Skip,
                    (PathSeg::Branch(i), PathSeg::Branch(j)) if i < j => ReplayPlan::Skip,
                    // Past the target or a shape mismatch (the tree changed
                    // between save and resume): stop fast-forwarding.
                    _ => {
                        self.consumed = true;
                        ReplayPlan::Execute
                    }
                };
            }
        }

        self.consumed = true;
        ReplayPlan::Execute
    }
}
