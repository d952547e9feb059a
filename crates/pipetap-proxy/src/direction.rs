//! Stream directions and their log labels.

use std::fmt;

/// Which of the three proxied streams a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Parent stdin forwarded to the child's stdin.
    ParentToChild,
    /// Child stdout forwarded to the parent's stdout.
    ChildStdout,
    /// Child stderr forwarded to the parent's stderr.
    ChildStderr,
}

impl Direction {
    pub const ALL: [Direction; 3] = [
        Direction::ParentToChild,
        Direction::ChildStdout,
        Direction::ChildStderr,
    ];

    /// Label written in front of every log record for this stream.
    pub fn label(self) -> &'static str {
        match self {
            Direction::ParentToChild => "parent→child",
            Direction::ChildStdout => "child→parent stdout",
            Direction::ChildStderr => "child→parent stderr",
        }
    }

    /// Short name used for thread names and diagnostics.
    pub fn stream_name(self) -> &'static str {
        match self {
            Direction::ParentToChild => "stdin",
            Direction::ChildStdout => "stdout",
            Direction::ChildStderr => "stderr",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
