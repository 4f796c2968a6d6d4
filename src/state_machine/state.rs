use std::fmt;

use serde::{Deserialize, Serialize};

/// The lifecycle of a content job.
///
/// Each job flows through: IDEA → RESEARCHING → DRAFTING → QA → REVIEW →
/// APPROVED → PUBLISHED, and may drop to REJECTED from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Idea,
    Researching,
    Drafting,
    Qa,
    Review,
    Approved,
    Published,
    Rejected,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Idea => write!(f, "Idea"),
            JobStatus::Researching => write!(f, "Researching"),
            JobStatus::Drafting => write!(f, "Drafting"),
            JobStatus::Qa => write!(f, "QA"),
            JobStatus::Review => write!(f, "Review"),
            JobStatus::Approved => write!(f, "Approved"),
            JobStatus::Published => write!(f, "Published"),
            JobStatus::Rejected => write!(f, "Rejected"),
        }
    }
}

impl JobStatus {
    pub const ALL: [JobStatus; 8] = [
        JobStatus::Idea,
        JobStatus::Researching,
        JobStatus::Drafting,
        JobStatus::Qa,
        JobStatus::Review,
        JobStatus::Approved,
        JobStatus::Published,
        JobStatus::Rejected,
    ];

    /// Published and Rejected end a job; nothing follows them.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Published | JobStatus::Rejected)
    }

    /// Lowercase machine name, also accepted by [`JobStatus::parse`].
    pub fn name(self) -> &'static str {
        match self {
            JobStatus::Idea => "idea",
            JobStatus::Researching => "researching",
            JobStatus::Drafting => "drafting",
            JobStatus::Qa => "qa",
            JobStatus::Review => "review",
            JobStatus::Approved => "approved",
            JobStatus::Published => "published",
            JobStatus::Rejected => "rejected",
        }
    }

    /// Lenient parse: accepts the machine name, the display name, and
    /// the "your review" spelling used on review boards.
    pub fn parse(raw: &str) -> Option<JobStatus> {
        let normalized = raw.trim().to_lowercase().replace(' ', "_");
        let normalized = normalized.strip_prefix("your_").unwrap_or(&normalized);
        JobStatus::ALL
            .into_iter()
            .find(|status| status.name() == normalized)
    }

    fn rank(self) -> u8 {
        match self {
            JobStatus::Idea => 0,
            JobStatus::Researching => 1,
            JobStatus::Drafting => 2,
            JobStatus::Qa => 3,
            JobStatus::Review => 4,
            JobStatus::Approved => 5,
            JobStatus::Published => 6,
            JobStatus::Rejected => 7,
        }
    }
}

/// The result of evaluating a requested status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Move forward to the given status.
    Next(JobStatus),
    /// Same status; only metadata changes.
    Stay(JobStatus),
    /// The change would regress or leave a terminal state.
    Invalid { from: JobStatus, to: JobStatus },
}

/// Decides which status changes a job may make.
pub struct StateMachine;

impl StateMachine {
    /// Compute the transition from `from` to `to`.
    ///
    /// - Terminal states accept nothing, not even a same-status update.
    /// - Any non-terminal state may move forward or drop to `Rejected`.
    /// - `Published` is only reachable from `Approved`.
    pub fn check(from: JobStatus, to: JobStatus) -> Transition {
        if from.is_terminal() {
            return Transition::Invalid { from, to };
        }
        if from == to {
            return Transition::Stay(from);
        }
        match to {
            JobStatus::Rejected => Transition::Next(to),
            JobStatus::Published if from != JobStatus::Approved => {
                Transition::Invalid { from, to }
            }
            _ if to.rank() > from.rank() => Transition::Next(to),
            _ => Transition::Invalid { from, to },
        }
    }

    pub fn is_allowed(from: JobStatus, to: JobStatus) -> bool {
        !matches!(Self::check(from, to), Transition::Invalid { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_walks_all_states() {
        let path = [
            JobStatus::Idea,
            JobStatus::Researching,
            JobStatus::Drafting,
            JobStatus::Qa,
            JobStatus::Review,
            JobStatus::Approved,
            JobStatus::Published,
        ];
        for pair in path.windows(2) {
            assert_eq!(StateMachine::check(pair[0], pair[1]), Transition::Next(pair[1]));
        }
    }

    #[test]
    fn terminal_states_never_regress() {
        for terminal in [JobStatus::Published, JobStatus::Rejected] {
            for target in JobStatus::ALL {
                assert!(
                    !StateMachine::is_allowed(terminal, target),
                    "{terminal} -> {target} must be refused"
                );
            }
        }
    }

    #[test]
    fn backwards_moves_are_invalid() {
        assert_eq!(
            StateMachine::check(JobStatus::Review, JobStatus::Drafting),
            Transition::Invalid {
                from: JobStatus::Review,
                to: JobStatus::Drafting
            }
        );
    }

    #[test]
    fn publish_requires_approval() {
        assert!(!StateMachine::is_allowed(JobStatus::Review, JobStatus::Published));
        assert!(StateMachine::is_allowed(JobStatus::Approved, JobStatus::Published));
    }

    #[test]
    fn any_open_state_can_be_rejected() {
        for status in JobStatus::ALL.into_iter().filter(|s| !s.is_terminal()) {
            assert_eq!(
                StateMachine::check(status, JobStatus::Rejected),
                Transition::Next(JobStatus::Rejected)
            );
        }
    }

    #[test]
    fn same_status_is_a_metadata_update() {
        assert_eq!(
            StateMachine::check(JobStatus::Researching, JobStatus::Researching),
            Transition::Stay(JobStatus::Researching)
        );
    }

    #[test]
    fn parse_is_lenient() {
        assert_eq!(JobStatus::parse("QA"), Some(JobStatus::Qa));
        assert_eq!(JobStatus::parse("Your Review"), Some(JobStatus::Review));
        assert_eq!(JobStatus::parse(" published "), Some(JobStatus::Published));
        assert_eq!(JobStatus::parse("shipped"), None);
    }

    #[test]
    fn status_display() {
        assert_eq!(JobStatus::Qa.to_string(), "QA");
        assert_eq!(JobStatus::Review.to_string(), "Review");
    }
}
