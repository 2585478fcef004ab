use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WorkloadState {
    Blocked,
    Waiting,
    Active,
    Error,
}

impl WorkloadState {
    /// States in which the workload may be (re)configured.
    pub fn allows_action(self) -> bool {
        matches!(self, WorkloadState::Waiting | WorkloadState::Active)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkloadState::Blocked => "blocked",
            WorkloadState::Waiting => "waiting",
            WorkloadState::Active => "active",
            WorkloadState::Error => "error",
        }
    }
}

impl fmt::Display for WorkloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkloadStatus {
    pub state: WorkloadState,
    pub message: String,
}

impl WorkloadStatus {
    pub fn new(state: WorkloadState, message: impl Into<String>) -> Self {
        Self {
            state,
            message: message.into(),
        }
    }

    pub fn blocked(message: impl Into<String>) -> Self {
        Self::new(WorkloadState::Blocked, message)
    }

    pub fn waiting(message: impl Into<String>) -> Self {
        Self::new(WorkloadState::Waiting, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(WorkloadState::Error, message)
    }

    pub fn active() -> Self {
        Self::new(WorkloadState::Active, "")
    }

    pub fn is_active(&self) -> bool {
        self.state == WorkloadState::Active
    }
}

impl fmt::Display for WorkloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.state)
        } else {
            write!(f, "{}: {}", self.state, self.message)
        }
    }
}
