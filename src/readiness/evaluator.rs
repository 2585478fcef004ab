use super::state::WorkloadStatus;
use crate::config::declarations::DependencyDeclaration;
use crate::dependency::RegistrySnapshot;

/// An external action the workload has not finished yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InFlight {
    /// The applied image is not the one the workload reports running.
    ImageRollout {
        expected: String,
        observed: Option<String>,
    },
    /// The running image could not be queried.
    ImageUnconfirmed { reason: String },
    /// The last apply failed and a retry is scheduled. Carries no attempt count.
    RetryPending { error: String },
}

impl InFlight {
    fn message(&self) -> String {
        match self {
            InFlight::ImageRollout { expected, observed } => format!(
                "waiting for workload to run image {expected} (currently {})",
                observed.as_deref().unwrap_or("unknown")
            ),
            InFlight::ImageUnconfirmed { reason } => {
                format!("unable to confirm workload image: {reason}")
            }
            InFlight::RetryPending { error } => {
                format!("workload update failed, retrying: {error}")
            }
        }
    }
}

/// Workload-side inputs to readiness.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkloadObservation {
    /// Blocking problem with the workload settings themselves.
    pub settings_issue: Option<String>,
    pub in_flight: Option<InFlight>,
}

impl WorkloadObservation {
    pub fn settled() -> Self {
        Self::default()
    }

    pub fn with_settings_issue(mut self, issue: Option<String>) -> Self {
        self.settings_issue = issue;
        self
    }

    pub fn with_in_flight(mut self, in_flight: Option<InFlight>) -> Self {
        self.in_flight = in_flight;
        self
    }
}

/// `interface (name)`, or just the name when the two match.
fn relation_label(declaration: &DependencyDeclaration) -> String {
    if declaration.interface == declaration.name {
        declaration.name.clone()
    } else {
        format!("{} ({})", declaration.interface, declaration.name)
    }
}

/// Derives the workload status. Pure: the same inputs always give the same status.
pub fn evaluate(
    declarations: &[DependencyDeclaration],
    snapshot: &RegistrySnapshot,
    observation: &WorkloadObservation,
) -> WorkloadStatus {
    for declaration in declarations.iter().filter(|declaration| declaration.required) {
        let instances = snapshot.instances(&declaration.name);
        if instances.iter().any(|instance| instance.is_valid()) {
            continue;
        }

        return match instances.iter().find_map(|instance| instance.issue.as_ref()) {
            Some(issue) => WorkloadStatus::blocked(format!(
                "invalid relation data for {} ({}): {issue}",
                declaration.name, issue.source_id
            )),
            None => WorkloadStatus::blocked(format!(
                "requires relating to: {}",
                relation_label(declaration)
            )),
        };
    }

    if let Some(issue) = observation.settings_issue.as_ref() {
        return WorkloadStatus::blocked(issue.clone());
    }

    for declaration in declarations {
        if let Some(issue) = snapshot
            .instances(&declaration.name)
            .iter()
            .find_map(|instance| instance.issue.as_ref())
        {
            return WorkloadStatus::error(format!(
                "invalid relation data for {} ({}): {issue}",
                declaration.name, issue.source_id
            ));
        }
    }

    match observation.in_flight.as_ref() {
        Some(in_flight) => WorkloadStatus::waiting(in_flight.message()),
        None => WorkloadStatus::active(),
    }
}
