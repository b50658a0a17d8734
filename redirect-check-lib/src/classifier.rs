//! Mapping of probe statuses to an action.

use crate::types::{Action, Outcome, UrlPair};

/// Decide the action for a pair from the two final statuses.
///
/// A destination that answers 200 always wins, whatever the source did.
pub fn classify(source_status: u16, destination_status: u16) -> Action {
    if destination_status == 200 {
        Action::Analyze
    } else if source_status == 200 {
        Action::Redirect
    } else {
        Action::Change
    }
}

/// Build the outcome record for a verified pair.
pub fn outcome_for(
    identifier: &str,
    pair: &UrlPair,
    source_status: u16,
    destination_status: u16,
) -> Outcome {
    Outcome {
        identifier: identifier.to_string(),
        source: pair.source.clone(),
        destination: pair.destination.clone(),
        action: classify(source_status, destination_status),
        source_status,
        destination_status,
    }
}
