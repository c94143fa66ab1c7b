use super::types::IntentionStatus;

/// Whether the state machine permits `from -> to`. Human rejection is
/// allowed from every non-terminal state; terminal states never move.
pub fn can_transition(from: IntentionStatus, to: IntentionStatus) -> bool {
    use IntentionStatus::*;

    if from.is_terminal() {
        return false;
    }
    if to == Rejected {
        return from != Rejected;
    }

    matches!(
        (from, to),
        (Nascent, Pending)
            | (Pending, Evaluating)
            | (Pending, Abandoned)
            | (Evaluating, Planning)
            | (Evaluating, Pending)
            | (Planning, Reviewing)
            | (Planning, Failed)
            | (Reviewing, AwaitingApproval)
            | (Reviewing, Approved)
            | (Reviewing, Planning)
            | (AwaitingApproval, Approved)
            | (Approved, Executing)
            | (Executing, AwaitingReview)
            | (AwaitingReview, Completed)
            | (AwaitingReview, Pending)
            | (AwaitingReview, Planning)
            | (AwaitingReview, AwaitingApproval)
            | (AwaitingReview, Abandoned)
            | (AwaitingReview, Failed)
            | (Rejected, Pending)
    )
}
