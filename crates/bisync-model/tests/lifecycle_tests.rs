use bisync_model::{validate_transition, BatchStatus, ConflictStatus, Lifecycle};
use proptest::prelude::*;

#[test]
fn test_in_flight_statuses_can_be_obsoleted() {
    for status in BatchStatus::IN_FLIGHT {
        assert!(validate_transition(status, BatchStatus::Obsolete).is_ok(), "{status:?}");
    }
    assert!(validate_transition(BatchStatus::Conflicted, BatchStatus::Obsolete).is_err());
}

#[test]
fn test_finished_statuses_are_terminal() {
    for status in BatchStatus::FINISHED {
        assert!(status.is_terminal(), "{status:?}");
    }
}

fn batch_status() -> impl Strategy<Value = BatchStatus> {
    prop_oneof![
        Just(BatchStatus::Delta),
        Just(BatchStatus::DeltaPending),
        Just(BatchStatus::Pending),
        Just(BatchStatus::InProgress),
        Just(BatchStatus::Completed),
        Just(BatchStatus::Conflicted),
        Just(BatchStatus::Skipped),
        Just(BatchStatus::Obsolete),
    ]
}

fn conflict_status() -> impl Strategy<Value = ConflictStatus> {
    prop_oneof![
        Just(ConflictStatus::Unresolved),
        Just(ConflictStatus::Resolved),
        Just(ConflictStatus::Failed),
        Just(ConflictStatus::ScheduledForRetry),
    ]
}

proptest! {
    #[test]
    fn prop_batch_transitions_match_table(from in batch_status(), to in batch_status()) {
        let res = validate_transition(from, to);
        prop_assert_eq!(res.is_ok(), from.allowed_transitions().contains(&to));
    }

    #[test]
    fn prop_no_batch_self_transitions(status in batch_status()) {
        prop_assert!(validate_transition(status, status).is_err());
    }

    #[test]
    fn prop_conflicts_only_leave_backlog_forward(from in conflict_status(), to in conflict_status()) {
        if validate_transition(from, to).is_ok() {
            prop_assert!(from.is_open());
        }
    }
}
