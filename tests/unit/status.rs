//! Unit tests for status transitions and two-phase deletion

use std::time::Duration;

use pg_object_operator::controller::status::{
    PENDING_REQUEUE, RESYNC_INTERVAL, finalizers_with, finalizers_without, has_finalizer,
    status_patch,
};
use pg_object_operator::controller::{
    CleanupStep, FINALIZER, Outcome, cleanup_step, mark_deleting, transition,
};
use pg_object_operator::crd::{ManagedStatus, Phase, ReclaimPolicy};

use crate::common::*;

const ERROR_REQUEUE: Duration = Duration::from_secs(60);

fn probe(previous: Option<&ManagedStatus>, generation: i64) -> ManagedStatus {
    ManagedStatus::probe(previous, "object".to_string(), Some(generation), at(100))
}

mod transition_tests {
    use super::*;

    #[test]
    fn test_first_convergence_becomes_ready() {
        let next = transition(
            None,
            probe(None, 1),
            Outcome::Applied(None),
            ERROR_REQUEUE,
            at(100),
        );
        let status = next.status.unwrap();
        assert_eq!(status.phase, Phase::Ready);
        assert_eq!(status.message, None);
        assert_eq!(status.observed_generation, Some(1));
        assert_eq!(next.requeue_after, RESYNC_INTERVAL);
    }

    #[test]
    fn test_steady_state_skips_write() {
        let previous = status(Phase::Ready, 3, None);
        let next = transition(
            Some(&previous),
            probe(Some(&previous), 3),
            Outcome::Converged(None),
            ERROR_REQUEUE,
            at(100),
        );
        assert_eq!(next.status, None);
        assert_eq!(next.requeue_after, RESYNC_INTERVAL);
    }

    #[test]
    fn test_new_generation_is_recorded() {
        let previous = status(Phase::Ready, 3, None);
        let next = transition(
            Some(&previous),
            probe(Some(&previous), 4),
            Outcome::Converged(None),
            ERROR_REQUEUE,
            at(100),
        );
        let status = next.status.unwrap();
        assert_eq!(status.observed_generation, Some(4));
        assert_eq!(
            status.last_phase_transition_time,
            previous.last_phase_transition_time
        );
    }

    #[test]
    fn test_converged_keeps_previous_message() {
        let previous = status(
            Phase::Ready,
            2,
            Some("Database owner changed [previousOwner=a, newOwner=b]"),
        );
        let next = transition(
            Some(&previous),
            probe(Some(&previous), 3),
            Outcome::Converged(None),
            ERROR_REQUEUE,
            at(100),
        );
        assert_eq!(next.status.unwrap().message, previous.message);
    }

    #[test]
    fn test_recovery_from_error_clears_message() {
        let previous = status(Phase::Error, 2, Some("connection refused"));
        let next = transition(
            Some(&previous),
            probe(Some(&previous), 2),
            Outcome::Converged(None),
            ERROR_REQUEUE,
            at(100),
        );
        let status = next.status.unwrap();
        assert_eq!(status.phase, Phase::Ready);
        assert_eq!(status.message, None);
        assert_ne!(
            status.last_phase_transition_time,
            previous.last_phase_transition_time
        );
    }

    #[test]
    fn test_pending_requeues_after_a_minute() {
        let next = transition(
            None,
            probe(None, 1),
            Outcome::Pending("The specified ClusterConnection does not exist or is not ready yet [resource=apps/main]".into()),
            ERROR_REQUEUE,
            at(100),
        );
        assert_eq!(next.status.unwrap().phase, Phase::Pending);
        assert_eq!(next.requeue_after, PENDING_REQUEUE);
    }

    #[test]
    fn test_failure_uses_kind_requeue() {
        let next = transition(
            None,
            probe(None, 1),
            Outcome::Failed("permission denied".into()),
            Duration::from_secs(30),
            at(100),
        );
        let status = next.status.unwrap();
        assert_eq!(status.phase, Phase::Error);
        assert_eq!(status.message.as_deref(), Some("permission denied"));
        assert_eq!(next.requeue_after, Duration::from_secs(30));
    }

    #[test]
    fn test_repeated_failure_skips_write() {
        let first = transition(
            None,
            probe(None, 2),
            Outcome::Failed("connection refused".into()),
            ERROR_REQUEUE,
            at(100),
        )
        .status
        .unwrap();

        let later = ManagedStatus::probe(Some(&first), "object".to_string(), Some(2), at(110));
        let next = transition(
            Some(&first),
            later,
            Outcome::Failed("connection refused".into()),
            ERROR_REQUEUE,
            at(110),
        );
        assert_eq!(next.status, None);
        assert_eq!(next.requeue_after, ERROR_REQUEUE);
    }

    #[test]
    fn test_repeated_pending_skips_write() {
        let message = "The specified ClusterConnection does not exist or is not ready yet [resource=apps/main]";
        let previous = status(Phase::Pending, 1, Some(message));
        let next = transition(
            Some(&previous),
            probe(Some(&previous), 1),
            Outcome::Pending(message.into()),
            ERROR_REQUEUE,
            at(100),
        );
        assert_eq!(next.status, None);
        assert_eq!(next.requeue_after, PENDING_REQUEUE);
    }

    #[test]
    fn test_changed_failure_message_is_written() {
        let previous = status(Phase::Error, 1, Some("connection refused"));
        let next = transition(
            Some(&previous),
            probe(Some(&previous), 1),
            Outcome::Failed("password authentication failed".into()),
            ERROR_REQUEUE,
            at(100),
        );
        let status = next.status.unwrap();
        assert_eq!(status.message.as_deref(), Some("password authentication failed"));
        assert_eq!(
            status.last_phase_transition_time,
            previous.last_phase_transition_time
        );
    }
}

mod deletion_tests {
    use super::*;

    #[test]
    fn test_first_pass_marks_deleting() {
        assert_eq!(cleanup_step(Phase::Ready, true), CleanupStep::MarkDeleting);
        assert_eq!(cleanup_step(Phase::Error, false), CleanupStep::MarkDeleting);
        assert_eq!(cleanup_step(Phase::Pending, true), CleanupStep::MarkDeleting);
    }

    #[test]
    fn test_second_pass_drops_or_releases() {
        assert_eq!(cleanup_step(Phase::Deleting, true), CleanupStep::Drop);
        assert_eq!(cleanup_step(Phase::Deleting, false), CleanupStep::Release);
    }

    #[test]
    fn test_mark_deleting_announces_drop() {
        let mut status = status(Phase::Ready, 1, None);
        mark_deleting(&mut status, "Database", true, at(100));
        assert_eq!(status.phase, Phase::Deleting);
        assert_eq!(status.message.as_deref(), Some("Database deletion in progress"));
    }

    #[test]
    fn test_mark_deleting_retain_keeps_message() {
        let mut status = status(Phase::Ready, 1, Some("Database owner changed"));
        mark_deleting(&mut status, "Database", false, at(100));
        assert_eq!(status.phase, Phase::Deleting);
        assert_eq!(status.message.as_deref(), Some("Database owner changed"));
    }

    #[test]
    fn test_finalizer_helpers_keep_foreign_finalizers() {
        let mut db = database("orders", None, ReclaimPolicy::Retain);
        db.metadata.finalizers = Some(vec!["example.com/backup".to_string()]);
        assert!(!has_finalizer(&db));

        let with = finalizers_with(&db);
        assert_eq!(with, vec!["example.com/backup".to_string(), FINALIZER.to_string()]);

        db.metadata.finalizers = Some(with);
        assert!(has_finalizer(&db));
        assert_eq!(finalizers_with(&db).len(), 2);
        assert_eq!(
            finalizers_without(&db),
            vec!["example.com/backup".to_string()]
        );
    }
}

mod patch_tests {
    use super::*;

    #[test]
    fn test_status_patch_clears_absent_fields() {
        let status = ManagedStatus {
            name: "orders".into(),
            phase: Phase::Ready,
            ..Default::default()
        };
        let patch = status_patch(&status).unwrap();

        assert_eq!(patch["status"]["phase"], "READY");
        assert_eq!(patch["status"]["name"], "orders");
        assert!(patch["status"]["message"].is_null());
        assert!(patch["status"]["observedGeneration"].is_null());
        assert!(
            patch["status"]
                .as_object()
                .unwrap()
                .contains_key("lastPhaseTransitionTime")
        );
    }
}
