use super::*;
use crate::events::EventKind;
use crate::job::{FailureKind, Stage};

fn store() -> QueueStore {
    QueueStore::new(Publisher::new())
}

fn job(n: usize) -> NewJob {
    NewJob::new(format!("https://example.com/{n}.flac"), format!("{n}.flac"))
}

fn transient() -> JobError {
    JobError::transient(Stage::Fetch, "connection reset")
}

#[test]
fn submit_assigns_increasing_ids_in_fifo_order() {
    let s = store();
    let ids: Vec<JobId> = (0..5).map(|n| s.submit(job(n)).unwrap()).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    let listed: Vec<JobId> = s
        .list_by_state(JobState::Queued)
        .unwrap()
        .into_iter()
        .map(|j| j.id)
        .collect();
    assert_eq!(listed, ids);
}

#[test]
fn submit_rejects_empty_fields_without_inserting() {
    let s = store();
    let err = s.submit(NewJob::new("", "out.flac")).unwrap_err();
    assert!(matches!(err, QueueError::InvalidInput(_)));
    assert!(s.is_empty().unwrap());
}

#[test]
fn get_unknown_is_not_found() {
    assert_eq!(store().get(42), Err(QueueError::NotFound(42)));
}

#[test]
fn transition_is_compare_and_swap() {
    let s = store();
    let id = s.submit(job(0)).unwrap();
    let err = s
        .transition(id, JobState::Paused, JobState::Queued)
        .unwrap_err();
    assert_eq!(
        err,
        QueueError::Conflict {
            id,
            expected: JobState::Paused,
            actual: JobState::Queued,
            requested: JobState::Queued,
        }
    );
    assert_eq!(s.get(id).unwrap().state, JobState::Queued);

    s.transition(id, JobState::Queued, JobState::Paused).unwrap();
    assert!(s.transition(id, JobState::Queued, JobState::Paused).is_err());
}

#[test]
fn disallowed_edge_is_conflict() {
    let s = store();
    let id = s.submit(job(0)).unwrap();
    s.start_attempt(id).unwrap();
    s.complete(id, "done.flac".into()).unwrap();
    assert!(matches!(
        s.transition(id, JobState::Completed, JobState::Active),
        Err(QueueError::Conflict { .. })
    ));
}

#[test]
fn fresh_start_counts_attempt_and_resume_does_not() {
    let s = store();
    let id = s.submit(job(0)).unwrap();

    let admitted = s.start_attempt(id).unwrap();
    assert!(!admitted.resumed);
    assert_eq!(admitted.job.attempt, 1);

    s.begin_transfer(id, 0, Some(100)).unwrap();
    s.update_progress(id, 40, None).unwrap();
    s.pause_active(id).unwrap();
    s.transition(id, JobState::Paused, JobState::Queued).unwrap();

    let admitted = s.start_attempt(id).unwrap();
    assert!(admitted.resumed);
    assert_eq!(admitted.job.attempt, 1);
    assert_eq!(admitted.job.progress_bytes, 40);
    assert_eq!(admitted.job.total_bytes, Some(100));
}

#[test]
fn requeue_starts_next_attempt_from_zero() {
    let s = store();
    let id = s.submit(job(0)).unwrap();
    s.start_attempt(id).unwrap();
    s.begin_transfer(id, 0, Some(100)).unwrap();
    s.update_progress(id, 60, None).unwrap();
    let requeued = s.requeue(id, transient(), Some(5)).unwrap();
    assert_eq!(requeued.state, JobState::Queued);
    assert_eq!(requeued.progress_bytes, 0);
    assert_eq!(requeued.retry_at, Some(5));
    assert_eq!(requeued.last_error.unwrap().kind, FailureKind::Transient);

    let admitted = s.start_attempt(id).unwrap();
    assert_eq!(admitted.job.attempt, 2);
    assert_eq!(admitted.job.retry_at, None);
}

#[test]
fn abort_start_rolls_back_attempt() {
    let s = store();
    let id = s.submit(job(0)).unwrap();
    let admitted = s.start_attempt(id).unwrap();
    let job = s
        .abort_start(
            id,
            admitted.resumed,
            JobError::transient(Stage::Start, "no staging dir"),
            None,
        )
        .unwrap();
    assert_eq!(job.state, JobState::Queued);
    assert_eq!(job.attempt, 0);
}

#[test]
fn abort_start_keeps_resumed_attempt_resumable() {
    let s = store();
    let id = s.submit(job(0)).unwrap();
    s.start_attempt(id).unwrap();
    s.begin_transfer(id, 0, Some(10)).unwrap();
    s.update_progress(id, 4, None).unwrap();
    s.pause_active(id).unwrap();
    s.transition(id, JobState::Paused, JobState::Queued).unwrap();
    let admitted = s.start_attempt(id).unwrap();
    let job = s
        .abort_start(id, admitted.resumed, transient(), None)
        .unwrap();
    assert_eq!(job.attempt, 1);
    assert!(job.resume_pending);
    assert_eq!(job.progress_bytes, 4);
}

#[test]
fn progress_never_decreases_or_exceeds_total() {
    let s = store();
    let id = s.submit(job(0)).unwrap();
    s.update_progress(id, 10, None).unwrap();
    assert_eq!(s.get(id).unwrap().progress_bytes, 0, "ignored while Queued");

    s.start_attempt(id).unwrap();
    s.begin_transfer(id, 0, Some(100)).unwrap();
    s.update_progress(id, 50, None).unwrap();
    s.update_progress(id, 30, None).unwrap();
    assert_eq!(s.get(id).unwrap().progress_bytes, 50);
    s.update_progress(id, 500, None).unwrap();
    assert_eq!(s.get(id).unwrap().progress_bytes, 100);
}

#[test]
fn restarted_stream_keeps_recorded_progress_until_it_passes_it() {
    let s = store();
    let id = s.submit(job(0)).unwrap();
    s.start_attempt(id).unwrap();
    s.begin_transfer(id, 0, Some(100)).unwrap();
    s.update_progress(id, 40, None).unwrap();
    s.pause_active(id).unwrap();
    s.transition(id, JobState::Paused, JobState::Queued).unwrap();
    s.start_attempt(id).unwrap();

    let job = s.begin_transfer(id, 0, Some(100)).unwrap();
    assert_eq!(job.progress_bytes, 40);
    assert_eq!(job.attempt, 1);
    s.update_progress(id, 20, None).unwrap();
    assert_eq!(s.get(id).unwrap().progress_bytes, 40);
    s.update_progress(id, 70, None).unwrap();
    assert_eq!(s.get(id).unwrap().progress_bytes, 70);
}

#[test]
fn remove_only_finished_jobs() {
    let s = store();
    let id = s.submit(job(0)).unwrap();
    assert!(matches!(s.remove(id), Err(QueueError::Conflict { .. })));
    s.transition(id, JobState::Queued, JobState::Cancelled)
        .unwrap();
    s.remove(id).unwrap();
    assert_eq!(s.get(id), Err(QueueError::NotFound(id)));
    assert_eq!(s.remove(id), Err(QueueError::NotFound(id)));
}

#[test]
fn retry_resets_failed_job() {
    let s = store();
    let id = s.submit(job(0)).unwrap();
    s.start_attempt(id).unwrap();
    s.fail(id, JobError::permanent(Stage::Fetch, "404")).unwrap();
    let job = s.retry(id).unwrap();
    assert_eq!(job.state, JobState::Queued);
    assert_eq!(job.attempt, 0);
    assert!(job.last_error.is_none());
}

#[test]
fn restore_requeues_active_with_attempt_unchanged() {
    let mut active = Job::from_new(7, job(7), 0);
    active.state = JobState::Active;
    active.attempt = 2;
    active.progress_bytes = 33;
    let mut done = Job::from_new(3, job(3), 0);
    done.state = JobState::Completed;

    let s = QueueStore::restore(Publisher::new(), vec![active, done], 5);
    let j = s.get(7).unwrap();
    assert_eq!(j.state, JobState::Queued);
    assert_eq!(j.attempt, 2);
    assert!(j.resume_pending);
    assert_eq!(s.next_id().unwrap(), 8);
    assert_eq!(s.submit(job(8)).unwrap(), 8);
}

#[test]
fn events_follow_mutation_order() {
    let publisher = Publisher::new();
    let sub = publisher.subscribe(64);
    let s = QueueStore::new(publisher);
    let id = s.submit(job(0)).unwrap();
    s.start_attempt(id).unwrap();
    s.begin_transfer(id, 0, Some(10)).unwrap();
    s.update_progress(id, 5, None).unwrap();
    s.update_progress(id, 5, None).unwrap();
    s.complete(id, "x.flac".into()).unwrap();
    s.remove(id).unwrap();

    let seen: Vec<(EventKind, JobState, u64)> = std::iter::from_fn(|| sub.try_recv())
        .map(|e| (e.kind, e.state, e.progress_bytes))
        .collect();
    assert_eq!(
        seen,
        vec![
            (EventKind::State, JobState::Queued, 0),
            (EventKind::State, JobState::Active, 0),
            (EventKind::Progress, JobState::Active, 0),
            (EventKind::Progress, JobState::Active, 5),
            (EventKind::State, JobState::Completed, 10),
            (EventKind::Removed, JobState::Completed, 10),
        ]
    );
}

#[test]
fn poisoned_lock_is_system_fault() {
    let s = store();
    let inner = Arc::clone(&s.inner);
    let _ = std::thread::spawn(move || {
        let _guard = inner.lock().unwrap();
        panic!("poison");
    })
    .join();
    assert!(matches!(s.submit(job(0)), Err(QueueError::SystemFault(_))));
    assert!(matches!(s.get(1), Err(QueueError::SystemFault(_))));
}

#[test]
fn next_retry_at_ignores_due_and_non_queued_jobs() {
    let s = store();
    let a = s.submit(job(0)).unwrap();
    let b = s.submit(job(1)).unwrap();
    let c = s.submit(job(2)).unwrap();
    for id in [a, b, c] {
        s.start_attempt(id).unwrap();
    }
    s.requeue(a, transient(), Some(100)).unwrap();
    s.requeue(b, transient(), Some(300)).unwrap();
    s.requeue(c, transient(), Some(200)).unwrap();
    s.transition(c, JobState::Queued, JobState::Paused).unwrap();

    assert_eq!(s.next_retry_at(0).unwrap(), Some(100));
    assert_eq!(s.next_retry_at(100).unwrap(), Some(300));
    assert_eq!(s.next_retry_at(300).unwrap(), None);
}
