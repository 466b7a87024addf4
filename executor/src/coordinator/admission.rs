use std::{collections::HashMap, sync::Arc};

use spin::Mutex;

use crate::{
    error::{Error, Scope},
    sandbox::{channel, CancelHandle, CancelListener},
    submission::{Submission, SubmissionId},
};

use super::stage::Stage;

struct Entry {
    cancel: CancelHandle,
    stage: Stage,
}

/// Every admission check and update happens under one lock, so the ceilings
/// hold without a separate counter
#[derive(Default)]
struct Table {
    submitters: HashMap<i64, usize>,
    inflight: HashMap<SubmissionId, Entry>,
}

struct GateInner {
    max_concurrent: usize,
    per_submitter: usize,
    table: Mutex<Table>,
}

/// Non-blocking admission ceiling
///
/// Unlike a semaphore nothing ever waits here: a call over the global or
/// per-submitter ceiling is turned away immediately.
#[derive(Clone)]
pub struct Gate(Arc<GateInner>);

impl Gate {
    /// `per_submitter = 0` disables the per-submitter ceiling
    pub fn new(max_concurrent: usize, per_submitter: usize) -> Self {
        Gate(Arc::new(GateInner {
            max_concurrent,
            per_submitter,
            table: Mutex::new(Table::default()),
        }))
    }
    pub fn admit(&self, submission: &Submission) -> Result<Ticket, Error> {
        let id = submission.id();
        let submitter = submission.submitter();

        let mut table = self.0.table.lock();
        if table.inflight.contains_key(&id) {
            return Err(Error::AlreadyRunning(id));
        }
        let own = table.submitters.get(&submitter).copied().unwrap_or(0);
        if self.0.per_submitter != 0 && own >= self.0.per_submitter {
            return Err(Error::CapacityExceeded(Scope::Submitter(submitter)));
        }
        if table.inflight.len() >= self.0.max_concurrent {
            return Err(Error::CapacityExceeded(Scope::Global));
        }

        *table.submitters.entry(submitter).or_default() += 1;
        let (cancel, listener) = channel();
        table.inflight.insert(
            id,
            Entry {
                cancel,
                stage: Stage::Admitted,
            },
        );

        Ok(Ticket {
            gate: self.clone(),
            id,
            submitter,
            listener: Some(listener),
        })
    }
    /// Request cancellation, false if not in flight or already cancelled
    pub fn cancel(&self, id: SubmissionId) -> bool {
        let table = self.0.table.lock();
        table
            .inflight
            .get(&id)
            .map(|entry| entry.cancel.cancel())
            .unwrap_or(false)
    }
    pub fn stage(&self, id: SubmissionId) -> Option<Stage> {
        self.0.table.lock().inflight.get(&id).map(|entry| entry.stage)
    }
    pub fn running(&self) -> usize {
        self.0.table.lock().inflight.len()
    }
    pub fn max_concurrent(&self) -> usize {
        self.0.max_concurrent
    }
    fn release(&self, id: SubmissionId, submitter: i64) {
        let mut table = self.0.table.lock();
        table.inflight.remove(&id);
        if let Some(count) = table.submitters.get_mut(&submitter) {
            *count -= 1;
            if *count == 0 {
                table.submitters.remove(&submitter);
            }
        }
    }
}

/// Admission of one submission, released on drop
pub struct Ticket {
    gate: Gate,
    id: SubmissionId,
    submitter: i64,
    listener: Option<CancelListener>,
}

impl Ticket {
    /// Move to `stage`, ignoring transitions that would go backward
    pub fn advance(&self, stage: Stage) {
        let mut table = self.gate.0.table.lock();
        if let Some(entry) = table.inflight.get_mut(&self.id) {
            if entry.stage.can_advance(stage) {
                log::trace!("submission {}: {} -> {}", self.id, entry.stage, stage);
                entry.stage = stage;
            } else {
                log::warn!(
                    "submission {}: refused transition {} -> {}",
                    self.id,
                    entry.stage,
                    stage
                );
            }
        }
    }
    /// cancellation listener, only handed out once
    pub fn take_listener(&mut self) -> Option<CancelListener> {
        self.listener.take()
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.gate.release(self.id, self.submitter);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn global_ceiling() {
        let gate = Gate::new(2, 0);
        let a = gate.admit(&Submission::new("", 1)).unwrap();
        let _b = gate.admit(&Submission::new("", 2)).unwrap();
        assert!(matches!(
            gate.admit(&Submission::new("", 3)),
            Err(Error::CapacityExceeded(Scope::Global))
        ));
        drop(a);
        assert_eq!(gate.running(), 1);
        assert!(gate.admit(&Submission::new("", 3)).is_ok());
    }

    #[test]
    fn refusal_takes_nothing() {
        let gate = Gate::new(1, 1);
        let held = gate.admit(&Submission::new("", 1)).unwrap();
        for submitter in [1, 2, 2, 1] {
            assert!(gate.admit(&Submission::new("", submitter)).is_err());
        }
        assert_eq!(gate.running(), 1);
        drop(held);
        assert_eq!(gate.running(), 0);
        // neither refused submitter left a count behind
        let _a = gate.admit(&Submission::new("", 2)).unwrap();
    }

    #[test]
    fn submitter_ceiling() {
        let gate = Gate::new(8, 1);
        let a = gate.admit(&Submission::new("", 1)).unwrap();
        assert!(matches!(
            gate.admit(&Submission::new("", 1)),
            Err(Error::CapacityExceeded(Scope::Submitter(1)))
        ));
        assert!(gate.admit(&Submission::new("", 2)).is_ok());
        drop(a);
        assert!(gate.admit(&Submission::new("", 1)).is_ok());
    }

    #[test]
    fn duplicate_submission() {
        let gate = Gate::new(8, 0);
        let submission = Submission::new("", 1);
        let ticket = gate.admit(&submission).unwrap();
        assert!(matches!(
            gate.admit(&submission),
            Err(Error::AlreadyRunning(id)) if id == submission.id()
        ));
        drop(ticket);
        assert!(gate.admit(&submission).is_ok());
    }

    #[test]
    fn stage_and_cancel() {
        let gate = Gate::new(8, 0);
        let submission = Submission::new("", 1);
        let mut ticket = gate.admit(&submission).unwrap();
        assert_eq!(gate.stage(submission.id()), Some(Stage::Admitted));
        ticket.advance(Stage::Filtering);
        ticket.advance(Stage::Admitted);
        assert_eq!(gate.stage(submission.id()), Some(Stage::Filtering));

        let listener = ticket.take_listener().unwrap();
        assert!(ticket.take_listener().is_none());
        assert!(gate.cancel(submission.id()));
        assert!(!gate.cancel(submission.id()));
        drop(listener);

        drop(ticket);
        assert_eq!(gate.stage(submission.id()), None);
        assert!(!gate.cancel(submission.id()));
    }

    #[test]
    fn concurrent_admission_never_exceeds_ceiling() {
        let gate = Gate::new(4, 0);
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let gate = gate.clone();
                std::thread::spawn(move || gate.admit(&Submission::new("", i)).ok())
            })
            .collect();
        let tickets: Vec<_> = handles
            .into_iter()
            .filter_map(|x| x.join().unwrap())
            .collect();
        assert_eq!(tickets.len(), 4);
        assert_eq!(gate.running(), 4);
        drop(tickets);
        assert_eq!(gate.running(), 0);
    }
}
