// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-memory job table.
//!
//! One `RwLock` guards the whole map. Each read or write of a job happens
//! under the lock, so pollers never observe a half-updated record. Entries
//! live until the process exits.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::types::{Job, JobState, COMPLETE_PROGRESS, FAILED_PROGRESS, MAX_RUNNING_PROGRESS};

/// Concurrent map from job id to job record.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<String, Job>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new job. Returns false, leaving the store untouched, if the id is taken.
    pub fn insert(&self, job: Job) -> bool {
        let mut jobs = resilient_write(&self.jobs);
        if jobs.contains_key(&job.job_id) {
            return false;
        }
        jobs.insert(job.job_id.clone(), job);
        true
    }

    /// Snapshot of a job.
    pub fn get(&self, job_id: &str) -> Option<Job> {
        resilient_read(&self.jobs).get(job_id).cloned()
    }

    /// Stored progress, or 0 for unknown ids.
    pub fn progress(&self, job_id: &str) -> i32 {
        resilient_read(&self.jobs)
            .get(job_id)
            .map(|job| job.progress_percent)
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        resilient_read(&self.jobs).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Move a non-terminal job to `Running`.
    pub fn mark_running(&self, job_id: &str) {
        self.update(job_id, |job| {
            job.state = JobState::Running;
        });
    }

    /// Record a parsed percentage for a running job.
    ///
    /// The stored value never decreases and stays at or below 99 until the
    /// job succeeds.
    pub fn record_progress(&self, job_id: &str, percent: u32) {
        let percent = i32::try_from(percent)
            .unwrap_or(i32::MAX)
            .min(MAX_RUNNING_PROGRESS);
        self.update(job_id, |job| {
            if job.state == JobState::Running && percent > job.progress_percent {
                job.progress_percent = percent;
            }
        });
    }

    pub fn mark_succeeded(&self, job_id: &str) {
        self.update(job_id, |job| {
            job.state = JobState::Succeeded;
            job.progress_percent = COMPLETE_PROGRESS;
        });
    }

    pub fn mark_failed(&self, job_id: &str, reason: impl Into<String>) {
        let reason = reason.into();
        self.update(job_id, |job| {
            job.state = JobState::Failed;
            job.progress_percent = FAILED_PROGRESS;
            job.error = Some(reason);
        });
    }

    /// Apply `f` to a job unless it is unknown or already terminal.
    fn update<F>(&self, job_id: &str, f: F)
    where
        F: FnOnce(&mut Job),
    {
        let mut jobs = resilient_write(&self.jobs);
        match jobs.get_mut(job_id) {
            Some(job) if !job.is_terminal() => {
                f(job);
                job.updated_at = Utc::now();
            }
            Some(_) => {
                tracing::debug!(job_id = %job_id, "Ignoring update to finished job");
            }
            None => {
                tracing::warn!(job_id = %job_id, "Update for unknown job");
            }
        }
    }
}

// =============================================================================
// Lock helpers
// =============================================================================

/// A panicking writer leaves the map intact (every update is a single
/// assignment), so a poisoned lock is recovered rather than propagated.
fn resilient_read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| {
        tracing::error!(event = "LOCK_POISONED_READ", "Job store lock was poisoned, recovering");
        poisoned.into_inner()
    })
}

fn resilient_write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| {
        tracing::error!(event = "LOCK_POISONED_WRITE", "Job store lock was poisoned, recovering");
        poisoned.into_inner()
    })
}
