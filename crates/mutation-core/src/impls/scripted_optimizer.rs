//! ScriptedOptimizer - LineupOptimizer fake.
//!
//! Succeeds by default and records every request. A queue of scripted
//! failures is consumed one per call, across all three operations.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use crate::domain::UpstreamError;
use crate::ports::{
    LineupOptimizer, LineupReport, LineupRequest, TransactionReport, TransactionRequest,
};

#[derive(Default)]
struct Inner {
    failures: VecDeque<UpstreamError>,
    lineup_requests: Vec<LineupRequest>,
    transaction_requests: Vec<TransactionRequest>,
    scarcity_requests: Vec<(String, String)>,
}

#[derive(Default)]
pub struct ScriptedOptimizer {
    inner: Mutex<Inner>,
}

impl ScriptedOptimizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fail the next call with `error`.
    pub fn fail_next(&self, error: UpstreamError) {
        self.lock().failures.push_back(error);
    }

    pub fn lineup_requests(&self) -> Vec<LineupRequest> {
        self.lock().lineup_requests.clone()
    }

    pub fn transaction_requests(&self) -> Vec<TransactionRequest> {
        self.lock().transaction_requests.clone()
    }

    pub fn scarcity_requests(&self) -> Vec<(String, String)> {
        self.lock().scarcity_requests.clone()
    }

    pub fn total_calls(&self) -> usize {
        let inner = self.lock();
        inner.lineup_requests.len()
            + inner.transaction_requests.len()
            + inner.scarcity_requests.len()
    }
}

#[async_trait]
impl LineupOptimizer for ScriptedOptimizer {
    async fn set_lineups(&self, request: &LineupRequest) -> Result<LineupReport, UpstreamError> {
        let mut inner = self.lock();
        inner.lineup_requests.push(request.clone());
        if let Some(error) = inner.failures.pop_front() {
            return Err(error);
        }
        Ok(LineupReport {
            updated_team_keys: request.teams.iter().map(|t| t.team_key.clone()).collect(),
            changes: Vec::new(),
        })
    }

    async fn process_transactions(
        &self,
        request: &TransactionRequest,
    ) -> Result<TransactionReport, UpstreamError> {
        let mut inner = self.lock();
        inner.transaction_requests.push(request.clone());
        match inner.failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(TransactionReport::default()),
        }
    }

    async fn recalculate_positional_scarcity(
        &self,
        uid: &str,
        league_key: &str,
    ) -> Result<(), UpstreamError> {
        let mut inner = self.lock();
        inner
            .scarcity_requests
            .push((uid.to_string(), league_key.to_string()));
        match inner.failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
