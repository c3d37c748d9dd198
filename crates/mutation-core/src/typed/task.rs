//! MutationPayload trait - ties a payload struct to its [`MutationType`].

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::{
    MutationType, PositionalScarcityPayload, SetLineupPayload, WeeklyTransactionsPayload,
};

/// A payload that can be decoded from `MutationTask::payload`.
///
/// # Usage
/// ```ignore
/// impl MutationPayload for SetLineupPayload {
///     const TYPE: MutationType = MutationType::SetLineup;
/// }
/// ```
///
/// `DeserializeOwned + 'static` lets handlers be stored behind `Arc`.
pub trait MutationPayload: Serialize + DeserializeOwned + Send + Sync + 'static {
    const TYPE: MutationType;
}

impl MutationPayload for SetLineupPayload {
    const TYPE: MutationType = MutationType::SetLineup;
}

impl MutationPayload for WeeklyTransactionsPayload {
    const TYPE: MutationType = MutationType::WeeklyTransactions;
}

impl MutationPayload for PositionalScarcityPayload {
    const TYPE: MutationType = MutationType::CalcPositionalScarcity;
}
