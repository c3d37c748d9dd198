//! ScheduleSource port - today's per-league schedule flags.

use async_trait::async_trait;

use crate::domain::{DispatchError, ScheduleInfo};

#[async_trait]
pub trait ScheduleSource: Send + Sync {
    /// Only fails with `DispatchError::Schedule`; a single league's provider
    /// failure degrades that league to "no games" instead.
    async fn get_schedule_info(&self) -> Result<ScheduleInfo, DispatchError>;
}
