use crate::id::RequestId;

/// A unit of work sent from the pool to an individual worker thread.
///
/// Jobs travel over bounded channels and are consumed by the worker's
/// receive loop. There is no explicit shutdown message: stopping the pool
/// cancels the shared token and drops every sender, which ends the loop.
#[derive(Debug)]
pub(crate) struct Job {
    pub id: RequestId,
    pub input: Vec<u8>,
}
