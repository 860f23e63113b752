use std::marker::PhantomData;

use crate::error::{ExecutionError, ExecutionResult};

/// Identifies a worker handle in the pool, in the order the hosts were declared.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct WorkerId(u64);

impl From<u64> for WorkerId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<WorkerId> for u64 {
    fn from(id: WorkerId) -> Self {
        id.0
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
pub struct IdGenerator<T> {
    next_value: u64,
    phantom: PhantomData<T>,
}

impl<T: From<u64>> Default for IdGenerator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: From<u64>> IdGenerator<T> {
    pub fn new() -> Self {
        Self {
            next_value: 1,
            phantom: PhantomData,
        }
    }

    pub fn next(&mut self) -> ExecutionResult<T> {
        let value = self.next_value;
        self.next_value = value
            .checked_add(1)
            .ok_or_else(|| ExecutionError::InternalError("ID overflow".to_string()))?;
        Ok(value.into())
    }
}
