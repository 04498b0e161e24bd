//! Message bus port.
//!
//! A topic is split into ordered partitions. Messages are routed to a
//! partition by key, so everything published under one key is seen in publish
//! order by whichever consumer owns that partition.
//!
//! Delivery is at-least-once. A [`Lane`] keeps handing out the same delivery
//! until it is committed, and a fresh subscriber of the same group resumes
//! from the last committed offset.

pub mod codec;
mod memory;

pub use codec::{ParseError, decode, encode};
pub use memory::InMemoryBus;

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// One message handed to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub partition: usize,
    pub offset: u64,
    pub key: String,
    pub payload: Bytes,
}

/// Where a published message landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishAck {
    pub topic: String,
    pub partition: usize,
    pub offset: u64,
}

/// Which partitions of a topic a group member consumes.
///
/// Member `m` of `n` owns every partition `p` with `p % n == m`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneAssignment {
    pub member: usize,
    pub members: usize,
}

impl LaneAssignment {
    /// The only member of its group: owns every partition.
    pub const SOLE: LaneAssignment = LaneAssignment {
        member: 0,
        members: 1,
    };

    pub fn is_valid(&self) -> bool {
        self.members > 0 && self.member < self.members
    }

    pub fn owns(&self, partition: usize) -> bool {
        self.members > 0 && partition % self.members == self.member
    }
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("bus unavailable: {0}")]
    Unavailable(String),

    #[error("publish timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    /// The publishing worker is no longer running.
    #[error("publisher closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("invalid lane assignment: member {member} of {members}")]
    InvalidAssignment { member: usize, members: usize },

    #[error("commit out of order on partition {partition}: expected offset {expected}, got {got}")]
    CommitOutOfOrder {
        partition: usize,
        expected: u64,
        got: u64,
    },

    #[error("bus unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: Bytes,
    ) -> Result<PublishAck, PublishError>;

    /// Open one lane per partition owned by `assignment` within `group`.
    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
        assignment: LaneAssignment,
    ) -> Result<Vec<Box<dyn Lane>>, BusError>;
}

/// A single ordered partition, consumed on behalf of one group.
#[async_trait]
pub trait Lane: Send {
    fn partition(&self) -> usize;

    /// Next uncommitted delivery, or `None` once the bus is gone.
    ///
    /// Cancel safe: dropping the future leaves the lane position untouched.
    async fn recv(&mut self) -> Option<Delivery>;

    /// Acknowledge `delivery` and move past it.
    async fn commit(&mut self, delivery: &Delivery) -> Result<(), BusError>;
}

pub type MessageBusRef = Arc<dyn MessageBus>;
