use super::{BusError, Delivery, Lane, LaneAssignment, MessageBus, PublishAck, PublishError};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, RwLock, watch};

/// Default number of partitions per topic.
pub const DEFAULT_PARTITIONS: usize = 8;

#[derive(Debug, Clone)]
struct Record {
    key: String,
    payload: Bytes,
}

/// Append-only log for one partition plus per-group committed offsets.
struct Partition {
    log: RwLock<Vec<Record>>,
    /// Current log length, so lanes can wait for new records.
    len_tx: watch::Sender<u64>,
    committed: Mutex<HashMap<String, u64>>,
}

impl Partition {
    fn new() -> Self {
        let (len_tx, _) = watch::channel(0);
        Self {
            log: RwLock::new(Vec::new()),
            len_tx,
            committed: Mutex::new(HashMap::new()),
        }
    }
}

struct Inner {
    partitions: usize,
    topics: RwLock<HashMap<String, Arc<Vec<Arc<Partition>>>>>,
}

/// In-process partitioned message bus.
///
/// Topics are created on first use. Records are kept for the lifetime of the
/// bus. Lanes opened from it end once every clone of the bus is dropped.
#[derive(Clone)]
pub struct InMemoryBus {
    inner: Arc<Inner>,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new(DEFAULT_PARTITIONS)
    }
}

impl InMemoryBus {
    pub fn new(partitions: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                partitions: partitions.max(1),
                topics: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn partitions(&self) -> usize {
        self.inner.partitions
    }

    /// Partition a key is routed to. Stable for the lifetime of the bus.
    pub fn partition_for(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.inner.partitions as u64) as usize
    }

    async fn topic(&self, name: &str) -> Arc<Vec<Arc<Partition>>> {
        if let Some(topic) = self.inner.topics.read().await.get(name) {
            return topic.clone();
        }
        let mut topics = self.inner.topics.write().await;
        topics
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(
                    (0..self.inner.partitions)
                        .map(|_| Arc::new(Partition::new()))
                        .collect(),
                )
            })
            .clone()
    }

    /// Next offset `group` will read on `partition`, if it has committed anything.
    pub async fn committed_offset(&self, topic: &str, group: &str, partition: usize) -> Option<u64> {
        let topic = self.inner.topics.read().await.get(topic).cloned()?;
        let partition = topic.get(partition)?;
        partition.committed.lock().await.get(group).copied()
    }

    /// Total number of records ever published to `topic`.
    pub async fn published_count(&self, topic: &str) -> usize {
        let Some(topic) = self.inner.topics.read().await.get(topic).cloned() else {
            return 0;
        };
        let mut count = 0;
        for partition in topic.iter() {
            count += partition.log.read().await.len();
        }
        count
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: Bytes,
    ) -> Result<PublishAck, PublishError> {
        let index = self.partition_for(key);
        let partitions = self.topic(topic).await;
        let partition = partitions
            .get(index)
            .ok_or_else(|| PublishError::Unavailable(format!("partition {index} missing")))?;

        let mut log = partition.log.write().await;
        let offset = log.len() as u64;
        log.push(Record {
            key: key.to_string(),
            payload,
        });
        partition.len_tx.send_replace(offset + 1);

        Ok(PublishAck {
            topic: topic.to_string(),
            partition: index,
            offset,
        })
    }

    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
        assignment: LaneAssignment,
    ) -> Result<Vec<Box<dyn Lane>>, BusError> {
        if !assignment.is_valid() {
            return Err(BusError::InvalidAssignment {
                member: assignment.member,
                members: assignment.members,
            });
        }

        let partitions = self.topic(topic).await;
        let mut lanes: Vec<Box<dyn Lane>> = Vec::new();
        for (index, partition) in partitions.iter().enumerate() {
            if !assignment.owns(index) {
                continue;
            }
            let position = partition
                .committed
                .lock()
                .await
                .get(group)
                .copied()
                .unwrap_or(0);
            lanes.push(Box::new(MemoryLane {
                topic: topic.to_string(),
                group: group.to_string(),
                index,
                partition: Arc::downgrade(partition),
                len_rx: partition.len_tx.subscribe(),
                position,
            }));
        }
        Ok(lanes)
    }
}

struct MemoryLane {
    topic: String,
    group: String,
    index: usize,
    partition: Weak<Partition>,
    len_rx: watch::Receiver<u64>,
    /// Offset of the next delivery to hand out.
    position: u64,
}

#[async_trait]
impl Lane for MemoryLane {
    fn partition(&self) -> usize {
        self.index
    }

    async fn recv(&mut self) -> Option<Delivery> {
        let position = self.position;
        if self.len_rx.wait_for(|len| *len > position).await.is_err() {
            return None;
        }
        let partition = self.partition.upgrade()?;
        let log = partition.log.read().await;
        let record = log.get(position as usize)?;
        Some(Delivery {
            topic: self.topic.clone(),
            partition: self.index,
            offset: position,
            key: record.key.clone(),
            payload: record.payload.clone(),
        })
    }

    async fn commit(&mut self, delivery: &Delivery) -> Result<(), BusError> {
        if delivery.partition != self.index || delivery.offset != self.position {
            return Err(BusError::CommitOutOfOrder {
                partition: self.index,
                expected: self.position,
                got: delivery.offset,
            });
        }
        let partition = self
            .partition
            .upgrade()
            .ok_or_else(|| BusError::Unavailable("bus dropped".to_string()))?;
        self.position += 1;
        partition
            .committed
            .lock()
            .await
            .insert(self.group.clone(), self.position);
        Ok(())
    }
}
