use leadscout_core::Stage;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use tokio::sync::Notify;
use uuid::Uuid;

/// The three queue lanes.
///
/// Job control flows through its own lane so a burst of task work can
/// never starve job starts, and the two stages are isolated from each
/// other so slow enrichment cannot back up discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    /// Job lifecycle items, consumed by the engine loop.
    Jobs,
    /// Discovery tasks.
    Discovery,
    /// Enrichment tasks.
    Enrichment,
}

impl Lane {
    /// Lane a stage's tasks run in.
    pub fn for_stage(stage: Stage) -> Lane {
        match stage {
            Stage::Discovery => Lane::Discovery,
            Stage::Enrichment => Lane::Enrichment,
        }
    }
}

impl std::fmt::Display for Lane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lane::Jobs => write!(f, "jobs"),
            Lane::Discovery => write!(f, "discovery"),
            Lane::Enrichment => write!(f, "enrichment"),
        }
    }
}

/// One unit of queued work. Only identifiers travel through the queue;
/// the job store stays authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkItem {
    /// Begin the pipeline for a queued job.
    StartJob(Uuid),
    /// Execute one task.
    RunTask(Uuid),
}

/// Queue depth per lane, for the stats endpoint.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct QueueDepths {
    /// Items waiting in the jobs lane.
    pub jobs: usize,
    /// Items waiting in the discovery lane.
    pub discovery: usize,
    /// Items waiting in the enrichment lane.
    pub enrichment: usize,
}

#[derive(Default)]
struct LaneQueue {
    items: Mutex<VecDeque<WorkItem>>,
    notify: Notify,
}

impl LaneQueue {
    fn push(&self, item: WorkItem) {
        self.items.lock().push_back(item);
        self.notify.notify_one();
    }

    /// Pop the next item, waiting when the lane is empty.
    ///
    /// `Notify` hands one permit to one waiter per `notify_one`, so after a
    /// successful pop the consumer wakes a sibling if work remains; a burst
    /// of pushes then cascades through all idle consumers.
    async fn pull(&self) -> WorkItem {
        loop {
            {
                let mut items = self.items.lock();
                if let Some(item) = items.pop_front() {
                    if !items.is_empty() {
                        self.notify.notify_one();
                    }
                    return item;
                }
            }
            self.notify.notified().await;
        }
    }

    fn len(&self) -> usize {
        self.items.lock().len()
    }
}

/// A multi-lane in-process work queue.
///
/// FIFO per lane. Safe to share by reference from any number of producer
/// and consumer tasks.
#[derive(Default)]
pub struct TaskQueue {
    jobs: LaneQueue,
    discovery: LaneQueue,
    enrichment: LaneQueue,
}

impl TaskQueue {
    /// An empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    fn lane(&self, lane: Lane) -> &LaneQueue {
        match lane {
            Lane::Jobs => &self.jobs,
            Lane::Discovery => &self.discovery,
            Lane::Enrichment => &self.enrichment,
        }
    }

    /// Enqueue an item on a lane.
    pub fn push(&self, lane: Lane, item: WorkItem) {
        self.lane(lane).push(item);
    }

    /// Dequeue the next item from a lane, waiting for one to arrive.
    pub async fn pull(&self, lane: Lane) -> WorkItem {
        self.lane(lane).pull().await
    }

    /// Items currently waiting in a lane.
    pub fn len(&self, lane: Lane) -> usize {
        self.lane(lane).len()
    }

    /// Whether all lanes are empty.
    pub fn is_empty(&self) -> bool {
        self.jobs.len() == 0 && self.discovery.len() == 0 && self.enrichment.len() == 0
    }

    /// Depth of every lane.
    pub fn depths(&self) -> QueueDepths {
        QueueDepths {
            jobs: self.jobs.len(),
            discovery: self.discovery.len(),
            enrichment: self.enrichment.len(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fifo_within_a_lane() {
        let queue = TaskQueue::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        queue.push(Lane::Discovery, WorkItem::RunTask(a));
        queue.push(Lane::Discovery, WorkItem::RunTask(b));

        assert_eq!(queue.pull(Lane::Discovery).await, WorkItem::RunTask(a));
        assert_eq!(queue.pull(Lane::Discovery).await, WorkItem::RunTask(b));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_lanes_are_independent() {
        let queue = TaskQueue::new();
        let job = Uuid::new_v4();
        let task = Uuid::new_v4();
        queue.push(Lane::Jobs, WorkItem::StartJob(job));
        queue.push(Lane::Enrichment, WorkItem::RunTask(task));

        let depths = queue.depths();
        assert_eq!(depths.jobs, 1);
        assert_eq!(depths.discovery, 0);
        assert_eq!(depths.enrichment, 1);

        // pulling one lane does not touch the other
        assert_eq!(queue.pull(Lane::Enrichment).await, WorkItem::RunTask(task));
        assert_eq!(queue.len(Lane::Jobs), 1);
    }

    #[tokio::test]
    async fn test_pull_wakes_on_later_push() {
        let queue = Arc::new(TaskQueue::new());
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pull(Lane::Discovery).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!consumer.is_finished());

        let id = Uuid::new_v4();
        queue.push(Lane::Discovery, WorkItem::RunTask(id));
        let item = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item, WorkItem::RunTask(id));
    }

    #[tokio::test]
    async fn test_burst_reaches_every_waiting_consumer() {
        let queue = Arc::new(TaskQueue::new());
        let mut consumers = Vec::new();
        for _ in 0..4 {
            let queue = queue.clone();
            consumers.push(tokio::spawn(
                async move { queue.pull(Lane::Discovery).await },
            ));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        for _ in 0..4 {
            queue.push(Lane::Discovery, WorkItem::RunTask(Uuid::new_v4()));
        }
        for consumer in consumers {
            tokio::time::timeout(Duration::from_secs(1), consumer)
                .await
                .expect("consumer starved")
                .unwrap();
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_stage_lane_mapping() {
        assert_eq!(Lane::for_stage(Stage::Discovery), Lane::Discovery);
        assert_eq!(Lane::for_stage(Stage::Enrichment), Lane::Enrichment);
    }
}
