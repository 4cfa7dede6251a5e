#![forbid(unsafe_code)]

//! Cross-thread task funnel.
//!
//! The observed tree may be mutated on a producer thread (a render loop,
//! say) while the mirror lives on the model thread. The producer never
//! touches the mirror: it posts [`MirrorTask`]s through a [`TaskSender`],
//! and the model thread drains the [`TaskQueue`] between its own work.
//!
//! ```ignore
//! let (sender, queue) = task_channel();
//! std::thread::spawn(move || {
//!     // after each frame
//!     let _ = sender.post(MirrorTask::CycleCompleted);
//! });
//! loop {
//!     mirror.drain(&queue, Instant::now());
//!     mirror.tick(Instant::now());
//! }
//! ```

use std::sync::mpsc;
use std::time::Duration;

use livetree_core::{AttributeKinds, Handle, MirrorError, MirrorResult};

/// Work posted to the model thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorTask {
    /// A producer cycle finished; reconcile when convenient.
    CycleCompleted,
    /// `node` joined the tree.
    EnteredTree(Handle),
    /// `node` left the tree.
    LeftTree(Handle),
    /// `node` has a new parent.
    Reparented(Handle),
    /// Non-structural attributes of `node` changed.
    AttributesChanged { node: Handle, kinds: AttributeKinds },
    /// Force a full reconciliation.
    Resync,
}

impl MirrorTask {
    /// Whether this task schedules a full pass rather than a point edit.
    #[must_use]
    pub fn schedules_pass(&self) -> bool {
        matches!(self, Self::CycleCompleted | Self::Resync)
    }
}

/// Producer side of the funnel. Cheap to clone, safe to send.
#[derive(Debug, Clone)]
pub struct TaskSender {
    sender: mpsc::Sender<MirrorTask>,
}

impl TaskSender {
    /// Queue `task` for the model thread.
    pub fn post(&self, task: MirrorTask) -> MirrorResult<()> {
        self.sender
            .send(task)
            .map_err(|_| MirrorError::Disconnected)
    }
}

/// Model-thread side of the funnel.
#[derive(Debug)]
pub struct TaskQueue {
    receiver: mpsc::Receiver<MirrorTask>,
}

impl TaskQueue {
    /// Everything queued right now, in arrival order.
    pub fn drain(&self) -> Vec<MirrorTask> {
        let mut tasks = Vec::new();
        while let Ok(task) = self.receiver.try_recv() {
            tasks.push(task);
        }
        tasks
    }

    /// Block for at most `timeout` waiting for one task.
    ///
    /// Returns `Err(Disconnected)` once every sender is gone and the queue
    /// is empty.
    pub fn wait_timeout(&self, timeout: Duration) -> MirrorResult<Option<MirrorTask>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(task) => Ok(Some(task)),
            Err(mpsc::RecvTimeoutError::Timeout) => Ok(None),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(MirrorError::Disconnected),
        }
    }
}

/// Create a connected sender/queue pair.
#[must_use]
pub fn task_channel() -> (TaskSender, TaskQueue) {
    let (sender, receiver) = mpsc::channel();
    (TaskSender { sender }, TaskQueue { receiver })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn tasks_arrive_in_order() {
        let (sender, queue) = task_channel();
        sender.post(MirrorTask::EnteredTree(Handle::from_raw(1))).unwrap();
        sender.post(MirrorTask::CycleCompleted).unwrap();
        assert_eq!(
            queue.drain(),
            vec![
                MirrorTask::EnteredTree(Handle::from_raw(1)),
                MirrorTask::CycleCompleted
            ]
        );
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn posting_from_another_thread() {
        let (sender, queue) = task_channel();
        let producer = thread::spawn(move || {
            for _ in 0..10 {
                sender.post(MirrorTask::CycleCompleted).unwrap();
            }
        });
        producer.join().unwrap();
        assert_eq!(queue.drain().len(), 10);
        assert_eq!(
            queue.wait_timeout(Duration::from_millis(1)),
            Err(MirrorError::Disconnected)
        );
    }

    #[test]
    fn dropped_queue_disconnects_sender() {
        let (sender, queue) = task_channel();
        drop(queue);
        assert_eq!(sender.post(MirrorTask::Resync), Err(MirrorError::Disconnected));
    }

    #[test]
    fn wait_times_out_quietly() {
        let (_sender, queue) = task_channel();
        assert_eq!(queue.wait_timeout(Duration::from_millis(1)), Ok(None));
        assert!(MirrorTask::Resync.schedules_pass());
        assert!(!MirrorTask::LeftTree(Handle::from_raw(2)).schedules_pass());
    }
}
