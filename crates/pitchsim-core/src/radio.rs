//! Delayed radio-command queue.
//!
//! Commands enter in receive order and become deliverable once
//! `receive_time + command_delay` lies strictly before the simulated time.
//! Enqueue order equals receive order and the delay is constant across one
//! drain, so inspecting the head suffices.

use std::collections::VecDeque;

use crate::control::RobotControl;

/// One queued radio transmission.
#[derive(Debug, Clone)]
pub struct QueuedRadioCommand {
    pub control: RobotControl,
    /// Nanosecond timestamp at which processing of the transmission began.
    pub receive_time: i64,
    pub is_blue: bool,
}

/// Strict FIFO of radio transmissions keyed by receive time.
#[derive(Debug, Default)]
pub struct CommandQueue {
    queue: VecDeque<QueuedRadioCommand>,
}

impl CommandQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, control: RobotControl, receive_time: i64, is_blue: bool) {
        self.queue.push_back(QueuedRadioCommand {
            control,
            receive_time,
            is_blue,
        });
    }

    /// Dequeue the head if it has been received long enough ago.
    pub fn pop_due(&mut self, now: i64, command_delay: i64) -> Option<QueuedRadioCommand> {
        match self.queue.front() {
            Some(head) if head.receive_time + command_delay < now => self.queue.pop_front(),
            _ => None,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{RobotCommand, RobotControl};

    fn control(id: u32) -> RobotControl {
        RobotControl {
            robot_commands: vec![RobotCommand {
                id,
                ..RobotCommand::default()
            }],
        }
    }

    #[test]
    fn delivery_waits_for_the_delay() {
        let mut queue = CommandQueue::new();
        queue.enqueue(control(0), 0, true);
        // delay 30 ms: not deliverable at 20 ms, deliverable at 40 ms.
        assert!(queue.pop_due(20_000_000, 30_000_000).is_none());
        let delivered = queue.pop_due(40_000_000, 30_000_000).expect("due");
        assert!(delivered.is_blue);
        assert!(queue.is_empty());
    }

    #[test]
    fn delivery_is_strictly_after_the_deadline() {
        let mut queue = CommandQueue::new();
        queue.enqueue(control(0), 0, false);
        // receive_time + delay == now is not yet deliverable.
        assert!(queue.pop_due(30_000_000, 30_000_000).is_none());
        assert!(queue.pop_due(30_000_001, 30_000_000).is_some());
    }

    #[test]
    fn fifo_order_is_preserved() {
        let mut queue = CommandQueue::new();
        queue.enqueue(control(1), 0, true);
        queue.enqueue(control(2), 1, true);
        queue.enqueue(control(3), 2, true);
        let mut ids = Vec::new();
        while let Some(entry) = queue.pop_due(1_000_000, 0) {
            ids.push(entry.control.robot_commands[0].id);
        }
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn head_blocks_later_entries() {
        let mut queue = CommandQueue::new();
        queue.enqueue(control(1), 100, true);
        queue.enqueue(control(2), 0, true);
        // The head is not due, so nothing is delivered even though a later
        // entry would qualify on its own.
        assert!(queue.pop_due(50, 0).is_none());
        assert_eq!(queue.len(), 2);
    }
}
