use std::collections::VecDeque;

use crate::model::InboundMessage;

/// Bounded FIFO of received messages. The oldest entry is evicted silently.
#[derive(Debug, Clone)]
pub(crate) struct MessageHistory {
    messages: VecDeque<InboundMessage>,
    capacity: usize,
}

impl MessageHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, message: InboundMessage) {
        if self.capacity == 0 {
            return;
        }
        while self.messages.len() >= self.capacity {
            self.messages.pop_front();
        }
        self.messages.push_back(message);
    }

    /// Oldest first.
    pub fn snapshot(&self) -> Vec<InboundMessage> {
        self.messages.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.messages.len()
    }
}
