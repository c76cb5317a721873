// Copyright 2026 scrivener Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::VecDeque;

/// Position of an element in a [`RemovableQueue`], returned by [`RemovableQueue::push`].
///
/// Tokens are never reused, so a stale token never removes another element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(u64);

impl Token {
    /// Raw token value.
    pub fn raw(&self) -> u64 {
        self.0
    }

    /// Rebuild a token from its raw value.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

/// A FIFO queue that supports random lazy element removal.
///
/// Removed elements leave a hole that is reclaimed once it reaches the head.
#[derive(Debug)]
pub struct RemovableQueue<T> {
    slots: VecDeque<Option<T>>,
    /// Token of the element at the head of `slots`.
    offset: u64,
    len: usize,
}

impl<T> Default for RemovableQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RemovableQueue<T> {
    /// Create an empty [`RemovableQueue`].
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create an empty [`RemovableQueue`] with room for `capacity` slots.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: VecDeque::with_capacity(capacity),
            offset: 0,
            len: 0,
        }
    }

    /// Push an element to the tail of the queue.
    ///
    /// Returns a token that can be used for random removal.
    pub fn push(&mut self, elem: T) -> Token {
        let token = Token(self.offset + self.slots.len() as u64);
        self.slots.push_back(Some(elem));
        self.len += 1;
        token
    }

    /// Pop the element at the head of the queue.
    pub fn pop(&mut self) -> Option<T> {
        while let Some(slot) = self.slots.pop_front() {
            self.offset += 1;
            if let Some(elem) = slot {
                self.len -= 1;
                self.compact();
                return Some(elem);
            }
        }
        None
    }

    /// Peek the element at the head of the queue.
    pub fn peek(&self) -> Option<&T> {
        self.slots.iter().find_map(|slot| slot.as_ref())
    }

    /// Remove the element with the given `token` from the queue.
    ///
    /// Returns `None` if the element has already been popped or removed.
    pub fn remove(&mut self, token: Token) -> Option<T> {
        let index = token.0.checked_sub(self.offset)? as usize;
        let elem = self.slots.get_mut(index)?.take()?;
        self.len -= 1;
        self.compact();
        Some(elem)
    }

    /// Remove and return all the elements from the queue, head first.
    pub fn clear(&mut self) -> Vec<T> {
        self.offset += self.slots.len() as u64;
        self.len = 0;
        self.slots.drain(..).flatten().collect()
    }

    /// Iterate over the elements from head to tail.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().flatten()
    }

    /// Returns the element count.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if there is no element in the queue.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the occupied slots of the queue, holes included.
    pub fn usage(&self) -> usize {
        self.slots.len()
    }

    /// Drop leading holes.
    ///
    /// Trailing holes are kept, otherwise the next push would hand out the token of a removed element.
    fn compact(&mut self) {
        while let Some(None) = self.slots.front() {
            self.slots.pop_front();
            self.offset += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;

    use super::*;

    #[test]
    fn test_removable_queue() {
        let mut queue = RemovableQueue::with_capacity(4);
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.usage(), 0);

        assert_eq!(queue.push(0), Token(0));
        assert_eq!(queue.push(1), Token(1));
        assert_eq!(queue.push(2), Token(2));
        assert_eq!(queue.push(3), Token(3));
        assert_eq!(queue.len(), 4);

        assert_eq!(queue.pop(), Some(0));
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.usage(), 2);

        assert_eq!(queue.push(4), Token(4));
        assert_eq!(queue.push(5), Token(5));
        assert_eq!(queue.push(6), Token(6));

        assert_eq!(queue.remove(Token(3)), Some(3));
        assert_eq!(queue.remove(Token(4)), Some(4));
        assert_eq!(queue.remove(Token(5)), Some(5));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.usage(), 5);

        // Removing twice or removing a popped element is a no-op.
        assert_eq!(queue.remove(Token(4)), None);
        assert_eq!(queue.remove(Token(0)), None);

        assert_eq!(queue.peek(), Some(&2));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.usage(), 1);

        assert_eq!(queue.clear(), vec![6]);
        assert!(queue.is_empty());

        for i in 0..8 {
            assert_eq!(queue.push(i), Token(i + 7));
        }
        assert_eq!(queue.remove(Token(6)), None);
        assert_eq!(queue.iter().copied().collect_vec(), (0..8).collect_vec());
    }

    #[test]
    fn test_removable_queue_holes() {
        let mut queue = RemovableQueue::new();
        let tokens = (0..6).map(|i| queue.push(i)).collect_vec();

        assert_eq!(queue.remove(tokens[5]), Some(5));
        assert_eq!(queue.usage(), 6);
        assert_eq!(queue.remove(tokens[0]), Some(0));
        assert_eq!(queue.usage(), 5);

        assert_eq!(queue.remove(tokens[2]), Some(2));
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(3));
        assert_eq!(queue.pop(), Some(4));
        assert_eq!(queue.pop(), None);
        assert_eq!(queue.usage(), 0);

        // Tokens keep increasing after the queue drains.
        assert_eq!(queue.push(42), Token(6));
    }
}
