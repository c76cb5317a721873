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

use std::{
    fmt::Debug,
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use bitflags::bitflags;
use scrivener_common::removable_queue::Token;

use crate::eviction::Eviction;

bitflags! {
    /// Atomic flags of a [`Record`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct Flags: u64 {
        /// The record is reachable from the indexer.
        const IN_INDEXER = 0b00000001;
        /// The record is held by the eviction container.
        const IN_EVICTION = 0b00000010;
    }
}

/// Token slot value meaning "not queued".
const NO_TOKEN: u64 = u64::MAX;

/// Data of a cached entry.
pub struct Data<E>
where
    E: Eviction,
{
    /// Entry key.
    pub key: E::Key,
    /// Entry value.
    pub value: E::Value,
    /// Hash of the key, computed with the cache's hash builder.
    pub hash: u64,
    /// Weight of the entry, computed with the cache's weighter.
    pub weight: usize,
}

/// [`Record`] holds the information of the cached entry.
pub struct Record<E>
where
    E: Eviction,
{
    data: Data<E>,
    inserted: Instant,
    token: AtomicU64,
    flags: AtomicU64,
}

impl<E> Debug for Record<E>
where
    E: Eviction,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("hash", &self.data.hash)
            .field("weight", &self.data.weight)
            .field("flags", &Flags::from_bits_truncate(self.flags.load(Ordering::Relaxed)))
            .finish()
    }
}

impl<E> Record<E>
where
    E: Eviction,
{
    /// Create a record with data, stamped with the current instant.
    pub fn new(data: Data<E>) -> Self {
        Self {
            data,
            inserted: Instant::now(),
            token: AtomicU64::new(NO_TOKEN),
            flags: AtomicU64::new(0),
        }
    }

    /// Get the immutable reference of the record key.
    pub fn key(&self) -> &E::Key {
        &self.data.key
    }

    /// Get the immutable reference of the record value.
    pub fn value(&self) -> &E::Value {
        &self.data.value
    }

    /// Get the record hash.
    pub fn hash(&self) -> u64 {
        self.data.hash
    }

    /// Get the record weight.
    pub fn weight(&self) -> usize {
        self.data.weight
    }

    /// Returns `true` if the record has outlived `ttl` at `now`.
    pub fn is_expired(&self, ttl: Option<Duration>, now: Instant) -> bool {
        ttl.is_some_and(|ttl| now.saturating_duration_since(self.inserted) >= ttl)
    }

    /// Set the eviction queue token of the record.
    pub fn set_token(&self, token: Option<Token>) {
        let raw = token.map(|t| t.raw()).unwrap_or(NO_TOKEN);
        self.token.store(raw, Ordering::Release);
    }

    /// Take the eviction queue token of the record, leaving none.
    pub fn take_token(&self) -> Option<Token> {
        match self.token.swap(NO_TOKEN, Ordering::AcqRel) {
            NO_TOKEN => None,
            raw => Some(Token::from_raw(raw)),
        }
    }

    /// Set in eviction flag.
    pub fn set_in_eviction(&self, val: bool) {
        self.set_flags(Flags::IN_EVICTION, val, Ordering::Release);
    }

    /// Get in eviction flag.
    pub fn is_in_eviction(&self) -> bool {
        self.get_flags(Flags::IN_EVICTION, Ordering::Acquire)
    }

    /// Set in indexer flag.
    pub fn set_in_indexer(&self, val: bool) {
        self.set_flags(Flags::IN_INDEXER, val, Ordering::Release);
    }

    /// Get in indexer flag.
    pub fn is_in_indexer(&self) -> bool {
        self.get_flags(Flags::IN_INDEXER, Ordering::Acquire)
    }

    /// Set the record atomic flags.
    pub fn set_flags(&self, flags: Flags, val: bool, order: Ordering) {
        match val {
            true => self.flags.fetch_or(flags.bits(), order),
            false => self.flags.fetch_and(!flags.bits(), order),
        };
    }

    /// Get the record atomic flags.
    pub fn get_flags(&self, flags: Flags, order: Ordering) -> bool {
        self.flags.load(order) & flags.bits() == flags.bits()
    }
}
