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

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// The reason an entry left the cache.
///
/// Every delete notification carries exactly one cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalCause {
    /// The entry was removed by the user, e.g. `remove` or `clear`.
    Explicit,
    /// The value was replaced by the user.
    ///
    /// The entry itself did not leave the cache.
    Replaced,
    /// The value was reclaimed before the removal could capture it.
    ///
    /// Delete notifications with this cause usually carry no value.
    Collected,
    /// The entry outlived its time-to-live.
    Expired,
    /// The entry was evicted to keep the cache within its capacity.
    Size,
}

impl RemovalCause {
    /// All removal causes.
    pub const ALL: [RemovalCause; 5] = [
        RemovalCause::Explicit,
        RemovalCause::Replaced,
        RemovalCause::Collected,
        RemovalCause::Expired,
        RemovalCause::Size,
    ];

    /// Returns `true` if the removal was decided by the cache policy rather than by the user.
    pub fn was_evicted(&self) -> bool {
        matches!(self, Self::Collected | Self::Expired | Self::Size)
    }

    /// Convert self into static str.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::Replaced => "replaced",
            Self::Collected => "collected",
            Self::Expired => "expired",
            Self::Size => "size",
        }
    }
}

impl Display for RemovalCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_was_evicted() {
        let evicted = RemovalCause::ALL.iter().filter(|cause| cause.was_evicted()).copied().collect::<Vec<_>>();
        assert_eq!(
            evicted,
            vec![RemovalCause::Collected, RemovalCause::Expired, RemovalCause::Size]
        );
    }

    #[test]
    fn test_serde() {
        let json = serde_json::to_string(&RemovalCause::Size).unwrap();
        assert_eq!(json, r#""size""#);
        let cause: RemovalCause = serde_json::from_str(r#""explicit""#).unwrap();
        assert_eq!(cause, RemovalCause::Explicit);
    }

    #[test]
    fn test_display() {
        for cause in RemovalCause::ALL {
            assert_eq!(cause.to_string(), cause.as_str());
        }
    }
}
