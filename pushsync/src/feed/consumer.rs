use std::fmt;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::json;

use super::ContentFeed;
use crate::cache::CachedState;
use crate::event_log::{EventLog, LogCategory};

/// What the UI shows about the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FeedStatus {
    /// Nothing has been consumed yet.
    Unknown,
    /// The cache is empty or has never been written.
    Empty { identified: bool },
    Available { displayable: usize, unviewed: usize },
}

impl fmt::Display for FeedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("Content feed not loaded"),
            Self::Empty { identified: true } => f.write_str("No cards available for this user"),
            Self::Empty { identified: false } => {
                f.write_str("No cards available (user is anonymous)")
            }
            Self::Available {
                displayable,
                unviewed,
            } => {
                write!(f, "{displayable} card(s) available")?;
                if *unviewed > 0 {
                    write!(f, ", {unviewed} unviewed")?;
                }
                Ok(())
            }
        }
    }
}

/// Summarises feed snapshots.
pub struct FeedConsumer {
    log: EventLog,
    status: RwLock<FeedStatus>,
}

impl FeedConsumer {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            status: RwLock::new(FeedStatus::Unknown),
        }
    }

    pub fn status(&self) -> FeedStatus {
        self.status.read().clone()
    }

    /// Consume a snapshot of the feed cache. Appends exactly one log entry.
    pub fn handle_update(
        &self,
        state: &CachedState<ContentFeed>,
        user: Option<&str>,
    ) -> FeedStatus {
        let last_updated = (!state.is_epoch()).then(|| state.last_updated.to_rfc3339());

        let status = match state.value.as_ref() {
            Some(feed) if state.is_valid() => {
                let ids: Vec<&str> = feed.displayable().map(|c| c.id.as_str()).collect();
                self.log.append(
                    LogCategory::System,
                    json!({
                        "message": format!("Content feed update: {} displayable card(s) available", ids.len()),
                        "last_updated": last_updated,
                        "card_ids": ids,
                    }),
                );
                FeedStatus::Available {
                    displayable: ids.len(),
                    unviewed: feed.unviewed_count(),
                }
            }
            _ => {
                self.log.append(
                    LogCategory::System,
                    json!({
                        "message": "Content feed update received: 0 card(s)",
                        "last_updated": last_updated,
                        "user_id": user.unwrap_or("anonymous"),
                    }),
                );
                FeedStatus::Empty {
                    identified: user.is_some(),
                }
            }
        };

        *self.status.write() = status.clone();
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EPOCH_SENTINEL;
    use crate::feed::ContentCard;
    use chrono::Utc;

    #[test]
    fn test_epoch_state_is_empty() {
        let log = EventLog::new();
        let consumer = FeedConsumer::new(log.clone());
        let state = CachedState::new(ContentFeed::new(vec![ContentCard::new("a")]), EPOCH_SENTINEL);

        let status = consumer.handle_update(&state, Some("user-1"));

        assert_eq!(status, FeedStatus::Empty { identified: true });
        assert_eq!(status.to_string(), "No cards available for this user");
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_available_excludes_control_cards() {
        let consumer = FeedConsumer::new(EventLog::new());
        let feed = ContentFeed::new(vec![
            ContentCard::new("a"),
            ContentCard::new("b").mark_viewed(),
            ContentCard::new("ctl").control(),
        ]);

        let status = consumer.handle_update(&CachedState::new(feed, Utc::now()), None);

        assert_eq!(
            status,
            FeedStatus::Available {
                displayable: 2,
                unviewed: 1
            }
        );
        assert_eq!(status.to_string(), "2 card(s) available, 1 unviewed");
        assert_eq!(consumer.status(), status);
    }

    #[test]
    fn test_anonymous_empty() {
        let consumer = FeedConsumer::new(EventLog::new());
        let status = consumer.handle_update(&CachedState::empty(), None);
        assert_eq!(status.to_string(), "No cards available (user is anonymous)");
    }
}
