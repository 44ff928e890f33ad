//! Content feed model.
//!
//! The feed is delivered on the subscription channel into a
//! [`SubscriptionCache<ContentFeed>`](crate::cache::SubscriptionCache) and
//! summarised for the UI by [`FeedConsumer`].

mod consumer;

use serde::{Deserialize, Serialize};

use crate::cache::Populated;

pub use consumer::{FeedConsumer, FeedStatus};

/// One card of the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentCard {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    /// Control-group placeholder; never displayed.
    #[serde(default)]
    pub is_control: bool,
    #[serde(default)]
    pub viewed: bool,
}

impl ContentCard {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            description: None,
            url: None,
            is_control: false,
            viewed: false,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn control(mut self) -> Self {
        self.is_control = true;
        self
    }

    pub fn mark_viewed(mut self) -> Self {
        self.viewed = true;
        self
    }
}

/// The full set of cards for the current user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentFeed {
    pub cards: Vec<ContentCard>,
}

impl ContentFeed {
    pub fn new(cards: Vec<ContentCard>) -> Self {
        Self { cards }
    }

    /// Cards that can be shown to the user.
    pub fn displayable(&self) -> impl Iterator<Item = &ContentCard> {
        self.cards.iter().filter(|c| !c.is_control)
    }

    pub fn unviewed_count(&self) -> usize {
        self.displayable().filter(|c| !c.viewed).count()
    }
}

impl Populated for ContentFeed {
    fn is_populated(&self) -> bool {
        !self.cards.is_empty()
    }
}
