use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwitterUser {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub screen_name: String,
    #[serde(default)]
    pub profile_image_url_https: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaEntity {
    #[serde(rename = "type")]
    pub kind: String,
    pub media_url_https: String,
}

impl MediaEntity {
    /// Videos and animated gifs are not relayed; only photos are.
    pub fn is_photo(&self) -> bool {
        self.kind == "photo"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedEntities {
    #[serde(default)]
    pub media: Vec<MediaEntity>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedTweet {
    #[serde(default)]
    pub full_text: String,
    #[serde(default)]
    pub extended_entities: Option<ExtendedEntities>,
}

/// One home timeline item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tweet {
    pub id: u64,
    #[serde(default)]
    pub full_text: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub truncated: bool,
    #[serde(default)]
    pub user: TwitterUser,
    #[serde(default)]
    pub retweeted_status: Option<Box<Tweet>>,
    #[serde(default)]
    pub quoted_status: Option<Box<Tweet>>,
    #[serde(default)]
    pub extended_tweet: Option<ExtendedTweet>,
    #[serde(default)]
    pub extended_entities: Option<ExtendedEntities>,
}

impl Tweet {
    /// Body text, preferring the untruncated extended text when the item was
    /// truncated, then `full_text`, then the legacy `text` field.
    pub fn body(&self) -> &str {
        if self.truncated {
            if let Some(extended) = self
                .extended_tweet
                .as_ref()
                .filter(|extended| !extended.full_text.is_empty())
            {
                return &extended.full_text;
            }
        }
        self.full_text
            .as_deref()
            .or(self.text.as_deref())
            .unwrap_or_default()
    }

    /// Photo URLs in display order; other media kinds are skipped.
    pub fn photo_urls(&self) -> Vec<&str> {
        let entities = self.extended_entities.as_ref().or_else(|| {
            self.extended_tweet
                .as_ref()
                .and_then(|extended| extended.extended_entities.as_ref())
        });
        entities
            .map(|entities| {
                entities
                    .media
                    .iter()
                    .filter(|media| media.is_photo())
                    .map(|media| media.media_url_https.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn permalink(&self) -> String {
        format!("https://twitter.com/statuses/{}", self.id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendsPage {
    #[serde(default)]
    pub users: Vec<TwitterUser>,
    #[serde(default)]
    pub next_cursor: i64,
}
