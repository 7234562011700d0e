use serde::de::IgnoredAny;
use serde::Deserialize;

/// Inbound webhook payload. Only the fields needed to spot stories are decoded.
#[derive(Debug, Deserialize)]
pub struct Update {
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    #[serde(rename = "message_id")]
    pub id: i64,
    pub chat: Chat,
    /// Presence marker: the story's contents are never inspected.
    pub story: Option<IgnoredAny>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

impl Message {
    pub fn is_story(&self) -> bool {
        self.story.is_some()
    }
}

impl Update {
    /// Returns the message if it is a forwarded story.
    pub fn story_message(&self) -> Option<&Message> {
        self.message.as_ref().filter(|m| m.is_story())
    }
}
