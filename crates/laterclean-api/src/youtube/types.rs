use serde::Deserialize;

use crate::traits::QueueItem;

// ── playlistItems.list ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PlaylistItemsResponse {
    #[serde(default)]
    pub items: Vec<PlaylistItem>,
    #[serde(rename = "nextPageToken")]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PlaylistItem {
    pub id: String,
    pub snippet: Option<PlaylistItemSnippet>,
    #[serde(rename = "contentDetails")]
    pub content_details: Option<PlaylistItemContentDetails>,
}

#[derive(Debug, Deserialize)]
pub struct PlaylistItemSnippet {
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PlaylistItemContentDetails {
    #[serde(rename = "videoId")]
    pub video_id: Option<String>,
}

impl PlaylistItem {
    /// Convert to a queue item. Entries without a video reference are dropped.
    pub fn into_queue_item(self) -> Option<QueueItem> {
        let video_id = self.content_details.and_then(|c| c.video_id)?;
        let title = self
            .snippet
            .and_then(|s| s.title)
            .unwrap_or_else(|| video_id.clone());
        Some(QueueItem {
            item_id: self.id,
            video_id,
            title,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_playlist_items() {
        let body = r#"{
            "kind": "youtube#playlistItemListResponse",
            "nextPageToken": "CDIQAA",
            "items": [
                {
                    "id": "UExhYmMx",
                    "snippet": { "title": "Rust in 100 Seconds" },
                    "contentDetails": { "videoId": "5C_HPTJg5ek" }
                },
                {
                    "id": "UExhYmMy",
                    "snippet": {},
                    "contentDetails": { "videoId": "dQw4w9WgXcQ" }
                },
                { "id": "UExhYmMz" }
            ]
        }"#;

        let resp: PlaylistItemsResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.next_page_token.as_deref(), Some("CDIQAA"));

        let items: Vec<QueueItem> = resp
            .items
            .into_iter()
            .filter_map(PlaylistItem::into_queue_item)
            .collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].item_id, "UExhYmMx");
        assert_eq!(items[0].video_id, "5C_HPTJg5ek");
        assert_eq!(items[0].title, "Rust in 100 Seconds");
        // Missing title falls back to the video id.
        assert_eq!(items[1].title, "dQw4w9WgXcQ");
    }

    #[test]
    fn test_missing_items_array_is_empty() {
        let resp: PlaylistItemsResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.items.is_empty());
    }
}
