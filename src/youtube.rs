use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::Deserialize;
use url::Url;

use crate::error::{AppError, Result};
use crate::scraper::CLIENT;

static TEXT_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("text").expect("Failed to parse text selector")
});

#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub id: String,
    pub title: String,
    pub author: String,
    pub thumbnail_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptSegment {
    pub text: String,
    pub start: f64,
    pub duration: f64,
}

#[derive(Deserialize)]
struct OEmbed {
    title: String,
    author_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptionTrack {
    base_url: String,
    #[serde(default)]
    language_code: String,
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

fn is_video_id(candidate: &str) -> bool {
    candidate.len() == 11
        && candidate.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Extracts the 11-character video id from the usual YouTube URL shapes.
pub fn video_id(url: &str) -> Result<String> {
    let invalid = || AppError::Validation(format!("Unable to extract video ID from URL: {}", url));
    let parsed = Url::parse(url.trim()).map_err(|_| invalid())?;
    let host = parsed.host_str().unwrap_or_default().trim_start_matches("www.").trim_start_matches("m.");

    let candidate = match host {
        "youtu.be" => parsed.path_segments().and_then(|mut s| s.next()).map(str::to_string),
        "youtube.com" | "music.youtube.com" | "youtube-nocookie.com" => {
            let mut segments = parsed.path_segments().map(|s| s.collect::<Vec<_>>()).unwrap_or_default();
            segments.retain(|s| !s.is_empty());
            match segments.as_slice() {
                ["watch"] => parsed
                    .query_pairs()
                    .find(|(k, _)| k == "v")
                    .map(|(_, v)| v.into_owned()),
                ["embed" | "v" | "shorts" | "live", id, ..] => Some(id.to_string()),
                _ => None,
            }
        }
        _ => None,
    };

    candidate.filter(|id| is_video_id(id)).ok_or_else(invalid)
}

pub async fn video_info(url: &str) -> Result<VideoInfo> {
    let id = video_id(url)?;
    let oembed: OEmbed = CLIENT
        .get("https://www.youtube.com/oembed")
        .query(&[("url", watch_url(&id).as_str()), ("format", "json")])
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    Ok(VideoInfo {
        thumbnail_url: format!("https://i.ytimg.com/vi/{}/hqdefault.jpg", id),
        id,
        title: oembed.title,
        author: oembed.author_name,
    })
}

/// Finds the caption track to use in a watch page, preferring English.
fn caption_track_url(page: &str) -> Option<String> {
    let marker = "\"captionTracks\":";
    let start = page.find(marker)? + marker.len();
    let tracks: Vec<CaptionTrack> = serde_json::Deserializer::from_str(&page[start..])
        .into_iter::<Vec<CaptionTrack>>()
        .next()?
        .ok()?;

    tracks
        .iter()
        .find(|t| t.language_code.starts_with("en"))
        .or_else(|| tracks.first())
        .map(|t| t.base_url.clone())
}

pub fn parse_transcript_xml(xml: &str) -> Vec<TranscriptSegment> {
    let fragment = Html::parse_fragment(xml);
    fragment
        .select(&TEXT_SELECTOR)
        .filter_map(|node| {
            let raw: String = node.text().collect();
            let text = decode_entities(&raw).split_whitespace().collect::<Vec<_>>().join(" ");
            if text.is_empty() {
                return None;
            }
            let attr = |name: &str| node.value().attr(name).and_then(|v| v.parse::<f64>().ok()).unwrap_or(0.0);
            Some(TranscriptSegment {
                text,
                start: attr("start"),
                duration: attr("dur"),
            })
        })
        .collect()
}

// Caption payloads are entity-encoded twice
fn decode_entities(text: &str) -> String {
    text.replace("&#39;", "'")
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

pub async fn transcript(url: &str) -> Result<Vec<TranscriptSegment>> {
    let id = video_id(url)?;
    tracing::debug!("Fetching transcript for video ID: {}", id);

    let page = CLIENT
        .get(watch_url(&id))
        .header("Accept-Language", "en-US,en;q=0.9")
        .send()
        .await?
        .text()
        .await?;

    let track_url = caption_track_url(&page)
        .ok_or_else(|| AppError::FetchError(format!("No transcript available for video {}", id)))?;

    let xml = CLIENT.get(&track_url).send().await?.error_for_status()?.text().await?;
    let segments = parse_transcript_xml(&xml);
    if segments.is_empty() {
        return Err(AppError::ParseError(format!("Transcript for video {} is empty", id)));
    }

    tracing::debug!("Transcript fetched for {}, segments: {}", id, segments.len());
    Ok(segments)
}

pub async fn transcript_text(url: &str) -> Result<String> {
    let segments = transcript(url).await?;
    Ok(segments.into_iter().map(|s| s.text).collect::<Vec<_>>().join(" "))
}
