//! Response materialization: turning final model output into at most one
//! outward effect.
//!
//! Precedence, first match wins:
//! 1. generated images
//! 2. a `[reaction: <name>]` reply, unless a reaction tool already fired
//! 3. plain text, unless it is blank, `NO_RESPONSE`, or a text tool already replied

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use convoy_core::{Delivery, OutboundAttachment};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::response::{is_no_response, looks_like_reaction_directive, parse_reaction};

/// What tools already delivered during the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deliveries {
    pub text: bool,
    pub reaction: bool,
}

impl Deliveries {
    pub fn record(&mut self, delivery: Delivery) {
        match delivery {
            Delivery::Text => self.text = true,
            Delivery::Reaction => self.reaction = true,
        }
    }

    pub fn any(&self) -> bool {
        self.text || self.reaction
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Materialization {
    Images {
        images: Vec<String>,
        caption: Option<String>,
    },
    Reaction {
        reaction: String,
    },
    Text {
        text: String,
    },
    Nothing,
}

pub fn decide(text: &str, images: Vec<String>, deliveries: &Deliveries) -> Materialization {
    if !images.is_empty() {
        return Materialization::Images {
            images,
            caption: caption_for(text),
        };
    }
    if let Some(reaction) = parse_reaction(text) {
        if !deliveries.reaction {
            return Materialization::Reaction { reaction };
        }
        return Materialization::Nothing;
    }
    let text = text.trim();
    if text.is_empty()
        || is_no_response(text)
        || looks_like_reaction_directive(text)
        || deliveries.text
    {
        return Materialization::Nothing;
    }
    Materialization::Text {
        text: text.to_string(),
    }
}

/// Caption for generated images; reaction directives and the sentinel are not captions.
pub fn caption_for(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() || is_no_response(text) || looks_like_reaction_directive(text) {
        None
    } else {
        Some(text.to_string())
    }
}

/// Decode a generated image payload: data URI, http(s) URL, or bare base64.
pub async fn decode_image(
    payload: &str,
    index: usize,
    http: &reqwest::Client,
    timeout: Duration,
) -> Option<OutboundAttachment> {
    let payload = payload.trim();
    let (mime_type, bytes) = if let Some(rest) = payload.strip_prefix("data:") {
        let (header, data) = rest.split_once(',')?;
        let mime = header.split(';').next().filter(|m| !m.is_empty()).unwrap_or("image/png");
        (mime.to_string(), decode_base64(data)?)
    } else if payload.starts_with("http://") || payload.starts_with("https://") {
        download(payload, http, timeout).await?
    } else {
        ("image/png".to_string(), decode_base64(payload)?)
    };

    if bytes.is_empty() {
        return None;
    }
    let extension = mime_type.rsplit('/').next().unwrap_or("png").to_string();
    Some(OutboundAttachment {
        file_name: format!("generated-{}.{extension}", index + 1),
        mime_type,
        bytes,
    })
}

fn decode_base64(data: &str) -> Option<Vec<u8>> {
    let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    match BASE64.decode(cleaned) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!(error = %e, "Generated image is not valid base64");
            None
        }
    }
}

async fn download(url: &str, http: &reqwest::Client, timeout: Duration) -> Option<(String, Vec<u8>)> {
    let response = match http.get(url).timeout(timeout).send().await {
        Ok(response) if response.status().is_success() => response,
        Ok(response) => {
            warn!(status = %response.status(), "Generated image download rejected");
            return None;
        }
        Err(e) => {
            warn!(error = %e, "Generated image download failed");
            return None;
        }
    };
    let mime = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
        .filter(|v| v.starts_with("image/"))
        .unwrap_or_else(|| "image/png".to_string());
    match response.bytes().await {
        Ok(bytes) => Some((mime, bytes.to_vec())),
        Err(e) => {
            warn!(error = %e, "Generated image body could not be read");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn images_win_and_caption_rules_apply() {
        let none = Deliveries::default();
        let images = vec!["AAAA".to_string()];
        assert_eq!(
            decide("look at this", images.clone(), &none),
            Materialization::Images {
                images: images.clone(),
                caption: Some("look at this".into())
            }
        );
        for suppressed in ["", "  ", "NO_RESPONSE", "[reaction: love]"] {
            assert_eq!(
                decide(suppressed, images.clone(), &none),
                Materialization::Images {
                    images: images.clone(),
                    caption: None
                }
            );
        }
    }

    #[test]
    fn reaction_directive_sends_reaction_once() {
        let none = Deliveries::default();
        assert_eq!(
            decide("[reaction: love]", vec![], &none),
            Materialization::Reaction {
                reaction: "love".into()
            }
        );
        let reacted = Deliveries {
            reaction: true,
            ..Default::default()
        };
        assert_eq!(decide("[reaction: love]", vec![], &reacted), Materialization::Nothing);
    }

    #[test]
    fn text_suppressed_when_blank_sentinel_or_already_sent() {
        let none = Deliveries::default();
        assert_eq!(decide("", vec![], &none), Materialization::Nothing);
        assert_eq!(decide("NO_RESPONSE", vec![], &none), Materialization::Nothing);
        assert_eq!(decide("[reaction: hug]", vec![], &none), Materialization::Nothing);
        let texted = Deliveries {
            text: true,
            ..Default::default()
        };
        assert_eq!(decide("Hey!", vec![], &texted), Materialization::Nothing);
        assert_eq!(
            decide(" Hey! ", vec![], &none),
            Materialization::Text { text: "Hey!".into() }
        );
    }

    #[tokio::test]
    async fn decodes_data_uri_and_bare_base64() {
        let http = reqwest::Client::new();
        let timeout = Duration::from_secs(1);
        let from_uri = decode_image("data:image/jpeg;base64,aGVsbG8=", 0, &http, timeout)
            .await
            .unwrap();
        assert_eq!(from_uri.mime_type, "image/jpeg");
        assert_eq!(from_uri.bytes, b"hello");
        assert_eq!(from_uri.file_name, "generated-1.jpeg");

        let bare = decode_image("aGVsbG8=", 1, &http, timeout).await.unwrap();
        assert_eq!(bare.mime_type, "image/png");
        assert_eq!(bare.bytes, b"hello");

        assert!(decode_image("%%%not-base64%%%", 0, &http, timeout).await.is_none());
    }
}
