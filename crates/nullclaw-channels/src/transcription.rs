//! Voice-message transcription: download an audio attachment to a temp file,
//! stream it as `multipart/form-data` to a transcription endpoint, and parse
//! the JSON `{text}` reply. Temp files are removed on every exit path via
//! `tempfile`'s drop guard.

use std::io::Write;

use rand::Rng;
use serde::Deserialize;
use tracing::debug;

use crate::error::ChannelError;

const BOUNDARY_HEX_CHARS: usize = 32;

fn known_endpoint(provider: &str) -> &'static str {
    match provider {
        "openai" => "https://api.openai.com/v1/audio/transcriptions",
        "groq" => "https://api.groq.com/openai/v1/audio/transcriptions",
        _ => "https://api.groq.com/openai/v1/audio/transcriptions",
    }
}

/// Resolve the endpoint to POST to: an explicit override wins, otherwise the
/// provider name maps to a known URL, otherwise fall back to the
/// Groq-compatible endpoint.
pub fn resolve_transcription_endpoint(explicit: Option<&str>, provider: Option<&str>) -> String {
    if let Some(url) = explicit {
        if !url.trim().is_empty() {
            return url.to_string();
        }
    }
    known_endpoint(provider.unwrap_or("groq")).to_string()
}

fn random_boundary() -> String {
    let mut rng = rand::thread_rng();
    (0..BOUNDARY_HEX_CHARS)
        .map(|_| std::char::from_digit(rng.gen_range(0..16), 16).unwrap())
        .collect()
}

/// Download `audio_bytes` to a temp file, build a multipart body on a second
/// temp file (so the request body is never fully buffered in memory), and
/// POST it to `endpoint`.
pub fn transcribe(
    client: &reqwest::blocking::Client,
    endpoint: &str,
    api_key: &str,
    audio_bytes: &[u8],
    model: &str,
    language: Option<&str>,
) -> Result<String, ChannelError> {
    let audio_file = tempfile::Builder::new()
        .prefix("nullclaw-audio-")
        .suffix(".ogg")
        .tempfile()
        .map_err(|e| ChannelError::StateIo(format!("temp audio file: {e}")))?;
    std::fs::write(audio_file.path(), audio_bytes)
        .map_err(|e| ChannelError::StateIo(format!("write audio bytes: {e}")))?;

    let boundary = random_boundary();
    let body_file = build_multipart_body(audio_file.path(), &boundary, model, language)?;

    debug!(endpoint, model, bytes = audio_bytes.len(), "posting transcription request");

    let body_bytes = std::fs::read(body_file.path())
        .map_err(|e| ChannelError::StateIo(format!("read multipart body: {e}")))?;

    let resp = client
        .post(endpoint)
        .bearer_auth(api_key)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(body_bytes)
        .send()
        .map_err(|e| ChannelError::SendFailed(e.to_string()))?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let text = resp.text().unwrap_or_default();
        return Err(ChannelError::SendFailed(format!("status {status}: {text}")));
    }

    let body = resp.text().map_err(|e| ChannelError::SendFailed(e.to_string()))?;
    parse_transcription_response(&body)
}

/// Deserialize a transcription endpoint's JSON reply. A body with no `text`
/// field (e.g. a bare status acknowledgement) is a malformed response, not a
/// transport failure.
fn parse_transcription_response(body: &str) -> Result<String, ChannelError> {
    let parsed: TranscriptionResponse = serde_json::from_str(body)
        .map_err(|e| ChannelError::Malformed(format!("parse transcription response: {e}")))?;
    Ok(parsed.text)
}

fn build_multipart_body(
    audio_path: &std::path::Path,
    boundary: &str,
    model: &str,
    language: Option<&str>,
) -> Result<tempfile::NamedTempFile, ChannelError> {
    let mut body_file = tempfile::Builder::new()
        .prefix("nullclaw-multipart-")
        .suffix(".bin")
        .tempfile()
        .map_err(|e| ChannelError::StateIo(format!("temp body file: {e}")))?;

    let audio_bytes =
        std::fs::read(audio_path).map_err(|e| ChannelError::StateIo(format!("reread audio: {e}")))?;

    write!(
        body_file,
        "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"audio.ogg\"\r\nContent-Type: audio/ogg\r\n\r\n"
    )
    .map_err(|e| ChannelError::StateIo(e.to_string()))?;
    body_file
        .write_all(&audio_bytes)
        .map_err(|e| ChannelError::StateIo(e.to_string()))?;
    write!(body_file, "\r\n--{boundary}\r\nContent-Disposition: form-data; name=\"model\"\r\n\r\n{model}\r\n")
        .map_err(|e| ChannelError::StateIo(e.to_string()))?;

    if let Some(lang) = language {
        write!(
            body_file,
            "--{boundary}\r\nContent-Disposition: form-data; name=\"language\"\r\n\r\n{lang}\r\n"
        )
        .map_err(|e| ChannelError::StateIo(e.to_string()))?;
    }

    write!(body_file, "--{boundary}--\r\n").map_err(|e| ChannelError::StateIo(e.to_string()))?;

    Ok(body_file)
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_endpoint_wins_over_provider_lookup() {
        let endpoint = resolve_transcription_endpoint(Some("https://custom.example/transcribe"), Some("openai"));
        assert_eq!(endpoint, "https://custom.example/transcribe");
    }

    #[test]
    fn unknown_provider_falls_back_to_groq() {
        let endpoint = resolve_transcription_endpoint(None, Some("some-unknown-provider"));
        assert_eq!(endpoint, known_endpoint("groq"));
    }

    #[test]
    fn random_boundary_is_expected_length() {
        assert_eq!(random_boundary().len(), BOUNDARY_HEX_CHARS);
    }

    #[test]
    fn multipart_body_includes_boundary_markers() {
        let audio = tempfile::Builder::new().suffix(".ogg").tempfile().unwrap();
        std::fs::write(audio.path(), b"fake-audio-bytes").unwrap();
        let body = build_multipart_body(audio.path(), "BOUNDARY123", "whisper-1", Some("en")).unwrap();
        let contents = std::fs::read_to_string(body.path()).unwrap();
        assert!(contents.contains("name=\"file\""));
        assert!(contents.contains("name=\"language\""));
        assert!(contents.ends_with("--BOUNDARY123--\r\n"));
    }

    #[test]
    fn valid_text_body_parses() {
        let text = parse_transcription_response(r#"{"text":"Héllo wörld"}"#).unwrap();
        assert_eq!(text, "Héllo wörld");
    }

    #[test]
    fn body_missing_text_field_is_malformed() {
        let err = parse_transcription_response(r#"{"status":"ok"}"#).unwrap_err();
        assert_eq!(err.code(), "malformed");
    }
}
