use base64::Engine;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Result blocks that carry base64 text, in the order they are reported
pub const TEXT_BLOCKS: &[&str] = &[
    "event",
    "iat",
    "cbm_tidy",
    "cbm_intent_domain",
    "cbm_semantic",
    "nlp",
];

/// Header status of the last result frame
pub const TERMINAL_STATUS: u64 = 2;

/// An inbound envelope that ends the receive loop
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Not a JSON object, or no usable `header`
    #[error("malformed envelope: {reason}")]
    Malformed { reason: String, raw: String },

    /// The server rejected the request
    #[error("server error {code}: {message}")]
    Server {
        code: i64,
        message: String,
        sid: Option<String>,
        raw: String,
    },
}

/// A result block whose content could not be decoded. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{block} block: {reason}")]
pub struct BlockDecodeError {
    pub block: String,
    pub reason: String,
}

/// Decoded text of one named result block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBlock {
    pub block: String,
    pub text: String,
    pub seq: Option<u64>,
    pub status: Option<u64>,
    /// Index of the intent this result belongs to (`parameter.<block>.loc.intent`)
    pub intent: Option<String>,
}

/// A piece of synthesized speech from the `tts` block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechChunk {
    /// `raw` (PCM) or `lame` (MP3)
    pub encoding: Option<String>,
    pub seq: Option<u64>,
    pub status: Option<u64>,
    pub audio: Vec<u8>,
}

/// Everything extracted from one successful inbound envelope
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedFrame {
    pub sid: Option<String>,
    pub status: Option<u64>,
    /// Text blocks in registry order, failed ones included
    pub blocks: Vec<Result<TextBlock, BlockDecodeError>>,
    pub speech: Option<Result<SpeechChunk, BlockDecodeError>>,
}

impl DecodedFrame {
    pub fn is_terminal(&self) -> bool {
        self.status == Some(TERMINAL_STATUS)
    }
}

/// Decode one inbound envelope
///
/// Only `header.code` is required. `payload` and every block inside it are
/// optional and independently absent.
pub fn decode_envelope(bytes: &[u8]) -> Result<DecodedFrame, DecodeError> {
    let raw = || String::from_utf8_lossy(bytes).into_owned();
    let malformed = |reason: &str| DecodeError::Malformed {
        reason: reason.to_string(),
        raw: raw(),
    };

    let value: Value = serde_json::from_slice(bytes).map_err(|e| DecodeError::Malformed {
        reason: format!("invalid JSON: {}", e),
        raw: raw(),
    })?;

    let envelope = value
        .as_object()
        .ok_or_else(|| malformed("envelope is not a JSON object"))?;
    let header = envelope
        .get("header")
        .and_then(Value::as_object)
        .ok_or_else(|| malformed("missing header"))?;
    let code = header
        .get("code")
        .and_then(Value::as_i64)
        .ok_or_else(|| malformed("header has no integer code"))?;

    let sid = header.get("sid").and_then(Value::as_str).map(str::to_string);

    if code != 0 {
        return Err(DecodeError::Server {
            code,
            message: header
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            sid,
            raw: raw(),
        });
    }

    let mut frame = DecodedFrame {
        sid,
        status: header.get("status").and_then(Value::as_u64),
        ..Default::default()
    };

    let parameter = envelope.get("parameter");

    if let Some(payload) = envelope.get("payload").and_then(Value::as_object) {
        for &name in TEXT_BLOCKS {
            if let Some(block) = payload.get(name) {
                if let Some(mut result) = decode_text_block(name, block) {
                    if let Ok(text) = &mut result {
                        text.intent = parameter
                            .and_then(|p| p.get(name))
                            .and_then(|b| b.pointer("/loc/intent"))
                            .and_then(scalar_string);
                    }
                    frame.blocks.push(result);
                }
            }
        }

        if let Some(tts) = payload.get("tts") {
            frame.speech = decode_speech(tts);
        }
    }

    Ok(frame)
}

/// `None` when the block has no `text` field
fn decode_text_block(name: &str, block: &Value) -> Option<Result<TextBlock, BlockDecodeError>> {
    let fail = |reason: String| BlockDecodeError {
        block: name.to_string(),
        reason,
    };

    let Some(fields) = block.as_object() else {
        return Some(Err(fail("not a JSON object".to_string())));
    };
    let text = fields.get("text")?;

    let result = text
        .as_str()
        .ok_or_else(|| fail("text is not a string".to_string()))
        .and_then(|encoded| decode_base64_text(encoded).map_err(fail))
        .map(|text| TextBlock {
            block: name.to_string(),
            text,
            seq: fields.get("seq").and_then(Value::as_u64),
            status: fields.get("status").and_then(Value::as_u64),
            intent: None,
        });

    Some(result)
}

fn decode_speech(block: &Value) -> Option<Result<SpeechChunk, BlockDecodeError>> {
    let fail = |reason: String| BlockDecodeError {
        block: "tts".to_string(),
        reason,
    };

    let Some(fields) = block.as_object() else {
        return Some(Err(fail("not a JSON object".to_string())));
    };
    let encoded = field_str(fields, "audio")?;

    let result = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| fail(format!("invalid base64: {}", e)))
        .map(|audio| SpeechChunk {
            encoding: field_str(fields, "encoding").map(str::to_string),
            seq: fields.get("seq").and_then(Value::as_u64),
            status: fields.get("status").and_then(Value::as_u64),
            audio,
        });

    Some(result)
}

/// A string or number rendered as text
fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn field_str<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    fields.get(key).and_then(Value::as_str)
}

fn decode_base64_text(encoded: &str) -> Result<String, String> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| format!("invalid base64: {}", e))?;
    String::from_utf8(bytes).map_err(|e| format!("invalid UTF-8: {}", e))
}

// ============================================================================
// Result helpers
// ============================================================================

#[derive(Debug, Deserialize)]
struct IatResult {
    text: IatText,
}

#[derive(Debug, Deserialize)]
struct IatText {
    #[serde(default)]
    ws: Vec<IatWord>,
}

#[derive(Debug, Deserialize)]
struct IatWord {
    #[serde(default)]
    cw: Vec<IatCandidate>,
}

#[derive(Debug, Deserialize)]
struct IatCandidate {
    #[serde(default)]
    w: String,
}

/// Concatenate the recognized words of an `iat` block
///
/// Returns `None` when the block is not a speech recognition result.
pub fn iat_transcript(iat_json: &str) -> Option<String> {
    let result: IatResult = serde_json::from_str(iat_json).ok()?;

    Some(
        result
            .text
            .ws
            .iter()
            .flat_map(|word| word.cw.iter())
            .map(|candidate| candidate.w.as_str())
            .collect(),
    )
}

/// Skill result carried by a `cbm_semantic` block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemanticResult {
    /// 0 when a skill matched
    pub rc: i64,
    pub text: Option<String>,
    pub category: Option<String>,
    pub answer: Option<String>,
}

impl SemanticResult {
    pub fn parse(semantic_json: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(semantic_json).ok()?;
        let rc = value.get("rc")?.as_i64()?;

        Some(Self {
            rc,
            text: value.get("text").and_then(Value::as_str).map(str::to_string),
            category: value
                .get("category")
                .and_then(Value::as_str)
                .map(str::to_string),
            answer: value
                .pointer("/answer/text")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    pub fn matched(&self) -> bool {
        self.rc == 0
    }
}

/// One rewritten intent from a `cbm_tidy` block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TidyIntent {
    pub index: String,
    pub value: String,
}

/// Intent list carried by a `cbm_tidy` block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TidyResult {
    pub intents: Vec<TidyIntent>,
}

impl TidyResult {
    /// `None` unless the block holds an `intent` array
    pub fn parse(tidy_json: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(tidy_json).ok()?;
        let intents = value
            .get("intent")?
            .as_array()?
            .iter()
            .filter_map(|intent| {
                Some(TidyIntent {
                    index: intent.get("index").and_then(scalar_string)?,
                    value: intent
                        .get("value")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                })
            })
            .collect();

        Some(Self { intents })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b64(text: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(text)
    }

    #[test]
    fn test_iat_block_decoded() {
        let frame =
            decode_envelope(br#"{"header":{"code":0,"status":1},"payload":{"iat":{"text":"aGVsbG8="}}}"#)
                .unwrap();

        assert!(!frame.is_terminal());
        assert_eq!(frame.blocks.len(), 1);
        let block = frame.blocks[0].as_ref().unwrap();
        assert_eq!(block.block, "iat");
        assert_eq!(block.text, "hello");
    }

    #[test]
    fn test_terminal_without_payload() {
        let frame = decode_envelope(br#"{"header":{"code":0,"status":2}}"#).unwrap();
        assert!(frame.is_terminal());
        assert!(frame.blocks.is_empty());
        assert!(frame.speech.is_none());
    }

    #[test]
    fn test_missing_status_is_not_terminal() {
        let frame = decode_envelope(br#"{"header":{"code":0}}"#).unwrap();
        assert!(!frame.is_terminal());
    }

    #[test]
    fn test_missing_header_is_malformed() {
        let err = decode_envelope(br#"{"payload":{"iat":{"text":"aGVsbG8="}}}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { .. }));
    }

    #[test]
    fn test_non_json_and_non_object_are_malformed() {
        assert!(matches!(
            decode_envelope(b"{\"header\":"),
            Err(DecodeError::Malformed { .. })
        ));
        assert!(matches!(decode_envelope(b"[1,2]"), Err(DecodeError::Malformed { .. })));
        assert!(matches!(
            decode_envelope(br#"{"header":{"status":2}}"#),
            Err(DecodeError::Malformed { .. })
        ));
    }

    #[test]
    fn test_server_error_ignores_payload() {
        let raw = format!(
            r#"{{"header":{{"code":10110,"message":"licc limit","sid":"s-1","status":2}},"payload":{{"nlp":{{"text":"{}"}}}}}}"#,
            b64("ignored")
        );

        match decode_envelope(raw.as_bytes()).unwrap_err() {
            DecodeError::Server {
                code,
                message,
                sid,
                raw: preserved,
            } => {
                assert_eq!(code, 10110);
                assert_eq!(message, "licc limit");
                assert_eq!(sid.as_deref(), Some("s-1"));
                assert_eq!(preserved, raw);
            }
            other => panic!("expected server error, got {:?}", other),
        }
    }

    #[test]
    fn test_blocks_follow_registry_order() {
        let raw = format!(
            r#"{{"header":{{"code":0,"status":1,"sid":"abc"}},"payload":{{"nlp":{{"text":"{}","seq":3,"status":2}},"event":{{"text":"{}"}},"iat":{{"text":"{}"}}}}}}"#,
            b64("answer"),
            b64("vad_start"),
            b64("question")
        );
        let frame = decode_envelope(raw.as_bytes()).unwrap();

        let names: Vec<_> = frame
            .blocks
            .iter()
            .map(|b| b.as_ref().unwrap().block.as_str())
            .collect();
        assert_eq!(names, ["event", "iat", "nlp"]);

        let nlp = frame.blocks[2].as_ref().unwrap();
        assert_eq!(nlp.seq, Some(3));
        assert_eq!(nlp.status, Some(2));
        assert_eq!(frame.sid.as_deref(), Some("abc"));
    }

    #[test]
    fn test_bad_block_does_not_abort_siblings() {
        let raw = format!(
            r#"{{"header":{{"code":0,"status":1}},"payload":{{"event":{{"text":"!!!"}},"iat":{{"text":"{}"}},"nlp":{{"text":"/w=="}}}}}}"#,
            b64("still here")
        );
        let frame = decode_envelope(raw.as_bytes()).unwrap();

        assert_eq!(frame.blocks.len(), 3);
        assert!(frame.blocks[0].as_ref().unwrap_err().reason.contains("base64"));
        assert_eq!(frame.blocks[1].as_ref().unwrap().text, "still here");
        // 0xFF is not valid UTF-8
        assert!(frame.blocks[2].as_ref().unwrap_err().reason.contains("UTF-8"));
    }

    #[test]
    fn test_block_without_text_and_unknown_blocks_skipped() {
        let frame = decode_envelope(
            br#"{"header":{"code":0,"status":1},"payload":{"iat":{"seq":1},"future_block":{"text":"aGk="}}}"#,
        )
        .unwrap();
        assert!(frame.blocks.is_empty());
    }

    #[test]
    fn test_speech_chunk_decoded() {
        let frame = decode_envelope(
            br#"{"header":{"code":0,"status":1},"payload":{"tts":{"encoding":"raw","seq":1,"status":0,"audio":"AAEC"}}}"#,
        )
        .unwrap();

        let speech = frame.speech.unwrap().unwrap();
        assert_eq!(speech.audio, vec![0, 1, 2]);
        assert_eq!(speech.encoding.as_deref(), Some("raw"));
        assert_eq!(speech.seq, Some(1));
    }

    #[test]
    fn test_iat_transcript() {
        let json = r#"{"text":{"ws":[{"cw":[{"w":"明天"}]},{"cw":[{"w":"下雨"}]},{"cw":[{"w":"吗"}]}]}}"#;
        assert_eq!(iat_transcript(json).as_deref(), Some("明天下雨吗"));
        assert_eq!(iat_transcript("not json"), None);
    }

    #[test]
    fn test_semantic_result() {
        let hit = SemanticResult::parse(
            r#"{"rc":0,"text":"明天天气","category":"IFLYTEK.weather","answer":{"text":"明天晴"}}"#,
        )
        .unwrap();
        assert!(hit.matched());
        assert_eq!(hit.category.as_deref(), Some("IFLYTEK.weather"));
        assert_eq!(hit.answer.as_deref(), Some("明天晴"));

        let miss = SemanticResult::parse(r#"{"rc":4,"text":"asdf"}"#).unwrap();
        assert!(!miss.matched());
        assert_eq!(miss.answer, None);
    }

    #[test]
    fn test_empty_text_block_is_empty_string() {
        let frame = decode_envelope(
            br#"{"header":{"code":0,"status":1},"payload":{"nlp":{"text":"","seq":1}}}"#,
        )
        .unwrap();

        let block = frame.blocks[0].as_ref().unwrap();
        assert_eq!(block.block, "nlp");
        assert_eq!(block.text, "");
        assert_eq!(block.seq, Some(1));
    }

    #[test]
    fn test_outbound_payloads_decode_back() {
        use crate::protocol::frame::{
            encode_audio_frame, encode_text_frame, FrameStatus, SessionMetadata,
        };
        use serde_json::json;

        let audio_meta = SessionMetadata::audio("app", "sn", "main_box", "vcn");
        let every_byte: Vec<u8> = (0..=255u8).rev().collect();

        for chunk in [Vec::new(), vec![0u8], vec![0xff, 0x00, 0x7f], every_byte] {
            let sent: Value = serde_json::from_str(
                &encode_audio_frame(&chunk, FrameStatus::Continue, &audio_meta)
                    .to_json()
                    .unwrap(),
            )
            .unwrap();
            let echoed = json!({
                "header": {"code": 0, "status": 1},
                "payload": {"tts": {"encoding": "raw", "audio": sent["payload"]["audio"]["audio"]}}
            });

            let frame = decode_envelope(echoed.to_string().as_bytes()).unwrap();
            assert_eq!(frame.speech.unwrap().unwrap().audio, chunk);
        }

        let text_meta = SessionMetadata::text("app", "sn", "main_box", "vcn");
        for text in ["", "a", "明天下雨吗", "line\nbreak \u{1F600}"] {
            let sent: Value =
                serde_json::from_str(&encode_text_frame(text, &text_meta).to_json().unwrap()).unwrap();
            let echoed = json!({
                "header": {"code": 0, "status": 2},
                "payload": {"nlp": {"text": sent["payload"]["text"]["text"]}}
            });

            let frame = decode_envelope(echoed.to_string().as_bytes()).unwrap();
            assert_eq!(frame.blocks[0].as_ref().unwrap().text, text);
        }
    }

    #[test]
    fn test_intent_index_from_parameter() {
        let raw = format!(
            r#"{{"header":{{"code":0,"status":1}},"parameter":{{"cbm_semantic":{{"loc":{{"intent":1}}}},"cbm_intent_domain":{{"loc":{{"intent":"0"}}}}}},"payload":{{"cbm_intent_domain":{{"text":"{}"}},"cbm_semantic":{{"text":"{}"}},"nlp":{{"text":"{}"}}}}}}"#,
            b64("weather"),
            b64("{}"),
            b64("sunny")
        );
        let frame = decode_envelope(raw.as_bytes()).unwrap();

        let intents: Vec<_> = frame
            .blocks
            .iter()
            .map(|b| b.as_ref().unwrap().intent.as_deref())
            .collect();
        assert_eq!(intents, [Some("0"), Some("1"), None]);
    }

    #[test]
    fn test_tidy_result() {
        let tidy = TidyResult::parse(
            r#"{"intent":[{"index":0,"value":"明天天气"},{"index":1,"value":"放首歌"},{"value":"no index"}]}"#,
        )
        .unwrap();

        assert_eq!(
            tidy.intents,
            [
                TidyIntent {
                    index: "0".to_string(),
                    value: "明天天气".to_string()
                },
                TidyIntent {
                    index: "1".to_string(),
                    value: "放首歌".to_string()
                },
            ]
        );
        assert_eq!(TidyResult::parse(r#"{"rc":0}"#), None);
    }
}
