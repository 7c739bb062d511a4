//! Wire types of the live streaming endpoint.
//!
//! Client → server:
//! - `setup` - model, response modality, voice and system instruction (sent once)
//! - `realtimeInput` - base64 PCM media chunks
//!
//! Server → client:
//! - `setupComplete` - session is open
//! - `serverContent` - model audio parts, `interrupted`, `turnComplete`,
//!   output transcription
//! - `goAway` - server will close the connection soon

use serde::{Deserialize, Serialize};

/// Base64 payload with its MIME type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub data: String,
    pub mime_type: String,
}

impl Blob {
    /// Sample rate advertised in a `audio/pcm;rate=NNNN` MIME type
    pub fn pcm_rate(&self) -> Option<u32> {
        self.mime_type
            .split(';')
            .map(str::trim)
            .find_map(|param| param.strip_prefix("rate="))
            .and_then(|rate| rate.parse().ok())
    }

    pub fn is_audio(&self) -> bool {
        self.mime_type.starts_with("audio/")
    }
}

/// One captured frame ready to send: `{ media: { data, mimeType } }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeInput {
    pub media: Blob,
}

impl RealtimeInput {
    pub fn pcm(data: String, sample_rate: u32) -> Self {
        Self {
            media: Blob {
                data,
                mime_type: format!("audio/pcm;rate={}", sample_rate),
            },
        }
    }
}

// ============================================================================
// Client messages
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextPart {
    pub text: String,
}

impl Setup {
    /// Audio-only session with a prebuilt voice
    pub fn audio(model: &str, voice: Option<&str>, system_instruction: Option<&str>) -> Self {
        let model = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{}", model)
        };

        Self {
            model,
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: voice.map(|name| SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: name.to_string(),
                        },
                    },
                }),
            },
            system_instruction: system_instruction.map(|text| Content {
                parts: vec![TextPart {
                    text: text.to_string(),
                }],
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaChunks {
    pub media_chunks: Vec<Blob>,
}

/// Top-level client message as sent on the socket
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(Setup),
    RealtimeInput(MediaChunks),
}

impl From<RealtimeInput> for ClientMessage {
    fn from(input: RealtimeInput) -> Self {
        ClientMessage::RealtimeInput(MediaChunks {
            media_chunks: vec![input.media],
        })
    }
}

// ============================================================================
// Server messages
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<serde_json::Value>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    #[serde(default)]
    pub go_away: Option<GoAway>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<ModelTurn>,
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub output_transcription: Option<Transcription>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default)]
    pub inline_data: Option<Blob>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    #[serde(default)]
    pub time_left: Option<String>,
}

/// Lifecycle and content events the session controller reacts to
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// The remote endpoint acknowledged the session
    Open,
    /// One chunk of response audio
    Audio(Blob),
    /// The user spoke over the response; flush playback
    Interrupted,
    TurnComplete,
    /// Text of what the model is saying
    Transcript(String),
    /// The server will close the connection soon
    GoAway(Option<String>),
    /// Transport or protocol failure
    Error(String),
    /// The remote endpoint closed the session
    Closed(String),
}

impl ServerMessage {
    /// Flatten into events; audio comes before the interruption flag of the
    /// same message.
    pub fn into_events(self) -> Vec<ServerEvent> {
        let mut events = Vec::new();

        if self.setup_complete.is_some() {
            events.push(ServerEvent::Open);
        }

        if let Some(content) = self.server_content {
            if let Some(turn) = content.model_turn {
                events.extend(
                    turn.parts
                        .into_iter()
                        .filter_map(|part| part.inline_data)
                        .filter(Blob::is_audio)
                        .map(ServerEvent::Audio),
                );
            }
            if let Some(transcription) = content.output_transcription {
                if !transcription.text.is_empty() {
                    events.push(ServerEvent::Transcript(transcription.text));
                }
            }
            if content.interrupted {
                events.push(ServerEvent::Interrupted);
            }
            if content.turn_complete {
                events.push(ServerEvent::TurnComplete);
            }
        }

        if let Some(go_away) = self.go_away {
            events.push(ServerEvent::GoAway(go_away.time_left));
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_realtime_input_shape() {
        let input = RealtimeInput::pcm("AAAA".to_string(), 16000);
        let json = serde_json::to_value(&input).unwrap();

        assert_eq!(json["media"]["data"], "AAAA");
        assert_eq!(json["media"]["mimeType"], "audio/pcm;rate=16000");
    }

    #[test]
    fn test_realtime_input_wire_envelope() {
        let message = ClientMessage::from(RealtimeInput::pcm("AAAA".to_string(), 16000));
        let json = serde_json::to_value(&message).unwrap();

        let chunk = &json["realtimeInput"]["mediaChunks"][0];
        assert_eq!(chunk["mimeType"], "audio/pcm;rate=16000");
        assert_eq!(chunk["data"], "AAAA");
    }

    #[test]
    fn test_setup_serialization() {
        let setup = Setup::audio("gemini-live", Some("Zephyr"), Some("Be brief."));
        let json = serde_json::to_value(ClientMessage::Setup(setup)).unwrap();

        assert_eq!(json["setup"]["model"], "models/gemini-live");
        assert_eq!(
            json["setup"]["generationConfig"]["responseModalities"][0],
            "AUDIO"
        );
        assert_eq!(
            json["setup"]["generationConfig"]["speechConfig"]["voiceConfig"]
                ["prebuiltVoiceConfig"]["voiceName"],
            "Zephyr"
        );
        assert_eq!(
            json["setup"]["systemInstruction"]["parts"][0]["text"],
            "Be brief."
        );
    }

    #[test]
    fn test_setup_without_voice_omits_speech_config() {
        let setup = Setup::audio("models/x", None, None);
        let json = serde_json::to_value(&setup).unwrap();

        assert_eq!(json["model"], "models/x");
        assert!(json["generationConfig"].get("speechConfig").is_none());
        assert!(json.get("systemInstruction").is_none());
    }

    #[test]
    fn test_setup_complete_is_open() {
        let msg: ServerMessage = serde_json::from_str(r#"{"setupComplete": {}}"#).unwrap();
        assert_eq!(msg.into_events(), vec![ServerEvent::Open]);
    }

    #[test]
    fn test_audio_then_interrupted() {
        let json = r#"{
            "serverContent": {
                "modelTurn": {
                    "parts": [
                        {"text": "thinking"},
                        {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AAAA"}}
                    ]
                },
                "interrupted": true
            }
        }"#;

        let events = serde_json::from_str::<ServerMessage>(json)
            .unwrap()
            .into_events();

        assert_eq!(events.len(), 2);
        match &events[0] {
            ServerEvent::Audio(blob) => {
                assert_eq!(blob.data, "AAAA");
                assert_eq!(blob.pcm_rate(), Some(24000));
            }
            other => panic!("expected audio, got {:?}", other),
        }
        assert_eq!(events[1], ServerEvent::Interrupted);
    }

    #[test]
    fn test_non_audio_inline_data_ignored() {
        let json = r#"{"serverContent": {"modelTurn": {"parts": [
            {"inlineData": {"mimeType": "image/png", "data": "AAAA"}}
        ]}, "turnComplete": true}}"#;

        let events = serde_json::from_str::<ServerMessage>(json)
            .unwrap()
            .into_events();
        assert_eq!(events, vec![ServerEvent::TurnComplete]);
    }

    #[test]
    fn test_transcription_and_go_away() {
        let json = r#"{
            "serverContent": {"outputTranscription": {"text": "Hello"}},
            "goAway": {"timeLeft": "10s"}
        }"#;

        let events = serde_json::from_str::<ServerMessage>(json)
            .unwrap()
            .into_events();
        assert_eq!(
            events,
            vec![
                ServerEvent::Transcript("Hello".to_string()),
                ServerEvent::GoAway(Some("10s".to_string())),
            ]
        );
    }

    #[test]
    fn test_unknown_message_has_no_events() {
        let msg: ServerMessage = serde_json::from_str(r#"{"usageMetadata": {}}"#).unwrap();
        assert!(msg.into_events().is_empty());
    }

    #[test]
    fn test_pcm_rate_parsing() {
        let blob = Blob {
            data: String::new(),
            mime_type: "audio/pcm; rate=16000".to_string(),
        };
        assert_eq!(blob.pcm_rate(), Some(16000));

        let blob = Blob {
            data: String::new(),
            mime_type: "audio/pcm".to_string(),
        };
        assert_eq!(blob.pcm_rate(), None);
    }
}
