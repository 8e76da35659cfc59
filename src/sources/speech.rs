use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

const DETECT_URL: &str = "https://translation.googleapis.com/language/translate/v2/detect";
const VOICES_URL: &str = "https://texttospeech.googleapis.com/v1/voices";
const SYNTHESIZE_URL: &str = "https://texttospeech.googleapis.com/v1/text:synthesize";

/// Límite de caracteres que acepta la síntesis
pub const MAX_TTS_CHARS: usize = 5000;

#[derive(Debug, Deserialize)]
struct DetectResponse {
    data: DetectData,
}

#[derive(Debug, Deserialize)]
struct DetectData {
    detections: Vec<Vec<Detection>>,
}

#[derive(Debug, Deserialize)]
struct Detection {
    language: String,
}

#[derive(Debug, Deserialize)]
struct VoicesResponse {
    #[serde(default)]
    voices: Vec<Voice>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Voice {
    pub name: String,
    #[serde(default)]
    pub ssml_gender: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection<'a> {
    language_code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    ssml_gender: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    audio_content: String,
}

/// Audio MP3 sintetizado
#[derive(Debug, Clone)]
pub struct Speech {
    pub language: String,
    pub voice: Option<String>,
    pub audio: Bytes,
}

/// Google Translation (language detection) and Text-to-Speech over REST.
pub struct SpeechClient {
    http: reqwest::Client,
    api_key: String,
}

impl SpeechClient {
    pub fn new(http: reqwest::Client, api_key: String) -> Self {
        Self { http, api_key }
    }

    /// Detects the language, picks a voice for it and synthesizes MP3 audio.
    pub async fn synthesize(&self, text: &str) -> Result<Speech> {
        let language = self.detect_language(text).await?;
        let voice = self.pick_voice(&language).await?;
        debug!("🗣️ Idioma {} con voz {:?}", language, voice);

        let selection = VoiceSelection {
            language_code: &language,
            name: voice.as_deref(),
            ssml_gender: "MALE",
        };

        let response: SynthesizeResponse = self
            .http
            .post(SYNTHESIZE_URL)
            .query(&[("key", &self.api_key)])
            .json(&json!({
                "input": { "text": text },
                "voice": selection,
                "audioConfig": { "audioEncoding": "MP3" },
            }))
            .send()
            .await
            .context("No se pudo conectar con Text-to-Speech")?
            .error_for_status()?
            .json()
            .await?;

        let audio = STANDARD
            .decode(response.audio_content.as_bytes())
            .context("Audio en base64 inválido")?;

        info!("🗣️ Audio sintetizado: {} bytes ({})", audio.len(), language);
        Ok(Speech {
            language,
            voice,
            audio: Bytes::from(audio),
        })
    }

    async fn detect_language(&self, text: &str) -> Result<String> {
        let response: DetectResponse = self
            .http
            .post(DETECT_URL)
            .query(&[("key", &self.api_key)])
            .json(&json!({ "q": text }))
            .send()
            .await
            .context("No se pudo conectar con Translation")?
            .error_for_status()?
            .json()
            .await?;

        response
            .data
            .detections
            .into_iter()
            .flatten()
            .map(|detection| detection.language)
            .find(|language| language != "und")
            .context("No se pudo detectar el idioma")
    }

    async fn pick_voice(&self, language: &str) -> Result<Option<String>> {
        let response: VoicesResponse = self
            .http
            .get(VOICES_URL)
            .query(&[("languageCode", language), ("key", self.api_key.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(select_voice(&response.voices).map(|voice| voice.name.clone()))
    }
}

/// First male WaveNet voice, if the language has one.
pub fn select_voice(voices: &[Voice]) -> Option<&Voice> {
    voices
        .iter()
        .find(|voice| voice.name.contains("Wavenet") && voice.ssml_gender == "MALE")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice(name: &str, gender: &str) -> Voice {
        Voice {
            name: name.to_string(),
            ssml_gender: gender.to_string(),
        }
    }

    #[test]
    fn prefers_male_wavenet() {
        let voices = vec![
            voice("en-US-Standard-B", "MALE"),
            voice("en-US-Wavenet-C", "FEMALE"),
            voice("en-US-Wavenet-D", "MALE"),
        ];
        assert_eq!(select_voice(&voices).unwrap().name, "en-US-Wavenet-D");
    }

    #[test]
    fn no_wavenet_means_default_voice() {
        let voices = vec![voice("xx-Standard-A", "MALE")];
        assert!(select_voice(&voices).is_none());
    }

    #[test]
    fn decodes_api_responses() {
        let detect: DetectResponse = serde_json::from_str(
            r#"{"data":{"detections":[[{"language":"ru","isReliable":false,"confidence":1}]]}}"#,
        )
        .unwrap();
        assert_eq!(detect.data.detections[0][0].language, "ru");

        let voices: VoicesResponse = serde_json::from_str(
            r#"{"voices":[{"languageCodes":["ru-RU"],"name":"ru-RU-Wavenet-B","ssmlGender":"MALE","naturalSampleRateHertz":24000}]}"#,
        )
        .unwrap();
        assert_eq!(select_voice(&voices.voices).unwrap().name, "ru-RU-Wavenet-B");
    }

    #[test]
    fn voice_selection_omits_missing_name() {
        let selection = VoiceSelection {
            language_code: "ru",
            name: None,
            ssml_gender: "MALE",
        };
        assert_eq!(
            serde_json::to_value(&selection).unwrap(),
            json!({ "languageCode": "ru", "ssmlGender": "MALE" })
        );
    }
}
