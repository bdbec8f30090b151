//! Prompt construction for both analysis variants.

use serde::Serialize;

const RESPONSE_CONTRACT: &str = r#"Return your answer STRICTLY as a JSON object with these exact keys: "name", "usage", "warnings".
Do not include any formatting like Markdown code blocks. Just return the raw JSON object."#;

const KNOWLEDGE_INSTRUCTIONS: &str = r#"Once you identify the medicine, use your general knowledge to provide:
1. The name of the medicine.
2. What the medicine is commonly used for (indications). Keep it simple and easy to understand.
3. Common major warnings, side effects, or precautions for this medicine. Do not just say "none listed in text". You must provide actual warnings for the drug you identified."#;

/// Image attached to a vision request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedImage {
    /// `data:` URL carrying the image bytes.
    pub data_url: String,
}

/// One completion request, built fresh for every attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    /// Instruction text sent to the model.
    pub prompt_text: String,
    /// Model identifier.
    pub model_id: String,
    /// Inline image for vision-capable models.
    pub embedded_image: Option<EmbeddedImage>,
}

/// Instruction built around OCR output.
pub fn text_prompt(extracted_text: &str) -> String {
    format!(
        "You are a medical assistant looking at text extracted from a medicine box or bottle using OCR.\n\
         Here is the raw text:\n\"\"\"\n{extracted_text}\n\"\"\"\n\n\
         Based on this text, please identify the actual name of the medicine.\n\
         {KNOWLEDGE_INSTRUCTIONS}\n\n{RESPONSE_CONTRACT}"
    )
}

/// Instruction accompanying an inline package photo.
pub fn vision_prompt() -> String {
    format!(
        "You are a medical assistant looking at a photo of a medicine box or bottle.\n\
         Read the printed text on the package and identify the actual name of the medicine.\n\
         {KNOWLEDGE_INSTRUCTIONS}\n\n{RESPONSE_CONTRACT}"
    )
}

/// Chat message content: plain text or a list of typed parts.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum MessageContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Debug, Serialize)]
pub(crate) struct ImageUrl<'a> {
    url: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatMessage<'a> {
    role: &'static str,
    content: MessageContent<'a>,
}

/// Wire body for an OpenAI-compatible chat completion call.
#[derive(Debug, Serialize)]
pub(crate) struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

impl AnalysisRequest {
    pub(crate) fn to_body(&self, max_tokens: u32) -> ChatCompletionBody<'_> {
        let content = match &self.embedded_image {
            None => MessageContent::Text(&self.prompt_text),
            Some(image) => MessageContent::Parts(vec![
                ContentPart::Text {
                    text: &self.prompt_text,
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: &image.data_url,
                    },
                },
            ]),
        };
        ChatCompletionBody {
            model: &self.model_id,
            messages: vec![ChatMessage {
                role: "user",
                content,
            }],
            max_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_prompt_quotes_ocr_output() {
        let prompt = text_prompt("PARACETAMOL 500mg");
        assert!(prompt.contains("\"\"\"\nPARACETAMOL 500mg\n\"\"\""));
        assert!(prompt.contains("\"name\", \"usage\", \"warnings\""));
    }

    #[test]
    fn text_request_serializes_plain_content() {
        let request = AnalysisRequest {
            prompt_text: "hello".into(),
            model_id: "m".into(),
            embedded_image: None,
        };
        let body = serde_json::to_value(request.to_body(300)).expect("json");
        assert_eq!(
            body,
            json!({
                "model": "m",
                "messages": [{ "role": "user", "content": "hello" }],
                "max_tokens": 300
            })
        );
    }

    #[test]
    fn vision_request_mixes_text_and_image_parts() {
        let request = AnalysisRequest {
            prompt_text: vision_prompt(),
            model_id: "m".into(),
            embedded_image: Some(EmbeddedImage {
                data_url: "data:image/png;base64,aGk=".into(),
            }),
        };
        let body = serde_json::to_value(request.to_body(100)).expect("json");
        let parts = &body["messages"][0]["content"];
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[1]["type"], "image_url");
        assert_eq!(parts[1]["image_url"]["url"], "data:image/png;base64,aGk=");
    }
}
