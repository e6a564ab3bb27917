use crate::traits::{ImageCaptionInput, ImageCaptionOutput};
use crate::Model;
use anyhow::{anyhow, bail};
use base64::Engine;
use reqwest::{
    header::{HeaderMap, AUTHORIZATION},
    Url,
};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;

const CAPTION_PROMPT: &str =
    "Describe this image in one short sentence. Reply with the caption only.";

/// Image captioning through an OpenAI compatible chat completion API,
/// e.g. OpenRouter. The image is sent inline as a base64 data url.
pub struct OpenAICaption {
    client: reqwest::Client,
    base_url: String,
    model: String,
    headers: HeaderMap,
    max_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
}

impl Model for OpenAICaption {
    type Item = ImageCaptionInput;
    type Output = ImageCaptionOutput;

    fn batch_size_limit(&self) -> usize {
        4
    }

    async fn process(
        &mut self,
        items: Vec<Self::Item>,
    ) -> anyhow::Result<Vec<anyhow::Result<Self::Output>>> {
        if items.len() > self.batch_size_limit() {
            bail!("too many items");
        }

        let mut results = vec![];

        for item in items {
            let res = self.get_caption(&item).await;
            results.push(res);
        }

        Ok(results)
    }
}

impl OpenAICaption {
    /// Create a new OpenAI compatible captioning client.
    pub fn new(base_url: &str, api_key: &str, model: &str) -> anyhow::Result<Self> {
        let base_url = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, format!("Bearer {}", api_key).parse()?);

        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            model: model.to_string(),
            headers,
            max_tokens: 128,
        })
    }

    async fn image_data_url(image_path: &Path) -> anyhow::Result<String> {
        let data = tokio::fs::read(image_path).await?;
        let mime = mime_guess::from_path(image_path)
            .first()
            .filter(|m| m.type_() == mime_guess::mime::IMAGE)
            .map(|m| m.essence_str().to_string())
            .unwrap_or_else(|| "image/jpeg".to_string());

        Ok(format!(
            "data:{};base64,{}",
            mime,
            base64::engine::general_purpose::STANDARD.encode(data)
        ))
    }

    async fn get_caption(&self, image_path: &Path) -> anyhow::Result<String> {
        tracing::debug!("generating caption for image: {}", image_path.display());

        let url = Url::parse(&self.base_url)?;
        let query = url.query();
        let mut url = url.join("chat/completions")?;
        url.set_query(query);

        let image_url = Self::image_data_url(image_path).await?;

        let body = json!({
            "model": &self.model,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": CAPTION_PROMPT},
                    {"type": "image_url", "image_url": {"url": image_url}},
                ]
            }],
            "max_tokens": self.max_tokens,
        });

        let response = self
            .client
            .post(url)
            .headers(self.headers.clone())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("caption request failed with status {}: {}", status, text);
        }

        let response: ChatCompletionResponse = response.json().await?;
        let caption = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(anyhow!("no caption in response"))?;

        Ok(caption.trim().to_string())
    }
}

#[cfg(test)]
mod test {
    use super::OpenAICaption;
    use crate::Model;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn write_image(dir: &tempfile::TempDir, name: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, b"\x89PNG\r\n\x1a\nnot really a png").unwrap();
        path
    }

    #[test_log::test(tokio::test)]
    async fn test_caption_from_chat_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_string_contains("data:image/png;base64,"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "  a cat on a sofa \n"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let image = write_image(&dir, "cat.png");

        let mut model = OpenAICaption::new(
            &format!("{}/api/v1", server.uri()),
            "test-key",
            "openai/gpt-4o-mini",
        )
        .unwrap();
        let results = model.process(vec![image]).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap(), "a cat on a sofa");
    }

    #[test_log::test(tokio::test)]
    async fn test_error_status_fails_the_item() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let image = write_image(&dir, "cat.png");

        let mut model = OpenAICaption::new(&server.uri(), "wrong", "m").unwrap();
        let results = model.process(vec![image]).await.unwrap();

        let err = results[0].as_ref().unwrap_err().to_string();
        assert!(err.contains("401"));
        assert!(err.contains("invalid api key"));
    }

    #[test_log::test(tokio::test)]
    async fn test_missing_image_fails_the_item() {
        let mut model = OpenAICaption::new("http://127.0.0.1:9", "k", "m").unwrap();
        let results = model
            .process(vec!["/definitely/not/here.jpg".into()])
            .await
            .unwrap();
        assert!(results[0].is_err());
    }
}
