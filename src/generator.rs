//! Decade-image generation with transient retry and instruction fallback.
//!
//! A request moves through at most two stages. `Primary` runs the caller's
//! instruction through a fresh retry sequence. If the provider rejects it (or
//! answers without an image), and the instruction names a decade, `Fallback`
//! runs the templated instruction for that decade through its own fresh
//! sequence. No stage is entered twice.

use crate::{
    config::GeneratorConfig,
    error::{GenerationError, ProviderFailure, Result},
    logger,
    models::{GeneratedImage, GenerationRequest, ImagePayload},
    prompt,
    retry::{Retried, RetryPolicy, Sleeper, TokioSleeper},
    transport::{HttpTransport, Transport},
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

enum Stage {
    Primary,
    Fallback {
        decade: String,
        primary: ProviderFailure,
    },
}

impl Stage {
    fn name(&self) -> &'static str {
        match self {
            Stage::Primary => "primary",
            Stage::Fallback { .. } => "fallback",
        }
    }

    fn decade(&self) -> Option<&str> {
        match self {
            Stage::Primary => None,
            Stage::Fallback { decade, .. } => Some(decade),
        }
    }
}

/// One decade's result in an album run.
#[derive(Debug, Serialize)]
pub struct AlbumEntry {
    pub decade: String,
    #[serde(serialize_with = "serialize_outcome")]
    pub outcome: Result<GeneratedImage>,
}

fn serialize_outcome<S>(outcome: &Result<GeneratedImage>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match outcome {
        Ok(image) => image.serialize(serializer),
        Err(e) => serializer.serialize_str(&e.to_string()),
    }
}

#[derive(Clone)]
pub struct DecadeGenerator {
    transport: Arc<dyn Transport>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
}

impl DecadeGenerator {
    /// Generator backed by the HTTP transport described by `config`.
    pub fn new(config: &GeneratorConfig) -> Result<Self> {
        let transport = HttpTransport::new(config)?;
        Ok(Self::with_transport(
            Arc::new(transport),
            RetryPolicy::from_config(&config.retry),
        ))
    }

    pub fn with_transport(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            sleeper: Arc::new(TokioSleeper),
            policy,
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage> {
        let request_id = Uuid::new_v4();
        let _timer = logger::timer(&format!("generation {}", request_id));
        let mut transport_calls = 0;
        let mut stage = Stage::Primary;

        loop {
            let instruction = match &stage {
                Stage::Primary => request.instruction().to_string(),
                Stage::Fallback { decade, .. } => prompt::fallback_prompt(decade),
            };
            log::info!(
                "[{}] Attempting generation with {} instruction",
                request_id,
                stage.name()
            );

            let attempt = self.run_instruction(request.image(), &instruction).await;

            match (stage, attempt) {
                (stage, Ok(retried)) => {
                    transport_calls += retried.attempts;
                    log::info!(
                        "[{}] Generation succeeded on {} instruction after {} call(s)",
                        request_id,
                        stage.name(),
                        transport_calls
                    );
                    return Ok(GeneratedImage {
                        url: retried.value,
                        model: self.transport.model_id().to_string(),
                        instruction,
                        fallback_decade: stage.decade().map(String::from),
                        transport_calls,
                    });
                }
                (Stage::Primary, Err(failure)) if failure.kind.triggers_fallback() => {
                    transport_calls += failure.attempts;
                    let Some(decade) = prompt::extract_decade(request.instruction()) else {
                        log::error!(
                            "[{}] Primary instruction failed ({}) and names no decade, cannot fall back",
                            request_id,
                            failure.kind
                        );
                        return Err(failure.into());
                    };
                    log::warn!(
                        "[{}] Primary instruction was likely blocked ({}), falling back for {}",
                        request_id,
                        failure.kind,
                        decade
                    );
                    stage = Stage::Fallback {
                        decade: decade.to_string(),
                        primary: failure,
                    };
                }
                (Stage::Primary, Err(failure)) => {
                    log::error!("[{}] Unrecoverable generation failure: {}", request_id, failure);
                    return Err(failure.into());
                }
                (Stage::Fallback { decade, primary }, Err(fallback)) => {
                    log::error!(
                        "[{}] Fallback instruction for {} also failed: {}",
                        request_id,
                        decade,
                        fallback
                    );
                    return Err(GenerationError::FallbackFailed {
                        decade,
                        primary,
                        fallback,
                    });
                }
            }
        }
    }

    /// Generates one image per decade concurrently; entries keep the input order.
    pub async fn generate_album(&self, image: &ImagePayload, decades: &[&str]) -> Vec<AlbumEntry> {
        log::info!("Generating album for {} decade(s)", decades.len());

        let jobs = decades.iter().map(|decade| async move {
            let outcome = match GenerationRequest::for_decade(image.clone(), decade) {
                Ok(request) => self.generate(&request).await,
                Err(e) => Err(e),
            };
            AlbumEntry {
                decade: decade.to_string(),
                outcome,
            }
        });

        futures::future::join_all(jobs).await
    }

    async fn run_instruction(
        &self,
        image: &ImagePayload,
        instruction: &str,
    ) -> std::result::Result<Retried<String>, ProviderFailure> {
        let transport = &self.transport;
        self.policy
            .run(self.sleeper.as_ref(), move || {
                transport.generate_image(image, instruction)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FailureKind, UserHint};
    use crate::retry::tests::RecordingSleeper;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays scripted results in order and records every instruction it saw.
    struct ScriptedTransport {
        script: Mutex<VecDeque<std::result::Result<String, ProviderFailure>>>,
        instructions: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<std::result::Result<&str, ProviderFailure>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into_iter().map(|r| r.map(String::from)).collect()),
                instructions: Mutex::new(Vec::new()),
            })
        }

        fn instructions(&self) -> Vec<String> {
            self.instructions.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        fn model_id(&self) -> &str {
            "scripted-model"
        }

        async fn generate_image(
            &self,
            _image: &ImagePayload,
            instruction: &str,
        ) -> std::result::Result<String, ProviderFailure> {
            self.instructions.lock().unwrap().push(instruction.to_string());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ProviderFailure::unrecoverable("script exhausted")))
        }
    }

    /// Rejects stock album prompts for `blocked` decades, succeeds otherwise.
    struct AlbumTransport {
        blocked: Vec<&'static str>,
    }

    #[async_trait]
    impl Transport for AlbumTransport {
        fn model_id(&self) -> &str {
            "album-model"
        }

        async fn generate_image(
            &self,
            _image: &ImagePayload,
            instruction: &str,
        ) -> std::result::Result<String, ProviderFailure> {
            let decade = prompt::extract_decade(instruction).unwrap_or("none");
            let is_fallback = instruction.starts_with("Create a photograph");
            if self.blocked.iter().any(|blocked| *blocked == decade) {
                return Err(ProviderFailure::malformed(format!("no url for {}", decade)));
            }
            let suffix = if is_fallback { "-fallback" } else { "" };
            Ok(format!("https://img.example.com/{}{}.png", decade, suffix))
        }
    }

    fn photo() -> ImagePayload {
        ImagePayload::new(vec![0xff, 0xd8, 0xff], "image/jpeg").unwrap()
    }

    fn request(instruction: &str) -> GenerationRequest {
        GenerationRequest::new(photo(), instruction).unwrap()
    }

    fn generator(
        transport: Arc<dyn Transport>,
        sleeper: &Arc<RecordingSleeper>,
    ) -> DecadeGenerator {
        DecadeGenerator::with_transport(transport, RetryPolicy::default())
            .with_sleeper(sleeper.clone())
    }

    #[tokio::test]
    async fn test_primary_success_makes_one_call() {
        let transport = ScriptedTransport::new(vec![Ok("https://img.example.com/a.png")]);
        let sleeper = Arc::new(RecordingSleeper::default());

        let image = generator(transport.clone(), &sleeper)
            .generate(&request("Make me look like the 1950s"))
            .await
            .unwrap();

        assert_eq!(image.url, "https://img.example.com/a.png");
        assert_eq!(image.model, "scripted-model");
        assert_eq!(image.instruction, "Make me look like the 1950s");
        assert_eq!(image.transport_calls, 1);
        assert!(!image.used_fallback());
        assert_eq!(transport.instructions().len(), 1);
        assert!(sleeper.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_transient_errors_then_success() {
        let transport = ScriptedTransport::new(vec![
            Err(ProviderFailure::transient("internal").with_status(500)),
            Err(ProviderFailure::transient("internal").with_status(500)),
            Ok("https://img.example.com/third.png"),
        ]);
        let sleeper = Arc::new(RecordingSleeper::default());

        let image = generator(transport.clone(), &sleeper)
            .generate(&request("Make me look like the 1990s"))
            .await
            .unwrap();

        assert_eq!(image.url, "https://img.example.com/third.png");
        assert_eq!(image.transport_calls, 3);
        assert!(!image.used_fallback());
        assert_eq!(transport.instructions().len(), 3);
        assert_eq!(
            sleeper.recorded(),
            vec![Duration::from_millis(1000), Duration::from_millis(2000)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_on_virtual_clock() {
        let transport = ScriptedTransport::new(vec![
            Err(ProviderFailure::transient("internal")),
            Err(ProviderFailure::transient("internal")),
            Ok("https://img.example.com/third.png"),
        ]);
        let generator = DecadeGenerator::with_transport(transport, RetryPolicy::default());
        let start = tokio::time::Instant::now();

        let image = generator
            .generate(&request("a 1960s portrait"))
            .await
            .unwrap();

        assert_eq!(image.transport_calls, 3);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(3000));
        assert!(elapsed < Duration::from_millis(3100));
    }

    #[tokio::test]
    async fn test_rejection_with_decade_uses_fallback_once() {
        let transport = ScriptedTransport::new(vec![
            Err(ProviderFailure::malformed("no url")),
            Ok("https://img.example.com/fallback.png"),
        ]);
        let sleeper = Arc::new(RecordingSleeper::default());

        let image = generator(transport.clone(), &sleeper)
            .generate(&request("Turn me into a 1970s disco star"))
            .await
            .unwrap();

        let seen = transport.instructions();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], "Turn me into a 1970s disco star");
        assert_eq!(seen[1], prompt::fallback_prompt("1970s"));
        assert!(seen[1].contains("1970s"));

        assert_eq!(image.url, "https://img.example.com/fallback.png");
        assert_eq!(image.fallback_decade.as_deref(), Some("1970s"));
        assert_eq!(image.instruction, seen[1]);
        assert_eq!(image.transport_calls, 2);
    }

    #[tokio::test]
    async fn test_fallback_gets_fresh_retry_budget() {
        let transport = ScriptedTransport::new(vec![
            Err(ProviderFailure::rejected("blocked")),
            Err(ProviderFailure::transient("internal")),
            Err(ProviderFailure::transient("internal")),
            Ok("https://img.example.com/late.png"),
        ]);
        let sleeper = Arc::new(RecordingSleeper::default());

        let image = generator(transport.clone(), &sleeper)
            .generate(&request("1980s prom photo"))
            .await
            .unwrap();

        assert_eq!(image.transport_calls, 4);
        assert!(image.used_fallback());
        assert_eq!(
            sleeper.recorded(),
            vec![Duration::from_millis(1000), Duration::from_millis(2000)]
        );
    }

    #[tokio::test]
    async fn test_rejection_without_decade_returns_original_failure() {
        let original = ProviderFailure::malformed("The model did not return a valid image URL");
        let transport = ScriptedTransport::new(vec![Err(original.clone())]);
        let sleeper = Arc::new(RecordingSleeper::default());

        let err = generator(transport.clone(), &sleeper)
            .generate(&request("a watercolor portrait"))
            .await
            .unwrap_err();

        match err {
            GenerationError::Provider(failure) => assert_eq!(failure, original),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(transport.instructions().len(), 1);
        assert!(sleeper.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_both_instructions_fail() {
        let transport = ScriptedTransport::new(vec![
            Err(ProviderFailure::malformed("no url")),
            Err(ProviderFailure::rejected("still blocked").with_status(400)),
        ]);
        let sleeper = Arc::new(RecordingSleeper::default());

        let err = generator(transport.clone(), &sleeper)
            .generate(&request("1950s diner snapshot"))
            .await
            .unwrap_err();

        assert!(err.fallback_attempted());
        assert_eq!(err.user_hint(), UserHint::TryDifferentInput);
        match &err {
            GenerationError::FallbackFailed {
                decade,
                primary,
                fallback,
            } => {
                assert_eq!(decade, "1950s");
                assert_eq!(primary.kind, FailureKind::MalformedResponse);
                assert_eq!(fallback.kind, FailureKind::ContentRejected);
                assert_eq!(fallback.message, "still blocked");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.to_string().contains("still blocked"));
        assert_eq!(transport.instructions().len(), 2);
    }

    #[tokio::test]
    async fn test_unrecoverable_skips_fallback() {
        let transport = ScriptedTransport::new(vec![Err(
            ProviderFailure::unrecoverable("invalid api key").with_status(401),
        )]);
        let sleeper = Arc::new(RecordingSleeper::default());

        let err = generator(transport.clone(), &sleeper)
            .generate(&request("1960s mod look"))
            .await
            .unwrap_err();

        assert!(!err.fallback_attempted());
        assert_eq!(err.kind(), Some(FailureKind::Unrecoverable));
        assert_eq!(err.user_hint(), UserHint::Generic);
        assert_eq!(transport.instructions().len(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_transient_skips_fallback() {
        let transport = ScriptedTransport::new(vec![
            Err(ProviderFailure::transient("internal")),
            Err(ProviderFailure::transient("internal")),
            Err(ProviderFailure::transient("internal")),
        ]);
        let sleeper = Arc::new(RecordingSleeper::default());

        let err = generator(transport.clone(), &sleeper)
            .generate(&request("1960s mod look"))
            .await
            .unwrap_err();

        match &err {
            GenerationError::Provider(failure) => {
                assert_eq!(failure.kind, FailureKind::TransientServerError);
                assert_eq!(failure.attempts, 3);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(err.user_hint(), UserHint::TryLater);
        assert_eq!(transport.instructions().len(), 3);
    }

    #[tokio::test]
    async fn test_album_entries_are_independent() {
        let transport = Arc::new(AlbumTransport {
            blocked: vec![],
        });
        let sleeper = Arc::new(RecordingSleeper::default());
        let generator = generator(transport, &sleeper);

        let album = generator
            .generate_album(&photo(), &["1950s", "1970s", "2000s"])
            .await;

        let decades: Vec<_> = album.iter().map(|entry| entry.decade.as_str()).collect();
        assert_eq!(decades, vec!["1950s", "1970s", "2000s"]);
        for entry in &album {
            let image = entry.outcome.as_ref().unwrap();
            assert_eq!(image.url, format!("https://img.example.com/{}.png", entry.decade));
            assert!(!image.used_fallback());
        }
    }

    #[tokio::test]
    async fn test_album_failure_does_not_affect_other_decades() {
        let transport = Arc::new(AlbumTransport {
            blocked: vec!["1960s"],
        });
        let sleeper = Arc::new(RecordingSleeper::default());
        let generator = generator(transport, &sleeper);

        let album = generator
            .generate_album(&photo(), &["1950s", "1960s"])
            .await;

        assert!(album[0].outcome.is_ok());
        let err = album[1].outcome.as_ref().unwrap_err();
        assert!(err.fallback_attempted());

        let json = serde_json::to_value(&album).unwrap();
        assert_eq!(json[0]["outcome"]["url"], "https://img.example.com/1950s.png");
        assert!(json[1]["outcome"].as_str().unwrap().contains("1960s"));
    }

    #[tokio::test]
    async fn test_concurrent_requests_are_isolated() {
        let transport = Arc::new(AlbumTransport {
            blocked: vec![],
        });
        let generator = DecadeGenerator::with_transport(transport, RetryPolicy::default());

        let first = {
            let generator = generator.clone();
            tokio::spawn(async move { generator.generate(&request("1950s look")).await })
        };
        let second = {
            let generator = generator.clone();
            tokio::spawn(async move { generator.generate(&request("1990s look")).await })
        };

        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();
        assert_eq!(first.url, "https://img.example.com/1950s.png");
        assert_eq!(second.url, "https://img.example.com/1990s.png");
        assert_eq!(first.transport_calls, 1);
        assert_eq!(second.transport_calls, 1);
    }
}
