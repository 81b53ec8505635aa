use super::{GenerationConfig, Generator};
use crate::error::GenerateError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Bounds every generation call. A slow backend yields
/// `GenerateError::Timeout`, which the turn pipeline downgrades to a safe
/// fallback utterance instead of letting the conversation hang.
pub struct TimeoutGenerator {
    inner: Arc<dyn Generator>,
    timeout: Duration,
}

impl TimeoutGenerator {
    pub fn new(inner: Arc<dyn Generator>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

impl Generator for TimeoutGenerator {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn generate<'a>(
        &'a self,
        context: &'a str,
        config: &'a GenerationConfig,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>> {
        Box::pin(async move {
            match tokio::time::timeout(self.timeout, self.inner.generate(context, config)).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(
                        generator = self.inner.name(),
                        timeout_secs = self.timeout.as_secs(),
                        "Generation timed out"
                    );
                    Err(GenerateError::Timeout {
                        timeout_secs: self.timeout.as_secs(),
                    }
                    .into())
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::ScriptedGenerator;

    struct SlowGenerator;

    impl Generator for SlowGenerator {
        fn name(&self) -> &str {
            "slow"
        }

        fn generate<'a>(
            &'a self,
            _context: &'a str,
            _config: &'a GenerationConfig,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>> {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok("too late".to_string())
            })
        }
    }

    #[tokio::test]
    async fn fast_generation_passes_through() {
        let generator = TimeoutGenerator::new(
            Arc::new(ScriptedGenerator::new(["quick reply"])),
            Duration::from_secs(5),
        );
        let text = generator
            .generate("ctx", &GenerationConfig::default())
            .await
            .unwrap();
        assert_eq!(text, "quick reply");
    }

    #[tokio::test]
    async fn slow_generation_times_out() {
        let generator = TimeoutGenerator::new(Arc::new(SlowGenerator), Duration::from_millis(50));
        let err = generator
            .generate("ctx", &GenerationConfig::default())
            .await
            .expect_err("should time out");
        let generate_err = err.downcast_ref::<GenerateError>();
        assert!(matches!(
            generate_err,
            Some(GenerateError::Timeout { .. })
        ));
    }
}
