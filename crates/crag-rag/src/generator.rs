//! Blocking and streamed generation over an assembled prompt

use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crag_core::{FragmentSink, GenerationConfig, GenerationResult, LLMProvider, Prompt, Result};

/// Default number of fragments buffered between worker and consumer
pub const DEFAULT_STREAM_CAPACITY: usize = 16;

/// Run the model to completion and return the whole answer
pub async fn generate_blocking(
    model: &dyn LLMProvider,
    prompt: &Prompt,
    config: &GenerationConfig,
) -> Result<GenerationResult> {
    let result = model.generate(prompt.as_str(), config).await?;
    debug!(
        model = model.model_id(),
        tokens = ?result.tokens_generated,
        "blocking generation finished"
    );
    Ok(result)
}

/// Start generation on a worker task and hand back its fragments as a stream
///
/// Exactly one tokio task is spawned per call; it must be called from within
/// a tokio runtime. The worker pushes fragments through a channel holding at
/// most `capacity` of them and waits while the channel is full. A worker
/// failure arrives as the last item of the stream.
///
/// Dropping the stream does not stop the worker: it runs until the model
/// finishes, and its remaining fragments are discarded.
pub fn spawn_stream(
    model: Arc<dyn LLMProvider>,
    prompt: Prompt,
    config: GenerationConfig,
    capacity: usize,
) -> GenerationStream {
    let (sender, receiver) = mpsc::channel(capacity.max(1));

    tokio::spawn(async move {
        let sink = FragmentSink::new(sender);
        if let Err(e) = model
            .generate_stream(prompt.as_str(), &config, sink.clone())
            .await
        {
            warn!(model = model.model_id(), error = %e, "streamed generation failed");
            sink.fail(e).await;
        }
    });

    GenerationStream::new(receiver)
}

/// Lazy, finite sequence of generated text fragments
///
/// Ends when the worker finishes or after the first error. It cannot be
/// restarted; a new request spawns a new worker.
pub struct GenerationStream {
    receiver: mpsc::Receiver<Result<String>>,
    finished: bool,
}

impl GenerationStream {
    pub fn new(receiver: mpsc::Receiver<Result<String>>) -> Self {
        Self {
            receiver,
            finished: false,
        }
    }

    /// Drain the stream and concatenate every fragment
    pub async fn collect_text(mut self) -> Result<String> {
        use futures::StreamExt;

        let mut text = String::new();
        while let Some(fragment) = self.next().await {
            text.push_str(&fragment?);
        }
        Ok(text)
    }
}

impl Stream for GenerationStream {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }

        match self.receiver.poll_recv(cx) {
            Poll::Ready(Some(Err(e))) => {
                self.finished = true;
                self.receiver.close();
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(None)
            }
            other => other,
        }
    }
}
