use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::application::ports::{AnalysisRepository, RepositoryError};

use super::{ClassificationError, ClassificationRequest, ClassificationService};

pub fn classification_channel(
    capacity: usize,
) -> (ClassificationDispatcher, mpsc::Receiver<ClassificationRequest>) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (ClassificationDispatcher { sender }, receiver)
}

/// Non-blocking handle used to hand user messages to the background classifier.
#[derive(Clone)]
pub struct ClassificationDispatcher {
    sender: mpsc::Sender<ClassificationRequest>,
}

impl ClassificationDispatcher {
    /// Queues `request` without waiting. Returns false when the job was dropped.
    pub fn dispatch(&self, request: ClassificationRequest) -> bool {
        let message_id = request.message_id;
        match self.sender.try_send(request) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(%message_id, "Classification queue full, job dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!(%message_id, "Classification worker stopped, job dropped");
                false
            }
        }
    }
}

pub struct ClassificationWorker {
    receiver: mpsc::Receiver<ClassificationRequest>,
    service: Arc<ClassificationService>,
    timeout: Duration,
}

impl ClassificationWorker {
    pub fn new(
        receiver: mpsc::Receiver<ClassificationRequest>,
        service: Arc<ClassificationService>,
        timeout: Duration,
    ) -> Self {
        Self {
            receiver,
            service,
            timeout,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("Classification worker started");
        while let Some(request) = self.receiver.recv().await {
            let message_id = request.message_id;
            match tokio::time::timeout(self.timeout, self.service.classify(request)).await {
                Ok(Ok(outcome)) => {
                    tracing::debug!(%message_id, analysis_id = %outcome.analysis_id, "Classification stored");
                }
                Ok(Err(ClassificationError::AlreadyAnalyzed(_))) => {
                    tracing::debug!(%message_id, "Message already analysed, skipping");
                }
                Ok(Err(e)) => {
                    tracing::warn!(%message_id, error = %e, kind = %e.kind(), "Classification failed");
                }
                Err(_) => {
                    tracing::warn!(
                        %message_id,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "Classification timed out"
                    );
                }
            }
        }
        tracing::info!("Classification worker stopped: channel closed");
    }
}

/// Re-queues user messages left without an analysis. Returns how many were queued.
pub async fn requeue_unanalyzed(
    analysis_repository: &dyn AnalysisRepository,
    dispatcher: &ClassificationDispatcher,
    limit: usize,
) -> Result<usize, RepositoryError> {
    let pending = analysis_repository.unanalyzed_user_messages(limit).await?;
    let mut queued = 0;
    for message in pending {
        let accepted = dispatcher.dispatch(ClassificationRequest {
            message_id: message.id,
            conversation_id: message.conversation_id,
            message_content: message.content,
        });
        if !accepted {
            break;
        }
        queued += 1;
    }
    if queued > 0 {
        tracing::info!(queued, "Unanalysed user messages re-queued for classification");
    }
    Ok(queued)
}
