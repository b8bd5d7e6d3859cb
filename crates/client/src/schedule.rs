use std::future::Future;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A spawned piece of background work that can be revoked.
///
/// Dropping the handle revokes the work: the token is cancelled, and work
/// written against it stops at its next cancellation point.
#[derive(Debug)]
pub struct ScheduledTask {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl ScheduledTask {
    pub fn spawn<F, Fut>(work: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let join = tokio::spawn(work(token.clone()));
        ScheduledTask { token, join }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// A single revocable request whose reply is delivered through a oneshot.
#[derive(Debug)]
pub struct ScheduledRequest<T> {
    task: ScheduledTask,
    reply: oneshot::Receiver<T>,
}

impl<T: Send + 'static> ScheduledRequest<T> {
    pub fn spawn<Fut>(request: Fut) -> Self
    where
        Fut: Future<Output = T> + Send + 'static,
    {
        let (tx, reply) = oneshot::channel();
        let task = ScheduledTask::spawn(move |token| async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                value = request => {
                    // A reply produced after revocation is discarded.
                    if !token.is_cancelled() {
                        let _ = tx.send(value);
                    }
                }
            }
        });
        ScheduledRequest { task, reply }
    }

    /// Waits for the reply. `None` when the request was revoked or its task
    /// ended without replying.
    pub async fn reply(&mut self) -> Option<T> {
        (&mut self.reply).await.ok()
    }

    pub fn cancel(&self) {
        self.task.cancel();
    }
}
