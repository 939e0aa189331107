use std::{
    fmt,
    pin::Pin,
    task::{Context, Poll},
};

use futures_core::Stream;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
    task::JoinHandle,
};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;

use crate::{parse_message, stream_json::record_text, ClaudeError, Message, ProcessOutput};

/// One item of a [`MessageStream`].
pub type MessageOrError = Result<Message, ClaudeError>;

/// Messages decoded from a running `claude --output-format stream-json` process.
///
/// Items arrive in the order the CLI printed them. At most one `Err` item is produced and it
/// is always the last one. Closing or dropping the stream cancels the operation: the child is
/// killed if it is still running, reaped, and the background reader exits.
pub struct MessageStream {
    rx: mpsc::Receiver<MessageOrError>,
    cancel: CancellationToken,
    reader: Option<JoinHandle<()>>,
    _guard: DropGuard,
}

impl MessageStream {
    /// Starts the background reader over `output`.
    ///
    /// `cancel` governs the whole operation and is cancelled by the reader on every exit path.
    pub(crate) fn spawn(output: Box<dyn ProcessOutput>, cancel: CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel(1);
        let reader = tokio::spawn(pump_messages(output, tx, cancel.clone()));
        Self {
            rx,
            _guard: cancel.clone().drop_guard(),
            cancel,
            reader: Some(reader),
        }
    }

    /// Waits for the next item; `None` once the stream has ended.
    pub async fn next_message(&mut self) -> Option<MessageOrError> {
        self.rx.recv().await
    }

    /// Cancels the operation. Items not yet received may be dropped. Safe to call repeatedly.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancels the operation and waits until the child has been reaped and the reader has exited.
    pub async fn shutdown(mut self) {
        self.close();
        if let Some(reader) = self.reader.take() {
            if let Err(err) = reader.await {
                debug!(error = %err, "claude stream reader did not finish cleanly");
            }
        }
    }
}

impl fmt::Debug for MessageStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageStream")
            .field("closed", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Stream for MessageStream {
    type Item = MessageOrError;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

/// Why the reader stopped consuming stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadOutcome {
    /// Stdout reached EOF and every item was delivered.
    Exhausted,
    /// A terminal error item was delivered (or offered) and reading stopped.
    Failed,
    /// The governing token fired or the consumer went away.
    Cancelled,
}

async fn pump_messages(
    mut output: Box<dyn ProcessOutput>,
    tx: mpsc::Sender<MessageOrError>,
    cancel: CancellationToken,
) {
    let outcome = forward_messages(&mut output, &tx, &cancel).await;
    if outcome != ReadOutcome::Exhausted {
        // Stop a child that may still be writing before reaping it.
        cancel.cancel();
    }

    match output.close().await {
        Ok(()) => {}
        Err(err) if outcome == ReadOutcome::Exhausted => {
            debug!(error = %err, "claude failed after its output was consumed");
            deliver(&tx, &cancel, Err(err)).await;
        }
        Err(err) => debug!(error = %err, ?outcome, "claude stream closed early"),
    }

    cancel.cancel();
}

async fn forward_messages(
    output: &mut Box<dyn ProcessOutput>,
    tx: &mpsc::Sender<MessageOrError>,
    cancel: &CancellationToken,
) -> ReadOutcome {
    let mut lines = BufReader::new(output).lines();
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return ReadOutcome::Cancelled,
            next = lines.next_line() => next,
        };

        let line = match next {
            Ok(Some(line)) => line,
            Ok(None) => return ReadOutcome::Exhausted,
            Err(err) => {
                deliver(tx, cancel, Err(ClaudeError::StdoutRead(err))).await;
                return ReadOutcome::Failed;
            }
        };

        let Some(record) = record_text(&line) else {
            continue;
        };

        match parse_message(record) {
            Ok(message) => {
                if !deliver(tx, cancel, Ok(message)).await {
                    return ReadOutcome::Cancelled;
                }
            }
            Err(err) => {
                debug!(error = %err, "undecodable claude stream line");
                deliver(tx, cancel, Err(err.into())).await;
                return ReadOutcome::Failed;
            }
        }
    }
}

/// Offers `item` to the consumer unless the operation is cancelled first.
async fn deliver(
    tx: &mpsc::Sender<MessageOrError>,
    cancel: &CancellationToken,
    item: MessageOrError,
) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        sent = tx.send(item) => sent.is_ok(),
    }
}
