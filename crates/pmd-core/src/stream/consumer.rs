use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    sync::{mpsc, oneshot},
};
use tracing::{trace, warn};

use pmd_model::{Level, Message};

use super::Parser;

/// Parses one output stream on its own task.
pub struct Consumer<R> {
    reader: R,
    parser: Parser,
}

impl<R> Consumer<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    pub fn new(reader: R, default: Level) -> Self {
        Self {
            reader,
            parser: Parser::new(default),
        }
    }

    /// Starts consuming; messages go to `tx` in parse order.
    ///
    /// The returned receiver completes exactly once, at EOF or on a read error. If `tx` is
    /// closed the stream is still read to the end so the writer never blocks on a full pipe.
    pub fn consume(self, tx: mpsc::Sender<Message>) -> oneshot::Receiver<()> {
        let (done_tx, done_rx) = oneshot::channel();
        tokio::spawn(async move {
            self.run(tx).await;
            let _ = done_tx.send(());
        });
        done_rx
    }

    async fn run(mut self, tx: mpsc::Sender<Message>) {
        let mut reader = BufReader::new(self.reader);
        let mut buf = Vec::new();
        let mut forward = true;

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    if buf.last() == Some(&b'\n') {
                        buf.pop();
                    }
                    let line = String::from_utf8_lossy(&buf);
                    if let Some(msg) = self.parser.line(&line)
                        && forward
                        && tx.send(msg).await.is_err()
                    {
                        forward = false;
                    }
                }
                Err(e) => {
                    warn!(target: "pmd.core.stream", error = %e, "stream read failed");
                    break;
                }
            }
        }

        if self.parser.is_open() {
            trace!(target: "pmd.core.stream", "discarding unterminated multi-line message");
        }
    }
}
