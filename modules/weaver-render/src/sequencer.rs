//! The delegate stream: a write-ordered stream of streams.
//!
//! Chain a child at the moment its placeholder is encountered; the child
//! runs in the background (its producer is a spawned task writing into a
//! channel) while the output drains strictly in chain order. This is what
//! lets concurrent subtrees render in parallel without ever reordering the
//! emitted HTML.

use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::mpsc;

/// Writer half. Dropping it closes the output once every chained child has
/// drained.
pub struct Sequencer<T> {
    tx: mpsc::UnboundedSender<BoxStream<'static, T>>,
}

/// Create a sequencer and its ordered output stream.
pub fn sequencer<T: Send + 'static>() -> (Sequencer<T>, BoxStream<'static, T>) {
    let (tx, rx) = mpsc::unbounded_channel::<BoxStream<'static, T>>();
    let out = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|stream| (stream, rx))
    })
    .flatten()
    .boxed();
    (Sequencer { tx }, out)
}

impl<T: Send + 'static> Sequencer<T> {
    /// Chain a child stream at the current output position.
    pub fn chain(&self, stream: BoxStream<'static, T>) {
        // Send fails only when the output was dropped (consumer gone);
        // children observe that through their own closed channels.
        let _ = self.tx.send(stream);
    }

    /// Chain a single ready item.
    pub fn chain_item(&self, item: T) {
        self.chain(futures::stream::once(futures::future::ready(item)).boxed());
    }
}

/// A channel-backed child stream: the producer side goes to a spawned task,
/// the stream side gets chained.
pub fn channel_stream<T: Send + 'static>() -> (mpsc::UnboundedSender<T>, BoxStream<'static, T>) {
    let (tx, rx) = mpsc::unbounded_channel::<T>();
    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
    .boxed();
    (tx, stream)
}
