//! An in-memory datagram link between two connections.
use std::{
    io,
    task::{Context, Poll},
};

use bytes::Bytes;
use rand::{Rng, SeedableRng, rngs::StdRng};
use tokio::sync::mpsc;

use crate::transport::Transport;

/// How badly the link treats datagrams, as probabilities per datagram.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LinkConditions {
    pub loss: f64,
    pub duplicate: f64,
    /// Held back and delivered after the next datagram.
    pub reorder: f64,
    pub seed: u64,
}

impl LinkConditions {
    pub fn perfect() -> Self {
        Self::default()
    }

    pub fn lossy(loss: f64, seed: u64) -> Self {
        Self {
            loss,
            seed,
            ..Self::default()
        }
    }
}

/// One end of a [`pair`].
#[derive(Debug)]
pub struct PipeEnd {
    tx: mpsc::UnboundedSender<Bytes>,
    rx: mpsc::UnboundedReceiver<Bytes>,
    conditions: LinkConditions,
    rng: StdRng,
    held: Option<Bytes>,
    sent: u64,
    dropped: u64,
}

/// Create a link, datagrams sent on one end arrive on the other under
/// the given conditions, applied to each direction independently.
pub fn pair(conditions: LinkConditions) -> (PipeEnd, PipeEnd) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    let end = |tx, rx, seed: u64| PipeEnd {
        tx,
        rx,
        conditions,
        rng: StdRng::seed_from_u64(seed),
        held: None,
        sent: 0,
        dropped: 0,
    };
    (
        end(a_tx, a_rx, conditions.seed),
        end(b_tx, b_rx, conditions.seed.wrapping_add(1)),
    )
}

impl PipeEnd {
    /// Datagrams handed to this end and those it dropped on purpose.
    pub fn stats(&self) -> (u64, u64) {
        (self.sent, self.dropped)
    }

    fn deliver(&self, datagram: Bytes) -> io::Result<()> {
        self.tx
            .send(datagram)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer end dropped"))
    }
}

impl Transport for PipeEnd {
    fn send(&mut self, datagram: Bytes) -> io::Result<()> {
        self.sent += 1;
        if self.rng.random_bool(self.conditions.loss) {
            self.dropped += 1;
            tracing::trace!(len = datagram.len(), "datagram dropped");
            return Ok(());
        }
        if self.rng.random_bool(self.conditions.duplicate) {
            self.deliver(datagram.clone())?;
        }
        if self.held.is_none() && self.rng.random_bool(self.conditions.reorder) {
            self.held = Some(datagram);
            return Ok(());
        }
        self.deliver(datagram)?;
        if let Some(held) = self.held.take() {
            self.deliver(held)?;
        }
        Ok(())
    }

    fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use std::{future::poll_fn, task::Waker};

    use super::*;

    #[tokio::test]
    async fn test_perfect_link() {
        let (mut a, mut b) = pair(LinkConditions::perfect());
        a.send(Bytes::from_static(b"one")).unwrap();
        a.send(Bytes::from_static(b"two")).unwrap();
        assert_eq!(poll_fn(|cx| b.poll_recv(cx)).await.unwrap(), "one");
        assert_eq!(poll_fn(|cx| b.poll_recv(cx)).await.unwrap(), "two");
        assert_eq!(a.stats(), (2, 0));
    }

    #[test]
    fn test_conditions() {
        let mut cx = Context::from_waker(Waker::noop());
        let (mut a, mut b) = pair(LinkConditions {
            loss: 1.0,
            ..LinkConditions::default()
        });
        a.send(Bytes::from_static(b"lost")).unwrap();
        assert!(b.poll_recv(&mut cx).is_pending());
        assert_eq!(a.stats(), (1, 1));

        let (mut a, mut b) = pair(LinkConditions {
            reorder: 1.0,
            ..LinkConditions::default()
        });
        a.send(Bytes::from_static(b"first")).unwrap();
        assert!(b.poll_recv(&mut cx).is_pending());
        a.send(Bytes::from_static(b"second")).unwrap();
        assert_eq!(b.poll_recv(&mut cx), Poll::Ready(Some(Bytes::from_static(b"second"))));
        assert_eq!(b.poll_recv(&mut cx), Poll::Ready(Some(Bytes::from_static(b"first"))));

        let (mut a, mut b) = pair(LinkConditions {
            duplicate: 1.0,
            ..LinkConditions::default()
        });
        a.send(Bytes::from_static(b"twice")).unwrap();
        assert!(b.poll_recv(&mut cx).is_ready());
        assert!(b.poll_recv(&mut cx).is_ready());
        assert!(b.poll_recv(&mut cx).is_pending());
    }
}
