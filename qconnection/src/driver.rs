use std::{future, sync::Arc};

use tokio::time;

use crate::{
    connection::{Shared, now},
    transport::Transport,
};

/// The event loop of one connection.
///
/// Each turn it fires expired timers, flushes every datagram the engine
/// wants to send, then waits for a datagram, a handle's notification or
/// the next timer. It returns once the connection is closed.
pub(crate) async fn drive<T: Transport>(shared: Arc<Shared>, mut transport: T) {
    let mut transport_open = true;
    loop {
        let timeout = {
            let mut engine = shared.lock();
            let now = now();
            engine.handle_timeout(now);
            while let Some(datagram) = engine.poll_transmit(now) {
                if let Err(error) = transport.send(datagram) {
                    tracing::warn!(%error, "failed to send datagram");
                }
            }
            if engine.is_closed() {
                break;
            }
            engine.poll_timeout()
        };

        let sleep = async {
            match timeout {
                Some(deadline) => time::sleep_until(deadline.into()).await,
                None => future::pending().await,
            }
        };
        tokio::select! {
            datagram = future::poll_fn(|cx| transport.poll_recv(cx)), if transport_open => {
                match datagram {
                    Some(datagram) => shared.lock().recv_datagram(datagram, now()),
                    None => {
                        tracing::debug!("transport closed");
                        transport_open = false;
                    }
                }
            }
            _ = shared.notify.notified() => {}
            _ = sleep => {}
        }
    }
    tracing::debug!("driver stopped");
}
