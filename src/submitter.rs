//! Order Submitter - client-side sender thread.
//!
//! Callers queue orders without blocking on the network; a dedicated thread
//! sends them in submission order. Finishing or dropping the submitter
//! sends everything still queued before the thread exits.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error};

use crate::command::Order;
use crate::error::{EngineError, Result};
use crate::flush_queue::FlushBarrierQueue;
use crate::transport::OrderTransport;

pub struct OrderSubmitter {
    queue: Arc<FlushBarrierQueue<Order>>,
    sender: Option<JoinHandle<Result<u64>>>,
}

impl OrderSubmitter {
    /// Start the sender thread over `transport`.
    pub fn spawn<T>(transport: T) -> Result<Self>
    where
        T: OrderTransport + Send + 'static,
    {
        let queue = Arc::new(FlushBarrierQueue::new());
        let sender = {
            let queue = Arc::clone(&queue);
            thread::Builder::new()
                .name("sender".into())
                .spawn(move || send_loop(transport, &queue))?
        };
        Ok(Self {
            queue,
            sender: Some(sender),
        })
    }

    /// Queue an order for sending.
    pub fn submit(&self, order: Order) {
        self.queue.push(order);
    }

    /// Block until every order submitted so far has been sent.
    pub fn wait_until_sent(&self) {
        self.queue.wait_until_empty();
    }

    /// Send everything still queued, stop the thread, and report how many
    /// orders went out.
    pub fn finish(mut self) -> Result<u64> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<u64> {
        let Some(sender) = self.sender.take() else {
            return Ok(0);
        };
        self.queue.wait_until_empty();
        self.queue.request_stop();
        sender
            .join()
            .map_err(|_| EngineError::ThreadPanicked("sender"))?
    }
}

impl Drop for OrderSubmitter {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            error!(%err, "order submitter stopped with error");
        }
    }
}

impl std::fmt::Debug for OrderSubmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderSubmitter")
            .field("queue", &self.queue)
            .field("running", &self.sender.is_some())
            .finish()
    }
}

fn send_loop<T: OrderTransport>(mut transport: T, queue: &FlushBarrierQueue<Order>) -> Result<u64> {
    let mut sent = 0u64;
    let mut failure = None;

    while let Some(order) = queue.pop_blocking() {
        if failure.is_some() {
            continue;
        }
        match transport.send(&order) {
            Ok(()) => sent += 1,
            Err(err) => {
                error!(%err, "send failed, discarding remaining orders");
                failure = Some(err);
            }
        }
    }

    debug!(sent, "sender stopped");
    match failure {
        Some(err) => Err(err),
        None => Ok(sent),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{mpsc, Mutex};

    #[test]
    fn test_submit_preserves_order() {
        let (tx, rx) = mpsc::channel();
        let submitter = OrderSubmitter::spawn(tx).unwrap();

        for i in 1..=50 {
            submitter.submit(Order::buy(1, i, "IBM", 10, 1));
        }
        assert_eq!(submitter.finish().unwrap(), 50);

        let ids: Vec<u32> = rx.iter().map(|o| o.user_order_id).collect();
        assert_eq!(ids, (1..=50).collect::<Vec<_>>());
    }

    #[test]
    fn test_drop_drains_queue() {
        let (tx, rx) = mpsc::channel();
        {
            let submitter = OrderSubmitter::spawn(tx).unwrap();
            submitter.submit(Order::flush());
            submitter.submit(Order::cancel(1, 1));
        }

        assert_eq!(rx.iter().count(), 2);
    }

    #[test]
    fn test_wait_until_sent() {
        let sent = Arc::new(Mutex::new(Vec::new()));

        struct Shared(Arc<Mutex<Vec<Order>>>);
        impl OrderTransport for Shared {
            fn send(&mut self, order: &Order) -> Result<()> {
                self.0.lock().unwrap().push(order.clone());
                Ok(())
            }
        }

        let submitter = OrderSubmitter::spawn(Shared(Arc::clone(&sent))).unwrap();
        submitter.submit(Order::buy(1, 1, "IBM", 10, 5));
        submitter.wait_until_sent();

        assert_eq!(sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_send_failure_is_reported() {
        let (tx, rx) = mpsc::channel();
        drop(rx);

        let submitter = OrderSubmitter::spawn(tx).unwrap();
        submitter.submit(Order::flush());

        assert!(matches!(submitter.finish(), Err(EngineError::Io(_))));
    }
}
