//! Bounded FIFO queues connecting the engine, workers, and collectors
//!
//! [`bounded`] builds a queue with a fixed capacity and splits it into a
//! [`QueueSender`] and a [`QueueReceiver`]; both sides clone freely, so any
//! number of producers and consumers can share one queue. A full queue
//! blocks producers (backpressure) and an empty queue blocks consumers.
//! Capacity zero turns the queue into a rendezvous point: each push
//! completes only when a pop takes the item.
//!
//! Closing is a sender-side, one-shot operation: consumers drain whatever
//! is queued and then observe the end of the stream.

mod channel;

pub use channel::{bounded, QueueError, QueueReceiver, QueueSender, TryPushError};
