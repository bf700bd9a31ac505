//! # Sensor Slot
//!
//! Last-value storage shared between one acquisition task (the writer) and
//! the scheduler (any number of readers). Backed by a `tokio::sync::watch`
//! channel, so a reader always observes a whole [`Reading`] and never a
//! half-written one.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;

/// The most recent value of a sensor, if it has one
#[derive(Debug, Clone, PartialEq)]
pub struct Reading<T> {
    /// Latest decoded value; `None` until the first good reading or after a clear
    pub value: Option<T>,
    /// When the slot was last written
    pub last_updated: Option<DateTime<Utc>>,
}

impl<T> Default for Reading<T> {
    fn default() -> Self {
        Self {
            value: None,
            last_updated: None,
        }
    }
}

/// Writing half of a slot, owned by the sensor's acquisition task
#[derive(Debug)]
pub struct SlotWriter<T> {
    tx: Arc<watch::Sender<Reading<T>>>,
}

impl<T> Clone for SlotWriter<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

/// Reading half of a slot
#[derive(Debug, Clone)]
pub struct SlotReader<T> {
    rx: watch::Receiver<Reading<T>>,
}

/// Create an empty slot
pub fn slot<T>() -> (SlotWriter<T>, SlotReader<T>) {
    let (tx, rx) = watch::channel(Reading::default());
    (SlotWriter { tx: Arc::new(tx) }, SlotReader { rx })
}

impl<T> SlotWriter<T> {
    /// Replace the slot's value
    pub fn publish(&self, value: T) {
        let now = Utc::now();
        self.tx.send_replace(Reading {
            value: Some(value),
            last_updated: Some(now),
        });
    }

    /// Mark the slot as holding no value
    pub fn clear(&self) {
        let now = Utc::now();
        self.tx.send_replace(Reading {
            value: None,
            last_updated: Some(now),
        });
    }
}

impl<T: Clone> SlotReader<T> {
    /// Copy of the latest reading
    pub fn latest(&self) -> Reading<T> {
        self.rx.borrow().clone()
    }

    /// Copy of the latest value only
    pub fn value(&self) -> Option<T> {
        self.rx.borrow().value.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_slot_is_empty() {
        let (_writer, reader) = slot::<f64>();
        assert_eq!(reader.latest(), Reading::default());
        assert_eq!(reader.value(), None);
    }

    #[test]
    fn test_publish_is_visible_to_all_readers() {
        let (writer, reader) = slot();
        let second = reader.clone();

        writer.publish(21.5);

        assert_eq!(reader.value(), Some(21.5));
        assert_eq!(second.value(), Some(21.5));
        assert!(reader.latest().last_updated.is_some());
    }

    #[test]
    fn test_clear_drops_value_but_stamps_time() {
        let (writer, reader) = slot();
        writer.publish((1013.25, 18.0));
        writer.clear();

        let reading = reader.latest();
        assert_eq!(reading.value, None);
        assert!(reading.last_updated.is_some());
    }

    #[test]
    fn test_publish_without_readers_does_not_fail() {
        let (writer, reader) = slot();
        drop(reader);
        writer.publish(1u8);
        writer.clone().clear();
    }

    #[test]
    fn test_publish_from_another_thread() {
        let (writer, reader) = slot();
        let handle = std::thread::spawn(move || {
            for i in 0..100u32 {
                writer.publish((i, i * 2));
            }
        });
        handle.join().unwrap();

        let (a, b) = reader.value().unwrap();
        assert_eq!(b, a * 2);
        assert_eq!(a, 99);
    }
}
