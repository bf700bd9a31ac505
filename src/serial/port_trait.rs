//! Write side of a UART, behind a trait so the radio and the GPS command
//! path can run against an in-memory port in tests

use async_trait::async_trait;
use std::io;
use tokio::io::AsyncWriteExt;

#[async_trait]
pub trait SerialPortIO: Send {
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    async fn flush(&mut self) -> io::Result<()>;

    /// Write one complete message and push it out of the UART
    async fn send(&mut self, message: &[u8]) -> io::Result<()> {
        self.write_all(message).await?;
        self.flush().await
    }
}

/// An open `tokio_serial` stream
pub struct TokioSerialPort {
    stream: tokio_serial::SerialStream,
}

impl TokioSerialPort {
    pub fn new(stream: tokio_serial::SerialStream) -> Self {
        Self { stream }
    }

    /// Give the stream back, e.g. to read sentences from it
    pub fn into_inner(self) -> tokio_serial::SerialStream {
        self.stream
    }
}

#[async_trait]
impl SerialPortIO for TokioSerialPort {
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(data).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.stream.flush().await
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct PortLog {
        writes: Vec<Vec<u8>>,
        flushes: usize,
        failure: Option<io::ErrorKind>,
    }

    /// In-memory port; clones share one log so a test can keep a handle
    /// after moving the port into the code under test
    #[derive(Clone, Default)]
    pub struct MockSerialPort {
        log: Arc<Mutex<PortLog>>,
    }

    impl MockSerialPort {
        pub fn new() -> Self {
            Self::default()
        }

        /// Every successful write, in order
        pub fn writes(&self) -> Vec<Vec<u8>> {
            self.log.lock().unwrap().writes.clone()
        }

        /// Every successful write joined as text
        pub fn written_text(&self) -> String {
            self.writes()
                .iter()
                .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
                .collect()
        }

        /// Make every later write fail with `kind`
        pub fn fail_writes(&self, kind: io::ErrorKind) {
            self.log.lock().unwrap().failure = Some(kind);
        }

        pub fn flushes(&self) -> usize {
            self.log.lock().unwrap().flushes
        }
    }

    #[async_trait]
    impl SerialPortIO for MockSerialPort {
        async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
            let mut log = self.log.lock().unwrap();
            if let Some(kind) = log.failure {
                return Err(io::Error::new(kind, "injected write failure"));
            }
            log.writes.push(data.to_vec());
            Ok(())
        }

        async fn flush(&mut self) -> io::Result<()> {
            self.log.lock().unwrap().flushes += 1;
            Ok(())
        }
    }
}
