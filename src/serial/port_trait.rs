//! Trait abstraction for the device write side to enable testing

use async_trait::async_trait;
use std::io;
use tokio::io::WriteHalf;
use tokio_serial::SerialStream;

/// Trait for writing commands to the device
#[async_trait]
pub trait DeviceWriter: Send {
    /// Write all data to the device
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Flush the output buffer
    async fn flush(&mut self) -> io::Result<()>;
}

/// Write half of a `tokio_serial::SerialStream` implementing [`DeviceWriter`]
pub struct SerialWriter {
    half: WriteHalf<SerialStream>,
}

impl SerialWriter {
    pub fn new(half: WriteHalf<SerialStream>) -> Self {
        Self { half }
    }
}

#[async_trait]
impl DeviceWriter for SerialWriter {
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;
        self.half.write_all(data).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;
        self.half.flush().await
    }
}


#[cfg(test)]
mod tests {
    use super::mocks::MockDeviceWriter;
    use super::*;

    #[test]
    fn test_mock_records_writes_in_order() {
        tokio_test::block_on(async {
            let mut mock = MockDeviceWriter::new();
            mock.write_all(b"s\n").await.unwrap();
            mock.write_all(b"z\n").await.unwrap();
            mock.flush().await.unwrap();
            assert_eq!(
                mock.get_written_data(),
                vec![b"s\n".to_vec(), b"z\n".to_vec()]
            );
        });
    }

    #[test]
    fn test_mock_write_error_is_returned() {
        tokio_test::block_on(async {
            let mut mock = MockDeviceWriter::new();
            mock.set_write_error(io::ErrorKind::BrokenPipe);
            let err = mock.write_all(b"s\n").await.unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        });
    }
}
