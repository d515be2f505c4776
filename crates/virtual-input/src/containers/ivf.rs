//! Minimal IVF container writer for VP8/VP9 frames arriving over WebRTC
//! (spec §4.2, "WebRTC ingest subcomponent").

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::Result;

/// Four-character codec tag embedded in the IVF file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IvfCodec {
    Vp8,
    Vp9,
}

impl IvfCodec {
    fn fourcc(self) -> [u8; 4] {
        match self {
            Self::Vp8 => *b"VP80",
            Self::Vp9 => *b"VP90",
        }
    }
}

/// Writes frames in IVF format to any `AsyncWrite` (a FIFO, in practice).
pub struct IvfWriter<W> {
    inner: W,
    frame_count: u32,
    header_written: bool,
    codec: IvfCodec,
    width: u16,
    height: u16,
    timebase_den: u32,
    timebase_num: u32,
}

impl<W: AsyncWrite + Unpin> IvfWriter<W> {
    pub fn new(inner: W, codec: IvfCodec, width: u16, height: u16) -> Self {
        Self {
            inner,
            frame_count: 0,
            header_written: false,
            codec,
            width,
            height,
            timebase_den: 90_000,
            timebase_num: 1,
        }
    }

    async fn write_file_header(&mut self) -> Result<()> {
        let mut header = Vec::with_capacity(32);
        header.extend_from_slice(b"DKIF");
        header.extend_from_slice(&0u16.to_le_bytes()); // version
        header.extend_from_slice(&32u16.to_le_bytes()); // header length
        header.extend_from_slice(&self.codec.fourcc());
        header.extend_from_slice(&self.width.to_le_bytes());
        header.extend_from_slice(&self.height.to_le_bytes());
        header.extend_from_slice(&self.timebase_den.to_le_bytes());
        header.extend_from_slice(&self.timebase_num.to_le_bytes());
        header.extend_from_slice(&u32::MAX.to_le_bytes()); // frame count, unknown up front
        header.extend_from_slice(&0u32.to_le_bytes()); // reserved
        self.inner.write_all(&header).await?;
        self.header_written = true;
        Ok(())
    }

    /// Append one frame's encoded payload, with its presentation timestamp
    /// expressed in `timebase` units.
    pub async fn write_frame(&mut self, payload: &[u8], timestamp: u64) -> Result<()> {
        if !self.header_written {
            self.write_file_header().await?;
        }
        let mut frame_header = Vec::with_capacity(12);
        frame_header.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame_header.extend_from_slice(&timestamp.to_le_bytes());
        self.inner.write_all(&frame_header).await?;
        self.inner.write_all(payload).await?;
        self.frame_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_dkif_magic_once() {
        let mut buf = Vec::new();
        {
            let mut writer = IvfWriter::new(&mut buf, IvfCodec::Vp8, 1280, 720);
            writer.write_frame(&[1, 2, 3], 0).await.unwrap();
            writer.write_frame(&[4, 5], 3000).await.unwrap();
        }
        assert_eq!(&buf[0..4], b"DKIF");
        assert_eq!(buf.iter().filter(|&&b| b == b'D').count() >= 1, true);
        // exactly one file header: frame-count field sits at offset 24 and is
        // untouched (we don't rewrite it), so the fixed 32-byte header plus
        // two (12-byte header + payload) frames account for the whole buffer
        let expected_len = 32 + (12 + 3) + (12 + 2);
        assert_eq!(buf.len(), expected_len);
    }
}
