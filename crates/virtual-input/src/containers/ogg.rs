//! Minimal single-stream Ogg container writer for Opus packets arriving over
//! WebRTC (spec §4.2, "WebRTC ingest subcomponent"). Writes the mandatory
//! `OpusHead`/`OpusTags` header pages (RFC 7845) followed by one page per
//! audio packet — simpler than real encoders' segment-packing, but a valid
//! bitstream any Opus-aware demuxer can read.

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::Result;

const CRC_POLY: u32 = 0x04c1_1db7;

fn crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 24;
        let mut j = 0;
        while j < 8 {
            crc = if crc & 0x8000_0000 != 0 { (crc << 1) ^ CRC_POLY } else { crc << 1 };
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

fn ogg_crc32(data: &[u8]) -> u32 {
    let table = crc_table();
    let mut crc = 0u32;
    for &byte in data {
        crc = (crc << 8) ^ table[(((crc >> 24) ^ (byte as u32)) & 0xff) as usize];
    }
    crc
}

/// Ogg page flags (RFC 3533 §6).
const HEADER_TYPE_CONTINUED: u8 = 0x01;
const HEADER_TYPE_BOS: u8 = 0x02;
const HEADER_TYPE_EOS: u8 = 0x04;

fn build_page(serial: u32, sequence: u32, granule_position: u64, header_type: u8, packet: &[u8]) -> Vec<u8> {
    let mut segments = Vec::new();
    let mut remaining = packet.len();
    while remaining >= 255 {
        segments.push(255u8);
        remaining -= 255;
    }
    segments.push(remaining as u8);

    let mut page = Vec::with_capacity(27 + segments.len() + packet.len());
    page.extend_from_slice(b"OggS");
    page.push(0); // version
    page.push(header_type);
    page.extend_from_slice(&granule_position.to_le_bytes());
    page.extend_from_slice(&serial.to_le_bytes());
    page.extend_from_slice(&sequence.to_le_bytes());
    page.extend_from_slice(&0u32.to_le_bytes()); // checksum placeholder
    page.push(segments.len() as u8);
    page.extend_from_slice(&segments);
    page.extend_from_slice(packet);

    let crc = ogg_crc32(&page);
    page[22..26].copy_from_slice(&crc.to_le_bytes());
    page
}

fn opus_head(channels: u8, sample_rate: u32) -> Vec<u8> {
    let mut head = Vec::with_capacity(19);
    head.extend_from_slice(b"OpusHead");
    head.push(1); // version
    head.push(channels);
    head.extend_from_slice(&0u16.to_le_bytes()); // pre-skip
    head.extend_from_slice(&sample_rate.to_le_bytes());
    head.extend_from_slice(&0i16.to_le_bytes()); // output gain
    head.push(0); // channel mapping family
    head
}

fn opus_tags() -> Vec<u8> {
    let mut tags = Vec::new();
    tags.extend_from_slice(b"OpusTags");
    let vendor = b"vw-virtual-input";
    tags.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    tags.extend_from_slice(vendor);
    tags.extend_from_slice(&0u32.to_le_bytes()); // no user comments
    tags
}

pub struct OggOpusWriter<W> {
    inner: W,
    serial: u32,
    sequence: u32,
    granule_position: u64,
    headers_written: bool,
}

impl<W: AsyncWrite + Unpin> OggOpusWriter<W> {
    pub fn new(inner: W, serial: u32, channels: u8, sample_rate: u32) -> Self {
        let writer = Self { inner, serial, sequence: 0, granule_position: 0, headers_written: false };
        let _ = (channels, sample_rate);
        writer
    }

    async fn write_headers(&mut self, channels: u8, sample_rate: u32) -> Result<()> {
        let head_page = build_page(self.serial, self.sequence, 0, HEADER_TYPE_BOS, &opus_head(channels, sample_rate));
        self.inner.write_all(&head_page).await?;
        self.sequence += 1;

        let tags_page = build_page(self.serial, self.sequence, 0, 0, &opus_tags());
        self.inner.write_all(&tags_page).await?;
        self.sequence += 1;

        self.headers_written = true;
        Ok(())
    }

    /// Write one Opus packet as its own page. `samples` is the packet's
    /// duration in samples at the stream's sample rate, used to advance the
    /// granule position (Ogg/Opus's notion of playback position).
    pub async fn write_packet(&mut self, payload: &[u8], samples: u64, channels: u8, sample_rate: u32) -> Result<()> {
        if !self.headers_written {
            self.write_headers(channels, sample_rate).await?;
        }
        self.granule_position += samples;
        let page = build_page(self.serial, self.sequence, self.granule_position, 0, payload);
        self.inner.write_all(&page).await?;
        self.sequence += 1;
        Ok(())
    }

    pub async fn finish(&mut self) -> Result<()> {
        let eos = build_page(self.serial, self.sequence, self.granule_position, HEADER_TYPE_EOS, &[]);
        self.inner.write_all(&eos).await?;
        self.sequence += 1;
        Ok(())
    }
}

// silence unused-constant warning from continued-flag documentation
const _: u8 = HEADER_TYPE_CONTINUED;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc_matches_known_vector() {
        // The Ogg spec's reference CRC of an empty buffer is 0.
        assert_eq!(ogg_crc32(&[]), 0);
    }

    #[tokio::test]
    async fn writes_bos_then_tags_then_audio_pages() {
        let mut buf = Vec::new();
        {
            let mut writer = OggOpusWriter::new(&mut buf, 1, 2, 48_000);
            writer.write_packet(&[0xAA, 0xBB], 960, 2, 48_000).await.unwrap();
            writer.finish().await.unwrap();
        }
        let ogg_s_count = buf.windows(4).filter(|w| *w == b"OggS").count();
        assert_eq!(ogg_s_count, 4); // head, tags, one audio packet, eos
        assert!(buf.windows(8).any(|w| w == b"OpusHead"));
        assert!(buf.windows(8).any(|w| w == b"OpusTags"));
    }
}
