use serde::Deserialize;

/// Pixel format on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum TransportFormat {
    #[serde(rename = "yuv422_10bit")]
    Yuv422Bit10,
    #[serde(rename = "yuv422_8bit")]
    Yuv422Bit8,
    #[serde(rename = "rgb8")]
    Rgb8,
}

/// Pixel format of the frames handed to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum OutputFormat {
    /// Planar 4:2:2, 16-bit little-endian containers.
    #[serde(rename = "yuv422p10le")]
    Yuv422Planar10Le,
    #[serde(rename = "uyvy")]
    Uyvy,
    #[serde(rename = "rgb8")]
    Rgb8,
    #[serde(rename = "yuv420p8")]
    Yuv420Planar8,
    /// Packed 10-bit, 6 pixels per 16 bytes, lines padded to 48 pixels.
    #[serde(rename = "v210")]
    V210,
}

impl OutputFormat {
    /// Bytes needed for one frame (or one field when `interlaced`).
    /// `None` when the size does not fit in `usize`.
    pub fn frame_size(self, width: u32, height: u32, interlaced: bool) -> Option<usize> {
        let w = width as usize;
        let h = if interlaced {
            height as usize / 2
        } else {
            height as usize
        };
        let pixels = w.checked_mul(h);
        match self {
            OutputFormat::Yuv422Planar10Le => pixels?.checked_mul(4),
            OutputFormat::Uyvy => pixels?.checked_mul(2),
            OutputFormat::Rgb8 => pixels?.checked_mul(3),
            OutputFormat::Yuv420Planar8 => pixels?.checked_mul(3).map(|n| n / 2),
            OutputFormat::V210 => w.div_ceil(48).checked_mul(128)?.checked_mul(h),
        }
    }
}

/// One decoded frame lent out by a pipeline.
///
/// The producer keeps ownership of the underlying buffer: every frame taken
/// from a pipeline has to be handed back to it exactly once.
#[derive(Debug)]
pub struct Frame {
    /// Primary data plane. At least the session frame size long.
    pub data: Vec<u8>,
    pub seq: u64,
    pub captured_at_ms: i64,
    /// Producer-side framebuffer slot this frame lives in.
    pub buffer_index: usize,
    /// Optional side-channel block attached by the sender.
    pub user_meta: Option<Vec<u8>>,
}

/// Application metadata carried alongside a frame.
///
/// Binary layout (fixed size, 68 bytes):
///   [0..4]   idx    (i32 little-endian)
///   [4..68]  dummy  (UTF-8 text, NUL padded)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserMeta {
    pub idx: i32,
    pub dummy: String,
}

const USER_META_TEXT_LEN: usize = 64;

impl UserMeta {
    pub const SIZE: usize = 4 + USER_META_TEXT_LEN;

    pub fn new(idx: i32, dummy: impl Into<String>) -> Self {
        Self {
            idx,
            dummy: dummy.into(),
        }
    }

    /// Encode into the fixed layout. Text longer than the field is truncated.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(&self.idx.to_le_bytes());
        let text = self.dummy.as_bytes();
        let n = text.len().min(USER_META_TEXT_LEN - 1);
        buf.extend_from_slice(&text[..n]);
        buf.resize(Self::SIZE, 0);
        buf
    }

    /// Decode a metadata block, checking the declared size first.
    pub fn decode(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() != Self::SIZE {
            return Err(FrameError::MetaSizeMismatch {
                got: data.len(),
                expected: Self::SIZE,
            });
        }
        Ok(Self::decode_lossy(data))
    }

    /// Best-effort decode of whatever bytes are present, for diagnostics.
    pub fn decode_lossy(data: &[u8]) -> Self {
        let mut idx_bytes = [0u8; 4];
        let n = data.len().min(4);
        idx_bytes[..n].copy_from_slice(&data[..n]);
        let text = data.get(4..).unwrap_or(&[]);
        let text = &text[..text.len().min(USER_META_TEXT_LEN)];
        let end = text.iter().position(|&b| b == 0).unwrap_or(text.len());
        Self {
            idx: i32::from_le_bytes(idx_bytes),
            dummy: String::from_utf8_lossy(&text[..end]).into_owned(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("user meta size mismatch: got {got} bytes, expected {expected}")]
    MetaSizeMismatch { got: usize, expected: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_sizes_1080p() {
        let size = |f: OutputFormat| f.frame_size(1920, 1080, false);
        assert_eq!(size(OutputFormat::Yuv422Planar10Le), Some(8_294_400));
        assert_eq!(size(OutputFormat::Uyvy), Some(4_147_200));
        assert_eq!(size(OutputFormat::Rgb8), Some(6_220_800));
        assert_eq!(size(OutputFormat::Yuv420Planar8), Some(3_110_400));
        // 1920 is a multiple of 48: 40 groups of 128 bytes per line
        assert_eq!(size(OutputFormat::V210), Some(5120 * 1080));
    }

    #[test]
    fn v210_pads_lines() {
        // 1280 / 48 = 26.67 -> 27 groups
        assert_eq!(OutputFormat::V210.frame_size(1280, 720, false), Some(27 * 128 * 720));
    }

    #[test]
    fn interlaced_is_one_field() {
        assert_eq!(
            OutputFormat::Uyvy.frame_size(1920, 1080, true),
            OutputFormat::Uyvy.frame_size(1920, 540, false)
        );
    }

    #[test]
    fn user_meta_layout() {
        let bytes = UserMeta::new(7, "hello").encode();
        assert_eq!(bytes.len(), UserMeta::SIZE);
        assert_eq!(&bytes[0..4], &7i32.to_le_bytes());
        assert_eq!(&bytes[4..9], b"hello");
        assert!(bytes[9..].iter().all(|&b| b == 0));
        assert_eq!(UserMeta::decode(&bytes).unwrap(), UserMeta::new(7, "hello"));
    }

    #[test]
    fn user_meta_long_text_truncated() {
        let long = "x".repeat(200);
        let bytes = UserMeta::new(1, long).encode();
        assert_eq!(bytes.len(), UserMeta::SIZE);
        let decoded = UserMeta::decode(&bytes).unwrap();
        assert_eq!(decoded.dummy.len(), 63);
    }

    #[test]
    fn user_meta_wrong_size() {
        let err = UserMeta::decode(&[0; 10]).unwrap_err();
        assert!(matches!(
            err,
            FrameError::MetaSizeMismatch { got: 10, expected: 68 }
        ));
        // still readable for logging
        let lossy = UserMeta::decode_lossy(&[3, 0, 0, 0, b'a', b'b']);
        assert_eq!(lossy, UserMeta::new(3, "ab"));
    }

    #[test]
    fn oversized_frame_is_none() {
        assert_eq!(OutputFormat::Yuv422Planar10Le.frame_size(u32::MAX, u32::MAX, false), None);
        assert_eq!(OutputFormat::V210.frame_size(u32::MAX, u32::MAX, false), None);
    }
}
