/// PADDING frame.
///
/// ```text
/// PADDING Frame {
///   Type (i) = 0x00,
/// }
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaddingFrame;

const PADDING_FRAME_TYPE: u8 = 0x00;

impl super::BeFrame for PaddingFrame {
    fn frame_type(&self) -> super::FrameType {
        super::FrameType::Padding
    }
}

impl<T: bytes::BufMut> super::io::WriteFrame<PaddingFrame> for T {
    fn put_frame(&mut self, _: &PaddingFrame) {
        self.put_u8(PADDING_FRAME_TYPE);
    }
}
