/// PING frame.
///
/// ```text
/// PING Frame {
///   Type (i) = 0x01,
/// }
/// ```
///
/// Carries no content, used to elicit an acknowledgment, e.g. as a probe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PingFrame;

const PING_FRAME_TYPE: u8 = 0x01;

impl super::BeFrame for PingFrame {
    fn frame_type(&self) -> super::FrameType {
        super::FrameType::Ping
    }
}

impl<T: bytes::BufMut> super::io::WriteFrame<PingFrame> for T {
    fn put_frame(&mut self, _: &PingFrame) {
        self.put_u8(PING_FRAME_TYPE);
    }
}

#[cfg(test)]
mod tests {
    use super::{PING_FRAME_TYPE, PingFrame};
    use crate::frame::io::WriteFrame;

    #[test]
    fn test_write_ping_frame() {
        let mut buf = Vec::new();
        buf.put_frame(&PingFrame);
        assert_eq!(buf, vec![PING_FRAME_TYPE]);
    }
}
