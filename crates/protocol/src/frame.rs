//! Frame layout for the logger's 64-byte bulk protocol
//!
//! Every exchange is one fixed-size frame in each direction. Outbound frames
//! carry a single command byte in byte 0; inbound frames either carry one
//! observation or report that the device has nothing buffered (a heartbeat).

/// Fixed size of every frame on the bulk endpoints.
pub const FRAME_LEN: usize = 64;

/// Command byte that opens a session.
pub const CMD_INIT: u8 = 0x04;

/// Command byte that requests the next buffered observation.
pub const CMD_POLL: u8 = 0x03;

/// One decoded (channel, value) pair from a data frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    /// Channel id of the sensor unit reporting into the logger.
    pub channel: u16,
    /// Undecoded sensor reading, prior to any unit conversion.
    pub raw: i16,
}

/// Classification of one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// A fresh observation for one channel.
    Data(Observation),
    /// Nothing buffered. Also the fallback for anomalous frames.
    Heartbeat,
}

/// Build an outbound command frame.
pub fn command_frame(command: u8) -> [u8; FRAME_LEN] {
    let mut frame = [0u8; FRAME_LEN];
    frame[0] = command;
    frame
}

impl Frame {
    /// Classify one inbound frame.
    ///
    /// Only a full-size frame whose first two bytes are not both zero carries
    /// data. The channel id is little-endian at bytes 2..4 while the raw
    /// value is high byte first at bytes 4..6 — the mismatch is the device's
    /// wire format, not ours to straighten out.
    ///
    /// Short or otherwise malformed frames read as heartbeats, so a
    /// glitching device degrades to "nothing new" instead of ending the
    /// session.
    pub fn parse(buf: &[u8]) -> Self {
        if buf.len() < FRAME_LEN || (buf[0] == 0 && buf[1] == 0) {
            return Frame::Heartbeat;
        }

        Frame::Data(Observation {
            channel: u16::from_le_bytes([buf[2], buf[3]]),
            raw: i16::from_be_bytes([buf[4], buf[5]]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_frame(payload: [u8; 4]) -> [u8; FRAME_LEN] {
        let mut frame = [0u8; FRAME_LEN];
        frame[0] = 0x01;
        frame[2..6].copy_from_slice(&payload);
        frame
    }

    #[test]
    fn test_command_frame_layout() {
        let frame = command_frame(CMD_POLL);
        assert_eq!(frame.len(), FRAME_LEN);
        assert_eq!(frame[0], CMD_POLL);
        assert!(frame[1..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_data_frame_mixed_byte_order() {
        // Channel id little-endian, raw value high byte first.
        let frame = data_frame([0x02, 0x00, 0x01, 0x2C]);
        assert_eq!(
            Frame::parse(&frame),
            Frame::Data(Observation {
                channel: 2,
                raw: 0x012C, // 300
            })
        );
    }

    #[test]
    fn test_channel_id_uses_both_bytes() {
        let frame = data_frame([0x34, 0x12, 0x00, 0x01]);
        match Frame::parse(&frame) {
            Frame::Data(obs) => assert_eq!(obs.channel, 0x1234),
            Frame::Heartbeat => panic!("expected data frame"),
        }
    }

    #[test]
    fn test_raw_value_is_signed() {
        let frame = data_frame([0x07, 0x00, 0xFF, 0x38]);
        match Frame::parse(&frame) {
            Frame::Data(obs) => assert_eq!(obs.raw, -200),
            Frame::Heartbeat => panic!("expected data frame"),
        }
    }

    #[test]
    fn test_zero_prefix_is_heartbeat() {
        let mut frame = [0u8; FRAME_LEN];
        // Bytes past the prefix are irrelevant for classification.
        frame[2] = 0x05;
        frame[4] = 0x10;
        assert_eq!(Frame::parse(&frame), Frame::Heartbeat);
    }

    #[test]
    fn test_short_frame_is_heartbeat() {
        let frame = data_frame([0x02, 0x00, 0x01, 0x2C]);
        assert_eq!(Frame::parse(&frame[..FRAME_LEN - 1]), Frame::Heartbeat);
        assert_eq!(Frame::parse(&[]), Frame::Heartbeat);
    }

    #[test]
    fn test_nonzero_second_byte_is_data() {
        let mut frame = [0u8; FRAME_LEN];
        frame[1] = 0x0A;
        frame[2] = 0x03;
        assert_eq!(
            Frame::parse(&frame),
            Frame::Data(Observation { channel: 3, raw: 0 })
        );
    }
}
