use log::warn;

use crate::asf::guid::{
    EXTENSION_OUTPUT_CLEAN_POINT, EXTENSION_PIXEL_ASPECT_RATIO, EXTENSION_TIMING_REPLICATION,
    EXTENSION_VIDEO_FRAME,
};
use crate::asf::payload::PacketSink;
use crate::asf::track::{ExtensionDescriptor, VARIABLE_EXTENSION_SIZE};
use crate::bits::reader::read_u16_le;

// video frame marker flag byte
const VIDEO_FRAME_NEW_FRAME: u8 = 0x08;
const VIDEO_FRAME_TYPE_MASK: u8 = 0x07;
const VIDEO_FRAME_TYPE_IFRAME: u8 = 0x01;

/// Walk the replicated-data extension area in the track's declared
/// descriptor order, surfacing keyframe flags and aspect-ratio hints.
///
/// A bounds violation stops extension parsing for this payload entirely; a
/// size mismatch on a recognized identifier skips that one extension.
pub fn parse_extensions(
    descriptors: &[ExtensionDescriptor],
    data: &[u8],
    stream_number: u8,
    keyframe: &mut bool,
    sink: &mut dyn PacketSink,
) {
    let mut pos = 0usize;
    for desc in descriptors {
        let size = if desc.size == VARIABLE_EXTENSION_SIZE {
            match read_u16_le(data, &mut pos) {
                Some(s) => s as usize,
                None => return,
            }
        } else {
            desc.size as usize
        };
        if size > data.len() - pos {
            return;
        }
        let body = &data[pos..pos + size];
        pos += size;

        if desc.id == EXTENSION_OUTPUT_CLEAN_POINT {
            if size == 1 {
                *keyframe |= body[0] != 0;
            } else {
                warn!("clean point extension has size {}, expected 1", size);
            }
        } else if desc.id == EXTENSION_VIDEO_FRAME {
            if size == 4 {
                let flags = body[0];
                if flags & VIDEO_FRAME_NEW_FRAME != 0
                    && flags & VIDEO_FRAME_TYPE_MASK == VIDEO_FRAME_TYPE_IFRAME
                {
                    *keyframe = true;
                }
            } else {
                warn!("video frame extension has size {}, expected 4", size);
            }
        } else if desc.id == EXTENSION_PIXEL_ASPECT_RATIO {
            if size == 2 {
                sink.on_aspect_ratio(stream_number, body[0], body[1]);
            } else {
                warn!("aspect ratio extension has size {}, expected 2", size);
            }
        } else if desc.id == EXTENSION_TIMING_REPLICATION {
            // recognized but not decoded
            if size != 48 {
                warn!("timing replication extension has size {}, expected 48", size);
            }
        }
        // anything else is skipped by its resolved size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asf::guid::Guid;
    use crate::asf::payload::PacketSink;
    use crate::asf::track::Frame;

    #[derive(Default)]
    struct Recorder {
        aspect: Vec<(u8, u8, u8)>,
    }

    impl PacketSink for Recorder {
        fn send(&mut self, _stream_number: u8, _frame: Frame) {}

        fn on_aspect_ratio(&mut self, stream_number: u8, x: u8, y: u8) {
            self.aspect.push((stream_number, x, y));
        }
    }

    fn desc(id: Guid, size: u16) -> ExtensionDescriptor {
        ExtensionDescriptor { id, size }
    }

    #[test]
    fn test_clean_point_sets_keyframe() {
        let descriptors = [desc(EXTENSION_OUTPUT_CLEAN_POINT, 1)];
        let mut keyframe = false;
        let mut sink = Recorder::default();
        parse_extensions(&descriptors, &[1], 2, &mut keyframe, &mut sink);
        assert!(keyframe);

        keyframe = false;
        parse_extensions(&descriptors, &[0], 2, &mut keyframe, &mut sink);
        assert!(!keyframe);
    }

    #[test]
    fn test_video_frame_requires_new_intra() {
        let descriptors = [desc(EXTENSION_VIDEO_FRAME, 4)];
        let mut sink = Recorder::default();

        let mut keyframe = false;
        parse_extensions(&descriptors, &[0x09, 0, 0, 0], 2, &mut keyframe, &mut sink);
        assert!(keyframe);

        // new frame bit set but not an intra frame
        keyframe = false;
        parse_extensions(&descriptors, &[0x0a, 0, 0, 0], 2, &mut keyframe, &mut sink);
        assert!(!keyframe);

        // intra type without the new frame bit
        keyframe = false;
        parse_extensions(&descriptors, &[0x01, 0, 0, 0], 2, &mut keyframe, &mut sink);
        assert!(!keyframe);
    }

    #[test]
    fn test_aspect_ratio_callback() {
        let descriptors = [desc(EXTENSION_PIXEL_ASPECT_RATIO, 2)];
        let mut keyframe = false;
        let mut sink = Recorder::default();
        parse_extensions(&descriptors, &[16, 9], 7, &mut keyframe, &mut sink);
        assert_eq!(sink.aspect, vec![(7, 16, 9)]);
    }

    #[test]
    fn test_variable_size_uses_length_prefix() {
        let unknown = Guid([0xee; 16]);
        let descriptors = [
            desc(unknown, VARIABLE_EXTENSION_SIZE),
            desc(EXTENSION_OUTPUT_CLEAN_POINT, 1),
        ];
        // 3-byte variable instance, then the clean point byte
        let data = [3, 0, 0xaa, 0xbb, 0xcc, 1];
        let mut keyframe = false;
        let mut sink = Recorder::default();
        parse_extensions(&descriptors, &data, 2, &mut keyframe, &mut sink);
        assert!(keyframe);
    }

    #[test]
    fn test_bounds_violation_stops_all() {
        let descriptors = [
            desc(Guid([0xee; 16]), 8),
            desc(EXTENSION_OUTPUT_CLEAN_POINT, 1),
        ];
        // only 4 bytes available for the 8-byte extension
        let data = [0, 0, 0, 0];
        let mut keyframe = false;
        let mut sink = Recorder::default();
        parse_extensions(&descriptors, &data, 2, &mut keyframe, &mut sink);
        assert!(!keyframe);
    }
}
