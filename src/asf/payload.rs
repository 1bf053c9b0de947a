use log::{debug, warn};

use crate::asf::extensions::parse_extensions;
use crate::asf::packet::{read_packet_header, PacketHeader, PacketRead};
use crate::asf::track::{Frame, TrackSet};
use crate::bits::reader::{read_u32_le, read_var_le};
use crate::errors::{MediaDemuxResult, PacketError};
use crate::streams::ByteCursor;

/// Collaborator receiving reconstructed frames and clock/metadata updates.
pub trait PacketSink {
    /// A media object is complete; ownership of the frame transfers out.
    fn send(&mut self, stream_number: u8, frame: Frame);

    /// Return true to drop this stream's data without emitting anything.
    fn should_drop(&mut self, _stream_number: u8, _keyframe: bool) -> bool {
        false
    }

    /// Per-track presentation clock update, gated by the preroll window.
    fn on_presentation_time(&mut self, _stream_number: u8, _time: u64) {}

    /// Global send-time clock update, once per payload.
    fn on_send_time(&mut self, _time: u64) {}

    fn on_aspect_ratio(&mut self, _stream_number: u8, _x: u8, _y: u8) {}
}

/// Caller-supplied demultiplexer parameters.
///
/// `min_packet_size` must be the true on-disk packet size whenever
/// `min_packet_size == max_packet_size`: that equality selects the
/// fatal-on-unsupported-header policy, since a fixed grid cannot be
/// resynchronized by skipping.
#[derive(Debug, Clone, Copy)]
pub struct DemuxOptions {
    pub min_packet_size: u32,
    pub max_packet_size: u32,
    /// Milliseconds subtracted from raw presentation times.
    pub preroll: u64,
    /// Send-time base of the preroll window; presentation-clock updates are
    /// suppressed until the send time passes `preroll_start + preroll`.
    pub preroll_start: u64,
}

/// How one packet-demux step ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DemuxStatus {
    /// One packet was consumed and its payloads dispatched.
    Demuxed,
    /// An unsupported packet was skipped on a variable-size grid.
    Recovered,
    EndOfStream,
}

/// View over one packet's bytes. Parsing reads from a copied peek window;
/// payload bytes are consumed from the stream, which invalidates the window,
/// so it is re-peeked after every consumption.
struct PacketWindow<'a> {
    cursor: &'a mut dyn ByteCursor,
    buf: Vec<u8>,
    /// Bytes already consumed from the stream within this packet. `buf[0]`
    /// corresponds to this packet offset.
    consumed: usize,
    length: usize,
}

impl<'a> PacketWindow<'a> {
    fn open(cursor: &'a mut dyn ByteCursor, length: usize) -> MediaDemuxResult<Option<Self>> {
        let peeked = cursor.peek(length)?;
        if peeked.len() < length {
            return Ok(None);
        }
        let buf = peeked.to_vec();
        Ok(Some(Self {
            cursor,
            buf,
            consumed: 0,
            length,
        }))
    }

    fn byte(&self, at: usize) -> Option<u8> {
        at.checked_sub(self.consumed)
            .and_then(|i| self.buf.get(i))
            .copied()
    }

    fn slice(&self, at: usize, len: usize) -> Option<&[u8]> {
        let i = at.checked_sub(self.consumed)?;
        self.buf.get(i..i.checked_add(len)?)
    }

    /// Decode a variable-width field at `at`, advancing it on success.
    fn read_field(&self, code: u8, at: &mut usize, default: u32) -> Option<u32> {
        let mut i = at.checked_sub(self.consumed)?;
        let v = read_var_le(code, &self.buf, &mut i, default)?;
        *at = self.consumed + i;
        Some(v)
    }

    /// Consume stream bytes up to packet offset `at`, append `len` bytes to
    /// `dst`, then refresh the window over the remaining packet bytes. A
    /// short refresh means the source is truncated inside the packet.
    fn take(&mut self, at: usize, len: usize, dst: &mut Vec<u8>) -> MediaDemuxResult<()> {
        let truncated = || PacketError::packet("source truncated inside a packet");
        let gap = at.checked_sub(self.consumed).ok_or_else(truncated)?;
        if gap > 0 && self.cursor.read(gap, None)? < gap {
            return Err(truncated().into());
        }
        if self.cursor.read(len, Some(dst))? < len {
            return Err(truncated().into());
        }
        self.consumed = at + len;
        let want = self.length - self.consumed;
        let peeked = self.cursor.peek(want)?;
        if peeked.len() < want {
            return Err(truncated().into());
        }
        self.buf.clear();
        self.buf.extend_from_slice(peeked);
        Ok(())
    }

    /// Discard whatever the packet declared but parsing did not consume
    /// (padding included), leaving the cursor at the next packet.
    fn finish(&mut self) -> MediaDemuxResult<()> {
        let rest = self.length - self.consumed;
        if rest > 0 {
            self.cursor.read(rest, None)?;
        }
        self.consumed = self.length;
        Ok(())
    }
}

/// Demultiplex the packet at the cursor position into per-track frames,
/// flushing completed media objects to `sink`.
///
/// A malformed packet is consumed and logged without failing the stream;
/// only the fixed-grid unsupported-header case returns an error.
pub fn demux_packet(
    cursor: &mut dyn ByteCursor,
    tracks: &mut TrackSet,
    sink: &mut dyn PacketSink,
    opts: &DemuxOptions,
) -> MediaDemuxResult<DemuxStatus> {
    let header = match read_packet_header(cursor, opts.min_packet_size, opts.max_packet_size)? {
        PacketRead::Header(h) => h,
        PacketRead::EndOfStream => return Ok(DemuxStatus::EndOfStream),
        PacketRead::Recovered => return Ok(DemuxStatus::Recovered),
    };

    let mut window = match PacketWindow::open(cursor, header.length as usize)? {
        Some(w) => w,
        None => {
            warn!(
                "stream ends inside a packet declaring {} bytes",
                header.length
            );
            return Ok(DemuxStatus::EndOfStream);
        }
    };

    let data_end = (header.length - header.padding) as usize;
    let mut skip = header.header_size;
    let mut failures = 0u32;
    for payload_index in 0..header.payload_count {
        if skip >= data_end {
            break;
        }
        match demux_payload(&mut window, &header, tracks, sink, opts, &mut skip) {
            Ok(()) => failures = 0,
            Err(e) => {
                warn!("payload {} failed: {}", payload_index, e);
                failures += 1;
                if failures >= 3 {
                    warn!("too many consecutive payload failures, dropping packet");
                    break;
                }
            }
        }
    }

    window.finish()?;
    Ok(DemuxStatus::Demuxed)
}

fn demux_payload(
    window: &mut PacketWindow<'_>,
    header: &PacketHeader,
    tracks: &mut TrackSet,
    sink: &mut dyn PacketSink,
    opts: &DemuxOptions,
    skip: &mut usize,
) -> MediaDemuxResult<()> {
    let overrun = || PacketError::packet("payload fields run past the packet end");

    let stream_byte = window.byte(*skip).ok_or_else(overrun)?;
    *skip += 1;
    let mut keyframe = stream_byte & 0x80 != 0;
    let stream_number = stream_byte & 0x7f;

    let media_object_number = window
        .read_field(header.property >> 4, skip, 0)
        .ok_or_else(overrun)?;
    let offset_field = window
        .read_field(header.property >> 2, skip, 0)
        .ok_or_else(overrun)?;
    let replicated_length = window
        .read_field(header.property, skip, 0)
        .ok_or_else(overrun)?;

    let has_track = tracks.get(stream_number).is_some();
    let mut media_object_offset = offset_field;
    let mut presentation_time: u64 = header.send_time as u64;
    let mut time_delta: u64 = 0;
    let mut invalid_replication = false;

    match replicated_length {
        0 => {
            // no timing override, the packet send time stands
        }
        1 => {
            // compressed mode: the offset field is the presentation time
            // and one byte gives the per-sub-payload delta
            presentation_time = (offset_field as u64).saturating_sub(opts.preroll);
            time_delta = window.byte(*skip).ok_or_else(overrun)? as u64;
            *skip += 1;
            media_object_offset = 0;
        }
        2..=7 => {
            debug!(
                "invalid replicated data length {} on stream {}, skipping payload",
                replicated_length, stream_number
            );
            *skip += replicated_length as usize;
            invalid_replication = true;
        }
        _ => {
            let replicated = window
                .slice(*skip, replicated_length as usize)
                .ok_or_else(overrun)?;
            let mut p = 4usize;
            let raw = read_u32_le(replicated, &mut p).ok_or_else(overrun)?;
            presentation_time = (raw as u64).saturating_sub(opts.preroll);
            if has_track && replicated.len() > 8 {
                let descriptors = tracks
                    .get(stream_number)
                    .map(|t| t.extensions.clone())
                    .unwrap_or_default();
                parse_extensions(
                    &descriptors,
                    &replicated[8..],
                    stream_number,
                    &mut keyframe,
                    sink,
                );
            }
            *skip += replicated_length as usize;
        }
    }

    let data_end = (header.length - header.padding) as usize;
    let payload_length = if header.multiple_payloads {
        window
            .read_field(header.payload_length_code, skip, 0)
            .ok_or_else(overrun)? as usize
    } else {
        data_end.checked_sub(*skip).ok_or_else(overrun)?
    };
    if payload_length == 0 || *skip + payload_length > data_end {
        return Err(PacketError::packet(format!(
            "payload length {} does not fit the packet",
            payload_length
        ))
        .into());
    }

    if invalid_replication || !has_track {
        if !has_track {
            debug!("payload for unselected stream {} skipped", stream_number);
        }
        *skip += payload_length;
        return Ok(());
    }

    if sink.should_drop(stream_number, keyframe) {
        *skip += payload_length;
        return Ok(());
    }
    if (header.send_time as u64) > opts.preroll_start + opts.preroll {
        sink.on_presentation_time(stream_number, presentation_time);
    }
    sink.on_send_time(header.send_time as u64);

    debug!(
        "payload stream {} object {} offset {} time {}",
        stream_number, media_object_number, media_object_offset, presentation_time
    );

    let compressed = replicated_length == 1;
    let mut remaining = payload_length;
    let mut sub_index = 0u64;
    while remaining > 0 {
        let sub_length = if compressed {
            let l = window.byte(*skip).ok_or_else(overrun)? as usize;
            *skip += 1;
            remaining -= 1;
            l
        } else {
            remaining
        };
        if sub_length == 0 {
            break;
        }
        if sub_length > remaining {
            return Err(PacketError::packet(format!(
                "sub-payload length {} exceeds the {} remaining payload bytes",
                sub_length, remaining
            ))
            .into());
        }

        let track = match tracks.get_mut(stream_number) {
            Some(t) => t,
            None => return Err(overrun().into()),
        };
        let time = (presentation_time + time_delta * sub_index)
            .saturating_sub(track.time_offset);

        // a new media object starts here, hand the previous one out
        if media_object_offset == 0 {
            if let Some(frame) = track.take_pending() {
                sink.send(stream_number, frame);
            }
        }
        let track = match tracks.get_mut(stream_number) {
            Some(t) => t,
            None => return Err(overrun().into()),
        };
        let frame = track.pending.get_or_insert_with(Frame::default);
        if frame.data.is_empty() {
            frame.presentation_time = time;
            frame.decode_time = time;
            frame.keyframe = keyframe;
        }
        window.take(*skip, sub_length, &mut frame.data)?;
        *skip += sub_length;
        remaining -= sub_length;
        sub_index += 1;
    }

    Ok(())
}

/// Drive the demultiplexer until the stream ends, flushing frames still
/// pending when it does. Malformed packets are absorbed by
/// [`demux_packet`]; errors reaching this level are stream-fatal.
pub fn demux_all(
    cursor: &mut dyn ByteCursor,
    tracks: &mut TrackSet,
    sink: &mut dyn PacketSink,
    opts: &DemuxOptions,
) -> MediaDemuxResult<u64> {
    let mut packets = 0u64;
    loop {
        match demux_packet(cursor, tracks, sink, opts)? {
            DemuxStatus::Demuxed | DemuxStatus::Recovered => packets += 1,
            DemuxStatus::EndOfStream => break,
        }
    }
    // flush whatever is still pending at end of stream
    for (stream_number, track) in tracks.iter_mut() {
        if let Some(frame) = track.take_pending() {
            sink.send(stream_number, frame);
        }
    }
    Ok(packets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asf::track::TrackInfo;
    use crate::errors::MediaDemuxError;
    use crate::streams::MemoryCursor;

    #[derive(Default)]
    struct Recorder {
        frames: Vec<(u8, Frame)>,
        presentation: Vec<(u8, u64)>,
        send_times: Vec<u64>,
        drop_streams: Vec<u8>,
    }

    impl PacketSink for Recorder {
        fn send(&mut self, stream_number: u8, frame: Frame) {
            self.frames.push((stream_number, frame));
        }

        fn should_drop(&mut self, stream_number: u8, _keyframe: bool) -> bool {
            self.drop_streams.contains(&stream_number)
        }

        fn on_presentation_time(&mut self, stream_number: u8, time: u64) {
            self.presentation.push((stream_number, time));
        }

        fn on_send_time(&mut self, time: u64) {
            self.send_times.push(time);
        }
    }

    fn opts(min: u32, max: u32) -> DemuxOptions {
        DemuxOptions {
            min_packet_size: min,
            max_packet_size: max,
            preroll: 0,
            preroll_start: 0,
        }
    }

    fn one_track(stream_number: u8) -> TrackSet {
        let mut tracks = TrackSet::new();
        tracks.insert(stream_number, TrackInfo::default());
        tracks
    }

    // 0x82 correction prefix, 1-byte length and sequence, no padding field
    fn packet_prefix(flags: u8, property: u8, length: u8, send_time: u32) -> Vec<u8> {
        let mut p = vec![0x82, 0x00, 0x00, flags, property];
        p.push(length);
        p.push(0); // sequence
        p.extend_from_slice(&send_time.to_le_bytes());
        p.extend_from_slice(&0u16.to_le_bytes()); // duration
        p
    }

    // single compressed payload: pts 1000, delta 40, three 4-byte sub-payloads
    fn compressed_packet() -> Vec<u8> {
        // property: object number 1 byte, offset 2 bytes, replicated 1 byte
        let mut p = packet_prefix(0x22, 0x19, 34, 5000);
        p.push(0x81); // keyframe, stream 1
        p.push(7); // media object number
        p.extend_from_slice(&1000u16.to_le_bytes()); // presentation time
        p.push(1); // replicated length: compressed mode
        p.push(40); // per-sub-payload delta
        for fill in [0xaa, 0xbb, 0xcc] {
            p.push(4);
            p.extend_from_slice(&[fill; 4]);
        }
        assert_eq!(p.len(), 34);
        p
    }

    #[test]
    fn test_compressed_delta_accumulation() {
        let data = compressed_packet();
        let mut cursor = MemoryCursor::new(&data);
        let mut tracks = one_track(1);
        let mut sink = Recorder::default();
        let packets = demux_all(&mut cursor, &mut tracks, &mut sink, &opts(34, 68)).unwrap();

        assert_eq!(packets, 1);
        let times: Vec<u64> = sink
            .frames
            .iter()
            .map(|(_, f)| f.presentation_time)
            .collect();
        assert_eq!(times, vec![1000, 1040, 1080]);
        assert!(sink.frames.iter().all(|(s, f)| *s == 1 && f.keyframe));
        assert_eq!(sink.frames[0].1.data, vec![0xaa; 4]);
        assert_eq!(sink.frames[2].1.data, vec![0xcc; 4]);
        assert_eq!(sink.send_times, vec![5000]);
        assert_eq!(sink.presentation, vec![(1, 1000)]);
    }

    #[test]
    fn test_compressed_preroll_subtraction() {
        let data = compressed_packet();
        let mut cursor = MemoryCursor::new(&data);
        let mut tracks = one_track(1);
        let mut sink = Recorder::default();
        let mut o = opts(34, 68);
        o.preroll = 300;
        demux_all(&mut cursor, &mut tracks, &mut sink, &o).unwrap();
        let times: Vec<u64> = sink
            .frames
            .iter()
            .map(|(_, f)| f.presentation_time)
            .collect();
        assert_eq!(times, vec![700, 740, 780]);
    }

    // single standard-mode payload: 8 replicated bytes carrying `pts`
    fn standard_packet(length: u8, send_time: u32, pts: u32) -> Vec<u8> {
        // property: object number, offset, and replicated length 1 byte each
        let mut p = packet_prefix(0x22, 0x15, length, send_time);
        p.push(0x01); // stream 1, not a keyframe
        p.push(3); // media object number
        p.push(0); // media object offset
        p.push(8); // replicated length: standard mode
        p.extend_from_slice(&[0; 4]); // media object size, not decoded
        p.extend_from_slice(&pts.to_le_bytes());
        p
    }

    #[test]
    fn test_negative_time_clamps_to_zero() {
        let mut data = standard_packet(30, 2500, 500);
        data.resize(30, 0x11); // 5 payload bytes
        let mut cursor = MemoryCursor::new(&data);
        let mut tracks = one_track(1);
        let mut sink = Recorder::default();
        let mut o = opts(30, 60);
        o.preroll = 2000;
        demux_all(&mut cursor, &mut tracks, &mut sink, &o).unwrap();

        assert_eq!(sink.frames.len(), 1);
        let frame = &sink.frames[0].1;
        assert_eq!(frame.presentation_time, 0);
        assert_eq!(frame.data, vec![0x11; 5]);
        assert!(!frame.keyframe);
        assert_eq!(sink.presentation, vec![(1, 0)]);
    }

    #[test]
    fn test_preroll_window_gates_presentation_clock() {
        // send time 2500 is inside the preroll window 0..=3000
        let mut data = standard_packet(30, 2500, 4000);
        data.resize(30, 0);
        let mut cursor = MemoryCursor::new(&data);
        let mut tracks = one_track(1);
        let mut sink = Recorder::default();
        let mut o = opts(30, 60);
        o.preroll = 3000;
        demux_all(&mut cursor, &mut tracks, &mut sink, &o).unwrap();
        assert!(sink.presentation.is_empty());
        // the send-time clock still ticks
        assert_eq!(sink.send_times, vec![2500]);
        assert_eq!(sink.frames.len(), 1);
        assert_eq!(sink.frames[0].1.presentation_time, 1000);
    }

    #[test]
    fn test_unselected_stream_is_skipped() {
        let mut data = standard_packet(30, 100, 200);
        data.resize(30, 0);
        let mut cursor = MemoryCursor::new(&data);
        let mut tracks = one_track(2); // stream 1 not selected
        let mut sink = Recorder::default();
        demux_all(&mut cursor, &mut tracks, &mut sink, &opts(30, 60)).unwrap();
        assert!(sink.frames.is_empty());
        assert!(sink.send_times.is_empty());
    }

    #[test]
    fn test_should_drop_suppresses_frames() {
        let mut data = standard_packet(30, 100, 200);
        data.resize(30, 0);
        let mut cursor = MemoryCursor::new(&data);
        let mut tracks = one_track(1);
        let mut sink = Recorder {
            drop_streams: vec![1],
            ..Default::default()
        };
        demux_all(&mut cursor, &mut tracks, &mut sink, &opts(30, 60)).unwrap();
        assert!(sink.frames.is_empty());
        assert!(tracks.get(1).unwrap().pending.is_none());
    }

    #[test]
    fn test_invalid_replicated_length_skips_payload_only() {
        let mut p = packet_prefix(0x22, 0x15, 30, 100);
        p.push(0x01);
        p.push(3);
        p.push(0);
        p.push(5); // replicated length 2..7 is invalid
        p.extend_from_slice(&[0; 5]); // the declared replicated bytes
        p.resize(30, 0);
        let mut cursor = MemoryCursor::new(&p);
        let mut tracks = one_track(1);
        let mut sink = Recorder::default();
        let status = demux_packet(&mut cursor, &mut tracks, &mut sink, &opts(30, 60)).unwrap();
        assert_eq!(status, DemuxStatus::Demuxed);
        assert!(sink.frames.is_empty());
        assert_eq!(cursor.tell(), 30);
    }

    #[test]
    fn test_padding_is_discarded() {
        // flags 0x2a adds a 1-byte padding field
        let mut p = vec![0x82, 0x00, 0x00, 0x2a, 0x15];
        p.push(30); // length
        p.push(0); // sequence
        p.push(4); // padding
        p.extend_from_slice(&100u32.to_le_bytes());
        p.extend_from_slice(&0u16.to_le_bytes());
        p.push(0x01);
        p.push(3);
        p.push(0);
        p.push(0); // replicated length 0: send time stands
        p.extend_from_slice(&[0x22; 8]); // payload data up to data end
        p.extend_from_slice(&[0; 4]); // padding bytes
        assert_eq!(p.len(), 30);
        let mut cursor = MemoryCursor::new(&p);
        let mut tracks = one_track(1);
        let mut sink = Recorder::default();
        demux_packet(&mut cursor, &mut tracks, &mut sink, &opts(30, 60)).unwrap();
        assert_eq!(cursor.tell(), 30);
        let pending = tracks.get(1).unwrap().pending.as_ref().unwrap();
        assert_eq!(pending.data, vec![0x22; 8]);
        assert_eq!(pending.presentation_time, 100);
    }

    #[test]
    fn test_multiple_payloads_flush_between_objects() {
        // flags 0x23: multiple payloads; count byte 0x42: 2 payloads with
        // 1-byte length fields
        let mut p = packet_prefix(0x23, 0x15, 30, 100);
        p.push(0x42);
        for fill in [0x33u8, 0x44] {
            p.push(0x01); // stream 1
            p.push(1); // media object number
            p.push(0); // offset: new object
            p.push(0); // replicated length 0
            p.push(3); // payload length
            p.extend_from_slice(&[fill; 3]);
        }
        assert_eq!(p.len(), 30);
        let mut cursor = MemoryCursor::new(&p);
        let mut tracks = one_track(1);
        let mut sink = Recorder::default();
        demux_all(&mut cursor, &mut tracks, &mut sink, &opts(30, 60)).unwrap();

        assert_eq!(sink.frames.len(), 2);
        assert_eq!(sink.frames[0].1.data, vec![0x33; 3]);
        assert_eq!(sink.frames[1].1.data, vec![0x44; 3]);
        assert!(sink.frames.iter().all(|(_, f)| f.presentation_time == 100));
        assert_eq!(sink.send_times, vec![100, 100]);
    }

    #[test]
    fn test_fragmented_object_reassembles_across_packets() {
        // two single-payload packets carrying one media object split in two:
        // the second payload has a nonzero offset and must not flush
        let mut first = standard_packet(30, 100, 200);
        first.resize(30, 0xab);

        let mut second = packet_prefix(0x22, 0x15, 30, 140);
        second.push(0x01);
        second.push(3); // same media object
        second.push(5); // offset: continuation
        second.push(0);
        second.resize(30, 0xcd);

        let mut data = first;
        data.extend_from_slice(&second);
        let mut cursor = MemoryCursor::new(&data);
        let mut tracks = one_track(1);
        let mut sink = Recorder::default();
        demux_all(&mut cursor, &mut tracks, &mut sink, &opts(30, 60)).unwrap();

        assert_eq!(sink.frames.len(), 1);
        let frame = &sink.frames[0].1;
        assert_eq!(frame.data.len(), 5 + 13);
        assert_eq!(&frame.data[..5], &[0xab; 5]);
        assert_eq!(frame.presentation_time, 200);
    }

    #[test]
    fn test_fixed_grid_unsupported_packet_is_fatal() {
        let mut data = vec![0x91];
        data.resize(34, 0);
        data.extend_from_slice(&compressed_packet());
        let mut cursor = MemoryCursor::new(&data);
        let mut tracks = one_track(1);
        let mut sink = Recorder::default();
        let err = demux_all(&mut cursor, &mut tracks, &mut sink, &opts(34, 34)).unwrap_err();
        assert!(matches!(err, MediaDemuxError::Packet(_)));
        assert!(sink.frames.is_empty());
    }

    #[test]
    fn test_variable_grid_recovers_past_unsupported_packet() {
        let mut data = vec![0x91];
        data.resize(34, 0);
        data.extend_from_slice(&compressed_packet());
        let mut cursor = MemoryCursor::new(&data);
        let mut tracks = one_track(1);
        let mut sink = Recorder::default();
        let packets = demux_all(&mut cursor, &mut tracks, &mut sink, &opts(34, 68)).unwrap();
        assert_eq!(packets, 2);
        assert_eq!(sink.frames.len(), 3);
    }
}
