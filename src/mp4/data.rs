use crate::mp4::fourcc::FourCC;

/// Sample timing run: `sample_count` samples each lasting `sample_delta`
/// media-timescale units.
#[derive(Debug, Clone, PartialEq)]
pub struct SttsEntry {
    pub sample_count: u32,
    pub sample_delta: u32,
}

/// Composition-time offset run.
#[derive(Debug, Clone, PartialEq)]
pub struct CttsEntry {
    pub sample_count: u32,
    pub sample_offset: i32,
}

/// Sample-to-chunk run.
#[derive(Debug, Clone, PartialEq)]
pub struct StscEntry {
    pub first_chunk: u32,
    pub samples_per_chunk: u32,
    pub sample_description_index: u32,
}

/// Edit list entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ElstEntry {
    pub segment_duration: u64,
    pub media_time: i64,
    pub media_rate_integer: u16,
    pub media_rate_fraction: u16,
}

/// One keyed record in a `keys` table.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyEntry {
    pub namespace: FourCC,
    pub name: String,
}

/// One row of a track fragment random access table.
#[derive(Debug, Clone, PartialEq)]
pub struct TfraEntry {
    pub time: u64,
    pub moof_offset: u64,
    pub traf_number: u32,
    pub trun_number: u32,
    pub sample_number: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FtypData {
    pub major_brand: FourCC,
    pub minor_version: u32,
    pub compatible_brands: Vec<FourCC>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MvhdData {
    pub version: u8,
    pub creation_time: u64,
    pub modification_time: u64,
    pub timescale: u32,
    pub duration: u64,
    pub rate: u32,
    pub volume: u16,
    pub matrix: [i32; 9],
    pub next_track_id: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TkhdData {
    pub version: u8,
    pub flags: u32,
    pub creation_time: u64,
    pub modification_time: u64,
    pub track_id: u32,
    pub duration: u64,
    pub layer: i16,
    pub alternate_group: i16,
    pub volume: u16,
    pub matrix: [i32; 9],
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MdhdData {
    pub version: u8,
    pub creation_time: u64,
    pub modification_time: u64,
    pub timescale: u32,
    pub duration: u64,
    /// ISO-639-2/T code unpacked from the 15-bit field.
    pub language: [u8; 3],
}

#[derive(Debug, Clone, PartialEq)]
pub struct HdlrData {
    pub handler_type: FourCC,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VmhdData {
    pub graphics_mode: u16,
    pub opcolor: [u16; 3],
}

#[derive(Debug, Clone, PartialEq)]
pub struct SmhdData {
    pub balance: i16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UrlData {
    /// Absent when the flags mark the media data as self-contained.
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UrnData {
    pub name: String,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrefData {
    pub entry_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StsdData {
    /// Declared entry count, truncated to the number of children actually
    /// parsed when the byte budget ran out early.
    pub entry_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StszData {
    /// Uniform size for all samples; 0 means per-sample sizes follow.
    pub sample_size: u32,
    pub sizes: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StcoData {
    pub offsets: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CprtData {
    pub language: [u8; 3],
    pub notice: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeysData {
    pub entries: Vec<KeyEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MfhdData {
    pub sequence_number: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TfraData {
    pub track_id: u32,
    pub entries: Vec<TfraEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MfroData {
    pub parent_size: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DcomData {
    pub algorithm: FourCC,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CmvdData {
    pub uncompressed_size: u32,
    pub compressed_size: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleSounData {
    pub data_reference_index: u16,
    pub qt_version: u16,
    pub channel_count: u16,
    pub sample_size: u16,
    pub sample_rate: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleVideData {
    pub data_reference_index: u16,
    pub width: u16,
    pub height: u16,
    pub horiz_resolution: u32,
    pub vert_resolution: u32,
    pub frame_count: u16,
    pub compressor_name: String,
    pub depth: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleTextData {
    pub data_reference_index: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleHintData {
    pub data_reference_index: u16,
    pub data: Vec<u8>,
}

/// Type-tagged payload of a decoded box. Pure containers and skipped boxes
/// carry `Empty`.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum BoxData {
    #[default]
    Empty,
    Ftyp(FtypData),
    Mvhd(MvhdData),
    Tkhd(TkhdData),
    Mdhd(MdhdData),
    Hdlr(HdlrData),
    Vmhd(VmhdData),
    Smhd(SmhdData),
    Url(UrlData),
    Urn(UrnData),
    Dref(DrefData),
    Stts(Vec<SttsEntry>),
    Ctts(Vec<CttsEntry>),
    Stsd(StsdData),
    Stsz(StszData),
    Stsc(Vec<StscEntry>),
    Stco(StcoData),
    Stss(Vec<u32>),
    Elst(Vec<ElstEntry>),
    Cprt(CprtData),
    Keys(KeysData),
    Mfhd(MfhdData),
    Tfra(TfraData),
    Mfro(MfroData),
    Dcom(DcomData),
    Cmvd(CmvdData),
    SampleSoun(SampleSounData),
    SampleVide(SampleVideData),
    SampleText(SampleTextData),
    SampleHint(SampleHintData),
}
