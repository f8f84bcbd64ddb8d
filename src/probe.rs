//! Stream probe contract.
//!
//! Probing (format sniffing, tag extraction) is an external collaborator;
//! the core only consumes its verdict: the stream's domain and coding, the
//! decoded PCM parameters to program into the renderer, and whatever
//! metadata the prober extracted. [`UriProbe`] is a minimal extension-driven
//! implementation useful for wiring the core without a real prober.

use std::collections::BTreeMap;
use std::path::Path;

use crate::omx::OmxError;

/// OMX port domain of a probed stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDomain {
    Audio,
    Video,
    Image,
    Other,
}

/// Audio coding of a probed stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCoding {
    Mp3,
    Flac,
    Opus,
    Vorbis,
    Aac,
    Pcm,
    Unknown,
}

/// Decoded-output parameters, programmed into the renderer's input port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmParams {
    pub channels: u32,
    pub sampling_rate: u32,
    pub bits_per_sample: u32,
}

impl Default for PcmParams {
    fn default() -> Self {
        PcmParams {
            channels: 2,
            sampling_rate: 44100,
            bits_per_sample: 16,
        }
    }
}

/// Encoded-input parameters, programmed into the decoder's input port.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodecParams {
    pub channels: u32,
    pub sampling_rate: u32,
    pub bit_rate: u32,
}

/// Track metadata as key/value pairs.
pub type TrackMetadata = BTreeMap<String, String>;

/// Everything the core needs to know about one probed URI.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    pub domain: PortDomain,
    pub coding: AudioCoding,
    pub metadata: TrackMetadata,
    pub pcm: PcmParams,
    pub codec: CodecParams,
}

/// The probe collaborator. Must be pure with respect to the core: it never
/// touches the pipeline.
pub trait MediaProbe: Send + Sync {
    fn probe(&self, uri: &str) -> Result<StreamInfo, OmxError>;
}

/// Lowercased file extension of a URI, or an empty string.
///
/// This is the one canonical form: the sub-playlist scanner and the graph
/// registry key both derive from it, so case differences can never split a
/// run or duplicate a registry entry.
pub fn uri_extension(uri: &str) -> String {
    Path::new(uri)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Lowercased scheme of a URI ("http", "rtsp", …), if it has one.
pub fn uri_scheme(uri: &str) -> Option<String> {
    let (scheme, _) = uri.split_once("://")?;
    if scheme.is_empty() || scheme.contains('/') {
        return None;
    }
    Some(scheme.to_lowercase())
}

/// Extension-driven probe: infers the coding from the URI alone and reports
/// default PCM parameters. Good enough to exercise the orchestration layer;
/// a real deployment plugs in a sniffing prober.
pub struct UriProbe;

impl MediaProbe for UriProbe {
    fn probe(&self, uri: &str) -> Result<StreamInfo, OmxError> {
        let coding = match uri_extension(uri).as_str() {
            "mp3" => AudioCoding::Mp3,
            "flac" => AudioCoding::Flac,
            "opus" => AudioCoding::Opus,
            "ogg" | "oga" => AudioCoding::Vorbis,
            "aac" => AudioCoding::Aac,
            "wav" | "pcm" => AudioCoding::Pcm,
            _ => return Err(OmxError::FormatNotDetected),
        };
        Ok(StreamInfo {
            domain: PortDomain::Audio,
            coding,
            metadata: TrackMetadata::new(),
            pcm: PcmParams::default(),
            codec: CodecParams::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(uri_extension("/tmp/Track.MP3"), "mp3");
        assert_eq!(uri_extension("/tmp/noext"), "");
    }

    #[test]
    fn scheme_detection() {
        assert_eq!(uri_scheme("rtsp://example"), Some("rtsp".to_string()));
        assert_eq!(uri_scheme("/tmp/a.mp3"), None);
    }

    #[test]
    fn uri_probe_maps_known_extensions() {
        let probe = UriProbe;
        assert_eq!(probe.probe("/tmp/a.mp3").unwrap().coding, AudioCoding::Mp3);
        assert_eq!(
            probe.probe("/tmp/b.flac").unwrap().coding,
            AudioCoding::Flac
        );
        assert_eq!(
            probe.probe("/tmp/c.xyz").unwrap_err(),
            OmxError::FormatNotDetected
        );
    }
}
