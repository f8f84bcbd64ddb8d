//! Graph flavors and their factory.
//!
//! A flavor fixes everything encoding-specific about a pipeline: which
//! components to instantiate and with which roles, how to program the
//! decoder from a probe result, and which events the configure sequence has
//! to wait for. The factory maps a URI to the encoding label used as the
//! graph-registry key and builds the matching flavor.

use log::debug;

use crate::omx::{ComponentId, OmxCore, OmxError};
use crate::probe::{uri_extension, uri_scheme, AudioCoding, StreamInfo};

/// Encoding-specific half of a pipeline.
pub trait GraphFlavor: Send {
    /// Registry label and log tag ("mp3", "flac", …).
    fn name(&self) -> &'static str;

    /// Component names, in pipeline order (source first, renderer last).
    fn components(&self) -> Vec<&'static str>;

    /// Component roles, parallel to [`GraphFlavor::components`].
    fn roles(&self) -> Vec<&'static str>;

    /// The audio coding this pipeline decodes; probing anything else gets
    /// the URI erased from the playlist.
    fn coding(&self) -> AudioCoding;

    /// Ports to disable before probing, as (handle index, port id) pairs.
    /// Most decode pipelines need none.
    fn ports_to_disable(&self) -> Vec<(usize, u32)> {
        Vec::new()
    }

    /// Flavor veto over a probed stream; returning false erases the URI
    /// silently.
    fn probe_stream_hook(&self, _info: &StreamInfo) -> bool {
        true
    }

    /// Programs the decoder's input port from the probe result. Returns
    /// true when the decoder will answer with a port-settings-changed event
    /// on its output port that the configure sequence must wait for.
    fn apply_decoder_settings(
        &self,
        core: &dyn OmxCore,
        decoder: ComponentId,
        info: &StreamInfo,
    ) -> Result<bool, OmxError> {
        apply_codec_settings(core, decoder, info)
    }
}

/// Shared decoder programming: push the probed codec parameters onto the
/// decoder's input port and report whether the output settings will change
/// as a consequence.
fn apply_codec_settings(
    core: &dyn OmxCore,
    decoder: ComponentId,
    info: &StreamInfo,
) -> Result<bool, OmxError> {
    let current = core.get_codec_params(decoder, 0)?;
    core.set_codec_params(decoder, 0, &info.codec)?;
    let settings_changed = current.sampling_rate != info.codec.sampling_rate
        || current.channels != info.codec.channels;
    debug!(
        "decoder settings: {} ch @ {} Hz (changed: {})",
        info.codec.channels, info.codec.sampling_rate, settings_changed
    );
    Ok(settings_changed)
}

struct Mp3Flavor;

impl GraphFlavor for Mp3Flavor {
    fn name(&self) -> &'static str {
        "mp3"
    }
    fn components(&self) -> Vec<&'static str> {
        vec![
            "OMX.Aratelia.file_reader.binary",
            "OMX.Aratelia.audio_decoder.mp3",
            "OMX.Aratelia.audio_renderer.pcm",
        ]
    }
    fn roles(&self) -> Vec<&'static str> {
        vec![
            "audio_reader.binary",
            "audio_decoder.mp3",
            "audio_renderer.pcm",
        ]
    }
    fn coding(&self) -> AudioCoding {
        AudioCoding::Mp3
    }
}

struct FlacFlavor;

impl GraphFlavor for FlacFlavor {
    fn name(&self) -> &'static str {
        "flac"
    }
    fn components(&self) -> Vec<&'static str> {
        vec![
            "OMX.Aratelia.file_reader.binary",
            "OMX.Aratelia.audio_decoder.flac",
            "OMX.Aratelia.audio_renderer.pcm",
        ]
    }
    fn roles(&self) -> Vec<&'static str> {
        vec![
            "audio_reader.binary",
            "audio_decoder.flac",
            "audio_renderer.pcm",
        ]
    }
    fn coding(&self) -> AudioCoding {
        AudioCoding::Flac
    }
}

struct OpusFlavor;

impl GraphFlavor for OpusFlavor {
    fn name(&self) -> &'static str {
        "opus"
    }
    fn components(&self) -> Vec<&'static str> {
        vec![
            "OMX.Aratelia.container_demuxer.ogg",
            "OMX.Aratelia.audio_decoder.opus",
            "OMX.Aratelia.audio_renderer.pcm",
        ]
    }
    fn roles(&self) -> Vec<&'static str> {
        vec![
            "container_demuxer.ogg",
            "audio_decoder.opus",
            "audio_renderer.pcm",
        ]
    }
    fn coding(&self) -> AudioCoding {
        AudioCoding::Opus
    }
    fn ports_to_disable(&self) -> Vec<(usize, u32)> {
        // The demuxer's video output stays unused.
        vec![(0, 1)]
    }
}

struct VorbisFlavor;

impl GraphFlavor for VorbisFlavor {
    fn name(&self) -> &'static str {
        "vorbis"
    }
    fn components(&self) -> Vec<&'static str> {
        vec![
            "OMX.Aratelia.file_reader.binary",
            "OMX.Aratelia.audio_decoder.vorbis",
            "OMX.Aratelia.audio_renderer.pcm",
        ]
    }
    fn roles(&self) -> Vec<&'static str> {
        vec![
            "audio_reader.binary",
            "audio_decoder.vorbis",
            "audio_renderer.pcm",
        ]
    }
    fn coding(&self) -> AudioCoding {
        AudioCoding::Vorbis
    }
}

/// Encoding label for a URI: the scheme for remote streams, the lowercased
/// file extension otherwise. This is the graph-registry key, so two URIs
/// with the same label always share a pipeline.
pub fn coding_type(uri: &str) -> String {
    if let Some(scheme) = uri_scheme(uri) {
        return scheme;
    }
    uri_extension(uri)
}

/// Builds the flavor for an encoding label, or None for encodings no
/// pipeline exists for.
pub fn create_flavor(label: &str) -> Option<Box<dyn GraphFlavor>> {
    match label {
        "mp3" => Some(Box::new(Mp3Flavor)),
        "flac" => Some(Box::new(FlacFlavor)),
        "opus" => Some(Box::new(OpusFlavor)),
        "ogg" | "oga" => Some(Box::new(VorbisFlavor)),
        _ => None,
    }
}
