//! The emulation core as seen from the audio path

/// Audio metadata exposed by an emulation core.
///
/// Values are raw and unvalidated; [`AudioSourceFormat::from_source`]
/// turns them into a checked format.
///
/// [`AudioSourceFormat::from_source`]: crate::AudioSourceFormat::from_source
pub trait EmulatorAudioSource {
    /// Interleaved channels per frame
    fn channel_count(&self) -> u32;

    /// Bits per sample
    fn audio_bit_depth(&self) -> u32;

    /// Native sample rate in Hz
    fn audio_sample_rate(&self) -> f64;
}

/// An emulation core that also produces raw PCM bytes.
///
/// This is the producer half of the pipeline and runs on the emulation
/// thread. The bytes must match the core's own reported format.
pub trait PcmProducerCore: EmulatorAudioSource {
    /// Append `frames` frames of interleaved PCM to `out`.
    fn produce(&mut self, frames: usize, out: &mut Vec<u8>);
}

impl<T: EmulatorAudioSource + ?Sized> EmulatorAudioSource for Box<T> {
    fn channel_count(&self) -> u32 {
        (**self).channel_count()
    }

    fn audio_bit_depth(&self) -> u32 {
        (**self).audio_bit_depth()
    }

    fn audio_sample_rate(&self) -> f64 {
        (**self).audio_sample_rate()
    }
}

impl<T: PcmProducerCore + ?Sized> PcmProducerCore for Box<T> {
    fn produce(&mut self, frames: usize, out: &mut Vec<u8>) {
        (**self).produce(frames, out);
    }
}
