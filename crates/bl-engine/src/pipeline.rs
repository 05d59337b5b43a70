//! Conversion routine selection
//!
//! Every (format, flags) tuple maps to one [`OutputRoutine`] and one
//! [`InputRoutine`]. Selection is a pure function; [`FormatPipeline`] caches
//! the result and re-selects after every mutation so a stale routine is never
//! run.

use bl_core::{
    BlResult, DriverContext, DualMonoMode, FeatureFlags, FormatDescriptor, InputGain, Sample,
    SampleWidth,
};

use crate::convert::{self, ChannelStage};

/// Output (clip) routine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputRoutine {
    /// Non-mixable stream: bytes pass through untouched
    RawCopy,
    Clip {
        width: SampleWidth,
        stage: ChannelStage,
        /// Split off the low band for the aux sink first
        aux: bool,
    },
}

/// Input (convert) routine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputRoutine {
    RawCopy,
    Convert {
        width: SampleWidth,
        software_gain: bool,
        dual_mono: DualMonoMode,
    },
}

/// Pick the output routine for a format and flag set.
///
/// Phase inversion, right mix/mute and right delay are exclusive; the first
/// one set wins, in that order. 32-bit output has no phase-inversion variant
/// and skips straight to the other two.
pub fn select_output(format: &FormatDescriptor, flags: &FeatureFlags) -> BlResult<OutputRoutine> {
    if !format.mixable {
        return Ok(OutputRoutine::RawCopy);
    }
    let width = format.sample_width()?;

    let stage = if format.channels < 2 {
        ChannelStage::Plain
    } else if flags.phase_inversion && width == SampleWidth::Bits16 {
        ChannelStage::InvertRight
    } else if flags.right_mix_mute {
        ChannelStage::MixRightMute
    } else if flags.right_delay {
        ChannelStage::DelayRight
    } else {
        ChannelStage::Plain
    };

    Ok(OutputRoutine::Clip {
        width,
        stage,
        aux: flags.aux_attached,
    })
}

/// Pick the input routine for a format and flag set
pub fn select_input(format: &FormatDescriptor, flags: &FeatureFlags) -> BlResult<InputRoutine> {
    if !format.mixable {
        return Ok(InputRoutine::RawCopy);
    }
    let width = format.sample_width()?;
    let dual_mono = if format.channels < 2 {
        DualMonoMode::Disabled
    } else {
        flags.dual_mono
    };

    Ok(InputRoutine::Convert {
        width,
        software_gain: flags.software_gain,
        dual_mono,
    })
}

/// Current format, flags and the routines selected for them
#[derive(Debug, Clone)]
pub struct FormatPipeline {
    format: FormatDescriptor,
    flags: FeatureFlags,
    context: DriverContext,
    input_gain: InputGain,
    /// `None` while the format is unsupported: blocks are skipped
    output: Option<OutputRoutine>,
    input: Option<InputRoutine>,
    delayed_right: Sample,
}

impl FormatPipeline {
    pub fn new(format: FormatDescriptor, flags: FeatureFlags) -> Self {
        let mut pipeline = Self {
            format,
            flags,
            context: DriverContext::default(),
            input_gain: InputGain::default(),
            output: None,
            input: None,
            delayed_right: 0.0,
        };
        if let Err(e) = pipeline.reselect() {
            log::warn!("Initial format has no conversion routine: {e}");
        }
        pipeline
    }

    /// Re-run selection for the current state. On error both routines are
    /// cleared and blocks pass without conversion.
    pub fn reselect(&mut self) -> BlResult<()> {
        let selected = select_output(&self.format, &self.flags)
            .and_then(|out| Ok((out, select_input(&self.format, &self.flags)?)));
        match selected {
            Ok((output, input)) => {
                self.output = Some(output);
                self.input = Some(input);
                Ok(())
            }
            Err(e) => {
                self.output = None;
                self.input = None;
                Err(e)
            }
        }
    }

    pub fn set_format(&mut self, format: FormatDescriptor) -> BlResult<()> {
        self.format = format;
        self.delayed_right = 0.0;
        self.reselect()
    }

    /// Mutate the flags and re-select. Fails, with both routines cleared,
    /// while the current format is unsupported.
    pub fn update_flags(&mut self, f: impl FnOnce(&mut FeatureFlags)) -> BlResult<()> {
        f(&mut self.flags);
        self.reselect()
    }

    pub fn set_context(&mut self, context: DriverContext) {
        self.context = context;
    }

    pub fn set_input_gain(&mut self, gain: InputGain) {
        self.input_gain = gain;
    }

    #[inline]
    pub fn format(&self) -> &FormatDescriptor {
        &self.format
    }

    #[inline]
    pub fn flags(&self) -> &FeatureFlags {
        &self.flags
    }

    #[inline]
    pub fn context(&self) -> &DriverContext {
        &self.context
    }

    #[inline]
    pub fn output_routine(&self) -> Option<OutputRoutine> {
        self.output
    }

    #[inline]
    pub fn input_routine(&self) -> Option<InputRoutine> {
        self.input
    }

    /// Forget carried samples (engine restart)
    pub fn reset(&mut self) {
        self.delayed_right = 0.0;
    }

    /// Clip a block of float samples into hardware bytes with the given
    /// width and stage
    pub fn clip(&mut self, src: &[Sample], dst: &mut [u8], width: SampleWidth, stage: ChannelStage) {
        convert::clip_block(
            src,
            dst,
            self.format.channels as usize,
            width,
            self.format.byte_order,
            stage,
            self.context.mute,
            &mut self.delayed_right,
        );
    }

    /// Decode hardware bytes into float samples
    pub fn convert(
        &self,
        src: &[u8],
        dst: &mut [Sample],
        width: SampleWidth,
        software_gain: bool,
        dual_mono: DualMonoMode,
    ) {
        convert::convert_block(
            src,
            dst,
            self.format.channels as usize,
            width,
            self.format.byte_order,
            software_gain.then_some(self.input_gain),
            dual_mono,
        );
    }
}
