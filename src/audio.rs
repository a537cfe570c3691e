//! Spectral audio model stored in container files.
//!
//! An [`Audio`] holds analysis parameters in a `header` section, the original
//! samples, and one `frame` section per analysis block. The spectral data is
//! quantized to 16-bit words; debug blocks are plain floats and can be
//! skipped on load.

use std::io::Write;
use std::path::Path;

use crate::container::{ContainerReader, ContainerWriter, Event};
use crate::io::{self, ByteInput, MemIn};
use crate::{Error, Result};

/// File type written into the container header.
pub const AUDIO_FILE_TYPE: &str = "SpectMorph::Audio";

/// Current audio format version.
pub const AUDIO_FORMAT_VERSION: i32 = 1;

/// Block names that [`AudioLoadOptions::skip_debug`] drops on load.
const DEBUG_BLOCKS: [&str; 2] = ["original_fft", "debug_samples"];

/// One analysis frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioBlock {
    /// Quantized partial frequencies
    pub freqs: Vec<u16>,
    /// Quantized partial magnitudes
    pub mags: Vec<u16>,
    /// Quantized partial phases
    pub phases: Vec<u16>,
    /// Quantized noise band envelope
    pub noise: Vec<u16>,
    /// Spectrum of the analyzed frame (debugging only)
    pub original_fft: Vec<f32>,
    /// Analyzed samples (debugging only)
    pub debug_samples: Vec<f32>,
}

/// Encoded spectral representation of one note.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Audio {
    pub mix_freq: f32,
    pub frame_size_ms: f32,
    pub frame_step_ms: f32,
    pub attack_start_ms: f32,
    pub attack_end_ms: f32,
    pub fundamental_freq: f32,
    pub zeropad: i32,
    pub loop_type: i32,
    pub loop_start: i32,
    pub loop_end: i32,
    pub zero_values_at_start: i32,
    pub original_samples: Vec<f32>,
    pub contents: Vec<AudioBlock>,
}

/// Options controlling what [`Audio::load_with_options`] decodes.
#[derive(Debug, Clone, Copy, Default)]
pub struct AudioLoadOptions {
    /// Skip `original_fft` and `debug_samples` blocks.
    pub skip_debug: bool,
}

impl Audio {
    /// Load from any byte input.
    pub fn load(input: Box<dyn ByteInput>) -> Result<Self> {
        Self::load_with_options(input, AudioLoadOptions::default())
    }

    /// Load from a file.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::load(io::open(path)?)
    }

    /// Load from an in-memory container.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::load(Box::new(MemIn::from(data)))
    }

    /// Load from any byte input with explicit options.
    pub fn load_with_options(input: Box<dyn ByteInput>, options: AudioLoadOptions) -> Result<Self> {
        let mut reader = ContainerReader::new(input);
        reader
            .header()
            .validate(AUDIO_FILE_TYPE, AUDIO_FORMAT_VERSION)?;

        if options.skip_debug {
            for name in DEBUG_BLOCKS {
                reader.add_skip_event(name);
            }
        }

        let mut audio = Audio::default();
        let mut section: Option<String> = None;

        loop {
            match reader.next_event() {
                Event::BeginSection(name) => {
                    if let Some(open) = &section {
                        return Err(Error::Parse(format!(
                            "section {:?} opened inside {:?}",
                            name, open
                        )));
                    }
                    if name == "frame" {
                        audio.contents.push(AudioBlock::default());
                    }
                    section = Some(name.clone());
                }
                Event::EndSection => {
                    if section.take().is_none() {
                        return Err(Error::Parse("unbalanced end of section".to_string()));
                    }
                }
                Event::Int { name, value } if section.as_deref() == Some("header") => {
                    match name.as_str() {
                        "zeropad" => audio.zeropad = *value,
                        "loop_type" => audio.loop_type = *value,
                        "loop_start" => audio.loop_start = *value,
                        "loop_end" => audio.loop_end = *value,
                        "zero_values_at_start" => audio.zero_values_at_start = *value,
                        "frame_count" => {}
                        _ => log::debug!("unhandled int {}", name),
                    }
                }
                Event::Float { name, value } if section.as_deref() == Some("header") => {
                    match name.as_str() {
                        "mix_freq" => audio.mix_freq = *value,
                        "frame_size_ms" => audio.frame_size_ms = *value,
                        "frame_step_ms" => audio.frame_step_ms = *value,
                        "attack_start_ms" => audio.attack_start_ms = *value,
                        "attack_end_ms" => audio.attack_end_ms = *value,
                        "fundamental_freq" => audio.fundamental_freq = *value,
                        _ => log::debug!("unhandled float {}", name),
                    }
                }
                Event::FloatBlock { name, values } => match section.as_deref() {
                    None if name == "original_samples" => audio.original_samples = values.clone(),
                    Some("frame") => {
                        let block = current_block(&mut audio)?;
                        match name.as_str() {
                            "original_fft" => block.original_fft = values.clone(),
                            "debug_samples" => block.debug_samples = values.clone(),
                            _ => log::debug!("unhandled float block {}", name),
                        }
                    }
                    _ => log::debug!("unhandled float block {}", name),
                },
                Event::Uint16Block { name, values } if section.as_deref() == Some("frame") => {
                    let block = current_block(&mut audio)?;
                    match name.as_str() {
                        "freqs" => block.freqs = values.clone(),
                        "mags" => block.mags = values.clone(),
                        "phases" => block.phases = values.clone(),
                        "noise" => block.noise = values.clone(),
                        _ => log::debug!("unhandled uint16 block {}", name),
                    }
                }
                Event::EndOfFile => break,
                Event::ReadError => {
                    return Err(Error::Parse("malformed audio container".to_string()))
                }
                other => log::debug!("ignoring event {:?}", other.name()),
            }
        }

        if section.is_some() {
            return Err(Error::Parse("section not closed at end of file".to_string()));
        }
        Ok(audio)
    }

    /// Save into any writer.
    pub fn save<W: Write>(&self, out: W) -> Result<W> {
        let mut writer = ContainerWriter::new(out, AUDIO_FILE_TYPE, AUDIO_FORMAT_VERSION)?;

        writer.begin_section("header")?;
        writer.write_float("mix_freq", self.mix_freq)?;
        writer.write_float("frame_size_ms", self.frame_size_ms)?;
        writer.write_float("frame_step_ms", self.frame_step_ms)?;
        writer.write_float("attack_start_ms", self.attack_start_ms)?;
        writer.write_float("attack_end_ms", self.attack_end_ms)?;
        writer.write_float("fundamental_freq", self.fundamental_freq)?;
        writer.write_int("zeropad", self.zeropad)?;
        writer.write_int("loop_type", self.loop_type)?;
        writer.write_int("loop_start", self.loop_start)?;
        writer.write_int("loop_end", self.loop_end)?;
        writer.write_int("zero_values_at_start", self.zero_values_at_start)?;
        let frame_count = i32::try_from(self.contents.len()).map_err(|_| Error::BlockTooLarge {
            name: "frame_count".to_string(),
            len: self.contents.len(),
        })?;
        writer.write_int("frame_count", frame_count)?;
        writer.end_section()?;

        writer.write_float_block("original_samples", &self.original_samples)?;

        for block in &self.contents {
            writer.begin_section("frame")?;
            writer.write_uint16_block("freqs", &block.freqs)?;
            writer.write_uint16_block("mags", &block.mags)?;
            writer.write_uint16_block("phases", &block.phases)?;
            writer.write_uint16_block("noise", &block.noise)?;
            writer.write_float_block("original_fft", &block.original_fft)?;
            writer.write_float_block("debug_samples", &block.debug_samples)?;
            writer.end_section()?;
        }

        writer.finish()
    }

    /// Save to a file.
    pub fn save_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        self.save(std::io::BufWriter::new(file))?;
        Ok(())
    }

    /// Serialize into a byte vector.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.save(Vec::new())
    }
}

fn current_block(audio: &mut Audio) -> Result<&mut AudioBlock> {
    audio
        .contents
        .last_mut()
        .ok_or_else(|| Error::Parse("frame data outside of a frame".to_string()))
}
