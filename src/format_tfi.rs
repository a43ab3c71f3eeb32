//! TFM Music Maker `.tfi` instruments.
//!
//! A headerless 42-byte register dump: algorithm, feedback, then ten bytes
//! per operator in hardware order. No name, LFO, or AM fields.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    conversion::{Codec, Format, FormatDescriptor},
    error::FormatError,
    instrument::{detune_from_chip, detune_to_chip, FmInstrument, FmOperator, HARDWARE_ORDER},
};

pub const CODEC: Codec = Codec {
    descriptor: FormatDescriptor {
        format: Format::TfmMusicMaker,
        extensions: &[".tfi"],
        readable: true,
        writable: true,
    },
    load: Some(load),
    save: Some(save),
    parse: None,
    stringify: None,
};

const FILE_SIZE: usize = 42;

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
#[repr(C)]
struct TfiOperator {
    multiplier: u8,
    detune: u8,
    total_level: u8,
    key_scale: u8,
    attack_rate: u8,
    decay_rate: u8,
    sustain_rate: u8,
    release_rate: u8,
    sustain_level: u8,
    ssg_eg: u8,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[repr(C)]
struct TfiFile {
    algorithm: u8,
    feedback: u8,
    operators: [TfiOperator; 4],
}

pub fn load(data: &[u8]) -> Result<(FmInstrument, String), FormatError> {
    if data.len() != FILE_SIZE {
        return Err(FormatError::corrupt("invalid file size"));
    }
    let file: TfiFile = bincode::deserialize(data)?;

    let mut instrument = FmInstrument {
        al: file.algorithm,
        fb: file.feedback,
        ..Default::default()
    };
    for (raw, &index) in file.operators.iter().zip(HARDWARE_ORDER.iter()) {
        let dt = detune_from_chip(raw.detune)
            .ok_or_else(|| FormatError::corrupt(format!("invalid detune {}", raw.detune)))?;
        instrument.op[index] = FmOperator {
            ar: raw.attack_rate,
            dr: raw.decay_rate,
            sr: raw.sustain_rate,
            rr: raw.release_rate,
            sl: raw.sustain_level,
            tl: raw.total_level,
            ks: raw.key_scale,
            ml: raw.multiplier,
            dt,
            ssg_eg: raw.ssg_eg,
            am: false,
        };
    }
    instrument.check_decoded()?;

    debug!("decoded TFI instrument (al {}, fb {})", instrument.al, instrument.fb);
    Ok((instrument, String::new()))
}

pub fn save(instrument: &FmInstrument, _name: &str) -> Result<Vec<u8>, FormatError> {
    instrument.validate()?;

    let file = TfiFile {
        algorithm: instrument.al,
        feedback: instrument.fb,
        operators: HARDWARE_ORDER.map(|index| {
            let op = &instrument.op[index];
            TfiOperator {
                multiplier: op.ml,
                detune: detune_to_chip(op.dt),
                total_level: op.tl,
                key_scale: op.ks,
                attack_rate: op.ar,
                decay_rate: op.dr,
                sustain_rate: op.sr,
                release_rate: op.rr,
                sustain_level: op.sl,
                ssg_eg: op.ssg_eg,
            }
        }),
    };
    Ok(bincode::serialize(&file)?)
}
