//! VGM Music Maker `.vgi` instruments.
//!
//! Same shape as TFI with one extra LFO byte after the feedback and the AM
//! flag folded into bit 7 of the decay-rate byte.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    conversion::{Codec, Format, FormatDescriptor},
    error::FormatError,
    instrument::{detune_from_chip, detune_to_chip, FmInstrument, FmOperator, HARDWARE_ORDER},
};

pub const CODEC: Codec = Codec {
    descriptor: FormatDescriptor {
        format: Format::VgmMusicMaker,
        extensions: &[".vgi"],
        readable: true,
        writable: true,
    },
    load: Some(load),
    save: Some(save),
    parse: None,
    stringify: None,
};

const FILE_SIZE: usize = 43;

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
#[repr(C)]
struct VgiOperator {
    multiplier: u8,
    detune: u8,
    total_level: u8,
    key_scale: u8,
    attack_rate: u8,
    am_decay_rate: u8,
    sustain_rate: u8,
    release_rate: u8,
    sustain_level: u8,
    ssg_eg: u8,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[repr(C)]
struct VgiFile {
    algorithm: u8,
    feedback: u8,
    /// `ams << 4 | pms`
    lfo_sensitivity: u8,
    operators: [VgiOperator; 4],
}

pub fn load(data: &[u8]) -> Result<(FmInstrument, String), FormatError> {
    if data.len() != FILE_SIZE {
        return Err(FormatError::corrupt("invalid file size"));
    }
    let file: VgiFile = bincode::deserialize(data)?;

    let lfo = file.lfo_sensitivity;
    let mut instrument = FmInstrument {
        al: file.algorithm,
        fb: file.feedback,
        lfo_freq: if lfo != 0 { 8 } else { 0 },
        ams: (lfo >> 4) & 3,
        pms: lfo & 7,
        ..Default::default()
    };
    for (raw, &index) in file.operators.iter().zip(HARDWARE_ORDER.iter()) {
        let dt = detune_from_chip(raw.detune)
            .ok_or_else(|| FormatError::corrupt(format!("invalid detune {}", raw.detune)))?;
        instrument.op[index] = FmOperator {
            ar: raw.attack_rate,
            dr: raw.am_decay_rate & 0x1F,
            sr: raw.sustain_rate,
            rr: raw.release_rate,
            sl: raw.sustain_level,
            tl: raw.total_level,
            ks: raw.key_scale,
            ml: raw.multiplier,
            dt,
            ssg_eg: raw.ssg_eg,
            am: raw.am_decay_rate & 0x80 != 0,
        };
    }
    instrument.check_decoded()?;

    debug!(
        "decoded VGI instrument (al {}, fb {}, lfo {:#04x})",
        instrument.al, instrument.fb, lfo
    );
    Ok((instrument, String::new()))
}

pub fn save(instrument: &FmInstrument, _name: &str) -> Result<Vec<u8>, FormatError> {
    instrument.validate()?;

    let file = VgiFile {
        algorithm: instrument.al,
        feedback: instrument.fb,
        lfo_sensitivity: (instrument.ams << 4) | instrument.pms,
        operators: HARDWARE_ORDER.map(|index| {
            let op = &instrument.op[index];
            VgiOperator {
                multiplier: op.ml,
                detune: detune_to_chip(op.dt),
                total_level: op.tl,
                key_scale: op.ks,
                attack_rate: op.ar,
                am_decay_rate: (op.am as u8) << 7 | op.dr,
                sustain_rate: op.sr,
                release_rate: op.rr,
                sustain_level: op.sl,
                ssg_eg: op.ssg_eg,
            }
        }),
    };
    Ok(bincode::serialize(&file)?)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::instrument::testing::full_instrument;

    fn representable() -> FmInstrument {
        let mut instrument = full_instrument();
        instrument.lfo_freq = 8;
        instrument
    }

    #[test]
    fn test_save_then_load() {
        let instrument = representable();
        let data = save(&instrument, "").unwrap();
        assert_eq!(data.len(), FILE_SIZE);
        assert_eq!(data[2], 0x16);
        let (loaded, _) = load(&data).unwrap();
        assert_eq!(loaded, instrument);
        assert_eq!(save(&loaded, "").unwrap(), data);
    }

    #[test]
    fn test_lfo_off() {
        let mut instrument = representable();
        instrument.lfo_freq = 0;
        instrument.ams = 0;
        instrument.pms = 0;
        let data = save(&instrument, "").unwrap();
        assert_eq!(data[2], 0);
        let (loaded, _) = load(&data).unwrap();
        assert_eq!(loaded.lfo_freq, 0);
        assert_eq!(loaded, instrument);
    }

    #[test]
    fn test_am_bit() {
        let instrument = representable();
        let data = save(&instrument, "").unwrap();
        // Operator 1 is the first record, decay byte at offset 5.
        assert_eq!(data[3 + 5], 0x80 | 7);
        // Operator 3 (am on, dr 31) is the second record.
        assert_eq!(data[3 + 10 + 5], 0x80 | 31);
    }

    #[test]
    fn test_operator_order() {
        let mut instrument = representable();
        instrument.op[1].tl = 42;
        let data = save(&instrument, "").unwrap();
        assert_eq!(data[3 + 2 * 10 + 2], 42);
        assert_eq!(load(&data).unwrap().0.op[1].tl, 42);
    }

    #[test]
    fn test_truncated() {
        let data = save(&representable(), "").unwrap();
        assert!(matches!(
            load(&data[..FILE_SIZE - 1]),
            Err(FormatError::DataCorruption(_))
        ));
        assert!(matches!(load(&[]), Err(FormatError::DataCorruption(_))));
    }
}
