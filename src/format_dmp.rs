//! DefleMask `.dmp` instruments.
//!
//! The header grew over the file versions; the FM body after it did not.
//! Only Genesis and arcade (OPM-compatible) FM patches are accepted.

use std::io::Cursor;

use byteorder::ReadBytesExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    conversion::{Codec, Format, FormatDescriptor},
    error::FormatError,
    instrument::{detune_from_chip, detune_to_chip, FmInstrument, FmOperator, HARDWARE_ORDER},
};

pub const CODEC: Codec = Codec {
    descriptor: FormatDescriptor {
        format: Format::DefleMask,
        extensions: &[".dmp"],
        readable: true,
        writable: true,
    },
    load: Some(load),
    save: Some(save),
    parse: None,
    stringify: None,
};

const SAVE_VERSION: u8 = 11;
const SYSTEM_GENESIS: u8 = 2;
const SYSTEM_ARCADE: u8 = 8;
const TYPE_FM: u8 = 1;

const UNVERSIONED_SIZE: usize = 49;
const VERSION_9_SIZE: usize = 51;

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
#[repr(C)]
struct DmpOperator {
    multiplier: u8,
    total_level: u8,
    attack_rate: u8,
    decay_rate: u8,
    sustain_level: u8,
    release_rate: u8,
    am: u8,
    key_scale: u8,
    /// Low three bits are the detune; OPM patches keep DT2 above them.
    detune: u8,
    sustain_rate: u8,
    ssg_eg: u8,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[repr(C)]
struct DmpBody {
    pms: u8,
    feedback: u8,
    algorithm: u8,
    ams: u8,
    operators: [DmpOperator; 4],
}

fn read_header(cursor: &mut Cursor<&[u8]>) -> Result<(), FormatError> {
    let size = cursor.get_ref().len();
    let version = cursor.read_u8()?;
    if version == 0 {
        if size != UNVERSIONED_SIZE {
            return Err(FormatError::corrupt("invalid file size"));
        }
        return Ok(());
    }
    if version < 9 {
        return Err(FormatError::corrupt(format!("unknown file version {version}")));
    }
    // Version 9 also covered a discontinued chip with a different size.
    if version == 9 && size != VERSION_9_SIZE {
        return Err(FormatError::corrupt("invalid file size"));
    }
    if version >= 11 {
        let system = cursor.read_u8()?;
        if system != SYSTEM_GENESIS && system != SYSTEM_ARCADE {
            return Err(FormatError::UnsupportedFormat(format!(
                "system {system:#04x}"
            )));
        }
    }
    let instrument_type = cursor.read_u8()?;
    if instrument_type != TYPE_FM {
        return Err(FormatError::UnsupportedInstrumentType(format!(
            "type {instrument_type}"
        )));
    }
    if version == 9 {
        // operator count, always 4
        cursor.read_u8()?;
    }
    debug!("DMP file version {}", version);
    Ok(())
}

pub fn load(data: &[u8]) -> Result<(FmInstrument, String), FormatError> {
    let mut cursor = Cursor::new(data);
    read_header(&mut cursor)?;
    let body: DmpBody = bincode::deserialize_from(&mut cursor)?;

    let mut instrument = FmInstrument {
        al: body.algorithm,
        fb: body.feedback,
        lfo_freq: if body.pms != 0 && body.ams != 0 { 8 } else { 0 },
        ams: body.ams,
        pms: body.pms,
        ..Default::default()
    };
    for (raw, &index) in body.operators.iter().zip(HARDWARE_ORDER.iter()) {
        let dt = detune_from_chip(raw.detune & 7)
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
            am: raw.am == 1,
        };
    }
    instrument.check_decoded()?;

    Ok((instrument, String::new()))
}

pub fn save(instrument: &FmInstrument, _name: &str) -> Result<Vec<u8>, FormatError> {
    instrument.validate()?;

    let body = DmpBody {
        pms: instrument.pms,
        feedback: instrument.fb,
        algorithm: instrument.al,
        ams: instrument.ams,
        operators: HARDWARE_ORDER.map(|index| {
            let op = &instrument.op[index];
            DmpOperator {
                multiplier: op.ml,
                total_level: op.tl,
                attack_rate: op.ar,
                decay_rate: op.dr,
                sustain_level: op.sl,
                release_rate: op.rr,
                am: op.am as u8,
                key_scale: op.ks,
                detune: detune_to_chip(op.dt),
                sustain_rate: op.sr,
                ssg_eg: op.ssg_eg,
            }
        }),
    };

    let mut buf = vec![SAVE_VERSION, SYSTEM_GENESIS, TYPE_FM];
    bincode::serialize_into(&mut buf, &body)?;
    Ok(buf)
}
