//! MVSTracker `.ins` instruments.
//!
//! `MVSI`, a version byte, a NUL-terminated name and a 25-byte register
//! block. The block holds six register groups of four bytes (one per
//! operator, channel order) followed by the feedback/algorithm byte.

use std::io::{Cursor, Read};

use byteorder::{ReadBytesExt, WriteBytesExt};
use tracing::debug;

use crate::{
    conversion::{Codec, Format, FormatDescriptor},
    error::FormatError,
    instrument::{FmInstrument, FmOperator},
};

pub const CODEC: Codec = Codec {
    descriptor: FormatDescriptor {
        format: Format::MvsTracker,
        extensions: &[".ins"],
        readable: true,
        writable: true,
    },
    load: Some(load),
    save: Some(save),
    parse: None,
    stringify: None,
};

const MAGIC: &[u8; 4] = b"MVSI";
const VERSION: u8 = b'1';
const REGISTER_BLOCK_SIZE: usize = 25;

pub fn load(data: &[u8]) -> Result<(FmInstrument, String), FormatError> {
    let mut cursor = Cursor::new(data);

    let mut magic = [0u8; 4];
    cursor
        .read_exact(&mut magic)
        .map_err(|_| FormatError::InvalidFormat("missing 'MVSI' magic".into()))?;
    if &magic != MAGIC {
        return Err(FormatError::InvalidFormat("missing 'MVSI' magic".into()));
    }
    let version = cursor.read_u8()?;

    let rest = &data[cursor.position() as usize..];
    let name_len = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| FormatError::corrupt("unterminated name"))?;
    let name = String::from_utf8_lossy(&rest[..name_len]).into_owned();

    let regs = &rest[name_len + 1..];
    if regs.len() != REGISTER_BLOCK_SIZE {
        return Err(FormatError::corrupt("invalid data length"));
    }

    let mut instrument = FmInstrument {
        al: regs[24] & 0x07,
        fb: (regs[24] >> 3) & 0x07,
        ..Default::default()
    };
    for (o, op) in instrument.op.iter_mut().enumerate() {
        let group = |n: usize| regs[n * 4 + o];
        *op = FmOperator {
            ar: group(2) & 0x1F,
            dr: group(3) & 0x1F,
            sr: group(4) & 0x1F,
            rr: group(5) & 0x0F,
            sl: group(5) >> 4,
            tl: group(1) & 0x7F,
            ks: group(2) >> 6,
            ml: group(0) & 0x0F,
            dt: (group(0) >> 4) & 0x07,
            ssg_eg: 0,
            am: group(3) & 0x80 != 0,
        };
    }

    debug!("decoded MVSTracker instrument {:?} (version {})", name, version);
    Ok((instrument, name))
}

pub fn save(instrument: &FmInstrument, name: &str) -> Result<Vec<u8>, FormatError> {
    instrument.validate()?;
    if name.contains('\0') {
        return Err(FormatError::InvalidName(name.to_string()));
    }

    let mut buf = Vec::with_capacity(MAGIC.len() + 1 + name.len() + 1 + REGISTER_BLOCK_SIZE);
    buf.extend_from_slice(MAGIC);
    buf.write_u8(VERSION)?;
    buf.extend_from_slice(name.as_bytes());
    buf.write_u8(0)?;

    let ops = &instrument.op;
    let groups: [fn(&FmOperator) -> u8; 6] = [
        |op| op.dt << 4 | op.ml,
        |op| op.tl,
        |op| op.ks << 6 | op.ar,
        |op| (op.am as u8) << 7 | op.dr,
        |op| op.sr,
        |op| op.sl << 4 | op.rr,
    ];
    for register in groups {
        for op in ops {
            buf.write_u8(register(op))?;
        }
    }
    buf.write_u8(instrument.fb << 3 | instrument.al)?;

    Ok(buf)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::instrument::testing::full_instrument;

    fn representable() -> FmInstrument {
        let mut instrument = full_instrument();
        for op in instrument.op.iter_mut() {
            op.ssg_eg = 0;
        }
        instrument.lfo_freq = 0;
        instrument.ams = 0;
        instrument.pms = 0;
        instrument
    }

    #[rustfmt::skip]
    const SAMPLE: &[u8] = &[
        b'M', b'V', b'S', b'I', b'1', b't', b'e', b's', b't', 0,
        0x7F, 0x4D, 0x55, 0x00,
        127, 84, 32, 0,
        0xC0, 0x5F, 0x87, 0x1F,
        0x9F, 0x0B, 0x92, 0x00,
        0x1F, 0x19, 0x00, 0x00,
        0xFF, 0x57, 0xA7, 0x00,
        0x16,
    ];

    #[test]
    fn test_save_then_load() {
        let instrument = representable();
        let data = save(&instrument, "test").unwrap();
        assert_eq!(data.len(), 4 + 1 + 5 + 25);
        let (loaded, name) = load(&data).unwrap();
        assert_eq!(name, "test");
        assert_eq!(loaded, instrument);
    }

    #[test]
    fn test_load_sample() {
        let (instrument, name) = load(SAMPLE).unwrap();
        assert_eq!(name, "test");
        assert_eq!((instrument.al, instrument.fb), (6, 2));
        assert_eq!(
            instrument.op[1],
            FmOperator {
                ar: 31,
                dr: 11,
                sr: 25,
                rr: 7,
                sl: 5,
                tl: 84,
                ks: 1,
                ml: 13,
                dt: 4,
                ssg_eg: 0,
                am: false,
            }
        );
        assert!(instrument.op[0].am);
        assert_eq!(instrument.op[0].dt, 7);
        assert_eq!(instrument.op[2].dr, 18);
        assert_eq!(instrument.op[3].ar, 31);

        assert_eq!(save(&instrument, &name).unwrap(), SAMPLE.to_vec());
    }

    #[test]
    fn test_empty_name() {
        let data = save(&representable(), "").unwrap();
        assert_eq!(data[5], 0);
        assert_eq!(load(&data).unwrap().1, "");
    }

    #[test]
    fn test_rejects() {
        assert!(matches!(
            load(b"MVSX1a\0"),
            Err(FormatError::InvalidFormat(_))
        ));
        assert!(matches!(load(b"MV"), Err(FormatError::InvalidFormat(_))));
        assert!(matches!(
            load(&SAMPLE[..SAMPLE.len() - 1]),
            Err(FormatError::DataCorruption(_))
        ));
        // No terminator anywhere after the version byte.
        assert!(matches!(
            load(b"MVSI1name"),
            Err(FormatError::DataCorruption(_))
        ));
        assert!(matches!(load(b"MVSI"), Err(FormatError::DataCorruption(_))));
    }

    #[test]
    fn test_name_with_nul() {
        assert!(matches!(
            save(&representable(), "a\0b"),
            Err(FormatError::InvalidName(_))
        ));
    }
}
