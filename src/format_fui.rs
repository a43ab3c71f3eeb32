//! Furnace `.fui` instruments.
//!
//! Two layouts share the extension. Files starting with `-Furnace instr.-`
//! hold a pointer to an `INST` block with fixed offsets. Files starting with
//! `FINS` hold a list of feature blocks (`{code[2], len u16, payload}`), of
//! which only `NA`, `FM` and `EN` matter here. We always write `FINS`.

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::{debug, trace};

use crate::{
    conversion::{Codec, Format, FormatDescriptor},
    error::FormatError,
    instrument::{FmInstrument, FmOperator, HARDWARE_ORDER},
};

pub const CODEC: Codec = Codec {
    descriptor: FormatDescriptor {
        format: Format::Furnace,
        extensions: &[".fui"],
        readable: true,
        writable: true,
    },
    load: Some(load),
    save: Some(save),
    parse: None,
    stringify: None,
};

const OLD_MAGIC: &[u8; 16] = b"-Furnace instr.-";
const NEW_MAGIC: &[u8; 4] = b"FINS";
const INST_BLOCK: &[u8; 4] = b"INST";

const SAVE_VERSION: u16 = 224;
/// Versions from here on carry an extra byte before the operators.
const FM_EXTRA_BYTE_VERSION: u16 = 224;
const TYPE_FM: u16 = 1;

const FM_BLOCK_SIZE: u16 = 37;
const FM_FLAGS: u8 = 0xF4;

// Furnace uses its own bijective detune mapping, unlike the shared OPN table.
const DETUNE_FROM_CHIP: [u8; 8] = [7, 6, 5, 0, 1, 2, 3, 4];
const DETUNE_TO_CHIP: [u8; 8] = [3, 4, 5, 6, 7, 2, 1, 0];

fn detune_from_chip(raw: u8) -> u8 {
    DETUNE_FROM_CHIP[(raw & 7) as usize]
}

fn detune_to_chip(dt: u8) -> u8 {
    DETUNE_TO_CHIP[(dt & 7) as usize]
}

/// Reads a NUL-terminated string starting at the cursor and moves past it.
fn read_c_string(cursor: &mut Cursor<&[u8]>) -> Result<String, FormatError> {
    let data = *cursor.get_ref();
    let start = (cursor.position() as usize).min(data.len());
    let len = data[start..]
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| FormatError::corrupt("unterminated name"))?;
    cursor.set_position((start + len + 1) as u64);
    Ok(String::from_utf8_lossy(&data[start..start + len]).into_owned())
}

fn load_old(data: &[u8]) -> Result<(FmInstrument, String), FormatError> {
    if data.len() < 24 {
        return Err(FormatError::corrupt("file too short"));
    }
    let mut cursor = Cursor::new(data);
    cursor.set_position(20);
    let pointer = cursor.read_u32::<LittleEndian>()? as usize;
    if data.len() < pointer.saturating_add(8) {
        return Err(FormatError::corrupt("instrument pointer out of range"));
    }
    cursor.set_position(pointer as u64);

    let mut block_id = [0u8; 4];
    cursor.read_exact(&mut block_id)?;
    if &block_id != INST_BLOCK {
        return Err(FormatError::corrupt("INST block not found"));
    }
    let block_size = cursor.read_u32::<LittleEndian>()? as usize;
    if data.len() < (cursor.position() as usize).saturating_add(block_size) {
        return Err(FormatError::corrupt("INST block exceeds file"));
    }

    let version = cursor.read_u16::<LittleEndian>()?;
    let instrument_type = cursor.read_u8()?;
    if u16::from(instrument_type) != TYPE_FM {
        return Err(FormatError::UnsupportedInstrumentType(format!(
            "type {instrument_type}"
        )));
    }
    cursor.read_u8()?;
    let name = read_c_string(&mut cursor)?;

    let mut instrument = FmInstrument {
        al: cursor.read_u8()?,
        fb: cursor.read_u8()?,
        pms: cursor.read_u8()?,
        ams: cursor.read_u8()?,
        ..Default::default()
    };
    cursor.read_u32::<LittleEndian>()?;

    for &index in HARDWARE_ORDER.iter() {
        let mut record = [0u8; 32];
        cursor.read_exact(&mut record)?;
        instrument.op[index] = FmOperator {
            am: record[0] == 1,
            ar: record[1],
            dr: record[2],
            ml: record[3],
            rr: record[4],
            sl: record[5],
            tl: record[6],
            ks: record[8],
            dt: detune_from_chip(record[9]),
            sr: record[10],
            ssg_eg: record[11],
        };
    }
    instrument.check_decoded()?;

    debug!("decoded old-style Furnace instrument {:?} (version {})", name, version);
    Ok((instrument, name))
}

fn read_fm_feature(
    payload: &[u8],
    version: u16,
    instrument: &mut FmInstrument,
) -> Result<(), FormatError> {
    let mut cursor = Cursor::new(payload);
    let _flags = cursor.read_u8()?;
    let al_fb = cursor.read_u8()?;
    instrument.al = al_fb >> 4;
    instrument.fb = al_fb & 7;
    let lfo = cursor.read_u8()?;
    instrument.ams = (lfo >> 3) & 3;
    instrument.pms = lfo & 7;
    cursor.read_u8()?;
    if version >= FM_EXTRA_BYTE_VERSION {
        cursor.read_u8()?;
    }

    for &index in HARDWARE_ORDER.iter() {
        let mut regs = [0u8; 8];
        cursor.read_exact(&mut regs)?;
        instrument.op[index] = FmOperator {
            ar: regs[2] & 31,
            dr: regs[3] & 31,
            sr: regs[4] & 31,
            rr: regs[5] & 15,
            sl: regs[5] >> 4,
            tl: regs[1] & 127,
            ks: regs[2] >> 6,
            ml: regs[0] & 15,
            dt: detune_from_chip(regs[0] >> 4),
            ssg_eg: regs[6] & 15,
            am: regs[3] >> 7 == 1,
        };
    }
    Ok(())
}

fn load_new(data: &[u8]) -> Result<(FmInstrument, String), FormatError> {
    let mut cursor = Cursor::new(data);
    cursor.set_position(NEW_MAGIC.len() as u64);
    let version = cursor.read_u16::<LittleEndian>()?;
    let instrument_type = cursor.read_u16::<LittleEndian>()?;
    if instrument_type != TYPE_FM {
        return Err(FormatError::UnsupportedInstrumentType(format!(
            "type {instrument_type}"
        )));
    }

    let mut name = String::new();
    let mut instrument = FmInstrument::default();
    let mut has_fm = false;
    let mut pos = cursor.position() as usize;
    while pos < data.len() {
        if data.len() < pos + 4 {
            return Err(FormatError::corrupt("truncated feature header"));
        }
        let code = [data[pos], data[pos + 1]];
        let len = u16::from_le_bytes([data[pos + 2], data[pos + 3]]) as usize;
        let start = pos + 4;
        let end = start + len;
        if data.len() < end {
            return Err(FormatError::corrupt(format!(
                "feature {} exceeds file",
                String::from_utf8_lossy(&code)
            )));
        }
        let payload = &data[start..end];
        match &code {
            b"NA" => {
                let len = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
                name = String::from_utf8_lossy(&payload[..len]).into_owned();
            }
            b"FM" => {
                read_fm_feature(payload, version, &mut instrument)?;
                has_fm = true;
            }
            b"EN" => break,
            _ => trace!(
                "skipping Furnace feature {} ({} bytes)",
                String::from_utf8_lossy(&code),
                len
            ),
        }
        pos = end;
    }
    if !has_fm {
        return Err(FormatError::corrupt("FM feature not found"));
    }
    instrument.check_decoded()?;

    debug!("decoded Furnace instrument {:?} (version {})", name, version);
    Ok((instrument, name))
}

pub fn load(data: &[u8]) -> Result<(FmInstrument, String), FormatError> {
    if data.starts_with(OLD_MAGIC) {
        load_old(data)
    } else if data.starts_with(NEW_MAGIC) {
        load_new(data)
    } else {
        Err(FormatError::InvalidFormat("not a Furnace instrument".into()))
    }
}

pub fn save(instrument: &FmInstrument, name: &str) -> Result<Vec<u8>, FormatError> {
    instrument.validate()?;
    if name.contains('\0') {
        return Err(FormatError::InvalidName(name.to_string()));
    }
    let name_block_len = u16::try_from(name.len() + 1)
        .map_err(|_| FormatError::InvalidName(name.to_string()))?;

    let mut buf = Vec::new();
    buf.extend_from_slice(NEW_MAGIC);
    buf.write_u16::<LittleEndian>(SAVE_VERSION)?;
    buf.write_u16::<LittleEndian>(TYPE_FM)?;

    if !name.is_empty() {
        buf.extend_from_slice(b"NA");
        buf.write_u16::<LittleEndian>(name_block_len)?;
        buf.extend_from_slice(name.as_bytes());
        buf.write_u8(0)?;
    }

    buf.extend_from_slice(b"FM");
    buf.write_u16::<LittleEndian>(FM_BLOCK_SIZE)?;
    buf.write_u8(FM_FLAGS)?;
    buf.write_u8(instrument.al << 4 | instrument.fb)?;
    buf.write_u8(instrument.ams << 3 | instrument.pms)?;
    buf.write_u8(0)?;
    buf.write_u8(0)?;
    for &index in HARDWARE_ORDER.iter() {
        let op = &instrument.op[index];
        buf.write_u8(detune_to_chip(op.dt) << 4 | op.ml)?;
        buf.write_u8(op.tl)?;
        buf.write_u8(op.ks << 6 | op.ar)?;
        buf.write_u8((op.am as u8) << 7 | op.dr)?;
        buf.write_u8(op.sr | 0x20)?;
        buf.write_u8(op.sl << 4 | op.rr)?;
        buf.write_u8(op.ssg_eg)?;
        buf.write_u8(0)?;
    }

    Ok(buf)
}
