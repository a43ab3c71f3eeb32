//! BambooTracker `.bti` instruments.
//!
//! After the file header come two chunks: `INSTRMNT` with the name and
//! instrument type, and `INSTPROP` holding tagged property sections. Chunk
//! sizes are counted from the size field itself. Each section is
//! `{tag, len, payload}` where `len` covers itself and the payload, so a
//! reader can hop over sections it does not know.

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::{debug, trace};

use crate::{
    conversion::{Codec, Format, FormatDescriptor},
    error::FormatError,
    instrument::{FmInstrument, FmOperator},
};

pub const CODEC: Codec = Codec {
    descriptor: FormatDescriptor {
        format: Format::BambooTracker,
        extensions: &[".bti"],
        readable: true,
        writable: true,
    },
    load: Some(load),
    save: Some(save),
    parse: None,
    stringify: None,
};

const FILE_MAGIC: &[u8; 16] = b"BambooTrackerIst";
const INSTRUMENT_CHUNK: &[u8; 8] = b"INSTRMNT";
const PROPERTY_CHUNK: &[u8; 8] = b"INSTPROP";
/// v1.4.0
const FILE_VERSION: u32 = 0x0001_0400;

const TYPE_FM: u8 = 0;
const SECTION_FM_ENVELOPE: u8 = 0x00;
const SECTION_FM_LFO: u8 = 0x01;

const ENVELOPE_SECTION_LEN: u8 = 26;
const LFO_SECTION_LEN: u8 = 4;

fn expect_chunk(cursor: &mut Cursor<&[u8]>, id: &[u8; 8]) -> Result<(), FormatError> {
    let mut found = [0u8; 8];
    if cursor.read_exact(&mut found).is_err() || &found != id {
        return Err(FormatError::corrupt(format!(
            "{} chunk not found",
            String::from_utf8_lossy(id)
        )));
    }
    Ok(())
}

fn read_envelope(payload: &[u8], instrument: &mut FmInstrument) -> Result<(), FormatError> {
    let mut cursor = Cursor::new(payload);
    let al_fb = cursor.read_u8()?;
    instrument.al = al_fb >> 4;
    instrument.fb = al_fb & 0x0F;
    for op in instrument.op.iter_mut() {
        let ar = cursor.read_u8()?;
        let ks_dr = cursor.read_u8()?;
        let dt_sr = cursor.read_u8()?;
        let sl_rr = cursor.read_u8()?;
        let tl = cursor.read_u8()?;
        let ssg_ml = cursor.read_u8()?;
        *op = FmOperator {
            ar: ar & 0x1F,
            dr: ks_dr & 0x1F,
            sr: dt_sr & 0x1F,
            rr: sl_rr & 0x0F,
            sl: sl_rr >> 4,
            tl,
            ks: ks_dr >> 5,
            ml: ssg_ml & 0x0F,
            dt: dt_sr >> 5,
            ssg_eg: (ssg_ml >> 4) ^ 0x08,
            am: op.am,
        };
    }
    Ok(())
}

fn read_lfo(payload: &[u8], instrument: &mut FmInstrument) -> Result<(), FormatError> {
    let mut cursor = Cursor::new(payload);
    let rate_pms = cursor.read_u8()?;
    let am_ams = cursor.read_u8()?;
    instrument.lfo_freq = (rate_pms >> 4) | 8;
    instrument.pms = rate_pms & 7;
    instrument.ams = am_ams & 3;
    for (i, op) in instrument.op.iter_mut().enumerate() {
        op.am = am_ams & (0x10 << i) != 0;
    }
    Ok(())
}

pub fn load(data: &[u8]) -> Result<(FmInstrument, String), FormatError> {
    let mut cursor = Cursor::new(data);

    let mut magic = [0u8; 16];
    if cursor.read_exact(&mut magic).is_err() || &magic != FILE_MAGIC {
        return Err(FormatError::InvalidFormat("invalid magic string".into()));
    }
    let _eof_offset = cursor.read_u32::<LittleEndian>()?;
    let version = cursor.read_u32::<LittleEndian>()?;

    expect_chunk(&mut cursor, INSTRUMENT_CHUNK)?;
    let chunk_start = cursor.position();
    let chunk_size = cursor.read_u32::<LittleEndian>()?;
    let name_len = cursor.read_u32::<LittleEndian>()? as usize;
    let name_start = cursor.position() as usize;
    let name_bytes = name_start
        .checked_add(name_len)
        .and_then(|end| data.get(name_start..end))
        .ok_or_else(|| FormatError::corrupt("name exceeds file"))?;
    let name = String::from_utf8_lossy(name_bytes).into_owned();
    cursor.set_position((name_start + name_len) as u64);
    let instrument_type = cursor.read_u8()?;
    if instrument_type != TYPE_FM {
        return Err(FormatError::UnsupportedInstrumentType(format!(
            "type {instrument_type}, only FM is supported"
        )));
    }
    cursor.set_position(chunk_start + u64::from(chunk_size));

    expect_chunk(&mut cursor, PROPERTY_CHUNK)?;
    let prop_start = cursor.position() as usize;
    let prop_size = cursor.read_u32::<LittleEndian>()? as usize;
    let prop_end = prop_start
        .checked_add(prop_size)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| FormatError::corrupt("INSTPROP chunk exceeds file"))?;

    let mut instrument = FmInstrument::default();
    let mut has_envelope = false;
    let mut pos = prop_start + 4;
    while pos < prop_end {
        let tag = data[pos];
        let len = match data.get(pos + 1) {
            Some(&len) if pos + 1 < prop_end => len as usize,
            _ => return Err(FormatError::corrupt("truncated section header")),
        };
        if len == 0 {
            return Err(FormatError::corrupt(format!("empty section {tag:#04x}")));
        }
        let end = pos + 1 + len;
        if end > prop_end {
            return Err(FormatError::corrupt(format!(
                "section {tag:#04x} crosses chunk end"
            )));
        }
        let payload = &data[pos + 2..end];
        match tag {
            SECTION_FM_ENVELOPE => {
                read_envelope(payload, &mut instrument)?;
                has_envelope = true;
            }
            SECTION_FM_LFO => read_lfo(payload, &mut instrument)?,
            _ => trace!("skipping BTI section {:#04x} ({} bytes)", tag, len),
        }
        pos = end;
    }
    if !has_envelope {
        return Err(FormatError::corrupt("FM envelope section not found"));
    }
    instrument.check_decoded()?;

    debug!("decoded BambooTracker instrument {:?} (file version {:#x})", name, version);
    Ok((instrument, name))
}

pub fn save(instrument: &FmInstrument, name: &str) -> Result<Vec<u8>, FormatError> {
    instrument.validate()?;
    let name_len =
        u32::try_from(name.len()).map_err(|_| FormatError::InvalidName(name.to_string()))?;

    let has_lfo = instrument.lfo_enabled();
    let inst_content_size = name_len + 20;
    let prop_content_size: u32 = if has_lfo { 36 } else { 31 };
    let total_size = 24 + (8 + inst_content_size) + (8 + prop_content_size);

    let mut buf = Vec::with_capacity(total_size as usize);
    buf.extend_from_slice(FILE_MAGIC);
    buf.write_u32::<LittleEndian>(total_size - 16)?;
    buf.write_u32::<LittleEndian>(FILE_VERSION)?;

    buf.extend_from_slice(INSTRUMENT_CHUNK);
    buf.write_u32::<LittleEndian>(inst_content_size)?;
    buf.write_u32::<LittleEndian>(name_len)?;
    buf.extend_from_slice(name.as_bytes());
    buf.write_u8(TYPE_FM)?;
    // envelope number, then reserved filler
    buf.write_u8(0)?;
    buf.extend_from_slice(&[0x80; 10]);

    buf.extend_from_slice(PROPERTY_CHUNK);
    buf.write_u32::<LittleEndian>(prop_content_size)?;

    buf.write_u8(SECTION_FM_ENVELOPE)?;
    buf.write_u8(ENVELOPE_SECTION_LEN)?;
    buf.write_u8(instrument.al << 4 | instrument.fb)?;
    for op in &instrument.op {
        buf.write_u8(0x20 | op.ar)?;
        buf.write_u8(op.ks << 5 | op.dr)?;
        buf.write_u8(op.dt << 5 | op.sr)?;
        buf.write_u8(op.sl << 4 | op.rr)?;
        buf.write_u8(op.tl)?;
        buf.write_u8((op.ssg_eg ^ 8) << 4 | op.ml)?;
    }

    if has_lfo {
        let am_bits = instrument
            .op
            .iter()
            .enumerate()
            .filter(|(_, op)| op.am)
            .fold(0u8, |bits, (i, _)| bits | 0x10 << i);
        buf.write_u8(SECTION_FM_LFO)?;
        buf.write_u8(LFO_SECTION_LEN)?;
        buf.write_u8((instrument.lfo_freq & 7) << 4 | instrument.pms)?;
        buf.write_u8(am_bits | instrument.ams)?;
        buf.write_u8(0)?;
    }

    Ok(buf)
}
