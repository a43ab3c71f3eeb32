use std::fmt;

use serde::{de::Error as _, Deserialize, Deserializer, Serialize};

use crate::error::{FormatError, ValidationError};

/// Operator slots in the order the OPN family lays out its registers
/// (operator 1, 3, 2, 4). `HARDWARE_ORDER[slot]` is the channel-order index.
pub const HARDWARE_ORDER: [usize; 4] = [0, 2, 1, 3];

// Chip sign-magnitude detune nibble -> canonical bias encoding, and back.
// Raw 6 and raw 7 both decode to 3; 3 always encodes to 6.
const DETUNE_FROM_CHIP: [u8; 8] = [7, 6, 5, 0, 1, 2, 3, 3];
const DETUNE_TO_CHIP: [u8; 8] = [3, 4, 5, 6, 3, 2, 1, 0];

/// Converts a raw chip detune value to the canonical encoding.
/// Returns `None` if `raw` does not fit in three bits.
pub fn detune_from_chip(raw: u8) -> Option<u8> {
    DETUNE_FROM_CHIP.get(raw as usize).copied()
}

/// Converts a canonical detune (0-7) to the chip's raw value.
pub fn detune_to_chip(dt: u8) -> u8 {
    DETUNE_TO_CHIP[(dt & 7) as usize]
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FmOperator {
    pub ar: u8,
    pub dr: u8,
    pub sr: u8,
    pub rr: u8,
    pub sl: u8,
    pub tl: u8,
    pub ks: u8,
    pub ml: u8,
    #[serde(deserialize_with = "deserialize_detune")]
    pub dt: u8,
    pub ssg_eg: u8,
    pub am: bool,
}

/// A four-operator FM voice. `op` is in channel order (1, 2, 3, 4).
///
/// Deserializing rejects documents with out-of-range fields.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "InstrumentDocument")]
pub struct FmInstrument {
    pub al: u8,
    pub fb: u8,
    pub op: [FmOperator; 4],
    pub lfo_freq: u8,
    pub ams: u8,
    pub pms: u8,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstrumentDocument {
    al: u8,
    fb: u8,
    op: [FmOperator; 4],
    lfo_freq: u8,
    ams: u8,
    pms: u8,
}

impl TryFrom<InstrumentDocument> for FmInstrument {
    type Error = ValidationError;

    fn try_from(doc: InstrumentDocument) -> Result<Self, Self::Error> {
        let instrument = FmInstrument {
            al: doc.al,
            fb: doc.fb,
            op: doc.op,
            lfo_freq: doc.lfo_freq,
            ams: doc.ams,
            pms: doc.pms,
        };
        instrument.validate()?;
        Ok(instrument)
    }
}

// Older documents store detune as a signed value.
fn deserialize_detune<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = i16::deserialize(deserializer)?;
    let value = if value < 0 { 4 - value } else { value };
    u8::try_from(value).map_err(|_| D::Error::custom(format!("detune out of range: {value}")))
}

fn check(field: impl FnOnce() -> String, value: u8, max: u8) -> Result<(), ValidationError> {
    if value > max {
        return Err(ValidationError::OutOfRange {
            field: field(),
            value,
            max,
        });
    }
    Ok(())
}

impl FmOperator {
    fn validate(&self, index: usize) -> Result<(), ValidationError> {
        let fields = [
            ("ar", self.ar, 31),
            ("dr", self.dr, 31),
            ("sr", self.sr, 31),
            ("rr", self.rr, 15),
            ("sl", self.sl, 15),
            ("tl", self.tl, 127),
            ("ks", self.ks, 3),
            ("ml", self.ml, 15),
            ("dt", self.dt, 7),
            ("ssgEg", self.ssg_eg, 15),
        ];
        for (name, value, max) in fields {
            check(|| format!("op[{index}].{name}"), value, max)?;
        }
        Ok(())
    }
}

impl FmInstrument {
    /// Checks every field against its declared range.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check(|| "al".into(), self.al, 7)?;
        check(|| "fb".into(), self.fb, 7)?;
        check(|| "lfoFreq".into(), self.lfo_freq, 15)?;
        check(|| "ams".into(), self.ams, 3)?;
        check(|| "pms".into(), self.pms, 7)?;
        for (index, op) in self.op.iter().enumerate() {
            op.validate(index)?;
        }
        Ok(())
    }

    /// Out-of-range fields coming out of a decoder mean the input was corrupt.
    pub(crate) fn check_decoded(&self) -> Result<(), FormatError> {
        self.validate()
            .map_err(|e| FormatError::DataCorruption(e.to_string()))
    }

    /// Bit 3 of `lfo_freq` is the LFO enable flag.
    pub fn lfo_enabled(&self) -> bool {
        self.lfo_freq & 8 != 0
    }
}

impl fmt::Display for FmOperator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "AR={}, DR={}, SR={}, RR={}, SL={}, TL={}, KS={}, ML={}, DT={}, AM={}, SSGEG={}",
            self.ar,
            self.dr,
            self.sr,
            self.rr,
            self.sl,
            self.tl,
            self.ks,
            self.ml,
            self.dt,
            if self.am { "ON" } else { "OFF" },
            self.ssg_eg
        )
    }
}

impl fmt::Display for FmInstrument {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "AL: {}", self.al)?;
        writeln!(f, "FB: {}", self.fb)?;
        for (index, op) in self.op.iter().enumerate() {
            writeln!(f, "OP{}: {}", index + 1, op)?;
        }
        write!(
            f,
            "LFO: Freq={}, AMS={}, PMS={}",
            self.lfo_freq, self.ams, self.pms
        )
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::{FmInstrument, FmOperator};

    /// The voice used throughout the text-format fixtures.
    pub fn text_fixture() -> FmInstrument {
        let op = |ar, dr, sr, sl, tl, dt| FmOperator {
            ar,
            dr,
            sr,
            rr: 7,
            sl,
            tl,
            ks: 0,
            ml: 2,
            dt,
            ssg_eg: 0,
            am: false,
        };
        FmInstrument {
            al: 4,
            fb: 5,
            op: [
                op(31, 8, 0, 12, 20, 7),
                op(31, 5, 2, 6, 4, 3),
                op(31, 7, 4, 10, 18, 3),
                op(31, 0, 4, 0, 0, 0),
            ],
            lfo_freq: 0,
            ams: 0,
            pms: 0,
        }
    }

    /// A voice with a distinct value in every field.
    pub fn full_instrument() -> FmInstrument {
        FmInstrument {
            al: 4,
            fb: 5,
            op: [
                FmOperator {
                    ar: 12,
                    dr: 7,
                    sr: 25,
                    rr: 3,
                    sl: 10,
                    tl: 56,
                    ks: 2,
                    ml: 8,
                    dt: 5,
                    ssg_eg: 9,
                    am: true,
                },
                FmOperator {
                    ar: 29,
                    dr: 0,
                    sr: 17,
                    rr: 14,
                    sl: 2,
                    tl: 99,
                    ks: 1,
                    ml: 13,
                    dt: 0,
                    ssg_eg: 4,
                    am: false,
                },
                FmOperator {
                    ar: 3,
                    dr: 31,
                    sr: 0,
                    rr: 10,
                    sl: 15,
                    tl: 127,
                    ks: 0,
                    ml: 1,
                    dt: 7,
                    ssg_eg: 15,
                    am: true,
                },
                FmOperator {
                    ar: 25,
                    dr: 19,
                    sr: 12,
                    rr: 7,
                    sl: 0,
                    tl: 80,
                    ks: 3,
                    ml: 15,
                    dt: 2,
                    ssg_eg: 11,
                    am: false,
                },
            ],
            lfo_freq: 11,
            ams: 1,
            pms: 6,
        }
    }
}
