//! Format registry: which codec handles which file extension or format name.
//!
//! Every codec module declares a [`Codec`] entry; the lookups below only ever
//! walk [`CODECS`], so registering a new format means adding its entry there.

use std::{fmt, str::FromStr};

use tracing::debug;

use crate::{
    error::FormatError, format_bti, format_dmp, format_fmp, format_fmp7, format_fui, format_ins,
    format_mucom88, format_pmd, format_tfi, format_vgi, instrument::FmInstrument,
};

pub type LoadFn = fn(&[u8]) -> Result<(FmInstrument, String), FormatError>;
pub type SaveFn = fn(&FmInstrument, &str) -> Result<Vec<u8>, FormatError>;
pub type ParseFn = fn(&str) -> Result<FmInstrument, FormatError>;
pub type StringifyFn = fn(&FmInstrument) -> String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    BambooTracker,
    DefleMask,
    Fmp,
    Fmp7,
    Furnace,
    Mucom88,
    MvsTracker,
    Pmd,
    TfmMusicMaker,
    VgmMusicMaker,
}

impl Format {
    /// Stable identifier shown to users.
    pub fn id(self) -> &'static str {
        match self {
            Format::BambooTracker => "BambooTracker",
            Format::DefleMask => "DefleMask",
            Format::Fmp => "FMP",
            Format::Fmp7 => "FMP7",
            Format::Furnace => "Furnace",
            Format::Mucom88 => "MUCOM88",
            Format::MvsTracker => "MVSTracker",
            Format::Pmd => "PMD",
            Format::TfmMusicMaker => "TFM Music Maker",
            Format::VgmMusicMaker => "VGM Music Maker",
        }
    }

    pub fn codec(self) -> Option<&'static Codec> {
        CODECS.iter().find(|codec| codec.descriptor.format == self)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.id())
    }
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_' | '.'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Accepts the identifier in any case and spacing (`tfm-music-maker`), or a
/// file extension claimed by the format (`tfi`, `.tfi`).
impl FromStr for Format {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize(s);
        CODECS
            .iter()
            .find(|codec| normalize(codec.descriptor.format.id()) == wanted)
            .or_else(|| {
                CODECS.iter().find(|codec| {
                    codec
                        .descriptor
                        .extensions
                        .iter()
                        .any(|ext| normalize(ext) == wanted)
                })
            })
            .map(|codec| codec.descriptor.format)
            .ok_or_else(|| FormatError::UnknownFormat(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    File,
    Text,
}

/// Static metadata for one format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatDescriptor {
    pub format: Format,
    /// Lower-case extensions including the dot.
    pub extensions: &'static [&'static str],
    pub readable: bool,
    pub writable: bool,
}

/// A format's descriptor together with the functions it provides.
#[derive(Clone, Copy)]
pub struct Codec {
    pub descriptor: FormatDescriptor,
    pub load: Option<LoadFn>,
    pub save: Option<SaveFn>,
    pub parse: Option<ParseFn>,
    pub stringify: Option<StringifyFn>,
}

impl fmt::Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Codec")
            .field("descriptor", &self.descriptor)
            .field("load", &self.load.is_some())
            .field("save", &self.save.is_some())
            .field("parse", &self.parse.is_some())
            .field("stringify", &self.stringify.is_some())
            .finish()
    }
}

impl Codec {
    pub fn export_kind(&self) -> Option<ExportKind> {
        if !self.descriptor.writable {
            return None;
        }
        match (self.save, self.stringify) {
            (Some(_), _) => Some(ExportKind::File),
            (None, Some(_)) => Some(ExportKind::Text),
            (None, None) => None,
        }
    }
}

pub static CODECS: &[Codec] = &[
    format_bti::CODEC,
    format_dmp::CODEC,
    format_fmp::CODEC,
    format_fmp7::CODEC,
    format_fui::CODEC,
    format_mucom88::CODEC,
    format_ins::CODEC,
    format_pmd::CODEC,
    format_tfi::CODEC,
    format_vgi::CODEC,
];

/// How to export an instrument in a given format.
#[derive(Clone, Copy)]
pub enum Exporter {
    File {
        save: SaveFn,
        extension: &'static str,
    },
    Text {
        stringify: StringifyFn,
    },
}

impl fmt::Debug for Exporter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Exporter::File { extension, .. } => write!(f, "Exporter::File({extension})"),
            Exporter::Text { .. } => f.write_str("Exporter::Text"),
        }
    }
}

/// Lower-cased extension of a file name, dot included. Leading dots do not
/// start an extension, so `.hidden` has none.
pub fn file_extension(file_name: &str) -> Option<String> {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    let (_, ext) = base.trim_start_matches('.').rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(format!(".{}", ext.to_lowercase()))
}

pub fn supported_formats() -> impl Iterator<Item = &'static Codec> {
    CODECS.iter()
}

pub fn readable_extensions() -> impl Iterator<Item = &'static str> {
    CODECS
        .iter()
        .filter(|codec| codec.descriptor.readable && codec.load.is_some())
        .flat_map(|codec| codec.descriptor.extensions.iter().copied())
}

pub fn exportable_formats() -> impl Iterator<Item = Format> {
    CODECS
        .iter()
        .filter(|codec| codec.export_kind().is_some())
        .map(|codec| codec.descriptor.format)
}

pub fn text_formats() -> impl Iterator<Item = Format> {
    CODECS
        .iter()
        .filter(|codec| codec.descriptor.readable && codec.parse.is_some())
        .map(|codec| codec.descriptor.format)
}

/// Finds the binary loader for a file by its extension.
pub fn loader_for_file(file_name: &str) -> Result<LoadFn, FormatError> {
    let ext = file_extension(file_name)
        .ok_or_else(|| FormatError::NotLoadable(file_name.to_string()))?;
    CODECS
        .iter()
        .filter(|codec| codec.descriptor.readable)
        .find(|codec| codec.descriptor.extensions.contains(&ext.as_str()))
        .and_then(|codec| codec.load)
        .ok_or_else(|| FormatError::NotLoadable(file_name.to_string()))
}

pub fn exporter_for(format: Format) -> Result<Exporter, FormatError> {
    let not_writable = || FormatError::NotWritable(format.id().to_string());
    let codec = format.codec().ok_or_else(not_writable)?;
    match codec.export_kind() {
        Some(ExportKind::File) => {
            let save = codec.save.ok_or_else(not_writable)?;
            let extension = codec.descriptor.extensions.first().copied().unwrap_or("");
            Ok(Exporter::File { save, extension })
        }
        Some(ExportKind::Text) => {
            let stringify = codec.stringify.ok_or_else(not_writable)?;
            Ok(Exporter::Text { stringify })
        }
        None => Err(not_writable()),
    }
}

/// The text parser for `format`, if it has one.
pub fn parser_for(format: Format) -> Option<ParseFn> {
    format
        .codec()
        .filter(|codec| codec.descriptor.readable)
        .and_then(|codec| codec.parse)
}

/// Loads a binary instrument file, picking the codec from `file_name`.
pub fn load_file(file_name: &str, data: &[u8]) -> Result<(FmInstrument, String), FormatError> {
    let load = loader_for_file(file_name)?;
    debug!("loading {} ({} bytes)", file_name, data.len());
    load(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::testing::text_fixture;

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("example.txt").as_deref(), Some(".txt"));
        assert_eq!(file_extension("example.tar.gz").as_deref(), Some(".gz"));
        assert_eq!(file_extension("example"), None);
        assert_eq!(file_extension(".hiddenfile"), None);
        assert_eq!(file_extension("LEAD.TFI").as_deref(), Some(".tfi"));
        assert_eq!(file_extension("dir.v2/voice").as_deref(), None);
        assert_eq!(file_extension("trailing."), None);
    }

    #[test]
    fn test_loader_lookup() {
        let pairs: [(&str, LoadFn); 6] = [
            ("test.bti", format_bti::load),
            ("test.dmp", format_dmp::load),
            ("test.fui", format_fui::load),
            ("test.ins", format_ins::load),
            ("test.tfi", format_tfi::load),
            ("TEST.VGI", format_vgi::load),
        ];
        for (name, loader) in pairs {
            let found = loader_for_file(name).unwrap();
            assert_eq!(found as usize, loader as usize, "{name}");
        }
    }

    #[test]
    fn test_loader_lookup_fails() {
        assert!(matches!(
            loader_for_file("test.txt"),
            Err(FormatError::NotLoadable(_))
        ));
        assert!(matches!(
            loader_for_file("noext"),
            Err(FormatError::NotLoadable(_))
        ));
    }

    #[test]
    fn test_exporter_lookup() {
        let files = [
            Format::BambooTracker,
            Format::DefleMask,
            Format::Furnace,
            Format::MvsTracker,
            Format::TfmMusicMaker,
            Format::VgmMusicMaker,
        ];
        for format in files {
            assert!(
                matches!(exporter_for(format), Ok(Exporter::File { .. })),
                "{format}"
            );
        }
        let texts = [Format::Fmp, Format::Fmp7, Format::Mucom88, Format::Pmd];
        for format in texts {
            assert!(
                matches!(exporter_for(format), Ok(Exporter::Text { .. })),
                "{format}"
            );
        }
        match exporter_for(Format::TfmMusicMaker) {
            Ok(Exporter::File { extension, .. }) => assert_eq!(extension, ".tfi"),
            other => panic!("unexpected exporter {other:?}"),
        }
    }

    #[test]
    fn test_parser_lookup() {
        for format in [Format::Fmp, Format::Fmp7, Format::Mucom88, Format::Pmd] {
            assert!(parser_for(format).is_some(), "{format}");
        }
        assert!(parser_for(Format::Furnace).is_none());
        let parse = parser_for(Format::Pmd).unwrap();
        assert_eq!(parse as usize, format_pmd::parse as usize);
    }

    #[test]
    fn test_registry_is_complete() {
        for codec in supported_formats() {
            let d = codec.descriptor;
            assert_eq!(
                d.readable,
                codec.load.is_some() || codec.parse.is_some(),
                "{}",
                d.format
            );
            assert_eq!(
                d.writable,
                codec.save.is_some() || codec.stringify.is_some(),
                "{}",
                d.format
            );
            if d.readable && codec.load.is_some() {
                for ext in d.extensions {
                    assert!(loader_for_file(&format!("voice{ext}")).is_ok());
                    assert!(loader_for_file(&format!("VOICE{}", ext.to_uppercase())).is_ok());
                }
            }
            if d.readable && codec.parse.is_some() {
                assert!(parser_for(d.format).is_some());
            }
            if d.writable {
                assert!(exporter_for(d.format).is_ok());
            }
            assert_eq!(d.format.codec().map(|c| c.descriptor), Some(d));
        }
        assert_eq!(CODECS.len(), 10);
        assert_eq!(readable_extensions().count(), 6);
        assert_eq!(text_formats().count(), 4);
        assert_eq!(exportable_formats().count(), 10);
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("PMD".parse::<Format>(), Ok(Format::Pmd));
        assert_eq!("mucom88".parse::<Format>(), Ok(Format::Mucom88));
        assert_eq!("tfm-music-maker".parse::<Format>(), Ok(Format::TfmMusicMaker));
        assert_eq!("TFM Music Maker".parse::<Format>(), Ok(Format::TfmMusicMaker));
        assert_eq!("bti".parse::<Format>(), Ok(Format::BambooTracker));
        assert_eq!(".vgi".parse::<Format>(), Ok(Format::VgmMusicMaker));
        assert!(matches!(
            "opm".parse::<Format>(),
            Err(FormatError::UnknownFormat(_))
        ));
        for codec in CODECS {
            let format = codec.descriptor.format;
            assert_eq!(format.to_string().parse::<Format>(), Ok(format));
        }
    }

    #[test]
    fn test_text_export_round_trip_through_registry() {
        let instrument = text_fixture();
        for format in text_formats() {
            let Ok(Exporter::Text { stringify }) = exporter_for(format) else {
                panic!("{format} has no text exporter");
            };
            let parse = parser_for(format).unwrap();
            assert_eq!(parse(&stringify(&instrument)), Ok(instrument), "{format}");
        }
    }
}
