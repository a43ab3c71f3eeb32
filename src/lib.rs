//! Conversion between the FM instrument preset formats of chiptune trackers
//! and music drivers.
//!
//! Every format decodes to and encodes from one [`FmInstrument`]: a
//! four-operator OPN voice. Binary formats expose `load`/`save`, text formats
//! `parse`/`stringify`; [`conversion`] picks the right one by extension or
//! [`Format`].
//!
//! ```no_run
//! use fmconv::{conversion, Format};
//!
//! let data = std::fs::read("lead.tfi").unwrap();
//! let (instrument, _name) = conversion::load_file("lead.tfi", &data).unwrap();
//! let stringify = Format::Pmd.codec().and_then(|codec| codec.stringify).unwrap();
//! println!("{}", stringify(&instrument));
//! ```

pub mod conversion;
pub mod error;
pub mod format_bti;
pub mod format_dmp;
pub mod format_fmp;
pub mod format_fmp7;
pub mod format_fui;
pub mod format_ins;
pub mod format_mucom88;
pub mod format_pmd;
pub mod format_tfi;
pub mod format_vgi;
pub mod instrument;
pub mod lexer;

pub use conversion::{Codec, ExportKind, Exporter, Format, FormatDescriptor};
pub use error::{FormatError, ValidationError};
pub use instrument::{FmInstrument, FmOperator};
