//! FMP voice definitions.
//!
//! ```text
//! '@ 0
//!    AR DR SR RR SL TL KS ML DT
//! '@ 31, 8, 0, 7,12,20, 0, 2, 7
//! '@ 31, 5, 2, 7, 6, 4, 0, 2, 3
//! '@ 31, 7, 4, 7,10,18, 0, 2, 3
//! '@ 31, 0, 4, 7, 0, 0, 0, 2, 0
//! '@  4, 5
//! ```
//!
//! Only lines starting with `'` belong to the voice; everything after `;` is
//! a comment. The line helpers here are shared with FMP7.

use crate::{
    conversion::{Codec, Format, FormatDescriptor},
    error::FormatError,
    instrument::{FmInstrument, FmOperator},
    lexer::{operator_columns, operator_from_columns, TokenKind, Tokens, OPERATOR_COLUMNS},
};

pub const CODEC: Codec = Codec {
    descriptor: FormatDescriptor {
        format: Format::Fmp,
        extensions: &[],
        readable: true,
        writable: true,
    },
    load: None,
    save: None,
    parse: Some(parse),
    stringify: Some(stringify),
};

/// Keeps the `'` lines and drops comments.
pub(crate) fn voice_lines(text: &str) -> String {
    text.lines()
        .filter(|line| line.starts_with('\''))
        .map(|line| {
            let line = line.split(';').next().unwrap_or(line);
            line.trim_end_matches('\r')
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// `'@` followed by optional whitespace.
pub(crate) fn line_head(tokens: &mut Tokens) -> Result<(), FormatError> {
    tokens.expect(TokenKind::Punct('\''), "'@")?;
    tokens.expect(TokenKind::Punct('@'), "'@")?;
    tokens.eat(TokenKind::Space);
    Ok(())
}

/// Trailing whitespace, then a line break unless this is the last line.
pub(crate) fn line_end(tokens: &mut Tokens) -> Result<(), FormatError> {
    tokens.eat(TokenKind::Space);
    if tokens.is_at_end() {
        return Ok(());
    }
    tokens.expect(TokenKind::Eol, "end of line")?;
    Ok(())
}

/// Comma-separated numbers; spaces are allowed around each comma.
pub(crate) fn comma_separated<const N: usize>(
    tokens: &mut Tokens,
    fields: [(&str, u8); N],
) -> Result<[u8; N], FormatError> {
    let mut values = [0; N];
    for (i, (name, max)) in fields.into_iter().enumerate() {
        if i > 0 {
            tokens.eat(TokenKind::Space);
            tokens.expect(TokenKind::Comma, "','")?;
            tokens.eat(TokenKind::Space);
        }
        values[i] = tokens.number(name, max)?;
    }
    Ok(values)
}

pub(crate) fn operator_line(tokens: &mut Tokens) -> Result<FmOperator, FormatError> {
    line_head(tokens)?;
    let values = comma_separated(tokens, OPERATOR_COLUMNS)?;
    line_end(tokens)?;
    Ok(operator_from_columns(values, false))
}

/// The closing `'@ al,fb` line; nothing may follow it.
pub(crate) fn al_fb_line(tokens: &mut Tokens) -> Result<(u8, u8), FormatError> {
    line_head(tokens)?;
    let [al, fb] = comma_separated(tokens, [("AL", 7), ("FB", 7)])?;
    line_end(tokens)?;
    tokens.expect_end()?;
    Ok((al, fb))
}

pub(crate) fn format_row(values: &[u8]) -> String {
    values
        .iter()
        .map(|v| format!("{v:>2}"))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn parse(text: &str) -> Result<FmInstrument, FormatError> {
    let text = voice_lines(text);
    let mut tokens = Tokens::new(&text);

    line_head(&mut tokens)?;
    tokens.number("voice number", u8::MAX)?;
    line_end(&mut tokens)?;

    let mut instrument = FmInstrument::default();
    for op in instrument.op.iter_mut() {
        *op = operator_line(&mut tokens)?;
    }
    (instrument.al, instrument.fb) = al_fb_line(&mut tokens)?;
    Ok(instrument)
}

pub fn stringify(instrument: &FmInstrument) -> String {
    let mut lines = vec![
        "'@ 0".to_string(),
        "   AR DR SR RR SL TL KS ML DT".to_string(),
    ];
    for op in &instrument.op {
        lines.push(format!("'@ {}", format_row(&operator_columns(op))));
    }
    lines.push(format!("'@ {}", format_row(&[instrument.al, instrument.fb])));
    lines.join("\n")
}
