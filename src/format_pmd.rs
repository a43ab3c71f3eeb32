//! PMD voice definitions.
//!
//! ```text
//! @0  4  5
//!    31  8  0  7 12 20  0  2  7  0
//!    ...
//! ```
//!
//! Line structure is not significant: numbers are separated by any run of
//! spaces, tabs and commas containing at most one line break. Comments are
//! either `;` to end of line or enclosed in backticks, possibly spanning
//! lines.

use std::sync::OnceLock;

use regex::Regex;

use crate::{
    conversion::{Codec, Format, FormatDescriptor},
    error::FormatError,
    instrument::{FmInstrument, FmOperator},
    lexer::{
        operator_columns, operator_from_columns, Token, TokenKind, Tokens, AM_COLUMN,
        OPERATOR_COLUMNS,
    },
};

pub const CODEC: Codec = Codec {
    descriptor: FormatDescriptor {
        format: Format::Pmd,
        extensions: &[],
        readable: true,
        writable: true,
    },
    load: None,
    save: None,
    parse: Some(parse),
    stringify: Some(stringify),
};

static BLOCK_COMMENT_REGEX: OnceLock<Regex> = OnceLock::new();

fn block_comment_regex() -> &'static Regex {
    BLOCK_COMMENT_REGEX.get_or_init(|| Regex::new(r"(?s)`.+?`").expect("invalid regex pattern"))
}

fn strip_comments(text: &str) -> String {
    let text = block_comment_regex().replace_all(text, "");
    text.lines()
        .map(|line| line.split(';').next().unwrap_or(line))
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_blank(token: &Token) -> bool {
    matches!(token.kind, TokenKind::Space | TokenKind::Comma)
}

fn separator(tokens: &mut Tokens) -> Result<(), FormatError> {
    let mut skipped = tokens.skip_while(is_blank);
    if tokens.eat(TokenKind::Eol) {
        skipped += 1 + tokens.skip_while(is_blank);
    }
    if skipped == 0 {
        return Err(tokens.unexpected("separator"));
    }
    Ok(())
}

fn operator(tokens: &mut Tokens) -> Result<FmOperator, FormatError> {
    let mut columns = [0; 9];
    for (i, (name, max)) in OPERATOR_COLUMNS.into_iter().enumerate() {
        columns[i] = tokens.number(name, max)?;
        separator(tokens)?;
    }
    let (name, max) = AM_COLUMN;
    let am = tokens.number(name, max)?;
    Ok(operator_from_columns(columns, am == 1))
}

pub fn parse(text: &str) -> Result<FmInstrument, FormatError> {
    let text = strip_comments(text);
    let mut tokens = Tokens::new(&text);

    tokens.expect(TokenKind::Punct('@'), "'@'")?;
    tokens.skip_while(is_blank);
    tokens.number("voice number", u8::MAX)?;
    separator(&mut tokens)?;

    let mut instrument = FmInstrument {
        al: tokens.number("AL", 7)?,
        ..Default::default()
    };
    separator(&mut tokens)?;
    instrument.fb = tokens.number("FB", 7)?;

    for op in instrument.op.iter_mut() {
        separator(&mut tokens)?;
        *op = operator(&mut tokens)?;
    }

    tokens.skip_while(is_blank);
    tokens.eat(TokenKind::Eol);
    tokens.expect_end()?;
    Ok(instrument)
}

fn format_row(values: &[u8]) -> String {
    values
        .iter()
        .map(|v| format!("{v:>2}"))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn stringify(instrument: &FmInstrument) -> String {
    let mut lines = vec![format!("@0 {}", format_row(&[instrument.al, instrument.fb]))];
    for op in &instrument.op {
        let mut row = operator_columns(op).to_vec();
        row.push(op.am as u8);
        lines.push(format!("   {}", format_row(&row)));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::instrument::testing::text_fixture;

    fn expected() -> FmInstrument {
        let mut instrument = text_fixture();
        instrument.op[3].am = true;
        instrument
    }

    #[test]
    fn test_parse_with_comments() {
        let text = "@0 ;comment
4 5
31 8 0  7 12 20 0  2 7 0
   31 5 2 7 6 4 0

2`dummy` 3 0
31 7 4 7`
dummy 2
`
10 18 0 2 3 0
31 0 4 7 0 0 0 2 0 1";
        assert_eq!(parse(text), Ok(expected()));
    }

    #[test]
    fn test_parse_minimal() {
        let text = "@0,4,5,31,8,0,7,12,20,0,2,7,0,31,5,2,7,6,4,0,2,3,0,\
                    31,7,4,7,10,18,0,2,3,0,31,0,4,7,0,0,0,2,0,1\n";
        assert_eq!(parse(text), Ok(expected()));
    }

    #[test]
    fn test_stringify() {
        let text = stringify(&expected());
        assert_eq!(
            text,
            "@0  4  5
   31  8  0  7 12 20  0  2  7  0
   31  5  2  7  6  4  0  2  3  0
   31  7  4  7 10 18  0  2  3  0
   31  0  4  7  0  0  0  2  0  1"
        );
        assert_eq!(parse(&text), Ok(expected()));
    }

    #[test]
    fn test_parse_errors() {
        let text = stringify(&expected());

        assert!(matches!(
            parse(&text.replace("@0", "0")),
            Err(FormatError::TextParse(_))
        ));

        // One number short.
        assert!(matches!(
            parse(text.trim_end_matches(" 1")),
            Err(FormatError::TextParse(_))
        ));

        assert!(matches!(
            parse(&format!("{text} 5")),
            Err(FormatError::TextParse(_))
        ));

        assert_eq!(
            parse(&text.replace("@0  4", "@0  9")),
            Err(FormatError::TextParse(
                "line 1, column 5: AL out of range: 9 (max 7)".into()
            ))
        );

        assert_eq!(
            parse(&format!("{} 2", text.trim_end_matches(" 1"))),
            Err(FormatError::TextParse(
                "line 5, column 32: AM out of range: 2 (max 1)".into()
            ))
        );

        assert!(matches!(
            parse(&text.replace(" 12 20 ", " 12 x ")),
            Err(FormatError::TextParse(_))
        ));
    }
}
