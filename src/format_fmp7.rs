//! FMP7 voice definitions.
//!
//! Same line layout as FMP, but the header names the variant: `'@ F n` has
//! the usual nine operator columns and `'@ FA n` adds an AM flag column.

use crate::{
    conversion::{Codec, Format, FormatDescriptor},
    error::FormatError,
    format_fmp::{al_fb_line, comma_separated, format_row, line_end, line_head, voice_lines},
    instrument::FmInstrument,
    lexer::{
        error_at, operator_columns, operator_from_columns, TokenKind, Tokens, AM_COLUMN,
        OPERATOR_COLUMNS,
    },
};

pub const CODEC: Codec = Codec {
    descriptor: FormatDescriptor {
        format: Format::Fmp7,
        extensions: &[],
        readable: true,
        writable: true,
    },
    load: None,
    save: None,
    parse: Some(parse),
    stringify: Some(stringify),
};

const FA_COLUMNS: [(&str, u8); 10] = [
    OPERATOR_COLUMNS[0],
    OPERATOR_COLUMNS[1],
    OPERATOR_COLUMNS[2],
    OPERATOR_COLUMNS[3],
    OPERATOR_COLUMNS[4],
    OPERATOR_COLUMNS[5],
    OPERATOR_COLUMNS[6],
    OPERATOR_COLUMNS[7],
    OPERATOR_COLUMNS[8],
    AM_COLUMN,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Variant {
    F,
    Fa,
}

fn header(tokens: &mut Tokens) -> Result<Variant, FormatError> {
    line_head(tokens)?;
    let tag = tokens.expect(TokenKind::Word, "voice type F or FA")?;
    let variant = match tag.text {
        "F" => Variant::F,
        "FA" => Variant::Fa,
        _ => return Err(error_at(&tag, format!("unknown voice type '{}'", tag.text))),
    };
    tokens.eat(TokenKind::Space);
    tokens.number("voice number", u8::MAX)?;
    line_end(tokens)?;
    Ok(variant)
}

pub fn parse(text: &str) -> Result<FmInstrument, FormatError> {
    let text = voice_lines(text);
    let mut tokens = Tokens::new(&text);

    let variant = header(&mut tokens)?;
    let mut instrument = FmInstrument::default();
    for op in instrument.op.iter_mut() {
        line_head(&mut tokens)?;
        *op = match variant {
            Variant::F => {
                operator_from_columns(comma_separated(&mut tokens, OPERATOR_COLUMNS)?, false)
            }
            Variant::Fa => {
                let values = comma_separated(&mut tokens, FA_COLUMNS)?;
                let mut columns = [0; 9];
                columns.copy_from_slice(&values[..9]);
                operator_from_columns(columns, values[9] == 1)
            }
        };
        line_end(&mut tokens)?;
    }
    (instrument.al, instrument.fb) = al_fb_line(&mut tokens)?;
    Ok(instrument)
}

/// Always writes the `FA` variant so the AM flags survive.
pub fn stringify(instrument: &FmInstrument) -> String {
    let mut lines = vec![
        "'@ FA 0".to_string(),
        "   AR DR SR RR SL TL KS ML DT AM".to_string(),
    ];
    for op in &instrument.op {
        let mut row = operator_columns(op).to_vec();
        row.push(op.am as u8);
        lines.push(format!("'@ {}", format_row(&row)));
    }
    lines.push(format!("'@ {}", format_row(&[instrument.al, instrument.fb])));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::instrument::testing::text_fixture;

    const F_SAMPLE: &str = "'@ F  0 ;comment
   AR DR SR RR SL TL KS ML DT
'@ 31, 8, 0, 7,12,20, 0, 2, 7
'@ 31,5,2,7,6,4,0,2,3
'@ 31,7,4,7,10,18,0,2,3
'@ 31,0,4,7,0,0,0,2,0
'@ 4,5";

    const FA_SAMPLE: &str = "'@ FA 0
'@ 31,8,0,7,12,20,0,2,7,1
'@ 31,5,2,7,6,4,0,2,3,0
'@ 31,7,4,7,10,18,0,2,3,0
'@ 31,0,4,7,0,0,0,2,0,0 ; comment
'@ 4,5";

    #[test]
    fn test_parse_f() {
        assert_eq!(parse(F_SAMPLE), Ok(text_fixture()));
    }

    #[test]
    fn test_parse_fa() {
        let mut expected = text_fixture();
        expected.op[0].am = true;
        assert_eq!(parse(FA_SAMPLE), Ok(expected));
    }

    #[test]
    fn test_column_count_must_match_variant() {
        let f_with_am = F_SAMPLE.replace("'@ F  0", "'@ FA 0");
        assert!(matches!(parse(&f_with_am), Err(FormatError::TextParse(_))));

        let fa_without_am = FA_SAMPLE.replace("'@ FA 0", "'@ F 0");
        assert!(matches!(
            parse(&fa_without_am),
            Err(FormatError::TextParse(_))
        ));
    }

    #[test]
    fn test_parse_errors() {
        let unknown = FA_SAMPLE.replace("'@ FA 0", "'@ FX 0");
        assert_eq!(
            parse(&unknown),
            Err(FormatError::TextParse(
                "line 1, column 4: unknown voice type 'FX'".into()
            ))
        );

        let bad_flag = FA_SAMPLE.replace("0,2,7,1", "0,2,7,2");
        assert!(matches!(
            parse(&bad_flag),
            Err(FormatError::TextParse(message)) if message.contains("AM out of range: 2 (max 1)")
        ));

        // Plain FMP header.
        assert!(matches!(
            parse(&F_SAMPLE.replace("'@ F  0", "'@ 0")),
            Err(FormatError::TextParse(_))
        ));
    }

    #[test]
    fn test_stringify() {
        let mut instrument = text_fixture();
        instrument.op[2].am = true;
        let text = stringify(&instrument);
        assert_eq!(
            text,
            "'@ FA 0
   AR DR SR RR SL TL KS ML DT AM
'@ 31, 8, 0, 7,12,20, 0, 2, 7, 0
'@ 31, 5, 2, 7, 6, 4, 0, 2, 3, 0
'@ 31, 7, 4, 7,10,18, 0, 2, 3, 1
'@ 31, 0, 4, 7, 0, 0, 0, 2, 0, 0
'@  4, 5"
        );
        assert_eq!(parse(&text), Ok(instrument));
    }
}
