//! MUCOM88 voice definitions.
//!
//! Two shapes are accepted:
//!
//! ```text
//!   @0:{                          @0
//!    5,  4                         5  4
//!   31,  8,  0,  7, ...           31  8  0  7 ...
//!   ...                           ...
//!   31,  0,  4,  7, ...,""}       31  0  4  7 ...
//! ```
//!
//! Anything on a line that is not a digit separates numbers, so stray words
//! and punctuation between values are ignored. The quoted description of the
//! braced form is discarded.

use crate::{
    conversion::{Codec, Format, FormatDescriptor},
    error::FormatError,
    instrument::{FmInstrument, FmOperator},
    lexer::{operator_columns, operator_from_columns, Token, TokenKind, Tokens, OPERATOR_COLUMNS},
};

pub const CODEC: Codec = Codec {
    descriptor: FormatDescriptor {
        format: Format::Mucom88,
        extensions: &[],
        readable: true,
        writable: true,
    },
    load: None,
    save: None,
    parse: Some(parse),
    stringify: Some(stringify),
};

/// Cuts `line` at the first `;` that is not inside a `"..."` description.
fn code_part(line: &str) -> &str {
    let mut quoted = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ';' if !quoted => return &line[..i],
            _ => {}
        }
    }
    line
}

fn strip_comments(text: &str) -> String {
    text.lines()
        .map(code_part)
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_separator(token: &Token) -> bool {
    !matches!(
        token.kind,
        TokenKind::Number | TokenKind::Eol | TokenKind::Punct('}')
    )
}

fn is_separator_before_description(token: &Token) -> bool {
    is_separator(token) && token.kind != TokenKind::Punct('"')
}

/// Numbers on one line with at least one separator between them.
fn numbers<const N: usize>(
    tokens: &mut Tokens,
    fields: [(&str, u8); N],
) -> Result<[u8; N], FormatError> {
    let mut values = [0; N];
    for (i, (name, max)) in fields.into_iter().enumerate() {
        if i > 0 && tokens.skip_while(is_separator) == 0 {
            return Err(tokens.unexpected("separator"));
        }
        values[i] = tokens.number(name, max)?;
    }
    Ok(values)
}

fn operator(tokens: &mut Tokens) -> Result<FmOperator, FormatError> {
    tokens.skip_while(is_separator);
    let columns = numbers(tokens, OPERATOR_COLUMNS)?;
    Ok(operator_from_columns(columns, false))
}

fn end_of_line(tokens: &mut Tokens) -> Result<(), FormatError> {
    tokens.skip_while(is_separator);
    tokens.expect(TokenKind::Eol, "end of line")?;
    Ok(())
}

/// Everything from the feedback/algorithm line to the last operator.
fn params(tokens: &mut Tokens) -> Result<FmInstrument, FormatError> {
    tokens.skip_while(is_separator);
    let [fb, al] = numbers(tokens, [("FB", 7), ("AL", 7)])?;
    let mut instrument = FmInstrument {
        al,
        fb,
        ..Default::default()
    };
    for (i, op) in instrument.op.iter_mut().enumerate() {
        end_of_line(tokens)?;
        *op = operator(tokens)?;
        if i < 3 {
            tokens.skip_while(is_separator);
        }
    }
    Ok(instrument)
}

/// `"..."` on the current line.
fn description(tokens: &mut Tokens) -> Result<(), FormatError> {
    tokens.expect(TokenKind::Punct('"'), "'\"'")?;
    tokens.skip_while(|t| !matches!(t.kind, TokenKind::Punct('"') | TokenKind::Eol));
    tokens.expect(TokenKind::Punct('"'), "closing '\"'")?;
    Ok(())
}

fn finish(tokens: &mut Tokens) -> Result<(), FormatError> {
    tokens.skip_while(is_separator);
    tokens.eat(TokenKind::Eol);
    tokens.expect_end()
}

pub fn parse(text: &str) -> Result<FmInstrument, FormatError> {
    let text = strip_comments(text);
    let mut tokens = Tokens::new(&text);

    tokens.eat(TokenKind::Space);
    tokens.expect(TokenKind::Punct('@'), "'@'")?;
    tokens.number("voice number", u8::MAX)?;

    let braced = tokens.peek_kind() == Some(TokenKind::Punct(':'))
        && tokens.peek_nth(1).map(|t| t.kind) == Some(TokenKind::Punct('{'));
    if braced {
        tokens.bump();
        tokens.bump();
    }
    end_of_line(&mut tokens)?;

    let instrument = params(&mut tokens)?;

    if braced {
        tokens.skip_while(is_separator_before_description);
        if tokens.peek_kind() == Some(TokenKind::Punct('"')) {
            description(&mut tokens)?;
            tokens.skip_while(is_separator_before_description);
        }
        tokens.expect(TokenKind::Punct('}'), "'}'")?;
    }
    finish(&mut tokens)?;
    Ok(instrument)
}

fn format_row(values: &[u8]) -> String {
    values
        .iter()
        .map(|v| format!("{v:>3}"))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn stringify(instrument: &FmInstrument) -> String {
    let mut lines = vec![
        "  @0:{".to_string(),
        format!(" {}", format_row(&[instrument.fb, instrument.al])),
    ];
    for op in &instrument.op {
        lines.push(format!(" {}", format_row(&operator_columns(op))));
    }
    let mut text = lines.join("\n");
    text.push_str(",\"\"}");
    text
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::instrument::testing::text_fixture;

    #[test]
    fn test_parse_braced() {
        let text = r#"  @0:{
; FB AL
    5 4
31, 8 0  7 12 20 0  2 7
   31 5 2 7 6 4 0 2,3 ; Op2
31 7 4 dum 7 10 18 0 2 3
31 0 4 7 0 0 0 2 0, "dummy"}"#;
        assert_eq!(parse(text), Ok(text_fixture()));
    }

    #[test]
    fn test_parse_plain() {
        let text = "  @0 ; test
; FB AL
    5  4
31,8 0  7 12 20 0 2 7; aaa
   31 5 2 7 6 4 0 2,3
31 7 4 7 10 18 0 2 3
31 0 4,  7 0 0 0 2 0";
        assert_eq!(parse(text), Ok(text_fixture()));
    }

    #[test]
    fn test_description_is_optional() {
        let text = "@12:{\n5,4\n31,8,0,7,12,20,0,2,7\n31,5,2,7,6,4,0,2,3\n\
                    31,7,4,7,10,18,0,2,3\n31,0,4,7,0,0,0,2,0}\n";
        assert_eq!(parse(text), Ok(text_fixture()));

        let digits = text.replace("0}", "0 \"v2 lead\" }");
        assert_eq!(parse(&digits), Ok(text_fixture()));
    }

    #[test]
    fn test_semicolon_in_description() {
        let text =
            stringify(&text_fixture()).replace(",\"\"}", ",\"Lead; bright\"} ; comment");
        assert_eq!(parse(&text), Ok(text_fixture()));

        assert_eq!(code_part("31 0 \"a;b\" ; c"), "31 0 \"a;b\" ");
        assert_eq!(code_part("31 0 ; \"a\""), "31 0 ");
    }

    #[test]
    fn test_stringify() {
        let text = stringify(&text_fixture());
        assert_eq!(
            text,
            r#"  @0:{
   5,  4
  31,  8,  0,  7, 12, 20,  0,  2,  7
  31,  5,  2,  7,  6,  4,  0,  2,  3
  31,  7,  4,  7, 10, 18,  0,  2,  3
  31,  0,  4,  7,  0,  0,  0,  2,  0,""}"#
        );
        assert_eq!(parse(&text), Ok(text_fixture()));
    }

    #[test]
    fn test_parse_errors() {
        let text = stringify(&text_fixture());

        // Missing closing brace.
        assert!(matches!(
            parse(text.trim_end_matches('}')),
            Err(FormatError::TextParse(_))
        ));

        // Operator line split over two lines.
        assert!(matches!(
            parse(&text.replace(" 12, 20,", " 12,\n 20,")),
            Err(FormatError::TextParse(_))
        ));

        // Unterminated description.
        assert!(matches!(
            parse(&text.replace(",\"\"}", ",\"abc}")),
            Err(FormatError::TextParse(_))
        ));

        assert_eq!(
            parse(&text.replace("   5,  4", "   9,  4")),
            Err(FormatError::TextParse(
                "line 2, column 4: FB out of range: 9 (max 7)".into()
            ))
        );

        assert!(matches!(parse("@"), Err(FormatError::TextParse(_))));
    }
}
