//! Grammar for the inside of one `{{ … }}` action, using nom.
//!
//! ```text
//! action    := keyword-form | pipeline
//! pipeline  := [ $x [, $y] (":=" | "=") ] command { "|" command }
//! command   := operand { ws operand }
//! operand   := literal | .A.B | . | $x.A.B | ( pipeline ) | identifier
//! ```

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while_m_n},
    character::complete::{char, digit0, digit1, multispace0, multispace1, none_of, one_of, satisfy},
    combinator::{map, map_opt, not, opt, recognize, value},
    error::{Error, ErrorKind},
    multi::{many0, many1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use crate::ast::{Command, Expr, Number, NumberValue, Pipeline};

/// Kinds of control structures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ControlKind {
    If,
    Range,
    With,
}

impl ControlKind {
    pub(super) fn name(self) -> &'static str {
        match self {
            ControlKind::If => "if",
            ControlKind::Range => "range",
            ControlKind::With => "with",
        }
    }
}

/// A parsed action body, before it is placed in the tree.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum Action {
    Pipeline(Pipeline),
    Control(ControlKind, Pipeline),
    /// `{{else}}`, `{{else if …}}`, `{{else with …}}`
    Else(Option<(ControlKind, Pipeline)>),
    End,
    Break,
    Continue,
    Template {
        name: String,
        pipeline: Option<Pipeline>,
    },
    /// `define` or `block`
    Definition(&'static str),
}

/// Parse one action body. On failure returns the byte offset into `body`
/// and a message.
pub(super) fn parse_action(body: &str) -> Result<Action, (usize, String)> {
    match terminated(preceded(multispace0, action), multispace0)(body) {
        Ok(("", action)) => Ok(action),
        Ok((rest, _)) => Err((body.len() - rest.len(), unexpected(rest))),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            Err((body.len() - e.input.len(), unexpected(e.input)))
        }
        Err(nom::Err::Incomplete(_)) => Err((body.len(), "unexpected end of action".to_string())),
    }
}

fn unexpected(rest: &str) -> String {
    match rest.chars().next() {
        Some(c) => format!("unexpected {:?} in command", c),
        None => "missing value for command".to_string(),
    }
}

fn action(input: &str) -> IResult<&str, Action> {
    alt((
        map(preceded(keyword("if"), control_pipeline), |p| {
            Action::Control(ControlKind::If, p)
        }),
        map(preceded(keyword("range"), control_pipeline), |p| {
            Action::Control(ControlKind::Range, p)
        }),
        map(preceded(keyword("with"), control_pipeline), |p| {
            Action::Control(ControlKind::With, p)
        }),
        else_action,
        value(Action::End, keyword("end")),
        value(Action::Break, keyword("break")),
        value(Action::Continue, keyword("continue")),
        template_action,
        value(
            Action::Definition("define"),
            pair(keyword("define"), nom::combinator::rest),
        ),
        value(
            Action::Definition("block"),
            pair(keyword("block"), nom::combinator::rest),
        ),
        map(pipeline, Action::Pipeline),
    ))(input)
}

fn control_pipeline(input: &str) -> IResult<&str, Pipeline> {
    preceded(multispace0, pipeline)(input)
}

fn else_action(input: &str) -> IResult<&str, Action> {
    let (input, _) = keyword("else")(input)?;
    let (input, chained) = opt(preceded(
        multispace1,
        alt((
            map(preceded(keyword("if"), control_pipeline), |p| {
                (ControlKind::If, p)
            }),
            map(preceded(keyword("with"), control_pipeline), |p| {
                (ControlKind::With, p)
            }),
        )),
    ))(input)?;
    Ok((input, Action::Else(chained)))
}

fn template_action(input: &str) -> IResult<&str, Action> {
    let (input, _) = keyword("template")(input)?;
    let (input, _) = multispace0(input)?;
    let (input, name) = alt((quoted_string, raw_string))(input)?;
    let (input, pipeline) = opt(preceded(multispace1, pipeline))(input)?;
    Ok((input, Action::Template { name, pipeline }))
}

/// Match `kw` only when it is not the prefix of a longer identifier.
fn keyword<'a>(kw: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    terminated(tag(kw), not(satisfy(is_ident_char)))
}

pub(super) fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn ident(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_alphabetic() || c == '_'),
        take_while(is_ident_char),
    ))(input)
}

fn variable_name(input: &str) -> IResult<&str, &str> {
    recognize(pair(char('$'), take_while(is_ident_char)))(input)
}

pub(super) fn pipeline(input: &str) -> IResult<&str, Pipeline> {
    let (input, decl) = opt(declaration)(input)?;
    let (input, first) = command(input)?;
    let (input, rest) = many0(preceded(
        tuple((multispace0, char('|'), multispace0)),
        command,
    ))(input)?;

    let (decl, is_assign) = decl.unwrap_or_default();
    let mut cmds = vec![first];
    cmds.extend(rest);
    Ok((
        input,
        Pipeline {
            decl,
            is_assign,
            cmds,
        },
    ))
}

/// `$x :=`, `$i, $e :=` or `$x =`
fn declaration(input: &str) -> IResult<&str, (Vec<String>, bool)> {
    let (input, first) = variable_name(input)?;
    let (input, second) = opt(preceded(
        tuple((multispace0, char(','), multispace0)),
        variable_name,
    ))(input)?;
    let (input, _) = multispace0(input)?;
    let (input, is_assign) = alt((value(false, tag(":=")), value(true, char('='))))(input)?;
    let (input, _) = multispace0(input)?;

    let mut names = vec![first.to_string()];
    if let Some(second) = second {
        names.push(second.to_string());
    }
    Ok((input, (names, is_assign)))
}

fn command(input: &str) -> IResult<&str, Command> {
    let (input, first) = operand(input)?;
    let (input, rest) = many0(preceded(multispace1, operand))(input)?;
    let mut args = vec![first];
    args.extend(rest);
    Ok((input, Command { args }))
}

fn operand(input: &str) -> IResult<&str, Expr> {
    alt((
        value(Expr::Bool(true), keyword("true")),
        value(Expr::Bool(false), keyword("false")),
        value(Expr::Nil, keyword("nil")),
        map(alt((quoted_string, raw_string)), Expr::String),
        map(char_constant, Expr::Number),
        map(number, Expr::Number),
        map(field, Expr::Field),
        value(Expr::Dot, char('.')),
        variable,
        map(
            delimited(
                pair(char('('), multispace0),
                pipeline,
                pair(multispace0, char(')')),
            ),
            |p| Expr::Pipeline(Box::new(p)),
        ),
        map(ident, |name| Expr::Identifier(name.to_string())),
    ))(input)
}

fn field(input: &str) -> IResult<&str, Vec<String>> {
    many1(map(preceded(char('.'), ident), str::to_string))(input)
}

fn variable(input: &str) -> IResult<&str, Expr> {
    let (input, name) = variable_name(input)?;
    let (input, path) = many0(map(preceded(char('.'), ident), str::to_string))(input)?;
    Ok((
        input,
        Expr::Variable {
            name: name.to_string(),
            path,
        },
    ))
}

fn quoted_string(input: &str) -> IResult<&str, String> {
    let (mut rest, _) = char('"')(input)?;
    let mut out = String::new();
    loop {
        let mut chars = rest.chars();
        match chars.next() {
            None | Some('\n') => return Err(nom::Err::Failure(Error::new(rest, ErrorKind::Char))),
            Some('"') => return Ok((chars.as_str(), out)),
            Some('\\') => {
                let (after, c) = escape(chars.as_str())?;
                out.push(c);
                rest = after;
            }
            Some(c) => {
                out.push(c);
                rest = chars.as_str();
            }
        }
    }
}

fn raw_string(input: &str) -> IResult<&str, String> {
    map(
        delimited(char('`'), take_while(|c| c != '`'), char('`')),
        |s: &str| s.replace('\r', ""),
    )(input)
}

/// The part of an escape sequence after the backslash.
fn escape(input: &str) -> IResult<&str, char> {
    alt((
        value('\n', char('n')),
        value('\t', char('t')),
        value('\r', char('r')),
        value('\u{07}', char('a')),
        value('\u{08}', char('b')),
        value('\u{0C}', char('f')),
        value('\u{0B}', char('v')),
        value('\\', char('\\')),
        value('"', char('"')),
        value('\'', char('\'')),
        preceded(char('x'), hex_char(2)),
        preceded(char('u'), hex_char(4)),
        preceded(char('U'), hex_char(8)),
        map_opt(take_while_m_n(3, 3, |c: char| ('0'..='7').contains(&c)), |s: &str| {
            u32::from_str_radix(s, 8).ok().and_then(char::from_u32)
        }),
    ))(input)
}

fn hex_char<'a>(digits: usize) -> impl FnMut(&'a str) -> IResult<&'a str, char> {
    map_opt(
        take_while_m_n(digits, digits, |c: char| c.is_ascii_hexdigit()),
        |s: &str| u32::from_str_radix(s, 16).ok().and_then(char::from_u32),
    )
}

/// `'a'`, evaluated as its code point.
fn char_constant(input: &str) -> IResult<&str, Number> {
    let (rest, c) = delimited(
        char('\''),
        alt((preceded(char('\\'), escape), none_of("\\'\n"))),
        char('\''),
    )(input)?;
    let text = &input[..input.len() - rest.len()];
    Ok((
        rest,
        Number {
            text: text.to_string(),
            value: NumberValue::Int(c as i64),
        },
    ))
}

fn digits(input: &str) -> IResult<&str, &str> {
    recognize(pair(digit1, take_while(|c: char| c.is_ascii_digit() || c == '_')))(input)
}

fn number(input: &str) -> IResult<&str, Number> {
    let radix_int = recognize(tuple((
        char('0'),
        one_of("xXoObB"),
        take_while(|c: char| c.is_ascii_hexdigit() || c == '_'),
    )));
    let decimal = recognize(pair(
        alt((
            recognize(pair(digits, opt(pair(char('.'), digit0)))),
            recognize(pair(char('.'), digit1)),
        )),
        opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    ));
    let (rest, text) = terminated(
        recognize(pair(opt(one_of("+-")), alt((radix_int, decimal)))),
        not(satisfy(is_ident_char)),
    )(input)?;

    match number_value(text) {
        Some(value) => Ok((
            rest,
            Number {
                text: text.to_string(),
                value,
            },
        )),
        None => Err(nom::Err::Failure(Error::new(input, ErrorKind::Digit))),
    }
}

/// Evaluate a number literal: signed int first, then unsigned, then float.
pub(super) fn number_value(text: &str) -> Option<NumberValue> {
    let clean: String = text.chars().filter(|&c| c != '_').collect();
    let (negative, body) = match clean.as_bytes().first() {
        Some(b'-') => (true, &clean[1..]),
        Some(b'+') => (false, &clean[1..]),
        _ => (false, clean.as_str()),
    };

    let radix = match body.get(..2) {
        Some("0x") | Some("0X") => Some((16, &body[2..])),
        Some("0o") | Some("0O") => Some((8, &body[2..])),
        Some("0b") | Some("0B") => Some((2, &body[2..])),
        _ if body.len() > 1
            && body.starts_with('0')
            && body.bytes().all(|b| b.is_ascii_digit()) =>
        {
            Some((8, &body[1..]))
        }
        _ => None,
    };

    let magnitude = match radix {
        Some((radix, digits)) => u128::from_str_radix(digits, radix).ok()?,
        None if body.contains(['.', 'e', 'E']) => {
            let f: f64 = body.parse().ok()?;
            let f = if negative { -f } else { f };
            if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
                return Some(NumberValue::Int(f as i64));
            }
            return Some(NumberValue::Float(f));
        }
        None => body.parse::<u128>().ok()?,
    };

    if negative {
        let signed = -(i128::try_from(magnitude).ok()?);
        i64::try_from(signed).ok().map(NumberValue::Int)
    } else if let Ok(i) = i64::try_from(magnitude) {
        Some(NumberValue::Int(i))
    } else {
        u64::try_from(magnitude).ok().map(NumberValue::UInt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(path: &[&str]) -> Expr {
        Expr::Field(path.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_number_values() {
        assert_eq!(number_value("42"), Some(NumberValue::Int(42)));
        assert_eq!(number_value("-7"), Some(NumberValue::Int(-7)));
        assert_eq!(number_value("0x1F"), Some(NumberValue::Int(31)));
        assert_eq!(number_value("0755"), Some(NumberValue::Int(493)));
        assert_eq!(number_value("1_000"), Some(NumberValue::Int(1000)));
        assert_eq!(number_value("1.5"), Some(NumberValue::Float(1.5)));
        assert_eq!(number_value("2.0"), Some(NumberValue::Int(2)));
        assert_eq!(number_value("1e3"), Some(NumberValue::Int(1000)));
        assert_eq!(
            number_value("18446744073709551615"),
            Some(NumberValue::UInt(u64::MAX))
        );
        assert_eq!(number_value("0x"), None);
    }

    #[test]
    fn test_pipeline_with_declaration() {
        let action = parse_action(" $i, $e := .Ids ").unwrap();
        let Action::Pipeline(p) = action else {
            panic!("expected pipeline, got {:?}", action);
        };
        assert_eq!(p.decl, vec!["$i".to_string(), "$e".to_string()]);
        assert!(!p.is_assign);
        assert_eq!(p.cmds.len(), 1);
        assert_eq!(p.cmds[0].args, vec![field(&["Ids"])]);
    }

    #[test]
    fn test_keywords_are_bounded() {
        assert_eq!(
            parse_action("iffy").unwrap(),
            Action::Pipeline(Pipeline {
                cmds: vec![Command {
                    args: vec![Expr::Identifier("iffy".into())]
                }],
                ..Default::default()
            })
        );
        assert!(matches!(
            parse_action("if .A").unwrap(),
            Action::Control(ControlKind::If, _)
        ));
    }

    #[test]
    fn test_else_chain() {
        let Action::Else(Some((kind, p))) = parse_action("else if $x").unwrap() else {
            panic!("expected chained else");
        };
        assert_eq!(kind, ControlKind::If);
        assert_eq!(
            p.cmds[0].args,
            vec![Expr::Variable {
                name: "$x".into(),
                path: vec![]
            }]
        );
        assert_eq!(parse_action("else").unwrap(), Action::Else(None));
    }

    #[test]
    fn test_string_escapes() {
        let Action::Pipeline(p) = parse_action(r#""a\tb\"c\u00e9""#).unwrap() else {
            panic!("expected pipeline");
        };
        assert_eq!(p.cmds[0].args, vec![Expr::String("a\tb\"cé".into())]);
    }

    #[test]
    fn test_char_constant() {
        let Action::Pipeline(p) = parse_action("'a'").unwrap() else {
            panic!("expected pipeline");
        };
        assert_eq!(
            p.cmds[0].args,
            vec![Expr::Number(Number {
                text: "'a'".into(),
                value: NumberValue::Int(97)
            })]
        );
    }

    #[test]
    fn test_chained_and_call() {
        let Action::Pipeline(p) = parse_action(".A | len").unwrap() else {
            panic!("expected pipeline");
        };
        assert_eq!(p.cmds.len(), 2);

        let Action::Pipeline(p) = parse_action("len .A").unwrap() else {
            panic!("expected pipeline");
        };
        assert_eq!(p.cmds[0].args.len(), 2);
    }

    #[test]
    fn test_error_offset() {
        let (offset, message) = parse_action(".A }").unwrap_err();
        assert_eq!(offset, 3);
        assert_eq!(message, "unexpected '}' in command");
    }
}
