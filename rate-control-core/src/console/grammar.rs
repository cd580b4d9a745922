#![allow(clippy::module_name_repetitions)]

//! Lexer and parser for the diagnostics console.
//!
//! `regal` turns a line into a bounded token buffer and `winnow` combinators
//! walk the tokens into a [`Command`]. Nothing here allocates.

use super::catalog::{self, CommandTag, FormatSpec, FormatTag, ParamKey};
use core::fmt;
use core::ops::Range;

use heapless::Vec as HeaplessVec;
use regal::IncrementalError;
use regal::TokenCache;
use regal_macros::RegalLexer;
#[allow(deprecated)]
use winnow::error::ErrorKind;
use winnow::error::{ErrMode, ParserError};
use winnow::prelude::*;
use winnow::stream::Stream;

use crate::arena::StationHandle;

/// Maximum number of tokens produced per console line.
pub const MAX_TOKENS: usize = 24;
const MAX_CACHE_RECORDS: usize = MAX_TOKENS * 2;
const STATION_PREFIX: &str = "sta";

/// Lexical token kinds recognized by the console grammar.
#[derive(RegalLexer, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TokenKind {
    /// Unsuffixed integer literal.
    #[regex(r"[0-9]+")]
    Integer,
    /// Keyword, parameter key or station name.
    #[regex(r"[A-Za-z][A-Za-z0-9]*")]
    Ident,
    /// Separates a parameter key from its value.
    #[token("=")]
    Equals,
    #[regex(r"[ \t]+", skip)]
    Whitespace,
    /// End-of-line token (`\r`, `\n`, or `\r\n`).
    #[token("\r\n")]
    #[token("\n")]
    #[token("\r")]
    Eol,
    /// Anything else.
    #[default]
    #[regex(r".", priority = 1024)]
    Error,
}

/// Token with its byte span in the source line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub lexeme: &'a str,
    pub span: Range<usize>,
}

pub type TokenBuffer<'a> = HeaplessVec<Token<'a>, MAX_TOKENS>;

/// Lexer errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LexError {
    /// The line produced more tokens than the buffer holds.
    TooManyTokens { processed: usize },
    /// Underlying lexer reported an unrecoverable error.
    Engine,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexError::TooManyTokens { processed } => {
                write!(f, "line too long after {processed} tokens")
            }
            LexError::Engine => f.write_str("lexer engine error"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GrammarErrorKind<'a> {
    UnexpectedToken {
        expected: &'static str,
        found: Option<TokenKind>,
        span: Range<usize>,
    },
    UnexpectedEnd {
        expected: &'static str,
    },
    InvalidInteger {
        span: Range<usize>,
    },
    InvalidToken {
        span: Range<usize>,
        lexeme: &'a str,
    },
    UnknownParameter {
        span: Range<usize>,
        lexeme: &'a str,
    },
    DuplicateParameter {
        key: &'static str,
    },
    MissingParameter {
        key: &'static str,
    },
    OutOfRange {
        key: &'static str,
        value: u8,
    },
}

impl fmt::Display for GrammarErrorKind<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrammarErrorKind::UnexpectedToken {
                expected,
                found,
                span,
            } => write!(f, "expected {expected}, found {found:?} at {span:?}"),
            GrammarErrorKind::UnexpectedEnd { expected } => {
                write!(f, "unexpected end of input, expected {expected}")
            }
            GrammarErrorKind::InvalidInteger { span } => {
                write!(f, "invalid integer literal at {span:?}")
            }
            GrammarErrorKind::InvalidToken { span, lexeme } => {
                write!(f, "unsupported token `{lexeme}` at {span:?}")
            }
            GrammarErrorKind::UnknownParameter { span, lexeme } => {
                write!(f, "unknown parameter `{lexeme}` at {span:?}")
            }
            GrammarErrorKind::DuplicateParameter { key } => write!(f, "`{key}` given twice"),
            GrammarErrorKind::MissingParameter { key } => write!(f, "missing `{key}=`"),
            GrammarErrorKind::OutOfRange { key, value } => {
                write!(f, "{key}={value} is out of range")
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrammarError<'a> {
    pub kind: GrammarErrorKind<'a>,
}

impl fmt::Display for GrammarError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

impl<'a> GrammarError<'a> {
    const fn new(kind: GrammarErrorKind<'a>) -> Self {
        GrammarError { kind }
    }

    fn unexpected(expected: &'static str, token: Option<&Token<'a>>) -> Self {
        Self::new(match token {
            Some(tok) => GrammarErrorKind::UnexpectedToken {
                expected,
                found: Some(tok.kind),
                span: tok.span.clone(),
            },
            None => GrammarErrorKind::UnexpectedEnd { expected },
        })
    }

    fn invalid_integer(token: &Token<'a>) -> Self {
        Self::new(GrammarErrorKind::InvalidInteger {
            span: token.span.clone(),
        })
    }

    fn invalid_token(token: &Token<'a>) -> Self {
        Self::new(GrammarErrorKind::InvalidToken {
            span: token.span.clone(),
            lexeme: token.lexeme,
        })
    }

    fn unknown_parameter(token: &Token<'a>) -> Self {
        Self::new(GrammarErrorKind::UnknownParameter {
            span: token.span.clone(),
            lexeme: token.lexeme,
        })
    }
}

type Input<'src, 'slice> = &'slice [Token<'src>];

#[allow(deprecated)]
impl<'src, 'slice> ParserError<Input<'src, 'slice>> for GrammarError<'src>
where
    'src: 'slice,
{
    fn from_error_kind(input: &Input<'src, 'slice>, _kind: ErrorKind) -> Self {
        GrammarError::unexpected("token", input.first())
    }

    fn append(
        self,
        _input: &Input<'src, 'slice>,
        _token_start: &<Input<'src, 'slice> as Stream>::Checkpoint,
        _kind: ErrorKind,
    ) -> Self {
        self
    }

    fn or(self, other: Self) -> Self {
        other
    }
}

/// Combined lex/parse error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseError<'a> {
    Lex(LexError),
    Grammar(GrammarError<'a>),
}

impl fmt::Display for ParseError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Lex(err) => err.fmt(f),
            ParseError::Grammar(err) => err.fmt(f),
        }
    }
}

/// Structured commands produced by the parser.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Show,
    Stats(StationHandle),
    Fixed(FixedCommand),
    Auto(StationHandle),
    Help(HelpCommand<'a>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedCommand {
    pub station: StationHandle,
    pub request: FixedRequest,
}

/// Rate requested by `fixed`, before it is checked against the station.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedRequest {
    pub format: FormatTag,
    /// Legacy rate index or MCS.
    pub rate: u8,
    pub nss: u8,
    pub bandwidth_mhz: u16,
    pub short_gi: bool,
    pub long_preamble: bool,
}

impl FixedRequest {
    const fn defaults(format: FormatTag) -> Self {
        Self {
            format,
            rate: 0,
            nss: 0,
            bandwidth_mhz: 20,
            short_gi: false,
            long_preamble: true,
        }
    }

    fn apply(&mut self, key: ParamKey, value: u8) {
        match key {
            ParamKey::Rate | ParamKey::Mcs => self.rate = value,
            ParamKey::Nss => self.nss = value,
            ParamKey::Bandwidth => self.bandwidth_mhz = u16::from(value),
            ParamKey::ShortGi => self.short_gi = value != 0,
            ParamKey::Long => self.long_preamble = value != 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HelpCommand<'a> {
    pub topic: Option<&'a str>,
}

pub(crate) fn parse_tokens_partial<'src, 'slice>(
    tokens: &'slice [Token<'src>],
) -> Result<(Command<'src>, &'slice [Token<'src>]), GrammarError<'src>>
where
    'src: 'slice,
{
    let mut input = tokens;
    match command().parse_next(&mut input) {
        Ok(cmd) => Ok((cmd, input)),
        Err(ErrMode::Backtrack(err) | ErrMode::Cut(err)) => Err(err),
        Err(ErrMode::Incomplete(_)) => Err(GrammarError::unexpected("token", input.first())),
    }
}

/// Tokenizes one console line.
///
/// # Errors
///
/// Returns [`LexError`] when the line does not fit the token buffer.
pub fn lex(line: &str) -> Result<TokenBuffer<'_>, LexError> {
    let compiled = TokenKind::lexer();
    let mut cache: TokenCache<TokenKind, MAX_CACHE_RECORDS> = TokenCache::new();
    let partial = cache
        .rebuild(compiled, line)
        .map_err(map_incremental_error)?;
    let mut buffer = TokenBuffer::new();

    let pending = partial
        .filter(|partial| !partial.fragment.is_empty())
        .map(|partial| (partial.start, partial.fragment));
    let records = cache
        .tokens()
        .into_iter()
        .filter(|record| !record.skipped)
        .map(|record| (record.token, record.start..record.end));
    let trailing = pending.map(|(start, fragment)| (TokenKind::Error, start..start + fragment.len()));

    for (kind, span) in records.chain(trailing) {
        let lexeme = &line[span.clone()];
        if buffer.push(Token { kind, lexeme, span }).is_err() {
            return Err(LexError::TooManyTokens {
                processed: buffer.len() + 1,
            });
        }
    }

    Ok(buffer)
}

fn map_incremental_error(error: IncrementalError) -> LexError {
    match error {
        IncrementalError::TokenOverflow => LexError::TooManyTokens {
            processed: MAX_TOKENS,
        },
        _ => LexError::Engine,
    }
}

/// Parses one console line.
///
/// # Errors
///
/// Returns [`ParseError`] describing the first problem in the line.
pub fn parse(line: &str) -> Result<Command<'_>, ParseError<'_>> {
    let tokens = lex(line).map_err(ParseError::Lex)?;

    if let Some(token) = tokens.iter().find(|token| token.kind == TokenKind::Error) {
        return Err(ParseError::Grammar(GrammarError::invalid_token(token)));
    }

    let (command, rest) = parse_tokens_partial(tokens.as_slice()).map_err(ParseError::Grammar)?;

    if let Some(token) = rest.iter().find(|token| token.kind != TokenKind::Eol) {
        return Err(ParseError::Grammar(GrammarError::unexpected(
            "end of command",
            Some(token),
        )));
    }

    Ok(command)
}

fn command<'src, 'slice>() -> impl Parser<Input<'src, 'slice>, Command<'src>, GrammarError<'src>>
where
    'src: 'slice,
{
    move |input: &mut Input<'src, 'slice>| {
        let snapshot = *input;
        let keyword = expect_kind(TokenKind::Ident, "command keyword").parse_next(input)?;

        let Some(spec) = catalog::find(keyword.lexeme) else {
            *input = snapshot;
            return Err(ErrMode::Backtrack(GrammarError::unexpected(
                "command keyword",
                Some(&keyword),
            )));
        };

        match spec.tag {
            CommandTag::Show => Ok(Command::Show),
            CommandTag::Stats => Ok(Command::Stats(parse_station(input)?)),
            CommandTag::Auto => Ok(Command::Auto(parse_station(input)?)),
            CommandTag::Fixed => {
                let station = parse_station(input)?;
                let request = parse_fixed_request(input)?;
                Ok(Command::Fixed(FixedCommand { station, request }))
            }
            CommandTag::Help => Ok(Command::Help(HelpCommand {
                topic: parse_topic(input),
            })),
        }
    }
}

/// Accepts `3` or `sta3`.
fn parse_station<'src>(input: &mut Input<'src, '_>) -> Result<StationHandle, ErrMode<GrammarError<'src>>> {
    match input.split_first() {
        Some((token, rest)) if token.kind == TokenKind::Integer => {
            let index = parse_index(token, token.lexeme).map_err(ErrMode::Cut)?;
            *input = rest;
            Ok(StationHandle::from_index(index))
        }
        Some((token, rest))
            if token.kind == TokenKind::Ident
                && token
                    .lexeme
                    .get(..STATION_PREFIX.len())
                    .is_some_and(|prefix| prefix.eq_ignore_ascii_case(STATION_PREFIX)) =>
        {
            let digits = &token.lexeme[STATION_PREFIX.len()..];
            let index = parse_index(token, digits).map_err(ErrMode::Cut)?;
            *input = rest;
            Ok(StationHandle::from_index(index))
        }
        other => Err(ErrMode::Backtrack(GrammarError::unexpected(
            "station",
            other.map(|(token, _)| token),
        ))),
    }
}

fn parse_fixed_request<'src>(
    input: &mut Input<'src, '_>,
) -> Result<FixedRequest, ErrMode<GrammarError<'src>>> {
    let format_token = expect_kind(TokenKind::Ident, "legacy, ht or vht").parse_next(input)?;
    let format = catalog::find_format(format_token.lexeme).ok_or_else(|| {
        ErrMode::Cut(GrammarError::unexpected("legacy, ht or vht", Some(&format_token)))
    })?;

    let mut request = FixedRequest::defaults(format.tag);
    let mut seen: HeaplessVec<ParamKey, 8> = HeaplessVec::new();

    while let Some((token, _)) = input.split_first() {
        if token.kind != TokenKind::Ident {
            break;
        }
        let (key, value) = parse_assignment(input, format)?;
        if seen.contains(&key.tag) {
            return Err(ErrMode::Cut(GrammarError::new(
                GrammarErrorKind::DuplicateParameter { key: key.key },
            )));
        }
        let _ = seen.push(key.tag);
        request.apply(key.tag, value);
    }

    if !seen.contains(&format.required) {
        let key = format
            .params
            .iter()
            .find(|param| param.tag == format.required)
            .map_or("rate", |param| param.key);
        return Err(ErrMode::Cut(GrammarError::new(
            GrammarErrorKind::MissingParameter { key },
        )));
    }

    Ok(request)
}

fn parse_assignment<'src>(
    input: &mut Input<'src, '_>,
    format: &FormatSpec,
) -> Result<(&'static catalog::ParamSpec, u8), ErrMode<GrammarError<'src>>> {
    let key_token = expect_kind(TokenKind::Ident, "parameter").parse_next(input)?;
    let spec = catalog::find_param(format, key_token.lexeme)
        .ok_or_else(|| ErrMode::Cut(GrammarError::unknown_parameter(&key_token)))?;
    let _ = expect_kind(TokenKind::Equals, "=").parse_next(input)?;
    let value_token = expect_kind(TokenKind::Integer, "integer").parse_next(input)?;
    let value = parse_integer(&value_token).map_err(ErrMode::Cut)?;

    if !spec.accepts(value) {
        return Err(ErrMode::Cut(GrammarError::new(GrammarErrorKind::OutOfRange {
            key: spec.key,
            value,
        })));
    }
    Ok((spec, value))
}

fn parse_topic<'src>(input: &mut Input<'src, '_>) -> Option<&'src str> {
    match input.split_first() {
        Some((token, rest)) if token.kind == TokenKind::Ident => {
            *input = rest;
            Some(token.lexeme)
        }
        _ => None,
    }
}

fn expect_kind<'src, 'slice>(
    kind: TokenKind,
    label: &'static str,
) -> impl Parser<Input<'src, 'slice>, Token<'src>, GrammarError<'src>>
where
    'src: 'slice,
{
    move |input: &mut Input<'src, 'slice>| match input.split_first() {
        Some((token, rest)) if token.kind == kind => {
            *input = rest;
            Ok(token.clone())
        }
        Some((token, _)) => Err(ErrMode::Backtrack(GrammarError::unexpected(
            label,
            Some(token),
        ))),
        None => Err(ErrMode::Backtrack(GrammarError::unexpected(label, None))),
    }
}

fn parse_integer<'a>(token: &Token<'a>) -> Result<u8, GrammarError<'a>> {
    token
        .lexeme
        .parse::<u8>()
        .map_err(|_| GrammarError::invalid_integer(token))
}

fn parse_index<'a>(token: &Token<'a>, digits: &str) -> Result<usize, GrammarError<'a>> {
    digits
        .parse::<usize>()
        .map_err(|_| GrammarError::invalid_integer(token))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(input: &str) -> Command<'_> {
        parse(input).expect("command should parse")
    }

    fn grammar_error(input: &str) -> GrammarErrorKind<'_> {
        match parse(input) {
            Err(ParseError::Grammar(err)) => err.kind,
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn parses_plain_commands() {
        assert_eq!(parse_ok("show"), Command::Show);
        assert_eq!(parse_ok("show\r\n"), Command::Show);
        assert_eq!(
            parse_ok("stats 2"),
            Command::Stats(StationHandle::from_index(2))
        );
        assert_eq!(
            parse_ok("AUTO sta1"),
            Command::Auto(StationHandle::from_index(1))
        );
    }

    #[test]
    fn parses_help_topic() {
        assert_eq!(parse_ok("help"), Command::Help(HelpCommand { topic: None }));
        assert_eq!(
            parse_ok("help fixed"),
            Command::Help(HelpCommand {
                topic: Some("fixed"),
            })
        );
    }

    #[test]
    fn parses_fixed_legacy_with_defaults() {
        match parse_ok("fixed 0 legacy rate=3") {
            Command::Fixed(FixedCommand { station, request }) => {
                assert_eq!(station.index(), 0);
                assert_eq!(request.format, FormatTag::Legacy);
                assert_eq!(request.rate, 3);
                assert!(request.long_preamble);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_fixed_vht_parameters_in_any_order() {
        match parse_ok("fixed sta4 vht sgi=1 bw=80 mcs=9 nss=1") {
            Command::Fixed(FixedCommand { request, .. }) => {
                assert_eq!(request.format, FormatTag::Vht);
                assert_eq!(
                    (request.rate, request.nss, request.bandwidth_mhz, request.short_gi),
                    (9, 1, 80, true)
                );
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_fixed_parameters() {
        assert_eq!(
            grammar_error("fixed 0 ht mcs=8"),
            GrammarErrorKind::OutOfRange {
                key: "mcs",
                value: 8
            }
        );
        assert_eq!(
            grammar_error("fixed 0 ht nss=1"),
            GrammarErrorKind::MissingParameter { key: "mcs" }
        );
        assert_eq!(
            grammar_error("fixed 0 ht mcs=1 mcs=2"),
            GrammarErrorKind::DuplicateParameter { key: "mcs" }
        );
        assert!(matches!(
            grammar_error("fixed 0 legacy mcs=1"),
            GrammarErrorKind::UnknownParameter { lexeme: "mcs", .. }
        ));
        assert!(matches!(
            grammar_error("fixed 0 he mcs=1"),
            GrammarErrorKind::UnexpectedToken { .. }
        ));
        assert!(matches!(
            grammar_error("fixed 0 ht mcs=300"),
            GrammarErrorKind::InvalidInteger { .. }
        ));
    }

    #[test]
    fn rejects_missing_station_and_trailing_input() {
        assert_eq!(
            grammar_error("stats"),
            GrammarErrorKind::UnexpectedEnd {
                expected: "station"
            }
        );
        assert!(matches!(
            grammar_error("show 1"),
            GrammarErrorKind::UnexpectedToken {
                expected: "end of command",
                ..
            }
        ));
        assert!(matches!(
            grammar_error("reboot now"),
            GrammarErrorKind::UnexpectedToken { .. }
        ));
    }

    #[test]
    fn rejects_invalid_token() {
        assert!(matches!(
            grammar_error("stats 1$"),
            GrammarErrorKind::InvalidToken { lexeme: "$", .. }
        ));
    }

    #[test]
    fn lexer_splits_assignments() {
        let tokens = lex("fixed 1 ht mcs=7").expect("lexing should succeed");
        let kinds: HeaplessVec<TokenKind, 8> = tokens.iter().map(|token| token.kind).collect();
        assert_eq!(
            kinds.as_slice(),
            &[
                TokenKind::Ident,
                TokenKind::Integer,
                TokenKind::Ident,
                TokenKind::Ident,
                TokenKind::Equals,
                TokenKind::Integer,
            ]
        );
    }
}
