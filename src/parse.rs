//! Lexing for search criteria and sequence sets.

use nom::branch::alt;
use nom::bytes::complete::{escaped_transform, is_not, tag, take_while, take_while1};
use nom::character::complete::{char, one_of, u32 as decimal};
use nom::combinator::{all_consuming, map, opt, value, verify};
use nom::multi::{many0, separated_list1};
use nom::sequence::{delimited, preceded, separated_pair, terminated};
use nom::IResult;

/// A lexical token of a search criteria string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Token {
    Open,
    Close,
    /// A bare word: keyword, number, date, sequence set or unquoted argument.
    Atom(String),
    /// A double-quoted string, with `\"` and `\\` unescaped.
    Quoted(String),
}

fn is_atom_char(c: char) -> bool {
    !c.is_whitespace() && !c.is_control() && c != '(' && c != ')' && c != '"'
}

// Tokens are separated by SP only; CR and LF would end the command on the wire.
fn spaces(input: &str) -> IResult<&str, &str> {
    take_while(|c| c == ' ')(input)
}

fn atom(input: &str) -> IResult<&str, Token> {
    map(take_while1(is_atom_char), |s: &str| {
        Token::Atom(s.to_string())
    })(input)
}

fn quoted(input: &str) -> IResult<&str, Token> {
    map(
        delimited(
            char('"'),
            opt(escaped_transform(is_not("\\\"\r\n"), '\\', one_of("\\\""))),
            char('"'),
        ),
        |s: Option<String>| Token::Quoted(s.unwrap_or_default()),
    )(input)
}

fn token(input: &str) -> IResult<&str, Token> {
    preceded(
        spaces,
        alt((
            value(Token::Open, char('(')),
            value(Token::Close, char(')')),
            quoted,
            atom,
        )),
    )(input)
}

/// Split a criteria string into tokens. On failure returns the byte offset where lexing stopped.
pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>, usize> {
    match all_consuming(terminated(many0(token), spaces))(input) {
        Ok((_, tokens)) => Ok(tokens),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(input.len() - e.input.len()),
        Err(nom::Err::Incomplete(_)) => Err(input.len()),
    }
}

/// One end of a sequence range: a number or `*` (the largest number in use).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeqBound {
    Number(u32),
    Largest,
}

impl SeqBound {
    fn resolve(self, largest: u32) -> u32 {
        match self {
            SeqBound::Number(n) => n,
            SeqBound::Largest => largest,
        }
    }
}

/// A `sequence-set` from RFC 3501: comma-separated numbers and `a:b` ranges.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequenceSet(pub Vec<(SeqBound, SeqBound)>);

impl SequenceSet {
    /// Whether `n` is in the set, given the largest number currently in use.
    pub fn contains(&self, n: u32, largest: u32) -> bool {
        self.0.iter().any(|&(a, b)| {
            let (a, b) = (a.resolve(largest), b.resolve(largest));
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            lo <= n && n <= hi
        })
    }
}

fn seq_bound(input: &str) -> IResult<&str, SeqBound> {
    alt((
        value(SeqBound::Largest, tag("*")),
        map(verify(decimal, |n: &u32| *n > 0), SeqBound::Number),
    ))(input)
}

fn seq_range(input: &str) -> IResult<&str, (SeqBound, SeqBound)> {
    alt((
        separated_pair(seq_bound, char(':'), seq_bound),
        map(seq_bound, |b| (b, b)),
    ))(input)
}

/// Parse a complete sequence set such as `1,4:7,12:*`.
pub(crate) fn sequence_set(input: &str) -> Option<SequenceSet> {
    all_consuming(separated_list1(char(','), seq_range))(input)
        .ok()
        .map(|(_, ranges)| SequenceSet(ranges))
}
