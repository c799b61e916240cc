//! The prefix-notation search grammar.
//!
//! Criteria strings are checked here before they are sent to the store, and then forwarded
//! verbatim: the store does the actual matching. [`GRAMMAR`] is the reference handed to
//! callers (an agent, usually) so that they can write queries that mean what they intend.
//!
//! The disambiguation rules, all of which [`parse`] encodes in the [`SearchKey`] it returns:
//!
//! - keys written next to each other are ANDed: `SEEN UNANSWERED FLAGGED`;
//! - `NOT` negates exactly one key, which may be a parenthesized group:
//!   `NOT (SEEN UNANSWERED)` is `NOT (SEEN AND UNANSWERED)`;
//! - `OR` takes exactly two keys. Wider disjunctions nest to the right, `OR a OR b c`, and keys
//!   following a complete `OR` are ANDed with it: `OR a b c` is `(a OR b) AND c`;
//! - parentheses only group keys into one.

use chrono::NaiveDate;
use std::fmt;
use thiserror::Error;

use crate::parse::{self, SequenceSet, Token};
use crate::types::MessageUid;
use crate::utils::iter_join;

/// Reference text for the search grammar, suitable for a tool description.
pub const GRAMMAR: &str = r#"Search criteria use IMAP SEARCH syntax, in prefix (Polish) notation.

Combining keys:
  a b c           all of a, b and c (implicit AND)
  NOT k           k does not match; k may be a group: NOT (SEEN FLAGGED)
  OR k1 k2        k1 or k2; exactly two operands
  OR a OR b c     three-way OR: nest to the right
  OR a b c        (a OR b) AND c
  ( ... )         group several keys into one

Flag keys (no argument):
  ALL ANSWERED DELETED DRAFT FLAGGED NEW OLD RECENT SEEN
  UNANSWERED UNDELETED UNDRAFT UNFLAGGED UNSEEN
  KEYWORD flag, UNKEYWORD flag

Field keys (substring match, quote values with spaces):
  FROM s, TO s, CC s, BCC s, SUBJECT s
  BODY s          text of the body
  TEXT s          header or body
  HEADER name s   any header field, e.g. HEADER Message-ID "<id@host>"
  Full-text indexing is not guaranteed; matching is plain substring matching as
  supported by the server, not ranked search.

Date keys (day granularity, date format 1-Jan-2024):
  ON d, SINCE d, BEFORE d                  internal (delivery) date
  SENTON d, SENTSINCE d, SENTBEFORE d      Date: header

Size keys (bytes):
  LARGER n, SMALLER n

UID keys:
  UID 1,4:7,12:*  UIDs are only valid in the folder they came from.

Examples:
  UNSEEN SINCE 1-Jan-2024
  OR FROM alice@example.com FROM bob@example.com
  NOT (SEEN FLAGGED)
  SUBJECT "quarterly report" LARGER 10000"#;

/// Why a criteria string was rejected.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{reason} (at {position})")]
pub struct CriteriaError {
    /// Token index (or byte offset, for lexing errors) where the problem was detected.
    pub position: usize,
    pub reason: String,
}

impl CriteriaError {
    fn new(position: usize, reason: impl Into<String>) -> Self {
        CriteriaError {
            position,
            reason: reason.into(),
        }
    }
}

/// The structural form of a search criteria string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SearchKey {
    /// Implicit conjunction of two or more keys.
    And(Vec<SearchKey>),
    Or(Box<SearchKey>, Box<SearchKey>),
    Not(Box<SearchKey>),

    All,
    Answered,
    Deleted,
    Draft,
    Flagged,
    New,
    Old,
    Recent,
    Seen,
    Unanswered,
    Undeleted,
    Undraft,
    Unflagged,
    Unseen,
    Keyword(String),
    Unkeyword(String),

    Bcc(String),
    Body(String),
    Cc(String),
    From(String),
    Subject(String),
    Text(String),
    To(String),
    Header(String, String),

    Before(NaiveDate),
    On(NaiveDate),
    Since(NaiveDate),
    SentBefore(NaiveDate),
    SentOn(NaiveDate),
    SentSince(NaiveDate),

    Larger(u64),
    Smaller(u64),

    Uid(SequenceSet),
    /// A bare sequence set, matching message sequence numbers.
    Sequence(SequenceSet),
}

/// A criteria string that passed validation, together with its structure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Criteria {
    raw: String,
    key: SearchKey,
}

impl Criteria {
    pub fn parse(raw: &str) -> Result<Criteria, CriteriaError> {
        let key = parse(raw)?;
        Ok(Criteria {
            raw: raw.trim_matches(' ').to_string(),
            key,
        })
    }

    /// The string to forward to the store, unchanged apart from surrounding spaces.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn key(&self) -> &SearchKey {
        &self.key
    }
}

impl fmt::Display for Criteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Check a criteria string against the grammar without keeping its structure.
pub fn validate(raw: &str) -> Result<(), CriteriaError> {
    parse(raw).map(|_| ())
}

/// Parse a criteria string into its structural form.
pub fn parse(raw: &str) -> Result<SearchKey, CriteriaError> {
    if let Some(offset) = raw.find(|c: char| c == '\r' || c == '\n') {
        return Err(CriteriaError::new(offset, "line breaks are not allowed"));
    }
    let tokens = parse::tokenize(raw).map_err(|offset| match raw[offset..].chars().next() {
        Some('"') => CriteriaError::new(offset, "unterminated quoted string"),
        _ => CriteriaError::new(offset, "unexpected character"),
    })?;
    if tokens.is_empty() {
        return Err(CriteriaError::new(0, "empty criteria"));
    }

    let mut parser = Parser { tokens, pos: 0 };
    let keys = parser.key_list()?;
    if parser.pos < parser.tokens.len() {
        return Err(CriteriaError::new(parser.pos, "unbalanced ')'"));
    }
    Ok(conjunction(keys))
}

/// Build the `UID FETCH` set for a list of UIDs, rejecting anything that is not a non-zero
/// decimal number.
pub fn uid_set(uids: &[MessageUid]) -> Result<String, CriteriaError> {
    for (i, uid) in uids.iter().enumerate() {
        let s = uid.as_str();
        let numeric = !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
        if !numeric || s.parse::<u32>().map_or(true, |n| n == 0) {
            return Err(CriteriaError::new(i, format!("invalid UID {:?}", s)));
        }
    }
    Ok(iter_join(uids, ","))
}

fn conjunction(mut keys: Vec<SearchKey>) -> SearchKey {
    if keys.len() == 1 {
        keys.remove(0)
    } else {
        SearchKey::And(keys)
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    /// Keys up to the end of input or an unconsumed `)`.
    fn key_list(&mut self) -> Result<Vec<SearchKey>, CriteriaError> {
        let mut keys = Vec::new();
        while let Some(token) = self.tokens.get(self.pos) {
            if *token == Token::Close {
                break;
            }
            keys.push(self.key()?);
        }
        Ok(keys)
    }

    fn key(&mut self) -> Result<SearchKey, CriteriaError> {
        let at = self.pos;
        let token = match self.tokens.get(at) {
            Some(token) => token.clone(),
            None => return Err(CriteriaError::new(at, "missing search key")),
        };
        self.pos += 1;

        let word = match token {
            Token::Open => {
                let keys = self.key_list()?;
                if self.tokens.get(self.pos) != Some(&Token::Close) {
                    return Err(CriteriaError::new(at, "unbalanced '('"));
                }
                self.pos += 1;
                if keys.is_empty() {
                    return Err(CriteriaError::new(at, "empty group"));
                }
                return Ok(conjunction(keys));
            }
            Token::Close => return Err(CriteriaError::new(at, "missing search key")),
            Token::Quoted(s) => {
                return Err(CriteriaError::new(at, format!("unexpected string {:?}", s)))
            }
            Token::Atom(word) => word,
        };

        let key = match word.to_ascii_uppercase().as_str() {
            "NOT" => SearchKey::Not(Box::new(self.operand("NOT")?)),
            "OR" => {
                let left = self.operand("OR")?;
                let right = self.operand("OR")?;
                SearchKey::Or(Box::new(left), Box::new(right))
            }

            "ALL" => SearchKey::All,
            "ANSWERED" => SearchKey::Answered,
            "DELETED" => SearchKey::Deleted,
            "DRAFT" => SearchKey::Draft,
            "FLAGGED" => SearchKey::Flagged,
            "NEW" => SearchKey::New,
            "OLD" => SearchKey::Old,
            "RECENT" => SearchKey::Recent,
            "SEEN" => SearchKey::Seen,
            "UNANSWERED" => SearchKey::Unanswered,
            "UNDELETED" => SearchKey::Undeleted,
            "UNDRAFT" => SearchKey::Undraft,
            "UNFLAGGED" => SearchKey::Unflagged,
            "UNSEEN" => SearchKey::Unseen,
            "KEYWORD" => SearchKey::Keyword(self.atom_argument("KEYWORD")?),
            "UNKEYWORD" => SearchKey::Unkeyword(self.atom_argument("UNKEYWORD")?),

            "BCC" => SearchKey::Bcc(self.argument("BCC")?),
            "BODY" => SearchKey::Body(self.argument("BODY")?),
            "CC" => SearchKey::Cc(self.argument("CC")?),
            "FROM" => SearchKey::From(self.argument("FROM")?),
            "SUBJECT" => SearchKey::Subject(self.argument("SUBJECT")?),
            "TEXT" => SearchKey::Text(self.argument("TEXT")?),
            "TO" => SearchKey::To(self.argument("TO")?),
            "HEADER" => {
                let field = self.argument("HEADER")?;
                let value = self.argument("HEADER")?;
                SearchKey::Header(field, value)
            }

            "BEFORE" => SearchKey::Before(self.date("BEFORE")?),
            "ON" => SearchKey::On(self.date("ON")?),
            "SINCE" => SearchKey::Since(self.date("SINCE")?),
            "SENTBEFORE" => SearchKey::SentBefore(self.date("SENTBEFORE")?),
            "SENTON" => SearchKey::SentOn(self.date("SENTON")?),
            "SENTSINCE" => SearchKey::SentSince(self.date("SENTSINCE")?),

            "LARGER" => SearchKey::Larger(self.size("LARGER")?),
            "SMALLER" => SearchKey::Smaller(self.size("SMALLER")?),

            "UID" => {
                let arg = self.atom_argument("UID")?;
                let set = parse::sequence_set(&arg).ok_or_else(|| {
                    CriteriaError::new(self.pos - 1, format!("invalid UID set {:?}", arg))
                })?;
                SearchKey::Uid(set)
            }

            _ => match parse::sequence_set(&word) {
                Some(set) => SearchKey::Sequence(set),
                None => {
                    return Err(CriteriaError::new(
                        at,
                        format!("unknown search key {:?}", word),
                    ))
                }
            },
        };
        Ok(key)
    }

    fn operand(&mut self, operator: &str) -> Result<SearchKey, CriteriaError> {
        match self.tokens.get(self.pos) {
            None | Some(Token::Close) => Err(CriteriaError::new(
                self.pos,
                format!("{} is missing an operand", operator),
            )),
            Some(_) => self.key(),
        }
    }

    /// An atom or quoted string argument.
    fn argument(&mut self, keyword: &str) -> Result<String, CriteriaError> {
        let arg = match self.tokens.get(self.pos) {
            Some(Token::Atom(s)) | Some(Token::Quoted(s)) => s.clone(),
            _ => {
                return Err(CriteriaError::new(
                    self.pos,
                    format!("{} is missing an argument", keyword),
                ))
            }
        };
        self.pos += 1;
        Ok(arg)
    }

    fn atom_argument(&mut self, keyword: &str) -> Result<String, CriteriaError> {
        match self.tokens.get(self.pos) {
            Some(Token::Quoted(_)) => Err(CriteriaError::new(
                self.pos,
                format!("{} takes an unquoted argument", keyword),
            )),
            _ => self.argument(keyword),
        }
    }

    fn date(&mut self, keyword: &str) -> Result<NaiveDate, CriteriaError> {
        let arg = self.argument(keyword)?;
        NaiveDate::parse_from_str(&arg, "%d-%b-%Y").map_err(|_| {
            CriteriaError::new(
                self.pos - 1,
                format!("{} expects a date like 1-Jan-2024, got {:?}", keyword, arg),
            )
        })
    }

    fn size(&mut self, keyword: &str) -> Result<u64, CriteriaError> {
        let arg = self.atom_argument(keyword)?;
        arg.parse().map_err(|_| {
            CriteriaError::new(
                self.pos - 1,
                format!("{} expects a size in bytes, got {:?}", keyword, arg),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SearchKey::*;

    fn from(s: &str) -> SearchKey {
        From(s.to_string())
    }

    fn reason(raw: &str) -> String {
        parse(raw).unwrap_err().reason
    }

    #[test]
    fn adjacent_keys_are_anded() {
        assert_eq!(
            parse("SEEN UNANSWERED FLAGGED").unwrap(),
            And(vec![Seen, Unanswered, Flagged])
        );
        assert_eq!(parse("seen").unwrap(), Seen);
    }

    #[test]
    fn not_negates_one_key() {
        assert_eq!(
            parse("NOT SEEN FLAGGED").unwrap(),
            And(vec![Not(Box::new(Seen)), Flagged])
        );
        assert_eq!(
            parse("NOT (SEEN UNANSWERED)").unwrap(),
            Not(Box::new(And(vec![Seen, Unanswered])))
        );
    }

    #[test]
    fn or_takes_exactly_two_keys() {
        assert_eq!(
            parse("OR FROM a@x.org FROM b@x.org").unwrap(),
            Or(Box::new(from("a@x.org")), Box::new(from("b@x.org")))
        );
        assert_eq!(
            parse("OR SEEN FLAGGED DRAFT").unwrap(),
            And(vec![Or(Box::new(Seen), Box::new(Flagged)), Draft])
        );
        assert_eq!(
            parse("OR SEEN OR FLAGGED DRAFT").unwrap(),
            Or(
                Box::new(Seen),
                Box::new(Or(Box::new(Flagged), Box::new(Draft)))
            )
        );
    }

    #[test]
    fn groups_are_single_keys() {
        assert_eq!(
            parse("OR (SEEN FLAGGED) DRAFT").unwrap(),
            Or(Box::new(And(vec![Seen, Flagged])), Box::new(Draft))
        );
        assert_eq!(parse("((SEEN))").unwrap(), Seen);
    }

    #[test]
    fn parses_typed_arguments() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(parse("SINCE 15-Mar-2024").unwrap(), Since(date));
        assert_eq!(parse("sentbefore 15-mar-2024").unwrap(), SentBefore(date));
        assert_eq!(parse("LARGER 10000").unwrap(), Larger(10000));
        assert_eq!(
            parse("HEADER Message-ID \"<x@y>\"").unwrap(),
            Header("Message-ID".to_string(), "<x@y>".to_string())
        );
        assert_eq!(
            parse("SUBJECT \"quarterly report\"").unwrap(),
            Subject("quarterly report".to_string())
        );
        assert!(matches!(parse("UID 1,4:7").unwrap(), Uid(_)));
        assert!(matches!(parse("1:*").unwrap(), Sequence(_)));
    }

    #[test]
    fn rejects_unbalanced_parentheses() {
        assert_eq!(reason("(SEEN"), "unbalanced '('");
        assert_eq!(reason("SEEN)"), "unbalanced ')'");
        assert_eq!(reason("NOT (SEEN (FLAGGED)"), "unbalanced '('");
        assert_eq!(reason("()"), "empty group");
    }

    #[test]
    fn rejects_or_without_two_operands() {
        assert_eq!(reason("OR SEEN"), "OR is missing an operand");
        assert_eq!(reason("OR"), "OR is missing an operand");
        assert_eq!(reason("(OR SEEN) FLAGGED"), "OR is missing an operand");
    }

    #[test]
    fn rejects_missing_arguments() {
        assert_eq!(reason("NOT"), "NOT is missing an operand");
        assert_eq!(reason("FROM"), "FROM is missing an argument");
        assert_eq!(reason("(SUBJECT) SEEN"), "SUBJECT is missing an argument");
        assert_eq!(reason("HEADER Subject"), "HEADER is missing an argument");
        assert_eq!(reason("UID"), "UID is missing an argument");
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(reason("SINCE today").starts_with("SINCE expects a date"));
        assert!(reason("LARGER big").starts_with("LARGER expects a size"));
        assert!(reason("UID 0").starts_with("invalid UID set"));
        assert!(reason("SEEN FOO").starts_with("unknown search key"));
        assert!(reason("\"SEEN\"").starts_with("unexpected string"));
        assert_eq!(reason("   "), "empty criteria");
        assert_eq!(reason("SUBJECT \"open"), "unterminated quoted string");
    }

    #[test]
    fn rejects_line_breaks() {
        let smuggled = "SUBJECT \"x\r\n1 DELETE INBOX\r\n\"";
        let err = Criteria::parse(smuggled).unwrap_err();
        assert_eq!(err.position, 10);
        assert_eq!(err.reason, "line breaks are not allowed");
        assert!(validate("SEEN\nFLAGGED").is_err());
        assert!(validate("SEEN\r").is_err());
        assert_eq!(reason("SEEN\tFLAGGED"), "unexpected character");
    }

    #[test]
    fn forwards_criteria_verbatim() {
        let criteria = Criteria::parse("  OR seen (FLAGGED  DRAFT) ").unwrap();
        assert_eq!(criteria.as_str(), "OR seen (FLAGGED  DRAFT)");
        assert!(validate(criteria.as_str()).is_ok());
        assert_eq!(
            criteria.key(),
            &Or(
                Box::new(Seen),
                Box::new(And(vec![Flagged, Draft]))
            )
        );
    }

    #[test]
    fn builds_uid_sets() {
        let uids = vec![MessageUid::from(3), MessageUid::new("17")];
        assert_eq!(uid_set(&uids).unwrap(), "3,17");
        assert!(uid_set(&[MessageUid::new("0")]).is_err());
        assert!(uid_set(&[MessageUid::new("1:*")]).is_err());
        assert!(uid_set(&[MessageUid::new("")]).is_err());
        let mixed = [MessageUid::new("4"), MessageUid::new("x")];
        assert_eq!(uid_set(&mixed).unwrap_err().position, 1);
    }
}
