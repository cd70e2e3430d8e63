/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! A small lexer for the textual forms used by this crate: format
//! names (`FRACTAL_Z:4@16`), dimension lists (`[8, -1, 5, 5]`) and
//! tiling overrides (`FLOAT16:16/16/16`).

use std::any::type_name;
use std::num::ParseIntError;
use std::str::FromStr;

/// Errors that can occur while parsing a string.
#[derive(Debug, thiserror::Error)]
pub enum ParserError {
    #[error("expected {expected}, found end of input")]
    UnexpectedEndOfInput { expected: &'static str },

    #[error("expected {expected}, found `{actual}`")]
    WrongToken {
        expected: &'static str,
        actual: String,
    },

    #[error("`{actual}` does not parse as {expected_type}")]
    WrongTokenType {
        expected_type: &'static str,
        actual: String,
    },

    #[error("`{token}` is not an integer: {error}")]
    NotAnInteger {
        token: String,
        #[source]
        error: ParseIntError,
    },
}

/// A cursor over the lexemes of a string. Each delimiter is a lexeme
/// of its own; the text between two delimiters, trimmed, is another.
pub struct Parser<'a> {
    rest: &'a str,
    delims: &'a [&'a str],
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str, delims: &'a [&'a str]) -> Self {
        Self {
            rest: input,
            delims,
        }
    }

    /// The next lexeme, without consuming it.
    pub fn peek(&self) -> Option<&'a str> {
        self.lex().map(|(token, _)| token)
    }

    pub fn peek_or_err(&self, expected: &'static str) -> Result<&'a str, ParserError> {
        self.peek()
            .ok_or(ParserError::UnexpectedEndOfInput { expected })
    }

    /// Consumes the next lexeme, which must be `expected`.
    pub fn expect(&mut self, expected: &'static str) -> Result<(), ParserError> {
        match self.peek_or_err(expected)? {
            token if token == expected => {
                self.next();
                Ok(())
            }
            token => Err(ParserError::WrongToken {
                expected,
                actual: token.to_string(),
            }),
        }
    }

    pub fn next_or_err(&mut self, expected: &'static str) -> Result<&'a str, ParserError> {
        self.next()
            .ok_or(ParserError::UnexpectedEndOfInput { expected })
    }

    /// Parses the next lexeme as a `T`. The lexeme is left in place
    /// when it does not parse.
    pub fn try_parse<T: FromStr>(&mut self) -> Result<T, ParserError> {
        let token = self.peek_or_err(type_name::<T>())?;
        let value = token.parse().map_err(|_| ParserError::WrongTokenType {
            expected_type: type_name::<T>(),
            actual: token.to_string(),
        })?;
        self.next();
        Ok(value)
    }

    pub fn next_i64(&mut self) -> Result<i64, ParserError> {
        let token = self.next_or_err("an integer")?;
        token.parse().map_err(|error| ParserError::NotAnInteger {
            token: token.to_string(),
            error,
        })
    }

    /// Fails unless every lexeme has been consumed.
    pub fn finish(&mut self, what: &'static str) -> Result<(), ParserError> {
        match self.next() {
            None => Ok(()),
            Some(token) => Err(ParserError::WrongToken {
                expected: what,
                actual: token.to_string(),
            }),
        }
    }

    /// Splits off the next lexeme, returning it with the remaining
    /// input.
    fn lex(&self) -> Option<(&'a str, &'a str)> {
        let input = self.rest.trim_start();
        if input.is_empty() {
            return None;
        }
        if let Some(delim) = self.delims.iter().find(|d| input.starts_with(**d)) {
            return Some((&input[..delim.len()], &input[delim.len()..]));
        }
        let end = self
            .delims
            .iter()
            .filter_map(|d| input.find(d))
            .min()
            .unwrap_or(input.len());
        Some((input[..end].trim_end(), &input[end..]))
    }
}

impl<'a> Iterator for Parser<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let (token, rest) = self.lex()?;
        self.rest = rest;
        Some(token)
    }
}

/// Parses a bracketed, comma separated list of signed dimensions,
/// e.g. `[8, -1, 5]`. `[]` is the scalar shape.
pub fn parse_dims(s: &str) -> Result<Vec<i64>, ParserError> {
    let mut parser = Parser::new(s, &["[", "]", ","]);
    parser.expect("[")?;
    let mut dims = Vec::new();
    if parser.peek() == Some("]") {
        parser.next();
    } else {
        loop {
            dims.push(parser.next_i64()?);
            match parser.next_or_err("`,` or `]`")? {
                "," => {}
                "]" => break,
                other => {
                    return Err(ParserError::WrongToken {
                        expected: "`,` or `]`",
                        actual: other.to_string(),
                    });
                }
            }
        }
    }
    parser.finish("end of input")?;
    Ok(dims)
}
