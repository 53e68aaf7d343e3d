use nom::{
    branch::alt,
    bytes::complete::{take_till, take_till1},
    character::complete::char,
    combinator::map,
    IResult,
};

use crate::label::Value;

use super::{INTEGER_REGEX, NON_FINITE_REGEX, REAL_REGEX};

/// Label items are separated by whitespace; the NUL padding at the end of a
/// label is treated the same way
pub const fn is_separator(c: char) -> bool {
    c.is_ascii_whitespace() || c == '\0'
}

pub fn skip_separators(input: &str) -> &str {
    input.trim_start_matches(is_separator)
}

pub fn item_name(input: &str) -> IResult<&str, &str> {
    take_till1(|c| c == '=' || is_separator(c))(input)
}

pub fn equals(input: &str) -> IResult<&str, char> {
    char('=')(input)
}

/// A single-quoted string, where `''` stands for one quote
pub fn quoted(input: &str) -> IResult<&str, String> {
    let (mut input, _) = char('\'')(input)?;
    let mut out = String::new();
    loop {
        let (rest, chunk) = take_till(|c| c == '\'')(input)?;
        out.push_str(chunk);
        let (rest, _) = char('\'')(rest)?;
        match char::<_, nom::error::Error<&str>>('\'')(rest) {
            Ok((rest, _)) => {
                out.push('\'');
                input = rest;
            }
            Err(_) => return Ok((rest, out)),
        }
    }
}

pub fn bare(input: &str) -> IResult<&str, &str> {
    take_till1(is_separator)(input)
}

fn bare_in_list(input: &str) -> IResult<&str, &str> {
    take_till1(|c| c == ',' || c == ')' || is_separator(c))(input)
}

fn list_element(input: &str) -> IResult<&str, Value> {
    alt((map(quoted, Value::String), map(bare_in_list, classify)))(input)
}

/// A parenthesized, comma separated list of scalars
pub fn array(input: &str) -> IResult<&str, Vec<Value>> {
    let (input, _) = char('(')(input)?;
    let mut input = skip_separators(input);
    let mut values = Vec::new();
    if let Ok((rest, _)) = char::<_, nom::error::Error<&str>>(')')(input) {
        return Ok((rest, values));
    }
    loop {
        let (rest, value) = list_element(input)?;
        values.push(value);
        let (rest, separator) = alt((char(','), char(')')))(skip_separators(rest))?;
        if separator == ')' {
            return Ok((rest, values));
        }
        input = skip_separators(rest);
    }
}

/// Any item value. The first character decides which form is expected so that
/// an unterminated string or list is reported as such rather than read as a
/// bare token.
pub fn value(input: &str) -> IResult<&str, Value> {
    match input.chars().next() {
        Some('\'') => map(quoted, Value::String)(input),
        Some('(') => map(array, Value::Array)(input),
        _ => map(bare, classify)(input),
    }
}

/// Types a bare token: integer literal, then decimal or non-finite real,
/// else string
pub fn classify(token: &str) -> Value {
    if INTEGER_REGEX.is_match(token) {
        if let Ok(i) = token.parse::<i64>() {
            return Value::Integer(i);
        }
    }
    if INTEGER_REGEX.is_match(token) || REAL_REGEX.is_match(token) {
        if let Ok(f) = token.replace(['d', 'D'], "e").parse::<f64>() {
            return Value::Real(f);
        }
    }
    if NON_FINITE_REGEX.is_match(token) {
        if let Ok(f) = token.parse::<f64>() {
            return Value::Real(f);
        }
    }
    Value::String(token.to_owned())
}
