//! Arithmetic expression evaluation engine for `#expr`.

// The operator grammar follows ExprParser.php in the MediaWiki
// ParserFunctions extension
// <https://github.com/wikimedia/mediawiki-extensions-ParserFunctions/>
// SPDX-License-Identifier: GPL-2.0-or-later

#![allow(clippy::too_many_lines)]

use arrayvec::ArrayVec;
use std::{borrow::Cow, num::ParseFloatError};

/// An expression evaluation error.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// Someone tried to do too much arithmetic at once.
    #[error("stack exhausted at {0}")]
    StackExhausted(usize),
    /// Encountered an unknown token.
    #[error("unknown token '{1}' at {0}")]
    UnknownToken(usize, Cow<'static, str>),
    /// Encountered a number where it shouldn’t’ve been.
    #[error("unexpected number {1} at {0}")]
    UnexpectedNumber(usize, f64),
    /// Encountered an operator where it shouldn’t’ve been.
    #[error("unexpected operator '{1}' at {0}")]
    UnexpectedOperator(usize, Cow<'static, str>),
    /// Encountered a close bracket where it shouldn’t’ve been.
    #[error("unexpected closing bracket at {0}")]
    UnexpectedCloseBracket(usize),
    /// Never encountered a close bracket where it should’ve been.
    #[error("unclosed bracket")]
    MissingCloseBracket,
    /// A required operand was missing.
    #[error("missing operand for '{0}'")]
    MissingOperand(Cow<'static, str>),
    /// Someone tried to do that thing you’re not supposed to do with numbers.
    #[error("division by zero in operator '{0}'")]
    DivisionByZero(Cow<'static, str>),
    /// A number that should have been a float turned out to not be a float.
    #[error("could not parse number at {0}: {1}")]
    ParseFloat(usize, ParseFloatError),
}

/// Maximum allowed number of in-flight operators or operands.
const MAX_STACK_SIZE: usize = 100;

/// Valid white space characters.
const WHITE_CLASS: &str = " \t\r\n";
/// Valid number characters.
const NUMBER_CLASS: &str = "0123456789.";

/// Operator tokens.
// Clippy: See [`names`] to learn which token corresponds to which input.
#[allow(clippy::missing_docs_in_private_items)]
#[derive(Clone, Copy, Eq, PartialEq)]
enum Token {
    Negative,
    Positive,
    Plus,
    Minus,
    Times,
    Divide,
    Mod,
    Pow,
    Open,
    And,
    Or,
    Not,
    Equality,
    Less,
    Greater,
    LessEq,
    GreaterEq,
    NotEq,
    Round,
    Exponent,
    Abs,
    Floor,
    Trunc,
    Ceil,
}

/// Returns the precedence of the given token.
const fn precedence(t: Token) -> i32 {
    match t {
        Token::Negative | Token::Positive | Token::Exponent => 10,
        Token::Not | Token::Abs | Token::Floor | Token::Trunc | Token::Ceil => 9,
        Token::Pow => 8,
        Token::Times | Token::Divide | Token::Mod => 7,
        Token::Plus | Token::Minus => 6,
        Token::Round => 5,
        Token::Equality
        | Token::Less
        | Token::Greater
        | Token::LessEq
        | Token::GreaterEq
        | Token::NotEq => 4,
        Token::And => 3,
        Token::Or => 2,
        Token::Open => -1,
    }
}

/// Returns the name of the given token.
const fn names(t: Token) -> Cow<'static, str> {
    Cow::Borrowed(match t {
        Token::Not => "not",
        Token::Times => "*",
        Token::Divide => "/",
        Token::Mod => "mod",
        Token::Positive | Token::Plus => "+",
        Token::Negative | Token::Minus => "-",
        Token::Round => "round",
        Token::Equality => "=",
        Token::Less => "<",
        Token::Greater => ">",
        Token::LessEq => "<=",
        Token::GreaterEq => ">=",
        Token::NotEq => "<>",
        Token::And => "and",
        Token::Or => "or",
        Token::Exponent => "e",
        Token::Abs => "abs",
        Token::Floor => "floor",
        Token::Trunc => "trunc",
        Token::Ceil => "ceil",
        Token::Pow => "^",
        Token::Open => "(",
    })
}

/// Returns a token corresponding to the given word, or `None` if the
/// token is not a known word.
fn words(input: &str) -> Option<Token> {
    Some(match input {
        "mod" => Token::Mod,
        "div" => Token::Divide,
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        "round" => Token::Round,
        "e" => Token::Exponent,
        "abs" => Token::Abs,
        "trunc" => Token::Trunc,
        "floor" => Token::Floor,
        "ceil" => Token::Ceil,
        _ => return None,
    })
}

/// A subexpression kind.
#[derive(PartialEq, Eq)]
enum Kind {
    /// An operand.
    Operand,
    /// An operator.
    Operator,
}

/// Evaluates a mathematical expression.
///
/// This is the standard shunting-yard infix evaluation, with the
/// MediaWiki quirks: `mod` is an integral remainder, `round` is a
/// binary infix operator, comparisons yield 0/1, and a number literal
/// keeps only its first decimal separator (`1.2.3` parses as `1.2`).
pub fn do_expression(expr: &str) -> Result<Option<f64>, Error> {
    let mut operands = ArrayVec::<f64, MAX_STACK_SIZE>::new_const();
    let mut operators = ArrayVec::<Token, MAX_STACK_SIZE>::new_const();

    // Expanded text may still carry entity forms of the operators
    let expr = expr
        .replace("&minus;", "-")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace('−', "-");

    let mut iter = expr.char_indices().peekable();
    let mut expecting = Kind::Operand;

    while let Some((pos, char)) = iter.next() {
        if operands.len() == MAX_STACK_SIZE || operators.len() == MAX_STACK_SIZE {
            return Err(Error::StackExhausted(pos));
        }

        let op;
        if WHITE_CLASS.contains(char) {
            while iter
                .next_if(|(_, char)| WHITE_CLASS.contains(*char))
                .is_some()
            {}
            continue;
        } else if NUMBER_CLASS.contains(char) {
            let mut sep_count = i32::from(char == '.');
            let mut end = pos;
            while let Some((pos, char)) = iter.next_if(|(_, char)| NUMBER_CLASS.contains(*char)) {
                if char == '.' {
                    sep_count += 1;
                }
                if sep_count < 2 {
                    end = pos;
                }
            }

            let number = expr[pos..=end]
                .parse::<f64>()
                .map_err(|err| Error::ParseFloat(pos, err))?;

            if expecting != Kind::Operand {
                return Err(Error::UnexpectedNumber(pos, number));
            }

            operands.push(number);
            expecting = Kind::Operator;
            continue;
        } else if char.is_ascii_alphabetic() {
            let mut end = pos;
            while let Some((pos, _)) = iter.next_if(|(_, char)| char.is_alphabetic()) {
                end = pos;
            }

            let word = &expr[pos..=end];
            if let Some(word_op) = words(&word.to_ascii_lowercase()) {
                op = word_op;
            } else {
                return Err(Error::UnknownToken(pos, word.to_string().into()));
            }

            match op {
                // `e` in operand position is the constant
                Token::Exponent => {
                    if expecting == Kind::Operand {
                        operands.push(1.0_f64.exp());
                        expecting = Kind::Operator;
                        continue;
                    }
                }
                // Unary word operator
                Token::Not | Token::Abs | Token::Floor | Token::Trunc | Token::Ceil => {
                    if expecting != Kind::Operand {
                        return Err(Error::UnexpectedOperator(pos, word.to_string().into()));
                    }
                    operators.push(op);
                    continue;
                }
                _ => {
                    // Binary word operator, fall through
                }
            }
        } else if char == '+' {
            if expecting == Kind::Operand {
                operators.push(Token::Positive);
                continue;
            }
            op = Token::Plus;
        } else if char == '-' {
            if expecting == Kind::Operand {
                operators.push(Token::Negative);
                continue;
            }
            op = Token::Minus;
        } else if char == '*' {
            // `**` is an alias for `^`
            if iter.next_if(|(_, char)| *char == '*').is_some() {
                op = Token::Pow;
            } else {
                op = Token::Times;
            }
        } else if char == '/' {
            op = Token::Divide;
        } else if char == '%' {
            op = Token::Mod;
        } else if char == '^' {
            op = Token::Pow;
        } else if char == '(' {
            if expecting == Kind::Operator {
                return Err(Error::UnexpectedOperator(pos, "(".into()));
            }
            operators.push(Token::Open);
            continue;
        } else if char == ')' {
            let mut last_op = operators.last().copied();
            while let Some(op) = last_op
                && op != Token::Open
            {
                apply(op, &mut operands)?;
                operators.pop();
                last_op = operators.last().copied();
            }
            if last_op.is_some() {
                operators.pop();
            } else {
                return Err(Error::UnexpectedCloseBracket(pos));
            }
            expecting = Kind::Operator;
            continue;
        } else if char == '=' {
            op = Token::Equality;
        } else if char == '<' {
            if iter.next_if(|(_, char)| *char == '=').is_some() {
                op = Token::LessEq;
            } else if iter.next_if(|(_, char)| *char == '>').is_some() {
                op = Token::NotEq;
            } else {
                op = Token::Less;
            }
        } else if char == '>' {
            if iter.next_if(|(_, char)| *char == '=').is_some() {
                op = Token::GreaterEq;
            } else {
                op = Token::Greater;
            }
        } else if char == '!' && iter.next_if(|(_, char)| *char == '=').is_some() {
            op = Token::NotEq;
        } else {
            return Err(Error::UnknownToken(pos, char.to_string().into()));
        }

        if expecting == Kind::Operand {
            return Err(Error::UnexpectedOperator(pos, names(op)));
        }

        // Shunting yard magic
        let mut last_op = operators.last().copied();
        while let Some(lop) = last_op
            && precedence(op) <= precedence(lop)
        {
            apply(lop, &mut operands)?;
            operators.pop();
            last_op = operators.last().copied();
        }
        operators.push(op);
        expecting = Kind::Operand;
    }

    while let Some(op) = operators.pop() {
        if op == Token::Open {
            return Err(Error::MissingCloseBracket);
        }
        apply(op, &mut operands)?;
    }

    assert!(
        operands.len() < 2,
        "'{expr}' evaluated to bad number of operands"
    );
    Ok(operands.pop())
}

/// Pops one operand for the operator `op`.
fn pop1(op: Token, stack: &mut ArrayVec<f64, MAX_STACK_SIZE>) -> Result<f64, Error> {
    stack.pop().ok_or_else(|| Error::MissingOperand(names(op)))
}

/// Pops a `(left, right)` operand pair for the operator `op`.
fn pop2(op: Token, stack: &mut ArrayVec<f64, MAX_STACK_SIZE>) -> Result<(f64, f64), Error> {
    if let (Some(right), Some(left)) = (stack.pop(), stack.pop()) {
        Ok((left, right))
    } else {
        Err(Error::MissingOperand(names(op)))
    }
}

/// Applies the operator `op` to the operand stack.
// Clippy: Truncating casts are how `mod` is defined; float equality
// is how 0/1 logic values compare.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::float_cmp,
    clippy::cast_sign_loss
)]
fn apply(op: Token, stack: &mut ArrayVec<f64, MAX_STACK_SIZE>) -> Result<(), Error> {
    let result = match op {
        Token::Negative => -pop1(op, stack)?,
        Token::Positive => pop1(op, stack)?,
        Token::Plus => {
            let (left, right) = pop2(op, stack)?;
            left + right
        }
        Token::Minus => {
            let (left, right) = pop2(op, stack)?;
            left - right
        }
        Token::Times => {
            let (left, right) = pop2(op, stack)?;
            left * right
        }
        Token::Divide => {
            let (left, right) = pop2(op, stack)?;
            if right == 0.0 {
                return Err(Error::DivisionByZero(names(op)));
            }
            left / right
        }
        Token::Mod => {
            let (left, right) = pop2(op, stack)?;
            if right == 0.0 {
                return Err(Error::DivisionByZero(names(op)));
            }
            ((left as i64) % (right as i64)) as f64
        }
        Token::Pow => {
            let (left, right) = pop2(op, stack)?;
            left.powf(right)
        }
        Token::And => {
            let (left, right) = pop2(op, stack)?;
            f64::from(left != 0.0 && right != 0.0)
        }
        Token::Or => {
            let (left, right) = pop2(op, stack)?;
            f64::from(left != 0.0 || right != 0.0)
        }
        Token::Not => f64::from(pop1(op, stack)? == 0.0),
        Token::Equality => {
            let (left, right) = pop2(op, stack)?;
            f64::from(left == right)
        }
        Token::Less => {
            let (left, right) = pop2(op, stack)?;
            f64::from(left < right)
        }
        Token::Greater => {
            let (left, right) = pop2(op, stack)?;
            f64::from(left > right)
        }
        Token::LessEq => {
            let (left, right) = pop2(op, stack)?;
            f64::from(left <= right)
        }
        Token::GreaterEq => {
            let (left, right) = pop2(op, stack)?;
            f64::from(left >= right)
        }
        Token::NotEq => {
            let (left, right) = pop2(op, stack)?;
            f64::from(left != right)
        }
        Token::Round => {
            let (value, digits) = pop2(op, stack)?;
            // Rounding to a very large number of digits overflows the
            // scale factor; the value is returned unrounded instead
            if let Some(y) = 10_i32.checked_pow(digits as u32) {
                let y = f64::from(y);
                (value * y).round() / y
            } else {
                value
            }
        }
        Token::Exponent => {
            let (left, right) = pop2(op, stack)?;
            left * 10.0_f64.powf(right)
        }
        Token::Abs => pop1(op, stack)?.abs(),
        Token::Floor => pop1(op, stack)?.floor(),
        Token::Trunc => pop1(op, stack)?.trunc(),
        Token::Ceil => pop1(op, stack)?.ceil(),
        Token::Open => unreachable!(),
    };

    stack.push(result);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expr() {
        assert_eq!(do_expression("1 + 1"), Ok(Some(2.0)));
        assert_eq!(do_expression("-1 + 1"), Ok(Some(0.0)));
        assert_eq!(do_expression("+1 + 1"), Ok(Some(2.0)));
        assert_eq!(do_expression("4 * 4"), Ok(Some(16.0)));
        assert_eq!(do_expression("(1/3) * 3"), Ok(Some(1.0)));
        assert_eq!(do_expression("3 / 1.5"), Ok(Some(2.0)));
        assert_eq!(do_expression("3 / ( 2.0 * 0.1 )"), Ok(Some(15.0)));
        assert_eq!(do_expression("3 / (- 0.2 )"), Ok(Some(-15.0)));
        assert_eq!(do_expression("3 / abs( 0.2 )"), Ok(Some(15.0)));
        assert_eq!(do_expression("3 mod 2"), Ok(Some(1.0)));
        assert_eq!(do_expression("7 % 4"), Ok(Some(3.0)));
        assert_eq!(do_expression("6 div 4"), Ok(Some(1.5)));
        assert_eq!(do_expression("2 + 3 * 4"), Ok(Some(14.0)));
        assert_eq!(do_expression("2 ^ 10"), Ok(Some(1024.0)));
        assert_eq!(do_expression("2 ** 10"), Ok(Some(1024.0)));
        assert_eq!(do_expression("1e4"), Ok(Some(10000.0)));
        assert_eq!(do_expression("1e-2"), Ok(Some(0.01)));
    }

    #[test]
    fn test_expr_round() {
        assert_eq!(do_expression("4.0 round 0"), Ok(Some(4.0)));
        assert_eq!(do_expression("4.5 round 0"), Ok(Some(5.0)));
        assert_eq!(do_expression("4.2 round 0"), Ok(Some(4.0)));
        assert_eq!(do_expression("-4.2 round 0"), Ok(Some(-4.0)));
        assert_eq!(do_expression("-4.5 round 0"), Ok(Some(-5.0)));
        assert_eq!(do_expression("3.14159 round 2"), Ok(Some(3.14)));
        assert_eq!(do_expression("10 round 100"), Ok(Some(10.0)));
        assert_eq!(do_expression("ceil 4.2"), Ok(Some(5.0)));
        assert_eq!(do_expression("floor -4.5"), Ok(Some(-5.0)));
        assert_eq!(do_expression("trunc(-4.5)"), Ok(Some(-4.0)));
    }

    #[test]
    fn test_expr_logic() {
        assert_eq!(do_expression("1 or 0"), Ok(Some(1.0)));
        assert_eq!(do_expression("not (1 and 0)"), Ok(Some(1.0)));
        assert_eq!(do_expression("not 0"), Ok(Some(1.0)));
        assert_eq!(do_expression("4 < 5"), Ok(Some(1.0)));
        assert_eq!(do_expression("-2 <= -2"), Ok(Some(1.0)));
        assert_eq!(do_expression("4 > -3"), Ok(Some(1.0)));
        assert_eq!(do_expression("2 >= 2"), Ok(Some(1.0)));
        assert_eq!(do_expression("1 != 2"), Ok(Some(1.0)));
        assert_eq!(do_expression("1 <> 2"), Ok(Some(1.0)));
        assert_eq!(do_expression("-4 * -4 = 4 * 4"), Ok(Some(1.0)));
    }

    #[test]
    fn test_expr_quirks() {
        assert_eq!(do_expression(""), Ok(None));
        assert_eq!(do_expression(" "), Ok(None));
        assert_eq!(do_expression("1.2.3.4.5"), Ok(Some(1.2)));
        assert_eq!(do_expression("1.9.2 > 1.10.9"), Ok(Some(1.0)));
        assert_eq!(do_expression("5 &lt; 6"), Ok(Some(1.0)));
        assert_eq!(do_expression("\u{2212}3 + 4"), Ok(Some(1.0)));
    }

    #[test]
    fn test_expr_errors() {
        assert_eq!(Err(Error::UnexpectedNumber(2, 2.0)), do_expression("1 2"));
        assert_eq!(
            Err(Error::UnknownToken(0, "foo".into())),
            do_expression("foo")
        );
        assert_eq!(
            Err(Error::UnexpectedOperator(2, "(".into())),
            do_expression("1 (")
        );
        assert_eq!(
            Err(Error::UnexpectedCloseBracket(5)),
            do_expression("1 + 1)")
        );
        assert_eq!(Err(Error::MissingCloseBracket), do_expression("(1"));
        assert_eq!(Err(Error::MissingOperand("-".into())), do_expression("-"));
        assert_eq!(Err(Error::MissingOperand("*".into())), do_expression("1*"));
        assert_eq!(Err(Error::DivisionByZero("/".into())), do_expression("1/0"));
        assert_eq!(
            Err(Error::DivisionByZero("mod".into())),
            do_expression("1 mod 0")
        );
        assert_eq!(
            Err(Error::UnexpectedOperator(2, "not".into())),
            do_expression("1 not")
        );
        assert_eq!(
            Err(Error::MissingOperand("round".into())),
            do_expression("1 round")
        );
        assert_eq!(
            Err(Error::MissingOperand("abs".into())),
            do_expression("abs()")
        );
        assert_eq!(
            Err(Error::UnknownToken(1, ",".into())),
            do_expression("1, 2")
        );
    }
}
