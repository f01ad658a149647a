//! Strategy node DSL parser.
//!
//! Recursive descent parser for the node grammar:
//!
//! ```text
//! nodes := node (',' node)*
//! node  := OPERATION [ '(' args ')' ] [ '{' nodes '}' ]
//! ```
//!
//! For example `IF_PRICE_DROPS(3) { IF_RSI_BELOW(30) { BUY_PERCENT(50) } }, STOP_LOSS(8)`.
//! Node ids are the index path of the node (`"0"`, `"0.1"`, ...), optionally
//! prefixed. Errors carry the byte offset of the offending token.

use crate::domain::error::{ParseError, StratlabError};
use crate::domain::indicator::{MaKey, MaKind};
use crate::domain::node::{
    validate_nodes, Action, Band, Condition, Cross, Modifier, NodeKind, StrategyNode, Trigger,
    MAX_DEPTH,
};
use chrono::Weekday;

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch == expected => {
                self.advance();
                Ok(())
            }
            Some(ch) => Err(ParseError {
                message: format!("expected '{}', found '{}'", expected, ch),
                position: self.pos,
            }),
            None => Err(ParseError {
                message: format!("expected '{}', found end of input", expected),
                position: self.pos,
            }),
        }
    }

    fn consume_char(&mut self, expected: char) -> bool {
        self.skip_whitespace();
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn peek_word(&self) -> String {
        let mut word = String::new();
        for ch in self.remaining().chars() {
            if ch.is_alphanumeric() || ch == '_' {
                word.push(ch);
            } else {
                break;
            }
        }
        if word.is_empty() {
            self.peek()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "end of input".to_string())
        } else {
            word
        }
    }

    fn take_word(&mut self) -> Result<(String, usize), ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let word = self.peek_word();
        if !word.chars().next().is_some_and(|c| c.is_alphabetic()) {
            return Err(ParseError {
                message: format!("expected operation, found '{}'", word),
                position: start,
            });
        }
        self.pos += word.len();
        Ok((word, start))
    }

    fn parse_number(&mut self) -> Result<f64, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let mut has_dot = false;
        let mut digits = 0;

        if self.peek() == Some('-') {
            self.advance();
        }

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        if digits == 0 {
            return Err(ParseError {
                message: "expected number".to_string(),
                position: start,
            });
        }

        let num_str = &self.input[start..self.pos];
        num_str.parse::<f64>().map_err(|_| ParseError {
            message: format!("invalid number: {}", num_str),
            position: start,
        })
    }

    fn parse_integer(&mut self) -> Result<usize, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let mut digits = 0;

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else {
                break;
            }
        }

        if digits == 0 {
            return Err(ParseError {
                message: "expected integer".to_string(),
                position: start,
            });
        }

        let num_str = &self.input[start..self.pos];
        num_str.parse::<usize>().map_err(|_| ParseError {
            message: format!("invalid integer: {}", num_str),
            position: start,
        })
    }

    fn parse_keyword<T>(&mut self, expected: &str, map: &[(&str, T)]) -> Result<T, ParseError>
    where
        T: Copy,
    {
        self.skip_whitespace();
        let start = self.pos;
        let word = self.peek_word();
        match map.iter().find(|(k, _)| *k == word) {
            Some((_, value)) => {
                self.pos += word.len();
                Ok(*value)
            }
            None => Err(ParseError {
                message: format!("expected {}, found '{}'", expected, word),
                position: start,
            }),
        }
    }

    fn parse_cross(&mut self) -> Result<Cross, ParseError> {
        self.parse_keyword(
            "ABOVE or BELOW",
            &[("ABOVE", Cross::Above), ("BELOW", Cross::Below)],
        )
    }

    /// `(number)` argument list.
    fn single_number(&mut self) -> Result<f64, ParseError> {
        self.expect_char('(')?;
        let value = self.parse_number()?;
        self.expect_char(')')?;
        Ok(value)
    }

    fn single_integer(&mut self) -> Result<usize, ParseError> {
        self.expect_char('(')?;
        let value = self.parse_integer()?;
        self.expect_char(')')?;
        Ok(value)
    }

    fn parse_kind(&mut self, op: &str, op_pos: usize) -> Result<NodeKind, ParseError> {
        let kind = match op {
            "IF_PRICE_ABOVE" => NodeKind::Trigger(Trigger::PriceAbove {
                price: self.single_number()?,
            }),
            "IF_PRICE_BELOW" => NodeKind::Trigger(Trigger::PriceBelow {
                price: self.single_number()?,
            }),
            "IF_PRICE_DROPS" => NodeKind::Trigger(Trigger::PriceDrops {
                percent: self.single_number()?,
            }),
            "IF_PRICE_RISES" => NodeKind::Trigger(Trigger::PriceRises {
                percent: self.single_number()?,
            }),
            "ON_WEEKDAY" => {
                self.expect_char('(')?;
                let day = self.parse_keyword(
                    "weekday (MON..SUN)",
                    &[
                        ("MON", Weekday::Mon),
                        ("TUE", Weekday::Tue),
                        ("WED", Weekday::Wed),
                        ("THU", Weekday::Thu),
                        ("FRI", Weekday::Fri),
                        ("SAT", Weekday::Sat),
                        ("SUN", Weekday::Sun),
                    ],
                )?;
                self.expect_char(')')?;
                NodeKind::Trigger(Trigger::Weekday { day })
            }
            "ON_MONTH_DAY" => {
                let start = self.pos;
                let value = self.single_integer()?;
                let day = u32::try_from(value).map_err(|_| ParseError {
                    message: format!("day of month out of range: {}", value),
                    position: start,
                })?;
                NodeKind::Trigger(Trigger::MonthDay { day })
            }
            "EVERY_N_DAYS" => NodeKind::Trigger(Trigger::EveryNDays {
                days: self.single_integer()?,
            }),
            "ON_FIRST_DAY" => NodeKind::Trigger(Trigger::FirstDay),
            "IF_RSI_BELOW" => NodeKind::Condition(Condition::RsiBelow {
                threshold: self.single_number()?,
            }),
            "IF_RSI_ABOVE" => NodeKind::Condition(Condition::RsiAbove {
                threshold: self.single_number()?,
            }),
            "IF_MOVING_AVG" => {
                self.expect_char('(')?;
                let kind =
                    self.parse_keyword("SMA or EMA", &[("SMA", MaKind::Sma), ("EMA", MaKind::Ema)])?;
                self.expect_char(',')?;
                let period = self.parse_integer()?;
                self.expect_char(',')?;
                let direction = self.parse_cross()?;
                self.expect_char(')')?;
                NodeKind::Condition(Condition::MovingAverage {
                    average: MaKey { kind, period },
                    direction,
                })
            }
            "IF_VOLUME_SPIKE" => NodeKind::Condition(Condition::VolumeSpike {
                multiplier: self.single_number()?,
            }),
            "IF_BOLLINGER" => {
                self.expect_char('(')?;
                let band = self.parse_keyword(
                    "LOWER or UPPER",
                    &[("LOWER", Band::Lower), ("UPPER", Band::Upper)],
                )?;
                self.expect_char(')')?;
                NodeKind::Condition(Condition::Bollinger { band })
            }
            "IF_MACD_CROSS" => {
                self.expect_char('(')?;
                let direction = self.parse_cross()?;
                self.expect_char(')')?;
                NodeKind::Condition(Condition::MacdCross { direction })
            }
            "IF_VOLATILITY_ABOVE" => NodeKind::Condition(Condition::VolatilityAbove {
                percent: self.single_number()?,
            }),
            "BUY" => NodeKind::Action(Action::Buy {
                amount: self.single_number()?,
            }),
            "SELL" => NodeKind::Action(Action::Sell {
                units: self.single_number()?,
            }),
            "BUY_PERCENT" => NodeKind::Action(Action::BuyPercent {
                percent: self.single_number()?,
            }),
            "SELL_PERCENT" => NodeKind::Action(Action::SellPercent {
                percent: self.single_number()?,
            }),
            "STOP_LOSS" => NodeKind::Modifier(Modifier::StopLoss {
                percent: self.single_number()?,
            }),
            "TAKE_PROFIT" => NodeKind::Modifier(Modifier::TakeProfit {
                percent: self.single_number()?,
            }),
            "TRAILING_STOP" => NodeKind::Modifier(Modifier::TrailingStop {
                percent: self.single_number()?,
            }),
            _ => {
                return Err(ParseError {
                    message: format!("unknown operation '{}'", op),
                    position: op_pos,
                });
            }
        };
        Ok(kind)
    }

    fn parse_node(&mut self, id: String, depth: usize) -> Result<StrategyNode, ParseError> {
        let (op, op_pos) = self.take_word()?;
        let kind = self.parse_kind(&op, op_pos)?;
        let mut node = StrategyNode::new(id.clone(), kind);

        if self.consume_char('{') {
            let brace_pos = self.pos - 1;
            if !node.can_have_children() {
                return Err(ParseError {
                    message: format!("{} cannot have child nodes", op),
                    position: brace_pos,
                });
            }
            if depth >= MAX_DEPTH {
                return Err(ParseError {
                    message: format!("nesting deeper than {} levels", MAX_DEPTH),
                    position: brace_pos,
                });
            }
            node.children = self.parse_list(&id, depth + 1)?;
            self.expect_char('}')?;
        }

        Ok(node)
    }

    fn parse_list(&mut self, prefix: &str, depth: usize) -> Result<Vec<StrategyNode>, ParseError> {
        let mut nodes = Vec::new();
        loop {
            let id = if prefix.is_empty() {
                nodes.len().to_string()
            } else {
                format!("{}.{}", prefix, nodes.len())
            };
            nodes.push(self.parse_node(id, depth)?);
            if !self.consume_char(',') {
                break;
            }
        }
        Ok(nodes)
    }

    fn parse_all(&mut self, prefix: &str) -> Result<Vec<StrategyNode>, ParseError> {
        self.skip_whitespace();
        if self.peek().is_none() {
            return Err(ParseError {
                message: "empty strategy".to_string(),
                position: self.pos,
            });
        }

        let nodes = self.parse_list(prefix, 0)?;

        self.skip_whitespace();
        if self.pos < self.input.len() {
            return Err(ParseError {
                message: format!("unexpected trailing input: '{}'", self.peek_word()),
                position: self.pos,
            });
        }
        Ok(nodes)
    }
}

/// Parse a DSL string into nodes with ids `"0"`, `"1"`, `"0.0"`, ...
pub fn parse(input: &str) -> Result<Vec<StrategyNode>, ParseError> {
    Parser::new(input).parse_all("")
}

/// Parse with ids prefixed (e.g. `"dip-buyer.0.1"`) and validate parameters.
pub fn parse_strategy(input: &str, id_prefix: &str) -> Result<Vec<StrategyNode>, StratlabError> {
    let nodes = Parser::new(input).parse_all(id_prefix)?;
    validate_nodes(&nodes)?;
    Ok(nodes)
}
