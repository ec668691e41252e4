//! 条件表达式
//!
//! 受限的表达式语言，只允许字面量、标识符、比较和逻辑连接，求值过程不会执行任何代码。
//!
//! ```text
//! expr    := and ( "||" and )*
//! and     := compare ( "&&" compare )*
//! compare := primary ( ( ">" | "<" | ">=" | "<=" | "==" | "!=" ) primary )?
//! primary := number | string | true | false | null | ident | "(" expr ")"
//! ```

use crate::error::{Result, RuleError};
use crate::evaluator::ConditionEvaluator;
use crate::record::Record;
use chrono::{DateTime, Utc};
use serde_json::{Number, Value};
use std::borrow::Cow;
use std::cmp::Ordering;

/// 括号最大嵌套深度
const MAX_NESTING_DEPTH: usize = 64;

/// 派生字段：距离要求交付日期的天数
pub const DELIVERY_DAYS: &str = "deliveryDays";
const REQUIRED_DELIVERY_DATE: &str = "requiredDeliveryDate";
const MILLIS_PER_DAY: f64 = 86_400_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparator {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
}

impl Comparator {
    fn matches(self, ordering: Ordering) -> bool {
        match self {
            Self::Gt => ordering == Ordering::Greater,
            Self::Lt => ordering == Ordering::Less,
            Self::Ge => ordering != Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    True,
    False,
    Null,
    Cmp(Comparator),
    And,
    Or,
    LParen,
    RParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Self::Ident(name) => format!("标识符 '{}'", name),
            Self::Number(n) => format!("数字 {}", n),
            Self::Str(s) => format!("字符串 '{}'", s),
            Self::True => "true".to_string(),
            Self::False => "false".to_string(),
            Self::Null => "null".to_string(),
            Self::Cmp(op) => format!("比较运算符 {:?}", op),
            Self::And => "'&&'".to_string(),
            Self::Or => "'||'".to_string(),
            Self::LParen => "'('".to_string(),
            Self::RParen => "')'".to_string(),
        }
    }

    /// 该记号之后是否期待一个操作数
    fn expects_operand(&self) -> bool {
        matches!(self, Self::Cmp(_) | Self::And | Self::Or | Self::LParen)
    }
}

/// 词法分析，返回 (字节位置, 记号) 序列
fn tokenize(source: &str) -> Result<Vec<(usize, Token)>> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut tokens: Vec<(usize, Token)> = Vec::new();
    let mut i = 0;

    let peek = |i: usize| chars.get(i).map(|(_, c)| *c);

    while i < chars.len() {
        let (pos, c) = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let operand_expected = tokens.last().is_none_or(|(_, t)| t.expects_operand());

        let token = match c {
            '(' => {
                i += 1;
                Token::LParen
            }
            ')' => {
                i += 1;
                Token::RParen
            }
            '>' | '<' => {
                let with_eq = peek(i + 1) == Some('=');
                i += if with_eq { 2 } else { 1 };
                match (c, with_eq) {
                    ('>', false) => Token::Cmp(Comparator::Gt),
                    ('>', true) => Token::Cmp(Comparator::Ge),
                    ('<', false) => Token::Cmp(Comparator::Lt),
                    _ => Token::Cmp(Comparator::Le),
                }
            }
            '=' => {
                if peek(i + 1) != Some('=') {
                    return Err(RuleError::parse(pos, "不支持赋值，比较请使用 '=='"));
                }
                i += 2;
                Token::Cmp(Comparator::Eq)
            }
            '!' => {
                if peek(i + 1) != Some('=') {
                    return Err(RuleError::parse(pos, "不支持取反运算符 '!'"));
                }
                i += 2;
                Token::Cmp(Comparator::Ne)
            }
            '&' | '|' => {
                if peek(i + 1) != Some(c) {
                    return Err(RuleError::parse(pos, format!("意外的字符 '{}'", c)));
                }
                i += 2;
                if c == '&' { Token::And } else { Token::Or }
            }
            '\'' | '"' => {
                let (literal, next) = lex_string(&chars, i, source.len())?;
                i = next;
                Token::Str(literal)
            }
            '-' if operand_expected && peek(i + 1).is_some_and(|n| n.is_ascii_digit()) => {
                let (number, next) = lex_number(source, &chars, i + 1)?;
                i = next;
                Token::Number(-number)
            }
            c if c.is_ascii_digit() => {
                let (number, next) = lex_number(source, &chars, i)?;
                i = next;
                Token::Number(number)
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while peek(i).is_some_and(|n| n.is_ascii_alphanumeric() || n == '_') {
                    i += 1;
                }
                let end = chars.get(i).map_or(source.len(), |(p, _)| *p);
                match &source[chars[start].0..end] {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    ident => Token::Ident(ident.to_string()),
                }
            }
            other => {
                return Err(RuleError::parse(pos, format!("意外的字符 '{}'", other)));
            }
        };

        tokens.push((pos, token));
    }

    Ok(tokens)
}

/// 解析数字字面量：整数部分加可选的小数部分
fn lex_number(source: &str, chars: &[(usize, char)], start: usize) -> Result<(f64, usize)> {
    let mut i = start;
    let digit_at = |i: usize| chars.get(i).is_some_and(|(_, c)| c.is_ascii_digit());

    while digit_at(i) {
        i += 1;
    }
    if chars.get(i).is_some_and(|(_, c)| *c == '.') && digit_at(i + 1) {
        i += 1;
        while digit_at(i) {
            i += 1;
        }
    }

    let begin = chars[start].0;
    let end = chars.get(i).map_or(source.len(), |(p, _)| *p);
    let number = source[begin..end]
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| RuleError::parse(begin, "数字字面量无效"))?;

    Ok((number, i))
}

/// 解析引号字符串，支持反斜杠转义
fn lex_string(chars: &[(usize, char)], start: usize, len: usize) -> Result<(String, usize)> {
    let (pos, quote) = chars[start];
    let mut literal = String::new();
    let mut i = start + 1;

    loop {
        let Some(&(_, c)) = chars.get(i) else {
            return Err(RuleError::parse(pos, "字符串未闭合"));
        };
        i += 1;

        if c == quote {
            return Ok((literal, i));
        }
        if c != '\\' {
            literal.push(c);
            continue;
        }

        let Some(&(_, escaped)) = chars.get(i) else {
            return Err(RuleError::parse(len, "字符串未闭合"));
        };
        i += 1;
        literal.push(match escaped {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            other => other,
        });
    }
}

#[derive(Debug, Clone)]
enum Node {
    Literal(Value),
    Ident(String),
    Compare {
        op: Comparator,
        left: Box<Node>,
        right: Box<Node>,
    },
    /// 同一层的 `&&` 操作数，按出现顺序
    And(Vec<Node>),
    /// 同一层的 `||` 操作数，按出现顺序
    Or(Vec<Node>),
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    depth: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn position(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |(p, _)| *p)
    }

    fn next(&mut self) -> Option<(usize, Token)> {
        let item = self.tokens.get(self.pos).cloned();
        if item.is_some() {
            self.pos += 1;
        }
        item
    }

    // 连续的 && / || 收集为同一层的操作数列表，递归深度只随括号增长
    fn parse_or(&mut self) -> Result<Node> {
        let mut operands = vec![self.parse_and()?];
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            operands.push(self.parse_and()?);
        }
        Ok(Self::collapse(operands, Node::Or))
    }

    fn parse_and(&mut self) -> Result<Node> {
        let mut operands = vec![self.parse_compare()?];
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            operands.push(self.parse_compare()?);
        }
        Ok(Self::collapse(operands, Node::And))
    }

    /// 只有一个操作数时不建组
    fn collapse(mut operands: Vec<Node>, group: fn(Vec<Node>) -> Node) -> Node {
        if operands.len() == 1 {
            if let Some(only) = operands.pop() {
                return only;
            }
        }
        group(operands)
    }

    fn parse_compare(&mut self) -> Result<Node> {
        let left = self.parse_primary()?;

        let Some(&Token::Cmp(op)) = self.peek() else {
            return Ok(left);
        };
        self.pos += 1;
        let right = self.parse_primary()?;

        if let Some(Token::Cmp(_)) = self.peek() {
            return Err(RuleError::parse(self.position(), "比较运算符不能连用"));
        }

        Ok(Node::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_primary(&mut self) -> Result<Node> {
        let Some((pos, token)) = self.next() else {
            return Err(RuleError::parse(self.end, "表达式意外结束"));
        };

        match token {
            Token::Number(n) => Number::from_f64(n)
                .map(|n| Node::Literal(Value::Number(n)))
                .ok_or_else(|| RuleError::parse(pos, "数字字面量无效")),
            Token::Str(s) => Ok(Node::Literal(Value::String(s))),
            Token::True => Ok(Node::Literal(Value::Bool(true))),
            Token::False => Ok(Node::Literal(Value::Bool(false))),
            Token::Null => Ok(Node::Literal(Value::Null)),
            Token::Ident(name) => Ok(Node::Ident(name)),
            Token::LParen => {
                self.depth += 1;
                if self.depth > MAX_NESTING_DEPTH {
                    return Err(RuleError::parse(
                        pos,
                        format!("括号嵌套超过 {} 层", MAX_NESTING_DEPTH),
                    ));
                }
                let inner = self.parse_or()?;
                match self.next() {
                    Some((_, Token::RParen)) => {}
                    Some((p, t)) => {
                        return Err(RuleError::parse(
                            p,
                            format!("期望 ')'，实际为 {}", t.describe()),
                        ));
                    }
                    None => return Err(RuleError::parse(self.end, "缺少 ')'")),
                }
                self.depth -= 1;
                Ok(inner)
            }
            other => Err(RuleError::parse(
                pos,
                format!("意外的 {}", other.describe()),
            )),
        }
    }
}

/// 已解析的条件表达式
#[derive(Debug, Clone)]
pub struct Expression {
    root: Node,
    uses_delivery_days: bool,
}

impl Expression {
    /// 解析表达式，语法外的任何记号都会返回 `RuleError::Parse`
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(RuleError::parse(0, "表达式为空"));
        }

        let uses_delivery_days = tokens
            .iter()
            .any(|(_, t)| matches!(t, Token::Ident(name) if name == DELIVERY_DAYS));

        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
            end: source.len(),
        };
        let root = parser.parse_or()?;

        if let Some((pos, token)) = parser.next() {
            return Err(RuleError::parse(pos, format!("意外的 {}", token.describe())));
        }

        Ok(Self {
            root,
            uses_delivery_days,
        })
    }

    /// 以当前时间求值
    pub fn evaluate(&self, record: &Record) -> bool {
        self.evaluate_at(record, Utc::now())
    }

    /// 以给定时间求值，`deliveryDays` 相对 `now` 计算
    pub fn evaluate_at(&self, record: &Record, now: DateTime<Utc>) -> bool {
        let scope = Scope {
            record,
            delivery_days: if self.uses_delivery_days {
                derive_delivery_days(record, now)
            } else {
                None
            },
        };
        truthy(eval(&self.root, &scope).as_deref())
    }
}

struct Scope<'a> {
    record: &'a Record,
    /// Some(None) 表示交付日期无法解析，派生值不存在
    delivery_days: Option<Option<Value>>,
}

impl<'a> Scope<'a> {
    fn lookup(&self, name: &str) -> Option<Cow<'a, Value>> {
        if name == DELIVERY_DAYS {
            if let Some(derived) = &self.delivery_days {
                return derived.clone().map(Cow::Owned);
            }
        }
        self.record.get(name).map(Cow::Borrowed)
    }
}

/// 交付日期缺失时返回 None，沿用记录自身的 deliveryDays
fn derive_delivery_days(record: &Record, now: DateTime<Utc>) -> Option<Option<Value>> {
    let raw = record.get(REQUIRED_DELIVERY_DATE).filter(|v| !v.is_null())?;

    let days = raw
        .as_str()
        .and_then(ConditionEvaluator::parse_datetime)
        .map(|date| {
            let millis = (date - now).num_milliseconds() as f64;
            Value::from((millis / MILLIS_PER_DAY).ceil() as i64)
        });

    Some(days)
}

fn eval<'a>(node: &'a Node, scope: &Scope<'a>) -> Option<Cow<'a, Value>> {
    match node {
        Node::Literal(value) => Some(Cow::Borrowed(value)),
        Node::Ident(name) => scope.lookup(name),
        Node::Compare { op, left, right } => {
            let left = eval(left, scope);
            let right = eval(right, scope);
            let result = match (left.as_deref(), right.as_deref()) {
                (Some(l), Some(r)) => compare(*op, l, r),
                _ => false,
            };
            Some(Cow::Owned(Value::Bool(result)))
        }
        Node::And(operands) => {
            let result = operands
                .iter()
                .all(|operand| truthy(eval(operand, scope).as_deref()));
            Some(Cow::Owned(Value::Bool(result)))
        }
        Node::Or(operands) => {
            let result = operands
                .iter()
                .any(|operand| truthy(eval(operand, scope).as_deref()));
            Some(Cow::Owned(Value::Bool(result)))
        }
    }
}

fn compare(op: Comparator, left: &Value, right: &Value) -> bool {
    match op {
        Comparator::Eq => ConditionEvaluator::strict_equals(left, right),
        Comparator::Ne => !ConditionEvaluator::strict_equals(left, right),
        _ => ordering(left, right).is_some_and(|o| op.matches(o)),
    }
}

/// 字符串按字典序，其余转为数字比较；无法转换时没有顺序
fn ordering(left: &Value, right: &Value) -> Option<Ordering> {
    if let (Value::String(a), Value::String(b)) = (left, right) {
        return Some(a.cmp(b));
    }
    let a = ConditionEvaluator::as_number(left)?;
    let b = ConditionEvaluator::as_number(right)?;
    a.partial_cmp(&b)
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}
