use indexmap::IndexMap;

use crate::context::PageContext;
use crate::error::RenderError;
use crate::scope::Scope;
use crate::value::{ExpectedType, Value};

/// Evaluates `${...}` expressions against a running page.
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(
        &self,
        expression: &str,
        expected: ExpectedType,
        ctx: &mut PageContext,
    ) -> Result<Value, RenderError>;
}

/// Default evaluator: attribute paths, literals, `empty`, negation,
/// comparison, boolean connectives and integer arithmetic.
///
/// Identifiers resolve through [`PageContext::find_attribute`]; the scope maps
/// `pageScope`, `requestScope`, `sessionScope`, `applicationScope` and `param`
/// are also available.
pub struct ScopedEvaluator;

impl ExpressionEvaluator for ScopedEvaluator {
    fn evaluate(
        &self,
        expression: &str,
        expected: ExpectedType,
        ctx: &mut PageContext,
    ) -> Result<Value, RenderError> {
        let segments = split_template(expression)?;
        let value = match segments.as_slice() {
            [Segment::Expr(body)] => eval_expr(expression, body, ctx)?,
            _ => {
                let mut text = String::new();
                for segment in &segments {
                    match segment {
                        Segment::Literal(lit) => text.push_str(lit),
                        Segment::Expr(body) => {
                            text.push_str(&eval_expr(expression, body, ctx)?.to_output())
                        }
                    }
                }
                Value::Text(text)
            }
        };
        coerce(expression, value, expected)
    }
}

/// Applies expression-language coercion to `expected`.
pub fn coerce(
    expression: &str,
    value: Value,
    expected: ExpectedType,
) -> Result<Value, RenderError> {
    let fail = |what: &str| RenderError::Expression {
        expression: expression.to_string(),
        message: format!("cannot coerce to {what}"),
    };
    match expected {
        ExpectedType::Any => Ok(value),
        ExpectedType::Text => Ok(Value::Text(value.to_output())),
        ExpectedType::Bool => match value {
            Value::Null => Ok(Value::Bool(false)),
            Value::Bool(b) => Ok(Value::Bool(b)),
            Value::Text(t) => Ok(Value::Bool(t.eq_ignore_ascii_case("true"))),
            _ => Err(fail("boolean")),
        },
        ExpectedType::Int => match value {
            Value::Null => Ok(Value::Int(0)),
            Value::Int(n) => Ok(Value::Int(n)),
            Value::Float(x) => Ok(Value::Int(x as i64)),
            Value::Text(t) if t.is_empty() => Ok(Value::Int(0)),
            Value::Text(t) => t.trim().parse().map(Value::Int).map_err(|_| fail("integer")),
            _ => Err(fail("integer")),
        },
        ExpectedType::Float => match value {
            Value::Null => Ok(Value::Float(0.0)),
            Value::Int(n) => Ok(Value::Float(n as f64)),
            Value::Float(x) => Ok(Value::Float(x)),
            Value::Text(t) if t.is_empty() => Ok(Value::Float(0.0)),
            Value::Text(t) => t.trim().parse().map(Value::Float).map_err(|_| fail("number")),
            _ => Err(fail("number")),
        },
    }
}

#[derive(Debug, PartialEq)]
enum Segment {
    Literal(String),
    Expr(String),
}

fn split_template(source: &str) -> Result<Vec<Segment>, RenderError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '\\' && matches!(chars.get(i + 1), Some('$') | Some('#')) {
            literal.push(chars[i + 1]);
            i += 2;
            continue;
        }
        if (c == '$' || c == '#') && chars.get(i + 1) == Some(&'{') {
            let start = i + 2;
            let mut end = start;
            let mut quote: Option<char> = None;
            while end < chars.len() {
                let ch = chars[end];
                match quote {
                    Some(q) if ch == q => quote = None,
                    Some(_) => {}
                    None if ch == '\'' || ch == '"' => quote = Some(ch),
                    None if ch == '}' => break,
                    None => {}
                }
                end += 1;
            }
            if end >= chars.len() {
                return Err(RenderError::Expression {
                    expression: source.to_string(),
                    message: "unterminated expression".to_string(),
                });
            }
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Expr(chars[start..end].iter().collect()));
            i = end + 1;
            continue;
        }
        literal.push(c);
        i += 1;
    }
    if !literal.is_empty() || segments.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Op(&'static str),
}

fn tokenize(expression: &str, body: &str) -> Result<Vec<Token>, RenderError> {
    let err = |message: String| RenderError::Expression {
        expression: expression.to_string(),
        message,
    };
    let chars: Vec<char> = body.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            if text.contains('.') {
                let x = text.parse().map_err(|_| err(format!("bad number `{text}`")))?;
                tokens.push(Token::Float(x));
            } else {
                let n = text.parse().map_err(|_| err(format!("bad number `{text}`")))?;
                tokens.push(Token::Int(n));
            }
            continue;
        }
        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
            continue;
        }
        if c == '\'' || c == '"' {
            let mut text = String::new();
            i += 1;
            while i < chars.len() && chars[i] != c {
                if chars[i] == '\\' && i + 1 < chars.len() {
                    i += 1;
                }
                text.push(chars[i]);
                i += 1;
            }
            if i >= chars.len() {
                return Err(err("unterminated string".to_string()));
            }
            i += 1;
            tokens.push(Token::Str(text));
            continue;
        }
        let two: String = chars[i..(i + 2).min(chars.len())].iter().collect();
        let op = match two.as_str() {
            "==" => Some("=="),
            "!=" => Some("!="),
            "<=" => Some("<="),
            ">=" => Some(">="),
            "&&" => Some("&&"),
            "||" => Some("||"),
            _ => None,
        };
        if let Some(op) = op {
            tokens.push(Token::Op(op));
            i += 2;
            continue;
        }
        let op = match c {
            '.' => ".",
            '[' => "[",
            ']' => "]",
            '(' => "(",
            ')' => ")",
            '<' => "<",
            '>' => ">",
            '!' => "!",
            '+' => "+",
            '-' => "-",
            '*' => "*",
            '/' => "/",
            '%' => "%",
            other => return Err(err(format!("unexpected character `{other}`"))),
        };
        tokens.push(Token::Op(op));
        i += 1;
    }
    Ok(tokens)
}

fn eval_expr(expression: &str, body: &str, ctx: &mut PageContext) -> Result<Value, RenderError> {
    let tokens = tokenize(expression, body)?;
    let mut parser = Parser {
        expression,
        tokens,
        pos: 0,
        ctx,
    };
    let value = parser.or()?;
    if parser.pos != parser.tokens.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(value)
}

struct Parser<'a> {
    expression: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    ctx: &'a mut PageContext,
}

impl Parser<'_> {
    fn error(&self, message: &str) -> RenderError {
        RenderError::Expression {
            expression: self.expression.to_string(),
            message: message.to_string(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn eat_op(&mut self, ops: &[&'static str], words: &[&str]) -> Option<&'static str> {
        let matched = match self.peek() {
            Some(Token::Op(op)) if ops.contains(op) => Some(*op),
            Some(Token::Ident(word)) => words
                .iter()
                .position(|w| w == word)
                .map(|idx| ops[idx]),
            _ => None,
        };
        if matched.is_some() {
            self.pos += 1;
        }
        matched
    }

    fn or(&mut self) -> Result<Value, RenderError> {
        let mut left = self.and()?;
        while self.eat_op(&["||"], &["or"]).is_some() {
            let right = self.and()?;
            left = Value::Bool(left.truthy() || right.truthy());
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Value, RenderError> {
        let mut left = self.equality()?;
        while self.eat_op(&["&&"], &["and"]).is_some() {
            let right = self.equality()?;
            left = Value::Bool(left.truthy() && right.truthy());
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Value, RenderError> {
        let mut left = self.relational()?;
        while let Some(op) = self.eat_op(&["==", "!="], &["eq", "ne"]) {
            let right = self.relational()?;
            let equal = values_equal(&left, &right);
            left = Value::Bool(if op == "==" { equal } else { !equal });
        }
        Ok(left)
    }

    fn relational(&mut self) -> Result<Value, RenderError> {
        let mut left = self.additive()?;
        while let Some(op) = self.eat_op(&["<", ">", "<=", ">="], &["lt", "gt", "le", "ge"]) {
            let right = self.additive()?;
            let ordering =
                compare(&left, &right).ok_or_else(|| self.error("values are not comparable"))?;
            left = Value::Bool(match op {
                "<" => ordering.is_lt(),
                ">" => ordering.is_gt(),
                "<=" => ordering.is_le(),
                _ => ordering.is_ge(),
            });
        }
        Ok(left)
    }

    fn additive(&mut self) -> Result<Value, RenderError> {
        let mut left = self.multiplicative()?;
        while let Some(op) = self.eat_op(&["+", "-"], &[]) {
            let right = self.multiplicative()?;
            left = self.arith(op, &left, &right)?;
        }
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Value, RenderError> {
        let mut left = self.unary()?;
        while let Some(op) = self.eat_op(&["*", "/", "%"], &["", "div", "mod"]) {
            let right = self.unary()?;
            left = self.arith(op, &left, &right)?;
        }
        Ok(left)
    }

    fn arith(&self, op: &str, left: &Value, right: &Value) -> Result<Value, RenderError> {
        let int = |v: &Value| match v {
            Value::Null => Some(0),
            Value::Int(n) => Some(*n),
            Value::Text(t) => t.trim().parse::<i64>().ok(),
            _ => None,
        };
        let float = |v: &Value| match v {
            Value::Null => Some(0.0),
            Value::Int(n) => Some(*n as f64),
            Value::Float(x) => Some(*x),
            Value::Text(t) => t.trim().parse::<f64>().ok(),
            _ => None,
        };
        if op != "/" {
            if let (Some(a), Some(b)) = (int(left), int(right)) {
                return match op {
                    "+" => Ok(Value::Int(a.wrapping_add(b))),
                    "-" => Ok(Value::Int(a.wrapping_sub(b))),
                    "*" => Ok(Value::Int(a.wrapping_mul(b))),
                    _ if b == 0 => Err(self.error("division by zero")),
                    _ => Ok(Value::Int(a % b)),
                };
            }
        }
        let (Some(a), Some(b)) = (float(left), float(right)) else {
            return Err(self.error("arithmetic on non-numeric value"));
        };
        Ok(Value::Float(match op {
            "+" => a + b,
            "-" => a - b,
            "*" => a * b,
            "/" => a / b,
            _ => a % b,
        }))
    }

    fn unary(&mut self) -> Result<Value, RenderError> {
        if self.eat_op(&["!"], &["not"]).is_some() {
            let value = self.unary()?;
            return Ok(Value::Bool(!value.truthy()));
        }
        if self.eat_op(&["empty"], &["empty"]).is_some() {
            let value = self.unary()?;
            return Ok(Value::Bool(is_empty(&value)));
        }
        if self.eat_op(&["-"], &[]).is_some() {
            let value = self.unary()?;
            return self.arith("-", &Value::Int(0), &value);
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Value, RenderError> {
        let mut value = self.primary()?;
        loop {
            if self.eat_op(&["."], &[]).is_some() {
                let Some(Token::Ident(name)) = self.peek().cloned() else {
                    return Err(self.error("expected property name after `.`"));
                };
                self.pos += 1;
                value = value.member(&name).unwrap_or(Value::Null);
            } else if self.eat_op(&["["], &[]).is_some() {
                let key = self.or()?;
                if self.eat_op(&["]"], &[]).is_none() {
                    return Err(self.error("expected `]`"));
                }
                value = value.member(&key.to_output()).unwrap_or(Value::Null);
            } else {
                return Ok(value);
            }
        }
    }

    fn primary(&mut self) -> Result<Value, RenderError> {
        let Some(token) = self.peek().cloned() else {
            return Err(self.error("unexpected end of expression"));
        };
        self.pos += 1;
        match token {
            Token::Int(n) => Ok(Value::Int(n)),
            Token::Float(x) => Ok(Value::Float(x)),
            Token::Str(s) => Ok(Value::Text(s)),
            Token::Op("(") => {
                let value = self.or()?;
                if self.eat_op(&[")"], &[]).is_none() {
                    return Err(self.error("expected `)`"));
                }
                Ok(value)
            }
            Token::Ident(name) => self.resolve(&name),
            Token::Op(op) => Err(self.error(&format!("unexpected `{op}`"))),
        }
    }

    fn resolve(&mut self, name: &str) -> Result<Value, RenderError> {
        let scope = match name {
            "true" => return Ok(Value::Bool(true)),
            "false" => return Ok(Value::Bool(false)),
            "null" => return Ok(Value::Null),
            "param" => {
                let request = self.ctx.request().clone();
                let map: IndexMap<String, Value> = request
                    .parameter_names()
                    .filter_map(|n| request.parameter(n).map(|v| (n.to_string(), Value::from(v))))
                    .collect();
                return Ok(Value::Map(map));
            }
            "pageScope" => Scope::Page,
            "requestScope" => Scope::Request,
            "sessionScope" => Scope::Session,
            "applicationScope" => Scope::Application,
            other => return self.ctx.find_attribute(other).map(|v| v.unwrap_or(Value::Null)),
        };
        let mut map = IndexMap::new();
        for attr in self.ctx.attribute_names_in(scope)? {
            if let Some(value) = self.ctx.get_attribute_in(&attr, scope)? {
                map.insert(attr, value);
            }
        }
        Ok(Value::Map(map))
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Text(t) => t.is_empty(),
        Value::List(items) => items.is_empty(),
        Value::Map(map) => map.is_empty(),
        _ => false,
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Int(_) | Value::Float(_), _) | (_, Value::Int(_) | Value::Float(_)) => {
            compare(left, right).is_some_and(|o| o.is_eq())
        }
        (Value::Bool(a), other) | (other, Value::Bool(a)) => *a == other.truthy(),
        _ => left.to_output() == right.to_output(),
    }
}

fn compare(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    let number = |v: &Value| match v {
        Value::Int(n) => Some(*n as f64),
        Value::Float(x) => Some(*x),
        Value::Text(t) => t.trim().parse::<f64>().ok(),
        Value::Null => Some(0.0),
        _ => None,
    };
    match (left, right) {
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        _ => number(left)?.partial_cmp(&number(right)?),
    }
}
